//! Integration tests for request dispatch and completion handling.

mod common;

use std::sync::Arc;
use std::time::Duration;

use advisor_core::ai::Payload;
use advisor_core::postprocess::GLOSSARY;
use advisor_core::session::{IMAGE_STARTED_MESSAGE, MISSING_KEY_MESSAGE};
use advisor_core::state::SettingsStatus;
use advisor_core::{Collaborators, Input, RequestKind, Sender, Status, Verbosity};
use common::{
    harness, run_until_idle, session_with, PanickingApi, StubApi, StubCapture, StubPlayer,
    StubSynthesizer,
};

const RANSOMWARE_REPLY: &str = "Ransomware is malware that encrypts your files and demands payment.";

fn ransomware_explanation() -> &'static str {
    GLOSSARY
        .iter()
        .find(|(term, _)| *term == "ransomware")
        .map(|(_, explanation)| *explanation)
        .expect("glossary should explain ransomware")
}

#[tokio::test]
async fn missing_credential_never_calls_the_api() {
    let api = StubApi::replying("unused");
    let mut h = harness(api.clone(), None);

    let handle = h.session.dispatch(Input::Prompt("What is phishing?".into()));

    assert!(handle.is_none());
    assert_eq!(api.calls(), 0);
    assert_eq!(h.session.messages().len(), 1);
    assert_eq!(h.session.messages()[0].sender, Sender::Assistant);
    assert_eq!(h.session.messages()[0].content, MISSING_KEY_MESSAGE);
    assert!(!h.session.ui().is_busy);
    assert!(h.session.take_settings_request());
    assert!(!h.session.take_settings_request());
}

#[tokio::test]
async fn blank_prompt_is_ignored() {
    let api = StubApi::replying("unused");
    let mut h = harness(api.clone(), Some("key"));

    assert!(h.session.dispatch(Input::Prompt("   ".into())).is_none());
    assert!(h.session.messages().is_empty());
    assert_eq!(api.calls(), 0);
}

#[tokio::test]
async fn short_mode_reply_gets_glossary_explanation() {
    let api = StubApi::replying(RANSOMWARE_REPLY);
    let mut h = harness(api.clone(), Some("key"));
    assert_eq!(h.session.toggle_verbosity(), Verbosity::Short);

    let handle = h.session.dispatch(Input::Prompt("What is ransomware?".into()));
    assert!(handle.is_some());
    assert!(h.session.ui().is_busy);
    assert_eq!(h.session.ui().status, Status::Processing);

    run_until_idle(&mut h.session).await;

    let messages = h.session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender, Sender::User);
    assert_eq!(messages[0].content, "What is ransomware?");
    assert_eq!(messages[1].sender, Sender::Assistant);
    assert!(messages[1].content.starts_with(RANSOMWARE_REPLY));
    assert!(messages[1].content.contains(ransomware_explanation()));
    assert!(!h.session.ui().is_busy);
    assert_eq!(h.session.ui().status, Status::Ready);
    assert_eq!(api.calls(), 1);
}

#[tokio::test]
async fn full_mode_reply_is_stripped_only() {
    let api = StubApi::replying("**Use** a `password manager`. 🔐 It helps.");
    let mut h = harness(api, Some("key"));

    h.session.dispatch(Input::Prompt("passwords?".into()));
    run_until_idle(&mut h.session).await;

    assert_eq!(
        h.session.messages()[1].content,
        "Use a password manager.  It helps."
    );
}

#[tokio::test]
async fn server_error_becomes_inline_error_message() {
    let api = StubApi::with_status(500, "upstream exploded");
    let mut h = harness(api, Some("key"));

    h.session.dispatch(Input::Prompt("What is malware?".into()));
    run_until_idle(&mut h.session).await;

    let messages = h.session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].sender, Sender::Assistant);
    assert!(messages[1].content.starts_with("Error:"));
    assert!(messages[1].content.contains("500"));
    assert!(!h.session.ui().is_busy);
    assert_eq!(h.session.ui().status, Status::Error);
}

#[tokio::test]
async fn malformed_response_becomes_parse_error_message() {
    let api = StubApi::with_status(200, r#"{"candidates":[]}"#);
    let mut h = harness(api, Some("key"));

    h.session.dispatch(Input::Prompt("hello".into()));
    run_until_idle(&mut h.session).await;

    assert!(h.session.messages()[1]
        .content
        .contains("Failed to parse API response"));
    assert!(!h.session.ui().is_busy);
}

#[tokio::test]
async fn second_dispatch_is_refused_while_busy() {
    let api = StubApi::slow("done", Duration::from_millis(50));
    let mut h = harness(api.clone(), Some("key"));

    assert!(h.session.dispatch(Input::Prompt("first".into())).is_some());
    assert!(h.session.dispatch(Input::Prompt("second".into())).is_none());
    assert_eq!(h.session.messages().len(), 1);

    run_until_idle(&mut h.session).await;
    assert_eq!(api.calls(), 1);
    assert!(h.session.dispatch(Input::Prompt("third".into())).is_some());
    run_until_idle(&mut h.session).await;
    assert_eq!(api.calls(), 2);
}

#[tokio::test]
async fn image_input_appends_status_line_only() {
    let api = StubApi::replying("The image looks fine.");
    let mut h = harness(api.clone(), Some("key"));

    h.session.dispatch(Input::Image(StubCapture::png()));
    assert_eq!(h.session.messages().len(), 1);
    assert_eq!(h.session.messages()[0].content, IMAGE_STARTED_MESSAGE);

    run_until_idle(&mut h.session).await;

    let seen = api.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind(), RequestKind::Image);
    assert!(h
        .session
        .messages()
        .iter()
        .all(|message| message.sender == Sender::Assistant));
}

#[tokio::test]
async fn saved_key_only_affects_later_requests() {
    let api = StubApi::slow("ok", Duration::from_millis(30));
    let mut h = harness(api.clone(), Some("old-key"));

    h.session.dispatch(Input::Prompt("first".into()));
    h.session.save_credential("new-key").expect("key should save");
    run_until_idle(&mut h.session).await;

    h.session.dispatch(Input::Prompt("second".into()));
    run_until_idle(&mut h.session).await;

    let keys: Vec<(String, String)> = api
        .seen()
        .iter()
        .map(|request| {
            let prompt = match &request.payload {
                Payload::Prompt(prompt) => prompt.clone(),
                Payload::Image(_) => String::new(),
            };
            (prompt, request.credential.expose().to_string())
        })
        .collect();

    assert!(keys.contains(&("first".to_string(), "old-key".to_string())));
    assert!(keys.contains(&("second".to_string(), "new-key".to_string())));
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_worker() {
    let api = StubApi::slow("finished late", Duration::from_millis(100));
    let mut h = harness(api, Some("key"));

    h.session.dispatch(Input::Prompt("slow one".into()));
    assert_eq!(h.session.workers_in_flight(), 1);

    h.session.shutdown().await;

    assert_eq!(h.session.workers_in_flight(), 0);
    assert!(!h.session.ui().is_busy);
    let last = h.session.messages().last().expect("reply should be applied");
    assert_eq!(last.content, "finished late");
}

#[tokio::test]
async fn message_ids_increase_across_requests_and_clear() {
    let api = StubApi::replying("answer");
    let mut h = harness(api, Some("key"));
    h.session.greet();

    for prompt in ["one", "two"] {
        h.session.dispatch(Input::Prompt(prompt.into()));
        run_until_idle(&mut h.session).await;
    }

    let ids: Vec<_> = h.session.messages().iter().map(|m| m.id).collect();
    assert_eq!(ids.len(), 5);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

    let last_id = *ids.last().expect("ids should not be empty");
    h.session.clear_conversation();
    assert!(h.session.messages().is_empty());

    h.session.dispatch(Input::Prompt("three".into()));
    assert!(h.session.messages()[0].id > last_id);
    run_until_idle(&mut h.session).await;
}

#[tokio::test]
async fn panicking_worker_still_frees_the_session() {
    let collaborators = Collaborators {
        api: Arc::new(PanickingApi),
        capture: StubCapture::working(),
        synthesizer: StubSynthesizer::working(),
        player: Box::new(StubPlayer::default()),
    };
    let (mut session, _dir) = session_with(collaborators, Some("key"));

    session.dispatch(Input::Prompt("hello".into()));
    run_until_idle(&mut session).await;

    assert!(!session.ui().is_busy);
    assert_eq!(session.ui().status, Status::Error);
    let last = session.messages().last().expect("error should be shown");
    assert!(last.content.starts_with("Error:"));

    session.save_credential("other-key").expect("key should save");
    run_until_idle(&mut session).await;
    assert!(matches!(
        session.ui().settings_status,
        Some(SettingsStatus::Failed(_))
    ));

    // The next request is accepted
    assert!(session.dispatch(Input::Prompt("again".into())).is_some());
    run_until_idle(&mut session).await;
}
