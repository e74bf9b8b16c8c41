//! Stub collaborators shared by the session integration tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use advisor_core::ai::gemini::parse_response;
use advisor_core::capture::{encode_png, CaptureError, CaptureTarget, DisplayInfo, ScreenCapture};
use advisor_core::speech::{AudioPlayer, SpeechError, SpeechSynthesizer};
use advisor_core::{ApiError, Collaborators, Config, CredentialStore, GenerativeApi, PendingRequest, Session};
use futures_util::future::{BoxFuture, FutureExt};
use tempfile::TempDir;

/// Wraps `text` in a successful `generateContent` response body
#[allow(dead_code)]
pub fn gemini_body(text: &str) -> String {
    serde_json::json!({
        "candidates": [{"content": {"parts": [{"text": text}]}}]
    })
    .to_string()
}

/// API stub answering every call with the same HTTP status and body
pub struct StubApi {
    status: u16,
    body: String,
    delay: Duration,
    calls: AtomicUsize,
    seen: Mutex<Vec<PendingRequest>>,
}

#[allow(dead_code)]
impl StubApi {
    pub fn replying(text: &str) -> Arc<Self> {
        Self::with_status(200, &gemini_body(text))
    }

    pub fn with_status(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(text: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            status: 200,
            body: gemini_body(text),
            delay,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<PendingRequest> {
        self.seen.lock().expect("seen lock should work").clone()
    }
}

impl GenerativeApi for StubApi {
    fn generate(&self, request: PendingRequest) -> BoxFuture<'static, Result<String, ApiError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().expect("seen lock should work").push(request);

        let status = self.status;
        let body = self.body.clone();
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            parse_response(status, &body)
        }
        .boxed()
    }
}

/// API stub whose future panics when polled
#[allow(dead_code)]
pub struct PanickingApi;

impl GenerativeApi for PanickingApi {
    fn generate(&self, _request: PendingRequest) -> BoxFuture<'static, Result<String, ApiError>> {
        async move { panic!("generative API blew up") }.boxed()
    }
}

/// Capture stub returning a tiny PNG, or failing
pub struct StubCapture {
    fail: bool,
}

#[allow(dead_code)]
impl StubCapture {
    pub fn working() -> Arc<Self> {
        Arc::new(Self { fail: false })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { fail: true })
    }

    pub fn png() -> Vec<u8> {
        encode_png(1, 1, vec![10, 20, 30, 255]).expect("1x1 png should encode")
    }
}

impl ScreenCapture for StubCapture {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        Ok(vec![DisplayInfo {
            index: 0,
            name: "Display 1".to_string(),
            width: 1,
            height: 1,
            is_primary: true,
        }])
    }

    fn capture_png(&self, _target: CaptureTarget) -> Result<Vec<u8>, CaptureError> {
        if self.fail {
            Err(CaptureError::Backend("permission denied".to_string()))
        } else {
            Ok(Self::png())
        }
    }
}

pub struct StubSynthesizer {
    fail: bool,
    spoken: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl StubSynthesizer {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            spoken: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            spoken: Mutex::new(Vec::new()),
        })
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().expect("spoken lock should work").clone()
    }
}

impl SpeechSynthesizer for StubSynthesizer {
    fn synthesize(&self, text: &str) -> Result<PathBuf, SpeechError> {
        self.spoken
            .lock()
            .expect("spoken lock should work")
            .push(text.to_string());
        if self.fail {
            Err(SpeechError::Failed {
                program: "stub-tts".to_string(),
                status: "exit status: 1".to_string(),
            })
        } else {
            Ok(PathBuf::from("speech.wav"))
        }
    }
}

/// Records the files it was asked to play
#[derive(Clone, Default)]
pub struct StubPlayer {
    pub played: Arc<Mutex<Vec<PathBuf>>>,
    playing: Arc<Mutex<bool>>,
}

impl AudioPlayer for StubPlayer {
    fn start(&mut self, file: &Path) -> Result<(), SpeechError> {
        self.played
            .lock()
            .expect("played lock should work")
            .push(file.to_path_buf());
        *self.playing.lock().expect("playing lock should work") = true;
        Ok(())
    }

    fn stop(&mut self) -> bool {
        std::mem::take(&mut *self.playing.lock().expect("playing lock should work"))
    }

    fn is_playing(&mut self) -> bool {
        *self.playing.lock().expect("playing lock should work")
    }
}

/// Everything a test needs to drive a session
pub struct Harness {
    pub session: Session,
    pub api: Arc<StubApi>,
    pub synthesizer: Arc<StubSynthesizer>,
    pub player: StubPlayer,
    pub dir: TempDir,
}

#[allow(dead_code)]
pub fn harness(api: Arc<StubApi>, key: Option<&str>) -> Harness {
    harness_with(api, StubCapture::working(), StubSynthesizer::working(), key)
}

pub fn harness_with(
    api: Arc<StubApi>,
    capture: Arc<StubCapture>,
    synthesizer: Arc<StubSynthesizer>,
    key: Option<&str>,
) -> Harness {
    let player = StubPlayer::default();
    let collaborators = Collaborators {
        api: api.clone(),
        capture,
        synthesizer: synthesizer.clone(),
        player: Box::new(player.clone()),
    };
    let (session, dir) = session_with(collaborators, key);

    Harness {
        session,
        api,
        synthesizer,
        player,
        dir,
    }
}

/// A session over arbitrary collaborators, with its key file in a temp dir
#[allow(dead_code)]
pub fn session_with(collaborators: Collaborators, key: Option<&str>) -> (Session, TempDir) {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let key_path = dir.path().join("api_key.txt");
    if let Some(key) = key {
        std::fs::write(&key_path, key).expect("key file should be written");
    }

    let session = Session::new(
        &Config::new(),
        CredentialStore::file_only(key_path),
        collaborators,
    )
    .with_settle_delay(Duration::ZERO);
    (session, dir)
}

/// Apply worker events until no worker is left
#[allow(dead_code)]
pub async fn run_until_idle(session: &mut Session) {
    while session.workers_in_flight() > 0 {
        let event = tokio::time::timeout(Duration::from_secs(5), session.next_event())
            .await
            .expect("worker should report within 5s")
            .expect("event channel should stay open");
        session.apply(event);
    }
}
