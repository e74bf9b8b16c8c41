//! The application context: one conversation, one credential, one set of UI
//! flags, created at startup and torn down at shutdown.
//!
//! All mutation happens on the task that owns the [`Session`]. Workers only
//! send [`WorkerEvent`]s, which the owner drains with [`Session::next_event`]
//! and applies with [`Session::apply`].

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};

use crate::ai::{ApiError, GeminiClient, GenerativeApi, PendingRequest};
use crate::capture::{self, CaptureError, CaptureTarget, DisplayInfo, ScreenCapture, SystemCapture};
use crate::config::Config;
use crate::conversation::Conversation;
use crate::credential::{Credential, CredentialSource, CredentialStore};
use crate::dispatcher::{Dispatcher, RequestId, WorkerEvent, WorkerOutcome};
use crate::postprocess::{self, ThreatVerdict};
use crate::speech::{
    AudioPlayer, CommandSynthesizer, ProcessAudioPlayer, SpeechSynthesizer, VoiceCommands,
};
use crate::state::{
    Message, MessageId, Notification, NotificationLevel, Sender, SettingsStatus, Status, UiState, Verbosity,
};

pub const WELCOME_MESSAGE: &str = "Welcome! I'm your Cybersecurity Advisor. I can help you understand \
online threats, secure your digital life, and protect yourself from scams and malware. What would you \
like to know about cybersecurity today?";
pub const MISSING_KEY_MESSAGE: &str = "Please set your Gemini API key in the settings panel first";
pub const SCAN_STARTED_MESSAGE: &str = "Taking screenshot of your screen for security analysis...";
pub const IMAGE_STARTED_MESSAGE: &str = "Analyzing your image for security threats...";
pub const CONNECTION_VERIFIED_MESSAGE: &str =
    "API connection verified. You can now chat with me about cybersecurity topics!";

/// What the user asked for
#[derive(Debug, Clone)]
pub enum Input {
    Prompt(String),
    /// PNG bytes to analyse
    Image(Vec<u8>),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("API key cannot be empty")]
    EmptyKey,
    #[error("Could not save API key: {0}")]
    Persist(String),
}

/// The external pieces a session talks to
pub struct Collaborators {
    pub api: Arc<dyn GenerativeApi>,
    pub capture: Arc<dyn ScreenCapture>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub player: Box<dyn AudioPlayer>,
}

impl Collaborators {
    /// Gemini over HTTP, the system screen and the platform speech programs
    pub fn system(config: &Config) -> anyhow::Result<Self> {
        let voice = VoiceCommands::detect();
        let speech_dir = std::env::temp_dir().join("cyber-advisor");

        Ok(Self {
            api: Arc::new(GeminiClient::new(config)?),
            capture: Arc::new(SystemCapture::new()),
            synthesizer: Arc::new(CommandSynthesizer::new(&voice, speech_dir)),
            player: Box::new(ProcessAudioPlayer::new(voice.play)),
        })
    }
}

pub struct Session {
    conversation: Conversation,
    credential: Option<Credential>,
    credential_source: CredentialSource,
    store: CredentialStore,
    ui: UiState,
    dispatcher: Dispatcher,
    capture: Arc<dyn ScreenCapture>,
    player: Box<dyn AudioPlayer>,
    events: UnboundedReceiver<WorkerEvent>,
    /// The one conversation request allowed in flight
    in_flight: Option<RequestId>,
    connection_test: Option<RequestId>,
    closing: bool,
}

impl Session {
    pub fn new(config: &Config, store: CredentialStore, collaborators: Collaborators) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (credential, credential_source) = store.load();
        info!(source = credential_source.as_str(), "credential loaded");

        let dispatcher = Dispatcher::new(
            collaborators.api,
            Arc::clone(&collaborators.capture),
            collaborators.synthesizer,
            tx,
        );

        let ui = UiState {
            voice_enabled: config.voice_enabled,
            verbosity: config.verbosity,
            ..UiState::default()
        };

        Self {
            conversation: Conversation::new(),
            credential,
            credential_source,
            store,
            ui,
            dispatcher,
            capture: collaborators.capture,
            player: collaborators.player,
            events: rx,
            in_flight: None,
            connection_test: None,
            closing: false,
        }
    }

    /// Replace the delay between hiding the UI and taking a screenshot
    pub fn with_settle_delay(mut self, delay: std::time::Duration) -> Self {
        self.dispatcher = self.dispatcher.with_settle_delay(delay);
        self
    }

    pub fn greet(&mut self) {
        self.conversation.append(Sender::Assistant, WELCOME_MESSAGE);
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.list()
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn credential_source(&self) -> CredentialSource {
        self.credential_source
    }

    pub fn credential_path(&self) -> &std::path::Path {
        self.store.path()
    }

    /// Number of workers whose final event has not been applied yet
    pub fn workers_in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Start one request for the input, returning its id.
    ///
    /// Returns `None` without contacting the API when the input is blank,
    /// when no API key is configured (the user is told how to fix that), or
    /// while another conversation request is still running.
    pub fn dispatch(&mut self, input: Input) -> Option<RequestId> {
        if let Input::Prompt(prompt) = &input {
            if prompt.trim().is_empty() {
                return None;
            }
        }

        let credential = self.require_credential()?;
        if self.ui.is_busy {
            return None;
        }

        let request = match input {
            Input::Prompt(prompt) => {
                let prompt = prompt.trim().to_string();
                self.conversation.append(Sender::User, prompt.clone());
                self.ui.status = Status::Processing;
                PendingRequest::prompt(&prompt, credential)
            }
            Input::Image(png) => {
                self.conversation.append(Sender::Assistant, IMAGE_STARTED_MESSAGE);
                self.ui.status = Status::AnalyzingScreenshot;
                PendingRequest::image(capture::to_base64(&png), credential)
            }
        };

        let id = self.dispatcher.spawn_request(request);
        self.begin(id);
        Some(id)
    }

    /// Capture the screen in the background and have it analysed
    pub fn scan_screen(&mut self, target: CaptureTarget) -> Option<RequestId> {
        let credential = self.require_credential()?;
        if self.ui.is_busy {
            return None;
        }

        self.conversation.append(Sender::Assistant, SCAN_STARTED_MESSAGE);
        self.ui.status = Status::TakingScreenshot;
        self.ui.capturing = true;

        let id = self.dispatcher.spawn_scan(target, credential);
        self.begin(id);
        Some(id)
    }

    pub fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        self.capture.displays()
    }

    /// Store a new API key and test it in the background.
    ///
    /// The key is used for subsequent requests even when writing the key
    /// file fails; the error is returned so the caller can report it.
    pub fn save_credential(&mut self, key: &str) -> Result<(), SettingsError> {
        let Some(credential) = Credential::new(key) else {
            self.ui.settings_status = Some(SettingsStatus::Failed(SettingsError::EmptyKey.to_string()));
            return Err(SettingsError::EmptyKey);
        };

        self.credential = Some(credential.clone());
        self.credential_source = CredentialSource::File;

        if let Err(e) = self.store.save(&credential) {
            warn!("failed to persist API key: {:#}", e);
            let error = SettingsError::Persist(format!("{:#}", e));
            self.ui.settings_status = Some(SettingsStatus::Failed(error.to_string()));
            return Err(error);
        }

        self.ui.settings_status = Some(SettingsStatus::Testing);
        self.connection_test = Some(self.dispatcher.spawn_connection_test(credential));
        Ok(())
    }

    /// Show a local message from the assistant without contacting the API
    pub fn notice(&mut self, text: impl Into<String>) -> MessageId {
        self.conversation.append(Sender::Assistant, text)
    }

    pub fn clear_conversation(&mut self) {
        self.conversation.clear();
    }

    pub fn toggle_voice(&mut self) -> bool {
        self.ui.voice_enabled = !self.ui.voice_enabled;
        if !self.ui.voice_enabled {
            self.player.stop();
        }
        self.ui.voice_enabled
    }

    pub fn toggle_verbosity(&mut self) -> Verbosity {
        self.ui.verbosity = self.ui.verbosity.toggled();
        self.ui.verbosity
    }

    pub fn stop_audio(&mut self) -> bool {
        self.player.stop()
    }

    pub fn is_audio_playing(&mut self) -> bool {
        self.player.is_playing()
    }

    /// Returns and clears the "show the API key dialog" request
    pub fn take_settings_request(&mut self) -> bool {
        std::mem::take(&mut self.ui.settings_requested)
    }

    pub fn dismiss_settings_status(&mut self) {
        self.ui.settings_status = None;
    }

    pub fn dismiss_notification(&mut self) {
        self.ui.notification = None;
    }

    /// Expire timed UI elements
    pub fn tick(&mut self, now: Instant) {
        if self
            .ui
            .notification
            .as_ref()
            .is_some_and(|notification| notification.is_expired(now))
        {
            self.ui.notification = None;
        }
    }

    /// Wait for the next worker event
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Apply every event that is already queued, without waiting
    pub fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    pub fn apply(&mut self, event: WorkerEvent) {
        let WorkerEvent { id, outcome } = event;
        if outcome.is_final() {
            self.finish(id);
        }

        match outcome {
            WorkerOutcome::Reply(result) => self.apply_reply(result),
            WorkerOutcome::ScanReply(result) => self.apply_scan(result),
            WorkerOutcome::CaptureReleased => {
                self.ui.capturing = false;
                if self.ui.status == Status::TakingScreenshot {
                    self.ui.status = Status::AnalyzingScreenshot;
                }
            }
            WorkerOutcome::CaptureFailed(error) => {
                self.ui.capturing = false;
                self.ui.status = Status::Error;
                self.conversation
                    .append(Sender::Assistant, format!("Error taking screenshot: {}", error));
            }
            WorkerOutcome::ConnectionChecked(result) => {
                if self.connection_test == Some(id) {
                    self.connection_test = None;
                }
                match result {
                    Ok(()) => {
                        self.ui.settings_status = Some(SettingsStatus::Verified);
                        self.conversation
                            .append(Sender::Assistant, CONNECTION_VERIFIED_MESSAGE);
                    }
                    Err(e) => {
                        self.ui.settings_status =
                            Some(SettingsStatus::Failed(format!("Connection failed: {}", e)));
                    }
                }
            }
            WorkerOutcome::Speech(result) => {
                let played = result.and_then(|path| {
                    if self.ui.voice_enabled && !self.closing {
                        self.player.start(&path)
                    } else {
                        Ok(())
                    }
                });
                if let Err(e) = played {
                    warn!("voice output failed: {}", e);
                    self.conversation
                        .append(Sender::Assistant, format!("Voice output failed: {}", e));
                }
            }
        }
    }

    /// Wait for all workers, apply what they sent, and stop playback.
    pub async fn shutdown(&mut self) {
        self.closing = true;
        self.dispatcher.join_all().await;
        self.apply_pending();
        self.player.stop();
        info!("session closed");
    }

    fn require_credential(&mut self) -> Option<Credential> {
        match &self.credential {
            Some(credential) => Some(credential.clone()),
            None => {
                self.conversation.append(Sender::Assistant, MISSING_KEY_MESSAGE);
                self.ui.settings_requested = true;
                None
            }
        }
    }

    fn begin(&mut self, id: RequestId) {
        self.in_flight = Some(id);
        self.ui.is_busy = true;
    }

    fn finish(&mut self, id: RequestId) {
        self.dispatcher.finish(id);
        if self.in_flight == Some(id) {
            self.in_flight = None;
            self.ui.is_busy = false;
        }
    }

    fn apply_reply(&mut self, result: Result<String, ApiError>) {
        match result {
            Ok(raw) => {
                let text = postprocess::process(&raw, self.ui.verbosity);
                self.ui.status = Status::Ready;
                self.conversation.append(Sender::Assistant, text.clone());
                self.speak(text);
            }
            Err(e) => {
                self.ui.status = Status::Error;
                self.conversation
                    .append(Sender::Assistant, format!("Error: {}", e));
            }
        }
    }

    fn apply_scan(&mut self, result: Result<String, ApiError>) {
        match result {
            Ok(raw) => {
                // Judge what the model said, before any glossary text is added
                let verdict = postprocess::classify_threat(&postprocess::strip_markdown(&raw));
                let text = postprocess::process(&raw, self.ui.verbosity);
                let (title, message) = verdict.notification();
                let level = match verdict {
                    ThreatVerdict::Alert => NotificationLevel::Alert,
                    ThreatVerdict::Clear => NotificationLevel::Clear,
                };

                self.ui.status = Status::Ready;
                self.ui.notification = Some(Notification::new(title, message, level));
                self.conversation
                    .append(Sender::Assistant, format!("{}{}", verdict.prefix(), text));
                self.speak(text);
            }
            Err(e) => {
                self.ui.status = Status::Error;
                self.conversation
                    .append(Sender::Assistant, format!("Error analyzing screenshot: {}", e));
            }
        }
    }

    fn speak(&mut self, text: String) {
        if self.ui.voice_enabled && !self.closing && !text.is_empty() {
            self.dispatcher.spawn_speech(text);
        }
    }
}
