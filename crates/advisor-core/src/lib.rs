pub mod ai;
pub mod capture;
pub mod config;
pub mod conversation;
pub mod credential;
pub mod dispatcher;
pub mod postprocess;
pub mod session;
pub mod speech;
pub mod state;

// Re-export main types for convenience
pub use ai::{ApiError, GeminiClient, GenerativeApi, PendingRequest, RequestKind};
pub use capture::{CaptureError, CaptureTarget, DisplayInfo, ScreenCapture, SystemCapture};
pub use config::Config;
pub use conversation::Conversation;
pub use credential::{Credential, CredentialSource, CredentialStore};
pub use dispatcher::{RequestId, WorkerEvent, WorkerOutcome};
pub use postprocess::ThreatVerdict;
pub use session::{Collaborators, Input, Session, SettingsError};
pub use speech::{AudioPlayer, SpeechError, SpeechSynthesizer};
pub use state::{Message, MessageId, Sender, Status, UiState, Verbosity};
