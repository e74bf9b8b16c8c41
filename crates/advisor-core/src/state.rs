//! UI-agnostic application state types
//!
//! These types are shared between the core session and whatever renders it.
//! None of them depend on a specific UI framework.

use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// How long a scan notification stays on screen.
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(5);

/// Identifier of a message, unique and strictly increasing within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub u64);

/// A chat message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub content: String,
    pub timestamp: String,
}

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn display_name(&self) -> &'static str {
        match self {
            Sender::User => "You",
            Sender::Assistant => "Cybersecurity Advisor",
        }
    }
}

/// How much of a response is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    Short,
    #[default]
    Full,
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Short => "short",
            Verbosity::Full => "full",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Verbosity::Short => Verbosity::Full,
            Verbosity::Full => Verbosity::Short,
        }
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "short" => Ok(Verbosity::Short),
            "full" => Ok(Verbosity::Full),
            other => Err(format!("unknown verbosity: {}", other)),
        }
    }
}

/// Status bar text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Ready,
    Processing,
    TakingScreenshot,
    AnalyzingScreenshot,
    Error,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Ready => "Ready",
            Status::Processing => "Processing...",
            Status::TakingScreenshot => "Taking screenshot...",
            Status::AnalyzingScreenshot => "Analyzing screenshot...",
            Status::Error => "Error",
        }
    }
}

/// Outcome of the API key dialog's save-and-test action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsStatus {
    Testing,
    Verified,
    Failed(String),
}

impl SettingsStatus {
    pub fn message(&self) -> &str {
        match self {
            SettingsStatus::Testing => "Testing connection...",
            SettingsStatus::Verified => "Connection successful!",
            SettingsStatus::Failed(reason) => reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Alert,
    Clear,
}

/// Transient popup raised after a screen scan
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub level: NotificationLevel,
    pub raised_at: Instant,
}

impl Notification {
    pub fn new(title: &str, message: &str, level: NotificationLevel) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            level,
            raised_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.raised_at) >= NOTIFICATION_TTL
    }
}

/// Flags read by the renderer and the response post-processor.
///
/// Only the UI task mutates these, either directly from user actions or while
/// applying worker events.
#[derive(Debug, Clone, Default)]
pub struct UiState {
    pub is_busy: bool,
    /// Set while a screenshot is being taken so the renderer can hide the chat.
    pub capturing: bool,
    pub voice_enabled: bool,
    pub verbosity: Verbosity,
    pub status: Status,
    pub notification: Option<Notification>,
    /// Set when the user must be shown the API key dialog.
    pub settings_requested: bool,
    pub settings_status: Option<SettingsStatus>,
}
