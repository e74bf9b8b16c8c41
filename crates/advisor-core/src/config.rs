use std::path::PathBuf;
use std::time::Duration;

use crate::state::Verbosity;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Runtime settings.
///
/// Nothing here is written back to disk; the API key file is the only state
/// that survives a restart.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub model: String,
    pub request_timeout: Duration,
    pub credential_path: PathBuf,
    pub voice_enabled: bool,
    pub verbosity: Verbosity,
}

impl Config {
    pub fn new() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: REQUEST_TIMEOUT,
            credential_path: Self::default_credential_path(),
            voice_enabled: false,
            verbosity: Verbosity::default(),
        }
    }

    /// Defaults overridden by `ADVISOR_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Ok(base) = std::env::var("ADVISOR_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Ok(model) = std::env::var("ADVISOR_MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("ADVISOR_CREDENTIAL_FILE") {
            config.credential_path = PathBuf::from(path);
        }
        if let Ok(voice) = std::env::var("ADVISOR_VOICE") {
            config.voice_enabled = matches!(voice.trim(), "1" | "true" | "on" | "yes");
        }
        if let Some(verbosity) = std::env::var("ADVISOR_VERBOSITY")
            .ok()
            .and_then(|v| v.parse::<Verbosity>().ok())
        {
            config.verbosity = verbosity;
        }

        config
    }

    /// `<config_dir>/cyber-advisor/api_key.txt`, or the working directory
    /// when the platform has no config directory
    fn default_credential_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("cyber-advisor").join("api_key.txt"))
            .unwrap_or_else(|| PathBuf::from("api_key.txt"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
