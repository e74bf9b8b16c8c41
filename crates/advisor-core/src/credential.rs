use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// The API key. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for blank keys
    pub fn new(key: &str) -> Option<Self> {
        let key = key.trim();
        if key.is_empty() {
            None
        } else {
            Some(Self(key.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Where the active key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Env,
    File,
    Missing,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::Env => "env",
            CredentialSource::File => "file",
            CredentialSource::Missing => "missing",
        }
    }
}

/// Plaintext key file plus the environment override
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    env_var: Option<String>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env_var: Some(API_KEY_ENV.to_string()),
        }
    }

    /// A store that only looks at the file, for tests and sandboxed runs
    pub fn file_only(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            env_var: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the environment first, then the file
    pub fn load(&self) -> (Option<Credential>, CredentialSource) {
        if let Some(key) = self
            .env_var
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .and_then(|value| Credential::new(&value))
        {
            return (Some(key), CredentialSource::Env);
        }

        match fs::read_to_string(&self.path) {
            Ok(contents) => match Credential::new(&contents) {
                Some(key) => (Some(key), CredentialSource::File),
                None => (None, CredentialSource::Missing),
            },
            Err(_) => (None, CredentialSource::Missing),
        }
    }

    pub fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        fs::write(&self.path, credential.expose())
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}
