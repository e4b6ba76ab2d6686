use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Name of the entry the API key is stored under in the session file.
pub const CREDENTIAL_KEY_NAME: &str = "gemini_api_key";
/// Keys must be strictly longer than this.
pub const MIN_API_KEY_LENGTH: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("API key is required")]
    Missing,
    #[error("API key looks invalid: expected more than {min} characters")]
    TooShort { min: usize },
    #[error("Failed to access session file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Session file {path} is not valid JSON: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A validated provider credential. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CredentialError::Missing);
        }
        if trimmed.chars().count() <= MIN_API_KEY_LENGTH {
            return Err(CredentialError::TooShort {
                min: MIN_API_KEY_LENGTH,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Replaces every occurrence of the key in `text`.
    pub fn redact(&self, text: &str) -> String {
        text.replace(&self.0, "[redacted]")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([redacted])")
    }
}

/// File-backed credential persistence: loaded on start, cleared on reset.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> CredentialError {
        CredentialError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn read_entries(&self) -> Result<HashMap<String, String>, CredentialError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => return Err(self.io_error(err)),
        };
        if text.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&text).map_err(|source| CredentialError::Format {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn write_entries(&self, entries: &HashMap<String, String>) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
            }
        }
        let text = serde_json::to_string_pretty(entries).map_err(|source| {
            CredentialError::Format {
                path: self.path.display().to_string(),
                source,
            }
        })?;
        fs::write(&self.path, text).map_err(|err| self.io_error(err))
    }

    /// Returns the stored key, or `None` when nothing valid is stored.
    pub fn load(&self) -> Result<Option<ApiKey>, CredentialError> {
        let entries = self.read_entries()?;
        let Some(raw) = entries.get(CREDENTIAL_KEY_NAME) else {
            return Ok(None);
        };
        match ApiKey::parse(raw) {
            Ok(key) => Ok(Some(key)),
            Err(err) => {
                warn!(
                    "Ignoring stored credential in {}: {}",
                    self.path.display(),
                    err
                );
                Ok(None)
            }
        }
    }

    pub fn save(&self, key: &ApiKey) -> Result<(), CredentialError> {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(err @ CredentialError::Format { .. }) => {
                warn!("Replacing unreadable session file: {}", err);
                HashMap::new()
            }
            Err(err) => return Err(err),
        };
        entries.insert(CREDENTIAL_KEY_NAME.to_string(), key.expose().to_string());
        self.write_entries(&entries)?;
        info!("Stored API key in {}", self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CredentialError> {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(CredentialError::Format { .. }) => HashMap::new(),
            Err(err) => return Err(err),
        };
        if entries.remove(CREDENTIAL_KEY_NAME).is_none() && !self.path.exists() {
            return Ok(());
        }
        if entries.is_empty() {
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(self.io_error(err)),
            }
        } else {
            self.write_entries(&entries)?;
        }
        info!("Cleared stored API key from {}", self.path.display());
        Ok(())
    }
}
