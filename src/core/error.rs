use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpaceError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Corrupt payload in slot '{slot}': {reason}")]
    StorageCorruption { slot: String, reason: String },
    #[error("Remote mirror unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("{message}")]
    QuotaExceeded {
        code: &'static str,
        message: String,
        limit: Option<u64>,
        used: Option<u64>,
    },
    #[error("{message}")]
    FeatureDisabled { code: &'static str, message: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl SpaceError {
    /// Machine-readable code for entitlement failures, `None` for every other class.
    pub fn entitlement_code(&self) -> Option<&'static str> {
        match self {
            Self::QuotaExceeded { code, .. } | Self::FeatureDisabled { code, .. } => Some(code),
            _ => None,
        }
    }
}
