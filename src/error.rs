use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error returned by a remote Gmail call.
///
/// `status` carries the HTTP status when the service answered, `None` for
/// transport failures.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
    pub status: Option<u16>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>, status: Option<u16>) -> Self {
        RemoteError {
            message: message.into(),
            status,
        }
    }

    /// Label name refused by the service (system names, invalid characters)
    pub fn is_rejected_label_name(&self) -> bool {
        if self.status != Some(400) {
            return false;
        }
        let message = self.message.to_lowercase();
        message.contains("invalid label name") || message.contains("reserved")
    }

    /// The name already exists on the service side
    pub fn is_conflict(&self) -> bool {
        self.status == Some(409)
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unable to parse archive {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("authentication failed for user {user}: {reason}")]
    Auth { user: String, reason: String },

    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ImportError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ImportError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ImportError::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
