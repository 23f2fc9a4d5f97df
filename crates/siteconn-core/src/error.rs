use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Missing credential data: {0}")]
    MissingCredentialData(String),

    #[error("Authentication mechanism '{0}' has no implementation")]
    UnsupportedMechanism(String),

    #[error("Invalid target '{0}': an absolute URI is required")]
    InvalidTarget(String),

    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: TransportError,
    },

    #[error("Security error for {target}: {reason}")]
    Security { target: String, reason: String },

    #[error("Session for {target} is not ready")]
    NotReady { target: String },

    #[error("A session for {username}@{target} is already registered")]
    DuplicateSession { username: String, target: String },

    #[error("No session has been used yet")]
    NoActiveSession,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

pub type Result<T> = std::result::Result<T, SessionError>;
