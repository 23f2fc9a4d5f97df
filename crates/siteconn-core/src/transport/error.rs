use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - credentials rejected")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl TransportError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => TransportError::Unauthorized,
            403 => TransportError::AccessDenied(truncated),
            404 => TransportError::NotFound(truncated),
            429 => TransportError::RateLimited,
            500..=599 => TransportError::ServerError(truncated),
            _ => TransportError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether the remote end refused the presented credentials.
    pub fn is_auth_denied(&self) -> bool {
        matches!(self, TransportError::Unauthorized | TransportError::AccessDenied(_))
    }
}

/// Outcome classes of a connection probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Authorization denied by remote site")]
    AuthDenied,

    #[error("Identity provider rejected the account: {0}")]
    UnrecoverableIdentity(String),

    #[error(transparent)]
    Other(#[from] TransportError),
}
