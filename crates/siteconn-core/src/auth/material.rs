use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Buffer before expiry at which a token is considered due for refresh (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Bearer token issued by a token endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenData {
    pub token: String,
    pub username: String,
    pub issued_at: DateTime<Utc>,
    /// Lifetime reported by the issuer, in seconds.
    pub expires_in: Option<i64>,
}

impl TokenData {
    pub fn new(token: String, username: String, expires_in: Option<i64>) -> Self {
        Self {
            token,
            username,
            issued_at: Utc::now(),
            expires_in,
        }
    }

    fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| self.issued_at + Duration::seconds(secs))
    }

    pub fn is_expired(&self) -> bool {
        self.expiry().map(|e| Utc::now() > e).unwrap_or(false)
    }

    /// Check if the token will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        self.expiry()
            .map(|e| Utc::now() > e - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES))
            .unwrap_or(false)
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.expiry()
            .map(|e| (e - Utc::now()).num_minutes().max(0))
    }
}

impl fmt::Debug for TokenData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenData")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Concrete authentication material a transport presents to a site.
#[derive(Clone)]
pub enum AuthMaterial {
    Basic { username: String, password: String },
    Bearer(TokenData),
    /// Identity supplied by the host environment; `token` is forwarded when present.
    Ambient { token: Option<String> },
}

impl AuthMaterial {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthMaterial::Basic { .. } => "basic",
            AuthMaterial::Bearer(_) => "bearer",
            AuthMaterial::Ambient { .. } => "ambient",
        }
    }
}

impl fmt::Debug for AuthMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMaterial::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            AuthMaterial::Bearer(token) => f.debug_tuple("Bearer").field(token).finish(),
            AuthMaterial::Ambient { token } => f
                .debug_struct("Ambient")
                .field("token", &token.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}
