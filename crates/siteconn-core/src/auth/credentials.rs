use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::keychain::CredentialStore;
use super::material::AuthMaterial;
use super::resolver::AuthResolvers;
use crate::error::{Result, SessionError};

/// Declared authentication mechanism of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mechanism {
    /// Username and secret presented on every request.
    Basic,
    /// Username and secret exchanged once for a bearer token.
    DerivedToken,
    /// Identity supplied by the host environment.
    Ambient,
}

impl Mechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mechanism::Basic => "basic",
            Mechanism::DerivedToken => "derived-token",
            Mechanism::Ambient => "ambient",
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque secret. Never printed.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An identity, its optional secret, and the mechanism used to authenticate it.
///
/// Sessions only ever read a credential. Resolved auth material is memoized
/// on first use and reused for every target until [`Credential::invalidate`].
pub struct Credential {
    username: String,
    secret: Option<Secret>,
    mechanism: Mechanism,
    resolved: Mutex<Option<Arc<AuthMaterial>>>,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: Option<Secret>, mechanism: Mechanism) -> Self {
        Self {
            username: username.into(),
            secret,
            mechanism,
            resolved: Mutex::new(None),
        }
    }

    pub fn basic(username: impl Into<String>, secret: impl Into<Secret>) -> Self {
        Self::new(username, Some(secret.into()), Mechanism::Basic)
    }

    pub fn derived_token(username: impl Into<String>, secret: impl Into<Secret>) -> Self {
        Self::new(username, Some(secret.into()), Mechanism::DerivedToken)
    }

    pub fn ambient(username: impl Into<String>) -> Self {
        Self::new(username, None, Mechanism::Ambient)
    }

    /// Read back a credential saved with [`CredentialStore::save`].
    pub fn from_keychain(username: &str) -> anyhow::Result<Self> {
        CredentialStore::for_user(username)?.load()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> Option<&Secret> {
        self.secret.as_ref()
    }

    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    pub fn validate(&self, require_secret: bool) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(SessionError::MissingCredentialData(
                "username is empty".to_string(),
            ));
        }
        if require_secret && self.secret.as_ref().map_or(true, Secret::is_empty) {
            return Err(SessionError::MissingCredentialData(format!(
                "no secret for '{}'",
                self.username
            )));
        }
        Ok(())
    }

    /// Resolve auth material for `target`, deriving it at most once.
    pub async fn resolve(&self, target: &Url, resolvers: &AuthResolvers) -> Result<Arc<AuthMaterial>> {
        let mut resolved = self.resolved.lock().await;
        if let Some(material) = resolved.as_ref() {
            return Ok(Arc::clone(material));
        }

        let material = Arc::new(resolvers.resolve(self, target).await?);
        debug!(
            username = %self.username,
            mechanism = %self.mechanism,
            kind = material.kind(),
            "Resolved auth material"
        );
        *resolved = Some(Arc::clone(&material));
        Ok(material)
    }

    /// Drop memoized auth material so the next resolve derives it again.
    pub async fn invalidate(&self) {
        self.resolved.lock().await.take();
    }

    pub async fn is_resolved(&self) -> bool {
        self.resolved.lock().await.is_some()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &self.secret)
            .field("mechanism", &self.mechanism)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Url {
        Url::parse("https://contoso.example/sites/a").unwrap()
    }

    #[test]
    fn test_validate_requires_username() {
        let cred = Credential::basic("  ", "pw");
        assert!(matches!(
            cred.validate(false),
            Err(SessionError::MissingCredentialData(_))
        ));
    }

    #[test]
    fn test_validate_secret_only_when_required() {
        let cred = Credential::new("svc", None, Mechanism::Basic);
        assert!(cred.validate(false).is_ok());
        assert!(matches!(
            cred.validate(true),
            Err(SessionError::MissingCredentialData(_))
        ));

        let empty = Credential::new("svc", Some(Secret::new("")), Mechanism::Basic);
        assert!(empty.validate(true).is_err());

        assert!(Credential::basic("svc", "pw").validate(true).is_ok());
    }

    #[test]
    fn test_mechanism_serde_names() {
        let json = serde_json::to_string(&Mechanism::DerivedToken).unwrap();
        assert_eq!(json, "\"derived-token\"");
        let parsed: Mechanism = serde_json::from_str("\"ambient\"").unwrap();
        assert_eq!(parsed, Mechanism::Ambient);
        assert_eq!(Mechanism::Basic.to_string(), "basic");
    }

    #[test]
    fn test_debug_hides_secret() {
        let cred = Credential::basic("svc", "hunter2");
        let rendered = format!("{:?}", cred);
        assert!(rendered.contains("svc"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_resolve_is_memoized() {
        let cred = Credential::basic("svc", "pw");
        let resolvers = AuthResolvers::new();
        assert!(!cred.is_resolved().await);

        let first = cred.resolve(&target(), &resolvers).await.unwrap();
        let other_target = Url::parse("https://contoso.example/sites/b").unwrap();
        let second = cred.resolve(&other_target, &resolvers).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cred.is_resolved().await);

        cred.invalidate().await;
        assert!(!cred.is_resolved().await);
        let third = cred.resolve(&target(), &resolvers).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn test_resolve_basic_material() {
        let cred = Credential::basic("svc", "pw");
        let material = cred.resolve(&target(), &AuthResolvers::new()).await.unwrap();
        match material.as_ref() {
            AuthMaterial::Basic { username, password } => {
                assert_eq!(username, "svc");
                assert_eq!(password, "pw");
            }
            other => panic!("unexpected material {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_unsupported_mechanism() {
        let cred = Credential::derived_token("svc", "pw");
        let err = cred.resolve(&target(), &AuthResolvers::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::UnsupportedMechanism(ref m) if m == "derived-token"));
        assert!(!cred.is_resolved().await);
    }

    #[tokio::test]
    async fn test_failed_resolve_is_not_memoized() {
        let cred = Credential::new("", None, Mechanism::Basic);
        let resolvers = AuthResolvers::new();
        assert!(cred.resolve(&target(), &resolvers).await.is_err());
        assert!(!cred.is_resolved().await);
    }
}
