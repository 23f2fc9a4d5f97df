use std::time::Duration;

use reqwest::{header, Client};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::credentials::{Credential, Mechanism};
use super::material::{AuthMaterial, TokenData};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::transport::TransportError;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
    #[serde(rename = "expiresIn")]
    expires_in: Option<i64>,
}

/// Exchanges a username and secret for a bearer token at a token endpoint.
#[derive(Clone)]
pub struct TokenExchange {
    client: Client,
    endpoint: Url,
}

impl TokenExchange {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::from)?;
        Ok(Self { client, endpoint })
    }

    /// Create an exchange that reuses an existing client's connection pool.
    pub fn with_client(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn exchange(&self, credential: &Credential, target: &Url) -> Result<TokenData> {
        let secret = credential.secret().map(|s| s.expose()).unwrap_or_default();
        let connect_err = |source: TransportError| SessionError::Connect {
            target: target.to_string(),
            source,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("username", credential.username()),
                ("password", secret),
                ("resource", target.as_str()),
            ])
            .send()
            .await
            .map_err(|e| connect_err(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(endpoint = %self.endpoint, status = %status, "Token exchange rejected");
            return Err(connect_err(TransportError::from_status(status, &body)));
        }

        let parsed: TokenResponse = response.json().await.map_err(|e| {
            connect_err(TransportError::InvalidResponse(format!(
                "token response from {}: {}",
                self.endpoint, e
            )))
        })?;
        debug!(endpoint = %self.endpoint, username = credential.username(), "Token issued");

        Ok(TokenData::new(
            parsed.token,
            credential.username().to_string(),
            parsed.expires_in,
        ))
    }
}

/// Where ambient credentials pick up their token, if anywhere.
#[derive(Debug, Clone, Default)]
pub struct AmbientSource {
    env_var: Option<String>,
}

impl AmbientSource {
    /// Forward the token found in environment variable `var`, when set.
    pub fn env(var: impl Into<String>) -> Self {
        Self {
            env_var: Some(var.into()),
        }
    }

    /// Present no token; the transport relies on the host's own identity.
    pub fn none() -> Self {
        Self::default()
    }

    fn material(&self) -> AuthMaterial {
        let token = self
            .env_var
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty());
        AuthMaterial::Ambient { token }
    }
}

/// Per-mechanism auth material derivation.
///
/// Basic is always available and tolerates a missing secret (sent as an
/// empty password). Derived-token and ambient credentials resolve
/// only when their collaborator is configured, otherwise they fail with
/// `UnsupportedMechanism`.
#[derive(Clone, Default)]
pub struct AuthResolvers {
    token_exchange: Option<TokenExchange>,
    ambient: Option<AmbientSource>,
}

impl AuthResolvers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let mut resolvers = Self::new().with_ambient(AmbientSource::env(&config.ambient_token_env));
        if let Some(ref endpoint) = config.token_endpoint {
            let endpoint = Url::parse(endpoint)
                .map_err(|_| SessionError::InvalidTarget(endpoint.clone()))?;
            resolvers = resolvers.with_token_exchange(TokenExchange::new(endpoint, config.request_timeout())?);
        }
        Ok(resolvers)
    }

    pub fn with_token_exchange(mut self, exchange: TokenExchange) -> Self {
        self.token_exchange = Some(exchange);
        self
    }

    pub fn with_ambient(mut self, source: AmbientSource) -> Self {
        self.ambient = Some(source);
        self
    }

    pub fn supports(&self, mechanism: Mechanism) -> bool {
        match mechanism {
            Mechanism::Basic => true,
            Mechanism::DerivedToken => self.token_exchange.is_some(),
            Mechanism::Ambient => self.ambient.is_some(),
        }
    }

    pub(crate) async fn resolve(&self, credential: &Credential, target: &Url) -> Result<AuthMaterial> {
        let unsupported = || SessionError::UnsupportedMechanism(credential.mechanism().to_string());

        match credential.mechanism() {
            Mechanism::Basic => {
                credential.validate(false)?;
                let password = credential.secret().map(|s| s.expose().to_string()).unwrap_or_default();
                Ok(AuthMaterial::Basic {
                    username: credential.username().to_string(),
                    password,
                })
            }
            Mechanism::DerivedToken => {
                let exchange = self.token_exchange.as_ref().ok_or_else(unsupported)?;
                credential.validate(true)?;
                Ok(AuthMaterial::Bearer(exchange.exchange(credential, target).await?))
            }
            Mechanism::Ambient => {
                let source = self.ambient.as_ref().ok_or_else(unsupported)?;
                credential.validate(false)?;
                Ok(source.material())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn target() -> Url {
        Url::parse("https://contoso.example/sites/a").unwrap()
    }

    fn exchange(server: &MockServer) -> TokenExchange {
        let client = Client::builder().no_proxy().build().expect("Failed to create HTTP client");
        let endpoint = Url::parse(&format!("{}/token", server.uri())).unwrap();
        TokenExchange::with_client(client, endpoint)
    }

    #[test]
    fn test_supports() {
        let resolvers = AuthResolvers::new();
        assert!(resolvers.supports(Mechanism::Basic));
        assert!(!resolvers.supports(Mechanism::DerivedToken));
        assert!(!resolvers.supports(Mechanism::Ambient));

        let resolvers = resolvers.with_ambient(AmbientSource::none());
        assert!(resolvers.supports(Mechanism::Ambient));
    }

    #[test]
    fn test_from_config_registers_token_exchange() {
        let mut config = SessionConfig::default();
        assert!(!AuthResolvers::from_config(&config).unwrap().supports(Mechanism::DerivedToken));

        config.token_endpoint = Some("https://login.example/token".to_string());
        let resolvers = AuthResolvers::from_config(&config).unwrap();
        assert!(resolvers.supports(Mechanism::DerivedToken));
        assert!(resolvers.supports(Mechanism::Ambient));

        config.token_endpoint = Some("not a url".to_string());
        assert!(AuthResolvers::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_ambient_reads_env_token() {
        let var = "SITECONN_TEST_AMBIENT_TOKEN_PRESENT";
        std::env::set_var(var, "ambient-token");
        let resolvers = AuthResolvers::new().with_ambient(AmbientSource::env(var));
        let cred = Credential::ambient("svc");

        match resolvers.resolve(&cred, &target()).await.unwrap() {
            AuthMaterial::Ambient { token } => assert_eq!(token.as_deref(), Some("ambient-token")),
            other => panic!("unexpected material {:?}", other),
        }
        std::env::remove_var(var);
    }

    #[tokio::test]
    async fn test_ambient_without_token() {
        let resolvers = AuthResolvers::new().with_ambient(AmbientSource::env("SITECONN_TEST_AMBIENT_UNSET"));
        let cred = Credential::ambient("svc");
        assert!(matches!(
            resolvers.resolve(&cred, &target()).await.unwrap(),
            AuthMaterial::Ambient { token: None }
        ));
    }

    #[tokio::test]
    async fn test_token_exchange_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("username=svc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "issued-token",
                "expiresIn": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resolvers = AuthResolvers::new().with_token_exchange(exchange(&server));
        let cred = Credential::derived_token("svc", "pw");

        let first = cred.resolve(&target(), &resolvers).await.unwrap();
        match first.as_ref() {
            AuthMaterial::Bearer(token) => {
                assert_eq!(token.token, "issued-token");
                assert_eq!(token.expires_in, Some(3600));
                assert!(!token.is_expired());
            }
            other => panic!("unexpected material {:?}", other),
        }

        // Memoized: the mock expects exactly one call.
        cred.resolve(&target(), &resolvers).await.unwrap();
    }

    #[tokio::test]
    async fn test_token_exchange_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let resolvers = AuthResolvers::new().with_token_exchange(exchange(&server));
        let cred = Credential::derived_token("svc", "pw");

        let err = resolvers.resolve(&cred, &target()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Connect { source: TransportError::Unauthorized, .. }
        ));
    }

    #[tokio::test]
    async fn test_token_exchange_requires_secret() {
        let server = MockServer::start().await;
        let resolvers = AuthResolvers::new().with_token_exchange(exchange(&server));
        let cred = Credential::new("svc", None, Mechanism::DerivedToken);

        assert!(matches!(
            resolvers.resolve(&cred, &target()).await,
            Err(SessionError::MissingCredentialData(_))
        ));
    }
}
