//! HTTP transport for site connections.
//!
//! `HttpTransport` opens `HttpHandle`s: a pooled reqwest client bound to one
//! target site and the auth material resolved for it. Callers run their
//! remote operations through `HttpHandle::request`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{ProbeError, Transport, TransportError};
use crate::auth::AuthMaterial;
use crate::config::SessionConfig;

/// Identity-provider error codes meaning the account or realm itself is
/// invalid. Re-authenticating cannot fix these.
const UNRECOVERABLE_IDENTITY_CODES: &[&str] = &[
    "invalid_realm",
    "unknown_account",
    "account_disabled",
    "tenant_not_found",
];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Flat { error: String },
    Nested { error: ErrorDetail },
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
}

impl ErrorBody {
    fn code(&self) -> &str {
        match self {
            ErrorBody::Flat { error } => error,
            ErrorBody::Nested { error } => &error.code,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResolvedSite {
    url: String,
}

/// Live connection to one site.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct HttpHandle {
    client: Client,
    target: Url,
    auth: Arc<AuthMaterial>,
}

impl HttpHandle {
    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Absolute URL of `path` below the target site.
    pub fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        let mut url = self.target.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidResponse(format!("{} cannot be a base URL", self.target)))?
            .pop_if_empty()
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    /// Start a request against the target site with auth applied.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, TransportError> {
        Ok(self.request_url(method, self.endpoint(path)?))
    }

    /// Like [`HttpHandle::request`], for a URL the caller has already built.
    pub fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        self.authorize(builder)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.auth.as_ref() {
            AuthMaterial::Basic { username, password } => builder.basic_auth(username, Some(password)),
            AuthMaterial::Bearer(token) => builder.bearer_auth(&token.token),
            AuthMaterial::Ambient { token: Some(token) } => builder.bearer_auth(token),
            AuthMaterial::Ambient { token: None } => builder,
        }
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    probe_path: String,
    resolve_path: String,
}

impl HttpTransport {
    pub fn new(config: &SessionConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create a transport that shares an existing client's connection pool.
    pub fn with_client(client: Client, config: &SessionConfig) -> Self {
        Self {
            client,
            probe_path: config.probe_path.clone(),
            resolve_path: config.resolve_path.clone(),
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, TransportError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(TransportError::from_status(status, &body))
        }
    }

    async fn classify_failure(response: Response) -> ProbeError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(&body) {
            let code = parsed.code();
            if UNRECOVERABLE_IDENTITY_CODES.contains(&code) {
                return ProbeError::UnrecoverableIdentity(code.to_string());
            }
        }

        let err = TransportError::from_status(status, &body);
        if err.is_auth_denied() {
            ProbeError::AuthDenied
        } else {
            ProbeError::Other(err)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    type Handle = HttpHandle;

    async fn open(&self, target: &Url, auth: &AuthMaterial) -> Result<HttpHandle, TransportError> {
        if target.cannot_be_a_base() {
            return Err(TransportError::InvalidResponse(format!(
                "{} cannot be a base URL",
                target
            )));
        }
        debug!(target = %target, auth = auth.kind(), "Opening HTTP handle");
        Ok(HttpHandle {
            client: self.client.clone(), // Cheap clone, shares connection pool
            target: target.clone(),
            auth: Arc::new(auth.clone()),
        })
    }

    async fn probe(&self, handle: &HttpHandle) -> Result<(), ProbeError> {
        let response = handle
            .request(Method::GET, &self.probe_path)?
            .send()
            .await
            .map_err(TransportError::from)?;

        if response.status().is_success() {
            return Ok(());
        }

        let failure = Self::classify_failure(response).await;
        warn!(target = %handle.target, error = %failure, "Probe failed");
        Err(failure)
    }

    async fn resolve_id(&self, handle: &HttpHandle, id: &str) -> Result<Url, TransportError> {
        // The id is one segment, escaped, whatever characters it holds.
        let mut url = handle.endpoint(&self.resolve_path)?;
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidResponse(format!("{} cannot be a base URL", handle.target)))?
            .push(id);
        let response = handle.request_url(Method::GET, url).send().await?;
        let response = Self::check_response(response).await?;

        let resolved: ResolvedSite = response
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(format!("resolve {}: {}", id, e)))?;

        Url::parse(&resolved.url)
            .map_err(|_| TransportError::InvalidResponse(format!("resolved '{}' is not an absolute URI", resolved.url)))
    }
}
