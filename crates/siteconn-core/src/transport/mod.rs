//! Transport seam for site connections.
//!
//! A `Transport` opens connection handles against a target site, probes a
//! handle to confirm it actually authenticates, and resolves resource ids
//! to site URIs. `HttpTransport` is the reqwest-backed implementation.

pub mod error;
pub mod http;

use async_trait::async_trait;
use url::Url;

use crate::auth::AuthMaterial;

pub use error::{ProbeError, TransportError};
pub use http::{HttpHandle, HttpTransport};

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Live connection object handed to callers once a session is ready.
    type Handle: Send + Sync + 'static;

    /// Build a connection handle for `target` using resolved auth material.
    async fn open(&self, target: &Url, auth: &AuthMaterial) -> Result<Self::Handle, TransportError>;

    /// One lightweight round trip confirming the handle authenticates.
    async fn probe(&self, handle: &Self::Handle) -> Result<(), ProbeError>;

    /// Resolve a resource id to the absolute URI of the site that owns it.
    async fn resolve_id(&self, handle: &Self::Handle, id: &str) -> Result<Url, TransportError>;
}
