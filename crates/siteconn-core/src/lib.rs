//! Session lifecycle for multi-site content platforms.
//!
//! Turns a (credential, target site) pair into a live, authenticated
//! [`Session`], keeps a [`SessionRegistry`] of sessions for reuse, and
//! derives child sessions for sub-sites while sharing whatever state is
//! safe to share.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use siteconn_core::{Connector, Credential, SessionConfig, SessionRegistry};
//!
//! let config = SessionConfig::load()?.apply_env();
//! let registry = SessionRegistry::new(Arc::new(Connector::http(config)?));
//!
//! let credential = Arc::new(Credential::basic("svc", "secret"));
//! let session = registry.get_or_create(credential, "https://contoso.example/sites/a")?;
//! session.ensure_ready(true).await?;
//! let handle = session.transport_handle()?;
//! # let _ = handle;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthMaterial, AuthResolvers, Credential, CredentialStore, Mechanism, Secret};
pub use cache::{ResourceCache, ResourceCaches, ResourceKind};
pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use registry::{EvictionPolicy, LruCap, SessionKey, SessionRegistry, Unbounded};
pub use session::{Connector, InitOutcome, Interrupt, Session, SessionState};
pub use transport::{HttpHandle, HttpTransport, ProbeError, Transport, TransportError};
