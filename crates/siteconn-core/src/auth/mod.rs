//! Credentials and the auth material they resolve to.
//!
//! This module provides:
//! - `Credential`: username, optional secret and declared `Mechanism`
//! - `AuthResolvers`: per-mechanism derivation of `AuthMaterial`
//! - `CredentialStore`: credentials (mechanism and secret) kept in the OS keychain via keyring
//!
//! Resolved material is memoized on the credential and shared by every
//! session that holds it.

pub mod credentials;
pub mod keychain;
pub mod material;
pub mod resolver;

pub use credentials::{Credential, Mechanism, Secret};
pub use keychain::CredentialStore;
pub use material::{AuthMaterial, TokenData};
pub use resolver::{AmbientSource, AuthResolvers, TokenExchange};
