//! Registry of live sessions.
//!
//! The registry is an explicit value, built once by the host and passed to
//! whatever needs sessions. Sessions are keyed by (username, target) and
//! created lazily; eviction is pluggable and off by default.

pub mod eviction;
pub mod store;

pub use eviction::{EvictionPolicy, LruCap, Unbounded};
pub use store::{SessionKey, SessionRegistry};
