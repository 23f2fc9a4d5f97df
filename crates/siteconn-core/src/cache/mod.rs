//! Per-session resource caches.
//!
//! Each session owns one `ResourceCaches` holding folder, list and
//! content-type tables. Entries are timestamped snapshots and never expire;
//! they persist until the caller invalidates them.

pub mod resource;

pub use resource::{CachedData, ResourceCache, ResourceCaches, ResourceKind, Snapshot};
