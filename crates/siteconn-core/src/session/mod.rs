//! Sessions: authenticated, cached connections to one site for one identity.
//!
//! A session moves through `SessionState` via `connect` and `init`, with
//! `ensure_ready` driving both. Child sessions are derived from a parent
//! rather than built from scratch, sharing live state when they target the
//! same site.

pub mod connection;
pub mod connector;
pub mod derive;
pub mod interrupt;
pub mod state;
pub mod target;

pub use connection::Session;
pub use connector::Connector;
pub use interrupt::Interrupt;
pub use state::{InitOutcome, SessionState};
pub use target::normalize_target;
