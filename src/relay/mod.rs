//! Outbound relay support (static push)
//!
//! A relay republishes a local stream to an upstream origin. Masters are
//! standalone push connections; a master may also aggregate several
//! sub-streams, each tagged with its index in the group. The fan-out loop
//! consults the [`RelayDirectory`] on every packet, so routing follows
//! the live state of the directory rather than a snapshot taken at
//! publish time.

pub mod config;
pub mod directory;

pub use config::{PushRoute, RelayConfig, SubstreamGroup};
pub use directory::{Relay, RelayDirectory, RelayError, RelayFactory};
