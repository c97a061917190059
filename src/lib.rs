//! # rtmp-fanout
//!
//! Publish/subscribe fan-out engine for RTMP-style media servers.
//!
//! One publisher pushes a sequence of media packets for a named stream;
//! the engine caches what newcomers need to start decoding mid-stream
//! (metadata, codec sequence headers, and the current keyframe-aligned
//! GOP), fans every packet out to the stream's subscribers, forwards to
//! configured relay targets, and reaps dead endpoints with a periodic
//! liveness sweep.
//!
//! The wire protocols are not here: RTMP/HTTP-FLV sessions implement the
//! [`endpoint::PacketReader`] / [`endpoint::PacketWriter`] contracts and
//! hand endpoints to the [`registry::StreamRegistry`]; outbound relay
//! clients implement [`relay::Relay`] and are managed by the
//! [`relay::RelayDirectory`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use rtmp_fanout::relay::{RelayConfig, RelayDirectory, RelayFactory};
//! use rtmp_fanout::registry::{RegistryConfig, StreamRegistry};
//!
//! fn build(factory: Arc<dyn RelayFactory>) -> Arc<StreamRegistry> {
//!     let relays = Arc::new(RelayDirectory::new(RelayConfig::new(), factory));
//!     let registry = Arc::new(StreamRegistry::with_config(
//!         relays,
//!         RegistryConfig::default().sweep_interval(Duration::from_secs(5)),
//!     ));
//!     let _sweeper = registry.spawn_sweeper_task();
//!     // the accept loop then calls registry.attach_reader / attach_writer
//!     registry
//! }
//! ```

pub mod endpoint;
pub mod media;
pub mod registry;
pub mod relay;

#[cfg(test)]
pub(crate) mod testutil;

pub use endpoint::{AvError, CloseReason, EndpointInfo, PacketReader, PacketWriter};
pub use media::{MediaKind, Packet, PacketCache};
pub use registry::{RegistryConfig, Stream, StreamRegistry, StreamStats};
pub use relay::{Relay, RelayConfig, RelayDirectory, RelayError, RelayFactory};
