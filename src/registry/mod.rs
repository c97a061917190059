//! Stream registry for pub/sub routing
//!
//! The registry manages active streams and routes media from publishers
//! to subscribers. Each stream runs its own fan-out task, so a slow
//! subscriber blocks only its own stream.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<StreamRegistry>
//!                  ┌──────────────────────────┐
//!                  │ streams: HashMap<Key,    │     sweeper task
//!                  │   Arc<Stream> {          │◄── check_alive()
//!                  │     reader, cache,       │     every 5s
//!                  │     subscribers,         │
//!                  │   }                      │
//!                  │ >                        │
//!                  └────────────┬─────────────┘
//!                               │
//!       ┌───────────────────────┼───────────────────────┐
//!       │                       │                       │
//!       ▼                       ▼                       ▼
//!  [Publisher]            [Subscriber]            [Relay push]
//!  reader.read()          cache replay,           RelayDirectory
//!       │                 then live writes             │
//!       └──► fan-out loop ──► writer.write() ──► upstream origin
//! ```
//!
//! # Zero-Copy Design
//!
//! Packet payloads are `bytes::Bytes`, so the per-subscriber clone in the
//! fan-out loop reference-counts the media data; only the small packet
//! struct is copied.

pub mod config;
pub mod store;
pub mod stream;

pub use config::RegistryConfig;
pub use store::StreamRegistry;
pub use stream::{Stream, StreamStats};
