//! Media types for the fan-out engine
//!
//! This module provides:
//! - The [`Packet`] value routed from publishers to subscribers
//! - The per-stream [`PacketCache`] that bootstraps late joiners

pub mod cache;
pub mod packet;

pub use cache::PacketCache;
pub use packet::{MediaKind, Packet};
