//! Endpoint contracts
//!
//! Readers (publishers) and writers (subscribers) are created by the
//! protocol layers (RTMP sessions, HTTP-FLV connections, relay bridges)
//! and handed to the registry. The engine owns the association, drives
//! packet flow through these contracts, and closes endpoints with one of
//! the observable [`CloseReason`]s when it evicts them.

use std::fmt;

use async_trait::async_trait;

use crate::media::Packet;

/// Identification carried by every endpoint within a stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointInfo {
    /// Stream identity (app + stream name, e.g. "live/foo")
    pub key: String,
    /// Unique identifier of this endpoint within the key
    pub uid: String,
    /// Source or destination URL of the endpoint
    pub url: String,
    /// Whether this subscriber is only valid while a publisher is live
    /// and should be closed when publisher cleanup runs (local players
    /// are transient; bridged relays are not)
    pub transient: bool,
}

impl EndpointInfo {
    /// Create info for an endpoint
    pub fn new(
        key: impl Into<String>,
        uid: impl Into<String>,
        url: impl Into<String>,
        transient: bool,
    ) -> Self {
        Self {
            key: key.into(),
            uid: uid.into(),
            url: url.into(),
            transient,
        }
    }
}

impl fmt::Display for EndpointInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.key, self.uid)
    }
}

/// Reason an endpoint was closed by the engine
///
/// The `Display` form is the wire-observable label collaborators see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// A new publisher claimed the stream key; the old one is stopped
    StopOld,
    /// The publisher went silent past its liveness deadline
    ReadTimeout,
    /// The subscriber went silent past its liveness deadline
    WriteTimeout,
    /// The stream ended and transient subscribers were cleaned up
    Closed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::StopOld => write!(f, "stop old"),
            CloseReason::ReadTimeout => write!(f, "read timeout"),
            CloseReason::WriteTimeout => write!(f, "write timeout"),
            CloseReason::Closed => write!(f, "closed"),
        }
    }
}

/// Error produced by endpoint I/O
#[derive(Debug, Clone)]
pub enum AvError {
    /// The endpoint was closed with the given reason
    Closed(CloseReason),
    /// The peer went away (end of stream, connection reset)
    Disconnected,
    /// Transport-level failure
    Io(String),
}

impl fmt::Display for AvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvError::Closed(reason) => write!(f, "endpoint closed: {}", reason),
            AvError::Disconnected => write!(f, "endpoint disconnected"),
            AvError::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

impl std::error::Error for AvError {}

/// A publisher-side packet source
///
/// `read` blocks until a packet is available or the endpoint fails.
#[async_trait]
pub trait PacketReader: Send + Sync {
    /// Read the next packet
    async fn read(&self) -> Result<Packet, AvError>;

    /// Identification of this endpoint
    fn info(&self) -> EndpointInfo;

    /// Whether the endpoint has shown activity within its deadline
    fn alive(&self) -> bool;

    /// Close the endpoint; subsequent reads fail
    fn close(&self, reason: CloseReason);
}

/// A subscriber-side packet sink
///
/// `write` may block on network buffers; the fan-out loop tolerates this
/// because each stream runs its own task.
#[async_trait]
pub trait PacketWriter: Send + Sync {
    /// Write one packet
    async fn write(&self, packet: Packet) -> Result<(), AvError>;

    /// Identification of this endpoint
    fn info(&self) -> EndpointInfo;

    /// Whether the endpoint has shown activity within its deadline
    fn alive(&self) -> bool;

    /// Close the endpoint; subsequent writes fail
    fn close(&self, reason: CloseReason);

    /// Rebase future timestamps against a new publisher origin
    ///
    /// Invoked during publisher handover, between detaching the writer
    /// from the old stream and attaching it to the new one, so player
    /// clocks do not jump backwards.
    fn calc_base_timestamp(&self);
}
