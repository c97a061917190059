//! Media packet type routed by the fan-out engine
//!
//! A [`Packet`] is opaque to the engine: the wire codec layer produces it
//! with the tagging fields already classified, and the engine only reads
//! those tags to decide caching and routing. The payload is `bytes::Bytes`,
//! so cloning a packet for each subscriber reference-counts the media data
//! instead of copying it.

use bytes::Bytes;

/// Kind of media packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Video frame
    Video,
    /// Audio frame
    Audio,
    /// Metadata (onMetaData script data)
    Metadata,
}

/// A media unit flowing from one publisher to many subscribers
///
/// Designed to be cheap to clone due to `Bytes` reference counting.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Kind of packet
    pub kind: MediaKind,
    /// Whether this is a keyframe (video only)
    pub is_keyframe: bool,
    /// Whether this is a codec sequence header (decoder configuration)
    pub is_sequence_header: bool,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Sub-stream index, written by the engine when forwarding to a
    /// master relay's aggregator; 0 otherwise
    pub stream_index: u32,
    /// Packet data (zero-copy via reference counting)
    pub payload: Bytes,
}

impl Packet {
    /// Create a video packet
    pub fn video(timestamp: u32, payload: Bytes, is_keyframe: bool, is_sequence_header: bool) -> Self {
        Self {
            kind: MediaKind::Video,
            is_keyframe,
            is_sequence_header,
            timestamp,
            stream_index: 0,
            payload,
        }
    }

    /// Create an audio packet
    pub fn audio(timestamp: u32, payload: Bytes, is_sequence_header: bool) -> Self {
        Self {
            kind: MediaKind::Audio,
            is_keyframe: false,
            is_sequence_header,
            timestamp,
            stream_index: 0,
            payload,
        }
    }

    /// Create a metadata packet
    pub fn metadata(timestamp: u32, payload: Bytes) -> Self {
        Self {
            kind: MediaKind::Metadata,
            is_keyframe: false,
            is_sequence_header: false,
            timestamp,
            stream_index: 0,
            payload,
        }
    }

    /// Check if this is a video packet
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    /// Check if this is an audio packet
    pub fn is_audio(&self) -> bool {
        self.kind == MediaKind::Audio
    }

    /// Check if this is a metadata packet
    pub fn is_metadata(&self) -> bool {
        self.kind == MediaKind::Metadata
    }

    /// Check if this is a video codec sequence header
    pub fn is_video_sequence_header(&self) -> bool {
        self.is_video() && self.is_sequence_header
    }

    /// Check if this is an audio codec sequence header
    pub fn is_audio_sequence_header(&self) -> bool {
        self.is_audio() && self.is_sequence_header
    }

    /// Get the size of the payload in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
