//! Bootstrap cache for late-joiner support
//!
//! When a subscriber joins mid-stream it needs, before any live packet:
//! 1. The latest metadata (onMetaData)
//! 2. The codec sequence headers (video and audio decoder configuration)
//! 3. The current GOP: the most recent keyframe and every packet since
//!
//! The cache retains exactly that set. Headers and metadata are sticky:
//! they survive GOP rotation until replaced by a newer one of the same
//! kind. The GOP buffer is reset on every keyframe, so the cache never
//! holds more than one GOP worth of non-header packets.

use std::collections::VecDeque;

use crate::endpoint::{AvError, PacketWriter};
use crate::media::Packet;

/// Default GOP buffer cap (4MB)
pub const DEFAULT_MAX_GOP_BYTES: usize = 4 * 1024 * 1024;

/// A buffered GOP packet
#[derive(Debug, Clone)]
struct BufferedPacket {
    packet: Packet,
    size: usize,
}

/// Per-stream cache of the packets required to bootstrap a new subscriber
#[derive(Debug)]
pub struct PacketCache {
    /// Maximum GOP buffer size in bytes
    max_gop_bytes: usize,
    /// Current GOP buffer size in bytes
    gop_bytes: usize,
    /// Latest metadata packet
    metadata: Option<Packet>,
    /// Latest video sequence header
    video_header: Option<Packet>,
    /// Latest audio sequence header
    audio_header: Option<Packet>,
    /// Packets since the most recent keyframe, keyframe first
    gop: VecDeque<BufferedPacket>,
    /// Whether a keyframe has started the current GOP
    gop_started: bool,
}

impl PacketCache {
    /// Create a cache with the default GOP byte cap
    pub fn new() -> Self {
        Self::with_max_gop_bytes(DEFAULT_MAX_GOP_BYTES)
    }

    /// Create a cache with a specific GOP byte cap
    pub fn with_max_gop_bytes(max_gop_bytes: usize) -> Self {
        Self {
            max_gop_bytes,
            gop_bytes: 0,
            metadata: None,
            video_header: None,
            audio_header: None,
            gop: VecDeque::new(),
            gop_started: false,
        }
    }

    /// Record one packet
    ///
    /// Metadata and sequence headers replace the stored one of their
    /// kind. A video keyframe starts a new GOP containing just itself.
    /// Any other media packet is appended to the current GOP, or
    /// discarded if no keyframe has been seen yet.
    pub fn write(&mut self, packet: Packet) {
        if packet.is_metadata() {
            self.metadata = Some(packet);
            return;
        }
        if packet.is_video_sequence_header() {
            self.video_header = Some(packet);
            return;
        }
        if packet.is_audio_sequence_header() {
            self.audio_header = Some(packet);
            return;
        }

        if packet.is_video() && packet.is_keyframe {
            self.clear_gop();
            self.gop_started = true;
        } else if !self.gop_started {
            return;
        }

        self.push_gop(packet);
    }

    /// Deliver the bootstrap set to a writer, in decode order:
    /// metadata, video header, audio header, then the current GOP.
    ///
    /// Aborts on the first write error and returns it. With no keyframe
    /// seen yet this may emit only headers and metadata, which is not an
    /// error; the subscriber picks up live packets from the fan-out
    /// loop afterwards.
    pub async fn send(&self, writer: &dyn PacketWriter) -> Result<(), AvError> {
        if let Some(ref meta) = self.metadata {
            writer.write(meta.clone()).await?;
        }
        if let Some(ref header) = self.video_header {
            writer.write(header.clone()).await?;
        }
        if let Some(ref header) = self.audio_header {
            writer.write(header.clone()).await?;
        }
        for buffered in &self.gop {
            writer.write(buffered.packet.clone()).await?;
        }
        Ok(())
    }

    /// Number of packets in the current GOP buffer
    pub fn gop_len(&self) -> usize {
        self.gop.len()
    }

    /// Bytes held by the current GOP buffer
    pub fn gop_bytes(&self) -> usize {
        self.gop_bytes
    }

    /// Whether a keyframe has started the current GOP
    pub fn gop_started(&self) -> bool {
        self.gop_started
    }

    fn clear_gop(&mut self) {
        self.gop.clear();
        self.gop_bytes = 0;
        self.gop_started = false;
    }

    fn push_gop(&mut self, packet: Packet) {
        let size = packet.size();

        // Stay under the byte cap by dropping the oldest packets; a
        // single packet larger than the whole cap is discarded.
        if self.gop_bytes + size > self.max_gop_bytes {
            while self.gop_bytes + size > self.max_gop_bytes && !self.gop.is_empty() {
                if let Some(old) = self.gop.pop_front() {
                    self.gop_bytes -= old.size;
                }
            }
            if self.gop_bytes + size > self.max_gop_bytes {
                return;
            }
        }

        self.gop.push_back(BufferedPacket { packet, size });
        self.gop_bytes += size;
    }
}

impl Default for PacketCache {
    fn default() -> Self {
        Self::new()
    }
}
