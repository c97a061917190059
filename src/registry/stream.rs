//! Per-stream fan-out state
//!
//! A [`Stream`] owns one publisher-side reader, the bootstrap
//! [`PacketCache`], and the subscriber set. Attaching a reader spawns the
//! fan-out task: it pulls packets from the reader, forwards them to any
//! configured relays, appends them to the cache, and delivers them to
//! each subscriber, replaying the bootstrap cache first for subscribers
//! that have not yet received it.
//!
//! The subscriber map is mutated concurrently by the network layer
//! (`add_writer`), the fan-out loop, and the liveness sweep. Iteration
//! always happens over a snapshot, so removal of the current entry by
//! another task is harmless, and the map lock is never held across a
//! write await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::endpoint::{CloseReason, EndpointInfo, PacketReader, PacketWriter};
use crate::media::{Packet, PacketCache};
use crate::relay::RelayDirectory;

/// A subscriber: a writer plus whether it has received its bootstrap
/// replay yet
///
/// Clones share the bootstrap flag, so a snapshot taken for iteration
/// observes and updates the same state as the map entry.
#[derive(Clone)]
pub(crate) struct Subscriber {
    writer: Arc<dyn PacketWriter>,
    bootstrapped: Arc<AtomicBool>,
}

impl Subscriber {
    fn new(writer: Arc<dyn PacketWriter>) -> Self {
        Self {
            writer,
            bootstrapped: Arc::new(AtomicBool::new(false)),
        }
    }

    fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::SeqCst)
    }

    fn mark_bootstrapped(&self) {
        self.bootstrapped.store(true, Ordering::SeqCst);
    }
}

/// Point-in-time view of a stream's state
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Whether a reader is attached
    pub has_publisher: bool,
    /// Whether the fan-out loop is running
    pub running: bool,
    /// Number of attached subscribers
    pub subscriber_count: usize,
    /// Packets in the bootstrap GOP buffer
    pub gop_len: usize,
    /// Bytes held by the bootstrap GOP buffer
    pub gop_bytes: usize,
}

/// One live stream: a publisher, a bootstrap cache, and its subscribers
pub struct Stream {
    info: EndpointInfo,
    running: AtomicBool,
    cache: Mutex<PacketCache>,
    reader: RwLock<Option<Arc<dyn PacketReader>>>,
    subscribers: RwLock<HashMap<String, Subscriber>>,
    relays: Arc<RelayDirectory>,
}

impl Stream {
    /// Create an idle stream for the given identity
    pub fn new(info: EndpointInfo, relays: Arc<RelayDirectory>, max_gop_bytes: usize) -> Self {
        Self {
            info,
            running: AtomicBool::new(false),
            cache: Mutex::new(PacketCache::with_max_gop_bytes(max_gop_bytes)),
            reader: RwLock::new(None),
            subscribers: RwLock::new(HashMap::new()),
            relays,
        }
    }

    /// Identity this stream was created for
    pub fn info(&self) -> &EndpointInfo {
        &self.info
    }

    /// UID of the attached reader, `None` while no reader is attached
    pub async fn publisher_id(&self) -> Option<String> {
        self.reader.read().await.as_ref().map(|r| r.info().uid)
    }

    /// Whether the fan-out loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Attach a publisher and spawn the fan-out task
    ///
    /// The registry guarantees any previous publisher was stopped first.
    pub async fn add_reader(self: &Arc<Self>, reader: Arc<dyn PacketReader>) {
        {
            let mut slot = self.reader.write().await;
            *slot = Some(Arc::clone(&reader));
        }
        let stream = Arc::clone(self);
        tokio::spawn(async move {
            stream.run_fanout(reader).await;
        });
    }

    /// Attach a subscriber, keyed by its UID
    ///
    /// The subscriber receives the bootstrap replay on the next fan-out
    /// iteration, then live packets.
    pub async fn add_writer(&self, writer: Arc<dyn PacketWriter>) {
        let info = writer.info();
        tracing::debug!(stream = %self.info.key, uid = %info.uid, "subscriber added");
        self.subscribers
            .write()
            .await
            .insert(info.uid, Subscriber::new(writer));
    }

    /// Stop the current publisher, if any, with reason `"stop old"`
    ///
    /// Idempotent. The fan-out loop observes the cleared flag or the
    /// failing read and exits.
    pub async fn stop_publish(&self) {
        tracing::info!(stream = %self.info.key, "stopping publisher");
        if self.running.load(Ordering::SeqCst) {
            if let Some(reader) = self.reader_handle().await {
                reader.close(CloseReason::StopOld);
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Move every subscriber to `dst` for publisher handover
    ///
    /// Each writer's timestamp origin is rebased between detach and
    /// re-attach so player clocks do not jump backwards. Subscribers
    /// arrive on `dst` without their bootstrap, so they replay the new
    /// publisher's cache before live packets.
    pub async fn migrate_subscribers(&self, dst: &Stream) {
        let drained: Vec<Subscriber> = {
            let mut subscribers = self.subscribers.write().await;
            subscribers.drain().map(|(_, sub)| sub).collect()
        };
        for sub in drained {
            sub.writer.calc_base_timestamp();
            dst.add_writer(Arc::clone(&sub.writer)).await;
        }
    }

    /// Liveness scan: close dead endpoints, return the live count
    ///
    /// A reader counts while the loop is running and it reports alive;
    /// a silent one is closed with `"read timeout"` and the loop exits
    /// on its next read. A subscriber that reports dead is removed and
    /// closed with `"write timeout"`; the rest are counted.
    pub async fn check_alive(&self) -> usize {
        let mut live = 0;

        if let Some(reader) = self.reader_handle().await {
            if self.running.load(Ordering::SeqCst) {
                if reader.alive() {
                    live += 1;
                } else {
                    tracing::warn!(stream = %self.info.key, "publisher timed out");
                    reader.close(CloseReason::ReadTimeout);
                }
            }
        }

        for (uid, sub) in self.snapshot_subscribers().await {
            if sub.writer.alive() {
                live += 1;
            } else {
                tracing::info!(stream = %self.info.key, uid = %uid, "subscriber timed out");
                self.remove_subscriber(&uid).await;
                sub.writer.close(CloseReason::WriteTimeout);
            }
        }

        live
    }

    /// Number of attached subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Point-in-time stream statistics
    pub async fn stats(&self) -> StreamStats {
        let cache = self.cache.lock().await;
        StreamStats {
            has_publisher: self.reader.read().await.is_some(),
            running: self.is_running(),
            subscriber_count: self.subscribers.read().await.len(),
            gop_len: cache.gop_len(),
            gop_bytes: cache.gop_bytes(),
        }
    }

    /// Fan-out loop: one task per stream, runs until the reader fails or
    /// the stream is stopped
    async fn run_fanout(self: Arc<Self>, reader: Arc<dyn PacketReader>) {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(stream = %self.info.key, uid = %reader.info().uid, "fan-out started");

        // Master relays win; only a stream that is not itself pushed out
        // participates as a sub-stream of some master.
        let master_started = self.start_static_push().await;
        if !master_started && self.relays.is_substream(&self.info.url) {
            self.start_sub_static_push().await;
        }

        loop {
            if !self.running.load(Ordering::SeqCst) {
                self.close_transient().await;
                return;
            }

            let packet = match reader.read().await {
                Ok(packet) => packet,
                Err(err) => {
                    tracing::info!(stream = %self.info.key, error = %err, "publisher read ended");
                    self.close_transient().await;
                    self.running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            if self.has_active_static_push() {
                self.send_static_push(&packet).await;
            } else if self.relays.is_substream(&self.info.url) {
                self.send_sub_static_push(packet.clone()).await;
            }

            self.cache.lock().await.write(packet.clone());
            self.fan_out(&packet).await;
        }
    }

    /// Deliver one packet to every subscriber
    async fn fan_out(&self, packet: &Packet) {
        for (uid, sub) in self.snapshot_subscribers().await {
            if !sub.is_bootstrapped() {
                let cache = self.cache.lock().await;
                match cache.send(sub.writer.as_ref()).await {
                    Ok(()) => sub.mark_bootstrapped(),
                    Err(err) => {
                        tracing::warn!(
                            stream = %self.info.key,
                            uid = %uid,
                            error = %err,
                            "bootstrap replay failed, removing subscriber"
                        );
                        self.remove_subscriber(&uid).await;
                    }
                }
            } else if let Err(err) = sub.writer.write(packet.clone()).await {
                tracing::warn!(
                    stream = %self.info.key,
                    uid = %uid,
                    error = %err,
                    "write failed, removing subscriber"
                );
                self.remove_subscriber(&uid).await;
            }
        }
    }

    /// Publisher-gone cleanup: stop relays, evict transient subscribers
    ///
    /// Non-transient subscribers (bridged relays) stay attached so a
    /// later publisher resumes fan-out to them.
    async fn close_transient(&self) {
        if self.reader.read().await.is_some() {
            self.stop_static_push().await;
            self.stop_sub_static_push().await;
            tracing::info!(stream = %self.info.key, "publisher closed");
        }

        for (uid, sub) in self.snapshot_subscribers().await {
            if sub.writer.info().transient {
                sub.writer.close(CloseReason::Closed);
                self.remove_subscriber(&uid).await;
                tracing::info!(stream = %self.info.key, uid = %uid, "player closed and removed");
            }
        }
    }

    /// Start every configured master relay for this stream's URL
    ///
    /// Returns whether at least one relay started, so the caller can
    /// fall back to sub-stream participation.
    async fn start_static_push(&self) -> bool {
        let targets = self.relays.static_push_urls(&self.info.url);
        if targets.is_empty() {
            return false;
        }

        let mut started = false;
        for target in targets {
            let relay = self.relays.get_or_create(&target);
            match relay.start().await {
                Ok(()) => {
                    tracing::info!(stream = %self.info.key, target = %target, "static push started");
                    started = true;
                }
                Err(err) => {
                    tracing::warn!(
                        stream = %self.info.key,
                        target = %target,
                        error = %err,
                        "static push start failed"
                    );
                }
            }
        }
        started
    }

    /// Stop and release every master relay for this stream's URL
    async fn stop_static_push(&self) {
        for target in self.relays.static_push_urls(&self.info.url) {
            match self.relays.get(&target) {
                Ok(relay) => {
                    relay.stop();
                    self.relays.release(&target);
                    tracing::info!(stream = %self.info.key, target = %target, "static push stopped");
                }
                Err(err) => {
                    tracing::warn!(target = %target, error = %err, "static push already gone");
                }
            }
        }
    }

    /// Whether any master relay target currently has a live client
    fn has_active_static_push(&self) -> bool {
        self.relays
            .static_push_urls(&self.info.url)
            .iter()
            .any(|target| self.relays.get(target).is_ok())
    }

    /// Forward one packet to every master relay target
    async fn send_static_push(&self, packet: &Packet) {
        for target in self.relays.static_push_urls(&self.info.url) {
            match self.relays.get(&target) {
                Ok(relay) => relay.write_av_packet(packet.clone()).await,
                Err(err) => {
                    tracing::warn!(target = %target, error = %err, "relay target missing, skipping");
                }
            }
        }
    }

    /// Register this stream on its master relay's aggregator
    async fn start_sub_static_push(&self) -> bool {
        let Some((_, master)) = self.relays.find_master_for_substream(&self.info.url) else {
            return false;
        };
        match master.start_sub_url(&self.info.url).await {
            Ok(()) => {
                tracing::info!(stream = %self.info.key, "sub static push started");
                true
            }
            Err(err) => {
                tracing::warn!(stream = %self.info.key, error = %err, "sub static push start failed");
                false
            }
        }
    }

    /// Deregister this stream from its master relay's aggregator
    async fn stop_sub_static_push(&self) {
        if let Some((_, master)) = self.relays.find_master_for_substream(&self.info.url) {
            master.stop_sub_url(&self.info.url);
        }
    }

    /// Forward one packet through the master relay, tagged with this
    /// stream's sub-stream index
    async fn send_sub_static_push(&self, mut packet: Packet) {
        let Some((index, master)) = self.relays.find_master_for_substream(&self.info.url) else {
            return;
        };
        packet.stream_index = index as u32 + 1;
        master.write_av_packet(packet).await;
    }

    async fn reader_handle(&self) -> Option<Arc<dyn PacketReader>> {
        self.reader.read().await.clone()
    }

    async fn snapshot_subscribers(&self) -> Vec<(String, Subscriber)> {
        self.subscribers
            .read()
            .await
            .iter()
            .map(|(uid, sub)| (uid.clone(), sub.clone()))
            .collect()
    }

    async fn remove_subscriber(&self, uid: &str) {
        self.subscribers.write().await.remove(uid);
    }
}
