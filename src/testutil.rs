//! Test doubles for the engine's external collaborators
//!
//! Scripted readers, recording writers, and recording relays. Packets
//! carry a one-byte payload tag so tests can assert exact delivery order.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::Notify;

use crate::endpoint::{AvError, CloseReason, EndpointInfo, PacketReader, PacketWriter};
use crate::media::Packet;
use crate::relay::{Relay, RelayConfig, RelayDirectory, RelayError, RelayFactory};

pub(crate) fn meta(tag: u8) -> Packet {
    Packet::metadata(0, Bytes::from(vec![tag]))
}

pub(crate) fn video_header(tag: u8) -> Packet {
    Packet::video(0, Bytes::from(vec![tag]), true, true)
}

pub(crate) fn audio_header(tag: u8) -> Packet {
    Packet::audio(0, Bytes::from(vec![tag]), true)
}

pub(crate) fn keyframe(ts: u32, tag: u8) -> Packet {
    Packet::video(ts, Bytes::from(vec![tag]), true, false)
}

pub(crate) fn inter_frame(ts: u32, tag: u8) -> Packet {
    Packet::video(ts, Bytes::from(vec![tag]), false, false)
}

/// A relay directory with no routes, for tests that ignore relaying
pub(crate) fn empty_relays() -> Arc<RelayDirectory> {
    Arc::new(RelayDirectory::new(
        RelayConfig::new(),
        Arc::new(MockRelayFactory::new()),
    ))
}

/// Scripted packet source: the test feeds packets through a channel
pub(crate) struct MockReader {
    info: EndpointInfo,
    rx: AsyncMutex<UnboundedReceiver<Packet>>,
    closed: Mutex<Option<CloseReason>>,
    close_notify: Notify,
    alive: AtomicBool,
}

impl MockReader {
    pub fn new(
        key: impl Into<String>,
        uid: impl Into<String>,
        url: impl Into<String>,
    ) -> (Arc<Self>, UnboundedSender<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = Arc::new(Self {
            info: EndpointInfo::new(key, uid, url, false),
            rx: AsyncMutex::new(rx),
            closed: Mutex::new(None),
            close_notify: Notify::new(),
            alive: AtomicBool::new(true),
        });
        (reader, tx)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.closed.lock().unwrap()
    }
}

#[async_trait]
impl PacketReader for MockReader {
    async fn read(&self) -> Result<Packet, AvError> {
        if let Some(reason) = *self.closed.lock().unwrap() {
            return Err(AvError::Closed(reason));
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = self.close_notify.notified() => {
                let reason = self.closed.lock().unwrap().unwrap_or(CloseReason::Closed);
                Err(AvError::Closed(reason))
            }
            packet = rx.recv() => packet.ok_or(AvError::Disconnected),
        }
    }

    fn info(&self) -> EndpointInfo {
        self.info.clone()
    }

    fn alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&self, reason: CloseReason) {
        let mut closed = self.closed.lock().unwrap();
        if closed.is_none() {
            *closed = Some(reason);
        }
        // notify_one stores a permit, so a close racing the next read is
        // still observed
        self.close_notify.notify_one();
    }
}

/// Recording packet sink with failure injection
pub(crate) struct MockWriter {
    info: EndpointInfo,
    written: Mutex<Vec<Packet>>,
    fail_at: AtomicUsize,
    alive: AtomicBool,
    closed: Mutex<Option<CloseReason>>,
    rebased: AtomicUsize,
}

impl MockWriter {
    pub fn new(key: impl Into<String>, uid: impl Into<String>, transient: bool) -> Self {
        let key = key.into();
        let uid = uid.into();
        let url = format!("rtmp://local/{}", key);
        Self {
            info: EndpointInfo::new(key, uid, url, transient),
            written: Mutex::new(Vec::new()),
            fail_at: AtomicUsize::new(usize::MAX),
            alive: AtomicBool::new(true),
            closed: Mutex::new(None),
            rebased: AtomicUsize::new(0),
        }
    }

    /// Fail every write once `n` packets have been accepted
    pub fn fail_after(&self, n: usize) {
        self.fail_at.store(n, Ordering::SeqCst);
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn written_count(&self) -> usize {
        self.written.lock().unwrap().len()
    }

    /// First payload byte of every accepted packet, in delivery order
    pub fn payload_tags(&self) -> Vec<u8> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.payload[0])
            .collect()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.closed.lock().unwrap()
    }

    pub fn rebase_count(&self) -> usize {
        self.rebased.load(Ordering::SeqCst)
    }

    /// Block until `n` packets have arrived; panics after two seconds
    pub async fn wait_for_count(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.written_count() < n {
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "timed out waiting for {} packets, have {:?}",
                    n,
                    self.payload_tags()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl PacketWriter for MockWriter {
    async fn write(&self, packet: Packet) -> Result<(), AvError> {
        let mut written = self.written.lock().unwrap();
        if written.len() >= self.fail_at.load(Ordering::SeqCst) {
            return Err(AvError::Io("injected write failure".into()));
        }
        written.push(packet);
        Ok(())
    }

    fn info(&self) -> EndpointInfo {
        self.info.clone()
    }

    fn alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&self, reason: CloseReason) {
        let mut closed = self.closed.lock().unwrap();
        if closed.is_none() {
            *closed = Some(reason);
        }
    }

    fn calc_base_timestamp(&self) {
        self.rebased.fetch_add(1, Ordering::SeqCst);
    }
}

/// Recording relay client
pub(crate) struct MockRelay {
    target: String,
    fail_start: bool,
    started: AtomicBool,
    stopped: AtomicBool,
    written: Mutex<Vec<Packet>>,
    subs: Mutex<Vec<String>>,
}

impl MockRelay {
    fn new(target: &str, fail_start: bool) -> Self {
        Self {
            target: target.to_string(),
            fail_start,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            written: Mutex::new(Vec::new()),
            subs: Mutex::new(Vec::new()),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<Packet> {
        self.written.lock().unwrap().clone()
    }

    pub fn payload_tags(&self) -> Vec<u8> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.payload[0])
            .collect()
    }

    pub fn sub_urls(&self) -> Vec<String> {
        self.subs.lock().unwrap().clone()
    }

    /// Block until `n` packets have arrived; panics after two seconds
    pub async fn wait_for_count(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.written.lock().unwrap().len() < n {
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for {} relay packets", n);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Relay for MockRelay {
    async fn start(&self) -> Result<(), RelayError> {
        if self.fail_start {
            return Err(RelayError::StartFailed(format!(
                "connect refused: {}",
                self.target
            )));
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn write_av_packet(&self, packet: Packet) {
        self.written.lock().unwrap().push(packet);
    }

    async fn start_sub_url(&self, url: &str) -> Result<(), RelayError> {
        self.subs.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn stop_sub_url(&self, url: &str) {
        self.subs.lock().unwrap().retain(|sub| sub != url);
    }
}

/// Factory that remembers every relay it built
pub(crate) struct MockRelayFactory {
    created: Mutex<Vec<Arc<MockRelay>>>,
    fail_start_targets: Mutex<HashSet<String>>,
}

impl MockRelayFactory {
    pub fn new() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            fail_start_targets: Mutex::new(HashSet::new()),
        }
    }

    /// Relays created for `target_url` will fail their `start()`
    pub fn fail_start_for(&self, target_url: &str) {
        self.fail_start_targets
            .lock()
            .unwrap()
            .insert(target_url.to_string());
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// Most recent relay created for `target_url`
    pub fn relay_for(&self, target_url: &str) -> Option<Arc<MockRelay>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|relay| relay.target == target_url)
            .cloned()
    }
}

impl RelayFactory for MockRelayFactory {
    fn create(&self, target_url: &str) -> Arc<dyn Relay> {
        let fail_start = self.fail_start_targets.lock().unwrap().contains(target_url);
        let relay = Arc::new(MockRelay::new(target_url, fail_start));
        self.created.lock().unwrap().push(Arc::clone(&relay));
        relay
    }
}
