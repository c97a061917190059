//! Relay client directory
//!
//! Process-wide registry of outbound relay clients keyed by target URL.
//! Relay clients are shared: several streams may push through the same
//! master connection, so the directory reference-counts each client and
//! tears it down only when the last stream releases it.
//!
//! The wire-level relay client itself is an external collaborator; the
//! directory creates instances through a [`RelayFactory`] and hands out
//! `Arc<dyn Relay>` handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::config::RelayConfig;
use crate::media::Packet;

/// Error produced by relay operations
#[derive(Debug, Clone)]
pub enum RelayError {
    /// No relay client exists for the target URL
    NotFound(String),
    /// The relay client failed to establish its upstream connection
    StartFailed(String),
    /// The URL is not a member of any sub-stream group
    NoSubstreamSlot(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::NotFound(url) => write!(f, "no relay for target: {}", url),
            RelayError::StartFailed(msg) => write!(f, "relay start failed: {}", msg),
            RelayError::NoSubstreamSlot(url) => {
                write!(f, "url is not a configured sub-stream: {}", url)
            }
        }
    }
}

impl std::error::Error for RelayError {}

/// An outbound relay client that republishes a stream upstream
#[async_trait]
pub trait Relay: Send + Sync {
    /// Establish the upstream connection
    async fn start(&self) -> Result<(), RelayError>;

    /// Tear down the upstream connection
    fn stop(&self);

    /// Forward one packet upstream
    async fn write_av_packet(&self, packet: Packet);

    /// Register a sub-stream on this master relay's aggregator
    async fn start_sub_url(&self, url: &str) -> Result<(), RelayError>;

    /// Deregister a sub-stream
    fn stop_sub_url(&self, url: &str);
}

/// Creates wire-level relay clients for target URLs
pub trait RelayFactory: Send + Sync {
    /// Build a relay client for the given target URL (not yet started)
    fn create(&self, target_url: &str) -> Arc<dyn Relay>;
}

struct RelayEntry {
    relay: Arc<dyn Relay>,
    refs: usize,
}

/// Directory of shared relay clients, keyed by target URL
pub struct RelayDirectory {
    config: RelayConfig,
    factory: Arc<dyn RelayFactory>,
    relays: Mutex<HashMap<String, RelayEntry>>,
}

impl RelayDirectory {
    /// Create a directory over the given routing config and factory
    pub fn new(config: RelayConfig, factory: Arc<dyn RelayFactory>) -> Self {
        Self {
            config,
            factory,
            relays: Mutex::new(HashMap::new()),
        }
    }

    /// Configured master push targets for a source URL
    pub fn static_push_urls(&self, source_url: &str) -> Vec<String> {
        self.config.push_targets(source_url)
    }

    /// Fetch the relay for a target URL, creating it if absent
    ///
    /// Each call takes one reference; pair with [`release`](Self::release).
    pub fn get_or_create(&self, target_url: &str) -> Arc<dyn Relay> {
        let mut relays = self.relays.lock().expect("relay directory poisoned");
        let entry = relays.entry(target_url.to_string()).or_insert_with(|| {
            tracing::info!(target = %target_url, "creating relay client");
            RelayEntry {
                relay: self.factory.create(target_url),
                refs: 0,
            }
        });
        entry.refs += 1;
        Arc::clone(&entry.relay)
    }

    /// Fetch the relay for a target URL; error if absent
    pub fn get(&self, target_url: &str) -> Result<Arc<dyn Relay>, RelayError> {
        let relays = self.relays.lock().expect("relay directory poisoned");
        relays
            .get(target_url)
            .map(|entry| Arc::clone(&entry.relay))
            .ok_or_else(|| RelayError::NotFound(target_url.to_string()))
    }

    /// Drop one reference to the relay for a target URL
    ///
    /// The client is removed from the directory when the last reference
    /// is released.
    pub fn release(&self, target_url: &str) {
        let mut relays = self.relays.lock().expect("relay directory poisoned");
        let last_ref = match relays.get_mut(target_url) {
            Some(entry) => {
                entry.refs = entry.refs.saturating_sub(1);
                entry.refs == 0
            }
            None => false,
        };
        if last_ref {
            relays.remove(target_url);
            tracing::info!(target = %target_url, "relay client released");
        }
    }

    /// Find the master relay that lists `source_url` as a sub-stream
    ///
    /// Returns the sub-stream index and the live relay handle. `None` if
    /// the URL is not in any group, or the group's master relay has not
    /// been created yet.
    pub fn find_master_for_substream(&self, source_url: &str) -> Option<(usize, Arc<dyn Relay>)> {
        let (index, master_url) = self.config.substream_slot(source_url)?;
        let relays = self.relays.lock().expect("relay directory poisoned");
        relays
            .get(master_url)
            .map(|entry| (index, Arc::clone(&entry.relay)))
    }

    /// Whether `source_url` belongs to any configured sub-stream group
    pub fn is_substream(&self, source_url: &str) -> bool {
        self.config.substream_slot(source_url).is_some()
    }

    /// Number of live relay clients
    pub fn relay_count(&self) -> usize {
        self.relays.lock().expect("relay directory poisoned").len()
    }
}
