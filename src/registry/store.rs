//! Stream registry implementation
//!
//! The central directory mapping stream keys to live [`Stream`]s. The
//! network layer hands every negotiated publisher and subscriber to the
//! registry, which routes it to the right stream, creating the stream
//! on first reference and handling publisher handover when a different
//! source re-claims an existing key. A periodic sweep reaps streams
//! whose endpoints have all gone silent.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::config::RegistryConfig;
use super::stream::{Stream, StreamStats};
use crate::endpoint::{EndpointInfo, PacketReader, PacketWriter};
use crate::relay::RelayDirectory;

/// Directory of all live streams
///
/// Thread-safe via `RwLock`; the sweeper and the attach paths mutate the
/// table concurrently, so iteration always happens over a snapshot.
pub struct StreamRegistry {
    /// Map of stream key to stream
    streams: RwLock<HashMap<String, Arc<Stream>>>,

    /// Shared outbound relay directory, handed to every stream
    relays: Arc<RelayDirectory>,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a registry with default configuration
    pub fn new(relays: Arc<RelayDirectory>) -> Self {
        Self::with_config(relays, RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    pub fn with_config(relays: Arc<RelayDirectory>, config: RegistryConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            relays,
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Route a newly negotiated publisher to its stream
    ///
    /// Any publisher already on the key is stopped with `"stop old"`. If
    /// it was a *different* publisher (by UID), this is a handover: a
    /// fresh stream replaces the entry and every subscriber migrates to
    /// it with a rebased timestamp origin, so viewers transition
    /// seamlessly to the new source.
    pub async fn attach_reader(&self, reader: Arc<dyn PacketReader>) {
        let info = reader.info();
        tracing::info!(stream = %info.key, uid = %info.uid, "publisher attached");

        let target = {
            let mut streams = self.streams.write().await;
            match streams.get(&info.key).cloned() {
                Some(existing) => {
                    existing.stop_publish().await;
                    match existing.publisher_id().await {
                        Some(previous) if previous != info.uid => {
                            tracing::info!(
                                stream = %info.key,
                                old_uid = %previous,
                                new_uid = %info.uid,
                                "publisher handover"
                            );
                            let fresh = self.new_stream(&info);
                            existing.migrate_subscribers(&fresh).await;
                            streams.insert(info.key.clone(), Arc::clone(&fresh));
                            fresh
                        }
                        _ => existing,
                    }
                }
                None => {
                    let fresh = self.new_stream(&info);
                    streams.insert(info.key.clone(), Arc::clone(&fresh));
                    fresh
                }
            }
        };

        target.add_reader(reader).await;
    }

    /// Route a newly negotiated subscriber to its stream
    ///
    /// A missing key creates the stream, so subscribers may arrive before
    /// the publisher and wait for it; the writer is added either way.
    pub async fn attach_writer(&self, writer: Arc<dyn PacketWriter>) {
        let info = writer.info();
        tracing::info!(stream = %info.key, uid = %info.uid, "subscriber attached");

        let stream = {
            let mut streams = self.streams.write().await;
            match streams.get(&info.key).cloned() {
                Some(stream) => stream,
                None => {
                    let fresh = self.new_stream(&info);
                    streams.insert(info.key.clone(), Arc::clone(&fresh));
                    fresh
                }
            }
        };

        stream.add_writer(writer).await;
    }

    /// Get the stream at `key`, if any
    pub async fn get(&self, key: &str) -> Option<Arc<Stream>> {
        self.streams.read().await.get(key).cloned()
    }

    /// Number of registered streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Statistics for the stream at `key`, if any
    pub async fn stream_stats(&self, key: &str) -> Option<StreamStats> {
        let stream = self.get(key).await?;
        Some(stream.stats().await)
    }

    /// Run the liveness sweep once
    ///
    /// Checks every stream and removes those with zero live endpoints.
    /// The check closes timed-out endpoints as a side effect.
    pub async fn sweep(&self) {
        let snapshot: Vec<(String, Arc<Stream>)> = {
            let streams = self.streams.read().await;
            streams
                .iter()
                .map(|(key, stream)| (key.clone(), Arc::clone(stream)))
                .collect()
        };

        for (key, stream) in snapshot {
            if stream.check_alive().await == 0 {
                let mut streams = self.streams.write().await;
                // A handover may have replaced the entry since the
                // snapshot; only remove the stream we checked.
                let same = streams
                    .get(&key)
                    .map_or(false, |current| Arc::ptr_eq(current, &stream));
                if same {
                    streams.remove(&key);
                    tracing::info!(stream = %key, "stream removed by sweep");
                }
            }
        }
    }

    /// Spawn the periodic sweeper task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_sweeper_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.sweep().await;
            }
        })
    }

    fn new_stream(&self, info: &EndpointInfo) -> Arc<Stream> {
        Arc::new(Stream::new(
            info.clone(),
            Arc::clone(&self.relays),
            self.config.max_gop_bytes,
        ))
    }
}
