//! Multicast ingestion.
//!
//! ```text
//! channel reader ─┐
//! channel reader ─┼─> bounded queue ─> publisher task ─> bus
//! channel reader ─┘
//! ```
//!
//! Each channel has its own reader task, which stamps the arrival time and
//! classifies the datagram inline. A single publisher task drains the queue
//! onto the bus, so per-category order is preserved. When the queue is full,
//! readers drop and count rather than block the socket.

pub mod multicast;
mod publisher;
mod reader;

pub use multicast::{MulticastOpener, SocketOpener};

use crate::backoff::{Backoff, BackoffConfig};
use crate::classifier::Classifier;
use crate::comms::BusPublisher;
use crate::config::{ChannelConfig, ReceiverConfig};
use crate::model::ClassifiedPacket;
use crate::stats::ReceiverStats;
use log::{info, warn};
use reader::ChannelReader;
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("Failed to join channel {name} ({group}:{port}): {source}")]
    Join {
        name: String,
        group: Ipv4Addr,
        port: u16,
        source: std::io::Error,
    },

    #[error("No channels configured")]
    NoChannels,
}

/// Runtime knobs of the receiver pipeline.
#[derive(Debug, Clone, Copy)]
pub struct ReceiverSettings {
    pub queue_capacity: usize,
    pub publish_unclassified: bool,
    pub feed_down_after: u32,
    pub backoff: BackoffConfig,
}

impl From<&ReceiverConfig> for ReceiverSettings {
    fn from(config: &ReceiverConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            publish_unclassified: config.publish_unclassified,
            feed_down_after: config.feed_down_after,
            backoff: config.backoff,
        }
    }
}

/// All channels joined, not yet receiving.
pub struct MulticastReceiver {
    readers: Vec<ChannelReader>,
    queue_rx: mpsc::Receiver<ClassifiedPacket>,
    publish_unclassified: bool,
    stats: Arc<ReceiverStats>,
}

impl MulticastReceiver {
    /// Opens the socket of every channel.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `channels` - Channels to join. `stats` must have been created with
    ///   their names, in the same order.
    /// * `opener` - Creates (and later re-creates) each socket.
    /// * `classifier` - Shared classification tables.
    /// * `settings` - Queue size, diagnostics and retry policy.
    /// * `stats` - Counters shared with the status reporter.
    ///
    /// # Returns
    ///
    /// * `Ok(MulticastReceiver)` when every channel is joined.
    /// * `Err(ReceiverError)` for the first channel that cannot be opened.
    pub fn bind(
        channels: &[ChannelConfig],
        opener: Arc<dyn SocketOpener>,
        classifier: Arc<Classifier>,
        settings: ReceiverSettings,
        stats: Arc<ReceiverStats>,
    ) -> Result<Self, ReceiverError> {
        if channels.is_empty() {
            return Err(ReceiverError::NoChannels);
        }

        let (queue_tx, queue_rx) = mpsc::channel(settings.queue_capacity);
        let mut readers = Vec::with_capacity(channels.len());

        for (index, channel) in channels.iter().enumerate() {
            let socket = opener
                .open(channel)
                .and_then(UdpSocket::from_std)
                .map_err(|source| ReceiverError::Join {
                    name: channel.name.clone(),
                    group: channel.group,
                    port: channel.port,
                    source,
                })?;
            info!(
                "Joined {} ({}:{}, {})",
                channel.name, channel.group, channel.port, channel.kind
            );

            readers.push(ChannelReader {
                index,
                channel: channel.clone(),
                socket,
                opener: Arc::clone(&opener),
                classifier: Arc::clone(&classifier),
                queue: queue_tx.clone(),
                stats: Arc::clone(&stats),
                backoff: Backoff::new(settings.backoff),
                feed_down_after: settings.feed_down_after,
            });
        }

        Ok(Self {
            readers,
            queue_rx,
            publish_unclassified: settings.publish_unclassified,
            stats,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.readers.len()
    }

    /// Starts the reader tasks and the publisher task.
    pub fn spawn(self, publisher: BusPublisher) -> ReceiverHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let readers = self
            .readers
            .into_iter()
            .map(|reader| tokio::spawn(reader.run(shutdown_rx.clone())))
            .collect();

        let publisher = tokio::spawn(publisher::run_publisher(
            self.queue_rx,
            publisher,
            self.publish_unclassified,
            self.stats,
        ));

        ReceiverHandle {
            shutdown_tx,
            readers,
            publisher,
        }
    }
}

/// Controls a running receiver.
pub struct ReceiverHandle {
    shutdown_tx: watch::Sender<bool>,
    readers: Vec<JoinHandle<()>>,
    publisher: JoinHandle<()>,
}

impl ReceiverHandle {
    /// Stops the readers, then waits for the publisher to flush the queue.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        for reader in self.readers {
            if let Err(e) = reader.await {
                warn!("Reader task failed: {}", e);
            }
        }
        // Every sender is gone now, so the publisher finishes the queue and exits.
        if let Err(e) = self.publisher.await {
            warn!("Publisher task failed: {}", e);
        }
    }
}
