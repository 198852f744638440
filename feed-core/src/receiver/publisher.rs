use crate::classifier::Classification;
use crate::comms::{BusPublisher, SendOutcome};
use crate::model::{ChannelMessage, ClassifiedPacket};
use crate::stats::ReceiverStats;
use log::{error, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Forwards classified packets to the bus.
///
/// This task is the only producer on the bus, so every category channel sees
/// its packets in the order the readers queued them. It returns once every
/// reader has dropped its sender and the queue is empty.
pub(crate) async fn run_publisher(
    mut queue: mpsc::Receiver<ClassifiedPacket>,
    mut publisher: BusPublisher,
    publish_unclassified: bool,
    stats: Arc<ReceiverStats>,
) {
    while let Some(item) = queue.recv().await {
        let result = match item.classification {
            Classification::Classified(category) => {
                let message = ChannelMessage::new(category, item.packet);
                let result = publisher.publish(&message);
                if let Ok(SendOutcome::Sent) = result {
                    stats.published.incr(category);
                }
                result
            }
            Classification::Unclassified(_) if publish_unclassified => {
                publisher.publish_diagnostic(&item.packet)
            }
            Classification::Unclassified(_) => continue,
        };

        match result {
            Ok(SendOutcome::Sent) => {}
            Ok(SendOutcome::Dropped) => {
                let dropped = stats.bus_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 10_000 == 0 {
                    warn!("Bus saturated, {} messages dropped so far", dropped);
                }
            }
            Err(e) => {
                let errors = stats.publish_errors.fetch_add(1, Ordering::Relaxed) + 1;
                if errors == 1 || errors % 1_000 == 0 {
                    error!("Failed to publish ({} errors so far): {}", errors, e);
                }
            }
        }
    }

    info!("Publisher drained, exiting");
}
