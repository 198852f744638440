//! One task per multicast channel.

use crate::backoff::Backoff;
use crate::classifier::{Classification, Classifier};
use crate::config::ChannelConfig;
use crate::model::{ClassifiedPacket, MarketPacket};
use crate::receiver::multicast::SocketOpener;
use crate::stats::ReceiverStats;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

/// Largest possible UDP payload.
const MAX_DATAGRAM: usize = 65_536;

pub(crate) struct ChannelReader {
    pub(crate) index: usize,
    pub(crate) channel: ChannelConfig,
    pub(crate) socket: UdpSocket,
    pub(crate) opener: Arc<dyn SocketOpener>,
    pub(crate) classifier: Arc<Classifier>,
    pub(crate) queue: mpsc::Sender<ClassifiedPacket>,
    pub(crate) stats: Arc<ReceiverStats>,
    pub(crate) backoff: Backoff,
    pub(crate) feed_down_after: u32,
}

impl ChannelReader {
    /// Receives until `shutdown` turns true or its sender is dropped.
    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, _)) => self.on_datagram(&buf[..len]),
                    Err(e) => {
                        if !self.rejoin(e, &mut shutdown).await {
                            break;
                        }
                    }
                },
            }
        }

        debug!("Reader for {} exiting", self.channel.name);
    }

    fn on_datagram(&mut self, data: &[u8]) {
        let arrival_micros = Utc::now().timestamp_micros();
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        if self.stats.set_feed_down(self.index, false) {
            info!("Feed restored on {}", self.channel.name);
        }
        if self.backoff.attempts() > 0 {
            self.backoff.reset();
        }

        let classification = self.classifier.classify(self.channel.kind, data);
        if let Classification::Unclassified(reason) = classification {
            self.stats.incr_unclassified(reason);
            debug!(
                "Unclassified packet on {} ({}, {} bytes)",
                self.channel.name,
                reason.label(),
                data.len()
            );
        }

        let item = ClassifiedPacket {
            classification,
            packet: MarketPacket::new(arrival_micros, self.channel.port, data.to_vec()),
        };

        match self.queue.try_send(item) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.stats.queue_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 10_000 == 0 {
                    warn!("Publish queue full, {} packets dropped so far", dropped);
                }
            }
            // Publisher already gone: the process is shutting down.
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Re-opens the channel after a socket error.
    ///
    /// # Returns
    ///
    /// * `true` once a fresh socket is in place.
    /// * `false` if shutdown was requested while retrying.
    async fn rejoin(&mut self, err: std::io::Error, shutdown: &mut watch::Receiver<bool>) -> bool {
        self.stats.socket_errors.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Receive failed on {} ({}:{}): {}. Re-joining",
            self.channel.name, self.channel.group, self.channel.port, err
        );

        loop {
            let delay = self.backoff.next_delay();
            tokio::select! {
                _ = stopped(shutdown) => return false,
                _ = tokio::time::sleep(delay) => {}
            }

            match self
                .opener
                .open(&self.channel)
                .and_then(UdpSocket::from_std)
            {
                Ok(socket) => {
                    self.socket = socket;
                    info!("Re-joined {} after {} attempts", self.channel.name, self.backoff.attempts());
                    return true;
                }
                Err(e) => {
                    self.stats.socket_errors.fetch_add(1, Ordering::Relaxed);
                    let attempts = self.backoff.attempts();
                    if attempts >= self.feed_down_after && !self.stats.set_feed_down(self.index, true) {
                        error!(
                            "FEED DOWN: {} ({}:{}) failed {} consecutive re-joins: {}",
                            self.channel.name, self.channel.group, self.channel.port, attempts, e
                        );
                    } else {
                        warn!("Re-join of {} failed (attempt {}): {}", self.channel.name, attempts, e);
                    }
                }
            }
        }
    }
}

/// Resolves once shutdown is requested. A dropped sender counts as a request.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffConfig;
    use crate::classifier::{parse_tr_code, DEFAULT_TR_CODES};
    use crate::model::FeedKind;
    use std::io;
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicUsize;

    /// Refuses the first `refusals` opens, then binds on loopback.
    struct FlakyOpener {
        refusals: usize,
        calls: AtomicUsize,
    }

    impl SocketOpener for FlakyOpener {
        fn open(&self, _channel: &ChannelConfig) -> io::Result<std::net::UdpSocket> {
            if self.calls.fetch_add(1, Ordering::Relaxed) < self.refusals {
                return Err(io::Error::new(io::ErrorKind::AddrNotAvailable, "interface down"));
            }
            let socket = std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
            socket.set_nonblocking(true)?;
            Ok(socket)
        }
    }

    fn reader(refusals: usize, queue_capacity: usize) -> (ChannelReader, mpsc::Receiver<ClassifiedPacket>) {
        let channel = ChannelConfig::new("futures0", Ipv4Addr::new(233, 38, 231, 92), 10302, FeedKind::Futures);
        let std_socket = std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        std_socket.set_nonblocking(true).unwrap();
        let (queue, queue_rx) = mpsc::channel(queue_capacity);

        let reader = ChannelReader {
            index: 0,
            stats: Arc::new(ReceiverStats::new([channel.name.clone()])),
            channel,
            socket: UdpSocket::from_std(std_socket).unwrap(),
            opener: Arc::new(FlakyOpener {
                refusals,
                calls: AtomicUsize::new(0),
            }),
            classifier: Arc::new(Classifier::new(
                DEFAULT_TR_CODES.iter().map(|c| parse_tr_code(c).unwrap()),
                [],
                [],
            )),
            queue,
            backoff: Backoff::new(BackoffConfig::new(1, 5)),
            feed_down_after: 3,
        };
        (reader, queue_rx)
    }

    fn reset() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionReset, "link lost")
    }

    #[tokio::test]
    async fn test_rejoin_marks_feed_down_then_recovers() {
        let (mut reader, _queue_rx) = reader(4, 16);
        let (_stop_tx, mut stop_rx) = watch::channel(false);

        assert!(reader.rejoin(reset(), &mut stop_rx).await);

        // 4 refusals and 1 success: down after the 3rd, still down after the 5th open.
        assert!(reader.stats.is_feed_down(0));
        assert_eq!(reader.backoff.attempts(), 5);
        assert_eq!(reader.stats.socket_errors.load(Ordering::Relaxed), 5);
        assert!(reader.stats.summary().contains("FEED DOWN: futures0"));

        // The first datagram on the new socket clears the flag.
        reader.on_datagram(b"A301F000000000001KR4101V90009");
        assert!(!reader.stats.is_feed_down(0));
        assert_eq!(reader.backoff.attempts(), 0);
    }

    #[tokio::test]
    async fn test_short_outage_is_not_feed_down() {
        let (mut reader, _queue_rx) = reader(1, 16);
        let (_stop_tx, mut stop_rx) = watch::channel(false);

        assert!(reader.rejoin(reset(), &mut stop_rx).await);
        assert!(!reader.stats.is_feed_down(0));
        assert_eq!(reader.backoff.attempts(), 2);
    }

    #[tokio::test]
    async fn test_rejoin_gives_up_on_shutdown() {
        let (mut reader, _queue_rx) = reader(usize::MAX, 16);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();

        assert!(!reader.rejoin(reset(), &mut stop_rx).await);
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_counts() {
        let (mut reader, mut queue_rx) = reader(0, 2);

        for _ in 0..5 {
            reader.on_datagram(b"A301F000000000001KR4101V90009");
        }

        assert_eq!(reader.stats.received.load(Ordering::Relaxed), 5);
        assert_eq!(reader.stats.queue_dropped.load(Ordering::Relaxed), 3);
        assert!(queue_rx.try_recv().is_ok());
        assert!(queue_rx.try_recv().is_ok());
        assert!(queue_rx.try_recv().is_err());
    }
}
