use crate::comms::error::BusError;
use crate::comms::transport::{Frame, SendOutcome, TransportInput, TransportOutput};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

struct Subscription {
    topics: Vec<String>,
    sender: SyncSender<Frame>,
}

impl Subscription {
    /// Prefix matching, as ZMQ does.
    fn matches(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| topic.starts_with(t.as_str()))
    }
}

/// In-process bus with PUB/SUB semantics.
///
/// Each subscriber gets a bounded queue. A full queue drops the message for
/// that subscriber only, mirroring the ZMQ high-water mark.
#[derive(Clone)]
pub struct MemoryBus {
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    capacity: usize,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            capacity,
        }
    }

    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            subscriptions: Arc::clone(&self.subscriptions),
        }
    }

    /// Registers a subscriber. Only messages published afterwards are seen.
    pub fn subscriber(&self, topics: &[&str]) -> MemorySubscriber {
        let (sender, receiver) = mpsc::sync_channel(self.capacity);
        let subscription = Subscription {
            topics: topics.iter().map(|t| t.to_string()).collect(),
            sender,
        };
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscription);
        MemorySubscriber { receiver }
    }
}

pub struct MemoryPublisher {
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl TransportOutput for MemoryPublisher {
    fn send_frame(&mut self, topic: &str, body: &[u8]) -> Result<SendOutcome, BusError> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut outcome = SendOutcome::Sent;
        subscriptions.retain(|sub| {
            if !sub.matches(topic) {
                return true;
            }
            let frame = Frame {
                topic: topic.to_string(),
                body: body.to_vec(),
            };
            match sub.sender.try_send(frame) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    outcome = SendOutcome::Dropped;
                    true
                }
                // Subscriber went away.
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
        Ok(outcome)
    }
}

pub struct MemorySubscriber {
    receiver: Receiver<Frame>,
}

impl TransportInput for MemorySubscriber {
    fn recv_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, BusError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BusError::Disconnected),
        }
    }

    fn try_recv_frame(&mut self) -> Result<Option<Frame>, BusError> {
        match self.receiver.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(BusError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_by_topic() {
        let bus = MemoryBus::new(16);
        let mut index = bus.subscriber(&["krx:futures:index"]);
        let mut all_futures = bus.subscriber(&["krx:futures:"]);
        let mut publisher = bus.publisher();

        publisher.send_frame("krx:futures:stock", b"s").unwrap();
        publisher.send_frame("krx:futures:index", b"i").unwrap();
        publisher.send_frame("krx:options:put:index", b"p").unwrap();

        let frame = index.try_recv_frame().unwrap().unwrap();
        assert_eq!(frame.body, b"i");
        assert!(index.try_recv_frame().unwrap().is_none());

        assert_eq!(all_futures.try_recv_frame().unwrap().unwrap().body, b"s");
        assert_eq!(all_futures.try_recv_frame().unwrap().unwrap().body, b"i");
        assert!(all_futures.try_recv_frame().unwrap().is_none());
    }

    #[test]
    fn test_full_subscriber_drops() {
        let bus = MemoryBus::new(2);
        let mut slow = bus.subscriber(&["t"]);
        let mut publisher = bus.publisher();

        assert_eq!(publisher.send_frame("t", b"1").unwrap(), SendOutcome::Sent);
        assert_eq!(publisher.send_frame("t", b"2").unwrap(), SendOutcome::Sent);
        assert_eq!(
            publisher.send_frame("t", b"3").unwrap(),
            SendOutcome::Dropped
        );

        assert_eq!(slow.try_recv_frame().unwrap().unwrap().body, b"1");
        assert_eq!(slow.try_recv_frame().unwrap().unwrap().body, b"2");
        assert!(slow
            .recv_frame(Duration::from_millis(5))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_dropped_subscriber_is_forgotten() {
        let bus = MemoryBus::new(1);
        let subscriber = bus.subscriber(&["t"]);
        drop(subscriber);

        let mut publisher = bus.publisher();
        assert_eq!(publisher.send_frame("t", b"1").unwrap(), SendOutcome::Sent);
        assert_eq!(publisher.send_frame("t", b"2").unwrap(), SendOutcome::Sent);
    }
}
