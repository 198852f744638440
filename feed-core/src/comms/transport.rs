use crate::comms::error::BusError;
use std::time::Duration;

/// A raw bus message: topic frame and body frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub topic: String,
    pub body: Vec<u8>,
}

/// Result of a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The transport was saturated and the message was discarded.
    Dropped,
}

/// Abstraction for the outgoing transport layer (sending raw frames).
///
/// Implementations never block: a saturated transport drops the message and
/// reports [`SendOutcome::Dropped`].
pub trait TransportOutput: Send {
    fn send_frame(&mut self, topic: &str, body: &[u8]) -> Result<SendOutcome, BusError>;
}

/// Abstraction for the incoming transport layer (reading raw frames).
/// Implementation details (ZMQ, Memory) are hidden behind this trait.
pub trait TransportInput: Send {
    /// Waits up to `timeout` for the next frame.
    ///
    /// Returns `Ok(None)` if nothing arrived in time.
    fn recv_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, BusError>;

    /// Returns the next frame if one is already queued.
    fn try_recv_frame(&mut self) -> Result<Option<Frame>, BusError>;
}
