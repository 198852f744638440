use thiserror::Error;
use zmq::Error as ZmqError;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("ZMQ Error: {0}")]
    Zmq(#[from] ZmqError),

    #[error("Failed to bind {endpoint}: {source}")]
    Bind { endpoint: String, source: ZmqError },

    #[error("Failed to connect to {endpoint}: {source}")]
    Connect { endpoint: String, source: ZmqError },

    #[error("Expected a [topic, body] message, got {0} frames")]
    MalformedFrame(usize),

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Failed to decode message body: {0}")]
    Decode(#[from] bincode::Error),

    #[error("Bus disconnected")]
    Disconnected,
}

impl BusError {
    /// True when a single message was bad but the bus itself is healthy.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            BusError::MalformedFrame(_) | BusError::UnknownTopic(_) | BusError::Decode(_)
        )
    }
}
