//! Typed bus endpoints.
//!
//! Provides `BusPublisher` and `BusSubscriber`, which handle the envelope
//! encoding and the topic of each category channel.

use crate::comms::error::BusError;
use crate::comms::transport::{Frame, SendOutcome, TransportInput, TransportOutput};
use crate::model::{Category, ChannelMessage, MarketPacket, DIAGNOSTIC_TOPIC};
use std::time::Duration;

/// Publishing side of the bus.
///
/// There is exactly one publisher per bus, so messages of a category are
/// delivered in the order they were published.
pub struct BusPublisher {
    transport: Box<dyn TransportOutput>,
}

impl BusPublisher {
    /// Creates a new BusPublisher from a raw transport backend.
    ///
    /// # Arguments
    ///
    /// * `transport` - The underlying transport implementation (e.g. ZMQ, Memory).
    pub fn new(transport: Box<dyn TransportOutput>) -> Self {
        Self { transport }
    }

    /// Publishes a message on its category's channel.
    ///
    /// # Returns
    ///
    /// * `Ok(SendOutcome)`: `Dropped` if the bus was saturated.
    /// * `Err` if encoding or the transport fails.
    pub fn publish(&mut self, message: &ChannelMessage) -> Result<SendOutcome, BusError> {
        let body = bincode::serialize(message.get_packet())?;
        self.transport
            .send_frame(message.get_category().topic(), &body)
    }

    /// Publishes an unclassified packet on the diagnostic channel.
    pub fn publish_diagnostic(&mut self, packet: &MarketPacket) -> Result<SendOutcome, BusError> {
        let body = bincode::serialize(packet)?;
        self.transport.send_frame(DIAGNOSTIC_TOPIC, &body)
    }
}

/// Subscribing side of the bus.
pub struct BusSubscriber {
    transport: Box<dyn TransportInput>,
}

impl BusSubscriber {
    pub fn new(transport: Box<dyn TransportInput>) -> Self {
        Self { transport }
    }

    /// Waits up to `timeout` for the next message.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(ChannelMessage))` when a message arrived.
    /// * `Ok(None)` on timeout.
    /// * `Err` if the transport failed or the message could not be decoded.
    ///   [`BusError::is_decode`] tells the two apart.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<ChannelMessage>, BusError> {
        match self.transport.recv_frame(timeout)? {
            Some(frame) => decode(frame).map(Some),
            None => Ok(None),
        }
    }

    /// Returns the next message if one is already queued.
    pub fn try_recv(&mut self) -> Result<Option<ChannelMessage>, BusError> {
        match self.transport.try_recv_frame()? {
            Some(frame) => decode(frame).map(Some),
            None => Ok(None),
        }
    }
}

fn decode(frame: Frame) -> Result<ChannelMessage, BusError> {
    let category =
        Category::from_topic(&frame.topic).ok_or(BusError::UnknownTopic(frame.topic))?;
    let packet: MarketPacket = bincode::deserialize(&frame.body)?;
    Ok(ChannelMessage::new(category, packet))
}
