//! Market Data models.
//!
//! Includes `MarketPacket` for a single received datagram and `ChannelMessage`
//! for the unit published on a category channel.

use crate::classifier::Classification;
use crate::model::Category;
use serde::{Deserialize, Serialize};

/// One received UDP datagram.
///
/// The payload is kept exactly as received. This struct is also the envelope
/// encoded into the body frame on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPacket {
    /// Arrival time, microseconds since the Unix epoch (UTC).
    arrival_micros: i64,
    /// The UDP port the datagram arrived on.
    port: u16,
    /// The raw datagram.
    payload: Vec<u8>,
}

impl MarketPacket {
    /// Creates a new MarketPacket.
    ///
    /// # Arguments
    ///
    /// * `arrival_micros` - Arrival time in microseconds since the Unix epoch.
    /// * `port` - The UDP port of the channel that received it.
    /// * `payload` - The datagram bytes.
    ///
    /// # Returns
    ///
    /// A new `MarketPacket`.
    pub fn new(arrival_micros: i64, port: u16, payload: Vec<u8>) -> Self {
        Self {
            arrival_micros,
            port,
            payload,
        }
    }

    pub fn get_arrival_micros(&self) -> i64 {
        self.arrival_micros
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn get_payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// A packet together with the classifier's verdict.
///
/// This is what the channel readers hand to the publisher task.
#[derive(Debug, Clone)]
pub struct ClassifiedPacket {
    pub classification: Classification,
    pub packet: MarketPacket,
}

/// The unit placed on (and taken from) a category channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    category: Category,
    packet: MarketPacket,
}

impl ChannelMessage {
    pub fn new(category: Category, packet: MarketPacket) -> Self {
        Self { category, packet }
    }

    pub fn get_category(&self) -> Category {
        self.category
    }

    pub fn get_packet(&self) -> &MarketPacket {
        &self.packet
    }

    pub fn into_packet(self) -> MarketPacket {
        self.packet
    }
}
