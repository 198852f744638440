//! Core data models shared by the receiver and the log saver.
//!
//! Both processes agree on the category set, the channel names and the
//! envelope carried on the bus, so they are defined once here.
//!
//! # Submodules
//! - [`category`]: The six instrument categories and the feed kinds they derive from.
//! - [`market_data`]: Received packets and the messages placed on the bus.

pub mod category;
pub mod market_data;

pub use category::{Category, FeedKind, Listing, DIAGNOSTIC_TOPIC};
pub use market_data::{ChannelMessage, ClassifiedPacket, MarketPacket};
