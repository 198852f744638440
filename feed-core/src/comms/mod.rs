//! Topic based publish/subscribe bus.
//!
//! Every message is two frames: the topic, then the bincode encoded
//! [`MarketPacket`](crate::model::MarketPacket) envelope. Subscribers filter by
//! topic so each category channel only sees its own traffic.
//!
//! Two transports exist: ZMQ PUB/SUB between processes, and an in-process
//! memory bus used by tests and single-process setups.

pub mod builder;
pub mod error;
pub mod socket;
pub mod transport;
pub mod transports;

pub use builder::{build_publisher, build_subscriber};
pub use error::BusError;
pub use socket::{BusPublisher, BusSubscriber};
pub use transport::{Frame, SendOutcome, TransportInput, TransportOutput};
pub use transports::memory::MemoryBus;
