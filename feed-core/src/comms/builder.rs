//! Factory functions for creating bus endpoints.
//!
//! Abstracts the creation of `BusPublisher` and `BusSubscriber` over ZMQ.

use super::socket::{BusPublisher, BusSubscriber};
use super::transports::zmq::{ZmqPublisher, ZmqSubscriber};
use crate::comms::error::BusError;
use crate::config::BusConfig;
use crate::model::Category;

/// Binds the bus publisher.
///
/// # Arguments
///
/// * `context` - Shared ZMQ context.
/// * `config` - Endpoint and high-water mark.
///
/// # Returns
///
/// * `Ok(BusPublisher)` if successful.
/// * `Err` if the endpoint cannot be bound.
pub fn build_publisher(context: &zmq::Context, config: &BusConfig) -> Result<BusPublisher, BusError> {
    let transport = ZmqPublisher::bind(context, config)?;
    Ok(BusPublisher::new(Box::new(transport)))
}

/// Connects a subscriber to the channel of one category.
///
/// # Arguments
///
/// * `context` - Shared ZMQ context.
/// * `config` - Endpoint, high-water mark and reconnect policy.
/// * `category` - The only channel this subscriber receives.
pub fn build_subscriber(
    context: &zmq::Context,
    config: &BusConfig,
    category: Category,
) -> Result<BusSubscriber, BusError> {
    let transport = ZmqSubscriber::connect(context, config, &[category.topic()])?;
    Ok(BusSubscriber::new(Box::new(transport)))
}
