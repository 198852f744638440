//! KRX derivatives multicast receiver.
//!
//! Joins every configured channel, classifies each datagram as it arrives and
//! publishes it on the bus channel of its category.

use anyhow::{Context, Result};
use feed_core::args::CommonArgs;
use feed_core::classifier::Classifier;
use feed_core::comms;
use feed_core::config::{ConfigError, FeedConfig};
use feed_core::receiver::{MulticastOpener, MulticastReceiver, ReceiverSettings};
use feed_core::signal::shutdown_signal;
use feed_core::stats::ReceiverStats;
use log::info;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 1. Configuration
    let args = CommonArgs::parse_args(std::env::args().collect());
    let service = args.get_service_name();
    let config = FeedConfig::load(&args.get_config_path())?;
    config.validate_receiver()?;
    let interface = config
        .receiver
        .interface
        .ok_or(ConfigError::MissingInterface)?;

    // 2. Classifier tables
    let classifier = Classifier::from_config(&config.classifier)?;
    info!(
        "[{}] Classifier ready: {} TR codes, {} stock futures prefixes, {} stock options prefixes",
        service,
        classifier.tr_code_count(),
        classifier.stock_futures_count(),
        classifier.stock_options_count()
    );

    // 3. Bus
    let context = zmq::Context::new();
    let publisher = comms::build_publisher(&context, &config.bus)
        .context("Failed to start the bus publisher")?;
    info!("[{}] Publishing on {}", service, config.bus.endpoint);

    // 4. Join every channel before receiving anything
    let channels = config.channels();
    let stats = Arc::new(ReceiverStats::new(channels.iter().map(|c| c.name.clone())));
    let opener = Arc::new(MulticastOpener::new(
        interface,
        config.receiver.recv_buffer_bytes,
    ));
    let receiver = MulticastReceiver::bind(
        &channels,
        opener,
        Arc::new(classifier),
        ReceiverSettings::from(&config.receiver),
        Arc::clone(&stats),
    )?;
    info!(
        "[{}] Joined {} channels on {}",
        service,
        receiver.channel_count(),
        interface
    );
    let handle = receiver.spawn(publisher);

    // 5. Report until asked to stop
    let mut ticker = tokio::time::interval(Duration::from_secs(config.stats_interval_secs));
    ticker.tick().await;
    let signal = shutdown_signal();
    tokio::pin!(signal);
    loop {
        tokio::select! {
            _ = &mut signal => break,
            _ = ticker.tick() => info!("[{}] {}", service, stats.summary()),
        }
    }

    handle.shutdown().await;
    info!("[{}] Stopped. {}", service, stats.summary());
    Ok(())
}
