//! Session-aware raw packet logger.
//!
//! Subscribes to the six category channels and appends every in-session
//! packet to `{log_base_dir}/{YYYY-MM-DD}/{category}.log`.

use anyhow::{Context, Result};
use feed_core::args::CommonArgs;
use feed_core::comms;
use feed_core::config::{ConfigError, FeedConfig};
use feed_core::fs::LogPaths;
use feed_core::saver::spawn_saver;
use feed_core::signal::shutdown_signal;
use feed_core::stats::SaverStats;
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
    config.validate_saver()?;

    // 2. The log directory must accept writes before anything is consumed
    let base_dir = config
        .saver
        .log_base_dir
        .clone()
        .ok_or(ConfigError::MissingLogDir)?;
    LogPaths::new(&base_dir).probe_writable()?;
    let window = config.session.window()?;
    info!(
        "[{}] Logging to {} during {}-{} ({:?})",
        service,
        base_dir.display(),
        window.open(),
        window.close(),
        config.saver.flush_policy
    );

    // 3. One subscriber loop per category
    let context = zmq::Context::new();
    let stats = Arc::new(SaverStats::new());
    let manager = spawn_saver(
        &config,
        |category| comms::build_subscriber(&context, &config.bus, category),
        Arc::clone(&stats),
    )
    .context("Failed to start subscribers")?;
    info!(
        "[{}] {} subscribers connected to {}",
        service,
        manager.len(),
        config.bus.endpoint
    );

    // 4. Report until asked to stop
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

    // 5. Drain and close every file
    tokio::task::spawn_blocking(move || manager.shutdown())
        .await
        .context("Subscriber shutdown failed")?;
    info!("[{}] Stopped. {}", service, stats.summary());
    Ok(())
}
