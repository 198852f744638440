//! The log saver: one subscriber loop per category.
//!
//! Each loop runs on its own thread with its own bus subscriber and log
//! writer, so a slow or failing category never holds back the others.

pub mod runner;
pub mod runner_manager;
pub mod worker;

pub use runner::SubscriberRunner;
pub use runner_manager::RunnerManager;
pub use worker::{LoopSettings, SubscriberLoop};

use crate::comms::{BusError, BusSubscriber};
use crate::config::{ConfigError, FeedConfig};
use crate::fs::{LogPaths, LogWriter};
use crate::model::Category;
use crate::session::SessionGate;
use crate::stats::SaverStats;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Starts the six subscriber loops.
///
/// # Arguments
///
/// * `config` - A configuration that passed `validate_saver`.
/// * `connect` - Opens the bus subscriber of one category.
/// * `stats` - Counters shared with the status reporter.
///
/// # Returns
///
/// * `Ok(RunnerManager)` holding one running loop per category.
/// * `Err` if a subscriber cannot be opened or a thread cannot be spawned.
///   Loops started before the failure are shut down.
pub fn spawn_saver<F>(
    config: &FeedConfig,
    mut connect: F,
    stats: Arc<SaverStats>,
) -> Result<RunnerManager>
where
    F: FnMut(Category) -> Result<BusSubscriber, BusError>,
{
    let base_dir = config
        .saver
        .log_base_dir
        .clone()
        .ok_or(ConfigError::MissingLogDir)?;
    let paths = LogPaths::new(base_dir);
    let gate = SessionGate::new(config.session.window()?);
    let clock = config.session.wall_clock()?;
    let settings = LoopSettings {
        poll_interval: Duration::from_millis(config.saver.poll_interval_ms),
        disk_backoff: config.saver.backoff,
    };

    let mut manager = RunnerManager::new();
    for category in Category::ALL {
        let subscriber = connect(category)
            .with_context(|| format!("Failed to subscribe to {}", category))?;
        let writer = LogWriter::new(paths.clone(), config.saver.flush_policy);
        let worker = SubscriberLoop::new(
            category,
            subscriber,
            gate,
            clock,
            writer,
            Arc::clone(&stats),
            settings,
        );
        let runner = SubscriberRunner::spawn(worker)
            .with_context(|| format!("Failed to start subscriber thread for {}", category))?;
        manager.add(runner);
    }
    Ok(manager)
}
