//! The per-category subscriber loop.

use crate::backoff::{Backoff, BackoffConfig};
use crate::comms::BusSubscriber;
use crate::fs::{LogWriter, WriteError};
use crate::model::{Category, ChannelMessage};
use crate::session::{SessionGate, WallClock};
use crate::stats::SaverStats;
use chrono::NaiveDateTime;
use log::{debug, error, info, warn};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Tuning of a [`SubscriberLoop`].
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Longest wait for a message before the stop signal is checked again.
    pub poll_interval: Duration,
    /// Suspension schedule after a failed write.
    pub disk_backoff: BackoffConfig,
}

/// Consumes one category channel and persists it.
///
/// The loop handles:
/// 1. Receiving messages in channel order.
/// 2. Dropping messages outside the trading session.
/// 3. Appending the payload to the day's log file.
/// 4. Suspending writes for a while when the disk fails.
/// 5. Draining what was already received when asked to stop.
pub struct SubscriberLoop {
    category: Category,
    subscriber: BusSubscriber,
    gate: SessionGate,
    clock: WallClock,
    writer: LogWriter,
    stats: Arc<SaverStats>,
    poll_interval: Duration,
    backoff: Backoff,
    suspended_until: Option<Instant>,
}

impl SubscriberLoop {
    pub fn new(
        category: Category,
        subscriber: BusSubscriber,
        gate: SessionGate,
        clock: WallClock,
        writer: LogWriter,
        stats: Arc<SaverStats>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            category,
            subscriber,
            gate,
            clock,
            writer,
            stats,
            poll_interval: settings.poll_interval,
            backoff: Backoff::new(settings.disk_backoff),
            suspended_until: None,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Runs until `stop_rx` fires or its sender is dropped.
    ///
    /// On exit every message already queued in the subscriber is processed and
    /// all log files are closed.
    pub fn run(mut self, stop_rx: Receiver<()>) {
        info!("Subscriber for {} started", self.category);

        loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            match self.subscriber.recv_timeout(self.poll_interval) {
                Ok(Some(message)) => self.handle(message),
                Ok(None) => self.on_idle(),
                Err(e) if e.is_decode() => {
                    warn!("{}: dropping undecodable message: {}", self.category, e);
                    self.stats.decode_errors.incr(self.category);
                }
                Err(e) => {
                    error!("{}: bus receive failed: {}", self.category, e);
                    thread::sleep(self.poll_interval);
                }
            }
        }

        let drained = self.drain();
        info!(
            "Subscriber for {} stopping, drained {} queued messages",
            self.category, drained
        );

        if let Err(e) = self.writer.close_all() {
            error!("{}: failed to close log files: {}", self.category, e);
        }
    }

    /// Processes one message.
    pub fn handle(&mut self, message: ChannelMessage) {
        if message.get_category() != self.category {
            warn!(
                "{}: ignoring message published on {}",
                self.category,
                message.get_category()
            );
            self.stats.decode_errors.incr(self.category);
            return;
        }

        let packet = message.into_packet();
        let timestamp = self.timestamp_of(packet.get_arrival_micros());

        if !self.gate.is_open(timestamp) {
            self.stats.out_of_session.incr(self.category);
            return;
        }

        if let Some(until) = self.suspended_until {
            if Instant::now() < until {
                self.stats.dropped_disk.incr(self.category);
                return;
            }
            self.suspended_until = None;
        }

        match self
            .writer
            .append(self.category, timestamp, packet.get_payload())
        {
            Ok(()) => {
                self.stats.written.incr(self.category);
                if self.stats.set_disk_failing(self.category, false) {
                    info!("{}: disk writes recovered", self.category);
                    self.backoff.reset();
                }
            }
            Err(e) => self.on_write_error(e),
        }
    }

    /// Wall-clock time of a message, from its arrival stamp.
    fn timestamp_of(&self, arrival_micros: i64) -> NaiveDateTime {
        self.clock.at_micros(arrival_micros).unwrap_or_else(|| {
            warn!(
                "{}: arrival time {} out of range, using current time",
                self.category, arrival_micros
            );
            self.clock.now()
        })
    }

    fn on_idle(&mut self) {
        if let Err(e) = self.writer.flush_pending() {
            self.on_write_error(e);
        }
    }

    fn on_write_error(&mut self, err: WriteError) {
        self.stats.write_errors.incr(self.category);

        let delay = self.backoff.next_delay();
        self.suspended_until = Some(Instant::now() + delay);

        if self.stats.set_disk_failing(self.category, true) {
            warn!(
                "{}: disk write still failing (attempt {}): {}. Retrying in {:?}",
                self.category,
                self.backoff.attempts(),
                err,
                delay
            );
        } else {
            error!(
                "{}: disk write failing: {}. Suspending writes for {:?}",
                self.category, err, delay
            );
        }
    }

    fn drain(&mut self) -> usize {
        let mut drained = 0;
        loop {
            match self.subscriber.try_recv() {
                Ok(Some(message)) => {
                    self.handle(message);
                    drained += 1;
                }
                Ok(None) => break,
                Err(e) if e.is_decode() => {
                    self.stats.decode_errors.incr(self.category);
                }
                Err(e) => {
                    debug!("{}: drain stopped: {}", self.category, e);
                    break;
                }
            }
        }
        drained
    }
}
