//! Counters shared between the pipeline tasks and the status reporter.
//!
//! Everything is a relaxed atomic: counters are only read for reporting.

use crate::classifier::UnclassifiedReason;
use crate::model::Category;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// One counter per category.
#[derive(Debug, Default)]
pub struct CategoryCounters([AtomicU64; 6]);

impl CategoryCounters {
    pub fn incr(&self, category: Category) {
        self.0[category.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, category: Category) -> u64 {
        self.0[category.index()].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }
}

/// Multicast receiver statistics.
#[derive(Debug)]
pub struct ReceiverStats {
    pub received: AtomicU64,
    pub published: CategoryCounters,
    unclassified: [AtomicU64; 3],
    /// Packets lost because the reader-to-publisher queue was full.
    pub queue_dropped: AtomicU64,
    /// Packets the bus discarded at its high-water mark.
    pub bus_dropped: AtomicU64,
    pub socket_errors: AtomicU64,
    pub publish_errors: AtomicU64,
    channels: Vec<(String, AtomicBool)>,
}

impl ReceiverStats {
    /// Creates zeroed counters for the given channel names.
    pub fn new(channel_names: impl IntoIterator<Item = String>) -> Self {
        Self {
            received: AtomicU64::new(0),
            published: CategoryCounters::default(),
            unclassified: Default::default(),
            queue_dropped: AtomicU64::new(0),
            bus_dropped: AtomicU64::new(0),
            socket_errors: AtomicU64::new(0),
            publish_errors: AtomicU64::new(0),
            channels: channel_names
                .into_iter()
                .map(|name| (name, AtomicBool::new(false)))
                .collect(),
        }
    }

    pub fn incr_unclassified(&self, reason: UnclassifiedReason) {
        self.unclassified[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn unclassified(&self, reason: UnclassifiedReason) -> u64 {
        self.unclassified[reason.index()].load(Ordering::Relaxed)
    }

    /// Marks channel `index` as down (`true`) or receiving (`false`).
    ///
    /// # Returns
    ///
    /// The previous state, so callers can log transitions only.
    pub fn set_feed_down(&self, index: usize, down: bool) -> bool {
        self.channels
            .get(index)
            .map(|(_, flag)| flag.swap(down, Ordering::Relaxed))
            .unwrap_or(false)
    }

    pub fn is_feed_down(&self, index: usize) -> bool {
        self.channels
            .get(index)
            .is_some_and(|(_, flag)| flag.load(Ordering::Relaxed))
    }

    pub fn feeds_down(&self) -> Vec<&str> {
        self.channels
            .iter()
            .filter(|(_, flag)| flag.load(Ordering::Relaxed))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// One-line status for the periodic report.
    pub fn summary(&self) -> String {
        let mut line = format!("received={}", self.received.load(Ordering::Relaxed));
        for category in Category::ALL {
            let _ = write!(line, " {}={}", category.short_label(), self.published.get(category));
        }
        for reason in UnclassifiedReason::ALL {
            let _ = write!(line, " {}={}", reason.label(), self.unclassified(reason));
        }
        let _ = write!(
            line,
            " queue_dropped={} bus_dropped={} socket_errors={} publish_errors={}",
            self.queue_dropped.load(Ordering::Relaxed),
            self.bus_dropped.load(Ordering::Relaxed),
            self.socket_errors.load(Ordering::Relaxed),
            self.publish_errors.load(Ordering::Relaxed),
        );
        let down = self.feeds_down();
        if !down.is_empty() {
            let _ = write!(line, " FEED DOWN: {}", down.join(","));
        }
        line
    }
}

/// Log saver statistics.
#[derive(Debug, Default)]
pub struct SaverStats {
    pub written: CategoryCounters,
    pub out_of_session: CategoryCounters,
    /// Messages discarded while a category's disk writes were suspended.
    pub dropped_disk: CategoryCounters,
    pub write_errors: CategoryCounters,
    pub decode_errors: CategoryCounters,
    disk_failing: [AtomicBool; 6],
}

impl SaverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous state.
    pub fn set_disk_failing(&self, category: Category, failing: bool) -> bool {
        self.disk_failing[category.index()].swap(failing, Ordering::Relaxed)
    }

    pub fn is_disk_failing(&self, category: Category) -> bool {
        self.disk_failing[category.index()].load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(Category::ALL.len());
        let mut failing = Vec::new();
        for category in Category::ALL {
            parts.push(format!(
                "{}={}/{}/{}",
                category.short_label(),
                self.written.get(category),
                self.out_of_session.get(category),
                self.dropped_disk.get(category),
            ));
            if self.is_disk_failing(category) {
                failing.push(category.short_label());
            }
        }

        let mut line = format!(
            "written/out_of_session/dropped_disk {} write_errors={} decode_errors={}",
            parts.join(" "),
            self.write_errors.total(),
            self.decode_errors.total(),
        );
        if !failing.is_empty() {
            let _ = write!(line, " DISK WRITE FAILING: {}", failing.join(","));
        }
        line
    }
}
