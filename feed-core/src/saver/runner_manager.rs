use crate::saver::runner::SubscriberRunner;
use log::info;

/// Manages the subscriber runners of one process.
#[derive(Default)]
pub struct RunnerManager {
    runners: Vec<SubscriberRunner>,
}

impl RunnerManager {
    /// Creates a new, empty RunnerManager.
    pub fn new() -> Self {
        Self {
            runners: Vec::new(),
        }
    }

    pub fn add(&mut self, runner: SubscriberRunner) {
        self.runners.push(runner);
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    /// Shuts down all runners managed by this manager.
    ///
    /// Every loop is signalled first so they drain in parallel, then each
    /// is joined.
    pub fn shutdown(mut self) {
        for runner in &self.runners {
            runner.request_stop();
        }
        for mut runner in self.runners.drain(..) {
            runner.shutdown();
            info!("Subscriber for {} stopped", runner.category());
        }
    }
}
