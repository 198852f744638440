use crate::model::Category;
use crate::saver::worker::SubscriberLoop;
use log::error;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

/// Owns the thread of one [`SubscriberLoop`].
pub struct SubscriberRunner {
    category: Category,
    handle: Option<JoinHandle<()>>,
    stop_tx: Sender<()>,
}

impl SubscriberRunner {
    /// Starts `worker` on a dedicated, named thread.
    pub fn spawn(worker: SubscriberLoop) -> std::io::Result<Self> {
        let category = worker.category();
        let (stop_tx, stop_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(format!("saver-{}", category.short_label()))
            .spawn(move || worker.run(stop_rx))?;

        Ok(Self {
            category,
            handle: Some(handle),
            stop_tx,
        })
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Asks the loop to drain and exit without waiting for it.
    pub fn request_stop(&self) {
        let _ = self.stop_tx.send(());
    }

    /// Stops the loop and waits until its files are closed.
    pub fn shutdown(&mut self) {
        self.request_stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Subscriber thread for {} panicked", self.category);
            }
        }
    }
}

impl Drop for SubscriberRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
