//! Single-slot background worker
//!
//! At most one unit of work runs at a time. Submitting a new unit cancels the
//! in-flight one and waits for it to unwind before starting, so shared state
//! is only ever touched by one unit.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};

struct Running {
    label: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct Worker {
    current: Option<Running>,
}

/// Handle to a submitted unit of work
pub struct TaskHandle<T> {
    receiver: mpsc::Receiver<Result<T>>,
    token: CancellationToken,
}

impl<T> TaskHandle<T> {
    /// Block until the unit finishes
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().unwrap_or(Err(Error::Cancelled))
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Worker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` on the worker thread, replacing whatever is running
    pub fn submit<T, F>(&mut self, label: &str, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&CancellationToken) -> Result<T> + Send + 'static,
    {
        self.cancel_current();

        let token = CancellationToken::new();
        let (sender, receiver) = mpsc::channel();
        let thread_token = token.clone();
        let thread_label = label.to_string();

        let handle = thread::spawn(move || {
            let result = work(&thread_token);
            match &result {
                Err(Error::Cancelled) => debug!(task = %thread_label, "Task cancelled"),
                Err(e) => error!(task = %thread_label, "Task failed: {}", e),
                Ok(_) => debug!(task = %thread_label, "Task finished"),
            }
            let _ = sender.send(result);
        });

        self.current = Some(Running {
            label: label.to_string(),
            token: token.clone(),
            handle,
        });

        TaskHandle { receiver, token }
    }

    /// Cancel the in-flight unit, if any, and wait for it to stop
    pub fn cancel_current(&mut self) {
        if let Some(running) = self.current.take() {
            running.token.cancel();
            if running.handle.join().is_err() {
                error!(task = %running.label, "Task panicked");
            }
        }
    }

    /// Whether a unit is still running
    pub fn is_busy(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.cancel_current();
    }
}
