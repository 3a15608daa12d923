use std::thread::JoinHandle;

use crossbeam_channel::Sender;

use crate::error::{AnalysisError, Result};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Deferred work queue served by one background thread, so triggering an
/// analysis never blocks the caller. Tasks run one at a time in submission
/// order.
pub struct Scheduler {
    tx: Option<Sender<Task>>,
    worker: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(name: &str) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<Task>();
        let worker = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for task in rx {
                    task();
                }
                log::debug!("scheduler worker exiting");
            })?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
        self.tx
            .as_ref()
            .ok_or(AnalysisError::SchedulerClosed)?
            .send(Box::new(task))
            .map_err(|_| AnalysisError::SchedulerClosed)
    }

    /// Finish queued tasks, then stop the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("scheduler worker panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
