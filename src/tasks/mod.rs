//! Background task registry.
//!
//! Long-lived tasks (scheduler supervisor, future services) register here so
//! shutdown is a single bounded operation: flip the shared signal, wait up to
//! a deadline, abort anything still running.

use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Entry {
    name: String,
    handle: JoinHandle<()>,
}

pub struct TaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<Entry>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    /// Signal receiver for tasks that want to observe shutdown themselves.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Spawn and track a named task.
    pub fn spawn<F>(&mut self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        debug!("Spawning background task: {name}");
        self.tasks.push(Entry {
            name: name.to_string(),
            handle: tokio::spawn(future),
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal shutdown and wait up to `timeout` for all tasks. Tasks still
    /// running at the deadline are aborted.
    pub async fn shutdown(mut self, timeout: Duration) {
        info!("Shutting down {} background task(s)", self.tasks.len());
        self.shutdown_tx.send_replace(true);

        let aborts: Vec<_> = self.tasks.iter().map(|e| (e.name.clone(), e.handle.abort_handle())).collect();
        let joins = join_all(self.tasks.drain(..).map(|e| e.handle));

        if tokio::time::timeout(timeout, joins).await.is_err() {
            for (name, abort) in aborts {
                if !abort.is_finished() {
                    warn!("Task {name:?} did not stop within {timeout:?}, aborting");
                    abort.abort();
                }
            }
        }
        info!("Background tasks stopped");
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
