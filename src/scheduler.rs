//! Periodic sweep tasks owned by the stores that need them

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Handle to a background sweep.
///
/// The task runs until [`SweepHandle::cancel`] is called or the handle is
/// dropped, so a store that owns one never leaks its timer past its own
/// lifetime.
pub struct SweepHandle {
    name: &'static str,
    stop: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Spawn `sweep` every `period` on the current tokio runtime.
    ///
    /// The first run happens one full period after spawning.
    pub fn spawn<F>(name: &'static str, period: Duration, mut sweep: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::new(Notify::new());
        let stop_signal = stop.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() fires immediately; skip that tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!(sweep = name, "Running sweep");
                        sweep();
                    }
                    _ = stop_signal.notified() => {
                        debug!(sweep = name, "Sweep stopped");
                        break;
                    }
                }
            }
        });

        info!(sweep = name, period_ms = period.as_millis() as u64, "Sweep task started");

        Self {
            name,
            stop,
            task: Some(task),
        }
    }

    /// Name given at spawn time
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the task is still alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the sweep. Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            // notify_one stores a permit if the task is mid-sweep
            self.stop.notify_one();
            task.abort();
            info!(sweep = self.name, "Sweep task cancelled");
        }
    }

    /// Stop the sweep and wait for the task to wind down
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            self.stop.notify_one();
            let _ = task.await;
            info!(sweep = self.name, "Sweep task shut down");
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SweepHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepHandle")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}
