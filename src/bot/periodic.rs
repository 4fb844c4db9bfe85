//! Background tasks that run on a fixed interval until cancelled.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Handle to a task that runs `tick` every `period`.
///
/// The first run happens one full period after spawning. Dropping the handle
/// (or calling [`cancel`](Self::cancel)) stops the task; a tick already in
/// progress is allowed to finish.
pub struct PeriodicTask {
    name: &'static str,
    cancel: Arc<Notify>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = Arc::new(Notify::new());
        let cancel_clone = cancel.clone();

        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = cancel_clone.notified() => {
                        debug!("Periodic task '{name}' cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        tick().await;
                    }
                }
            }
        });

        Self { name, cancel }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        // notify_one stores a permit, so cancellation is not lost if the
        // task is mid-tick.
        self.cancel.notify_one();
    }
}
