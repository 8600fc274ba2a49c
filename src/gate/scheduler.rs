//! Flush scheduler
//!
//! Background task that asks the queue manager to flush:
//!
//! ```text
//!   interval tick ─────────────┐
//!   policy changed (restart) ──┤
//!   went online (forced) ──────┼──► QueueManager::flush
//!   FlushTrigger ──────────────┘
//! ```
//!
//! Passes never overlap: the queue manager's own guard skips a pass while
//! another is in flight, and the loop awaits each pass before selecting again.

use crate::policy::Policy;
use crate::queue::QueueManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Out-of-band flush request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Forced pass (SOS enqueue): ignores connectivity and due times
    Immediate,
    /// Regular pass ahead of the next tick
    Nudge,
}

impl FlushTrigger {
    pub fn is_forced(&self) -> bool {
        matches!(self, FlushTrigger::Immediate)
    }
}

/// Running scheduler
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for the in-flight pass to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }

    /// Whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Scheduler inputs
pub struct FlushScheduler {
    queue: Arc<QueueManager>,
    policy: watch::Receiver<Arc<Policy>>,
    online: watch::Receiver<bool>,
    triggers: mpsc::Receiver<FlushTrigger>,
}

impl FlushScheduler {
    pub fn new(
        queue: Arc<QueueManager>,
        policy: watch::Receiver<Arc<Policy>>,
        online: watch::Receiver<bool>,
        triggers: mpsc::Receiver<FlushTrigger>,
    ) -> Self {
        Self {
            queue,
            policy,
            online,
            triggers,
        }
    }

    /// Spawn the loop
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle { shutdown, join }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut period = self.policy.borrow_and_update().flush_interval();
        let mut ticker = flush_ticker(period);
        info!(flush_interval_ms = period.as_millis() as u64, "Flush scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.queue.flush(false).await;
                }
                changed = self.policy.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = self.policy.borrow_and_update().flush_interval();
                    if next != period {
                        debug!(flush_interval_ms = next.as_millis() as u64, "Flush interval changed, restarting timer");
                        period = next;
                        ticker = flush_ticker(period);
                    }
                    self.queue.flush(false).await;
                }
                changed = self.online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *self.online.borrow_and_update();
                    if online {
                        debug!("Network online, forcing flush");
                        self.queue.flush(true).await;
                    }
                }
                trigger = self.triggers.recv() => match trigger {
                    Some(trigger) => {
                        self.queue.flush(trigger.is_forced()).await;
                    }
                    None => break,
                },
            }
        }

        info!("Flush scheduler stopped");
    }
}

/// Interval whose first tick is one full period away
fn flush_ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
