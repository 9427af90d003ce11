//! Cancellable fixed-interval task runner.
//!
//! Ticks are serialized: a slow tick delays the next one instead of causing a
//! burst. Stopping lets the in-flight tick finish.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::error::VrfError;

#[async_trait]
pub trait PeriodicTask: Send + 'static {
    fn name(&self) -> &'static str;

    /// One iteration. Failures are handled inside; the loop never sees them.
    async fn run_tick(&mut self);
}

pub struct TaskHandle {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signals stop and waits for the loop to return.
    pub async fn shutdown(self) -> Result<(), VrfError> {
        self.stop();
        self.join
            .await
            .map_err(|e| VrfError::Invariant(format!("task {} panicked: {e}", self.name)))
    }
}

pub fn spawn_periodic<T: PeriodicTask>(mut task: T, period: Duration) -> TaskHandle {
    let name = task.name();
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(task = name, period_ms = period.as_millis() as u64, "task started");
        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    debug!(task = name, "tick");
                    task.run_tick().await;
                }
            }
        }
        info!(task = name, "task stopped");
    });
    TaskHandle { name, stop_tx, join }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct Counter {
        ticks: Arc<AtomicU32>,
        tick_time: Duration,
    }

    #[async_trait]
    impl PeriodicTask for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        async fn run_tick(&mut self) {
            tokio::time::sleep(self.tick_time).await;
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_waits_for_in_flight_tick() {
        let ticks = Arc::new(AtomicU32::new(0));
        let handle = spawn_periodic(
            Counter { ticks: ticks.clone(), tick_time: Duration::from_millis(300) },
            Duration::from_millis(1000),
        );

        // First tick fires immediately and is mid-sleep at 100ms.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        handle.shutdown().await.unwrap();
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_the_loop() {
        let ticks = Arc::new(AtomicU32::new(0));
        let handle = spawn_periodic(
            Counter { ticks: ticks.clone(), tick_time: Duration::from_millis(10) },
            Duration::from_millis(1000),
        );
        assert_eq!(handle.name(), "counter");
        assert!(!handle.is_finished());

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ticks_do_not_burst() {
        let ticks = Arc::new(AtomicU32::new(0));
        let handle = spawn_periodic(
            Counter { ticks: ticks.clone(), tick_time: Duration::from_millis(2500) },
            Duration::from_millis(1000),
        );

        // Ticks start at 0, 2500, 5000, 7500; each completes 2500ms later.
        tokio::time::sleep(Duration::from_millis(9000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        handle.shutdown().await.unwrap();
    }
}
