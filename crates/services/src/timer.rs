//! Recurring tick scheduling with explicit cancellation.
//!
//! Callers hand a [`Scheduler`] a task to run every `period`; the returned
//! [`CancelHandle`] stops it. [`TokioScheduler`] drives tasks from the tokio
//! clock, [`ManualScheduler`] only fires when told to, for deterministic tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

/// Whether a scheduled task wants to keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

pub type TickFuture = Pin<Box<dyn Future<Output = TickFlow> + Send>>;
pub type TickTask = Box<dyn FnMut() -> TickFuture + Send>;

/// Stops a scheduled task. Cloning shares the same underlying token.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the task. A tick already in flight runs to completion.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub trait Scheduler: Send + Sync {
    /// Run `task` every `period`, first after one full period.
    fn schedule_every(&self, period: Duration, task: TickTask) -> CancelHandle;
}

/// Spawns one tokio task per schedule. Must be called inside a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_every(&self, period: Duration, mut task: TickTask) -> CancelHandle {
        let handle = CancelHandle::new();
        let token = handle.token.clone();

        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        if task().await == TickFlow::Stop {
                            break;
                        }
                    }
                }
            }
            token.cancel();
        });

        handle
    }
}

struct ManualSlot {
    period: Duration,
    handle: CancelHandle,
    task: Option<TickTask>,
}

/// Scheduler whose tasks run only when [`ManualScheduler::fire`] is awaited.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    slots: Arc<Mutex<Vec<ManualSlot>>>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of schedules that have not been cancelled or stopped.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots
            .lock()
            .map(|slots| slots.iter().filter(|s| !s.handle.is_cancelled()).count())
            .unwrap_or(0)
    }

    /// Periods of all schedules ever registered, in registration order.
    #[must_use]
    pub fn periods(&self) -> Vec<Duration> {
        self.slots
            .lock()
            .map(|slots| slots.iter().map(|s| s.period).collect())
            .unwrap_or_default()
    }

    /// Run every live task once, in registration order. Returns how many ran.
    pub async fn fire(&self) -> usize {
        let pending: Vec<(usize, CancelHandle, TickTask)> = {
            let Ok(mut slots) = self.slots.lock() else {
                return 0;
            };
            slots
                .iter_mut()
                .enumerate()
                .filter(|(_, s)| !s.handle.is_cancelled())
                .filter_map(|(i, s)| s.task.take().map(|t| (i, s.handle.clone(), t)))
                .collect()
        };

        let mut ran = 0;
        for (index, handle, mut task) in pending {
            if handle.is_cancelled() {
                continue;
            }
            ran += 1;
            if task().await == TickFlow::Stop {
                handle.cancel();
            }
            if let Ok(mut slots) = self.slots.lock() {
                slots[index].task = Some(task);
            }
        }
        ran
    }

    /// Call [`ManualScheduler::fire`] `times` times.
    pub async fn fire_times(&self, times: usize) {
        for _ in 0..times {
            self.fire().await;
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_every(&self, period: Duration, task: TickTask) -> CancelHandle {
        let handle = CancelHandle::new();
        if let Ok(mut slots) = self.slots.lock() {
            slots.push(ManualSlot {
                period,
                handle: handle.clone(),
                task: Some(task),
            });
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_task(counter: Arc<AtomicU32>, stop_after: u32) -> TickTask {
        Box::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= stop_after {
                    TickFlow::Stop
                } else {
                    TickFlow::Continue
                }
            })
        })
    }

    #[tokio::test]
    async fn manual_scheduler_fires_until_stopped() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicU32::new(0));
        let handle =
            scheduler.schedule_every(Duration::from_secs(1), counting_task(counter.clone(), 3));

        scheduler.fire_times(5).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(handle.is_cancelled());
        assert_eq!(scheduler.live_count(), 0);
    }

    #[tokio::test]
    async fn manual_scheduler_respects_cancel() {
        let scheduler = ManualScheduler::new();
        let counter = Arc::new(AtomicU32::new(0));
        let handle =
            scheduler.schedule_every(Duration::from_secs(1), counting_task(counter.clone(), 100));
        scheduler.fire().await;
        handle.cancel();
        assert_eq!(scheduler.fire().await, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_ticks_once_per_period() {
        let counter = Arc::new(AtomicU32::new(0));
        let handle = TokioScheduler
            .schedule_every(Duration::from_secs(1), counting_task(counter.clone(), 100));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_stops_when_task_asks() {
        let counter = Arc::new(AtomicU32::new(0));
        let handle = TokioScheduler
            .schedule_every(Duration::from_secs(1), counting_task(counter.clone(), 2));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(handle.is_cancelled());
    }
}
