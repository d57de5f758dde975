use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

use exam_core::Clock;
use exam_core::cooldown::{self, CooldownRecord, CooldownStatus};
use exam_core::model::{AssessmentKind, daily_cooldown};
use storage::repository::{JsonStoreExt, KeyValueStore, StorageError};

use crate::timer::{CancelHandle, Scheduler, TickFlow};

/// Storage key holding the last start of the daily assessment.
pub const COOLDOWN_KEY: &str = "exam.daily_quiz.last_taken";

/// How often a watched gate re-evaluates availability.
pub const RECHECK_PERIOD: StdDuration = StdDuration::from_secs(60);

/// Storage key for the last start of `kind`.
#[must_use]
pub fn cooldown_key(kind: AssessmentKind) -> String {
    format!("exam.{}.last_taken", kind.as_str().replace('-', "_"))
}

/// Rate-limits a gated assessment to one start per window.
///
/// Clones share one reservation lock, so checks and records made through
/// any clone are serialized.
#[derive(Clone)]
pub struct CooldownGate {
    clock: Clock,
    store: Arc<dyn KeyValueStore>,
    key: Arc<str>,
    window: Duration,
    lock: Arc<Mutex<()>>,
}

/// A start slot taken by [`CooldownGate::try_reserve`].
///
/// The record is already written; hand it back to
/// [`CooldownGate::release`] if the session never becomes active.
#[derive(Debug)]
#[must_use = "release the reservation if the session does not start"]
pub struct CooldownReservation {
    previous: Option<CooldownRecord>,
    taken_at: DateTime<Utc>,
}

impl CooldownReservation {
    #[must_use]
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }
}

impl CooldownGate {
    #[must_use]
    pub fn new(
        clock: Clock,
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        window: Duration,
    ) -> Self {
        Self {
            clock,
            store,
            key: Arc::from(key.into()),
            window,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Gate over the record of one assessment kind.
    #[must_use]
    pub fn for_kind(
        clock: Clock,
        store: Arc<dyn KeyValueStore>,
        kind: AssessmentKind,
        window: Duration,
    ) -> Self {
        Self::new(clock, store, cooldown_key(kind), window)
    }

    /// Gate with the 24 hour daily window.
    #[must_use]
    pub fn daily(clock: Clock, store: Arc<dyn KeyValueStore>) -> Self {
        Self::for_kind(clock, store, AssessmentKind::DailyQuiz, daily_cooldown())
    }

    /// Same record and lock, evaluated against another window.
    #[must_use]
    pub fn with_window(&self, window: Duration) -> Self {
        Self {
            window,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    async fn load(&self) -> Option<CooldownRecord> {
        match self.store.get_json::<CooldownRecord>(&self.key).await {
            Ok(record) => record,
            Err(err) => {
                warn!(
                    error = %err,
                    key = %self.key,
                    "cooldown record unreadable, treating as absent"
                );
                None
            }
        }
    }

    async fn write(&self, now: DateTime<Utc>) -> Result<(), StorageError> {
        self.store
            .set_json(&self.key, &CooldownRecord::new(now))
            .await?;
        debug!(at = %now, key = %self.key, "cooldown recorded");
        Ok(())
    }

    /// Availability and next opening at `now`.
    pub async fn status_at(&self, now: DateTime<Utc>) -> CooldownStatus {
        let record = self.load().await;
        cooldown::evaluate(record.as_ref(), self.window, now)
    }

    /// Availability according to the gate's clock.
    pub async fn status(&self) -> CooldownStatus {
        self.status_at(self.clock.now()).await
    }

    pub async fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now).await.available
    }

    /// Check availability and record a start at `now` as one step.
    ///
    /// A failed write is logged and the slot is still granted.
    ///
    /// # Errors
    ///
    /// Returns the current `CooldownStatus` when the window has not elapsed.
    pub async fn try_reserve(
        &self,
        now: DateTime<Utc>,
    ) -> Result<CooldownReservation, CooldownStatus> {
        let _guard = self.lock.lock().await;
        let previous = self.load().await;
        let status = cooldown::evaluate(previous.as_ref(), self.window, now);
        if !status.available {
            return Err(status);
        }
        if let Err(err) = self.write(now).await {
            warn!(error = %err, key = %self.key, "failed to record cooldown");
        }
        Ok(CooldownReservation {
            previous,
            taken_at: now,
        })
    }

    /// Undo `reservation`, restoring whatever was recorded before it.
    ///
    /// Nothing changes if a later start already replaced the record.
    pub async fn release(&self, reservation: CooldownReservation) {
        let _guard = self.lock.lock().await;
        let current = self.load().await;
        if current.map(|r| r.last_taken_at) != Some(reservation.taken_at) {
            debug!(key = %self.key, "cooldown record changed, nothing to release");
            return;
        }
        let restored = match reservation.previous {
            Some(previous) => self.store.set_json(&self.key, &previous).await,
            None => self.store.remove(&self.key).await,
        };
        match restored {
            Ok(()) => debug!(key = %self.key, "cooldown reservation released"),
            Err(err) => warn!(error = %err, key = %self.key, "failed to release cooldown"),
        }
    }

    /// Record that the gated assessment started at `now`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written.
    pub async fn record_taken(&self, now: DateTime<Utc>) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        self.write(now).await
    }

    /// Publish availability now and again every `period`.
    ///
    /// The schedule stops once every receiver is dropped or the handle is
    /// cancelled.
    pub async fn watch(
        &self,
        scheduler: &dyn Scheduler,
        period: StdDuration,
    ) -> (watch::Receiver<CooldownStatus>, CancelHandle) {
        let (tx, rx) = watch::channel(self.status().await);
        let tx = Arc::new(tx);
        let gate = self.clone();

        let handle = scheduler.schedule_every(
            period,
            Box::new(move || {
                let gate = gate.clone();
                let tx = Arc::clone(&tx);
                Box::pin(async move {
                    if tx.is_closed() {
                        return TickFlow::Stop;
                    }
                    let status = gate.status().await;
                    tx.send_if_modified(|current| {
                        let changed = *current != status;
                        *current = status;
                        changed
                    });
                    TickFlow::Continue
                })
            }),
        );

        (rx, handle)
    }
}
