//! Daily-assessment cooldown evaluation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// When a gated assessment was last started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownRecord {
    pub last_taken_at: DateTime<Utc>,
}

impl CooldownRecord {
    #[must_use]
    pub fn new(last_taken_at: DateTime<Utc>) -> Self {
        Self { last_taken_at }
    }

    /// Earliest instant at which the next gated session may start.
    #[must_use]
    pub fn next_available_at(&self, window: Duration) -> DateTime<Utc> {
        self.last_taken_at + window
    }
}

/// Result of evaluating the gate at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownStatus {
    pub available: bool,
    /// `None` when nothing was ever recorded.
    pub next_available_at: Option<DateTime<Utc>>,
}

/// Evaluate availability at `now`.
///
/// Available when no record exists, or when at least `window` has elapsed
/// since `last_taken_at`. A record in the future counts as not yet elapsed.
#[must_use]
pub fn evaluate(
    record: Option<&CooldownRecord>,
    window: Duration,
    now: DateTime<Utc>,
) -> CooldownStatus {
    match record {
        None => CooldownStatus {
            available: true,
            next_available_at: None,
        },
        Some(record) => CooldownStatus {
            available: now.signed_duration_since(record.last_taken_at) >= window,
            next_available_at: Some(record.next_available_at(window)),
        },
    }
}

#[must_use]
pub fn is_available(record: Option<&CooldownRecord>, window: Duration, now: DateTime<Utc>) -> bool {
    evaluate(record, window, now).available
}
