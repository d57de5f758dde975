use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::assessment::AssessmentKind;
use crate::model::ids::ResultId;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("score must be finite and >= 0, got {0}")]
    InvalidScore(f64),

    #[error("score {score} exceeds total questions {total}")]
    ScoreAboveTotal { score: f64, total: u32 },

    #[error("result must list at least one topic")]
    NoTopics,
}

/// A completed assessment as stored in history. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    id: ResultId,
    #[serde(alias = "date")]
    timestamp: DateTime<Utc>,
    score: f64,
    total_questions: u32,
    #[serde(rename = "type")]
    kind: AssessmentKind,
    topics: Vec<String>,
}

impl TestResult {
    /// Create a new result with a freshly generated id.
    ///
    /// # Errors
    ///
    /// Returns `ResultError` if the clamped score is negative, non-finite or
    /// above `total_questions`, or if `topics` is empty.
    pub fn new(
        kind: AssessmentKind,
        topics: Vec<String>,
        score: f64,
        total_questions: u32,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ResultError> {
        Self::from_persisted(
            ResultId::generate(),
            timestamp,
            score,
            total_questions,
            kind,
            topics,
        )
    }

    /// Rehydrate a result from persisted storage.
    ///
    /// # Errors
    ///
    /// Same checks as [`TestResult::new`].
    pub fn from_persisted(
        id: ResultId,
        timestamp: DateTime<Utc>,
        score: f64,
        total_questions: u32,
        kind: AssessmentKind,
        topics: Vec<String>,
    ) -> Result<Self, ResultError> {
        if !score.is_finite() || score < 0.0 {
            return Err(ResultError::InvalidScore(score));
        }
        if score > f64::from(total_questions) {
            return Err(ResultError::ScoreAboveTotal {
                score,
                total: total_questions,
            });
        }
        if topics.is_empty() {
            return Err(ResultError::NoTopics);
        }

        Ok(Self {
            id,
            timestamp,
            score,
            total_questions,
            kind,
            topics,
        })
    }

    #[must_use]
    pub fn id(&self) -> &ResultId {
        &self.id
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn kind(&self) -> AssessmentKind {
        self.kind
    }

    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Score as a percentage of the question count; 0 for an empty test.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total_questions == 0 {
            return 0.0;
        }
        self.score / f64::from(self.total_questions) * 100.0
    }
}
