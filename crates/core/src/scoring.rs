//! Negative-marking scorer.
//!
//! Each answered question contributes `+1` when correct and
//! `-negative_marking` when wrong; unanswered questions contribute nothing.
//! The reported score is floored at zero.

use std::collections::BTreeMap;

use crate::model::Question;

/// Outcome of scoring one session.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreSummary {
    pub raw_score: f64,
    pub clamped_score: f64,
    pub total: u32,
    pub attempted: u32,
    pub unattempted: u32,
    pub correct: u32,
    pub incorrect: u32,
}

impl ScoreSummary {
    /// Clamped score as a percentage of `total`; 0 when there were no questions.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.clamped_score / f64::from(self.total) * 100.0
    }
}

/// Score `answers` (sparse, keyed by question index) against `questions`.
///
/// Answers whose index is outside `questions` are ignored.
#[must_use]
pub fn score(
    questions: &[Question],
    answers: &BTreeMap<usize, String>,
    negative_marking: f64,
) -> ScoreSummary {
    let mut correct = 0_u32;
    let mut incorrect = 0_u32;

    for (index, question) in questions.iter().enumerate() {
        match answers.get(&index) {
            None => {}
            Some(answer) if question.is_correct(answer) => correct = correct.saturating_add(1),
            Some(_) => incorrect = incorrect.saturating_add(1),
        }
    }

    let total = u32::try_from(questions.len()).unwrap_or(u32::MAX);
    let attempted = correct + incorrect;
    let raw_score = f64::from(correct) - f64::from(incorrect) * negative_marking;

    ScoreSummary {
        raw_score,
        clamped_score: raw_score.max(0.0),
        total,
        attempted,
        unattempted: total - attempted,
        correct,
        incorrect,
    }
}
