//! Session state machine.
//!
//! A session moves `Idle -> Loading -> Active -> Submitted`. Every change goes
//! through [`transition`], a pure function over an owned state and an event.
//! Events that carry an `epoch` are dropped unless it matches the state's
//! current epoch, which is how stale timer ticks and late question loads are
//! ignored after a reset or a new start.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::{AssessmentConfig, Question};
use crate::scoring::{ScoreSummary, score};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Loading,
    Active,
    Submitted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Begin loading a new session for `topics`. Accepted from `Idle` or `Submitted`.
    StartRequested { topics: Vec<String> },
    QuestionsLoaded {
        epoch: u64,
        questions: Vec<Question>,
        at: DateTime<Utc>,
    },
    LoadFailed { epoch: u64 },
    AnswerSelected { index: usize, option: String },
    Tick { epoch: u64 },
    Submit { epoch: u64 },
    /// Discard whatever is in progress and return to `Idle`.
    Reset,
}

/// Complete state of one assessment session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    epoch: u64,
    status: SessionStatus,
    config: AssessmentConfig,
    topics: Vec<String>,
    questions: Vec<Question>,
    answers: BTreeMap<usize, String>,
    remaining_seconds: u32,
    started_at: Option<DateTime<Utc>>,
    summary: Option<ScoreSummary>,
}

impl SessionState {
    #[must_use]
    pub fn new(config: AssessmentConfig) -> Self {
        Self {
            epoch: 0,
            status: SessionStatus::Idle,
            config,
            topics: Vec::new(),
            questions: Vec::new(),
            answers: BTreeMap::new(),
            remaining_seconds: 0,
            started_at: None,
            summary: None,
        }
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn config(&self) -> &AssessmentConfig {
        &self.config
    }

    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<usize, String> {
        &self.answers
    }

    #[must_use]
    pub fn answer(&self, index: usize) -> Option<&str> {
        self.answers.get(&index).map(String::as_str)
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Score computed on submission.
    #[must_use]
    pub fn summary(&self) -> Option<&ScoreSummary> {
        self.summary.as_ref()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Whether a countdown runs for this session.
    #[must_use]
    pub fn is_timed(&self) -> bool {
        self.config.is_timed()
    }

    #[must_use]
    pub fn can_start(&self) -> bool {
        matches!(self.status, SessionStatus::Idle | SessionStatus::Submitted)
    }

    /// Whether `AnswerSelected { index, .. }` would be applied.
    #[must_use]
    pub fn accepts_answer(&self, index: usize) -> bool {
        self.is_active() && index < self.questions.len()
    }

    fn clear_session(&mut self) {
        self.topics.clear();
        self.questions.clear();
        self.answers.clear();
        self.remaining_seconds = 0;
        self.started_at = None;
        self.summary = None;
    }

    fn submit(&mut self) {
        self.summary = Some(score(
            &self.questions,
            &self.answers,
            self.config.negative_marking(),
        ));
        self.status = SessionStatus::Submitted;
    }
}

/// Apply `event` to `state`. Events that are invalid for the current status
/// or carry a stale epoch leave the state unchanged.
#[must_use]
pub fn transition(mut state: SessionState, event: SessionEvent) -> SessionState {
    match event {
        SessionEvent::StartRequested { topics } => {
            if !state.can_start() {
                return state;
            }
            state.clear_session();
            state.epoch += 1;
            state.topics = topics;
            state.status = SessionStatus::Loading;
        }
        SessionEvent::QuestionsLoaded {
            epoch,
            questions,
            at,
        } => {
            if state.status != SessionStatus::Loading || epoch != state.epoch {
                return state;
            }
            state.remaining_seconds = state.config.duration_secs(questions.len());
            state.questions = questions;
            state.answers.clear();
            state.started_at = Some(at);
            state.status = SessionStatus::Active;
        }
        SessionEvent::LoadFailed { epoch } => {
            if state.status == SessionStatus::Loading && epoch == state.epoch {
                state.clear_session();
                state.status = SessionStatus::Idle;
            }
        }
        SessionEvent::AnswerSelected { index, option } => {
            if state.accepts_answer(index) {
                state.answers.insert(index, option);
            }
        }
        SessionEvent::Tick { epoch } => {
            if !state.is_active() || !state.is_timed() || epoch != state.epoch {
                return state;
            }
            state.remaining_seconds = state.remaining_seconds.saturating_sub(1);
            if state.remaining_seconds == 0 {
                state.submit();
            }
        }
        SessionEvent::Submit { epoch } => {
            if state.is_active() && epoch == state.epoch {
                state.submit();
            }
        }
        SessionEvent::Reset => {
            state.clear_session();
            state.epoch += 1;
            state.status = SessionStatus::Idle;
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn questions(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| {
                Question::new(
                    format!("Q{i}"),
                    ["A", "B", "C", "D"].map(String::from).to_vec(),
                    "B",
                    "T",
                    None,
                )
                .unwrap()
            })
            .collect()
    }

    fn active(config: AssessmentConfig, n: usize) -> SessionState {
        let state = transition(
            SessionState::new(config),
            SessionEvent::StartRequested {
                topics: vec!["T".into()],
            },
        );
        let epoch = state.epoch();
        transition(
            state,
            SessionEvent::QuestionsLoaded {
                epoch,
                questions: questions(n),
                at: fixed_now(),
            },
        )
    }

    #[test]
    fn load_sets_duration_from_returned_count() {
        let state = active(AssessmentConfig::mock_test(), 3);
        assert_eq!(state.status(), SessionStatus::Active);
        assert_eq!(state.remaining_seconds(), 3 * 54);
        assert_eq!(state.started_at(), Some(fixed_now()));
    }

    #[test]
    fn failed_load_returns_to_idle() {
        let state = transition(
            SessionState::new(AssessmentConfig::gk_quiz()),
            SessionEvent::StartRequested {
                topics: vec!["T".into()],
            },
        );
        let epoch = state.epoch();
        let state = transition(state, SessionEvent::LoadFailed { epoch });
        assert_eq!(state.status(), SessionStatus::Idle);
        assert!(state.questions().is_empty());
    }

    #[test]
    fn stale_load_is_ignored_after_reset() {
        let state = transition(
            SessionState::new(AssessmentConfig::gk_quiz()),
            SessionEvent::StartRequested {
                topics: vec!["T".into()],
            },
        );
        let stale = state.epoch();
        let state = transition(state, SessionEvent::Reset);
        let state = transition(
            state,
            SessionEvent::QuestionsLoaded {
                epoch: stale,
                questions: questions(2),
                at: fixed_now(),
            },
        );
        assert_eq!(state.status(), SessionStatus::Idle);
    }

    #[test]
    fn answers_only_accepted_while_active_and_in_range() {
        let state = active(AssessmentConfig::gk_quiz(), 2);
        let state = transition(
            state,
            SessionEvent::AnswerSelected {
                index: 5,
                option: "A".into(),
            },
        );
        assert!(state.answers().is_empty());

        let state = transition(
            state,
            SessionEvent::AnswerSelected {
                index: 1,
                option: "A".into(),
            },
        );
        let state = transition(
            state,
            SessionEvent::AnswerSelected {
                index: 1,
                option: "B".into(),
            },
        );
        assert_eq!(state.answer(1), Some("B"));

        let epoch = state.epoch();
        let state = transition(state, SessionEvent::Submit { epoch });
        let frozen = state.answers().clone();
        let state = transition(
            state,
            SessionEvent::AnswerSelected {
                index: 0,
                option: "B".into(),
            },
        );
        assert_eq!(state.answers(), &frozen);
    }

    #[test]
    fn ticks_count_down_and_auto_submit_at_zero() {
        let config = AssessmentConfig::new(
            crate::model::AssessmentKind::GkQuiz,
            1,
            Some(2),
            0.2,
            None,
            None,
        )
        .unwrap();
        let mut state = active(config, 1);
        let epoch = state.epoch();
        state = transition(state, SessionEvent::Tick { epoch });
        assert_eq!(state.remaining_seconds(), 1);
        assert!(state.is_active());

        state = transition(state, SessionEvent::Tick { epoch });
        assert_eq!(state.remaining_seconds(), 0);
        assert_eq!(state.status(), SessionStatus::Submitted);
        assert!(state.summary().is_some());

        let after = transition(state.clone(), SessionEvent::Tick { epoch });
        assert_eq!(after, state);
    }

    #[test]
    fn second_submit_is_a_no_op() {
        let state = active(AssessmentConfig::gk_quiz(), 2);
        let epoch = state.epoch();
        let once = transition(state, SessionEvent::Submit { epoch });
        let twice = transition(once.clone(), SessionEvent::Submit { epoch });
        assert_eq!(once, twice);
    }

    #[test]
    fn untimed_sessions_ignore_ticks() {
        let state = active(AssessmentConfig::custom_test(), 2);
        assert_eq!(state.remaining_seconds(), 0);
        let epoch = state.epoch();
        let state = transition(state, SessionEvent::Tick { epoch });
        assert!(state.is_active());
    }

    #[test]
    fn start_is_rejected_while_active() {
        let state = active(AssessmentConfig::gk_quiz(), 2);
        let epoch = state.epoch();
        let state = transition(
            state,
            SessionEvent::StartRequested {
                topics: vec!["Other".into()],
            },
        );
        assert_eq!(state.epoch(), epoch);
        assert_eq!(state.topics(), ["T".to_string()]);
    }

    #[test]
    fn restart_from_submitted_clears_previous_session() {
        let state = active(AssessmentConfig::gk_quiz(), 2);
        let epoch = state.epoch();
        let state = transition(state, SessionEvent::Submit { epoch });
        let state = transition(
            state,
            SessionEvent::StartRequested {
                topics: vec!["Next".into()],
            },
        );
        assert_eq!(state.status(), SessionStatus::Loading);
        assert!(state.summary().is_none());
        assert!(state.questions().is_empty());
        assert_eq!(state.epoch(), epoch + 1);
    }
}
