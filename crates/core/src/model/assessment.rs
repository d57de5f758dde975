use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::question::Difficulty;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("number of questions must be > 0")]
    InvalidNumQuestions,

    #[error("seconds per question must be > 0 for timed assessments")]
    InvalidSecondsPerQuestion,

    #[error("negative marking must be within [0, 1], got {0}")]
    InvalidNegativeMarking(f64),

    #[error("cooldown window must be positive")]
    InvalidCooldown,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown assessment type: {0}")]
pub struct UnknownAssessmentKind(pub String);

//
// ─── KIND ──────────────────────────────────────────────────────────────────────
//

/// The assessment screens a result can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssessmentKind {
    DailyQuiz,
    MockTest,
    CustomTest,
    IqTest,
    GkQuiz,
}

impl AssessmentKind {
    pub const ALL: [AssessmentKind; 5] = [
        AssessmentKind::DailyQuiz,
        AssessmentKind::MockTest,
        AssessmentKind::CustomTest,
        AssessmentKind::IqTest,
        AssessmentKind::GkQuiz,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentKind::DailyQuiz => "daily-quiz",
            AssessmentKind::MockTest => "mock-test",
            AssessmentKind::CustomTest => "custom-test",
            AssessmentKind::IqTest => "iq-test",
            AssessmentKind::GkQuiz => "gk-quiz",
        }
    }
}

impl fmt::Display for AssessmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssessmentKind {
    type Err = UnknownAssessmentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownAssessmentKind(s.to_owned()))
    }
}

//
// ─── CONFIG ────────────────────────────────────────────────────────────────────
//

/// Points deducted per incorrect answer in every timed assessment.
pub const DEFAULT_NEGATIVE_MARKING: f64 = 0.20;

/// Window between two daily quizzes.
#[must_use]
pub fn daily_cooldown() -> Duration {
    Duration::hours(24)
}

/// Per-assessment-type tuning supplied by the caller.
///
/// `seconds_per_question = None` means the assessment is untimed.
/// `cooldown = Some(_)` gates repeat starts through the cooldown gate.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentConfig {
    kind: AssessmentKind,
    num_questions: u32,
    seconds_per_question: Option<u32>,
    negative_marking: f64,
    difficulty: Option<Difficulty>,
    cooldown: Option<Duration>,
}

impl AssessmentConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the question count is zero, a timed config has
    /// zero seconds per question, negative marking is outside `[0, 1]`, or the
    /// cooldown is not positive.
    pub fn new(
        kind: AssessmentKind,
        num_questions: u32,
        seconds_per_question: Option<u32>,
        negative_marking: f64,
        difficulty: Option<Difficulty>,
        cooldown: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        if num_questions == 0 {
            return Err(ConfigError::InvalidNumQuestions);
        }
        if seconds_per_question == Some(0) {
            return Err(ConfigError::InvalidSecondsPerQuestion);
        }
        if !(0.0..=1.0).contains(&negative_marking) {
            return Err(ConfigError::InvalidNegativeMarking(negative_marking));
        }
        if cooldown.is_some_and(|c| c <= Duration::zero()) {
            return Err(ConfigError::InvalidCooldown);
        }

        Ok(Self {
            kind,
            num_questions,
            seconds_per_question,
            negative_marking,
            difficulty,
            cooldown,
        })
    }

    /// 100 hard questions, 54 s each, once per 24 hours.
    #[must_use]
    pub fn daily_quiz() -> Self {
        Self {
            kind: AssessmentKind::DailyQuiz,
            num_questions: 100,
            seconds_per_question: Some(54),
            negative_marking: DEFAULT_NEGATIVE_MARKING,
            difficulty: Some(Difficulty::Hard),
            cooldown: Some(daily_cooldown()),
        }
    }

    /// 50 hard questions, 54 s each.
    #[must_use]
    pub fn mock_test() -> Self {
        Self {
            kind: AssessmentKind::MockTest,
            num_questions: 50,
            seconds_per_question: Some(54),
            negative_marking: DEFAULT_NEGATIVE_MARKING,
            difficulty: Some(Difficulty::Hard),
            cooldown: None,
        }
    }

    #[must_use]
    pub fn gk_quiz() -> Self {
        Self {
            kind: AssessmentKind::GkQuiz,
            num_questions: 10,
            seconds_per_question: Some(54),
            negative_marking: DEFAULT_NEGATIVE_MARKING,
            difficulty: None,
            cooldown: None,
        }
    }

    #[must_use]
    pub fn iq_test() -> Self {
        Self {
            kind: AssessmentKind::IqTest,
            num_questions: 25,
            seconds_per_question: Some(60),
            negative_marking: DEFAULT_NEGATIVE_MARKING,
            difficulty: None,
            cooldown: None,
        }
    }

    /// Untimed practice without negative marking.
    #[must_use]
    pub fn custom_test() -> Self {
        Self {
            kind: AssessmentKind::CustomTest,
            num_questions: 10,
            seconds_per_question: None,
            negative_marking: 0.0,
            difficulty: Some(Difficulty::Medium),
            cooldown: None,
        }
    }

    /// Preset for the given kind.
    #[must_use]
    pub fn preset(kind: AssessmentKind) -> Self {
        match kind {
            AssessmentKind::DailyQuiz => Self::daily_quiz(),
            AssessmentKind::MockTest => Self::mock_test(),
            AssessmentKind::CustomTest => Self::custom_test(),
            AssessmentKind::IqTest => Self::iq_test(),
            AssessmentKind::GkQuiz => Self::gk_quiz(),
        }
    }

    /// Override the requested question count.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidNumQuestions` if `n` is zero.
    pub fn with_num_questions(mut self, n: u32) -> Result<Self, ConfigError> {
        if n == 0 {
            return Err(ConfigError::InvalidNumQuestions);
        }
        self.num_questions = n;
        Ok(self)
    }

    #[must_use]
    pub fn with_difficulty(mut self, difficulty: Option<Difficulty>) -> Self {
        self.difficulty = difficulty;
        self
    }

    #[must_use]
    pub fn kind(&self) -> AssessmentKind {
        self.kind
    }

    #[must_use]
    pub fn num_questions(&self) -> u32 {
        self.num_questions
    }

    #[must_use]
    pub fn seconds_per_question(&self) -> Option<u32> {
        self.seconds_per_question
    }

    #[must_use]
    pub fn negative_marking(&self) -> f64 {
        self.negative_marking
    }

    #[must_use]
    pub fn difficulty(&self) -> Option<Difficulty> {
        self.difficulty
    }

    #[must_use]
    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }

    #[must_use]
    pub fn is_timed(&self) -> bool {
        self.seconds_per_question.is_some()
    }

    #[must_use]
    pub fn is_gated(&self) -> bool {
        self.cooldown.is_some()
    }

    /// Countdown length for a session that actually received `question_count`
    /// questions. Zero for untimed assessments.
    #[must_use]
    pub fn duration_secs(&self, question_count: usize) -> u32 {
        let per = self.seconds_per_question.unwrap_or(0);
        u32::try_from(question_count)
            .unwrap_or(u32::MAX)
            .saturating_mul(per)
    }

    /// Request for the question source covering `topics`.
    #[must_use]
    pub fn request(&self, topics: Vec<String>) -> QuestionRequest {
        QuestionRequest {
            topics,
            num_questions: self.num_questions,
            difficulty: self.difficulty,
        }
    }
}

/// What a session asks the question source for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    pub topics: Vec<String>,
    pub num_questions: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
}
