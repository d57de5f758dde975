mod assessment;
mod ids;
mod question;
mod result;

pub use assessment::{
    AssessmentConfig, AssessmentKind, ConfigError, DEFAULT_NEGATIVE_MARKING, QuestionRequest,
    UnknownAssessmentKind, daily_cooldown,
};
pub use ids::ResultId;
pub use question::{Difficulty, OPTION_COUNT, Question, QuestionDraft, QuestionError};
pub use result::{ResultError, TestResult};
