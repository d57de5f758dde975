#![forbid(unsafe_code)]

pub mod ai_question_source;
pub mod analytics_service;
pub mod app_services;
pub mod cooldown_service;
pub mod error;
pub mod history_service;
pub mod question_source;
pub mod sessions;
pub mod timer;

pub use exam_core::Clock;
pub use sessions as session;

pub use ai_question_source::{AiQuestionSource, AiSourceConfig};
pub use analytics_service::{AnalyticsService, AnalyticsSnapshot};
pub use app_services::{AppServices, DEFAULT_DB_URL};
pub use cooldown_service::{
    COOLDOWN_KEY, CooldownGate, CooldownReservation, RECHECK_PERIOD, cooldown_key,
};
pub use error::{AppServicesError, HistoryError, QuestionSourceError, SessionError};
pub use history_service::{HISTORY_KEY, HistoryService};
pub use question_source::{QuestionSource, StaticQuestionSource};
pub use sessions::{SessionController, SessionProgress, SubmitOutcome, TICK_PERIOD};
pub use timer::{CancelHandle, ManualScheduler, Scheduler, TickFlow, TokioScheduler};
