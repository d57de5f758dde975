use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use exam_core::model::{AssessmentConfig, AssessmentKind, daily_cooldown};
use storage::repository::{KeyValueStore, Storage};
use tracing::info;

use crate::Clock;
use crate::ai_question_source::AiQuestionSource;
use crate::analytics_service::AnalyticsService;
use crate::cooldown_service::CooldownGate;
use crate::error::AppServicesError;
use crate::history_service::HistoryService;
use crate::question_source::QuestionSource;
use crate::sessions::SessionController;
use crate::timer::{Scheduler, TokioScheduler};

pub const DEFAULT_DB_URL: &str = "sqlite:exam.sqlite3";

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    source: Arc<dyn QuestionSource>,
    scheduler: Arc<dyn Scheduler>,
    history: Arc<HistoryService>,
    analytics: AnalyticsService,
    store: Arc<dyn KeyValueStore>,
    gates: Arc<Mutex<HashMap<AssessmentKind, CooldownGate>>>,
}

impl AppServices {
    #[must_use]
    pub fn new(
        storage: &Storage,
        clock: Clock,
        source: Arc<dyn QuestionSource>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let history = Arc::new(HistoryService::new(Arc::clone(&storage.kv)));
        let analytics = AnalyticsService::new(Arc::clone(&history));
        Self {
            clock,
            source,
            scheduler,
            history,
            analytics,
            store: Arc::clone(&storage.kv),
            gates: Arc::default(),
        }
    }

    /// Build services backed by `SQLite` storage, questions from the
    /// environment-configured AI endpoint, and the tokio clock for countdowns.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let source = AiQuestionSource::from_env();
        info!(db_url, ai_enabled = source.enabled(), "services ready");
        Ok(Self::new(
            &storage,
            clock,
            Arc::new(source),
            Arc::new(TokioScheduler),
        ))
    }

    /// Build from `EXAM_DB_URL` (default [`DEFAULT_DB_URL`]) and the
    /// `EXAM_AI_*` variables.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn from_env(clock: Clock) -> Result<Self, AppServicesError> {
        let db_url = std::env::var("EXAM_DB_URL").unwrap_or_else(|_| DEFAULT_DB_URL.into());
        Self::new_sqlite(&db_url, clock).await
    }

    /// Controller for one assessment kind using its preset configuration.
    #[must_use]
    pub fn controller(&self, kind: AssessmentKind) -> SessionController {
        self.controller_with(AssessmentConfig::preset(kind))
    }

    /// Controller for a caller-supplied configuration. Gated configurations
    /// share one cooldown record per assessment kind.
    #[must_use]
    pub fn controller_with(&self, config: AssessmentConfig) -> SessionController {
        let gate = config.is_gated().then(|| self.gate_for(config.kind()));
        let controller = SessionController::new(
            config,
            self.clock.clone(),
            Arc::clone(&self.source),
            Arc::clone(&self.history),
            Arc::clone(&self.scheduler),
        );
        match gate {
            Some(gate) => controller.with_cooldown_gate(gate),
            None => controller,
        }
    }

    /// Cooldown gate for `kind`, windowed by its preset.
    #[must_use]
    pub fn gate_for(&self, kind: AssessmentKind) -> CooldownGate {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates
            .entry(kind)
            .or_insert_with(|| {
                let window = AssessmentConfig::preset(kind)
                    .cooldown()
                    .unwrap_or_else(daily_cooldown);
                CooldownGate::for_kind(
                    self.clock.clone(),
                    Arc::clone(&self.store),
                    kind,
                    window,
                )
            })
            .clone()
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    #[must_use]
    pub fn history(&self) -> Arc<HistoryService> {
        Arc::clone(&self.history)
    }

    #[must_use]
    pub fn analytics(&self) -> &AnalyticsService {
        &self.analytics
    }

    #[must_use]
    pub fn daily_gate(&self) -> CooldownGate {
        self.gate_for(AssessmentKind::DailyQuiz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question_source::StaticQuestionSource;
    use crate::timer::ManualScheduler;
    use exam_core::time::fixed_now;

    #[tokio::test]
    async fn controllers_use_presets_and_share_history() {
        let services = AppServices::new(
            &Storage::in_memory(),
            Clock::fixed(fixed_now()),
            Arc::new(StaticQuestionSource::default()),
            Arc::new(ManualScheduler::new()),
        );

        let daily = services.controller(AssessmentKind::DailyQuiz);
        assert_eq!(daily.config().num_questions(), 100);
        let iq = services.controller(AssessmentKind::IqTest);
        assert_eq!(iq.config().seconds_per_question(), Some(60));

        assert!(services.history().all().await.is_empty());
        assert!(services.daily_gate().status().await.available);
        assert_eq!(services.analytics().stats().await.total, 0);
    }

    #[tokio::test]
    async fn gates_are_keyed_by_kind() {
        let services = AppServices::new(
            &Storage::in_memory(),
            Clock::fixed(fixed_now()),
            Arc::new(StaticQuestionSource::default()),
            Arc::new(ManualScheduler::new()),
        );

        let daily = services.daily_gate();
        assert_eq!(daily.key(), crate::COOLDOWN_KEY);
        assert_eq!(daily.window(), daily_cooldown());
        let mock = services.gate_for(AssessmentKind::MockTest);
        assert_eq!(mock.key(), "exam.mock_test.last_taken");

        mock.record_taken(fixed_now()).await.unwrap();
        assert!(services.daily_gate().status().await.available);
        assert!(!services.gate_for(AssessmentKind::MockTest).status().await.available);
    }
}
