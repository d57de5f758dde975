use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use exam_core::Clock;
use exam_core::model::{AssessmentConfig, Question, QuestionDraft, TestResult};
use exam_core::scoring::ScoreSummary;
use exam_core::session::{SessionEvent, SessionState, SessionStatus, transition};

use crate::cooldown_service::{CooldownGate, CooldownReservation};
use crate::error::SessionError;
use crate::history_service::HistoryService;
use crate::question_source::QuestionSource;
use crate::timer::{CancelHandle, Scheduler, TickFlow};

use super::progress::SessionProgress;

/// Countdown resolution for timed sessions.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// What a submission produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub summary: ScoreSummary,
    /// `None` only if the result record could not be built.
    pub result: Option<TestResult>,
}

/// Drives one assessment at a time: loading questions, counting down,
/// collecting answers and recording the result exactly once.
///
/// All state changes go through the pure session reducer. The countdown runs
/// on the injected [`Scheduler`] and is cancelled whenever the session leaves
/// `Active` or the controller is dropped.
pub struct SessionController {
    shared: Arc<Shared>,
}

struct Shared {
    clock: Clock,
    source: Arc<dyn QuestionSource>,
    history: Arc<HistoryService>,
    gate: Option<CooldownGate>,
    scheduler: Arc<dyn Scheduler>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: SessionState,
    timer: Option<CancelHandle>,
    outcome: Option<SubmitOutcome>,
}

impl SessionController {
    #[must_use]
    pub fn new(
        config: AssessmentConfig,
        clock: Clock,
        source: Arc<dyn QuestionSource>,
        history: Arc<HistoryService>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                clock,
                source,
                history,
                gate: None,
                scheduler,
                inner: Mutex::new(Inner {
                    state: SessionState::new(config),
                    timer: None,
                    outcome: None,
                }),
            }),
        }
    }

    /// Enforce `gate` when the configuration carries a cooldown.
    #[must_use]
    pub fn with_cooldown_gate(mut self, gate: CooldownGate) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.gate = Some(gate);
        }
        self
    }

    /// Start a new session over `topics`.
    ///
    /// Allowed from `Idle` or `Submitted`. A gated start reserves its cooldown
    /// slot before questions are fetched and validated; on any failure the
    /// controller is back in `Idle` and the reservation is released.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoTopics` for an empty selection,
    /// `CooldownActive` while a gated assessment is rate-limited,
    /// `AlreadyRunning` if a session is loading or active, `Superseded` if the
    /// session was abandoned while loading, and source or validation errors
    /// from the question batch.
    pub async fn start(&self, topics: Vec<String>) -> Result<SessionState, SessionError> {
        let topics: Vec<String> = topics
            .into_iter()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .collect();
        if topics.is_empty() {
            return Err(SessionError::NoTopics);
        }

        if !self.shared.lock().state.can_start() {
            return Err(SessionError::AlreadyRunning);
        }

        let gate = self.shared.active_gate();
        let reservation = match &gate {
            Some(gate) => match gate.try_reserve(self.shared.clock.now()).await {
                Ok(reservation) => Some(reservation),
                Err(status) => {
                    let next_available_at = status
                        .next_available_at
                        .unwrap_or_else(|| self.shared.clock.now());
                    info!(%next_available_at, "start refused by cooldown");
                    return Err(SessionError::CooldownActive { next_available_at });
                }
            },
            None => None,
        };

        let requested = {
            let mut inner = self.shared.lock();
            if inner.state.can_start() {
                inner.cancel_timer();
                inner.outcome = None;
                inner.apply(SessionEvent::StartRequested {
                    topics: topics.clone(),
                });
                let request = inner.state.config().request(topics);
                Some((inner.state.epoch(), inner.state.config().kind(), request))
            } else {
                None
            }
        };
        let Some((epoch, kind, request)) = requested else {
            release(gate.as_ref(), reservation).await;
            return Err(SessionError::AlreadyRunning);
        };
        info!(
            epoch,
            %kind,
            requested = request.num_questions,
            "loading questions"
        );

        let loaded = match self.shared.source.generate(&request).await {
            Ok(drafts) => validate_batch(drafts),
            Err(err) => Err(SessionError::from(err)),
        };
        let questions = match loaded {
            Ok(questions) => questions,
            Err(err) => {
                self.shared.lock().apply(SessionEvent::LoadFailed { epoch });
                warn!(epoch, error = %err, "question load failed");
                release(gate.as_ref(), reservation).await;
                return Err(err);
            }
        };
        if questions.len() != request.num_questions as usize {
            debug!(
                requested = request.num_questions,
                received = questions.len(),
                "question count differs from request"
            );
        }

        let activated = {
            let mut inner = self.shared.lock();
            inner.apply(SessionEvent::QuestionsLoaded {
                epoch,
                questions,
                at: self.shared.clock.now(),
            });
            if inner.state.is_active() && inner.state.epoch() == epoch {
                if inner.state.is_timed() {
                    inner.timer = Some(spawn_countdown(&self.shared, epoch));
                }
                Some(inner.state.clone())
            } else {
                None
            }
        };
        let Some(snapshot) = activated else {
            debug!(epoch, "discarding questions for a superseded session");
            release(gate.as_ref(), reservation).await;
            return Err(SessionError::Superseded);
        };
        info!(
            epoch,
            questions = snapshot.questions().len(),
            remaining_seconds = snapshot.remaining_seconds(),
            "session active"
        );

        Ok(snapshot)
    }

    /// Record `option` as the answer to question `index`, replacing any
    /// previous choice.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside `Active`,
    /// `QuestionOutOfRange` for a bad index, and `UnknownOption` when
    /// `option` is not one of the question's options.
    pub fn select_answer(&self, index: usize, option: &str) -> Result<(), SessionError> {
        let mut inner = self.shared.lock();
        if !inner.state.is_active() {
            return Err(SessionError::NotActive);
        }
        let len = inner.state.questions().len();
        let question = inner
            .state
            .questions()
            .get(index)
            .ok_or(SessionError::QuestionOutOfRange { index, len })?;
        if !question.has_option(option) {
            return Err(SessionError::UnknownOption {
                index,
                option: option.to_owned(),
            });
        }
        inner.apply(SessionEvent::AnswerSelected {
            index,
            option: option.to_owned(),
        });
        Ok(())
    }

    /// Submit the active session, or return the existing outcome if it was
    /// already submitted. Only the first submission is persisted.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` from `Idle` or `Loading`.
    pub async fn submit(&self) -> Result<SubmitOutcome, SessionError> {
        let completed = {
            let mut inner = self.shared.lock();
            match inner.state.status() {
                SessionStatus::Submitted => {
                    return inner.outcome.clone().ok_or(SessionError::NotActive);
                }
                SessionStatus::Active => {
                    let epoch = inner.state.epoch();
                    inner.apply_and_complete(SessionEvent::Submit { epoch }, &self.shared.clock)
                }
                SessionStatus::Idle | SessionStatus::Loading => {
                    return Err(SessionError::NotActive);
                }
            }
        };

        match completed {
            Some(outcome) => {
                self.shared.persist(&outcome).await;
                Ok(outcome)
            }
            None => self.shared.lock().outcome.clone().ok_or(SessionError::NotActive),
        }
    }

    /// Drop whatever is in progress and return to `Idle` without recording
    /// anything. A question load still in flight is discarded on arrival.
    pub fn abandon(&self) {
        let mut inner = self.shared.lock();
        inner.cancel_timer();
        inner.outcome = None;
        let epoch = inner.state.epoch();
        inner.apply(SessionEvent::Reset);
        debug!(epoch, "session abandoned");
    }

    /// A copy of the current session state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.shared.lock().state.clone()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.shared.lock().state.status()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress::from_state(&self.shared.lock().state)
    }

    /// Outcome of the latest submission, kept until the next start or
    /// abandon even if persisting it failed.
    #[must_use]
    pub fn last_outcome(&self) -> Option<SubmitOutcome> {
        self.shared.lock().outcome.clone()
    }

    #[must_use]
    pub fn config(&self) -> AssessmentConfig {
        self.shared.lock().state.config().clone()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The attached gate, evaluated against the configured cooldown window.
    fn active_gate(&self) -> Option<CooldownGate> {
        let window = self.lock().state.config().cooldown()?;
        self.gate.as_ref().map(|gate| gate.with_window(window))
    }

    async fn tick(&self, epoch: u64) -> TickFlow {
        let (completed, running) = {
            let mut inner = self.lock();
            let completed = inner.apply_and_complete(SessionEvent::Tick { epoch }, &self.clock);
            let running = inner.state.is_active() && inner.state.epoch() == epoch;
            (completed, running)
        };
        if let Some(outcome) = completed {
            info!(epoch, "time expired, session auto-submitted");
            self.persist(&outcome).await;
        }
        if running { TickFlow::Continue } else { TickFlow::Stop }
    }

    async fn persist(&self, outcome: &SubmitOutcome) {
        let Some(result) = &outcome.result else {
            return;
        };
        match self.history.append(result).await {
            Ok(()) => info!(
                id = %result.id(),
                score = result.score(),
                total = result.total_questions(),
                "result recorded"
            ),
            Err(err) => warn!(id = %result.id(), error = %err, "failed to record result"),
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.lock().cancel_timer();
    }
}

impl Inner {
    fn apply(&mut self, event: SessionEvent) {
        let placeholder = SessionState::new(self.state.config().clone());
        let state = std::mem::replace(&mut self.state, placeholder);
        self.state = transition(state, event);
    }

    /// Apply `event` and, if it moved the session into `Submitted`, build the
    /// outcome. Returns `Some` for exactly one event per session.
    fn apply_and_complete(&mut self, event: SessionEvent, clock: &Clock) -> Option<SubmitOutcome> {
        let was_active = self.state.is_active();
        self.apply(event);
        if !was_active || self.state.status() != SessionStatus::Submitted {
            return None;
        }
        self.cancel_timer();

        let summary = self.state.summary().copied().unwrap_or_default();
        let result = match TestResult::new(
            self.state.config().kind(),
            self.state.topics().to_vec(),
            summary.clamped_score,
            summary.total,
            clock.now(),
        ) {
            Ok(result) => Some(result),
            Err(err) => {
                error!(error = %err, "could not build result record");
                None
            }
        };
        let outcome = SubmitOutcome { summary, result };
        self.outcome = Some(outcome.clone());
        Some(outcome)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

fn spawn_countdown(shared: &Arc<Shared>, epoch: u64) -> CancelHandle {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    shared.scheduler.schedule_every(
        TICK_PERIOD,
        Box::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                match weak.upgrade() {
                    Some(shared) => shared.tick(epoch).await,
                    None => TickFlow::Stop,
                }
            })
        }),
    )
}

/// Every draft must be well formed; one bad question rejects the batch.
async fn release(gate: Option<&CooldownGate>, reservation: Option<CooldownReservation>) {
    if let (Some(gate), Some(reservation)) = (gate, reservation) {
        gate.release(reservation).await;
    }
}

fn validate_batch(drafts: Vec<QuestionDraft>) -> Result<Vec<Question>, SessionError> {
    if drafts.is_empty() {
        return Err(SessionError::EmptyQuestionSet);
    }
    drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| {
            draft
                .validate()
                .map_err(|source| SessionError::InvalidQuestion { index, source })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question_source::StaticQuestionSource;
    use crate::timer::ManualScheduler;
    use exam_core::model::AssessmentKind;
    use exam_core::time::fixed_now;

    fn draft(i: usize) -> QuestionDraft {
        QuestionDraft {
            text: format!("Q{i}"),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answer: "B".into(),
            topic: "History".into(),
            difficulty: None,
        }
    }

    struct Harness {
        controller: SessionController,
        scheduler: ManualScheduler,
        history: Arc<HistoryService>,
        source: Arc<StaticQuestionSource>,
    }

    fn harness(config: AssessmentConfig, bank: Vec<QuestionDraft>) -> Harness {
        let scheduler = ManualScheduler::new();
        let history = Arc::new(HistoryService::in_memory());
        let source = Arc::new(StaticQuestionSource::new(bank));
        let controller = SessionController::new(
            config,
            Clock::fixed(fixed_now()),
            source.clone(),
            Arc::clone(&history),
            Arc::new(scheduler.clone()),
        );
        Harness {
            controller,
            scheduler,
            history,
            source,
        }
    }

    fn mock(n: u32) -> AssessmentConfig {
        AssessmentConfig::mock_test().with_num_questions(n).unwrap()
    }

    #[tokio::test]
    async fn start_rejects_empty_topics() {
        let h = harness(mock(2), (0..2).map(draft).collect());
        let err = h.controller.start(vec![" ".into()]).await.unwrap_err();
        assert!(matches!(err, SessionError::NoTopics));
        assert_eq!(h.controller.status(), SessionStatus::Idle);
        assert!(h.source.requests().is_empty());
    }

    #[tokio::test]
    async fn start_activates_with_duration_from_returned_count() {
        let h = harness(mock(5), (0..3).map(draft).collect());
        let state = h.controller.start(vec!["History".into()]).await.unwrap();

        assert_eq!(state.status(), SessionStatus::Active);
        assert_eq!(state.questions().len(), 3);
        assert_eq!(state.remaining_seconds(), 3 * 54);
        assert_eq!(h.scheduler.periods(), vec![TICK_PERIOD]);
        assert_eq!(h.source.requests()[0].num_questions, 5);
    }

    #[tokio::test]
    async fn select_answer_validates_and_replaces() {
        let h = harness(mock(2), (0..2).map(draft).collect());
        assert!(matches!(
            h.controller.select_answer(0, "A"),
            Err(SessionError::NotActive)
        ));
        h.controller.start(vec!["History".into()]).await.unwrap();

        h.controller.select_answer(0, "A").unwrap();
        h.controller.select_answer(0, "B").unwrap();
        assert_eq!(h.controller.snapshot().answer(0), Some("B"));

        assert!(matches!(
            h.controller.select_answer(2, "A"),
            Err(SessionError::QuestionOutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            h.controller.select_answer(1, "Z"),
            Err(SessionError::UnknownOption { index: 1, .. })
        ));
        assert_eq!(h.controller.progress().answered, 1);
    }

    #[tokio::test]
    async fn submit_scores_and_records_once() {
        let h = harness(mock(4), (0..4).map(draft).collect());
        h.controller.start(vec!["History".into()]).await.unwrap();
        h.controller.select_answer(0, "B").unwrap();
        h.controller.select_answer(1, "B").unwrap();
        h.controller.select_answer(2, "A").unwrap();

        let first = h.controller.submit().await.unwrap();
        assert_eq!(first.summary.correct, 2);
        assert_eq!(first.summary.incorrect, 1);
        assert!((first.summary.clamped_score - 1.8).abs() < 1e-9);
        let result = first.result.clone().unwrap();
        assert_eq!(result.kind(), AssessmentKind::MockTest);
        assert_eq!(result.total_questions(), 4);

        let second = h.controller.submit().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.history.all().await.len(), 1);
        assert_eq!(h.scheduler.live_count(), 0);
    }

    #[tokio::test]
    async fn countdown_auto_submits_at_zero() {
        let config = AssessmentConfig::new(AssessmentKind::GkQuiz, 1, Some(3), 0.2, None, None)
            .unwrap();
        let h = harness(config, vec![draft(0)]);
        h.controller.start(vec!["History".into()]).await.unwrap();

        h.scheduler.fire_times(2).await;
        assert_eq!(h.controller.progress().remaining_seconds, Some(1));
        assert_eq!(h.controller.status(), SessionStatus::Active);

        h.scheduler.fire_times(3).await;
        assert_eq!(h.controller.status(), SessionStatus::Submitted);
        assert_eq!(h.history.all().await.len(), 1);
        assert_eq!(h.scheduler.live_count(), 0);

        h.controller.submit().await.unwrap();
        assert_eq!(h.history.all().await.len(), 1);
    }

    #[tokio::test]
    async fn untimed_session_schedules_no_countdown() {
        let h = harness(AssessmentConfig::custom_test(), (0..10).map(draft).collect());
        let state = h.controller.start(vec!["History".into()]).await.unwrap();
        assert_eq!(state.remaining_seconds(), 0);
        assert!(h.scheduler.periods().is_empty());
        assert_eq!(h.controller.progress().remaining_seconds, None);
    }

    #[tokio::test]
    async fn malformed_batch_returns_to_idle() {
        let mut bad = draft(1);
        bad.options.pop();
        let h = harness(mock(2), vec![draft(0), bad]);

        let err = h.controller.start(vec!["History".into()]).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidQuestion { index: 1, .. }));
        assert!(err.is_retryable());
        assert_eq!(h.controller.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn empty_batch_returns_to_idle() {
        let h = harness(mock(2), Vec::new());
        let err = h.controller.start(vec!["History".into()]).await.unwrap_err();
        assert!(matches!(err, SessionError::EmptyQuestionSet));
        assert_eq!(h.controller.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn abandon_stops_countdown_without_recording() {
        let h = harness(mock(2), (0..2).map(draft).collect());
        h.controller.start(vec!["History".into()]).await.unwrap();
        h.controller.abandon();

        assert_eq!(h.controller.status(), SessionStatus::Idle);
        assert_eq!(h.scheduler.live_count(), 0);
        assert!(h.controller.last_outcome().is_none());
        assert!(h.history.all().await.is_empty());
    }

    #[tokio::test]
    async fn restart_after_submit_clears_previous_session() {
        let h = harness(mock(2), (0..2).map(draft).collect());
        h.controller.start(vec!["History".into()]).await.unwrap();
        h.controller.select_answer(0, "B").unwrap();
        h.controller.submit().await.unwrap();

        let state = h.controller.start(vec!["Geography".into()]).await.unwrap();
        assert!(state.answers().is_empty());
        assert_eq!(state.topics(), ["Geography".to_string()]);
        assert!(h.controller.last_outcome().is_none());
    }

    #[tokio::test]
    async fn progress_is_complete_once_every_question_is_answered() {
        let h = harness(mock(2), (0..2).map(draft).collect());
        assert!(!h.controller.progress().is_complete());
        h.controller.start(vec!["History".into()]).await.unwrap();

        h.controller.select_answer(0, "A").unwrap();
        assert!(!h.controller.progress().is_complete());
        h.controller.select_answer(1, "C").unwrap();
        assert!(h.controller.progress().is_complete());
    }

    #[tokio::test]
    async fn gate_uses_configured_cooldown_window() {
        use chrono::Duration as ChronoDuration;
        use storage::repository::InMemoryStore;

        let clock = Clock::manual(fixed_now());
        let store = Arc::new(InMemoryStore::new());
        let config = AssessmentConfig::new(
            AssessmentKind::DailyQuiz,
            2,
            Some(10),
            0.2,
            None,
            Some(ChronoDuration::hours(1)),
        )
        .unwrap();
        let controller = SessionController::new(
            config,
            clock.clone(),
            Arc::new(StaticQuestionSource::new((0..2).map(draft).collect())),
            Arc::new(HistoryService::in_memory()),
            Arc::new(ManualScheduler::new()),
        )
        .with_cooldown_gate(CooldownGate::daily(clock.clone(), store));

        controller.start(vec!["History".into()]).await.unwrap();
        controller.submit().await.unwrap();

        let mut clock = clock;
        clock.advance(ChronoDuration::minutes(30));
        let err = controller.start(vec!["History".into()]).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::CooldownActive { next_available_at }
                if next_available_at == fixed_now() + ChronoDuration::hours(1)
        ));

        clock.advance(ChronoDuration::minutes(90));
        let state = controller.start(vec!["History".into()]).await.unwrap();
        assert_eq!(state.status(), SessionStatus::Active);
    }

    #[tokio::test]
    async fn dropping_controller_cancels_countdown() {
        let h = harness(mock(2), (0..2).map(draft).collect());
        h.controller.start(vec!["History".into()]).await.unwrap();
        assert_eq!(h.scheduler.live_count(), 1);

        drop(h.controller);
        assert_eq!(h.scheduler.live_count(), 0);
        assert_eq!(h.scheduler.fire().await, 0);
    }
}
