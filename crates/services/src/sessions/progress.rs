use exam_core::session::{SessionState, SessionStatus};
use exam_core::time::{format_remaining, is_low_time};

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub status: SessionStatus,
    pub total: usize,
    pub answered: usize,
    pub unanswered: usize,
    /// `None` for untimed sessions and outside `Active`.
    pub remaining_seconds: Option<u32>,
}

impl SessionProgress {
    #[must_use]
    pub fn from_state(state: &SessionState) -> Self {
        let total = state.questions().len();
        let answered = state.answers().len();
        let remaining_seconds =
            (state.is_active() && state.is_timed()).then(|| state.remaining_seconds());
        Self {
            status: state.status(),
            total,
            answered,
            unanswered: total.saturating_sub(answered),
            remaining_seconds,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.unanswered == 0
    }

    /// Countdown as `MM:SS`, if the session is timed and running.
    #[must_use]
    pub fn countdown(&self) -> Option<String> {
        self.remaining_seconds.map(format_remaining)
    }

    #[must_use]
    pub fn is_low_time(&self) -> bool {
        self.remaining_seconds.is_some_and(is_low_time)
    }
}
