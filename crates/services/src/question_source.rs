use std::sync::Mutex;

use async_trait::async_trait;

use exam_core::model::{QuestionDraft, QuestionRequest};

use crate::error::QuestionSourceError;

/// Produces a batch of candidate questions for a session.
///
/// Implementations return raw drafts; the session controller validates them.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Generate up to `request.num_questions` questions.
    ///
    /// # Errors
    ///
    /// Returns `QuestionSourceError` when the backend is unreachable, disabled,
    /// or answers with output that cannot be decoded.
    async fn generate(
        &self,
        request: &QuestionRequest,
    ) -> Result<Vec<QuestionDraft>, QuestionSourceError>;
}

/// Serves questions from a fixed bank, in order.
///
/// Useful offline and in tests. A queued failure is returned once by the next
/// call instead of questions.
#[derive(Debug, Default)]
pub struct StaticQuestionSource {
    bank: Vec<QuestionDraft>,
    failures: Mutex<Vec<QuestionSourceError>>,
    requests: Mutex<Vec<QuestionRequest>>,
}

impl StaticQuestionSource {
    #[must_use]
    pub fn new(bank: Vec<QuestionDraft>) -> Self {
        Self {
            bank,
            ..Self::default()
        }
    }

    /// Make the next `generate` call fail with `error`.
    pub fn fail_next(&self, error: QuestionSourceError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(error);
        }
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<QuestionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QuestionSource for StaticQuestionSource {
    async fn generate(
        &self,
        request: &QuestionRequest,
    ) -> Result<Vec<QuestionDraft>, QuestionSourceError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(err) = self.failures.lock().ok().and_then(|mut f| f.pop()) {
            return Err(err);
        }
        let take = usize::try_from(request.num_questions).unwrap_or(usize::MAX);
        Ok(self.bank.iter().take(take).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(n: usize) -> QuestionDraft {
        QuestionDraft {
            text: format!("Q{n}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer: "a".into(),
            topic: "General".into(),
            difficulty: None,
        }
    }

    fn request(n: u32) -> QuestionRequest {
        QuestionRequest {
            topics: vec!["General".into()],
            num_questions: n,
            difficulty: None,
        }
    }

    #[tokio::test]
    async fn serves_at_most_requested_count() {
        let source = StaticQuestionSource::new((0..5).map(draft).collect());
        let batch = source.generate(&request(3)).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].text, "Q0");

        let batch = source.generate(&request(10)).await.unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(source.requests().len(), 2);
    }

    #[tokio::test]
    async fn queued_failure_is_returned_once() {
        let source = StaticQuestionSource::new(vec![draft(0)]);
        source.fail_next(QuestionSourceError::EmptyResponse);

        let err = source.generate(&request(1)).await.unwrap_err();
        assert!(matches!(err, QuestionSourceError::EmptyResponse));
        assert!(source.generate(&request(1)).await.is_ok());
    }
}
