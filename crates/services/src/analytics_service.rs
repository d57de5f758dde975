use std::sync::Arc;

use exam_core::analytics::{
    self, HistoryStats, MonthlyScore, RECENT_SCORES_WINDOW, ScorePoint, TopicPerformance,
};

use crate::history_service::HistoryService;

/// Every chart the dashboard shows, computed from one history read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalyticsSnapshot {
    pub stats: HistoryStats,
    pub recent: Vec<ScorePoint>,
    pub topics: Vec<TopicPerformance>,
    pub monthly: Vec<MonthlyScore>,
}

/// Read-only analytics over the stored history.
#[derive(Clone)]
pub struct AnalyticsService {
    history: Arc<HistoryService>,
}

impl AnalyticsService {
    #[must_use]
    pub fn new(history: Arc<HistoryService>) -> Self {
        Self { history }
    }

    pub async fn recent_scores(&self, n: usize) -> Vec<ScorePoint> {
        analytics::recent_scores(&self.history.all().await, n)
    }

    pub async fn topic_performance(&self) -> Vec<TopicPerformance> {
        analytics::topic_performance(&self.history.all().await)
    }

    pub async fn scores_over_time(&self) -> Vec<MonthlyScore> {
        analytics::scores_over_time(&self.history.all().await)
    }

    pub async fn stats(&self) -> HistoryStats {
        analytics::history_stats(&self.history.all().await)
    }

    pub async fn snapshot(&self) -> AnalyticsSnapshot {
        let history = self.history.all().await;
        AnalyticsSnapshot {
            stats: analytics::history_stats(&history),
            recent: analytics::recent_scores(&history, RECENT_SCORES_WINDOW),
            topics: analytics::topic_performance(&history),
            monthly: analytics::scores_over_time(&history),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Month, TimeZone, Utc};
    use exam_core::model::{AssessmentKind, TestResult};

    fn result(kind: AssessmentKind, topics: &[&str], score: f64, month: u32) -> TestResult {
        TestResult::new(
            kind,
            topics.iter().map(|t| (*t).to_owned()).collect(),
            score,
            10,
            Utc.with_ymd_and_hms(2024, month, 10, 12, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn empty_history_yields_empty_charts() {
        let service = AnalyticsService::new(Arc::new(HistoryService::in_memory()));
        let snapshot = service.snapshot().await;
        assert_eq!(snapshot, AnalyticsSnapshot::default());
    }

    #[tokio::test]
    async fn snapshot_matches_individual_queries() {
        let history = Arc::new(HistoryService::in_memory());
        for (i, month) in [3_u32, 1, 3, 2, 1, 5].into_iter().enumerate() {
            let kind = if i % 2 == 0 {
                AssessmentKind::MockTest
            } else {
                AssessmentKind::DailyQuiz
            };
            history
                .append(&result(kind, &["History", "Geography"], f64::from(month), month))
                .await
                .unwrap();
        }
        let service = AnalyticsService::new(history);
        let snapshot = service.snapshot().await;

        assert_eq!(snapshot.stats.total, 6);
        assert_eq!(snapshot.stats.count(AssessmentKind::MockTest), 3);
        assert_eq!(snapshot.recent, service.recent_scores(RECENT_SCORES_WINDOW).await);
        assert_eq!(snapshot.recent.len(), 5);
        assert_eq!(snapshot.recent[0].label(), "Test 2");
        assert_eq!(snapshot.topics, service.topic_performance().await);
        assert_eq!(snapshot.topics.len(), 2);

        let months: Vec<Month> = snapshot.monthly.iter().map(|m| m.month).collect();
        assert_eq!(
            months,
            vec![Month::January, Month::February, Month::March, Month::May]
        );
        assert_eq!(snapshot.monthly, service.scores_over_time().await);
    }
}
