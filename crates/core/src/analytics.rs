//! Derived views over result history for dashboards.
//!
//! All functions take the full history slice in any order and never mutate it.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Month};

use crate::model::{AssessmentKind, TestResult};

/// Default window for [`recent_scores`].
pub const RECENT_SCORES_WINDOW: usize = 5;

/// One point of the recent-score trend.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorePoint {
    /// 1-based position of the result within the whole history.
    pub sequence: usize,
    pub percentage: f64,
}

impl ScorePoint {
    #[must_use]
    pub fn label(&self) -> String {
        format!("Test {}", self.sequence)
    }
}

/// Approximate accuracy for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPerformance {
    pub topic: String,
    pub percentage: u32,
}

impl TopicPerformance {
    /// First two words of the topic, for chart legends.
    #[must_use]
    pub fn short_label(&self) -> String {
        self.topic
            .split(' ')
            .take(2)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Average percentage for all results taken in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyScore {
    pub month: Month,
    pub average: u32,
}

impl MonthlyScore {
    /// Three-letter month name ("Jan".."Dec").
    #[must_use]
    pub fn label(&self) -> &'static str {
        &self.month.name()[..3]
    }
}

/// Totals shown on the profile page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryStats {
    pub total: usize,
    pub by_kind: BTreeMap<AssessmentKind, usize>,
}

impl HistoryStats {
    #[must_use]
    pub fn count(&self, kind: AssessmentKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

/// The `n` most recent results as percentages, oldest first.
#[must_use]
pub fn recent_scores(history: &[TestResult], n: usize) -> Vec<ScorePoint> {
    let mut ordered: Vec<&TestResult> = history.iter().collect();
    ordered.sort_by_key(|r| r.timestamp());

    let skip = ordered.len().saturating_sub(n);
    ordered
        .into_iter()
        .enumerate()
        .skip(skip)
        .map(|(i, r)| ScorePoint {
            sequence: i + 1,
            percentage: r.percentage(),
        })
        .collect()
}

/// Per-topic accuracy, splitting each result's weight evenly over its topics.
///
/// History does not retain per-question topics, so a result covering several
/// topics credits each of them with the same accuracy. Topics are returned in
/// order of first appearance; topics with no weight are skipped.
#[must_use]
pub fn topic_performance(history: &[TestResult]) -> Vec<TopicPerformance> {
    let mut order: Vec<&str> = Vec::new();
    let mut stats: HashMap<&str, (f64, f64)> = HashMap::new();

    for result in history {
        let topics = result.topics();
        if topics.is_empty() {
            continue;
        }
        let total = f64::from(result.total_questions());
        let accuracy = if result.total_questions() > 0 {
            result.score() / total
        } else {
            0.0
        };
        let share = total / topics.len() as f64;

        for topic in topics {
            let entry = stats.entry(topic.as_str()).or_insert_with(|| {
                order.push(topic.as_str());
                (0.0, 0.0)
            });
            entry.0 += share;
            entry.1 += accuracy * share;
        }
    }

    order
        .into_iter()
        .filter_map(|topic| {
            let (total, correct) = stats[topic];
            (total > 0.0).then(|| TopicPerformance {
                topic: topic.to_owned(),
                percentage: round_percent(correct / total * 100.0),
            })
        })
        .collect()
}

/// Average percentage grouped by calendar month (UTC), ordered Jan..Dec.
///
/// Results from the same month of different years fall into one group.
#[must_use]
pub fn scores_over_time(history: &[TestResult]) -> Vec<MonthlyScore> {
    let mut months: BTreeMap<u32, (f64, u32)> = BTreeMap::new();
    for result in history {
        let entry = months.entry(result.timestamp().month0()).or_insert((0.0, 0));
        entry.0 += result.percentage();
        entry.1 += 1;
    }

    months
        .into_iter()
        .filter_map(|(month0, (sum, count))| {
            let month = Month::try_from(u8::try_from(month0 + 1).ok()?).ok()?;
            Some(MonthlyScore {
                month,
                average: round_percent(sum / f64::from(count)),
            })
        })
        .collect()
}

/// Count results per assessment kind.
#[must_use]
pub fn history_stats(history: &[TestResult]) -> HistoryStats {
    let mut stats = HistoryStats {
        total: history.len(),
        by_kind: BTreeMap::new(),
    };
    for result in history {
        *stats.by_kind.entry(result.kind()).or_insert(0) += 1;
    }
    stats
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_percent(value: f64) -> u32 {
    value.round().max(0.0) as u32
}
