use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use exam_core::model::TestResult;
use storage::repository::{InMemoryStore, JsonStoreExt, KeyValueStore};

use crate::error::HistoryError;

/// Storage key holding the JSON array of completed results.
pub const HISTORY_KEY: &str = "exam.history";

/// Append-only log of completed assessments.
///
/// Appends are serialized so concurrent submissions never drop each other's
/// entries through interleaved read-modify-write cycles.
pub struct HistoryService {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl HistoryService {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// All results in insertion order.
    ///
    /// Unreadable or corrupt storage degrades to an empty history.
    pub async fn all(&self) -> Vec<TestResult> {
        match self.try_all().await {
            Ok(results) => results,
            Err(err) => {
                warn!(error = %err, key = HISTORY_KEY, "history unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    /// All results in insertion order, surfacing storage failures.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError` if the stored value cannot be read or decoded.
    pub async fn try_all(&self) -> Result<Vec<TestResult>, HistoryError> {
        Ok(self
            .store
            .get_json::<Vec<TestResult>>(HISTORY_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Append one result to the end of the history.
    ///
    /// A stored value that cannot be decoded is left untouched rather than
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError` if reading or writing storage fails.
    pub async fn append(&self, result: &TestResult) -> Result<(), HistoryError> {
        let _guard = self.write_lock.lock().await;
        let mut history = self.try_all().await?;
        history.push(result.clone());
        self.store.set_json(HISTORY_KEY, &history).await?;
        debug!(id = %result.id(), len = history.len(), "history appended");
        Ok(())
    }

    /// Remove every stored result.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError` if storage rejects the removal.
    pub async fn clear(&self) -> Result<(), HistoryError> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(HISTORY_KEY).await?;
        debug!("history cleared");
        Ok(())
    }
}
