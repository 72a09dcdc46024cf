use serde_json::{Map, Value};
use tracing::trace;

use crate::{
    domain::KEY_STATISTICS,
    storage::{single, SharedStorage, StorageError},
};

/// Mirrors the hidden-post count into the `statistics` key.
#[derive(Clone)]
pub struct StatisticsReporter {
    storage: SharedStorage,
}

impl StatisticsReporter {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Read-modify-write of `statistics.totalHiddenPosts`. Other fields of the
    /// stored object are kept as they are. Concurrent writers may overwrite
    /// each other.
    pub async fn report(&self, hidden: u64) -> Result<(), StorageError> {
        let current = self.storage.get(Some(&[KEY_STATISTICS][..])).await?;
        let mut statistics = match current.get(KEY_STATISTICS) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        statistics.insert("totalHiddenPosts".to_string(), Value::from(hidden));
        self.storage
            .set(single(KEY_STATISTICS, Value::Object(statistics)))
            .await?;
        trace!(target: "stats", hidden, "statistics reported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::storage::{MemoryStorage, StorageArea};

    #[tokio::test]
    async fn report_keeps_unrelated_fields() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(single(
                KEY_STATISTICS,
                json!({"totalHiddenPosts": 1, "lastReset": 42, "custom": "x"}),
            ))
            .await
            .unwrap();

        let reporter = StatisticsReporter::new(storage.clone());
        reporter.report(7).await.unwrap();

        let stored = storage.get(None).await.unwrap();
        assert_eq!(
            stored[KEY_STATISTICS],
            json!({"totalHiddenPosts": 7, "lastReset": 42, "custom": "x"})
        );
    }

    #[tokio::test]
    async fn report_creates_missing_statistics() {
        let storage = Arc::new(MemoryStorage::new());
        StatisticsReporter::new(storage.clone()).report(0).await.unwrap();
        assert_eq!(
            storage.get(None).await.unwrap()[KEY_STATISTICS],
            json!({"totalHiddenPosts": 0})
        );
    }
}
