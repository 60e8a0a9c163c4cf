//! External datasource configuration store.
//!
//! The store is the source of truth for `DatasourceConfig` records; the pool
//! registry only derives cache entries from it. The core writes nothing back
//! except the liveness-test outcome fields.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::datasource::types::{DatasourceConfig, DatasourceId};
use crate::error::{ReportError, ReportResult};

#[async_trait]
pub trait DatasourceStore: Send + Sync {
    /// Fetch a datasource config by identity.
    async fn datasource(&self, id: DatasourceId) -> ReportResult<DatasourceConfig>;

    /// Record the outcome of a liveness test on the config.
    async fn record_test_result(
        &self,
        id: DatasourceId,
        ok: bool,
        at: DateTime<Utc>,
    ) -> ReportResult<()>;
}

/// In-memory store used by tests and by embedders without persistence.
#[derive(Default)]
pub struct MemoryDatasourceStore {
    configs: RwLock<HashMap<DatasourceId, DatasourceConfig>>,
}

impl MemoryDatasourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, config: DatasourceConfig) {
        let mut configs = self.configs.write().await;
        configs.insert(config.id, config);
    }

    pub async fn remove(&self, id: DatasourceId) -> Option<DatasourceConfig> {
        let mut configs = self.configs.write().await;
        configs.remove(&id)
    }
}

#[async_trait]
impl DatasourceStore for MemoryDatasourceStore {
    async fn datasource(&self, id: DatasourceId) -> ReportResult<DatasourceConfig> {
        let configs = self.configs.read().await;
        configs
            .get(&id)
            .cloned()
            .ok_or_else(|| ReportError::datasource_not_found(id))
    }

    async fn record_test_result(
        &self,
        id: DatasourceId,
        ok: bool,
        at: DateTime<Utc>,
    ) -> ReportResult<()> {
        let mut configs = self.configs.write().await;
        let config = configs
            .get_mut(&id)
            .ok_or_else(|| ReportError::datasource_not_found(id))?;
        config.last_test_time = Some(at);
        config.test_ok = Some(ok);
        Ok(())
    }
}

/// Shared handle type used across the crate.
pub type SharedDatasourceStore = Arc<dyn DatasourceStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_datasource_is_a_typed_error() {
        let store = MemoryDatasourceStore::new();
        let err = store.datasource(DatasourceId::new()).await.unwrap_err();
        assert!(matches!(err, ReportError::DatasourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_result_is_written_back() {
        let store = MemoryDatasourceStore::new();
        let config = DatasourceConfig::sqlite("local", "/tmp/x.db");
        let id = config.id;
        store.insert(config).await;

        store.record_test_result(id, true, Utc::now()).await.unwrap();

        let fetched = store.datasource(id).await.unwrap();
        assert_eq!(fetched.test_ok, Some(true));
        assert!(fetched.last_test_time.is_some());
    }
}
