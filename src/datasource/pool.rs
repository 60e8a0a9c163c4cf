// SPDX-License-Identifier: Apache-2.0

//! Connection pool registry.
//!
//! One bounded pool per configured datasource, lazily created and cached by
//! datasource identity. Pools are replaced atomically on invalidation, never
//! mutated in place. MySQL, PostgreSQL and SQLite go through sqlx's `Any`
//! driver; SQL Server uses Tiberius behind a bb8 pool, the same split the
//! TDS protocol forces everywhere else.

use std::collections::HashMap;
use std::sync::{Arc, Once};
use std::time::Duration;

use bb8_tiberius::ConnectionManager;
use chrono::Utc;
use sqlx::any::AnyPoolOptions;
use tiberius::{AuthMethod, Config as TiberiusConfig, EncryptionLevel};
use tokio::sync::RwLock;

use crate::datasource::store::SharedDatasourceStore;
use crate::datasource::types::{DatasourceConfig, DatasourceId, Vendor};
use crate::datasource::url::build_connection_url;
use crate::error::{ReportError, ReportResult};

const POOL_MAX_CONNECTIONS: u32 = 5;
const POOL_MIN_IDLE: u32 = 1;
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub type MssqlPool = bb8::Pool<ConnectionManager>;

static INSTALL_DRIVERS: Once = Once::new();

fn ensure_any_drivers() {
    INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
}

/// The concrete pool behind a datasource.
pub enum PoolBackend {
    Any(sqlx::AnyPool),
    SqlServer(MssqlPool),
}

/// A cached, shared pool bound to one datasource config snapshot.
pub struct DatasourcePool {
    pub config: DatasourceConfig,
    pub backend: PoolBackend,
}

impl std::fmt::Debug for DatasourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasourcePool")
            .field("datasource", &self.config.id)
            .field("vendor", &self.config.vendor)
            .finish_non_exhaustive()
    }
}

impl DatasourcePool {
    async fn close(&self) {
        if let PoolBackend::Any(pool) = &self.backend {
            pool.close().await;
        }
        // bb8 pools release their connections on drop.
    }
}

/// Registry of connection pools keyed by datasource identity.
///
/// Shared mutable state: acquisition is safe under concurrent access, and
/// the double-check under the write lock keeps two racing callers from
/// building two pools for the same identity.
pub struct PoolRegistry {
    store: SharedDatasourceStore,
    pools: RwLock<HashMap<DatasourceId, Arc<DatasourcePool>>>,
}

impl PoolRegistry {
    pub fn new(store: SharedDatasourceStore) -> Self {
        Self {
            store,
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached pool for `id`, creating it on first use.
    pub async fn acquire(&self, id: DatasourceId) -> ReportResult<Arc<DatasourcePool>> {
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(&id) {
                return Ok(pool.clone());
            }
        }

        let config = self.store.datasource(id).await?;

        let mut pools = self.pools.write().await;
        // Re-check: another caller may have built the pool while we
        // were fetching the config.
        if let Some(pool) = pools.get(&id) {
            return Ok(pool.clone());
        }

        let backend = Self::create_backend(&config).await?;
        let pool = Arc::new(DatasourcePool { config, backend });
        pools.insert(id, pool.clone());
        tracing::info!(datasource = %id, "Created connection pool");
        Ok(pool)
    }

    /// Closes and evicts the cached pool for `id`. Call on config update
    /// or datasource deletion; a no-op when nothing is cached.
    pub async fn invalidate(&self, id: DatasourceId) {
        let removed = {
            let mut pools = self.pools.write().await;
            pools.remove(&id)
        };
        if let Some(pool) = removed {
            pool.close().await;
            tracing::info!(datasource = %id, "Invalidated connection pool");
        }
    }

    /// Liveness check: a lightweight round-trip under a short timeout.
    /// The outcome and timestamp are written back to the config store.
    /// Never errors.
    pub async fn test_connection(&self, id: DatasourceId) -> bool {
        let ok = match self.acquire(id).await {
            Ok(pool) => {
                match tokio::time::timeout(TEST_TIMEOUT, ping(&pool)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        tracing::warn!(datasource = %id, error = %e, "Connection test failed");
                        false
                    }
                    Err(_) => {
                        tracing::warn!(datasource = %id, "Connection test timed out");
                        false
                    }
                }
            }
            Err(e) => {
                tracing::warn!(datasource = %id, error = %e, "Connection test failed");
                false
            }
        };

        if let Err(e) = self.store.record_test_result(id, ok, Utc::now()).await {
            tracing::warn!(datasource = %id, error = %e, "Failed to record test result");
        }
        ok
    }

    async fn create_backend(config: &DatasourceConfig) -> ReportResult<PoolBackend> {
        match config.vendor {
            Vendor::MySql | Vendor::Postgres | Vendor::Sqlite => {
                ensure_any_drivers();
                let url = build_connection_url(config)?;
                let pool = AnyPoolOptions::new()
                    .max_connections(POOL_MAX_CONNECTIONS)
                    .min_connections(POOL_MIN_IDLE)
                    .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
                    .idle_timeout(Some(POOL_IDLE_TIMEOUT))
                    .max_lifetime(Some(POOL_MAX_LIFETIME))
                    .connect(&url)
                    .await
                    .map_err(|e| {
                        ReportError::connection_failed(format!(
                            "Failed to create connection pool: {e}"
                        ))
                    })?;
                Ok(PoolBackend::Any(pool))
            }
            Vendor::SqlServer => {
                let tib_config = Self::build_tiberius_config(config);
                let mgr = ConnectionManager::new(tib_config);
                let pool = bb8::Pool::builder()
                    .max_size(POOL_MAX_CONNECTIONS)
                    .min_idle(Some(POOL_MIN_IDLE))
                    .connection_timeout(POOL_ACQUIRE_TIMEOUT)
                    .idle_timeout(Some(POOL_IDLE_TIMEOUT))
                    .max_lifetime(Some(POOL_MAX_LIFETIME))
                    .build(mgr)
                    .await
                    .map_err(|e| {
                        ReportError::connection_failed(format!(
                            "Failed to create connection pool: {e}"
                        ))
                    })?;
                Ok(PoolBackend::SqlServer(pool))
            }
            Vendor::Oracle | Vendor::HttpApi => {
                Err(ReportError::unsupported_vendor(config.vendor.as_str()))
            }
        }
    }

    fn build_tiberius_config(config: &DatasourceConfig) -> TiberiusConfig {
        let mut tib_config = TiberiusConfig::new();
        tib_config.host(&config.host);
        tib_config.port(config.port);
        tib_config.authentication(AuthMethod::sql_server(&config.username, &config.password));
        if !config.database.is_empty() {
            tib_config.database(&config.database);
        }
        tib_config.encryption(EncryptionLevel::NotSupported);
        tib_config.trust_cert();
        tib_config
    }
}

async fn ping(pool: &DatasourcePool) -> ReportResult<()> {
    match &pool.backend {
        PoolBackend::Any(any_pool) => {
            sqlx::query("SELECT 1")
                .execute(any_pool)
                .await
                .map_err(|e| ReportError::connection_failed(e.to_string()))?;
            Ok(())
        }
        PoolBackend::SqlServer(mssql_pool) => {
            let mut conn = mssql_pool.get().await.map_err(|e| {
                ReportError::connection_failed(format!("Failed to acquire connection: {e}"))
            })?;
            conn.simple_query("SELECT 1")
                .await
                .map_err(|e| ReportError::connection_failed(e.to_string()))?
                .into_results()
                .await
                .map_err(|e| ReportError::connection_failed(e.to_string()))?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::store::MemoryDatasourceStore;

    #[tokio::test]
    async fn acquire_unknown_datasource_fails() {
        let store = Arc::new(MemoryDatasourceStore::new());
        let registry = PoolRegistry::new(store);
        let err = registry.acquire(DatasourceId::new()).await.unwrap_err();
        assert!(matches!(err, ReportError::DatasourceNotFound { .. }));
    }

    #[tokio::test]
    async fn oracle_pool_is_a_configuration_error() {
        let store = Arc::new(MemoryDatasourceStore::new());
        let mut config = DatasourceConfig::sqlite("ora", "unused");
        config.vendor = Vendor::Oracle;
        config.host = "ora.internal".into();
        config.port = 1521;
        let id = config.id;
        store.insert(config).await;

        let registry = PoolRegistry::new(store);
        let err = registry.acquire(id).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn invalidate_without_pool_is_a_noop() {
        let store = Arc::new(MemoryDatasourceStore::new());
        let registry = PoolRegistry::new(store);
        registry.invalidate(DatasourceId::new()).await;
    }
}
