//! Datasource connection management, query execution and introspection.

pub mod executor;
pub mod pool;
pub mod store;
pub mod types;
pub mod url;

pub use executor::{substitute_params, QueryExecutor};
pub use pool::{DatasourcePool, PoolBackend, PoolRegistry};
pub use store::{DatasourceStore, MemoryDatasourceStore, SharedDatasourceStore};
pub use types::{
    ColumnInfo, DatasourceConfig, DatasourceId, QueryOutput, RecordId, Row, TemplateId, Value,
    Vendor,
};
pub use url::build_connection_url;
