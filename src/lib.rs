// reportgen - Enterprise report generation pipeline
// Core library

pub mod config;
pub mod convert;
pub mod datasource;
pub mod error;
pub mod generate;
pub mod observability;
pub mod template;
pub mod writer;

pub use config::GeneratorConfig;
pub use datasource::{
    build_connection_url, DatasourceConfig, DatasourceId, DatasourceStore, MemoryDatasourceStore,
    PoolRegistry, QueryExecutor, QueryOutput, RecordId, Row, SharedDatasourceStore, TemplateId,
    Value, Vendor,
};
pub use error::{ReportError, ReportResult};
pub use generate::{
    Artifact, GenerateRequest, GenerationRecord, Generator, RecordStatus, RecordStore,
};
pub use template::{
    FieldProjection, MemoryTemplateStore, ParamConfig, SharedTemplateStore, TemplateDescriptor,
    TemplateStore,
};
pub use writer::{OutputKind, WriteStrategy};
