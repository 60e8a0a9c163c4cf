//! Report template descriptors and the design-layout field resolver.

pub mod resolver;

pub use resolver::{
    column_index, column_letter, parse_cell_ref, resolve, FieldProjection, ProjectedField,
};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::datasource::types::{DatasourceId, TemplateId};
use crate::error::{ReportError, ReportResult};

/// One declared template parameter: a name and its default value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamConfig {
    pub name: String,
    pub value: serde_json::Value,
}

/// A named report definition: a query, its parameters, and an optional
/// visual layout or on-disk spreadsheet shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    pub id: TemplateId,
    pub name: String,
    pub datasource_id: DatasourceId,
    pub query: String,
    /// Cell position (A1 form) to literal/placeholder text.
    #[serde(default)]
    pub design_layout: Option<HashMap<String, String>>,
    /// Spreadsheet shell for merge-style generation.
    #[serde(default)]
    pub template_file: Option<PathBuf>,
    #[serde(default)]
    pub params: Vec<ParamConfig>,
    #[serde(default)]
    pub use_count: u64,
}

impl TemplateDescriptor {
    pub fn new(
        name: impl Into<String>,
        datasource_id: DatasourceId,
        query: impl Into<String>,
    ) -> Self {
        Self {
            id: TemplateId::new(),
            name: name.into(),
            datasource_id,
            query: query.into(),
            design_layout: None,
            template_file: None,
            params: Vec::new(),
            use_count: 0,
        }
    }

    /// Declared defaults merged with caller-supplied overrides.
    pub fn resolved_params(
        &self,
        overrides: &HashMap<String, serde_json::Value>,
    ) -> HashMap<String, serde_json::Value> {
        let mut merged: HashMap<String, serde_json::Value> = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        for (k, v) in overrides {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }
}

/// External template configuration store. The core only writes `use_count`
/// back, and only on successful generation.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn template(&self, id: TemplateId) -> ReportResult<TemplateDescriptor>;

    async fn increment_use_count(&self, id: TemplateId) -> ReportResult<()>;
}

pub type SharedTemplateStore = Arc<dyn TemplateStore>;

/// In-memory store used by tests and by embedders without persistence.
#[derive(Default)]
pub struct MemoryTemplateStore {
    templates: RwLock<HashMap<TemplateId, TemplateDescriptor>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, template: TemplateDescriptor) {
        let mut templates = self.templates.write().await;
        templates.insert(template.id, template);
    }

    pub async fn remove(&self, id: TemplateId) -> Option<TemplateDescriptor> {
        let mut templates = self.templates.write().await;
        templates.remove(&id)
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn template(&self, id: TemplateId) -> ReportResult<TemplateDescriptor> {
        let templates = self.templates.read().await;
        templates
            .get(&id)
            .cloned()
            .ok_or_else(|| ReportError::template_not_found(id))
    }

    async fn increment_use_count(&self, id: TemplateId) -> ReportResult<()> {
        let mut templates = self.templates.write().await;
        let template = templates
            .get_mut(&id)
            .ok_or_else(|| ReportError::template_not_found(id))?;
        template.use_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn use_count_increments() {
        let store = MemoryTemplateStore::new();
        let template = TemplateDescriptor::new("sales", DatasourceId::new(), "SELECT 1");
        let id = template.id;
        store.insert(template).await;

        store.increment_use_count(id).await.unwrap();
        store.increment_use_count(id).await.unwrap();

        assert_eq!(store.template(id).await.unwrap().use_count, 2);
    }

    #[test]
    fn caller_params_override_declared_defaults() {
        let mut template = TemplateDescriptor::new("t", DatasourceId::new(), "SELECT 1");
        template.params = vec![
            ParamConfig { name: "region".into(), value: serde_json::json!("EMEA") },
            ParamConfig { name: "year".into(), value: serde_json::json!(2025) },
        ];

        let mut overrides = HashMap::new();
        overrides.insert("year".to_string(), serde_json::json!(2026));

        let merged = template.resolved_params(&overrides);
        assert_eq!(merged["region"], serde_json::json!("EMEA"));
        assert_eq!(merged["year"], serde_json::json!(2026));
    }
}
