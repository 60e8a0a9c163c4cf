// SPDX-License-Identifier: Apache-2.0

//! Generation orchestrator.
//!
//! Ties the pipeline together: pool acquisition, query execution, row-limit
//! enforcement, field resolution, document writing and PDF conversion, all
//! under the record lifecycle `pending -> success | failed`. Synchronous
//! and asynchronous execution share the same pipeline; the async path
//! returns the record id immediately and completes on a background task,
//! observable only by polling.

pub mod record;

pub use record::{GenerationRecord, RecordStatus, RecordStore};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GeneratorConfig;
use crate::convert;
use crate::datasource::store::SharedDatasourceStore;
use crate::datasource::types::{RecordId, TemplateId};
use crate::datasource::{PoolRegistry, QueryExecutor};
use crate::error::{ReportError, ReportResult};
use crate::template::{resolver, SharedTemplateStore, TemplateDescriptor};
use crate::writer::{self, select_strategy, MergeContext, OutputKind};

/// One caller-facing generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub template_id: TemplateId,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    pub output: OutputKind,
    #[serde(default)]
    pub report_name: Option<String>,
}

/// Handle to a finished artifact on disk.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub file_name: String,
}

struct PipelineOutcome {
    rows: usize,
    file_name: String,
    file_size: u64,
}

pub struct Generator {
    config: GeneratorConfig,
    templates: SharedTemplateStore,
    registry: Arc<PoolRegistry>,
    executor: QueryExecutor,
    records: RecordStore,
}

impl Generator {
    pub fn new(
        config: GeneratorConfig,
        datasources: SharedDatasourceStore,
        templates: SharedTemplateStore,
    ) -> Self {
        let registry = Arc::new(PoolRegistry::new(datasources));
        let executor = QueryExecutor::new(registry.clone());
        Self {
            config,
            templates,
            registry,
            executor,
            records: RecordStore::new(),
        }
    }

    /// The pool registry, for config owners that need `invalidate` and
    /// `test_connection`.
    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Runs one generation to completion on the caller's task.
    /// The failed record is completed and the error is still returned.
    pub async fn generate_sync(&self, req: GenerateRequest) -> ReportResult<GenerationRecord> {
        let template = self.templates.template(req.template_id).await?;
        let report_name = req
            .report_name
            .clone()
            .unwrap_or_else(|| default_report_name(&template.name));
        let params = template.resolved_params(&req.params);

        let pending = GenerationRecord::pending(
            template.id,
            &template.name,
            &report_name,
            params.clone(),
            req.output,
        );
        let id = pending.id;
        self.records.insert(pending).await;

        let result = self
            .run_pipeline(&template, &params, req.output, &report_name)
            .await;
        self.complete(id, &template, result).await
    }

    /// Creates the pending record, then finishes the work on a background
    /// task. Completion is observable only by polling `record(id)`.
    pub async fn generate_async(self: &Arc<Self>, req: GenerateRequest) -> ReportResult<RecordId> {
        let template = self.templates.template(req.template_id).await?;
        let report_name = req
            .report_name
            .clone()
            .unwrap_or_else(|| default_report_name(&template.name));
        let params = template.resolved_params(&req.params);

        let pending = GenerationRecord::pending(
            template.id,
            &template.name,
            &report_name,
            params.clone(),
            req.output,
        );
        let id = pending.id;
        self.records.insert(pending).await;

        let this = Arc::clone(self);
        let output = req.output;
        tokio::spawn(async move {
            let result = this
                .run_pipeline(&template, &params, output, &report_name)
                .await;
            if let Err(e) = this.complete(id, &template, result).await {
                tracing::warn!(record = %id, error = %e, "Background generation failed");
            }
        });

        Ok(id)
    }

    pub async fn record(&self, id: RecordId) -> ReportResult<GenerationRecord> {
        self.records.get(id).await
    }

    pub async fn list_records(&self) -> Vec<GenerationRecord> {
        self.records.list().await
    }

    /// Re-runs a prior generation as a brand-new record; the original
    /// record is never mutated.
    pub async fn regenerate(&self, id: RecordId) -> ReportResult<GenerationRecord> {
        let prior = self.records.get(id).await?;
        self.generate_sync(GenerateRequest {
            template_id: prior.template_id,
            params: prior.params,
            output: prior.output,
            report_name: Some(prior.report_name),
        })
        .await
    }

    /// Removes the record and its on-disk artifact. Artifact cleanup
    /// failures are logged, not escalated.
    pub async fn delete_record(&self, id: RecordId) -> ReportResult<()> {
        let record = self.records.remove(id).await?;
        if let Some(file_name) = record.file_name {
            let path = self.config.storage_root.join(&file_name);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(file = %path.display(), error = %e, "Failed to remove artifact");
            }
        }
        Ok(())
    }

    pub async fn preview(&self, id: RecordId) -> ReportResult<Artifact> {
        self.artifact(id).await
    }

    /// Like `preview`, but counts as a download.
    pub async fn download(&self, id: RecordId) -> ReportResult<Artifact> {
        let artifact = self.artifact(id).await?;
        self.records
            .update(id, |record| record.download_count += 1)
            .await?;
        Ok(artifact)
    }

    async fn artifact(&self, id: RecordId) -> ReportResult<Artifact> {
        let record = self.records.get(id).await?;
        if record.status != RecordStatus::Success {
            return Err(ReportError::artifact_unavailable(format!(
                "record {} has no artifact (status is not success)",
                id
            )));
        }
        let file_name = record.file_name.ok_or_else(|| {
            ReportError::artifact_unavailable(format!("record {} has no file reference", id))
        })?;
        let path = self.config.storage_root.join(&file_name);
        if !path.exists() {
            return Err(ReportError::artifact_unavailable(format!(
                "artifact file {} is missing",
                path.display()
            )));
        }
        Ok(Artifact {
            path,
            content_type: record.output.content_type(),
            file_name,
        })
    }

    async fn run_pipeline(
        &self,
        template: &TemplateDescriptor,
        params: &HashMap<String, serde_json::Value>,
        output_kind: OutputKind,
        report_name: &str,
    ) -> ReportResult<PipelineOutcome> {
        let query_output = self
            .executor
            .execute(template.datasource_id, &template.query, params)
            .await?;

        // Capacity check runs before any rendering; an over-limit result
        // never produces an artifact file.
        let rows = query_output.row_count();
        if rows > self.config.max_rows {
            return Err(ReportError::RowLimitExceeded {
                actual: rows,
                limit: self.config.max_rows,
            });
        }

        let projection = resolver::resolve(template);
        let strategy = select_strategy(output_kind, template.template_file.as_deref());

        tokio::fs::create_dir_all(&self.config.storage_root).await?;
        let token = Uuid::new_v4().simple().to_string();
        let file_name = format!("{}.{}", token, output_kind.extension());
        let final_path = self.config.storage_root.join(&file_name);

        let ctx = MergeContext {
            report_name: report_name.to_string(),
            generate_time: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            params: params.clone(),
        };

        let file_size = if output_kind == OutputKind::Pdf {
            let intermediate = self.config.storage_root.join(format!("{}.xlsx", token));
            writer::write_artifact(
                &intermediate,
                &strategy,
                &query_output,
                projection.as_ref(),
                &ctx,
                self.config.page_size,
            )
            .await?;
            convert::convert_with_cleanup(&intermediate, &final_path, &self.config.font_dir)
                .await?;
            tokio::fs::metadata(&final_path).await?.len()
        } else {
            writer::write_artifact(
                &final_path,
                &strategy,
                &query_output,
                projection.as_ref(),
                &ctx,
                self.config.page_size,
            )
            .await?
        };

        Ok(PipelineOutcome {
            rows,
            file_name,
            file_size,
        })
    }

    async fn complete(
        &self,
        id: RecordId,
        template: &TemplateDescriptor,
        result: ReportResult<PipelineOutcome>,
    ) -> ReportResult<GenerationRecord> {
        match result {
            Ok(outcome) => {
                let record = self
                    .records
                    .update(id, |record| {
                        record.complete_success(
                            outcome.rows,
                            outcome.file_name.clone(),
                            outcome.file_size,
                        );
                    })
                    .await?;
                if let Err(e) = self.templates.increment_use_count(template.id).await {
                    tracing::warn!(template = %template.id, error = %e, "Failed to bump use count");
                }
                tracing::info!(
                    record = %id,
                    rows = outcome.rows,
                    bytes = outcome.file_size,
                    "Report generated"
                );
                Ok(record)
            }
            Err(err) => {
                let update = self
                    .records
                    .update(id, |record| record.complete_failure(&err))
                    .await;
                if let Err(e) = update {
                    tracing::error!(record = %id, error = %e, "Failed to complete record");
                }
                tracing::warn!(record = %id, error = %err, "Report generation failed");
                Err(err)
            }
        }
    }
}

fn default_report_name(template_name: &str) -> String {
    format!("{}_{}", template_name, Local::now().format("%Y%m%d%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MemoryDatasourceStore;
    use crate::template::MemoryTemplateStore;

    fn generator_with_dir(dir: &std::path::Path) -> Generator {
        let config = GeneratorConfig {
            storage_root: dir.to_path_buf(),
            ..GeneratorConfig::default()
        };
        Generator::new(
            config,
            Arc::new(MemoryDatasourceStore::new()),
            Arc::new(MemoryTemplateStore::new()),
        )
    }

    #[test]
    fn default_report_name_carries_a_timestamp() {
        let name = default_report_name("sales");
        assert!(name.starts_with("sales_"));
        let stamp = &name["sales_".len()..];
        assert_eq!(stamp.len(), 14);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn artifact_requires_success_status() {
        let dir = tempfile::tempdir().unwrap();
        let generator = generator_with_dir(dir.path());

        let pending = GenerationRecord::pending(
            TemplateId::new(),
            "t",
            "t_x",
            HashMap::new(),
            OutputKind::Xlsx,
        );
        let id = pending.id;
        generator.records.insert(pending).await;

        let err = generator.download(id).await.unwrap_err();
        assert!(matches!(err, ReportError::ArtifactUnavailable { .. }));
    }

    #[tokio::test]
    async fn missing_template_fails_before_any_record_exists() {
        let dir = tempfile::tempdir().unwrap();
        let generator = generator_with_dir(dir.path());

        let err = generator
            .generate_sync(GenerateRequest {
                template_id: TemplateId::new(),
                params: HashMap::new(),
                output: OutputKind::Xlsx,
                report_name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::TemplateNotFound { .. }));
        assert!(generator.list_records().await.is_empty());
    }
}
