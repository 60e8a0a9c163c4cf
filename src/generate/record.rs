// SPDX-License-Identifier: Apache-2.0

//! Generation records and their process-local store.
//!
//! A record is created in `Pending` before any data access and mutated
//! exactly once at completion; no failure path leaves it pending. Records
//! are process-local state owned by the orchestrator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::datasource::types::{RecordId, TemplateId};
use crate::error::{ReportError, ReportResult};
use crate::writer::OutputKind;

/// Lifecycle status of one generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Success,
    Failed,
}

/// The persisted lifecycle object tracking one generation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: RecordId,
    pub template_id: TemplateId,
    pub template_name: String,
    pub report_name: String,
    pub params: HashMap<String, serde_json::Value>,
    pub output: OutputKind,
    pub status: RecordStatus,
    pub data_rows: Option<usize>,
    /// Artifact file name under the storage root; valid only while
    /// `status == Success`.
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub download_count: u64,
}

impl GenerationRecord {
    pub fn pending(
        template_id: TemplateId,
        template_name: impl Into<String>,
        report_name: impl Into<String>,
        params: HashMap<String, serde_json::Value>,
        output: OutputKind,
    ) -> Self {
        Self {
            id: RecordId::new(),
            template_id,
            template_name: template_name.into(),
            report_name: report_name.into(),
            params,
            output,
            status: RecordStatus::Pending,
            data_rows: None,
            file_name: None,
            file_size: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            download_count: 0,
        }
    }

    fn finish(&mut self) {
        let finished = Utc::now();
        self.finished_at = Some(finished);
        self.duration_ms = Some(
            (finished - self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
    }

    /// One atomic completion update for the success path.
    pub fn complete_success(&mut self, data_rows: usize, file_name: String, file_size: u64) {
        self.status = RecordStatus::Success;
        self.data_rows = Some(data_rows);
        self.file_name = Some(file_name);
        self.file_size = Some(file_size);
        self.finish();
    }

    /// Completion update for any failure; timestamps and duration are still
    /// recorded.
    pub fn complete_failure(&mut self, error: &ReportError) {
        self.status = RecordStatus::Failed;
        self.error = Some(error.to_string());
        self.finish();
    }
}

/// Process-local record store.
#[derive(Default)]
pub struct RecordStore {
    records: RwLock<HashMap<RecordId, GenerationRecord>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: GenerationRecord) {
        let mut records = self.records.write().await;
        records.insert(record.id, record);
    }

    pub async fn get(&self, id: RecordId) -> ReportResult<GenerationRecord> {
        let records = self.records.read().await;
        records
            .get(&id)
            .cloned()
            .ok_or_else(|| ReportError::record_not_found(id))
    }

    /// All records, newest first.
    pub async fn list(&self) -> Vec<GenerationRecord> {
        let records = self.records.read().await;
        let mut all: Vec<GenerationRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    }

    pub async fn update<F>(&self, id: RecordId, f: F) -> ReportResult<GenerationRecord>
    where
        F: FnOnce(&mut GenerationRecord),
    {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| ReportError::record_not_found(id))?;
        f(record);
        Ok(record.clone())
    }

    pub async fn remove(&self, id: RecordId) -> ReportResult<GenerationRecord> {
        let mut records = self.records.write().await;
        records
            .remove(&id)
            .ok_or_else(|| ReportError::record_not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> GenerationRecord {
        GenerationRecord::pending(
            TemplateId::new(),
            "sales",
            "sales_20260829",
            HashMap::new(),
            OutputKind::Xlsx,
        )
    }

    #[test]
    fn success_completion_sets_all_fields_at_once() {
        let mut record = pending();
        record.complete_success(3, "abc.xlsx".into(), 1024);
        assert_eq!(record.status, RecordStatus::Success);
        assert_eq!(record.data_rows, Some(3));
        assert_eq!(record.file_name.as_deref(), Some("abc.xlsx"));
        assert_eq!(record.file_size, Some(1024));
        assert!(record.finished_at.is_some());
        assert!(record.duration_ms.is_some());
        assert!(record.error.is_none());
    }

    #[test]
    fn failure_completion_still_records_timestamps() {
        let mut record = pending();
        record.complete_failure(&ReportError::query_failed("no such table"));
        assert_eq!(record.status, RecordStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("no such table"));
        assert!(record.finished_at.is_some());
        assert!(record.duration_ms.is_some());
        assert!(record.file_name.is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = RecordStore::new();
        let mut first = pending();
        first.started_at = Utc::now() - chrono::Duration::seconds(10);
        let second = pending();
        let second_id = second.id;
        store.insert(first).await;
        store.insert(second).await;

        let all = store.list().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second_id);
    }
}
