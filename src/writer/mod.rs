// SPDX-License-Identifier: Apache-2.0

//! Document writers: row data + field projection in, artifact file out.
//!
//! Three strategies exist. Streaming spreadsheet output writes a header and
//! paginated data rows; template-merge output fills a pre-built spreadsheet
//! shell; CSV output emits delimited text. PDF is not a strategy of its own:
//! it always goes through an intermediate spreadsheet first (see `convert`).

pub mod csv;
pub mod merge;
pub mod xlsx;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::datasource::types::{QueryOutput, Value};
use crate::error::ReportResult;
use crate::template::FieldProjection;

/// Requested artifact kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Xlsx,
    Pdf,
    Csv,
}

impl OutputKind {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputKind::Xlsx => "xlsx",
            OutputKind::Pdf => "pdf",
            OutputKind::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputKind::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            OutputKind::Pdf => "application/pdf",
            OutputKind::Csv => "text/csv",
        }
    }
}

/// How the artifact (or the PDF intermediate) gets written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStrategy {
    StreamXlsx,
    MergeXlsx(PathBuf),
    Csv,
}

/// Picks the write strategy from the requested kind and template shape.
/// A configured template file always wins for spreadsheet-backed output.
pub fn select_strategy(kind: OutputKind, template_file: Option<&Path>) -> WriteStrategy {
    match kind {
        OutputKind::Csv => WriteStrategy::Csv,
        OutputKind::Xlsx | OutputKind::Pdf => match template_file {
            Some(path) => WriteStrategy::MergeXlsx(path.to_path_buf()),
            None => WriteStrategy::StreamXlsx,
        },
    }
}

/// Report metadata bound into merge-style generation.
#[derive(Debug, Clone, Default)]
pub struct MergeContext {
    pub report_name: String,
    pub generate_time: String,
    pub params: HashMap<String, serde_json::Value>,
}

/// Incremental writer for the streaming strategies.
#[async_trait]
pub trait ArtifactWriter: Send {
    async fn write_header(&mut self, labels: &[String]) -> ReportResult<()>;
    async fn write_row(&mut self, values: &[Value]) -> ReportResult<()>;
    async fn flush(&mut self) -> ReportResult<()>;
    async fn finish(&mut self) -> ReportResult<()>;
    fn bytes_written(&self) -> u64;
}

/// Header labels and source column keys, in output order.
///
/// With a projection the author's order and labels win; without one every
/// column of the result set is emitted under its raw key, in source order.
pub fn plan_columns(
    output: &QueryOutput,
    projection: Option<&FieldProjection>,
) -> (Vec<String>, Vec<String>) {
    match projection {
        Some(projection) => (
            projection.labels().iter().map(|s| s.to_string()).collect(),
            projection.keys().iter().map(|s| s.to_string()).collect(),
        ),
        None => {
            let keys: Vec<String> = output.columns.iter().map(|c| c.name.clone()).collect();
            (keys.clone(), keys)
        }
    }
}

/// Projects one row into the planned key order.
pub fn project_row(output: &QueryOutput, row: &crate::datasource::types::Row, keys: &[String]) -> Vec<Value> {
    keys.iter().map(|key| output.value(row, key)).collect()
}

/// Writes the full artifact for `strategy` to `path`, returning the byte
/// size of the written file.
pub async fn write_artifact(
    path: &Path,
    strategy: &WriteStrategy,
    output: &QueryOutput,
    projection: Option<&FieldProjection>,
    ctx: &MergeContext,
    page_size: usize,
) -> ReportResult<u64> {
    match strategy {
        WriteStrategy::MergeXlsx(template_file) => {
            merge::merge_into_file(template_file, path, output, ctx).await
        }
        WriteStrategy::StreamXlsx => {
            let mut writer = xlsx::StreamXlsxWriter::new(path.to_path_buf());
            drive_paged(&mut writer, output, projection, page_size).await?;
            Ok(writer.bytes_written())
        }
        WriteStrategy::Csv => {
            let mut writer = csv::CsvWriter::create(path).await?;
            drive_paged(&mut writer, output, projection, page_size).await?;
            Ok(writer.bytes_written())
        }
    }
}

/// Header, then data rows in fixed-size pages with a flush after each page.
/// Sequential by design: row order and bounded memory both depend on it.
async fn drive_paged(
    writer: &mut dyn ArtifactWriter,
    output: &QueryOutput,
    projection: Option<&FieldProjection>,
    page_size: usize,
) -> ReportResult<()> {
    let (labels, keys) = plan_columns(output, projection);
    writer.write_header(&labels).await?;

    let page_size = page_size.max(1);
    for page in output.rows.chunks(page_size) {
        for row in page {
            let values = project_row(output, row, &keys);
            writer.write_row(&values).await?;
        }
        writer.flush().await?;
    }

    writer.finish().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::types::{ColumnInfo, Row};
    use crate::template::{FieldProjection, ProjectedField};

    fn sample_output() -> QueryOutput {
        QueryOutput {
            columns: vec![
                ColumnInfo { name: "amount".into(), data_type: "INTEGER".into() },
                ColumnInfo { name: "name".into(), data_type: "TEXT".into() },
            ],
            rows: vec![Row {
                values: vec![Value::Int(100), Value::Text("Acme".into())],
            }],
        }
    }

    #[test]
    fn projection_orders_and_labels_columns() {
        let output = sample_output();
        let projection = FieldProjection {
            fields: vec![
                ProjectedField { key: "name".into(), label: "Name".into(), column: 0 },
                ProjectedField { key: "amount".into(), label: "Amount".into(), column: 1 },
            ],
        };
        let (labels, keys) = plan_columns(&output, Some(&projection));
        assert_eq!(labels, vec!["Name", "Amount"]);
        assert_eq!(keys, vec!["name", "amount"]);

        let values = project_row(&output, &output.rows[0], &keys);
        assert_eq!(values, vec![Value::Text("Acme".into()), Value::Int(100)]);
    }

    #[test]
    fn no_projection_falls_back_to_all_columns() {
        let output = sample_output();
        let (labels, keys) = plan_columns(&output, None);
        assert_eq!(labels, vec!["amount", "name"]);
        assert_eq!(keys, labels);
    }

    #[test]
    fn strategy_selection() {
        assert_eq!(select_strategy(OutputKind::Csv, None), WriteStrategy::Csv);
        assert_eq!(
            select_strategy(OutputKind::Xlsx, None),
            WriteStrategy::StreamXlsx
        );
        let shell = PathBuf::from("/tmp/shell.xlsx");
        assert_eq!(
            select_strategy(OutputKind::Pdf, Some(&shell)),
            WriteStrategy::MergeXlsx(shell.clone())
        );
        // CSV never merges, even with a template file configured.
        assert_eq!(
            select_strategy(OutputKind::Csv, Some(&shell)),
            WriteStrategy::Csv
        );
    }
}
