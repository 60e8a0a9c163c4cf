// SPDX-License-Identifier: Apache-2.0

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::datasource::types::Value;
use crate::error::{ReportError, ReportResult};
use crate::writer::ArtifactWriter;

/// UTF-8 byte order mark, emitted first so spreadsheet applications detect
/// the encoding.
const BOM: &[u8] = "\u{feff}".as_bytes();

pub struct CsvWriter {
    writer: BufWriter<File>,
    bom_written: bool,
    bytes_written: u64,
}

impl CsvWriter {
    pub async fn create(path: &std::path::Path) -> ReportResult<Self> {
        let file = File::create(path).await.map_err(|e| {
            ReportError::render_failed(format!("Failed to create CSV file: {}", e))
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
            bom_written: false,
            bytes_written: 0,
        })
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> ReportResult<()> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| ReportError::render_failed(e.to_string()))?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    async fn write_line(&mut self, line: &str) -> ReportResult<()> {
        if !self.bom_written {
            self.write_bytes(BOM).await?;
            self.bom_written = true;
        }
        self.write_bytes(line.as_bytes()).await?;
        self.write_bytes(b"\n").await?;
        Ok(())
    }

    /// RFC4180 quoting: quote when the value contains a comma, quote, CR or
    /// LF; double embedded quotes. Nothing else is escaped.
    pub fn escape_csv(value: &str) -> String {
        if value.contains(',')
            || value.contains('"')
            || value.contains('\n')
            || value.contains('\r')
        {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }

    fn format_value(value: &Value) -> String {
        match value {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => s.clone(),
            Value::Bytes(b) => STANDARD.encode(b),
        }
    }
}

#[async_trait::async_trait]
impl ArtifactWriter for CsvWriter {
    async fn write_header(&mut self, labels: &[String]) -> ReportResult<()> {
        if labels.is_empty() {
            // Header-less output still carries the BOM.
            if !self.bom_written {
                self.write_bytes(BOM).await?;
                self.bom_written = true;
            }
            return Ok(());
        }
        let header = labels
            .iter()
            .map(|label| Self::escape_csv(label))
            .collect::<Vec<_>>()
            .join(",");
        self.write_line(&header).await
    }

    async fn write_row(&mut self, values: &[Value]) -> ReportResult<()> {
        let line = values
            .iter()
            .map(|value| Self::escape_csv(&Self::format_value(value)))
            .collect::<Vec<_>>()
            .join(",");
        self.write_line(&line).await
    }

    async fn flush(&mut self) -> ReportResult<()> {
        self.writer
            .flush()
            .await
            .map_err(|e| ReportError::render_failed(e.to_string()))
    }

    async fn finish(&mut self) -> ReportResult<()> {
        self.flush().await
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_values_are_quoted_not_escaped() {
        assert_eq!(
            CsvWriter::escape_csv("O'Brien, Inc."),
            "\"O'Brien, Inc.\""
        );
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(CsvWriter::escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn plain_values_are_unquoted() {
        assert_eq!(CsvWriter::escape_csv("plain"), "plain");
        assert_eq!(CsvWriter::escape_csv("O'Brien"), "O'Brien");
    }

    #[test]
    fn newlines_force_quoting() {
        assert_eq!(CsvWriter::escape_csv("a\nb"), "\"a\nb\"");
        assert_eq!(CsvWriter::escape_csv("a\rb"), "\"a\rb\"");
    }

    #[tokio::test]
    async fn output_starts_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut writer = CsvWriter::create(&path).await.unwrap();
        writer
            .write_header(&["name".to_string(), "amount".to_string()])
            .await
            .unwrap();
        writer
            .write_row(&[Value::Text("O'Brien, Inc.".into()), Value::Int(100)])
            .await
            .unwrap();
        writer.finish().await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(BOM));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\"O'Brien, Inc.\",100"));
    }

    #[tokio::test]
    async fn empty_result_is_bom_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let mut writer = CsvWriter::create(&path).await.unwrap();
        writer.write_header(&[]).await.unwrap();
        writer.finish().await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, BOM);
    }
}
