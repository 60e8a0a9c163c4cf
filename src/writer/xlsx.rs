// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use rust_xlsxwriter::{Format, Workbook};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::datasource::types::Value;
use crate::error::{ReportError, ReportResult};
use crate::writer::ArtifactWriter;

/// Streaming spreadsheet writer: bold header row, then plain data rows.
/// The workbook stays in memory until `finish`.
pub struct StreamXlsxWriter {
    workbook: Workbook,
    current_row: u32,
    column_count: u16,
    bytes_written: u64,
    output_path: PathBuf,
    header_format: Format,
}

impl StreamXlsxWriter {
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            workbook: Workbook::new(),
            current_row: 0,
            column_count: 0,
            bytes_written: 0,
            output_path,
            header_format: Format::new().set_bold(),
        }
    }

    fn write_value(
        worksheet: &mut rust_xlsxwriter::Worksheet,
        row: u32,
        col: u16,
        value: &Value,
    ) -> ReportResult<()> {
        let result = match value {
            Value::Null => worksheet.write_string(row, col, ""),
            Value::Bool(b) => worksheet.write_boolean(row, col, *b),
            Value::Int(i) => worksheet.write_number(row, col, *i as f64),
            Value::Float(f) => worksheet.write_number(row, col, *f),
            Value::Text(s) => worksheet.write_string(row, col, s),
            Value::Bytes(b) => {
                use base64::{engine::general_purpose::STANDARD, Engine as _};
                worksheet.write_string(row, col, &STANDARD.encode(b))
            }
        };
        result.map_err(|e| ReportError::render_failed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ArtifactWriter for StreamXlsxWriter {
    async fn write_header(&mut self, labels: &[String]) -> ReportResult<()> {
        let worksheet = self
            .workbook
            .add_worksheet()
            .set_name("Report")
            .map_err(|e| ReportError::render_failed(e.to_string()))?;

        for (col_idx, label) in labels.iter().enumerate() {
            worksheet
                .write_string_with_format(0, col_idx as u16, label, &self.header_format)
                .map_err(|e| ReportError::render_failed(e.to_string()))?;
        }

        self.column_count = labels.len() as u16;
        self.current_row = if labels.is_empty() { 0 } else { 1 };
        Ok(())
    }

    async fn write_row(&mut self, values: &[Value]) -> ReportResult<()> {
        let worksheet = self
            .workbook
            .worksheet_from_index(0)
            .map_err(|e| ReportError::render_failed(e.to_string()))?;

        for (idx, value) in values.iter().enumerate() {
            Self::write_value(worksheet, self.current_row, idx as u16, value)?;
        }

        self.current_row += 1;
        Ok(())
    }

    async fn flush(&mut self) -> ReportResult<()> {
        // Workbook stays in memory until finish()
        Ok(())
    }

    async fn finish(&mut self) -> ReportResult<()> {
        let buffer = self
            .workbook
            .save_to_buffer()
            .map_err(|e| ReportError::render_failed(format!("Failed to generate XLSX: {}", e)))?;

        self.bytes_written = buffer.len() as u64;

        let mut file = File::create(&self.output_path).await.map_err(|e| {
            ReportError::render_failed(format!("Failed to create output file: {}", e))
        })?;
        file.write_all(&buffer)
            .await
            .map_err(|e| ReportError::render_failed(format!("Failed to write XLSX: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| ReportError::render_failed(format!("Failed to flush XLSX: {}", e)))?;

        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let mut writer = StreamXlsxWriter::new(path.clone());

        writer
            .write_header(&["Name".to_string(), "Amount".to_string()])
            .await
            .unwrap();
        writer
            .write_row(&[Value::Text("Acme".into()), Value::Int(100)])
            .await
            .unwrap();
        writer.finish().await.unwrap();

        assert!(path.exists());
        assert!(writer.bytes_written() > 0);

        let book = umya_spreadsheet::reader::xlsx::read(&path).unwrap();
        let sheet = book.get_sheet(&0).unwrap();
        assert_eq!(sheet.get_cell((1, 1)).unwrap().get_value(), "Name");
        assert_eq!(sheet.get_cell((2, 1)).unwrap().get_value(), "Amount");
        assert_eq!(sheet.get_cell((1, 2)).unwrap().get_value(), "Acme");
        assert_eq!(sheet.get_cell((2, 2)).unwrap().get_value(), "100");
    }

    #[tokio::test]
    async fn empty_result_still_produces_a_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");
        let mut writer = StreamXlsxWriter::new(path.clone());

        writer.write_header(&[]).await.unwrap();
        writer.finish().await.unwrap();

        assert!(path.exists());
        assert!(umya_spreadsheet::reader::xlsx::read(&path).is_ok());
    }
}
