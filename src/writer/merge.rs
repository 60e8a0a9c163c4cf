// SPDX-License-Identifier: Apache-2.0

//! Template-merge spreadsheet writer.
//!
//! Loads a pre-built spreadsheet shell and binds a variable context into its
//! `${var}` placeholders: the report name, the generation time, and the
//! author-declared parameter values. The topmost row whose placeholders
//! match data columns is the repeating row; it is expanded into one copy per
//! data row, carrying the template row's cell styles, with everything below
//! shifted down.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;

use crate::datasource::types::{QueryOutput, Row, Value};
use crate::error::{ReportError, ReportResult};
use crate::writer::MergeContext;

struct TemplateCell {
    col: u32,
    text: String,
    style: umya_spreadsheet::Style,
}

pub async fn merge_into_file(
    template_file: &Path,
    dest: &Path,
    output: &QueryOutput,
    ctx: &MergeContext,
) -> ReportResult<u64> {
    if !template_file.exists() {
        return Err(ReportError::template_file_not_found(
            template_file.display().to_string(),
        ));
    }

    let mut book = umya_spreadsheet::reader::xlsx::read(template_file)
        .map_err(|e| ReportError::render_failed(format!("Failed to read template: {}", e)))?;

    let vars = build_vars(ctx);
    let pattern = Regex::new(r"\$\{(\w+)\}").expect("valid placeholder pattern");

    let sheet = book
        .get_sheet_mut(&0)
        .ok_or_else(|| ReportError::render_failed("Template has no worksheet"))?;
    let (max_col, max_row) = sheet.get_highest_column_and_row();

    // Pass 1: locate the repeating row (topmost row with a placeholder
    // naming a data column) and capture its cells.
    let mut repeat_row: Option<u32> = None;
    for row in 1..=max_row {
        for col in 1..=max_col {
            let Some(cell) = sheet.get_cell((col, row)) else {
                continue;
            };
            let text = cell.get_value().to_string();
            let has_data_key = pattern
                .captures_iter(&text)
                .any(|caps| output.column_index(&caps[1]).is_some());
            if has_data_key {
                repeat_row = Some(row);
                break;
            }
        }
        if repeat_row.is_some() {
            break;
        }
    }

    let template_cells: Vec<TemplateCell> = match repeat_row {
        Some(r) => (1..=max_col)
            .filter_map(|col| {
                sheet.get_cell((col, r)).map(|cell| TemplateCell {
                    col,
                    text: cell.get_value().to_string(),
                    style: cell.get_style().clone(),
                })
            })
            .collect(),
        None => Vec::new(),
    };

    // Pass 2: bind variables everywhere outside the repeating row.
    // Placeholders that match no variable are blanked.
    for row in 1..=max_row {
        if Some(row) == repeat_row {
            continue;
        }
        for col in 1..=max_col {
            let Some(cell) = sheet.get_cell((col, row)) else {
                continue;
            };
            let text = cell.get_value().to_string();
            if !pattern.is_match(&text) {
                continue;
            }
            let replaced = substitute(&pattern, &text, &vars, output, None);
            sheet.get_cell_mut((col, row)).set_value(replaced);
        }
    }

    // Pass 3: expand the repeating row, one copy per data row, the template
    // row's styles carried onto each copy.
    if let Some(r) = repeat_row {
        let n = output.rows.len();
        if n == 0 {
            for tc in &template_cells {
                let replaced = substitute(&pattern, &tc.text, &vars, output, None);
                sheet.get_cell_mut((tc.col, r)).set_value(replaced);
            }
        } else {
            if n > 1 {
                sheet.insert_new_row(&(r + 1), &((n - 1) as u32));
            }
            for (i, data_row) in output.rows.iter().enumerate() {
                let target = r + i as u32;
                for tc in &template_cells {
                    write_merged_cell(
                        sheet,
                        tc,
                        target,
                        &pattern,
                        &vars,
                        output,
                        data_row,
                        i > 0,
                    );
                }
            }
        }
    }

    umya_spreadsheet::writer::xlsx::write(&book, dest)
        .map_err(|e| ReportError::render_failed(format!("Failed to write workbook: {}", e)))?;

    let size = std::fs::metadata(dest)?.len();
    Ok(size)
}

#[allow(clippy::too_many_arguments)]
fn write_merged_cell(
    sheet: &mut umya_spreadsheet::Worksheet,
    tc: &TemplateCell,
    target_row: u32,
    pattern: &Regex,
    vars: &HashMap<String, String>,
    output: &QueryOutput,
    data_row: &Row,
    copy_style: bool,
) {
    // A cell that is exactly one data placeholder keeps the value's type.
    let trimmed = tc.text.trim();
    let whole_match = pattern
        .captures(trimmed)
        .filter(|caps| caps.get(0).map(|m| m.as_str()) == Some(trimmed))
        .map(|caps| caps[1].to_string());

    let cell = sheet.get_cell_mut((tc.col, target_row));
    if copy_style {
        cell.set_style(tc.style.clone());
    }

    if let Some(key) = whole_match {
        if output.column_index(&key).is_some() {
            match output.value(data_row, &key) {
                Value::Int(i) => {
                    cell.set_value_number(i as f64);
                    return;
                }
                Value::Float(f) => {
                    cell.set_value_number(f);
                    return;
                }
                other => {
                    cell.set_value(other.display());
                    return;
                }
            }
        }
    }

    let replaced = substitute(pattern, &tc.text, vars, output, Some(data_row));
    cell.set_value(replaced);
}

fn build_vars(ctx: &MergeContext) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("reportName".to_string(), ctx.report_name.clone());
    vars.insert("generateTime".to_string(), ctx.generate_time.clone());
    for (name, value) in &ctx.params {
        vars.insert(name.clone(), render_json(value));
    }
    vars
}

fn render_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replaces every placeholder: context variables first, then data columns
/// (when a row is bound), then blank for anything unresolved.
fn substitute(
    pattern: &Regex,
    text: &str,
    vars: &HashMap<String, String>,
    output: &QueryOutput,
    data_row: Option<&Row>,
) -> String {
    pattern
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            if let Some(value) = vars.get(name) {
                return value.clone();
            }
            if let Some(row) = data_row {
                if output.column_index(name).is_some() {
                    return output.value(row, name).display();
                }
            }
            String::new()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::types::ColumnInfo;

    fn sample_output() -> QueryOutput {
        QueryOutput {
            columns: vec![
                ColumnInfo { name: "name".into(), data_type: "TEXT".into() },
                ColumnInfo { name: "amount".into(), data_type: "INTEGER".into() },
            ],
            rows: vec![
                Row { values: vec![Value::Text("Acme".into()), Value::Int(100)] },
                Row { values: vec![Value::Text("Globex".into()), Value::Int(250)] },
            ],
        }
    }

    fn write_shell(path: &Path) {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_mut(&0).unwrap();
        sheet.get_cell_mut("A1").set_value("${reportName}");
        sheet.get_cell_mut("A2").set_value("Name");
        sheet.get_cell_mut("B2").set_value("Amount");
        sheet.get_cell_mut("A3").set_value("${name}");
        sheet.get_cell_mut("B3").set_value("${amount}");
        sheet.get_cell_mut("A4").set_value("Generated: ${generateTime}");
        umya_spreadsheet::writer::xlsx::write(&book, path).unwrap();
    }

    fn ctx() -> MergeContext {
        MergeContext {
            report_name: "Monthly Sales".into(),
            generate_time: "2026-08-29 10:00:00".into(),
            params: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn missing_template_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = merge_into_file(
            &dir.path().join("missing.xlsx"),
            &dir.path().join("out.xlsx"),
            &sample_output(),
            &ctx(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ReportError::TemplateFileNotFound { .. }));
    }

    #[tokio::test]
    async fn repeating_row_expands_per_data_row() {
        let dir = tempfile::tempdir().unwrap();
        let shell = dir.path().join("shell.xlsx");
        let out = dir.path().join("out.xlsx");
        write_shell(&shell);

        let size = merge_into_file(&shell, &out, &sample_output(), &ctx())
            .await
            .unwrap();
        assert!(size > 0);

        let book = umya_spreadsheet::reader::xlsx::read(&out).unwrap();
        let sheet = book.get_sheet(&0).unwrap();

        assert_eq!(sheet.get_cell("A1").unwrap().get_value(), "Monthly Sales");
        assert_eq!(sheet.get_cell("A3").unwrap().get_value(), "Acme");
        assert_eq!(sheet.get_cell("B3").unwrap().get_value(), "100");
        assert_eq!(sheet.get_cell("A4").unwrap().get_value(), "Globex");
        assert_eq!(sheet.get_cell("B4").unwrap().get_value(), "250");
        // The trailing footer shifted down below the expanded rows.
        assert_eq!(
            sheet.get_cell("A5").unwrap().get_value(),
            "Generated: 2026-08-29 10:00:00"
        );
    }

    #[tokio::test]
    async fn empty_result_blanks_the_repeating_row() {
        let dir = tempfile::tempdir().unwrap();
        let shell = dir.path().join("shell.xlsx");
        let out = dir.path().join("out.xlsx");
        write_shell(&shell);

        let empty = QueryOutput {
            columns: sample_output().columns,
            rows: Vec::new(),
        };
        merge_into_file(&shell, &out, &empty, &ctx()).await.unwrap();

        let book = umya_spreadsheet::reader::xlsx::read(&out).unwrap();
        let sheet = book.get_sheet(&0).unwrap();
        assert_eq!(sheet.get_cell("A1").unwrap().get_value(), "Monthly Sales");
        let a3 = sheet
            .get_cell("A3")
            .map(|c| c.get_value().to_string())
            .unwrap_or_default();
        assert_eq!(a3, "");
    }
}
