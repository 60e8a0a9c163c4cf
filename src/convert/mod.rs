// SPDX-License-Identifier: Apache-2.0

//! Spreadsheet to PDF conversion.
//!
//! Two passes: `layout` flattens each sheet (merged regions, widths,
//! styles) into laid cells, and `pdf` paints pages from them. `font` holds
//! the per-document font fallback chain.

pub mod font;
pub mod layout;
pub mod pdf;

use std::path::Path;

pub use font::{resolve_font, FontResolution, FontSource};
pub use layout::{layout_sheet, layout_workbook, CellStyle, HAlign, LaidCell, LaidSheet};
pub use pdf::{paint_workbook, PdfSummary};

use crate::error::{ReportError, ReportResult};

/// Converts the spreadsheet at `xlsx_path` into a PDF at `pdf_path`.
pub async fn convert_file(
    xlsx_path: &Path,
    pdf_path: &Path,
    font_dir: &Path,
) -> ReportResult<PdfSummary> {
    let book = umya_spreadsheet::reader::xlsx::read(xlsx_path).map_err(|e| {
        ReportError::pdf_convert_failed(format!(
            "Failed to read spreadsheet {}: {}",
            xlsx_path.display(),
            e
        ))
    })?;

    let title = xlsx_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("report");

    let sheets = layout_workbook(&book);
    let (bytes, summary) = paint_workbook(&sheets, font_dir, title)?;

    tokio::fs::write(pdf_path, &bytes).await.map_err(|e| {
        ReportError::pdf_convert_failed(format!("Failed to write PDF: {}", e))
    })?;

    tracing::info!(
        sheets = summary.sheets,
        pages = summary.pages,
        pdf = %pdf_path.display(),
        "Converted spreadsheet to PDF"
    );
    Ok(summary)
}

/// Converts and applies the intermediate-file policy: the spreadsheet is
/// deleted on success and deliberately retained on conversion failure so
/// operators can inspect what the renderer was given.
pub async fn convert_with_cleanup(
    intermediate: &Path,
    pdf_path: &Path,
    font_dir: &Path,
) -> ReportResult<PdfSummary> {
    match convert_file(intermediate, pdf_path, font_dir).await {
        Ok(summary) => {
            if let Err(e) = tokio::fs::remove_file(intermediate).await {
                tracing::warn!(
                    file = %intermediate.display(),
                    error = %e,
                    "Failed to remove intermediate spreadsheet"
                );
            }
            Ok(summary)
        }
        Err(err) => {
            tracing::warn!(
                file = %intermediate.display(),
                error = %err,
                "Conversion failed; intermediate spreadsheet retained"
            );
            Err(err)
        }
    }
}
