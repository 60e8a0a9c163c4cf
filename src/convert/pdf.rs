// SPDX-License-Identifier: Apache-2.0

//! PDF painting pass.
//!
//! Consumes laid-out sheets and paints landscape A4 pages: one page area per
//! sheet, with additional pages when a sheet's rows overflow vertically.
//! Column widths are scaled down uniformly when their sum exceeds the
//! printable width. Fills are painted first, then borders, then text, so
//! backgrounds never cover glyphs.

use std::path::Path;

use printpdf::path::PaintMode;
use printpdf::{
    Color, Line, LineDashPattern, Mm, PdfDocument, PdfLayerReference, Point, Rect, Rgb,
};
use serde::{Deserialize, Serialize};

use crate::convert::font::{resolve_font, FontResolution};
use crate::convert::layout::{Edge, HAlign, LaidSheet, LinePattern};
use crate::error::{ReportError, ReportResult};

// A4 landscape, in points.
const PAGE_W_PT: f64 = 841.89;
const PAGE_H_PT: f64 = 595.28;
const MARGIN_PT: f64 = 20.0;
const FONT_SIZE: f32 = 9.0;
const TEXT_PADDING_PT: f64 = 2.0;

/// Layout-level totals of one conversion, for callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfSummary {
    pub sheets: usize,
    pub pages: usize,
}

// `Mm` carries f32; the layout math stays in f64 until this boundary.
fn pt_to_mm(pt: f64) -> f32 {
    (pt * 25.4 / 72.0) as f32
}

/// Approximate advance width of `text` at `size`. CJK glyphs are treated as
/// full-width, everything else as a narrow latin glyph.
fn text_width_pt(text: &str, size: f32) -> f64 {
    text.chars()
        .map(|c| {
            if c.is_ascii() {
                size as f64 * 0.55
            } else {
                size as f64
            }
        })
        .sum()
}

/// Paints `sheets` into a new PDF document and returns its bytes plus the
/// page summary. The font chain runs once per call; the handle it produces
/// belongs to this document only.
pub fn paint_workbook(
    sheets: &[LaidSheet],
    font_dir: &Path,
    title: &str,
) -> ReportResult<(Vec<u8>, PdfSummary)> {
    let resolution: FontResolution = resolve_font(font_dir);
    tracing::debug!(tier = resolution.tier, "Resolved document font");

    let (doc, page1, layer1) =
        PdfDocument::new(title, Mm(pt_to_mm(PAGE_W_PT)), Mm(pt_to_mm(PAGE_H_PT)), "Layer 1");
    let font = resolution.register(&doc)?;

    let mut layers: Vec<PdfLayerReference> = vec![doc.get_page(page1).get_layer(layer1)];

    let printable_w = PAGE_W_PT - 2.0 * MARGIN_PT;
    let printable_h = PAGE_H_PT - 2.0 * MARGIN_PT;

    for (sheet_idx, sheet) in sheets.iter().enumerate() {
        if sheet_idx > 0 {
            let (page, layer) = doc.add_page(
                Mm(pt_to_mm(PAGE_W_PT)),
                Mm(pt_to_mm(PAGE_H_PT)),
                "Layer 1",
            );
            layers.push(doc.get_page(page).get_layer(layer));
        }
        if sheet.rows == 0 {
            continue;
        }

        // Uniform downscale when source widths exceed the printable width.
        let total_w = sheet.total_width_pt();
        let scale = if total_w > printable_w {
            printable_w / total_w
        } else {
            1.0
        };
        let col_widths: Vec<f64> = sheet.col_widths.iter().map(|w| w * scale).collect();
        let mut col_x = Vec::with_capacity(col_widths.len() + 1);
        let mut x = MARGIN_PT;
        for w in &col_widths {
            col_x.push(x);
            x += w;
        }
        col_x.push(x);

        // Assign rows to pages, breaking on vertical overflow.
        let mut row_page: Vec<usize> = Vec::with_capacity(sheet.rows as usize);
        let mut row_top: Vec<f64> = Vec::with_capacity(sheet.rows as usize);
        let mut used = 0.0;
        for r in 0..sheet.rows as usize {
            let h = sheet.row_heights[r].min(printable_h);
            if used > 0.0 && used + h > printable_h {
                let (page, layer) = doc.add_page(
                    Mm(pt_to_mm(PAGE_W_PT)),
                    Mm(pt_to_mm(PAGE_H_PT)),
                    "Layer 1",
                );
                layers.push(doc.get_page(page).get_layer(layer));
                used = 0.0;
            }
            row_page.push(layers.len() - 1);
            row_top.push(PAGE_H_PT - MARGIN_PT - used);
            used += h;
        }

        for cell in &sheet.cells {
            let r = (cell.row - 1) as usize;
            let c = (cell.col - 1) as usize;
            let layer = &layers[row_page[r]];

            let x0 = col_x[c];
            let end_col = (c + cell.col_span as usize).min(col_widths.len());
            let x1 = col_x[end_col];

            let y_top = row_top[r];
            let end_row = (r + cell.row_span as usize).min(sheet.rows as usize);
            let mut height: f64 = sheet.row_heights[r..end_row].iter().sum();
            // A span never runs past its anchor's page.
            height = height.min(y_top - MARGIN_PT);
            let y_bottom = y_top - height;

            if let Some(fill) = cell.style.fill {
                layer.set_fill_color(rgb(fill));
                let rect = Rect::new(
                    Mm(pt_to_mm(x0)),
                    Mm(pt_to_mm(y_bottom)),
                    Mm(pt_to_mm(x1)),
                    Mm(pt_to_mm(y_top)),
                )
                .with_mode(PaintMode::Fill);
                layer.add_rect(rect);
            }

            draw_edge(layer, &cell.style.top, (x0, y_top), (x1, y_top));
            draw_edge(layer, &cell.style.bottom, (x0, y_bottom), (x1, y_bottom));
            draw_edge(layer, &cell.style.left, (x0, y_top), (x0, y_bottom));
            draw_edge(layer, &cell.style.right, (x1, y_top), (x1, y_bottom));

            if !cell.text.is_empty() {
                let width = x1 - x0;
                let text_w = text_width_pt(&cell.text, FONT_SIZE).min(width);
                let tx = match cell.style.align {
                    HAlign::Left => x0 + TEXT_PADDING_PT,
                    HAlign::Center => x0 + (width - text_w) / 2.0,
                    HAlign::Right => x0 + width - text_w - TEXT_PADDING_PT,
                };
                let ty = y_top - height / 2.0 - FONT_SIZE as f64 * 0.35;
                layer.set_fill_color(rgb([0.0, 0.0, 0.0]));
                layer.use_text(
                    cell.text.clone(),
                    FONT_SIZE,
                    Mm(pt_to_mm(tx)),
                    Mm(pt_to_mm(ty)),
                    &font,
                );
            }
        }
    }

    let summary = PdfSummary {
        sheets: sheets.len(),
        pages: layers.len(),
    };

    let bytes = doc
        .save_to_bytes()
        .map_err(|e| ReportError::pdf_convert_failed(format!("Failed to serialize PDF: {}", e)))?;
    Ok((bytes, summary))
}

fn rgb(color: [f32; 3]) -> Color {
    Color::Rgb(Rgb::new(color[0], color[1], color[2], None))
}

fn draw_edge(layer: &PdfLayerReference, edge: &Edge, from: (f64, f64), to: (f64, f64)) {
    if edge.width_pt <= 0.0 {
        return;
    }
    layer.set_outline_color(rgb(edge.color));
    layer.set_outline_thickness(edge.width_pt);
    let dash = match edge.pattern {
        LinePattern::Solid => LineDashPattern::default(),
        LinePattern::Dashed => LineDashPattern {
            dash_1: Some(3),
            gap_1: Some(2),
            ..Default::default()
        },
        LinePattern::Dotted => LineDashPattern {
            dash_1: Some(1),
            gap_1: Some(1),
            ..Default::default()
        },
    };
    layer.set_line_dash_pattern(dash);
    let line = Line {
        points: vec![
            (Point::new(Mm(pt_to_mm(from.0)), Mm(pt_to_mm(from.1))), false),
            (Point::new(Mm(pt_to_mm(to.0)), Mm(pt_to_mm(to.1))), false),
        ],
        is_closed: false,
    };
    layer.add_line(line);
    layer.set_line_dash_pattern(LineDashPattern::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cjk_text_is_measured_full_width() {
        let ascii = text_width_pt("abcd", 10.0);
        let cjk = text_width_pt("月度报表", 10.0);
        assert!((ascii - 22.0).abs() < 1e-6);
        assert!((cjk - 40.0).abs() < 1e-6);
    }

    #[test]
    fn point_conversion() {
        assert!((pt_to_mm(72.0) - 25.4).abs() < 1e-4);
    }
}
