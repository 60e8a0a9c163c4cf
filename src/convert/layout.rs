// SPDX-License-Identifier: Apache-2.0

//! Sheet layout pass.
//!
//! Walks a workbook sheet by sheet and turns every source cell into at most
//! one `LaidCell`. Merged regions are resolved up front into an occupancy
//! map: the region's top-left coordinate becomes the single anchor carrying
//! the full row/column span, and every other coordinate inside the region is
//! marked covered and skipped during the emission pass. The painter never
//! has to reason about merges.

use std::collections::HashMap;

use umya_spreadsheet::{Border, Cell, Spreadsheet, Worksheet};

use crate::template::resolver::parse_cell_ref;

const DEFAULT_COL_WIDTH_CHARS: f64 = 8.43;
const DEFAULT_ROW_HEIGHT_PT: f64 = 18.0;
/// Excel column width is in character units; ~7 pt per unit matches the
/// rendering of the default font.
const CHAR_UNIT_PT: f64 = 7.0;

pub const LIGHT_GRAY: [f32; 3] = [0.83, 0.83, 0.83];
pub const BLACK: [f32; 3] = [0.0, 0.0, 0.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinePattern {
    Solid,
    Dashed,
    Dotted,
}

/// One border edge of a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub width_pt: f32,
    pub color: [f32; 3],
    pub pattern: LinePattern,
}

impl Edge {
    /// Thin light-gray edge used when the source carries no border style.
    pub fn default_grid() -> Self {
        Self {
            width_pt: 0.5,
            color: LIGHT_GRAY,
            pattern: LinePattern::Solid,
        }
    }

    pub fn none() -> Self {
        Self {
            width_pt: 0.0,
            color: BLACK,
            pattern: LinePattern::Solid,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellStyle {
    pub align: HAlign,
    pub top: Edge,
    pub bottom: Edge,
    pub left: Edge,
    pub right: Edge,
    pub fill: Option<[f32; 3]>,
}

impl Default for CellStyle {
    fn default() -> Self {
        Self {
            align: HAlign::Left,
            top: Edge::default_grid(),
            bottom: Edge::default_grid(),
            left: Edge::default_grid(),
            right: Edge::default_grid(),
            fill: None,
        }
    }
}

/// One emitted cell: the anchor coordinate plus its span.
#[derive(Debug, Clone)]
pub struct LaidCell {
    /// 1-based source row of the anchor.
    pub row: u32,
    /// 1-based source column of the anchor.
    pub col: u32,
    pub row_span: u32,
    pub col_span: u32,
    pub text: String,
    pub style: CellStyle,
}

/// A fully laid-out sheet, ready to paint.
#[derive(Debug, Clone)]
pub struct LaidSheet {
    pub name: String,
    pub rows: u32,
    pub cols: u32,
    /// Column widths in points, index 0 = column A.
    pub col_widths: Vec<f64>,
    /// Row heights in points, index 0 = row 1.
    pub row_heights: Vec<f64>,
    pub cells: Vec<LaidCell>,
}

impl LaidSheet {
    pub fn total_width_pt(&self) -> f64 {
        self.col_widths.iter().sum()
    }
}

#[derive(Clone, Copy)]
enum Occupancy {
    Anchor { row_span: u32, col_span: u32 },
    Covered,
}

/// Lays out every sheet of the workbook, in sheet order.
pub fn layout_workbook(book: &Spreadsheet) -> Vec<LaidSheet> {
    book.get_sheet_collection()
        .iter()
        .map(layout_sheet)
        .collect()
}

pub fn layout_sheet(sheet: &Worksheet) -> LaidSheet {
    let (max_col, max_row) = sheet.get_highest_column_and_row();
    let name = sheet.get_name().to_string();

    if max_col == 0 || max_row == 0 {
        return LaidSheet {
            name,
            rows: 0,
            cols: 0,
            col_widths: Vec::new(),
            row_heights: Vec::new(),
            cells: Vec::new(),
        };
    }

    let occupancy = build_occupancy(sheet);

    let col_widths: Vec<f64> = (1..=max_col)
        .map(|col| {
            let chars = sheet
                .get_column_dimension_by_number(&col)
                .map(|dim| *dim.get_width())
                .filter(|w| *w > 0.0)
                .unwrap_or(DEFAULT_COL_WIDTH_CHARS);
            chars * CHAR_UNIT_PT
        })
        .collect();

    let row_heights: Vec<f64> = (1..=max_row)
        .map(|row| {
            sheet
                .get_row_dimension(&row)
                .map(|dim| *dim.get_height())
                .filter(|h| *h > 0.0)
                .unwrap_or(DEFAULT_ROW_HEIGHT_PT)
        })
        .collect();

    let mut cells = Vec::new();
    for row in 1..=max_row {
        for col in 1..=max_col {
            let (row_span, col_span) = match occupancy.get(&(row, col)) {
                Some(Occupancy::Covered) => continue,
                Some(Occupancy::Anchor { row_span, col_span }) => (*row_span, *col_span),
                None => (1, 1),
            };
            let (text, style) = match sheet.get_cell((col, row)) {
                Some(cell) => (cell_text(cell), cell_style(cell)),
                None => (String::new(), CellStyle::default()),
            };
            cells.push(LaidCell {
                row,
                col,
                row_span,
                col_span,
                text,
                style,
            });
        }
    }

    LaidSheet {
        name,
        rows: max_row,
        cols: max_col,
        col_widths,
        row_heights,
        cells,
    }
}

/// Merged-region occupancy, populated once per sheet before emission.
fn build_occupancy(sheet: &Worksheet) -> HashMap<(u32, u32), Occupancy> {
    let mut occupancy = HashMap::new();
    for range in sheet.get_merge_cells() {
        let spec = range.get_range();
        let Some(((start_col, start_row), (end_col, end_row))) = parse_range(&spec) else {
            continue;
        };
        occupancy.insert(
            (start_row, start_col),
            Occupancy::Anchor {
                row_span: end_row - start_row + 1,
                col_span: end_col - start_col + 1,
            },
        );
        for row in start_row..=end_row {
            for col in start_col..=end_col {
                if (row, col) != (start_row, start_col) {
                    occupancy.insert((row, col), Occupancy::Covered);
                }
            }
        }
    }
    occupancy
}

/// Parses "A1:B2" into 1-based ((col, row), (col, row)) corners.
fn parse_range(spec: &str) -> Option<((u32, u32), (u32, u32))> {
    let (start, end) = spec.split_once(':')?;
    let (start_col, start_row) = parse_cell_ref(start)?;
    let (end_col, end_row) = parse_cell_ref(end)?;
    Some(((start_col + 1, start_row), (end_col + 1, end_row)))
}

/// Display text for a cell. Formula cells carry their cached result;
/// numeric values print as integers when they have no fraction.
fn cell_text(cell: &Cell) -> String {
    let value = cell.get_value().to_string();
    if value.is_empty() {
        return value;
    }
    if let Ok(num) = value.parse::<f64>() {
        if num.fract() == 0.0 && num.is_finite() && num.abs() < 1e15 {
            return format!("{}", num as i64);
        }
        return format!("{}", num);
    }
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
        return value.to_lowercase();
    }
    value
}

fn cell_style(cell: &Cell) -> CellStyle {
    let style = cell.get_style();
    let mut out = CellStyle::default();

    if let Some(alignment) = style.get_alignment() {
        use umya_spreadsheet::HorizontalAlignmentValues as H;
        out.align = match alignment.get_horizontal() {
            H::Center | H::CenterContinuous => HAlign::Center,
            H::Right => HAlign::Right,
            _ => HAlign::Left,
        };
    }

    if let Some(borders) = style.get_borders() {
        out.top = map_edge(borders.get_top());
        out.bottom = map_edge(borders.get_bottom());
        out.left = map_edge(borders.get_left());
        out.right = map_edge(borders.get_right());
    }

    if let Some(color) = style.get_background_color() {
        out.fill = parse_argb(color.get_argb());
    }

    out
}

/// Maps a source border onto a PDF edge. Unstyled sides fall back to the
/// thin light-gray grid edge; styled sides default to black unless the
/// source names a color.
fn map_edge(border: &Border) -> Edge {
    let style = border.get_border_style();
    let (width_pt, pattern) = match style {
        Border::BORDER_NONE => return Edge::none(),
        Border::BORDER_THIN => (0.5, LinePattern::Solid),
        Border::BORDER_MEDIUM => (1.0, LinePattern::Solid),
        Border::BORDER_THICK => (1.5, LinePattern::Solid),
        Border::BORDER_HAIR => (0.25, LinePattern::Solid),
        Border::BORDER_DOUBLE => (1.0, LinePattern::Solid),
        Border::BORDER_DASHED => (0.75, LinePattern::Dashed),
        Border::BORDER_MEDIUMDASHED => (1.0, LinePattern::Dashed),
        Border::BORDER_DOTTED => (0.75, LinePattern::Dotted),
        "" => return Edge::default_grid(),
        _ => (0.5, LinePattern::Solid),
    };
    let color = parse_argb(border.get_color().get_argb()).unwrap_or(BLACK);
    Edge {
        width_pt,
        color,
        pattern,
    }
}

/// "FFRRGGBB" (or "RRGGBB") to normalized RGB.
fn parse_argb(argb: &str) -> Option<[f32; 3]> {
    let hex = match argb.len() {
        8 => &argb[2..],
        6 => argb,
        _ => return None,
    };
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet_3x2() -> Spreadsheet {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_mut(&0).unwrap();
        sheet.get_cell_mut("A1").set_value("Name");
        sheet.get_cell_mut("B1").set_value("Amount");
        sheet.get_cell_mut("A2").set_value("Acme");
        sheet.get_cell_mut("B2").set_value_number(100);
        sheet.get_cell_mut("A3").set_value("Globex");
        sheet.get_cell_mut("B3").set_value_number(250.5);
        book
    }

    #[test]
    fn plain_sheet_emits_every_cell_once() {
        let book = sheet_3x2();
        let laid = layout_sheet(book.get_sheet(&0).unwrap());
        assert_eq!(laid.rows, 3);
        assert_eq!(laid.cols, 2);
        assert_eq!(laid.cells.len(), 6);
        assert!(laid.cells.iter().all(|c| c.row_span == 1 && c.col_span == 1));
    }

    #[test]
    fn numbers_format_integer_vs_decimal() {
        let book = sheet_3x2();
        let laid = layout_sheet(book.get_sheet(&0).unwrap());
        let text_at = |row: u32, col: u32| {
            laid.cells
                .iter()
                .find(|c| c.row == row && c.col == col)
                .map(|c| c.text.clone())
                .unwrap()
        };
        assert_eq!(text_at(2, 2), "100");
        assert_eq!(text_at(3, 2), "250.5");
    }

    #[test]
    fn merged_region_emits_one_anchor() {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_mut(&0).unwrap();
        sheet.get_cell_mut("A1").set_value("标题");
        sheet.get_cell_mut("C3").set_value("corner");
        sheet.add_merge_cells("A1:B2");

        let laid = layout_sheet(book.get_sheet(&0).unwrap());

        let anchors: Vec<&LaidCell> = laid
            .cells
            .iter()
            .filter(|c| c.text == "标题")
            .collect();
        assert_eq!(anchors.len(), 1, "merged text must appear exactly once");
        let anchor = anchors[0];
        assert_eq!((anchor.row, anchor.col), (1, 1));
        assert_eq!((anchor.row_span, anchor.col_span), (2, 2));

        // Covered coordinates are not emitted.
        assert!(!laid
            .cells
            .iter()
            .any(|c| (c.row, c.col) == (1, 2) || (c.row, c.col) == (2, 1) || (c.row, c.col) == (2, 2)));

        // Text outside the region is untouched.
        assert!(laid.cells.iter().any(|c| c.text == "corner"));
    }

    #[test]
    fn argb_parses_with_and_without_alpha() {
        assert_eq!(parse_argb("FF000000"), Some([0.0, 0.0, 0.0]));
        assert_eq!(parse_argb("FFFFFF"), Some([1.0, 1.0, 1.0]));
        assert_eq!(parse_argb(""), None);
    }

    #[test]
    fn default_style_is_thin_light_gray() {
        let style = CellStyle::default();
        assert_eq!(style.top, Edge::default_grid());
        assert_eq!(style.top.color, LIGHT_GRAY);
        assert_eq!(style.align, HAlign::Left);
        assert!(style.fill.is_none());
    }
}
