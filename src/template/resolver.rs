// SPDX-License-Identifier: Apache-2.0

//! Design-layout field resolution.
//!
//! A design layout maps cell positions (A1 form) to text, where the text may
//! carry `${field}` placeholders. The resolver turns that grid into an
//! ordered (column key, display label) projection: the placeholder names the
//! source column, the header cell in row 1 of the same spreadsheet column
//! supplies the label, and the list is ordered left to right. A layout with
//! no placeholders resolves to nothing, which tells the document writer to
//! fall back to "all columns of the first data row".

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::template::TemplateDescriptor;

/// One projected output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedField {
    /// Source column key, i.e. the placeholder identifier.
    pub key: String,
    /// Display label for the header row.
    pub label: String,
    /// 0-based spreadsheet column the placeholder sat in.
    pub column: u32,
}

/// Ordered list of projected fields, left to right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProjection {
    pub fields: Vec<ProjectedField>,
}

impl FieldProjection {
    pub fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.key.as_str()).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.label.as_str()).collect()
    }
}

/// Parses an A1-style cell reference into (0-based column, 1-based row).
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let letters: String = cell_ref
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    let digits = &cell_ref[letters.len()..];
    if letters.is_empty() || digits.is_empty() {
        return None;
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((column_index(&letters)?, row))
}

/// `"A"` → 0, `"Z"` → 25, `"AA"` → 26.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut index: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        index = index * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    Some(index - 1)
}

/// Inverse of [`column_index`]: 0 → `"A"`, 26 → `"AA"`.
pub fn column_letter(mut index: u32) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn placeholder_pattern() -> Regex {
    Regex::new(r"\$\{(\w+)\}").expect("valid placeholder pattern")
}

/// Resolves a template's design layout into a field projection, or `None`
/// when the template has no layout or the layout holds no placeholders.
pub fn resolve(descriptor: &TemplateDescriptor) -> Option<FieldProjection> {
    let layout = descriptor.design_layout.as_ref()?;
    resolve_layout(layout)
}

pub fn resolve_layout(layout: &HashMap<String, String>) -> Option<FieldProjection> {
    let pattern = placeholder_pattern();
    let mut fields: Vec<(u32, ProjectedField)> = Vec::new();

    for (cell_ref, text) in layout {
        let Some((column, row)) = parse_cell_ref(cell_ref) else {
            continue;
        };
        for caps in pattern.captures_iter(text) {
            let key = caps[1].to_string();
            let label = header_label(layout, column, &pattern).unwrap_or_else(|| key.clone());
            fields.push((row, ProjectedField { key, label, column }));
        }
    }

    if fields.is_empty() {
        return None;
    }
    // Map iteration order is arbitrary; (column, row) makes the projection
    // deterministic even when one column holds several placeholder cells.
    fields.sort_by_key(|(row, field)| (field.column, *row));
    Some(FieldProjection {
        fields: fields.into_iter().map(|(_, field)| field).collect(),
    })
}

/// The row-1 cell of the same column supplies the label, unless its own
/// value is a placeholder.
fn header_label(
    layout: &HashMap<String, String>,
    column: u32,
    pattern: &Regex,
) -> Option<String> {
    let header_ref = format!("{}1", column_letter(column));
    let value = layout.get(&header_ref)?;
    if pattern.is_match(value) {
        return None;
    }
    Some(value.clone())
}
