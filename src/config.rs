//! Generator configuration.
//!
//! Mirrors the knobs the report pipeline needs at runtime: where artifacts
//! land, the row cap that bounds a single generation, the page size used by
//! the streaming spreadsheet writer, and where bundled fallback fonts live.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Directory where generated artifacts (and the intermediate spreadsheets
    /// of PDF generation) are written.
    pub storage_root: PathBuf,

    /// Hard cap on result-set size; exceeding it fails the generation with a
    /// capacity error before any rendering starts.
    pub max_rows: usize,

    /// Rows per page for the streaming spreadsheet writer.
    pub page_size: usize,

    /// Directory searched for bundled fallback fonts during PDF conversion.
    pub font_dir: PathBuf,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("./upload/reports"),
            max_rows: 100_000,
            page_size: 5_000,
            font_dir: PathBuf::from("./fonts"),
        }
    }
}

impl GeneratorConfig {
    /// Loads configuration from a TOML file. Missing keys fall back to
    /// defaults via `#[serde(default)]`.
    pub fn from_path(path: impl AsRef<Path>) -> ReportResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&raw).map_err(|e| ReportError::internal(format!("invalid config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = GeneratorConfig::default();
        assert_eq!(cfg.max_rows, 100_000);
        assert_eq!(cfg.page_size, 5_000);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: GeneratorConfig =
            toml::from_str(r#"max_rows = 500"#).expect("should parse");
        assert_eq!(cfg.max_rows, 500);
        assert_eq!(cfg.page_size, 5_000);
        assert_eq!(cfg.storage_root, PathBuf::from("./upload/reports"));
    }
}
