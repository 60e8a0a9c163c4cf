// SPDX-License-Identifier: Apache-2.0

//! Font resolution for PDF output.
//!
//! Four-tier fallback chain, attempted once per output document and reused
//! across all of its sheets and cells:
//!   1. known system CJK font files across common OS families,
//!   2. packaged fallback fonts under the configured font directory,
//!   3. generic system font files (loadable, but CJK glyphs may be missing),
//!   4. the built-in Helvetica, which needs no embedding.
//! The first candidate that loads wins; later tiers are not attempted.
//! Embedded-font handles are tied to one output document, so the resolved
//! source must be registered into each document separately.

use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

use printpdf::{BuiltinFont, IndirectFontRef, PdfDocumentReference};

use crate::error::{ReportError, ReportResult};

/// Known CJK-capable font files, probed in order.
const SYSTEM_CJK_FONTS: &[&str] = &[
    // Linux
    "/usr/share/fonts/truetype/droid/DroidSansFallbackFull.ttf",
    "/usr/share/fonts/truetype/wqy/wqy-microhei.ttf",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.otf",
    // Windows
    "C:\\Windows\\Fonts\\simhei.ttf",
    "C:\\Windows\\Fonts\\msyh.ttf",
    "C:\\Windows\\Fonts\\simfang.ttf",
    // macOS
    "/System/Library/Fonts/PingFang.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
];

/// Generic fallback fonts with no CJK coverage.
const SYSTEM_GENERIC_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
    "/Library/Fonts/Arial.ttf",
];

/// Where the document font comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSource {
    File(PathBuf),
    Builtin,
}

/// Outcome of one resolution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontResolution {
    pub source: FontSource,
    /// Which tier produced the font, 1 through 4.
    pub tier: u8,
    /// False once the chain fell through to a non-CJK source.
    pub cjk_capable: bool,
}

impl FontResolution {
    /// Registers the resolved font into `doc`. Must be called once per
    /// output document; handles are not shareable across documents.
    pub fn register(&self, doc: &PdfDocumentReference) -> ReportResult<IndirectFontRef> {
        match &self.source {
            FontSource::File(path) => {
                let mut file = File::open(path).map_err(|e| {
                    ReportError::font_unavailable(format!(
                        "Failed to open font {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                doc.add_external_font(&mut file).map_err(|e| {
                    ReportError::font_unavailable(format!(
                        "Failed to embed font {}: {}",
                        path.display(),
                        e
                    ))
                })
            }
            FontSource::Builtin => doc
                .add_builtin_font(BuiltinFont::Helvetica)
                .map_err(|e| ReportError::font_unavailable(e.to_string())),
        }
    }
}

/// Runs the fallback chain. Never fails: tier 4 always resolves.
pub fn resolve_font(font_dir: &Path) -> FontResolution {
    // Tier 1: system CJK fonts.
    for candidate in SYSTEM_CJK_FONTS {
        let path = Path::new(candidate);
        if loads(path) {
            tracing::debug!(font = %path.display(), "Resolved tier-1 CJK font");
            return FontResolution {
                source: FontSource::File(path.to_path_buf()),
                tier: 1,
                cjk_capable: true,
            };
        }
    }

    // Tier 2: packaged fallback fonts.
    if let Some(path) = bundled_font(font_dir) {
        tracing::debug!(font = %path.display(), "Resolved tier-2 bundled font");
        return FontResolution {
            source: FontSource::File(path),
            tier: 2,
            cjk_capable: true,
        };
    }

    // Tier 3: generic system fonts.
    for candidate in SYSTEM_GENERIC_FONTS {
        let path = Path::new(candidate);
        if loads(path) {
            tracing::warn!(
                font = %path.display(),
                "Falling back to a non-CJK system font; CJK glyphs may not render"
            );
            return FontResolution {
                source: FontSource::File(path.to_path_buf()),
                tier: 3,
                cjk_capable: false,
            };
        }
    }

    // Tier 4: built-in default.
    tracing::warn!("No usable font file found; using built-in Helvetica, CJK glyphs may not render");
    FontResolution {
        source: FontSource::Builtin,
        tier: 4,
        cjk_capable: false,
    }
}

/// First loadable .ttf/.otf in the font directory, by file name.
fn bundled_font(font_dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(font_dir).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("ttf") | Some("otf") | Some("TTF") | Some("OTF")
            )
        })
        .collect();
    candidates.sort();
    candidates.into_iter().find(|path| loads(path))
}

/// A candidate "loads" when it exists and carries a TTF/OTF header.
/// TTC collections are skipped; there is no face-index selection here.
fn loads(path: &Path) -> bool {
    let Ok(bytes) = fs::read(path) else {
        return false;
    };
    if bytes.len() < 4 {
        return false;
    }
    match &bytes[..4] {
        [0x00, 0x01, 0x00, 0x00] => true, // TrueType
        b"OTTO" => true,                  // CFF OpenType
        b"true" => true,                  // legacy Apple TrueType
        b"ttcf" => false,                 // collection, no index selection
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_always_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let resolution = resolve_font(dir.path());
        assert!((1..=4).contains(&resolution.tier));
    }

    #[test]
    fn bundled_font_requires_a_real_header() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fake.ttf"), b"not a font").unwrap();
        assert!(bundled_font(dir.path()).is_none());
    }

    #[test]
    fn bundled_ttf_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = vec![0x00, 0x01, 0x00, 0x00];
        bytes.extend_from_slice(&[0u8; 16]);
        std::fs::write(dir.path().join("cjk.ttf"), &bytes).unwrap();
        let found = bundled_font(dir.path()).unwrap();
        assert!(found.ends_with("cjk.ttf"));
    }

    #[test]
    fn ttc_collections_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = b"ttcf".to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        std::fs::write(dir.path().join("collection.ttf"), &bytes).unwrap();
        assert!(bundled_font(dir.path()).is_none());
    }
}
