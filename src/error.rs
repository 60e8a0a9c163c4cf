// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the report generation core.
//!
//! Every failure surfaced by the crate maps to one of these variants so that
//! callers (and the generation record lifecycle) can classify outcomes:
//! configuration errors, connectivity errors, capacity errors, and rendering
//! errors are distinct from one another.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the report generation pipeline.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ReportError {
    // -- configuration errors: fatal, never retried --
    #[error("Unsupported datasource vendor: {vendor}")]
    UnsupportedVendor { vendor: String },

    #[error("Datasource not found: {id}")]
    DatasourceNotFound { id: String },

    #[error("Template not found: {id}")]
    TemplateNotFound { id: String },

    #[error("Generation record not found: {id}")]
    RecordNotFound { id: String },

    #[error("Template file not found: {path}")]
    TemplateFileNotFound { path: String },

    // -- connectivity errors: surfaced with the underlying message --
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Query execution failed: {message}")]
    QueryFailed { message: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // -- capacity errors --
    #[error("Row count {actual} exceeds the configured maximum of {limit}")]
    RowLimitExceeded { actual: usize, limit: usize },

    // -- rendering errors: "query worked, rendering didn't" --
    #[error("Rendering failed: {message}")]
    RenderFailed { message: String },

    #[error("PDF conversion failed: {message}")]
    PdfConvertFailed { message: String },

    #[error("Font initialization failed: {message}")]
    FontUnavailable { message: String },

    // -- artifact access --
    #[error("Artifact unavailable: {message}")]
    ArtifactUnavailable { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ReportError {
    pub fn unsupported_vendor(vendor: impl Into<String>) -> Self {
        Self::UnsupportedVendor { vendor: vendor.into() }
    }

    pub fn datasource_not_found(id: impl ToString) -> Self {
        Self::DatasourceNotFound { id: id.to_string() }
    }

    pub fn template_not_found(id: impl ToString) -> Self {
        Self::TemplateNotFound { id: id.to_string() }
    }

    pub fn record_not_found(id: impl ToString) -> Self {
        Self::RecordNotFound { id: id.to_string() }
    }

    pub fn template_file_not_found(path: impl Into<String>) -> Self {
        Self::TemplateFileNotFound { path: path.into() }
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: msg.into() }
    }

    pub fn query_failed(msg: impl Into<String>) -> Self {
        Self::QueryFailed { message: msg.into() }
    }

    pub fn render_failed(msg: impl Into<String>) -> Self {
        Self::RenderFailed { message: msg.into() }
    }

    pub fn pdf_convert_failed(msg: impl Into<String>) -> Self {
        Self::PdfConvertFailed { message: msg.into() }
    }

    pub fn font_unavailable(msg: impl Into<String>) -> Self {
        Self::FontUnavailable { message: msg.into() }
    }

    pub fn artifact_unavailable(msg: impl Into<String>) -> Self {
        Self::ArtifactUnavailable { message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }

    /// True for the configuration class of failures: retrying without a
    /// config change cannot succeed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedVendor { .. }
                | Self::DatasourceNotFound { .. }
                | Self::TemplateNotFound { .. }
                | Self::TemplateFileNotFound { .. }
        )
    }

    /// True for the rendering class: the query succeeded but the document
    /// could not be produced.
    pub fn is_rendering(&self) -> bool {
        matches!(
            self,
            Self::RenderFailed { .. }
                | Self::PdfConvertFailed { .. }
                | Self::FontUnavailable { .. }
        )
    }
}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io { message: err.to_string() }
    }
}

/// Result type alias for report generation operations.
pub type ReportResult<T> = Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(ReportError::unsupported_vendor("http_api").is_configuration());
        assert!(ReportError::template_file_not_found("x.xlsx").is_configuration());
        assert!(!ReportError::query_failed("boom").is_configuration());

        assert!(ReportError::pdf_convert_failed("bad sheet").is_rendering());
        assert!(!ReportError::RowLimitExceeded { actual: 10, limit: 5 }.is_rendering());
    }

    #[test]
    fn capacity_error_reports_both_numbers() {
        let err = ReportError::RowLimitExceeded { actual: 150_000, limit: 100_000 };
        let msg = err.to_string();
        assert!(msg.contains("150000"));
        assert!(msg.contains("100000"));
    }
}
