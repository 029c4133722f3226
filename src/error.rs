//! Error types for the edgequake-studykit library.
//!
//! Three layers of failure, each with its own type:
//!
//! * [`StudyKitError`] — **Fatal**: a request cannot even be assembled
//!   (missing file, mixed sources, bad configuration, provider not
//!   configured) or a concrete adapter hit an unrecoverable input problem.
//!   Returned as `Err(StudyKitError)` from constructors and adapters.
//!
//! * [`ExtractorError`] / [`CompletionError`] — what the two capability
//!   ports report back to the workflow. They are `Clone` so the workflow can
//!   concatenate and echo them into the outcome message.
//!
//! * [`StageFailure`] — **Terminal, non-fatal**: the typed reason stored in a
//!   [`crate::output::WorkflowOutcome`] when the workflow stops early. The
//!   workflow itself never returns `Err`.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-studykit library.
#[derive(Debug, Error)]
pub enum StudyKitError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file has a `.pdf` name or was passed as a document but is not one.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Extension is neither PDF nor one of the supported image formats.
    #[error("Unsupported file type '{path}'\nSupported: .pdf, .jpg, .jpeg, .png, .bmp, .tiff")]
    UnsupportedFile { path: PathBuf },

    /// The file exists but has no content.
    #[error("File is empty: '{path}'")]
    EmptyFile { path: PathBuf },

    /// The file exceeds the per-kind size cap.
    #[error("File '{path}' is too large: {size_mb:.1} MB (limit {limit_mb} MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: f64,
        limit_mb: u64,
    },

    /// A request mixed a PDF with images, or passed several PDFs.
    #[error("Cannot mix source kinds in one request: {detail}")]
    MixedSources { detail: String },

    /// No input files were given.
    #[error("No source files provided")]
    NoSources,

    /// Standard, subject or chapter is missing or malformed.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Place libpdfium next to the binary, install it system-wide, or\n\
set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Image errors ──────────────────────────────────────────────────────
    /// The image decoder rejected the file.
    #[error("Could not decode image '{path}': {detail}")]
    ImageDecodeFailed { path: PathBuf, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The batch manifest could not be read or parsed.
    #[error("Invalid batch manifest '{path}': {detail}")]
    InvalidManifest { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure reported by an [`crate::ports::ExtractorPort`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExtractorError {
    /// The backend ran but could not produce text.
    #[error("{0}")]
    Failed(String),

    /// The backend succeeded but returned no text at all.
    #[error("extractor returned no text")]
    Empty,

    /// This extractor cannot handle the given kind of material.
    #[error("unsupported material: {0}")]
    Unsupported(String),

    /// The call did not finish within the configured budget.
    #[error("extraction timed out after {ms}ms")]
    Timeout { ms: u64 },
}

impl From<StudyKitError> for ExtractorError {
    fn from(e: StudyKitError) -> Self {
        ExtractorError::Failed(e.to_string())
    }
}

/// Failure reported by a [`crate::ports::CompletionPort`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompletionError {
    /// The provider answered with an error (auth, quota, content filter, 5xx).
    #[error("provider error: {0}")]
    Provider(String),

    /// The call did not finish within the configured budget.
    #[error("completion timed out after {ms}ms")]
    Timeout { ms: u64 },
}

/// Why a workflow run ended without content.
///
/// Stored in [`crate::output::WorkflowOutcome::failure`]. The `Display`
/// string becomes the outcome `message`, so each kind reads differently.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageFailure {
    /// Both extractors failed, or the single vision path failed.
    #[error("Content extraction failed: {reason}")]
    Extraction { reason: String },

    /// The verdict was not all-positive, or the validation call failed.
    #[error("Content validation failed: {reason}")]
    Validation { reason: String },

    /// The generation call failed or returned nothing.
    #[error("Content generation failed: {reason}")]
    Generation { reason: String },

    /// The generated text had no recognisable study-notes section.
    #[error("Could not parse generated content: {reason}")]
    Parsing { reason: String },

    /// The caller cancelled the request.
    #[error("Processing cancelled during {stage}")]
    Cancelled { stage: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_too_large_display() {
        let e = StudyKitError::FileTooLarge {
            path: PathBuf::from("big.pdf"),
            size_mb: 120.25,
            limit_mb: 100,
        };
        let msg = e.to_string();
        assert!(msg.contains("120.2"), "got: {msg}");
        assert!(msg.contains("limit 100 MB"), "got: {msg}");
    }

    #[test]
    fn mixed_sources_display() {
        let e = StudyKitError::MixedSources {
            detail: "1 PDF and 2 images".into(),
        };
        assert!(e.to_string().contains("1 PDF and 2 images"));
    }

    #[test]
    fn extractor_error_from_fatal_keeps_message() {
        let e: ExtractorError = StudyKitError::PasswordRequired {
            path: PathBuf::from("locked.pdf"),
        }
        .into();
        assert!(e.to_string().contains("locked.pdf"));
    }

    #[test]
    fn completion_timeout_display() {
        let e = CompletionError::Timeout { ms: 30_000 };
        assert_eq!(e.to_string(), "completion timed out after 30000ms");
    }

    #[test]
    fn stage_failures_read_differently() {
        let kinds = [
            StageFailure::Extraction { reason: "x".into() }.to_string(),
            StageFailure::Validation {
                reason: "safety checks did not pass".into(),
            }
            .to_string(),
            StageFailure::Generation { reason: "x".into() }.to_string(),
            StageFailure::Parsing { reason: "x".into() }.to_string(),
        ];
        assert!(kinds[0].contains("extraction"));
        assert!(kinds[1].contains("validation"));
        assert!(kinds[2].contains("generation"));
        assert!(kinds[3].contains("parse"));
    }

    #[test]
    fn stage_failure_serialises_with_kind_tag() {
        let json = serde_json::to_value(StageFailure::Cancelled {
            stage: "validating".into(),
        })
        .unwrap();
        assert_eq!(json["kind"], "cancelled");
        assert_eq!(json["stage"], "validating");
    }
}
