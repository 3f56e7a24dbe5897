//! Error types for the print-relay library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PrintJobError`]: **Fatal**: a pipeline stage failed and the job was
//!   aborted before anything (or anything more) reached the printer. Returned
//!   as `Err(PrintJobError)` from [`crate::job::PrintService::submit`].
//!
//! * [`CompletionWarning`]: **Non-fatal**: something went wrong *around* the
//!   job (a scratch file could not be removed, the order store refused a
//!   delete) but the job outcome itself stands. Collected into
//!   [`crate::job::JobReport::warnings`] so a printed job is never reported
//!   as failed after the paper has already come out.

use crate::job::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the print pipeline.
#[derive(Debug, Error)]
pub enum PrintJobError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The submission is malformed or missing required fields.
    #[error("{reason}")]
    Validation { reason: String },

    // ── Fetch errors ──────────────────────────────────────────────────────
    /// The document URL did not produce a successful transfer.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed {
        url: String,
        /// HTTP status when the server answered, `None` for transport failures.
        status: Option<u16>,
        reason: String,
    },

    /// The transfer did not finish within the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The conversion engine ran but did not produce a PDF.
    #[error("Failed to convert '{path}' to PDF: {reason}")]
    ConversionFailed { path: PathBuf, reason: String },

    /// The conversion engine could not be launched at all.
    #[error(
        "Conversion engine '{program}' could not be started: {reason}\n\
Install LibreOffice or point --soffice at the soffice binary."
    )]
    ConverterUnavailable { program: String, reason: String },

    /// The conversion engine was killed after exceeding its time budget.
    #[error("Conversion of '{path}' timed out after {secs}s")]
    ConversionTimeout { path: PathBuf, secs: u64 },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The PDF could not be parsed or written back.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The page selection did not match a single page of the document.
    #[error("Page selection '{selection}' matches no pages (document has {total} pages)")]
    NoPagesSelected { selection: String, total: usize },

    // ── Dispatch errors ───────────────────────────────────────────────────
    /// The spooler rejected the job or exited non-zero.
    #[error("Printer '{printer}' rejected the job: {reason}")]
    DispatchFailed { printer: String, reason: String },

    /// The spooler did not accept the job within the configured timeout.
    #[error("Spooler did not accept the job for '{printer}' within {secs}s")]
    DispatchTimeout { printer: String, secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write inside the scratch directory.
    #[error("Scratch storage error at '{path}': {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`PrintJobError`].
///
/// Stable and serialisable, so HTTP clients can branch on it without parsing
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Download,
    Conversion,
    PdfParse,
    NoPagesSelected,
    Dispatch,
    Scratch,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Download => "DownloadError",
            ErrorKind::Conversion => "ConversionError",
            ErrorKind::PdfParse => "PdfParseError",
            ErrorKind::NoPagesSelected => "NoPagesSelectedError",
            ErrorKind::Dispatch => "DispatchError",
            ErrorKind::Scratch => "ScratchError",
            ErrorKind::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

impl PrintJobError {
    /// Shorthand for a validation failure.
    pub fn validation(reason: impl Into<String>) -> Self {
        PrintJobError::Validation {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PrintJobError::Validation { .. } => ErrorKind::Validation,
            PrintJobError::DownloadFailed { .. } | PrintJobError::DownloadTimeout { .. } => {
                ErrorKind::Download
            }
            PrintJobError::ConversionFailed { .. }
            | PrintJobError::ConverterUnavailable { .. }
            | PrintJobError::ConversionTimeout { .. } => ErrorKind::Conversion,
            PrintJobError::CorruptPdf { .. } => ErrorKind::PdfParse,
            PrintJobError::NoPagesSelected { .. } => ErrorKind::NoPagesSelected,
            PrintJobError::DispatchFailed { .. } | PrintJobError::DispatchTimeout { .. } => {
                ErrorKind::Dispatch
            }
            PrintJobError::Scratch { .. } => ErrorKind::Scratch,
            PrintJobError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The pipeline stage this error originates from, if any.
    ///
    /// Validation happens before a job exists and scratch/internal errors
    /// are not tied to one stage, so those return `None`.
    pub fn stage(&self) -> Option<Stage> {
        match self.kind() {
            ErrorKind::Download => Some(Stage::Fetch),
            ErrorKind::Conversion => Some(Stage::Normalize),
            ErrorKind::PdfParse | ErrorKind::NoPagesSelected => Some(Stage::Transform),
            ErrorKind::Dispatch => Some(Stage::Dispatch),
            ErrorKind::Validation | ErrorKind::Scratch | ErrorKind::Internal => None,
        }
    }

    /// True for errors the client caused (bad request, bad selection).
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation)
    }
}

/// A non-fatal problem encountered while finishing a job.
///
/// Stored in [`crate::job::JobReport::warnings`]. The job outcome is
/// unaffected.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum CompletionWarning {
    /// A scratch artifact could not be deleted.
    #[error("could not remove scratch file '{path}': {detail}")]
    ScratchRemoval { path: PathBuf, detail: String },

    /// The fulfilled order record could not be deleted.
    #[error("could not delete order '{order_id}': {detail}")]
    OrderDeletion { order_id: String, detail: String },

    /// The uploaded blob could not be deleted.
    #[error("could not delete blob '{blob_path}': {detail}")]
    BlobDeletion { blob_path: String, detail: String },

    /// Page selection or orientation was requested for a file that is not
    /// a PDF; it was printed as-is.
    #[error("page selection and orientation ignored for non-PDF '{path}'")]
    TransformSkipped { path: PathBuf },
}
