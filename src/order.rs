//! Print orders: the JSON accepted from clients and the validated form the
//! pipeline runs on.
//!
//! [`PrintSubmission`] mirrors the wire format loosely (every field optional,
//! camelCase names) so that a missing field becomes a clear
//! [`PrintJobError::Validation`] instead of an opaque deserialisation error.
//! [`PrintSubmission::validate`] turns it into a [`PrintRequest`], which is
//! immutable from then on.

use crate::config::DEFAULT_TRAY;
use crate::error::PrintJobError;
use crate::pipeline::fetch;
use crate::pipeline::pages::PageSelection;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Single- or double-sided output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sides {
    #[default]
    #[serde(alias = "single")]
    Single,
    #[serde(alias = "double")]
    Double,
}

/// Page orientation. Landscape rotates every printed page by 90°.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    #[serde(alias = "portrait")]
    Portrait,
    #[serde(alias = "landscape")]
    Landscape,
}

/// Print options as submitted by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedOptions {
    pub copies: Option<i64>,
    pub sides: Option<Sides>,
    pub orientation: Option<Orientation>,
    pub tray: Option<String>,
}

/// An order as submitted by the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedOrder {
    /// Order record id in the order store. Used for the completion signal.
    pub id: Option<String>,
    #[serde(rename = "fileURL")]
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    /// Blob-store path of the uploaded file. Used for the completion signal.
    pub file_path: Option<String>,
    pub selected_pages: Option<String>,
    /// Legacy flag sent by older dashboards; `true` means double-sided when
    /// `options.sides` is absent.
    pub duplex: Option<bool>,
    pub options: Option<SubmittedOptions>,
}

/// Body of `POST /print`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintSubmission {
    pub printer_id: Option<String>,
    pub order: Option<SubmittedOrder>,
}

/// Validated print options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrintOptions {
    /// Number of copies, at least 1.
    pub copies: u32,
    pub sides: Sides,
    pub orientation: Orientation,
    pub tray: String,
}

impl PrintOptions {
    pub fn new(tray: impl Into<String>) -> Self {
        Self {
            copies: 1,
            sides: Sides::Single,
            orientation: Orientation::Portrait,
            tray: tray.into(),
        }
    }
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self::new(DEFAULT_TRAY)
    }
}

/// A validated order. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub file_url: String,
    pub file_name: Option<String>,
    pub pages: PageSelection,
    pub options: PrintOptions,
    /// Order record to delete after a successful print.
    pub order_id: Option<String>,
    /// Blob to delete after a successful print.
    pub blob_path: Option<String>,
}

impl Order {
    /// A portrait, single-copy, all-pages order for `file_url`.
    pub fn new(file_url: impl Into<String>) -> Self {
        Self {
            file_url: file_url.into(),
            file_name: None,
            pages: PageSelection::All,
            options: PrintOptions::default(),
            order_id: None,
            blob_path: None,
        }
    }

    /// Whether the page transformer has anything to do.
    pub fn needs_transform(&self) -> bool {
        !self.pages.is_all() || self.options.orientation != Orientation::Portrait
    }
}

/// Opaque printer identifier as reported by the printer directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrinterTarget(String);

impl PrinterTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrinterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A printer plus the order to print on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintRequest {
    pub printer: PrinterTarget,
    pub order: Order,
}

impl PrintSubmission {
    /// Check required fields and option ranges, producing an immutable
    /// [`PrintRequest`]. `default_tray` fills in a missing tray.
    pub fn validate(self, default_tray: &str) -> Result<PrintRequest, PrintJobError> {
        let printer = non_blank(self.printer_id);
        let order = self.order.unwrap_or_default();
        let file_url = non_blank(order.file_url);

        let (Some(printer), Some(file_url)) = (printer, file_url) else {
            return Err(PrintJobError::validation("Missing printerId or fileURL"));
        };
        if !fetch::is_url(&file_url) {
            return Err(PrintJobError::validation(format!(
                "fileURL must be an http:// or https:// URL, got '{file_url}'"
            )));
        }

        let pages = match order.selected_pages.as_deref() {
            Some(expr) => PageSelection::parse(expr)?,
            None => PageSelection::All,
        };

        let submitted = order.options.unwrap_or_default();
        let copies = match submitted.copies {
            None => 1,
            Some(n) if n >= 1 => u32::try_from(n).map_err(|_| {
                PrintJobError::validation(format!("copies must be at most {}", u32::MAX))
            })?,
            Some(n) => {
                return Err(PrintJobError::validation(format!(
                    "copies must be a positive integer, got {n}"
                )))
            }
        };
        let sides = submitted.sides.unwrap_or(if order.duplex == Some(true) {
            Sides::Double
        } else {
            Sides::Single
        });
        let tray = non_blank(submitted.tray).unwrap_or_else(|| default_tray.to_string());
        check_tray(&tray)?;

        Ok(PrintRequest {
            printer: PrinterTarget::new(printer),
            order: Order {
                file_url,
                file_name: non_blank(order.file_name),
                pages,
                options: PrintOptions {
                    copies,
                    sides,
                    orientation: submitted.orientation.unwrap_or_default(),
                    tray,
                },
                order_id: non_blank(order.id),
                blob_path: non_blank(order.file_path),
            },
        })
    }
}

/// Reject tray names the spooler would split into several settings.
///
/// SumatraPDF reads `-print-settings` as a comma-separated list, so a comma
/// in the tray name would smuggle in extra settings such as a copy count.
pub fn check_tray(tray: &str) -> Result<(), PrintJobError> {
    if tray.contains(',') {
        return Err(PrintJobError::validation(format!(
            "tray must not contain ',', got '{tray}'"
        )));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
