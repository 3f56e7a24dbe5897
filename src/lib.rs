//! # print-relay
//!
//! Turn remote print orders into jobs on local printers.
//!
//! A print shop receives orders from customers: a document URL plus print
//! options (pages, orientation, copies, duplex, tray). This crate fetches the
//! document, converts office formats to PDF, cuts out the requested pages,
//! rotates them for landscape output and hands the result to the OS spooler.
//! Every intermediate file lives in a per-job scratch directory that is
//! removed when the job ends, whatever the outcome.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Order
//!  │
//!  ├─ 1. Fetch      download the document (or copy a local path)
//!  ├─ 2. Normalize  doc/docx/odt/… → PDF via headless LibreOffice
//!  ├─ 3. Transform  keep selected pages, rotate for landscape (lopdf)
//!  ├─ 4. Dispatch   lp / SumatraPDF, one job per printer at a time
//!  └─ 5. Complete   release scratch, delete the order and its blob
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use print_relay::{PipelineConfig, PrintService, PrintSubmission};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = PrintService::new(PipelineConfig::default())?;
//!     let submission: PrintSubmission = serde_json::from_str(
//!         r#"{ "printerId": "Office_Laser",
//!              "order": { "fileURL": "https://files.example/o/report.docx",
//!                         "selectedPages": "1-3",
//!                         "options": { "copies": 2, "sides": "Double" } } }"#,
//!     )?;
//!     let report = service.submit(submission).await?;
//!     eprintln!("job {} → {:?}", report.job_id, report.state);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `print-relay` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! print-relay = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod job;
pub mod order;
pub mod pipeline;
pub mod printers;
pub mod process;
pub mod progress;
pub mod scratch;
pub mod server;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, SpoolerPlatform, DEFAULT_TRAY};
pub use error::{CompletionWarning, ErrorKind, PrintJobError};
pub use job::{JobReport, JobState, PrintService, PrintServiceBuilder, Stage};
pub use order::{Order, Orientation, PrintOptions, PrintRequest, PrintSubmission, PrinterTarget, Sides};
pub use pipeline::dispatch::{PrintSpooler, SpoolJob, SpoolerAck};
pub use pipeline::normalize::DocumentConverter;
pub use pipeline::pages::{PageSelection, PageSet};
pub use printers::{PrinterDirectory, PrinterInfo};
pub use progress::{JobObserver, NoopJobObserver};
pub use store::{OrderStore, StoreError};
