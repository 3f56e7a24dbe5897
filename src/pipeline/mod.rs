//! Pipeline stages of a print job.
//!
//! Each submodule implements exactly one step. Stages never modify their
//! input file; each writes a new artifact into the job's scratch directory
//! and the orchestrator ([`crate::job`]) threads the current artifact from
//! one stage to the next.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ normalize ──▶ transform ──▶ dispatch
//! (HTTP/path) (soffice)    (lopdf)       (lp / SumatraPDF)
//! ```
//!
//! 1. [`fetch`]: download the order's document (or copy a local path)
//! 2. [`normalize`]: office formats → PDF in a headless LibreOffice;
//!    skipped for PDFs and directly printable formats
//! 3. [`pages`]: parse `"1,3,5-7"` page selections
//! 4. [`transform`]: keep the selected pages and rotate for landscape;
//!    runs in `spawn_blocking` because lopdf is synchronous
//! 5. [`dispatch`]: submit to the spooler, one job per printer at a time

pub mod dispatch;
pub mod fetch;
pub mod normalize;
pub mod pages;
pub mod transform;
