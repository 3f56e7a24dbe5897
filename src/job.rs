//! Job orchestration: run one order through the pipeline.
//!
//! [`PrintService`] owns the collaborators (converter, spooler, printer
//! directory, order store) and the per-printer dispatch queues. Each call to
//! [`PrintService::submit`] is one job:
//!
//! ```text
//! Received ─▶ Fetched ─▶ [Normalized] ─▶ [PageSelected] ─▶ Dispatched ─▶ Completed
//!     └──────────┴────────────┴────────────────┴──────────────┴──────▶ Failed
//! ```
//!
//! The scratch directory is released on every exit path before the job
//! returns. The order record and blob are deleted only after a successful
//! dispatch.

use crate::config::PipelineConfig;
use crate::error::{CompletionWarning, PrintJobError};
use crate::order::{Order, PrintRequest, PrintSubmission};
use crate::pipeline::dispatch::{CommandSpooler, PrintSpooler, PrinterQueues, SpoolJob, SpoolerAck};
use crate::pipeline::normalize::{self, DocumentConverter, LibreOfficeConverter};
use crate::pipeline::transform::{self, TransformSummary};
use crate::pipeline::fetch;
use crate::printers::{CommandPrinterDirectory, PrinterDirectory, PrinterInfo};
use crate::progress::{JobObserver, NoopJobObserver};
use crate::scratch::{ArtifactKind, ScratchSpace};
use crate::store::{NoopOrderStore, OrderStore, RestOrderStore};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A pipeline stage, used to attribute errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Normalize,
    Transform,
    Dispatch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Normalize => "normalize",
            Stage::Transform => "transform",
            Stage::Dispatch => "dispatch",
        })
    }
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Received,
    Fetched,
    Normalized,
    PageSelected,
    Dispatched,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of a completed job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: String,
    pub printer: String,
    pub state: JobState,
    /// Every state the job passed through, in order.
    pub transitions: Vec<JobState>,
    /// Whether the document went through the office converter.
    pub converted: bool,
    /// Present when pages were selected or rotated.
    pub transform: Option<TransformSummary>,
    pub ack: SpoolerAck,
    pub warnings: Vec<CompletionWarning>,
    pub duration_ms: u64,
}

/// Records transitions and forwards them to the observer.
struct Tracker<'a> {
    job_id: &'a str,
    observer: &'a dyn JobObserver,
    transitions: Vec<JobState>,
}

impl Tracker<'_> {
    fn enter(&mut self, state: JobState) {
        info!(state = %state, "Job state changed");
        self.transitions.push(state);
        self.observer.on_transition(self.job_id, state);
    }
}

/// What the stages produced, before cleanup and completion signalling.
struct StageOutcome {
    converted: bool,
    transform: Option<TransformSummary>,
    ack: SpoolerAck,
    warnings: Vec<CompletionWarning>,
}

/// Runs print jobs.
///
/// Cheap to share behind an `Arc`; every job borrows it immutably.
pub struct PrintService {
    config: PipelineConfig,
    client: reqwest::Client,
    converter: Arc<dyn DocumentConverter>,
    spooler: Arc<dyn PrintSpooler>,
    printers: Arc<dyn PrinterDirectory>,
    store: Arc<dyn OrderStore>,
    observer: Arc<dyn JobObserver>,
    queues: PrinterQueues,
}

impl PrintService {
    /// A service wired to the real LibreOffice, spooler and printer listing
    /// described by `config`.
    pub fn new(config: PipelineConfig) -> Result<Self, PrintJobError> {
        Self::builder(config).build()
    }

    pub fn builder(config: PipelineConfig) -> PrintServiceBuilder {
        PrintServiceBuilder {
            config,
            converter: None,
            spooler: None,
            printers: None,
            store: None,
            observer: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Printers known to the OS spooler.
    pub async fn list_printers(&self) -> Result<Vec<PrinterInfo>, PrintJobError> {
        self.printers.list().await
    }

    /// Validate a client submission and run it.
    ///
    /// Validation errors are returned before a job id or scratch directory
    /// exists, so no stage runs for a malformed request. Only `http(s)`
    /// document URLs are accepted here; local paths go through [`Self::run`].
    pub async fn submit(&self, submission: PrintSubmission) -> Result<JobReport, PrintJobError> {
        let request = submission.validate(&self.config.default_tray)?;
        self.run(request).await
    }

    /// Run an already-validated request.
    pub async fn run(&self, request: PrintRequest) -> Result<JobReport, PrintJobError> {
        let job_id = Uuid::new_v4().to_string();
        let span = info_span!("print_job", job_id = %job_id, printer = %request.printer);
        self.run_job(&job_id, request).instrument(span).await
    }

    async fn run_job(&self, job_id: &str, request: PrintRequest) -> Result<JobReport, PrintJobError> {
        let started = Instant::now();
        let mut tracker = Tracker {
            job_id,
            observer: self.observer.as_ref(),
            transitions: Vec::new(),
        };
        tracker.enter(JobState::Received);

        let result = match ScratchSpace::create(&self.config.scratch_dir, job_id).await {
            Ok(mut scratch) => {
                let outcome = self.run_stages(&request, &mut scratch, &mut tracker).await;
                let cleanup = scratch.release().await;
                outcome.map(|mut o| {
                    o.warnings.extend(cleanup);
                    o
                })
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                let mut warnings = outcome.warnings;
                warnings.extend(self.signal_completion(&request.order).await);
                tracker.enter(JobState::Completed);

                let report = JobReport {
                    job_id: job_id.to_string(),
                    printer: request.printer.to_string(),
                    state: JobState::Completed,
                    transitions: tracker.transitions,
                    converted: outcome.converted,
                    transform: outcome.transform,
                    ack: outcome.ack,
                    warnings,
                    duration_ms: started.elapsed().as_millis() as u64,
                };
                info!(
                    warnings = report.warnings.len(),
                    "Job completed in {}ms", report.duration_ms
                );
                self.observer.on_job_complete(&report);
                Ok(report)
            }
            Err(e) => {
                let stage = e.stage().map_or_else(|| "-".to_string(), |s| s.to_string());
                error!(stage = %stage, kind = %e.kind(), "Job failed: {}", e);
                tracker.enter(JobState::Failed);
                self.observer.on_job_failed(job_id, &e);
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        request: &PrintRequest,
        scratch: &mut ScratchSpace,
        tracker: &mut Tracker<'_>,
    ) -> Result<StageOutcome, PrintJobError> {
        let order = &request.order;
        let mut warnings = Vec::new();

        // ── Fetch ────────────────────────────────────────────────────────
        let file_name = fetch::file_name_for(&order.file_url, order.file_name.as_deref());
        let downloaded = scratch.register(ArtifactKind::Downloaded, &file_name);
        fetch::fetch_document(
            &self.client,
            &order.file_url,
            &downloaded,
            self.config.download_timeout_secs,
        )
        .await?;
        tracker.enter(JobState::Fetched);
        let mut current = downloaded;

        // ── Normalize ────────────────────────────────────────────────────
        let mut converted = false;
        if normalize::needs_conversion(&current) {
            scratch.register_path(
                ArtifactKind::Converted,
                LibreOfficeConverter::expected_output(&current),
            );
            let pdf = self.converter.convert(&current).await?;
            scratch.register_path(ArtifactKind::Converted, pdf.clone());
            current = pdf;
            converted = true;
            tracker.enter(JobState::Normalized);
        }

        // ── Transform ────────────────────────────────────────────────────
        let mut summary = None;
        if order.needs_transform() {
            if normalize::is_pdf(&current) {
                let dest = transform::processed_path(&current);
                scratch.register_path(ArtifactKind::Transformed, dest.clone());
                summary = Some(
                    transform::process_pages(
                        &current,
                        &dest,
                        &order.pages,
                        order.options.orientation,
                    )
                    .await?,
                );
                current = dest;
                tracker.enter(JobState::PageSelected);
            } else if !order.pages.is_all() {
                return Err(PrintJobError::CorruptPdf {
                    path: current,
                    detail: format!(
                        "page selection '{}' needs a PDF, but this format has no pages to select",
                        order.pages
                    ),
                });
            } else {
                let warning = CompletionWarning::TransformSkipped {
                    path: current.clone(),
                };
                warn!("{}", warning);
                warnings.push(warning);
            }
        }

        // ── Dispatch ─────────────────────────────────────────────────────
        let job = SpoolJob {
            printer: request.printer.clone(),
            file: current,
            copies: order.options.copies,
            sides: order.options.sides,
            tray: order.options.tray.clone(),
        };
        debug!("Dispatching {}", job.file.display());
        let ack = self.queues.dispatch(self.spooler.as_ref(), &job).await?;
        tracker.enter(JobState::Dispatched);

        Ok(StageOutcome {
            converted,
            transform: summary,
            ack,
            warnings,
        })
    }

    /// Delete the fulfilled order and its blob. Failures become warnings.
    async fn signal_completion(&self, order: &Order) -> Vec<CompletionWarning> {
        let mut warnings = Vec::new();

        if let Some(order_id) = &order.order_id {
            if let Err(e) = self.store.delete_order(order_id).await {
                let warning = CompletionWarning::OrderDeletion {
                    order_id: order_id.clone(),
                    detail: e.to_string(),
                };
                warn!("{}", warning);
                warnings.push(warning);
            }
        }

        if let Some(blob_path) = &order.blob_path {
            if let Err(e) = self.store.delete_blob(blob_path).await {
                let warning = CompletionWarning::BlobDeletion {
                    blob_path: blob_path.clone(),
                    detail: e.to_string(),
                };
                warn!("{}", warning);
                warnings.push(warning);
            }
        }

        warnings
    }
}

/// Builder for [`PrintService`]. Collaborators left unset are created from
/// the config.
pub struct PrintServiceBuilder {
    config: PipelineConfig,
    converter: Option<Arc<dyn DocumentConverter>>,
    spooler: Option<Arc<dyn PrintSpooler>>,
    printers: Option<Arc<dyn PrinterDirectory>>,
    store: Option<Arc<dyn OrderStore>>,
    observer: Option<Arc<dyn JobObserver>>,
}

impl PrintServiceBuilder {
    pub fn converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn spooler(mut self, spooler: Arc<dyn PrintSpooler>) -> Self {
        self.spooler = Some(spooler);
        self
    }

    pub fn printers(mut self, printers: Arc<dyn PrinterDirectory>) -> Self {
        self.printers = Some(printers);
        self
    }

    pub fn store(mut self, store: Arc<dyn OrderStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Result<PrintService, PrintJobError> {
        let config = self.config;
        let conversion_timeout = Duration::from_secs(config.conversion_timeout_secs);
        let dispatch_timeout = Duration::from_secs(config.dispatch_timeout_secs);

        let converter = self.converter.unwrap_or_else(|| {
            Arc::new(LibreOfficeConverter::new(
                config.soffice_program.clone(),
                conversion_timeout,
            ))
        });
        let spooler = self.spooler.unwrap_or_else(|| {
            Arc::new(CommandSpooler::new(
                config.spooler,
                config.spooler_program(),
                dispatch_timeout,
            ))
        });
        let printers = self.printers.unwrap_or_else(|| {
            Arc::new(CommandPrinterDirectory::new(config.spooler, dispatch_timeout))
        });
        let store: Arc<dyn OrderStore> = match (self.store, &config.order_store_url) {
            (Some(store), _) => store,
            (None, Some(url)) => Arc::new(
                RestOrderStore::new(url.clone(), Duration::from_secs(config.download_timeout_secs))
                    .map_err(|e| PrintJobError::Internal(format!("Failed to build order store client: {e}")))?,
            ),
            (None, None) => Arc::new(NoopOrderStore),
        };

        Ok(PrintService {
            client: fetch::http_client(config.download_timeout_secs)?,
            converter,
            spooler,
            printers,
            store,
            observer: self.observer.unwrap_or_else(|| Arc::new(NoopJobObserver)),
            queues: PrinterQueues::new(),
            config,
        })
    }
}
