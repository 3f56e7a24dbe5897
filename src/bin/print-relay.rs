//! CLI binary for print-relay.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs the HTTP server or single jobs, and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use print_relay::order::check_tray;
use print_relay::{
    server, JobObserver, JobReport, JobState, Order, Orientation, PageSelection, PipelineConfig,
    PrintJobError, PrintRequest, PrintService, PrintSubmission, PrinterTarget, Sides,
    SpoolerPlatform,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: one spinner line per job state for `print`, a counting
/// bar for `batch`. Jobs finish out of order in batch mode, so every
/// completion is printed above the bar as it happens.
struct CliObserver {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl CliObserver {
    fn spinner() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Printing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failed: AtomicUsize::new(0),
        })
    }

    fn counter(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} jobs  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("Batch");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            failed: AtomicUsize::new(0),
        })
    }

    fn hidden() -> Arc<Self> {
        Arc::new(Self {
            bar: ProgressBar::hidden(),
            failed: AtomicUsize::new(0),
        })
    }
}

impl JobObserver for CliObserver {
    fn on_transition(&self, job_id: &str, state: JobState) {
        self.bar.set_message(format!("{} {}", dim(short_id(job_id)), state));
    }

    fn on_job_complete(&self, report: &JobReport) {
        self.bar.inc(1);
        let request = report.ack.request_id.as_deref().unwrap_or("accepted");
        self.bar.println(format!(
            "  {} {}  {}  {}",
            green("✓"),
            short_id(&report.job_id),
            report.printer,
            dim(&format!("{request}, {}ms", report.duration_ms))
        ));
        for warning in &report.warnings {
            self.bar.println(format!("    {} {}", dim("warning:"), warning));
        }
    }

    fn on_job_failed(&self, job_id: &str, error: &PrintJobError) {
        self.bar.inc(1);
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {}  {}",
            red("✗"),
            short_id(job_id),
            red(&error.to_string())
        ));
    }
}

fn short_id(job_id: &str) -> &str {
    job_id.get(..8).unwrap_or(job_id)
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP backend for the shop dashboard (port 5000)
  print-relay serve

  # Print pages 1-3 of a remote document twice, double-sided
  print-relay print https://files.example/o/report.docx --printer Office_Laser \
      --pages 1-3 --copies 2 --duplex

  # Print a local PDF in landscape from tray 2
  print-relay print ./poster.pdf --printer Front_Desk --landscape --tray "Tray 2"

  # Replay a file of submissions (one JSON object per line), 4 at a time
  print-relay batch orders.jsonl --concurrency 4

  # List installed printers
  print-relay printers

REQUIREMENTS:
  LibreOffice (soffice) for doc/docx/odt/rtf/xls/xlsx/ods/ppt/pptx/odp input.
  CUPS `lp` on Linux/macOS, SumatraPDF on Windows.
"#;

/// Relay remote print orders to local printers.
#[derive(Parser, Debug)]
#[command(
    name = "print-relay",
    version,
    about = "Relay remote print orders to local printers",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PRINT_RELAY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PRINT_RELAY_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (GET /printers, POST /print, GET /health).
    Serve {
        /// Address to listen on.
        #[arg(long, env = "PRINT_RELAY_LISTEN", default_value = "0.0.0.0:5000")]
        listen: SocketAddr,
    },

    /// Print one document from a URL or local path.
    Print(PrintArgs),

    /// Run every submission in a JSON-lines file.
    Batch {
        /// File with one `POST /print` body per line.
        file: PathBuf,

        /// Jobs in flight at once.
        #[arg(short, long, env = "PRINT_RELAY_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,
    },

    /// List printers known to the spooler.
    Printers {
        /// Output JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct PrintArgs {
    /// HTTP/HTTPS URL or local file path.
    input: String,

    /// Printer name as listed by `print-relay printers`.
    #[arg(short, long, env = "PRINT_RELAY_PRINTER")]
    printer: String,

    /// Page selection: all, 5, 3-15, or 1,3,5-7.
    #[arg(long, default_value = "all")]
    pages: String,

    /// Number of copies.
    #[arg(short = 'n', long, default_value_t = 1,
          value_parser = clap::value_parser!(u32).range(1..))]
    copies: u32,

    /// Print double-sided.
    #[arg(long)]
    duplex: bool,

    /// Rotate pages 90° for landscape output.
    #[arg(long)]
    landscape: bool,

    /// Input tray. Defaults to --default-tray.
    #[arg(long)]
    tray: Option<String>,

    /// Output the job report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Root directory for per-job scratch files.
    #[arg(long, global = true, env = "PRINT_RELAY_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "PRINT_RELAY_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Time budget for one office-to-PDF conversion, in seconds.
    #[arg(long, global = true, env = "PRINT_RELAY_CONVERSION_TIMEOUT", default_value_t = 120)]
    conversion_timeout: u64,

    /// Time budget for the spooler to accept a job, in seconds.
    #[arg(long, global = true, env = "PRINT_RELAY_DISPATCH_TIMEOUT", default_value_t = 60)]
    dispatch_timeout: u64,

    /// Path to the LibreOffice soffice binary.
    #[arg(long, global = true, env = "PRINT_RELAY_SOFFICE")]
    soffice: Option<String>,

    /// Spooler family: cups or sumatra. Defaults to the host OS.
    #[arg(long, global = true, env = "PRINT_RELAY_SPOOLER")]
    spooler: Option<SpoolerPlatform>,

    /// Override the spooler binary (lp / SumatraPDF.exe).
    #[arg(long, global = true, env = "PRINT_RELAY_SPOOLER_PROGRAM")]
    spooler_program: Option<String>,

    /// Tray used when an order does not name one.
    #[arg(long, global = true, env = "PRINT_RELAY_DEFAULT_TRAY")]
    default_tray: Option<String>,

    /// Base URL of the order store; fulfilled orders are deleted there.
    #[arg(long, global = true, env = "PRINT_RELAY_ORDER_STORE_URL")]
    order_store_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The server logs every request and job; the one-shot commands keep
    // INFO quiet because the progress output already says what matters.
    let interactive = !matches!(cli.command, Command::Serve { .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || interactive {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli.pipeline)?;

    match cli.command {
        Command::Serve { listen } => {
            let service = PrintService::new(config).context("Failed to start print service")?;
            server::serve(Arc::new(service), listen)
                .await
                .with_context(|| format!("Server on {listen} failed"))?;
        }
        Command::Print(args) => run_print(config, args, cli.quiet).await?,
        Command::Batch { file, concurrency } => {
            run_batch(config, file, concurrency.max(1), cli.quiet).await?
        }
        Command::Printers { json } => {
            let service = PrintService::new(config).context("Failed to start print service")?;
            let printers = service
                .list_printers()
                .await
                .context("Failed to fetch printers")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&printers)?);
            } else if printers.is_empty() {
                eprintln!("{}", dim("No printers found."));
            } else {
                for p in printers {
                    println!("{}", p.name);
                }
            }
        }
    }

    Ok(())
}

async fn run_print(config: PipelineConfig, args: PrintArgs, quiet: bool) -> Result<()> {
    let observer = if quiet || args.json {
        CliObserver::hidden()
    } else {
        CliObserver::spinner()
    };

    let mut order = Order::new(args.input.clone());
    order.pages = PageSelection::parse(&args.pages)
        .with_context(|| format!("Invalid --pages value '{}'", args.pages))?;
    order.options.copies = args.copies;
    if args.duplex {
        order.options.sides = Sides::Double;
    }
    if args.landscape {
        order.options.orientation = Orientation::Landscape;
    }
    order.options.tray = args.tray.unwrap_or_else(|| config.default_tray.clone());
    check_tray(&order.options.tray).context("Invalid --tray value")?;

    let service = PrintService::builder(config)
        .observer(observer.clone())
        .build()
        .context("Failed to start print service")?;

    let result = service
        .run(PrintRequest {
            printer: PrinterTarget::new(args.printer),
            order,
        })
        .await;
    observer.bar.finish_and_clear();

    let report = result.with_context(|| format!("Failed to print '{}'", args.input))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        eprintln!(
            "{} {} {}",
            green("✔"),
            bold(&format!("Sent to {}", report.printer)),
            dim(&format!(
                "({}, {}ms)",
                report.ack.request_id.as_deref().unwrap_or("accepted"),
                report.duration_ms
            ))
        );
    }
    Ok(())
}

async fn run_batch(
    config: PipelineConfig,
    file: PathBuf,
    concurrency: usize,
    quiet: bool,
) -> Result<()> {
    let text = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let submissions = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<PrintSubmission>(line)
                .with_context(|| format!("{}:{}: invalid submission", file.display(), i + 1))
        })
        .collect::<Result<Vec<_>>>()?;

    let observer = if quiet {
        CliObserver::hidden()
    } else {
        CliObserver::counter(submissions.len())
    };
    let service = PrintService::builder(config)
        .observer(observer.clone())
        .build()
        .context("Failed to start print service")?;

    // Submissions rejected before a job exists never reach the observer.
    let rejected = AtomicUsize::new(0);
    let total = submissions.len();
    stream::iter(submissions)
        .map(|submission| {
            let service = &service;
            let observer = &observer;
            let rejected = &rejected;
            async move {
                if let Err(e) = service.submit(submission).await {
                    if e.is_client_error() {
                        rejected.fetch_add(1, Ordering::SeqCst);
                        observer.bar.inc(1);
                        observer
                            .bar
                            .println(format!("  {} {}", red("✗"), red(&e.to_string())));
                    }
                }
            }
        })
        .buffer_unordered(concurrency)
        .collect::<Vec<()>>()
        .await;
    observer.bar.finish_and_clear();

    let failed = observer.failed.load(Ordering::SeqCst) + rejected.load(Ordering::SeqCst);
    if !quiet {
        eprintln!(
            "{} {}",
            if failed == 0 { green("✔") } else { red("✗") },
            bold(&format!("{}/{} jobs sent", total - failed, total))
        );
    }
    if failed > 0 {
        bail!("{failed} of {total} jobs failed");
    }
    Ok(())
}

fn build_config(args: &PipelineArgs) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .download_timeout_secs(args.download_timeout)
        .conversion_timeout_secs(args.conversion_timeout)
        .dispatch_timeout_secs(args.dispatch_timeout);

    if let Some(dir) = &args.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(soffice) = &args.soffice {
        builder = builder.soffice_program(soffice);
    }
    if let Some(spooler) = args.spooler {
        builder = builder.spooler(spooler);
    }
    if let Some(program) = &args.spooler_program {
        builder = builder.spooler_program(program);
    }
    if let Some(tray) = &args.default_tray {
        builder = builder.default_tray(tray);
    }
    if let Some(url) = &args.order_store_url {
        builder = builder.order_store_url(url);
    }

    builder.build().context("Invalid configuration")
}
