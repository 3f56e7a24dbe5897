//! Configuration for the print pipeline.
//!
//! Every knob the pipeline reads lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The CLI maps flags (and `PRINT_RELAY_*`
//! environment variables) onto the builder; library users set only what they
//! need and rely on the defaults for the rest.

use crate::error::PrintJobError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tray name meaning "let the printer decide". No tray directive is sent
/// to the spooler when an order asks for this tray.
pub const DEFAULT_TRAY: &str = "Auto";

/// Configuration for the print pipeline.
///
/// # Example
/// ```rust
/// use print_relay::{PipelineConfig, SpoolerPlatform};
///
/// let config = PipelineConfig::builder()
///     .scratch_dir("/var/tmp/print-relay")
///     .spooler(SpoolerPlatform::Cups)
///     .dispatch_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.dispatch_timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root of the scratch storage. Each job gets its own subdirectory.
    /// Created on demand. Default: `$TMP/print-relay`.
    pub scratch_dir: PathBuf,

    /// HTTP download timeout in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Time budget for one office-to-PDF conversion. Default: 120.
    ///
    /// LibreOffice occasionally hangs on malformed input; the process is
    /// killed when this expires and the job fails with a conversion error.
    pub conversion_timeout_secs: u64,

    /// Time budget for the spooler to accept a job. Default: 60.
    pub dispatch_timeout_secs: u64,

    /// Tray used when an order does not name one. Default: [`DEFAULT_TRAY`].
    pub default_tray: String,

    /// Path or name of the LibreOffice `soffice` binary.
    pub soffice_program: String,

    /// Which spooler command family to drive.
    pub spooler: SpoolerPlatform,

    /// Override for the spooler binary. `None` uses the platform default.
    pub spooler_program: Option<String>,

    /// Base URL of the order store. `None` disables completion signalling.
    pub order_store_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("print-relay"),
            download_timeout_secs: 120,
            conversion_timeout_secs: 120,
            dispatch_timeout_secs: 60,
            default_tray: DEFAULT_TRAY.to_string(),
            soffice_program: default_soffice_program().to_string(),
            spooler: SpoolerPlatform::native(),
            spooler_program: None,
            order_store_url: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The spooler binary, falling back to the platform default.
    pub fn spooler_program(&self) -> &str {
        self.spooler_program
            .as_deref()
            .unwrap_or_else(|| self.spooler.default_program())
    }
}

fn default_soffice_program() -> &'static str {
    if cfg!(windows) {
        r"C:\Program Files\LibreOffice\program\soffice.exe"
    } else {
        "soffice"
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = secs;
        self
    }

    pub fn dispatch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.dispatch_timeout_secs = secs;
        self
    }

    pub fn default_tray(mut self, tray: impl Into<String>) -> Self {
        self.config.default_tray = tray.into();
        self
    }

    pub fn soffice_program(mut self, program: impl Into<String>) -> Self {
        self.config.soffice_program = program.into();
        self
    }

    pub fn spooler(mut self, platform: SpoolerPlatform) -> Self {
        self.config.spooler = platform;
        self
    }

    pub fn spooler_program(mut self, program: impl Into<String>) -> Self {
        self.config.spooler_program = Some(program.into());
        self
    }

    pub fn order_store_url(mut self, url: impl Into<String>) -> Self {
        self.config.order_store_url = Some(url.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PrintJobError> {
        let c = &self.config;
        for (name, secs) in [
            ("download timeout", c.download_timeout_secs),
            ("conversion timeout", c.conversion_timeout_secs),
            ("dispatch timeout", c.dispatch_timeout_secs),
        ] {
            if secs == 0 {
                return Err(PrintJobError::validation(format!(
                    "Invalid configuration: {name} must be ≥ 1 second"
                )));
            }
        }
        if c.soffice_program.trim().is_empty() {
            return Err(PrintJobError::validation(
                "Invalid configuration: soffice program must not be empty",
            ));
        }
        if c.spooler_program().trim().is_empty() {
            return Err(PrintJobError::validation(
                "Invalid configuration: spooler program must not be empty",
            ));
        }
        if c.default_tray.trim().is_empty() {
            return Err(PrintJobError::validation(
                "Invalid configuration: default tray must not be empty",
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The spooler command family used to submit jobs.
///
/// Duplex and tray flags differ per family; the per-family option table
/// lives in [`crate::pipeline::dispatch::OptionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpoolerPlatform {
    /// CUPS `lp` (Linux, macOS, BSD).
    Cups,
    /// SumatraPDF command-line printing (Windows).
    Sumatra,
}

impl SpoolerPlatform {
    /// The spooler family of the host OS.
    pub fn native() -> Self {
        if cfg!(windows) {
            SpoolerPlatform::Sumatra
        } else {
            SpoolerPlatform::Cups
        }
    }

    pub fn default_program(&self) -> &'static str {
        match self {
            SpoolerPlatform::Cups => "lp",
            SpoolerPlatform::Sumatra => "SumatraPDF.exe",
        }
    }
}

impl std::str::FromStr for SpoolerPlatform {
    type Err = PrintJobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cups" | "lp" => Ok(SpoolerPlatform::Cups),
            "sumatra" | "sumatrapdf" | "windows" => Ok(SpoolerPlatform::Sumatra),
            other => Err(PrintJobError::validation(format!(
                "Unknown spooler '{other}' (expected cups or sumatra)"
            ))),
        }
    }
}
