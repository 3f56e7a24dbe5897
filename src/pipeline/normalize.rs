//! Normalise office documents to PDF with a headless LibreOffice.
//!
//! Only the formats in [`OFFICE_EXTENSIONS`] are converted. PDFs and formats
//! the spooler prints directly (images, plain text) pass through untouched.
//!
//! Each conversion gets its own LibreOffice user profile inside the job's
//! scratch directory. Two `soffice` processes sharing the default profile
//! block on its lock file, so concurrent jobs would otherwise serialise or
//! fail.

use crate::error::PrintJobError;
use crate::pipeline::fetch::extension_of;
use crate::process::{self, CommandError, CommandSpec};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Extensions (lower case) that are converted to PDF before printing.
pub const OFFICE_EXTENSIONS: &[&str] = &[
    "doc", "docx", "odt", "rtf", "xls", "xlsx", "ods", "ppt", "pptx", "odp",
];

/// Name of the per-job LibreOffice profile directory.
const PROFILE_DIR: &str = "lo-profile";

/// Whether `path` has an office extension that needs conversion.
pub fn needs_conversion(path: &Path) -> bool {
    OFFICE_EXTENSIONS.contains(&extension_of(path).as_str())
}

pub fn is_pdf(path: &Path) -> bool {
    extension_of(path) == "pdf"
}

/// Converts a document to PDF.
///
/// Implementations write the PDF next to `input` (same directory) and return
/// its path. The input file is never modified.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, input: &Path) -> Result<PathBuf, PrintJobError>;
}

/// [`DocumentConverter`] backed by `soffice --headless --convert-to pdf`.
#[derive(Debug, Clone)]
pub struct LibreOfficeConverter {
    program: String,
    timeout: Duration,
}

impl LibreOfficeConverter {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// The sibling path LibreOffice writes for `input`.
    pub fn expected_output(input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        input.with_file_name(format!("{stem}.pdf"))
    }

    /// Build the command line for converting `input` into `out_dir`.
    pub fn command(&self, input: &Path, out_dir: &Path) -> CommandSpec {
        let profile = out_dir.join(PROFILE_DIR);
        let profile_url = reqwest::Url::from_directory_path(&profile)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("file://{}", profile.display()));

        let mut env_arg = OsString::from("-env:UserInstallation=");
        env_arg.push(profile_url);

        CommandSpec::new(&self.program, self.timeout)
            .args(["--headless", "--norestore"])
            .arg(env_arg)
            .args(["--convert-to", "pdf", "--outdir"])
            .arg(out_dir)
            .arg(input)
            .working_dir(out_dir)
    }
}

#[async_trait]
impl DocumentConverter for LibreOfficeConverter {
    async fn convert(&self, input: &Path) -> Result<PathBuf, PrintJobError> {
        let out_dir = input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let output_path = Self::expected_output(input);
        let spec = self.command(input, &out_dir);

        info!("Converting {} to PDF", input.display());
        let output = process::run(&spec).await.map_err(|e| match e {
            CommandError::Spawn { program, source } => PrintJobError::ConverterUnavailable {
                program,
                reason: source.to_string(),
            },
            CommandError::TimedOut { timeout, .. } => PrintJobError::ConversionTimeout {
                path: input.to_path_buf(),
                secs: timeout.as_secs(),
            },
            CommandError::Wait { source, .. } => PrintJobError::ConversionFailed {
                path: input.to_path_buf(),
                reason: source.to_string(),
            },
        })?;

        if !output.success() {
            return Err(PrintJobError::ConversionFailed {
                path: input.to_path_buf(),
                reason: output.failure_summary(),
            });
        }

        // soffice exits 0 on some load failures and simply writes nothing.
        if !tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
            return Err(PrintJobError::ConversionFailed {
                path: input.to_path_buf(),
                reason: format!("no output produced at {}", output_path.display()),
            });
        }

        debug!(
            "Converted {} → {} in {}ms",
            input.display(),
            output_path.display(),
            output.duration_ms
        );
        Ok(output_path)
    }
}
