//! Dispatch: hand the final artifact to the OS print spooler.
//!
//! A successful dispatch means the spooler *accepted* the job. Whether paper
//! ever comes out is out of our hands.
//!
//! ## Option table
//!
//! | Option  | CUPS (`lp`)                       | SumatraPDF (`-print-settings`) |
//! |---------|-----------------------------------|--------------------------------|
//! | copies  | `-n N`                            | `Nx`                           |
//! | duplex  | `-o sides=two-sided-long-edge`    | `duplex`                       |
//! | tray    | `-o InputSlot=<tray>`             | `bin=<tray>`                   |
//!
//! No tray directive is emitted for [`DEFAULT_TRAY`].

use crate::config::{SpoolerPlatform, DEFAULT_TRAY};
use crate::error::PrintJobError;
use crate::order::{PrinterTarget, Sides};
use crate::process::{self, CommandError, CommandSpec};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

/// Everything the spooler needs for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolJob {
    pub printer: PrinterTarget,
    pub file: PathBuf,
    pub copies: u32,
    pub sides: Sides,
    pub tray: String,
}

/// Acknowledgement from the spooler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoolerAck {
    pub printer: String,
    /// Spooler-assigned request id (`Office-42` for CUPS), when reported.
    pub request_id: Option<String>,
}

/// Submits files to a printer.
#[async_trait]
pub trait PrintSpooler: Send + Sync {
    async fn submit(&self, job: &SpoolJob) -> Result<SpoolerAck, PrintJobError>;
}

/// How one spooler spells each print option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Directives {
    /// Suffix that turns a copy count into a setting (`2x`). `None` when the
    /// count is passed as its own flag instead.
    copies_suffix: Option<&'static str>,
    duplex: &'static str,
    tray_prefix: &'static str,
}

const CUPS: Directives = Directives {
    copies_suffix: None,
    duplex: "sides=two-sided-long-edge",
    tray_prefix: "InputSlot=",
};

const SUMATRA: Directives = Directives {
    copies_suffix: Some("x"),
    duplex: "duplex",
    tray_prefix: "bin=",
};

/// Per-platform mapping of print options to spooler arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionTable {
    platform: SpoolerPlatform,
}

impl OptionTable {
    pub fn for_platform(platform: SpoolerPlatform) -> Self {
        Self { platform }
    }

    fn directives(&self) -> &'static Directives {
        match self.platform {
            SpoolerPlatform::Cups => &CUPS,
            SpoolerPlatform::Sumatra => &SUMATRA,
        }
    }

    /// Option settings for `job`, in the platform's spelling.
    pub fn settings(&self, job: &SpoolJob) -> Vec<String> {
        let table = self.directives();
        let tray = Some(job.tray.trim()).filter(|t| !t.is_empty() && *t != DEFAULT_TRAY);

        let mut settings = Vec::new();
        if let Some(suffix) = table.copies_suffix {
            settings.push(format!("{}{suffix}", job.copies));
        }
        if job.sides == Sides::Double {
            settings.push(table.duplex.to_string());
        }
        if let Some(tray) = tray {
            settings.push(format!("{}{tray}", table.tray_prefix));
        }
        settings
    }

    /// The full argument list (program excluded) for `job`.
    pub fn arguments(&self, job: &SpoolJob) -> Vec<OsString> {
        let settings = self.settings(job);
        match self.platform {
            SpoolerPlatform::Cups => {
                let mut args: Vec<OsString> = vec![
                    "-d".into(),
                    job.printer.as_str().into(),
                    "-n".into(),
                    job.copies.to_string().into(),
                ];
                for setting in settings {
                    args.push("-o".into());
                    args.push(setting.into());
                }
                args.push("--".into());
                args.push(job.file.clone().into_os_string());
                args
            }
            SpoolerPlatform::Sumatra => vec![
                "-print-to".into(),
                job.printer.as_str().into(),
                "-print-settings".into(),
                settings.join(",").into(),
                "-silent".into(),
                job.file.clone().into_os_string(),
            ],
        }
    }
}

/// [`PrintSpooler`] that shells out to `lp` or SumatraPDF.
#[derive(Debug, Clone)]
pub struct CommandSpooler {
    program: String,
    table: OptionTable,
    timeout: Duration,
}

impl CommandSpooler {
    pub fn new(platform: SpoolerPlatform, program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            table: OptionTable::for_platform(platform),
            timeout,
        }
    }

    pub fn command(&self, job: &SpoolJob) -> CommandSpec {
        CommandSpec::new(&self.program, self.timeout).args(self.table.arguments(job))
    }
}

#[async_trait]
impl PrintSpooler for CommandSpooler {
    async fn submit(&self, job: &SpoolJob) -> Result<SpoolerAck, PrintJobError> {
        let printer = job.printer.to_string();
        let spec = self.command(job);
        debug!("Spooling: {}", spec.display());

        let output = process::run(&spec).await.map_err(|e| match e {
            CommandError::TimedOut { timeout, .. } => PrintJobError::DispatchTimeout {
                printer: printer.clone(),
                secs: timeout.as_secs(),
            },
            other => PrintJobError::DispatchFailed {
                printer: printer.clone(),
                reason: other.to_string(),
            },
        })?;

        if !output.success() {
            return Err(PrintJobError::DispatchFailed {
                printer,
                reason: output.failure_summary(),
            });
        }

        let request_id = parse_request_id(&output.stdout);
        info!(
            printer = %printer,
            request_id = request_id.as_deref().unwrap_or("-"),
            "Spooler accepted job"
        );
        Ok(SpoolerAck {
            printer,
            request_id,
        })
    }
}

/// Extract the id from CUPS output: `request id is Office-42 (1 file(s))`.
pub fn parse_request_id(stdout: &str) -> Option<String> {
    const MARKER: &str = "request id is ";
    stdout.lines().find_map(|line| {
        let rest = &line[line.find(MARKER)? + MARKER.len()..];
        rest.split_whitespace().next().map(str::to_string)
    })
}

/// One async lock per printer.
///
/// Jobs for the same printer take turns at the spooler; jobs for different
/// printers do not wait on each other.
#[derive(Debug, Default)]
pub struct PrinterQueues {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PrinterQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `printer`.
    pub async fn acquire(&self, printer: &PrinterTarget) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(printer.as_str().to_string())
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }

    /// Submit `job` once no other job for the same printer is being spooled.
    pub async fn dispatch(
        &self,
        spooler: &dyn PrintSpooler,
        job: &SpoolJob,
    ) -> Result<SpoolerAck, PrintJobError> {
        let result = {
            let _guard = self.acquire(&job.printer).await;
            spooler.submit(job).await
        };
        self.forget_idle(&job.printer);
        result
    }

    /// Drop the lock for `printer` when no job holds or waits on it.
    ///
    /// Waiters clone the lock under the map mutex, so a count of one means
    /// only the map itself still refers to it.
    fn forget_idle(&self, printer: &PrinterTarget) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks
            .get(printer.as_str())
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(printer.as_str());
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn job(sides: Sides, tray: &str) -> SpoolJob {
        SpoolJob {
            printer: PrinterTarget::new("Office_Laser"),
            file: PathBuf::from("/scratch/job/a-processed.pdf"),
            copies: 2,
            sides,
            tray: tray.to_string(),
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn cups_arguments() {
        let table = OptionTable::for_platform(SpoolerPlatform::Cups);
        assert_eq!(
            strings(table.arguments(&job(Sides::Double, "Tray 2"))),
            [
                "-d",
                "Office_Laser",
                "-n",
                "2",
                "-o",
                "sides=two-sided-long-edge",
                "-o",
                "InputSlot=Tray 2",
                "--",
                "/scratch/job/a-processed.pdf"
            ]
        );
    }

    #[test]
    fn cups_single_sided_default_tray_has_no_directives() {
        let table = OptionTable::for_platform(SpoolerPlatform::Cups);
        assert_eq!(
            strings(table.arguments(&job(Sides::Single, DEFAULT_TRAY))),
            ["-d", "Office_Laser", "-n", "2", "--", "/scratch/job/a-processed.pdf"]
        );
    }

    #[test]
    fn sumatra_arguments() {
        let table = OptionTable::for_platform(SpoolerPlatform::Sumatra);
        assert_eq!(
            strings(table.arguments(&job(Sides::Double, "Manual"))),
            [
                "-print-to",
                "Office_Laser",
                "-print-settings",
                "2x,duplex,bin=Manual",
                "-silent",
                "/scratch/job/a-processed.pdf"
            ]
        );
        assert_eq!(
            strings(table.arguments(&job(Sides::Single, ""))),
            [
                "-print-to",
                "Office_Laser",
                "-print-settings",
                "2x",
                "-silent",
                "/scratch/job/a-processed.pdf"
            ]
        );
    }

    #[test]
    fn settings_follow_the_platform_table() {
        let double = job(Sides::Double, "Tray 2");
        assert_eq!(
            OptionTable::for_platform(SpoolerPlatform::Cups).settings(&double),
            ["sides=two-sided-long-edge", "InputSlot=Tray 2"]
        );
        assert_eq!(
            OptionTable::for_platform(SpoolerPlatform::Sumatra).settings(&double),
            ["2x", "duplex", "bin=Tray 2"]
        );
        assert!(OptionTable::for_platform(SpoolerPlatform::Cups)
            .settings(&job(Sides::Single, DEFAULT_TRAY))
            .is_empty());
    }

    #[test]
    fn request_id_is_parsed_from_lp_output() {
        assert_eq!(
            parse_request_id("request id is Office_Laser-118 (1 file(s))\n").as_deref(),
            Some("Office_Laser-118")
        );
        assert_eq!(parse_request_id(""), None);
        assert_eq!(parse_request_id("printing\n"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_exit_is_accepted() {
        let spooler = CommandSpooler::new(SpoolerPlatform::Cups, "true", Duration::from_secs(5));
        let ack = spooler.submit(&job(Sides::Single, DEFAULT_TRAY)).await.unwrap();
        assert_eq!(ack.printer, "Office_Laser");
        assert_eq!(ack.request_id, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_a_dispatch_error() {
        let spooler = CommandSpooler::new(SpoolerPlatform::Cups, "false", Duration::from_secs(5));
        let err = spooler
            .submit(&job(Sides::Single, DEFAULT_TRAY))
            .await
            .unwrap_err();
        assert!(matches!(err, PrintJobError::DispatchFailed { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn missing_spooler_is_a_dispatch_error() {
        let spooler =
            CommandSpooler::new(SpoolerPlatform::Cups, "no-such-lp-binary", Duration::from_secs(5));
        let err = spooler
            .submit(&job(Sides::Single, DEFAULT_TRAY))
            .await
            .unwrap_err();
        assert!(matches!(err, PrintJobError::DispatchFailed { .. }), "got: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_spooler_is_a_dispatch_timeout() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("lp.sh");
        std::fs::write(&program, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let spooler = CommandSpooler::new(
            SpoolerPlatform::Cups,
            program.to_string_lossy(),
            Duration::from_millis(300),
        );
        let err = spooler
            .submit(&job(Sides::Single, DEFAULT_TRAY))
            .await
            .unwrap_err();
        assert!(matches!(err, PrintJobError::DispatchTimeout { .. }), "got: {err}");
        assert_eq!(err.kind(), crate::error::ErrorKind::Dispatch);
    }

    /// Records the peak number of concurrent submissions.
    struct SlowSpooler {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl PrintSpooler for SlowSpooler {
        async fn submit(&self, job: &SpoolJob) -> Result<SpoolerAck, PrintJobError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(SpoolerAck {
                printer: job.printer.to_string(),
                request_id: None,
            })
        }
    }

    fn slow_spooler() -> SlowSpooler {
        SlowSpooler {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_printer_dispatches_never_overlap() {
        let queues = PrinterQueues::new();
        let spooler = slow_spooler();
        let a = job(Sides::Single, DEFAULT_TRAY);
        let b = job(Sides::Double, DEFAULT_TRAY);

        let (ra, rb) = tokio::join!(
            queues.dispatch(&spooler, &a),
            queues.dispatch(&spooler, &b)
        );
        ra.unwrap();
        rb.unwrap();
        assert_eq!(spooler.peak.load(Ordering::SeqCst), 1);
        assert_eq!(queues.tracked(), 0);
    }

    #[tokio::test]
    async fn idle_printer_locks_are_dropped() {
        let queues = PrinterQueues::new();
        let spooler = slow_spooler();
        for name in ["Office_Laser", "Front_Desk", "no-such-printer-123"] {
            let mut j = job(Sides::Single, DEFAULT_TRAY);
            j.printer = PrinterTarget::new(name);
            queues.dispatch(&spooler, &j).await.unwrap();
        }
        assert_eq!(queues.tracked(), 0);

        let held = queues.acquire(&PrinterTarget::new("Office_Laser")).await;
        assert_eq!(queues.tracked(), 1);
        drop(held);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn different_printers_run_concurrently() {
        let queues = PrinterQueues::new();
        let spooler = slow_spooler();
        let a = job(Sides::Single, DEFAULT_TRAY);
        let mut b = a.clone();
        b.printer = PrinterTarget::new("Front_Desk");

        let (ra, rb) = tokio::join!(
            queues.dispatch(&spooler, &a),
            queues.dispatch(&spooler, &b)
        );
        ra.unwrap();
        rb.unwrap();
        assert_eq!(spooler.peak.load(Ordering::SeqCst), 2);
    }
}
