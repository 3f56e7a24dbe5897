//! Printer enumeration.
//!
//! Printers are identified by the name the OS spooler knows them under; the
//! `deviceId` reported to clients is that same name and is passed back
//! unchanged in `POST /print`.

use crate::config::SpoolerPlatform;
use crate::error::PrintJobError;
use crate::process::{self, CommandSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// An installed printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterInfo {
    pub name: String,
    pub device_id: String,
}

impl PrinterInfo {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            device_id: name.clone(),
            name,
        }
    }
}

/// Lists the printers jobs can be sent to.
#[async_trait]
pub trait PrinterDirectory: Send + Sync {
    async fn list(&self) -> Result<Vec<PrinterInfo>, PrintJobError>;
}

/// [`PrinterDirectory`] that asks the OS: `lpstat -e` for CUPS, PowerShell
/// `Get-Printer` on Windows.
#[derive(Debug, Clone)]
pub struct CommandPrinterDirectory {
    spec: CommandSpec,
}

impl CommandPrinterDirectory {
    pub fn new(platform: SpoolerPlatform, timeout: Duration) -> Self {
        let spec = match platform {
            SpoolerPlatform::Cups => CommandSpec::new("lpstat", timeout).arg("-e"),
            SpoolerPlatform::Sumatra => CommandSpec::new("powershell", timeout).args([
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                "Get-Printer | Select-Object -ExpandProperty Name",
            ]),
        };
        Self { spec }
    }

    /// Use an arbitrary command whose stdout lists one printer per line.
    pub fn with_command(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl PrinterDirectory for CommandPrinterDirectory {
    async fn list(&self) -> Result<Vec<PrinterInfo>, PrintJobError> {
        let output = process::run(&self.spec)
            .await
            .map_err(|e| PrintJobError::Internal(format!("Failed to list printers: {e}")))?;
        if !output.success() {
            return Err(PrintJobError::Internal(format!(
                "Failed to list printers: {}",
                output.failure_summary()
            )));
        }
        let printers = parse_printer_names(&output.stdout);
        debug!("Found {} printers", printers.len());
        Ok(printers)
    }
}

/// One printer per non-blank line, duplicates dropped, order kept.
pub fn parse_printer_names(stdout: &str) -> Vec<PrinterInfo> {
    let mut printers: Vec<PrinterInfo> = Vec::new();
    for name in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if !printers.iter().any(|p| p.name == name) {
            printers.push(PrinterInfo::named(name));
        }
    }
    printers
}
