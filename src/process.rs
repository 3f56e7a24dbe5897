//! Running external programs (conversion engine, spooler, printer listing)
//! with a time budget.
//!
//! Children are spawned with `kill_on_drop`, so when the timeout fires and
//! the wait future is dropped the process is killed rather than left running
//! in the background.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// A command line to execute.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Render the command line for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Result of a command that ran to completion.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// A one-line summary of why the command failed, for error messages.
    pub fn failure_summary(&self) -> String {
        let status = match self.exit_code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        let detail = self
            .stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .find(|l| !l.is_empty());
        match detail {
            Some(line) => format!("{status}: {line}"),
            None => status,
        }
    }
}

/// Why a command could not produce a [`CommandOutput`].
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' did not finish within {}s", .timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("failed waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run `spec` and capture its output.
///
/// A non-zero exit is *not* an error here; callers decide what a failure
/// means for their stage via [`CommandOutput::success`].
pub async fn run(spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }

    debug!("Running: {}", spec.display());
    let start = Instant::now();
    let child = command.spawn().map_err(|source| CommandError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let output = tokio::time::timeout(spec.timeout, child.wait_with_output())
        .await
        .map_err(|_| CommandError::TimedOut {
            program: spec.program.clone(),
            timeout: spec.timeout,
        })?
        .map_err(|source| CommandError::Wait {
            program: spec.program.clone(),
            source,
        })?;

    let result = CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms: start.elapsed().as_millis() as u64,
    };
    debug!(
        "'{}' exited with {:?} after {}ms",
        spec.program, result.exit_code, result.duration_ms
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_arguments() {
        let spec = CommandSpec::new("lp", Duration::from_secs(1))
            .arg("-d")
            .arg("Office")
            .args(["--", "a.pdf"]);
        assert_eq!(spec.display(), "lp -d Office -- a.pdf");
    }

    #[test]
    fn failure_summary_prefers_stderr() {
        let out = CommandOutput {
            exit_code: Some(1),
            stdout: "ignored\n".into(),
            stderr: "\nlp: The printer or class does not exist.\n".into(),
            duration_ms: 3,
        };
        assert_eq!(
            out.failure_summary(),
            "exit status 1: lp: The printer or class does not exist."
        );
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let spec = CommandSpec::new("definitely-not-a-real-program-xyz", Duration::from_secs(5));
        let err = run(&spec).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }), "got: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let spec = CommandSpec::new("sh", Duration::from_secs(5))
            .arg("-c")
            .arg("echo out; echo err >&2; exit 3");
        let out = run(&spec).await.unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_program_times_out() {
        let spec = CommandSpec::new("sleep", Duration::from_millis(200)).arg("5");
        let start = Instant::now();
        let err = run(&spec).await.unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }), "got: {err}");
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
