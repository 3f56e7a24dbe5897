//! Per-job scratch storage.
//!
//! Every job owns a fresh directory `<scratch_root>/job-<id>-XXXXXX/`, so two
//! jobs printing files with the same name never collide. Each file a stage
//! creates is registered here *before* the stage writes it, which means a
//! half-written file left behind by a failing stage is still cleaned up.
//!
//! [`ScratchSpace::release`] removes the registered files and the directory
//! and reports anything it could not remove. If a job future is dropped
//! before it gets that far (client disconnect, shutdown), the inner
//! [`TempDir`] removes the directory on drop instead.

use crate::error::{CompletionWarning, PrintJobError};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// The pipeline stage that produced a scratch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArtifactKind {
    Downloaded,
    Converted,
    Transformed,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::Downloaded => "downloaded",
            ArtifactKind::Converted => "converted",
            ArtifactKind::Transformed => "transformed",
        })
    }
}

/// A file created by one stage and consumed by the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

/// Scratch directory of a single job.
pub struct ScratchSpace {
    dir: Option<TempDir>,
    path: PathBuf,
    artifacts: Vec<ScratchArtifact>,
}

impl ScratchSpace {
    /// Create the job directory under `root`, creating `root` if needed.
    pub async fn create(root: &Path, job_id: &str) -> Result<Self, PrintJobError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| PrintJobError::Scratch {
                path: root.to_path_buf(),
                source,
            })?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("job-{job_id}-"))
            .tempdir_in(root)
            .map_err(|source| PrintJobError::Scratch {
                path: root.to_path_buf(),
                source,
            })?;
        let path = dir.path().to_path_buf();
        debug!("Scratch directory: {}", path.display());

        Ok(Self {
            dir: Some(dir),
            path,
            artifacts: Vec::new(),
        })
    }

    /// The job directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register `file_name` inside the job directory and return its path.
    ///
    /// Registering the same path twice is a no-op.
    pub fn register(&mut self, kind: ArtifactKind, file_name: &str) -> PathBuf {
        let path = self.path.join(file_name);
        self.register_path(kind, path.clone());
        path
    }

    /// Register a path chosen by someone else (e.g. the conversion engine).
    pub fn register_path(&mut self, kind: ArtifactKind, path: PathBuf) {
        if self.artifacts.iter().any(|a| a.path == path) {
            return;
        }
        debug!("Registered {} artifact {}", kind, path.display());
        self.artifacts.push(ScratchArtifact { kind, path });
    }

    pub fn artifacts(&self) -> &[ScratchArtifact] {
        &self.artifacts
    }

    /// Delete every registered artifact and the job directory.
    ///
    /// Never fails: anything that could not be removed is logged and
    /// returned as a warning.
    pub async fn release(mut self) -> Vec<CompletionWarning> {
        let mut warnings = Vec::new();

        for artifact in self.artifacts.drain(..) {
            match tokio::fs::remove_file(&artifact.path).await {
                Ok(()) => debug!("Removed {} artifact {}", artifact.kind, artifact.path.display()),
                // A stage that failed before writing leaves nothing behind.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Could not remove {}: {}", artifact.path.display(), e);
                    warnings.push(CompletionWarning::ScratchRemoval {
                        path: artifact.path,
                        detail: e.to_string(),
                    });
                }
            }
        }

        // Whatever is left (engine profiles, lock files) goes with the directory.
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            let result = tokio::task::spawn_blocking(move || dir.close()).await;
            let failure = match result {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(format!("cleanup task panicked: {e}")),
            };
            if let Some(detail) = failure {
                warn!("Could not remove scratch directory {}: {}", path.display(), detail);
                warnings.push(CompletionWarning::ScratchRemoval { path, detail });
            }
        }

        warnings
    }
}

impl fmt::Debug for ScratchSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchSpace")
            .field("path", &self.path)
            .field("artifacts", &self.artifacts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_missing_root_and_unique_job_dirs() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("does/not/exist");

        let a = ScratchSpace::create(&nested, "same").await.unwrap();
        let b = ScratchSpace::create(&nested, "same").await.unwrap();

        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn release_removes_registered_files_and_directory() {
        let root = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::create(root.path(), "j1").await.unwrap();

        let downloaded = scratch.register(ArtifactKind::Downloaded, "report.docx");
        let converted = scratch.register(ArtifactKind::Converted, "report.pdf");
        std::fs::write(&downloaded, b"docx").unwrap();
        std::fs::write(&converted, b"%PDF-1.5").unwrap();
        // Something the engine left behind without registering it.
        std::fs::write(scratch.path().join("lock"), b"").unwrap();

        let dir = scratch.path().to_path_buf();
        let warnings = scratch.release().await;

        assert!(warnings.is_empty(), "{warnings:?}");
        assert!(!downloaded.exists());
        assert!(!converted.exists());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn unwritten_artifacts_are_not_warnings() {
        let root = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::create(root.path(), "j2").await.unwrap();
        scratch.register(ArtifactKind::Transformed, "never-written.pdf");

        assert!(scratch.release().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_registration_is_ignored() {
        let root = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::create(root.path(), "j3").await.unwrap();
        scratch.register(ArtifactKind::Downloaded, "a.pdf");
        let again = scratch.path().join("a.pdf");
        scratch.register_path(ArtifactKind::Downloaded, again);

        assert_eq!(scratch.artifacts().len(), 1);
    }

    #[tokio::test]
    async fn drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = {
            let mut scratch = ScratchSpace::create(root.path(), "j4").await.unwrap();
            let file = scratch.register(ArtifactKind::Downloaded, "a.pdf");
            std::fs::write(file, b"%PDF").unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!dir.exists());
    }
}
