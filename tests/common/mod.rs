//! Shared fixtures for integration tests: in-process fakes of the
//! collaborator traits, a PDF builder and a local file server.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use lopdf::{Dictionary, Document, Object, Stream};
use print_relay::{
    OrderStore, PipelineConfig, PrintJobError, PrintService, PrintSpooler, PrinterDirectory,
    PrinterInfo, SpoolJob, SpoolerAck, StoreError,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── PDFs ─────────────────────────────────────────────────────────────────────

/// Build a PDF with `total` pages. Page `n` has MediaBox width `600 + n` so
/// the original page number survives extraction; `tree_rotate` goes on the
/// page-tree root and is inherited by every page.
pub fn sample_pdf(total: u32, tree_rotate: Option<i64>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();

    for n in 1..=total {
        let content = format!("BT /F1 12 Tf 72 720 Td (Page {n}) Tj ET");
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let page = Dictionary::from_iter([
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            ("Contents", Object::Reference(content_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    0.into(),
                    0.into(),
                    Object::Integer(600 + i64::from(n)),
                    792.into(),
                ]),
            ),
        ]);
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let mut tree = Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Kids", Object::Array(kids)),
        ("Count", Object::Integer(i64::from(total))),
    ]);
    if let Some(r) = tree_rotate {
        tree.set("Rotate", Object::Integer(r));
    }
    doc.objects.insert(pages_id, Object::Dictionary(tree));

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// `(original page number, page /Rotate)` for every page of a PDF. Only
/// rotations set on the page itself are reported; inherited values show up
/// as `None`.
pub fn page_summary(path: &Path) -> Vec<(i64, Option<i64>)> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .values()
        .map(|&id| {
            let page = doc.get_dictionary(id).unwrap();
            let media = page.get(b"MediaBox").unwrap().as_array().unwrap();
            let width = media[2].as_i64().unwrap();
            let rotate = page.get(b"Rotate").ok().and_then(|r| r.as_i64().ok());
            (width - 600, rotate)
        })
        .collect()
}

// ── File server ──────────────────────────────────────────────────────────────

/// Serve `files` at `http://127.0.0.1:<port>/files/<name>`; unknown names 404.
/// Returns the base URL without a trailing slash.
pub async fn serve_files(files: HashMap<String, Vec<u8>>) -> String {
    let files = Arc::new(files);
    let app = Router::new()
        .route(
            "/files/{name}",
            get(
                |State(files): State<Arc<HashMap<String, Vec<u8>>>>, UrlPath(name): UrlPath<String>| async move {
                    match files.get(&name) {
                        Some(bytes) => Ok(bytes.clone()),
                        None => Err(StatusCode::NOT_FOUND),
                    }
                },
            ),
        )
        .with_state(files);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Spooler that copies every submitted file into `capture_dir` and tracks
/// how many submissions overlap.
pub struct CapturingSpooler {
    capture_dir: PathBuf,
    pub submitted: Mutex<Vec<SpoolJob>>,
    pub captured: Mutex<Vec<PathBuf>>,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    delay: Duration,
    fail: bool,
}

impl CapturingSpooler {
    pub fn new(capture_dir: &Path) -> Self {
        std::fs::create_dir_all(capture_dir).unwrap();
        Self {
            capture_dir: capture_dir.to_path_buf(),
            submitted: Mutex::new(Vec::new()),
            captured: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl PrintSpooler for CapturingSpooler {
    async fn submit(&self, job: &SpoolJob) -> Result<SpoolerAck, PrintJobError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let index = {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(job.clone());
            submitted.len()
        };
        let copy = self.capture_dir.join(format!("{index}.bin"));
        std::fs::copy(&job.file, &copy).unwrap();
        self.captured.lock().unwrap().push(copy);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(PrintJobError::DispatchFailed {
                printer: job.printer.to_string(),
                reason: "lp: printer is offline".into(),
            });
        }
        Ok(SpoolerAck {
            printer: job.printer.to_string(),
            request_id: Some(format!("{}-{index}", job.printer)),
        })
    }
}

#[derive(Default)]
pub struct RecordingStore {
    pub deleted: Mutex<Vec<String>>,
}

#[async_trait]
impl OrderStore for RecordingStore {
    async fn delete_order(&self, order_id: &str) -> Result<(), StoreError> {
        self.deleted.lock().unwrap().push(format!("order:{order_id}"));
        Ok(())
    }

    async fn delete_blob(&self, blob_path: &str) -> Result<(), StoreError> {
        self.deleted.lock().unwrap().push(format!("blob:{blob_path}"));
        Ok(())
    }
}

pub struct StaticPrinters(pub Option<Vec<&'static str>>);

#[async_trait]
impl PrinterDirectory for StaticPrinters {
    async fn list(&self) -> Result<Vec<PrinterInfo>, PrintJobError> {
        match &self.0 {
            Some(names) => Ok(names.iter().map(|n| PrinterInfo::named(*n)).collect()),
            None => Err(PrintJobError::Internal("lpstat: scheduler not running".into())),
        }
    }
}

/// Write an executable that ignores its arguments and sleeps far longer than
/// any test timeout.
#[cfg(unix)]
pub fn hanging_program(dir: &Path, name: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

// ── Service ──────────────────────────────────────────────────────────────────

/// Route library logs to the test harness; `RUST_LOG=debug` shows stages.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub root: tempfile::TempDir,
    pub spooler: Arc<CapturingSpooler>,
    pub store: Arc<RecordingStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_spooler(|dir| CapturingSpooler::new(dir))
    }

    pub fn with_spooler(make: impl FnOnce(&Path) -> CapturingSpooler) -> Self {
        init_tracing();
        let root = tempfile::tempdir().unwrap();
        let spooler = Arc::new(make(&root.path().join("captured")));
        Self {
            root,
            spooler,
            store: Arc::default(),
        }
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.root.path().join("scratch")
    }

    /// Base config pointing scratch storage into the harness directory.
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig::builder()
            .scratch_dir(self.scratch_dir())
            .download_timeout_secs(10)
            .build()
            .unwrap()
    }

    pub fn service(&self) -> PrintService {
        self.service_with(self.config())
    }

    pub fn service_with(&self, config: PipelineConfig) -> PrintService {
        PrintService::builder(config)
            .spooler(self.spooler.clone())
            .store(self.store.clone())
            .printers(Arc::new(StaticPrinters(Some(vec!["Office_Laser", "Front_Desk"]))))
            .build()
            .unwrap()
    }

    /// True when no job directory is left under the scratch root.
    pub fn scratch_is_clean(&self) -> bool {
        std::fs::read_dir(self.scratch_dir())
            .map(|mut d| d.next().is_none())
            .unwrap_or(true)
    }
}
