//! Page extraction and rotation on the PDF object graph.
//!
//! Parsing and re-serialising a PDF is CPU-bound, so [`process_pages`] runs
//! on the blocking pool.
//!
//! Pages share fonts, images and resource dictionaries. The source is loaded
//! into memory, unselected pages are deleted and unreachable objects pruned,
//! and the result is written to a new path. The source file is never
//! touched.

use crate::error::PrintJobError;
use crate::order::Orientation;
use crate::pipeline::pages::PageSelection;
use lopdf::{Document, Object, ObjectId};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Suffix appended to the stem of a transformed PDF.
pub const PROCESSED_SUFFIX: &str = "-processed";

/// Parent chains deeper than this are treated as corrupt.
const MAX_TREE_DEPTH: usize = 64;

/// What the transformer produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformSummary {
    /// Page count of the source document.
    pub source_pages: usize,
    /// 1-based source page numbers written to the output, ascending.
    pub kept_pages: Vec<u32>,
    /// Whether a 90° rotation was applied.
    pub rotated: bool,
}

/// `report.pdf` → `report-processed.pdf`, in the same directory.
pub fn processed_path(src: &Path) -> PathBuf {
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    src.with_file_name(format!("{stem}{PROCESSED_SUFFIX}.pdf"))
}

/// Write the selected pages of `src` to `dest`, rotated for landscape output
/// when requested.
///
/// # Errors
/// * [`PrintJobError::CorruptPdf`] when `src` cannot be parsed or `dest`
///   cannot be written.
/// * [`PrintJobError::NoPagesSelected`] when the selection matches no page.
pub async fn process_pages(
    src: &Path,
    dest: &Path,
    selection: &PageSelection,
    orientation: Orientation,
) -> Result<TransformSummary, PrintJobError> {
    let src = src.to_path_buf();
    let dest = dest.to_path_buf();
    let selection = selection.clone();

    tokio::task::spawn_blocking(move || process_pages_blocking(&src, &dest, &selection, orientation))
        .await
        .map_err(|e| PrintJobError::Internal(format!("Transform task panicked: {}", e)))?
}

/// Blocking implementation of [`process_pages`].
pub fn process_pages_blocking(
    src: &Path,
    dest: &Path,
    selection: &PageSelection,
    orientation: Orientation,
) -> Result<TransformSummary, PrintJobError> {
    let corrupt = |detail: String| PrintJobError::CorruptPdf {
        path: src.to_path_buf(),
        detail,
    };

    let mut document = Document::load(src).map_err(|e| corrupt(e.to_string()))?;
    let pages = document.get_pages();
    let source_pages = pages.len();
    if source_pages == 0 {
        return Err(corrupt("document has no pages".to_string()));
    }
    info!("PDF loaded: {} pages", source_pages);

    let selected = selection.resolve(source_pages);
    if selected.is_empty() {
        return Err(PrintJobError::NoPagesSelected {
            selection: selection.to_string(),
            total: source_pages,
        });
    }

    let rotate = orientation == Orientation::Landscape;
    // Resolve rotations before pages are removed from the tree.
    let mut rotations: Vec<(ObjectId, i64)> = Vec::with_capacity(selected.len());
    if rotate {
        for &page_num in selected.pages() {
            if let Some(&page_id) = pages.get(&page_num) {
                let current = effective_rotation(&document, page_id).map_err(corrupt)?;
                rotations.push((page_id, (current + 90).rem_euclid(360)));
            }
        }
    }

    let dropped: Vec<u32> = pages
        .keys()
        .copied()
        .filter(|n| !selected.contains(*n))
        .collect();
    if !dropped.is_empty() {
        debug!("Dropping {} of {} pages", dropped.len(), source_pages);
        document.delete_pages(&dropped);
        document.prune_objects();
    }

    for (page_id, degrees) in rotations {
        let page = document
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| corrupt(e.to_string()))?;
        page.set("Rotate", Object::Integer(degrees));
    }

    document.save(dest).map_err(|e| PrintJobError::CorruptPdf {
        path: dest.to_path_buf(),
        detail: format!("failed to write output: {e}"),
    })?;

    info!(
        "Wrote {} pages to {}{}",
        selected.len(),
        dest.display(),
        if rotate { " (rotated 90°)" } else { "" }
    );

    Ok(TransformSummary {
        source_pages,
        kept_pages: selected.pages().to_vec(),
        rotated: rotate,
    })
}

/// The `/Rotate` value in effect for a page, following inheritance up the
/// page tree. Missing everywhere means 0.
fn effective_rotation(document: &Document, page_id: ObjectId) -> Result<i64, String> {
    let mut node_id = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let node = document
            .get_dictionary(node_id)
            .map_err(|e| format!("page tree node {node_id:?}: {e}"))?;
        if let Ok(value) = node.get(b"Rotate") {
            return rotation_value(document, value);
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => node_id = parent,
            Err(_) => return Ok(0),
        }
    }
    Err(format!("page tree deeper than {MAX_TREE_DEPTH} levels"))
}

fn rotation_value(document: &Document, value: &Object) -> Result<i64, String> {
    match value {
        Object::Integer(v) => Ok(*v),
        Object::Real(v) => Ok(f64::from(*v).round() as i64),
        Object::Reference(id) => {
            let target = document
                .get_object(*id)
                .map_err(|e| format!("rotation reference {id:?}: {e}"))?;
            match target {
                Object::Reference(_) => Err("nested rotation reference".to_string()),
                other => rotation_value(document, other),
            }
        }
        other => Err(format!("invalid /Rotate value {other:?}")),
    }
}
