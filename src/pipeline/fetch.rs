//! Fetch: copy the order's document into the job's scratch directory.
//!
//! The file name, and therefore the extension that decides whether the
//! normaliser runs, comes from the URL path with the query string stripped.
//! Blob-store URLs usually percent-encode the object path
//! (`.../o/orders%2F42%2Fthesis.docx?alt=media`), so the last segment is
//! decoded and only its final component kept. Response headers are not
//! consulted.

use crate::error::PrintJobError;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Used when neither the URL nor the order yields a usable file name.
pub const FALLBACK_FILE_NAME: &str = "document.pdf";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Shared HTTP client for downloads.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client, PrintJobError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PrintJobError::Internal(format!("Failed to build HTTP client: {e}")))
}

/// Derive the scratch file name for a document.
///
/// Order of preference: last URL path component, the order's `file_name`,
/// then [`FALLBACK_FILE_NAME`]. Names without an extension are skipped.
pub fn file_name_for(url: &str, file_name: Option<&str>) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path_part = if is_url(without_query) {
        reqwest::Url::parse(without_query)
            .ok()
            .and_then(|u| u.path_segments().and_then(|mut s| s.next_back().map(str::to_string)))
            .unwrap_or_default()
    } else {
        without_query.to_string()
    };

    let decoded = urlencoding::decode(&path_part)
        .map(|s| s.into_owned())
        .unwrap_or(path_part);

    let name = [Some(decoded.as_str()), file_name]
        .into_iter()
        .flatten()
        .map(sanitize)
        .find(|name| has_extension(name))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
    name
}

/// Keep only the final path component and replace characters that are
/// awkward on command lines or not allowed on Windows.
fn sanitize(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    last.chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

fn has_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| !ext.is_empty())
        && Path::new(name).file_stem().is_some_and(|s| !s.is_empty())
}

/// Lower-case extension of `path`, without the dot.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Fetch `source` into `dest`. URLs are downloaded, anything else is
/// treated as a local path and copied.
///
/// Returns the number of bytes written.
pub async fn fetch_document(
    client: &reqwest::Client,
    source: &str,
    dest: &Path,
    timeout_secs: u64,
) -> Result<u64, PrintJobError> {
    if is_url(source) {
        download_url(client, source, dest, timeout_secs).await
    } else {
        copy_local(source, dest).await
    }
}

/// Download a URL to `dest`, streaming the body to disk.
async fn download_url(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    timeout_secs: u64,
) -> Result<u64, PrintJobError> {
    info!("Downloading document from: {}", url);

    let transport_error = |e: reqwest::Error| {
        if e.is_timeout() {
            PrintJobError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PrintJobError::DownloadFailed {
                url: url.to_string(),
                status: e.status().map(|s| s.as_u16()),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(PrintJobError::DownloadFailed {
            url: url.to_string(),
            status: Some(status.as_u16()),
            reason: format!("HTTP {}", status),
        });
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|source| PrintJobError::Scratch {
            path: dest.to_path_buf(),
            source,
        })?;

    let write_error = |source| PrintJobError::Scratch {
        path: dest.to_path_buf(),
        source,
    };

    let mut written = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(transport_error)?;
        file.write_all(&chunk).await.map_err(write_error)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(write_error)?;

    info!("Downloaded {} bytes to: {}", written, dest.display());
    Ok(written)
}

/// Copy a local file into scratch storage.
async fn copy_local(source: &str, dest: &Path) -> Result<u64, PrintJobError> {
    let path = Path::new(source);
    if !path.is_file() {
        return Err(PrintJobError::DownloadFailed {
            url: source.to_string(),
            status: None,
            reason: "file not found".to_string(),
        });
    }

    let written = tokio::fs::copy(path, dest)
        .await
        .map_err(|e| PrintJobError::DownloadFailed {
            url: source.to_string(),
            status: None,
            reason: e.to_string(),
        })?;
    debug!("Copied local file {} → {}", path.display(), dest.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn file_name_strips_query() {
        assert_eq!(
            file_name_for("https://files.example/shop/report.docx?token=abc&x=1", None),
            "report.docx"
        );
    }

    #[test]
    fn file_name_decodes_blob_paths() {
        let url = "https://firebasestorage.googleapis.com/v0/b/app.appspot.com/o/orders%2F42%2FMy%20Thesis.docx?alt=media&token=t";
        assert_eq!(file_name_for(url, None), "My Thesis.docx");
    }

    #[test]
    fn file_name_falls_back_to_order_name_then_default() {
        assert_eq!(
            file_name_for("https://files.example/download", Some("poster.pdf")),
            "poster.pdf"
        );
        assert_eq!(file_name_for("https://files.example/", None), FALLBACK_FILE_NAME);
        assert_eq!(
            file_name_for("https://files.example/download", Some("noext")),
            FALLBACK_FILE_NAME
        );
    }

    #[test]
    fn file_name_is_sanitised() {
        assert_eq!(
            file_name_for("https://x/o/..%2F..%2Fetc%2Fpasswd.pdf", None),
            "passwd.pdf"
        );
        assert_eq!(file_name_for("https://x/a%3Ab.pdf", None), "a_b.pdf");
        assert_eq!(file_name_for("https://x/.pdf", None), FALLBACK_FILE_NAME);
    }

    #[test]
    fn local_paths_keep_their_name() {
        assert_eq!(file_name_for("/home/shop/in/flyer.odt", None), "flyer.odt");
    }

    #[test]
    fn extension_is_lower_cased() {
        assert_eq!(extension_of(Path::new("/a/B.DOCX")), "docx");
        assert_eq!(extension_of(Path::new("/a/noext")), "");
    }

    #[tokio::test]
    async fn missing_local_file_is_a_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = http_client(5).unwrap();
        let err = fetch_document(&client, "/no/such/file.pdf", &dir.path().join("x.pdf"), 5)
            .await
            .unwrap_err();
        assert!(
            matches!(err, PrintJobError::DownloadFailed { status: None, .. }),
            "got: {err}"
        );
    }

    #[tokio::test]
    async fn local_file_is_copied_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.pdf");
        std::fs::write(&src, b"%PDF-1.4 bytes").unwrap();
        let dest = dir.path().join("out.pdf");

        let client = http_client(5).unwrap();
        let n = fetch_document(&client, src.to_str().unwrap(), &dest, 5)
            .await
            .unwrap();
        assert_eq!(n, 14);
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.4 bytes");
    }
}
