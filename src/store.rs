//! Completion signalling to the order store.
//!
//! After a job is dispatched the order record and the uploaded blob are
//! deleted so the order disappears from the shop's queue. Both deletes are
//! best-effort: failures come back as
//! [`CompletionWarning`](crate::error::CompletionWarning)s and never turn a
//! printed job into a failed one.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Why a completion delete failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order store answered HTTP {status}")]
    Status { status: u16 },

    #[error("order store unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Deletes fulfilled orders and their uploaded files.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn delete_order(&self, order_id: &str) -> Result<(), StoreError>;
    async fn delete_blob(&self, blob_path: &str) -> Result<(), StoreError>;
}

/// Store used when no order store is configured. Logs and succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOrderStore;

#[async_trait]
impl OrderStore for NoopOrderStore {
    async fn delete_order(&self, order_id: &str) -> Result<(), StoreError> {
        debug!("No order store configured; keeping order {}", order_id);
        Ok(())
    }

    async fn delete_blob(&self, blob_path: &str) -> Result<(), StoreError> {
        debug!("No order store configured; keeping blob {}", blob_path);
        Ok(())
    }
}

/// Order store reached over HTTP.
///
/// * `DELETE {base}/orders/{order_id}`
/// * `DELETE {base}/blobs/{blob_path}` (the path is sent as one encoded segment)
///
/// `404 Not Found` counts as success: the record is gone either way.
#[derive(Debug, Clone)]
pub struct RestOrderStore {
    client: reqwest::Client,
    base_url: String,
}

impl RestOrderStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn order_url(&self, order_id: &str) -> String {
        format!("{}/orders/{}", self.base_url, urlencoding::encode(order_id))
    }

    fn blob_url(&self, blob_path: &str) -> String {
        format!("{}/blobs/{}", self.base_url, urlencoding::encode(blob_path))
    }

    async fn delete(&self, url: &str) -> Result<(), StoreError> {
        let response = self.client.delete(url).send().await?;
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            info!("Deleted {}", url);
            Ok(())
        } else {
            Err(StoreError::Status {
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl OrderStore for RestOrderStore {
    async fn delete_order(&self, order_id: &str) -> Result<(), StoreError> {
        self.delete(&self.order_url(order_id)).await
    }

    async fn delete_blob(&self, blob_path: &str) -> Result<(), StoreError> {
        self.delete(&self.blob_url(blob_path)).await
    }
}
