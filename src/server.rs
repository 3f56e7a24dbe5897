//! HTTP surface for the shop dashboard.
//!
//! | Method | Path        | Body / Response                                   |
//! |--------|-------------|---------------------------------------------------|
//! | GET    | `/printers` | `[{ "name", "deviceId" }]`                        |
//! | POST   | `/print`    | [`PrintSubmission`] → [`PrintAccepted`] or error  |
//! | GET    | `/health`   | `{ "status": "ok" }`                              |
//!
//! `POST /print` answers only after the job has finished, so the response
//! carries the final state. Validation failures are `400` and run no stage;
//! pipeline failures are `500` with the error kind and stage.

use crate::error::PrintJobError;
use crate::job::{JobReport, JobState, PrintService, Stage};
use crate::order::PrintSubmission;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Body of a successful `POST /print`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintAccepted {
    pub success: bool,
    pub message: String,
    pub job_id: String,
    pub state: JobState,
    pub spooler_request: Option<String>,
    pub warnings: Vec<String>,
}

impl From<JobReport> for PrintAccepted {
    fn from(report: JobReport) -> Self {
        Self {
            success: true,
            message: format!("Print job sent to {}", report.printer),
            job_id: report.job_id,
            state: report.state,
            spooler_request: report.ack.request_id,
            warnings: report.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Body of a failed `POST /print`.
#[derive(Debug, Serialize)]
pub struct PrintFailed {
    pub error: String,
    /// Taxonomy name, e.g. `ConversionError`.
    pub kind: String,
    pub stage: Option<Stage>,
}

/// Maps pipeline errors onto HTTP responses.
#[derive(Debug)]
pub struct ApiError(PrintJobError);

impl From<PrintJobError> for ApiError {
    fn from(e: PrintJobError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = self.0;
        if e.is_client_error() {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
        }
        let body = PrintFailed {
            error: e.to_string(),
            kind: e.kind().to_string(),
            stage: e.stage(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// Build the router around a shared service.
pub fn router(service: Arc<PrintService>) -> Router {
    Router::new()
        .route("/printers", get(list_printers))
        .route("/print", post(print))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Serve until Ctrl-C.
pub async fn serve(service: Arc<PrintService>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            // A failed signal handler just means we never shut down gracefully.
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
}

async fn list_printers(State(service): State<Arc<PrintService>>) -> Response {
    match service.list_printers().await {
        Ok(printers) => Json(printers).into_response(),
        Err(e) => {
            error!("Failed to list printers: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to fetch printers" })),
            )
                .into_response()
        }
    }
}

async fn print(
    State(service): State<Arc<PrintService>>,
    body: Result<Json<PrintSubmission>, JsonRejection>,
) -> Result<Json<PrintAccepted>, ApiError> {
    let Json(submission) = body.map_err(|e| PrintJobError::validation(e.body_text()))?;
    let report = service.submit(submission).await?;
    Ok(Json(report.into()))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn validation_maps_to_400() {
        let resp = ApiError(PrintJobError::validation("Missing printerId or fileURL")).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn pipeline_errors_map_to_500() {
        let resp = ApiError(PrintJobError::DispatchFailed {
            printer: "P".into(),
            reason: "offline".into(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn failure_body_names_kind_and_stage() {
        let body = PrintFailed {
            error: "x".into(),
            kind: ErrorKind::Conversion.to_string(),
            stage: Some(Stage::Normalize),
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({ "error": "x", "kind": "ConversionError", "stage": "normalize" })
        );
    }
}
