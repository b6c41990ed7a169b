//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::warn;

use super::AppState;
use super::types::{ErrorResponse, HealthResponse, ReconcileRequest, ReportResponse};
use crate::error::ReconcileError;
use crate::reconcile::{CancelToken, SimulationContext};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Liveness probe.
///
/// `GET /health` → 200 + `HealthResponse` JSON
pub async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Reconciles a run directory on the blocking pool.
///
/// `POST /reconcile` → 200 + `ReportResponse` JSON (including fatal runs,
/// which carry `status: "error"`)
/// - unknown directory → 404
/// - `period_days` of 0 → 400
/// - pass exceeds the time budget → 504, and the pass is cancelled
pub async fn post_reconcile(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReconcileRequest>,
) -> Result<Json<ReportResponse>, ApiError> {
    let period_days = req.period_days.unwrap_or(365);
    if period_days == 0 {
        return Err(error(StatusCode::BAD_REQUEST, "`period_days` must be > 0"));
    }
    let mut ctx = SimulationContext::new(period_days);
    if let Some(model) = req.input_model {
        ctx = ctx.with_input_model(model);
    }

    let cancel = CancelToken::new();
    let task = {
        let state = Arc::clone(&state);
        let cancel = cancel.clone();
        let run_dir = req.run_dir;
        tokio::task::spawn_blocking(move || state.reconciler.reconcile(&run_dir, &ctx, &cancel))
    };

    let outcome = match tokio::time::timeout(state.timeout, task).await {
        Ok(joined) => joined,
        Err(_) => {
            cancel.cancel();
            warn!(timeout = ?state.timeout, "reconciliation timed out");
            return Err(error(StatusCode::GATEWAY_TIMEOUT, "reconciliation timed out"));
        }
    };

    match outcome {
        Ok(Ok(report)) => Ok(Json(ReportResponse::from(report))),
        Ok(Err(e @ (ReconcileError::NotFound { .. } | ReconcileError::NotADirectory(_)))) => {
            Err(error(StatusCode::NOT_FOUND, e.to_string()))
        }
        Ok(Err(ReconcileError::Cancelled)) => Err(error(
            StatusCode::GATEWAY_TIMEOUT,
            "reconciliation cancelled",
        )),
        Err(e) => Err(error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("reconciliation task failed: {e}"),
        )),
    }
}
