//! REST API for on-demand reconciliation.
//!
//! - `POST /reconcile`: reconcile a run directory and return the report
//! - `GET /health`: liveness probe

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tracing::info;

use crate::reconcile::Reconciler;

pub use types::{BreakdownEntry, ErrorResponse, HealthResponse, ReconcileRequest, ReportResponse};

/// Default time budget for one reconciliation pass.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// State shared across all request handlers.
///
/// The reconciler holds only configuration, so no locks are needed.
pub struct AppState {
    pub reconciler: Reconciler,
    /// Passes exceeding this are cancelled and answered with 504.
    pub timeout: Duration,
}

impl AppState {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/reconcile", post(handlers::post_reconcile))
        .route("/health", get(handlers::get_health))
        .with_state(state)
}

/// Binds to the given address and serves the API.
///
/// # Panics
///
/// Panics if the TCP listener cannot bind to `addr`.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind to {addr}: {e}"));
    info!(%addr, "API server listening");
    axum::serve(listener, app)
        .await
        .unwrap_or_else(|e| panic!("server error: {e}"));
}
