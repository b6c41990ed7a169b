//! API request and response types.
//!
//! The response flattens the breakdown into a list so clients do not depend
//! on map-key ordering.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::reconcile::derived::PerformanceRating;
use crate::report::{DiagnosticsBundle, SimulationReport, Status, Warning};
use crate::thermal::ThermalDescriptors;

/// `POST /reconcile` body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileRequest {
    /// Directory holding the run's artifacts.
    pub run_dir: PathBuf,
    /// Simulated period length; defaults to a full year.
    pub period_days: Option<u32>,
    /// Input model for thermal descriptors.
    pub input_model: Option<PathBuf>,
}

/// One breakdown category.
#[derive(Debug, Serialize)]
pub struct BreakdownEntry {
    pub end_use: &'static str,
    pub kwh: f64,
    /// Share of the total (percent), when a total is known.
    pub share_pct: Option<f64>,
}

/// `POST /reconcile` response.
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub status: Status,
    pub total_energy_kwh: Option<f64>,
    pub breakdown: Vec<BreakdownEntry>,
    pub floor_area_m2: Option<f64>,
    pub energy_use_intensity: Option<f64>,
    pub peak_demand_kw: Option<f64>,
    pub performance_rating: Option<PerformanceRating>,
    pub performance_score: Option<u8>,
    pub extraction_method: String,
    pub low_confidence: bool,
    pub warnings: Vec<Warning>,
    pub fatal_errors: Vec<String>,
    pub thermal: Option<ThermalDescriptors>,
    pub period_days: u32,
    pub diagnostics: DiagnosticsBundle,
    /// RFC 3339 timestamp.
    pub generated_at: String,
}

impl From<SimulationReport> for ReportResponse {
    fn from(r: SimulationReport) -> Self {
        let shares = r.breakdown_shares();
        let breakdown = r
            .breakdown
            .iter()
            .map(|(end_use, kwh)| BreakdownEntry {
                end_use: end_use.as_str(),
                kwh: *kwh,
                share_pct: shares.get(end_use).copied(),
            })
            .collect();
        Self {
            status: r.status,
            total_energy_kwh: r.total_energy_kwh,
            breakdown,
            floor_area_m2: r.floor_area_m2,
            energy_use_intensity: r.energy_use_intensity,
            peak_demand_kw: r.peak_demand_kw,
            performance_rating: r.performance_rating,
            performance_score: r.performance_score,
            extraction_method: r.extraction_method,
            low_confidence: r.low_confidence,
            warnings: r.warnings,
            fatal_errors: r.fatal_errors,
            thermal: r.thermal,
            period_days: r.period_days,
            diagnostics: r.diagnostics,
            generated_at: r.generated_at.to_rfc3339(),
        }
    }
}

/// `GET /health` response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}
