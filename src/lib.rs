//! Reconciliation of building-energy simulation artifacts into one
//! canonical energy report.

pub mod artifacts;
pub mod config;
pub mod error;
/// Per-format extractors and the shared partial-record types.
pub mod extract;
pub mod io;
/// Merge fold, plausibility correction, and derived metrics.
pub mod reconcile;
pub mod report;
pub mod thermal;
pub mod units;

#[cfg(feature = "api")]
pub mod api;

pub use artifacts::{Artifact, ArtifactKind, ArtifactSet};
pub use config::ReconcileConfig;
pub use error::{ExtractError, ReconcileError};
pub use reconcile::{CancelToken, Reconciler, SimulationContext};
pub use report::{SimulationReport, Status, Warning, WarningKind};
