//! Reconciliation engine.
//!
//! One pass per run directory:
//!
//! 1. inventory the directory,
//! 2. scan the error log (a fatal marker short-circuits to an error report),
//! 3. fold each extractor's partial record into the canonical record in
//!    trust order (report, meter, CSV, database),
//! 4. finalize: period correction, derived metrics, thermal descriptors.
//!
//! The engine holds only configuration, so one [`Reconciler`] can serve
//! concurrent runs. Cancellation is checked between stages.

pub mod derived;
pub mod merge;
pub mod plausibility;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::artifacts::ArtifactSet;
use crate::config::ReconcileConfig;
use crate::error::ReconcileError;
use crate::extract::{
    CsvExtractor, DatabaseExtractor, DbStrategy, EndUse, Extractor, LogExtractor, LogOutcome,
    MeterExtractor, PartialMetrics, ReportExtractor, Source,
};
use crate::report::{DiagnosticsBundle, SimulationReport, Warning, WarningKind};
use crate::thermal::ThermalDescriptors;

/// Progress of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NoData,
    ReportApplied,
    MeterBreakdownMerged,
    CsvAreaApplied,
    DbChecked,
    Finalized,
    FatalError,
}

impl Stage {
    /// Stage reached once a source's record has been merged.
    pub fn after(source: Source) -> Self {
        match source {
            Source::Report => Self::ReportApplied,
            Source::Meter => Self::MeterBreakdownMerged,
            Source::Csv => Self::CsvAreaApplied,
            Source::Database => Self::DbChecked,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoData => "no_data",
            Self::ReportApplied => "report_applied",
            Self::MeterBreakdownMerged => "meter_breakdown_merged",
            Self::CsvAreaApplied => "csv_area_applied",
            Self::DbChecked => "db_checked",
            Self::Finalized => "finalized",
            Self::FatalError => "fatal_error",
        };
        f.write_str(s)
    }
}

/// Caller-supplied facts about the run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationContext {
    /// Simulated period length in days.
    pub period_days: u32,
    /// Input model for thermal descriptors; falls back to an `.idf` in the
    /// run directory.
    pub input_model: Option<PathBuf>,
}

impl SimulationContext {
    /// Creates a context for a run of `period_days` days.
    ///
    /// # Panics
    ///
    /// Panics if `period_days` is zero.
    pub fn new(period_days: u32) -> Self {
        assert!(period_days > 0, "period_days must be > 0");
        Self {
            period_days,
            input_model: None,
        }
    }

    /// A full-year run.
    pub fn annual() -> Self {
        Self::new(365)
    }

    pub fn with_input_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_model = Some(path.into());
        self
    }
}

/// Shared cancellation flag, checked between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ReconcileError> {
        if self.is_cancelled() {
            Err(ReconcileError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The merged record for one run, with per-field provenance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalMetrics {
    pub total_kwh: Option<f64>,
    pub breakdown: BTreeMap<EndUse, f64>,
    pub floor_area_m2: Option<f64>,
    pub total_source: Option<Source>,
    pub area_source: Option<Source>,
    pub breakdown_sources: BTreeMap<EndUse, Source>,
    /// Query strategy behind a database-sourced total.
    pub db_strategy: Option<DbStrategy>,
    pub warnings: Vec<Warning>,
}

impl CanonicalMetrics {
    /// Sources that supplied at least one field of the record.
    pub fn sources(&self) -> BTreeSet<Source> {
        self.total_source
            .into_iter()
            .chain(self.area_source)
            .chain(self.breakdown_sources.values().copied())
            .collect()
    }

    /// Provenance sources joined with `+` in trust order, or `none`.
    pub fn extraction_method(&self) -> String {
        let sources = self.sources();
        if sources.is_empty() {
            return "none".to_string();
        }
        sources
            .iter()
            .map(Source::to_string)
            .collect::<Vec<_>>()
            .join("+")
    }

    /// A positive total was extracted.
    pub fn has_total(&self) -> bool {
        self.total_kwh.is_some_and(|t| t > 0.0)
    }
}

/// Runs reconciliation passes under one trust policy.
pub struct Reconciler {
    config: ReconcileConfig,
    log: LogExtractor,
    extractors: Vec<Box<dyn Extractor>>,
}

impl Reconciler {
    /// Builds the extractor chain in trust order.
    pub fn new(config: ReconcileConfig) -> Self {
        let extractors: Vec<Box<dyn Extractor>> = vec![
            Box::new(ReportExtractor::new()),
            Box::new(MeterExtractor::new(&config.meter)),
            Box::new(CsvExtractor::new(&config.csv)),
            Box::new(DatabaseExtractor::new()),
        ];
        Self {
            log: LogExtractor::new(&config.diagnostics),
            extractors,
            config,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Reconciles the artifacts in `dir`.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::NotFound`/`NotADirectory` if `dir` cannot be
    /// listed, or `ReconcileError::Cancelled` if `cancel` trips mid-pass.
    /// A fatal simulator log is reported as an `error` status, not an `Err`.
    pub fn reconcile(
        &self,
        dir: &Path,
        ctx: &SimulationContext,
        cancel: &CancelToken,
    ) -> Result<SimulationReport, ReconcileError> {
        let artifacts = ArtifactSet::scan(dir)?;
        self.reconcile_artifacts(&artifacts, ctx, cancel)
    }

    /// Reconciles an already-built inventory.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Cancelled` if `cancel` trips mid-pass.
    pub fn reconcile_artifacts(
        &self,
        artifacts: &ArtifactSet,
        ctx: &SimulationContext,
        cancel: &CancelToken,
    ) -> Result<SimulationReport, ReconcileError> {
        info!(
            dir = %artifacts.dir().display(),
            artifacts = artifacts.len(),
            period_days = ctx.period_days,
            "reconciling run"
        );
        cancel.check()?;

        let mut warnings = Vec::new();
        let log = match self.log.scan(artifacts) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "error log unreadable");
                warnings.push(Warning::new(WarningKind::MalformedArtifact, e.to_string()));
                LogOutcome::default()
            }
        };
        let diagnostics = DiagnosticsBundle::new(&log, artifacts);

        if log.has_fatal() {
            info!(stage = %Stage::FatalError, fatal = log.fatal_errors.len(), "simulation failed");
            return Ok(SimulationReport::fatal(log.fatal_errors, diagnostics, ctx.period_days));
        }

        let mut canonical = CanonicalMetrics {
            warnings,
            ..CanonicalMetrics::default()
        };
        let mut stage = Stage::NoData;
        for extractor in &self.extractors {
            cancel.check()?;
            let partial = self.run_extractor(extractor.as_ref(), artifacts);
            merge::merge(&mut canonical, partial, &self.config.database);
            stage = Stage::after(extractor.source());
            debug!(
                %stage,
                total_kwh = ?canonical.total_kwh,
                area_m2 = ?canonical.floor_area_m2,
                "merged source"
            );
        }
        cancel.check()?;

        let report = self.finalize(canonical, artifacts, ctx, diagnostics);
        info!(
            stage = %Stage::Finalized,
            previous = %stage,
            status = %report.status,
            method = %report.extraction_method,
            "reconciliation complete"
        );
        Ok(report)
    }

    /// A failing extractor degrades to an empty record plus a warning.
    fn run_extractor(&self, extractor: &dyn Extractor, artifacts: &ArtifactSet) -> PartialMetrics {
        match extractor.extract(artifacts) {
            Ok(partial) => partial,
            Err(e) => {
                warn!(source = %extractor.source(), error = %e, "extractor failed");
                let mut partial = PartialMetrics::empty(extractor.source());
                partial.warnings.push(Warning::new(
                    WarningKind::MalformedArtifact,
                    format!("{} source unusable: {e}", extractor.source()),
                ));
                partial
            }
        }
    }

    fn finalize(
        &self,
        mut canonical: CanonicalMetrics,
        artifacts: &ArtifactSet,
        ctx: &SimulationContext,
        mut diagnostics: DiagnosticsBundle,
    ) -> SimulationReport {
        plausibility::correct_period(&mut canonical, ctx, &self.config.plausibility);

        if !canonical.has_total() {
            canonical.warnings.push(Warning::new(
                WarningKind::IncompleteExtraction,
                "no positive total energy could be extracted from any artifact",
            ));
        }

        let derived = derived::derive(&mut canonical, ctx, &self.config.derived);
        let thermal = self.thermal(ctx, artifacts, &mut canonical);
        diagnostics.database_strategy = canonical.db_strategy;
        SimulationReport::from_canonical(canonical, derived, thermal, diagnostics, ctx.period_days)
    }

    fn thermal(
        &self,
        ctx: &SimulationContext,
        artifacts: &ArtifactSet,
        canonical: &mut CanonicalMetrics,
    ) -> Option<ThermalDescriptors> {
        let path = ctx
            .input_model
            .clone()
            .or_else(|| artifacts.find_input_model().map(|a| a.path.clone()))?;
        match ThermalDescriptors::from_idf_file(&path) {
            Ok(t) if t.is_empty() => None,
            Ok(t) => Some(t),
            Err(e) => {
                canonical
                    .warnings
                    .push(Warning::new(WarningKind::MalformedArtifact, e.to_string()));
                None
            }
        }
    }
}
