//! Result assembly: the single report returned for every run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::artifacts::ArtifactSet;
use crate::extract::{DbStrategy, EndUse, LogOutcome};
use crate::reconcile::CanonicalMetrics;
use crate::reconcile::derived::{DerivedMetrics, PerformanceRating};
use crate::thermal::ThermalDescriptors;

/// Category of a non-fatal observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    MalformedArtifact,
    ImplausibleValue,
    IncompleteExtraction,
    LowConfidence,
    SourceDiscrepancy,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MalformedArtifact => "malformed_artifact",
            Self::ImplausibleValue => "implausible_value",
            Self::IncompleteExtraction => "incomplete_extraction",
            Self::LowConfidence => "low_confidence",
            Self::SourceDiscrepancy => "source_discrepancy",
        };
        f.write_str(s)
    }
}

/// A non-fatal observation attached to the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    /// No positive total could be extracted.
    Incomplete,
    /// The simulator reported a fatal error.
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Incomplete => "incomplete",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Simulator-side diagnostics. Never used in energy math.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticsBundle {
    /// Warning and severe lines from the simulator log (bounded).
    pub simulator_warnings: Vec<String>,
    /// All warning and severe lines seen, including those not kept.
    pub simulator_warning_count: usize,
    /// Leading slice of the raw log.
    pub raw_log_excerpt: String,
    /// File name → size in bytes for every artifact in the run directory.
    pub file_sizes: BTreeMap<String, u64>,
    /// Query strategy behind a database-sourced total.
    pub database_strategy: Option<DbStrategy>,
}

impl DiagnosticsBundle {
    pub fn new(log: &LogOutcome, artifacts: &ArtifactSet) -> Self {
        Self {
            simulator_warnings: log.warnings.clone(),
            simulator_warning_count: log.warning_count,
            raw_log_excerpt: log.raw_excerpt.clone(),
            file_sizes: artifacts.file_sizes().into_iter().collect(),
            database_strategy: None,
        }
    }
}

/// The canonical result of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub status: Status,
    /// Total site energy over the simulated period (kWh).
    pub total_energy_kwh: Option<f64>,
    /// End-use breakdown (kWh).
    pub breakdown: BTreeMap<EndUse, f64>,
    pub floor_area_m2: Option<f64>,
    /// Annualized energy-use intensity (kWh/m²).
    pub energy_use_intensity: Option<f64>,
    pub peak_demand_kw: Option<f64>,
    pub performance_rating: Option<PerformanceRating>,
    pub performance_score: Option<u8>,
    /// Sources that supplied a used field, e.g. `report+meter`.
    pub extraction_method: String,
    /// True when any low-confidence warning was raised.
    pub low_confidence: bool,
    pub warnings: Vec<Warning>,
    pub fatal_errors: Vec<String>,
    pub thermal: Option<ThermalDescriptors>,
    pub period_days: u32,
    pub diagnostics: DiagnosticsBundle,
    pub generated_at: DateTime<Utc>,
}

impl SimulationReport {
    /// Report for a run whose log carries a fatal marker: no energy fields.
    pub fn fatal(
        fatal_errors: Vec<String>,
        diagnostics: DiagnosticsBundle,
        period_days: u32,
    ) -> Self {
        Self {
            status: Status::Error,
            total_energy_kwh: None,
            breakdown: BTreeMap::new(),
            floor_area_m2: None,
            energy_use_intensity: None,
            peak_demand_kw: None,
            performance_rating: None,
            performance_score: None,
            extraction_method: "none".to_string(),
            low_confidence: false,
            warnings: Vec::new(),
            fatal_errors,
            thermal: None,
            period_days,
            diagnostics,
            generated_at: Utc::now(),
        }
    }

    /// Freezes a finalized canonical record into a report.
    pub fn from_canonical(
        canonical: CanonicalMetrics,
        derived: DerivedMetrics,
        thermal: Option<ThermalDescriptors>,
        diagnostics: DiagnosticsBundle,
        period_days: u32,
    ) -> Self {
        let status = if canonical.has_total() {
            Status::Success
        } else {
            Status::Incomplete
        };
        let low_confidence = canonical
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::LowConfidence);
        Self {
            status,
            extraction_method: canonical.extraction_method(),
            total_energy_kwh: canonical.total_kwh,
            breakdown: canonical.breakdown,
            floor_area_m2: canonical.floor_area_m2,
            energy_use_intensity: derived.energy_use_intensity,
            peak_demand_kw: derived.peak_demand_kw,
            performance_rating: derived.performance_rating,
            performance_score: derived.performance_score,
            low_confidence,
            warnings: canonical.warnings,
            fatal_errors: Vec::new(),
            thermal,
            period_days,
            diagnostics,
            generated_at: Utc::now(),
        }
    }

    /// Share of the total covered by each breakdown category (percent).
    pub fn breakdown_shares(&self) -> BTreeMap<EndUse, f64> {
        let Some(total) = self.total_energy_kwh.filter(|t| *t > 0.0) else {
            return BTreeMap::new();
        };
        self.breakdown
            .iter()
            .map(|(end_use, kwh)| (*end_use, kwh / total * 100.0))
            .collect()
    }
}

fn opt(value: Option<f64>, precision: usize, unit: &str) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.precision$} {unit}"))
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Energy Report ---")?;
        writeln!(f, "Status:             {}", self.status)?;
        writeln!(f, "Period:             {} days", self.period_days)?;
        if self.status == Status::Error {
            writeln!(f, "Fatal errors:       {}", self.fatal_errors.len())?;
            for e in &self.fatal_errors {
                writeln!(f, "  {e}")?;
            }
            return Ok(());
        }
        writeln!(f, "Total energy:       {}", opt(self.total_energy_kwh, 2, "kWh"))?;
        writeln!(f, "Floor area:         {}", opt(self.floor_area_m2, 1, "m²"))?;
        writeln!(f, "EUI (annualized):   {}", opt(self.energy_use_intensity, 1, "kWh/m²"))?;
        writeln!(f, "Peak demand:        {}", opt(self.peak_demand_kw, 2, "kW"))?;
        match (self.performance_rating, self.performance_score) {
            (Some(rating), Some(score)) => writeln!(f, "Rating:             {rating} ({score})")?,
            _ => writeln!(f, "Rating:             n/a")?,
        }
        writeln!(f, "Extraction method:  {}", self.extraction_method)?;
        if let Some(t) = &self.thermal {
            writeln!(f, "Wall R-value:       {}", opt(t.wall_r_value, 2, "m²·K/W"))?;
            writeln!(f, "Window U-value:     {}", opt(t.window_u_value, 2, "W/m²·K"))?;
        }
        if !self.breakdown.is_empty() {
            writeln!(f, "Breakdown:")?;
            let shares = self.breakdown_shares();
            for (end_use, kwh) in &self.breakdown {
                let share = shares.get(end_use).copied().unwrap_or(0.0);
                writeln!(f, "  {:<16} {kwh:>12.2} kWh  {share:>5.1}%", end_use.as_str())?;
            }
        }
        if !self.warnings.is_empty() {
            writeln!(f, "Warnings:")?;
            for w in &self.warnings {
                writeln!(f, "  {w}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Source;

    fn canonical() -> CanonicalMetrics {
        let mut c = CanonicalMetrics::default();
        c.total_kwh = Some(1000.0);
        c.total_source = Some(Source::Report);
        c.breakdown.insert(EndUse::Heating, 250.0);
        c.breakdown_sources.insert(EndUse::Heating, Source::Meter);
        c
    }

    #[test]
    fn success_when_positive_total() {
        let report = SimulationReport::from_canonical(
            canonical(),
            DerivedMetrics::default(),
            None,
            DiagnosticsBundle::default(),
            365,
        );
        assert_eq!(report.status, Status::Success);
        assert_eq!(report.extraction_method, "report+meter");
        assert!(!report.low_confidence);
        let shares = report.breakdown_shares();
        assert_eq!(shares.get(&EndUse::Heating), Some(&25.0));
    }

    #[test]
    fn zero_total_is_incomplete_not_success() {
        let mut c = canonical();
        c.total_kwh = Some(0.0);
        let report = SimulationReport::from_canonical(
            c,
            DerivedMetrics::default(),
            None,
            DiagnosticsBundle::default(),
            365,
        );
        assert_eq!(report.status, Status::Incomplete);
    }

    #[test]
    fn fatal_report_has_no_energy_fields() {
        let report = SimulationReport::fatal(
            vec!["**  Fatal  ** Out of bounds".into()],
            DiagnosticsBundle::default(),
            365,
        );
        assert_eq!(report.status, Status::Error);
        assert_eq!(report.total_energy_kwh, None);
        assert!(report.breakdown.is_empty());
        let text = report.to_string();
        assert!(text.contains("Status:             error"));
        assert!(text.contains("Out of bounds"));
    }

    #[test]
    fn serializes_snake_case_fields() {
        let mut c = canonical();
        c.warnings.push(Warning::new(WarningKind::LowConfidence, "thin breakdown"));
        let report = SimulationReport::from_canonical(
            c,
            DerivedMetrics::default(),
            None,
            DiagnosticsBundle::default(),
            7,
        );
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["status"], "success");
        assert_eq!(json["breakdown"]["heating"], 250.0);
        assert_eq!(json["warnings"][0]["kind"], "low_confidence");
        assert_eq!(json["low_confidence"], true);
        assert_eq!(json["period_days"], 7);
    }

    #[test]
    fn display_lists_breakdown_and_warnings() {
        let mut c = canonical();
        c.warnings
            .push(Warning::new(WarningKind::SourceDiscrepancy, "meter gap 12%"));
        let report = SimulationReport::from_canonical(
            c,
            DerivedMetrics::default(),
            None,
            DiagnosticsBundle::default(),
            365,
        );
        let text = report.to_string();
        assert!(text.contains("Total energy:       1000.00 kWh"));
        assert!(text.contains("heating"));
        assert!(text.contains("[source_discrepancy] meter gap 12%"));
    }
}
