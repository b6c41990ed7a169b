//! Metrics derived from the canonical record: intensity, peak demand,
//! performance rating, and confidence flags.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{CanonicalMetrics, SimulationContext};
use crate::config::{DerivedPolicy, RatingBand};
use crate::report::{Warning, WarningKind};

/// Coarse performance rating from annualized energy-use intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum PerformanceRating {
    Excellent,
    Good,
    Average,
    #[serde(rename = "Below Average")]
    BelowAverage,
    Poor,
}

impl fmt::Display for PerformanceRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Average => "Average",
            Self::BelowAverage => "Below Average",
            Self::Poor => "Poor",
        };
        f.write_str(s)
    }
}

/// Derived metrics for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedMetrics {
    /// Annualized energy-use intensity (kWh/m²).
    pub energy_use_intensity: Option<f64>,
    /// Estimated peak demand (kW).
    pub peak_demand_kw: Option<f64>,
    pub performance_rating: Option<PerformanceRating>,
    pub performance_score: Option<u8>,
}

/// Scales a period total to a full year.
pub fn annualize(value: f64, period_days: u32) -> f64 {
    value * 365.0 / f64::from(period_days)
}

/// Annualized EUI, when total and floor area are both known and positive.
pub fn energy_use_intensity(total_kwh: f64, floor_area_m2: f64, period_days: u32) -> Option<f64> {
    (total_kwh > 0.0 && floor_area_m2 > 0.0)
        .then(|| annualize(total_kwh, period_days) / floor_area_m2)
}

/// Heuristic peak: average load over the assumed operating hours, times the
/// peak factor. Not a measured peak and not scaled by the simulated period.
pub fn peak_demand_kw(total_kwh: f64, policy: &DerivedPolicy) -> Option<f64> {
    (total_kwh > 0.0 && policy.operating_hours > 0.0)
        .then(|| total_kwh / policy.operating_hours * policy.peak_factor)
}

/// Step function over ascending bands; anything above the last band is `Poor`.
pub fn rate(eui: f64, bands: &[RatingBand], poor_score: u8) -> (PerformanceRating, u8) {
    bands
        .iter()
        .find(|b| eui <= b.max_eui)
        .map_or((PerformanceRating::Poor, poor_score), |b| (b.rating, b.score))
}

/// Computes derived metrics and appends low-confidence warnings to the record.
pub fn derive(
    canonical: &mut CanonicalMetrics,
    ctx: &SimulationContext,
    policy: &DerivedPolicy,
) -> DerivedMetrics {
    let mut derived = DerivedMetrics::default();
    let Some(total) = canonical.total_kwh.filter(|t| *t > 0.0) else {
        return derived;
    };

    derived.peak_demand_kw = peak_demand_kw(total, policy);

    if let Some(area) = canonical.floor_area_m2 {
        if let Some(eui) = energy_use_intensity(total, area, ctx.period_days) {
            let (rating, score) = rate(eui, &policy.rating_bands, policy.poor_score);
            derived.energy_use_intensity = Some(eui);
            derived.performance_rating = Some(rating);
            derived.performance_score = Some(score);
            if eui < policy.low_eui_threshold {
                canonical.warnings.push(Warning::new(
                    WarningKind::LowConfidence,
                    format!(
                        "EUI {eui:.2} kWh/m² is below {} kWh/m²; extraction may be incomplete",
                        policy.low_eui_threshold
                    ),
                ));
            }
        }
    }

    let covered = canonical.breakdown.values().sum::<f64>();
    if covered < policy.min_breakdown_coverage * total {
        canonical.warnings.push(Warning::new(
            WarningKind::LowConfidence,
            format!(
                "end-use breakdown covers {:.1}% of the total",
                covered / total * 100.0
            ),
        ));
    }

    derived
}
