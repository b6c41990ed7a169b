//! TOML-based trust-policy configuration.
//!
//! Every threshold the reconciliation engine applies lives here as a named
//! default, so the policy can be audited (and overridden) without touching
//! the parsers. The defaults are empirically tuned values and should be
//! reviewed for building types and climates outside the calibration set.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::reconcile::derived::PerformanceRating;

/// Top-level reconciliation policy parsed from TOML.
///
/// All sections are optional and fall back to [`ReconcileConfig::default`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Meter-file breakdown checks.
    #[serde(default)]
    pub meter: MeterPolicy,
    /// CSV floor-area filter.
    #[serde(default)]
    pub csv: CsvPolicy,
    /// Database cross-validation thresholds.
    #[serde(default)]
    pub database: DatabasePolicy,
    /// Period-scaling plausibility window.
    #[serde(default)]
    pub plausibility: PlausibilityPolicy,
    /// Peak demand, rating, and confidence heuristics.
    #[serde(default)]
    pub derived: DerivedPolicy,
    /// Bounds on diagnostic payloads.
    #[serde(default)]
    pub diagnostics: DiagnosticsPolicy,
}

/// Meter-file breakdown checks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeterPolicy {
    /// Relative breakdown-vs-facility gap that triggers a warning (0.10 = 10%).
    pub breakdown_discrepancy_tolerance: f64,
}

impl Default for MeterPolicy {
    fn default() -> Self {
        Self {
            breakdown_discrepancy_tolerance: 0.10,
        }
    }
}

/// CSV floor-area filter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CsvPolicy {
    /// Smallest floor area accepted from a CSV row (m²).
    pub min_floor_area_m2: f64,
    /// Largest floor area accepted from a CSV row (m²).
    pub max_floor_area_m2: f64,
}

impl Default for CsvPolicy {
    fn default() -> Self {
        Self {
            min_floor_area_m2: 50.0,
            max_floor_area_m2: 50_000.0,
        }
    }
}

/// Database cross-validation thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabasePolicy {
    /// Database total is preferred once it exceeds the prior total by this ratio.
    pub prefer_ratio: f64,
    /// Database total is rejected at or above this ratio to the prior total.
    pub reject_ratio: f64,
    /// Fallback-strategy totals above this EUI (kWh/m²) are discarded.
    pub max_fallback_eui: f64,
}

impl Default for DatabasePolicy {
    fn default() -> Self {
        Self {
            prefer_ratio: 1.2,
            reject_ratio: 100.0,
            max_fallback_eui: 500.0,
        }
    }
}

/// Period-scaling plausibility window.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlausibilityPolicy {
    /// Lower edge of the expected annual EUI band (kWh/m²). Reserved for a
    /// lower-bound window: correction only acts on the upper edge, so this is
    /// read only by `validate`, which keeps the band ordered.
    pub eui_band_low: f64,
    /// Upper edge of the expected annual EUI band (kWh/m²).
    pub eui_band_high: f64,
    /// Correction is attempted when the total exceeds this multiple of the window max.
    pub trigger_multiple: f64,
    /// A corrected total is kept only within this multiple of the window max.
    pub accept_multiple: f64,
}

impl Default for PlausibilityPolicy {
    fn default() -> Self {
        Self {
            eui_band_low: 100.0,
            eui_band_high: 300.0,
            trigger_multiple: 10.0,
            accept_multiple: 5.0,
        }
    }
}

/// One step of the EUI → rating function.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RatingBand {
    /// Inclusive upper EUI bound (kWh/m², annualized).
    pub max_eui: f64,
    pub rating: PerformanceRating,
    pub score: u8,
}

/// Peak demand, rating, and confidence heuristics.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DerivedPolicy {
    /// Assumed operating hours for the peak-demand estimate.
    pub operating_hours: f64,
    /// Peak-to-average multiplier.
    pub peak_factor: f64,
    /// EUI below this is flagged as likely incomplete (kWh/m²).
    pub low_eui_threshold: f64,
    /// Breakdown covering less than this share of the total is flagged.
    pub min_breakdown_coverage: f64,
    /// Ascending rating bands; EUIs above the last band rate `Poor`.
    pub rating_bands: Vec<RatingBand>,
    /// Score paired with the `Poor` rating.
    pub poor_score: u8,
}

impl Default for DerivedPolicy {
    fn default() -> Self {
        Self {
            operating_hours: 2920.0,
            peak_factor: 1.3,
            low_eui_threshold: 5.0,
            min_breakdown_coverage: 0.5,
            rating_bands: vec![
                RatingBand {
                    max_eui: 100.0,
                    rating: PerformanceRating::Excellent,
                    score: 95,
                },
                RatingBand {
                    max_eui: 150.0,
                    rating: PerformanceRating::Good,
                    score: 80,
                },
                RatingBand {
                    max_eui: 200.0,
                    rating: PerformanceRating::Average,
                    score: 65,
                },
                RatingBand {
                    max_eui: 250.0,
                    rating: PerformanceRating::BelowAverage,
                    score: 45,
                },
            ],
            poor_score: 25,
        }
    }
}

/// Bounds on diagnostic payloads.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagnosticsPolicy {
    /// Characters of the raw simulator log kept in the report.
    pub log_excerpt_chars: usize,
    /// Simulator warnings kept in the report.
    pub max_log_warnings: usize,
}

impl Default for DiagnosticsPolicy {
    fn default() -> Self {
        Self {
            log_excerpt_chars: 2000,
            max_log_warnings: 100,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"database.reject_ratio"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl ReconcileConfig {
    /// Parses a policy from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a policy from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if the policy is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError {
                    field: field.into(),
                    message: message.into(),
                });
            }
        };

        let m = &self.meter;
        check(
            m.breakdown_discrepancy_tolerance > 0.0 && m.breakdown_discrepancy_tolerance <= 1.0,
            "meter.breakdown_discrepancy_tolerance",
            "must be in (0.0, 1.0]",
        );

        let c = &self.csv;
        check(
            c.min_floor_area_m2 > 0.0,
            "csv.min_floor_area_m2",
            "must be > 0",
        );
        check(
            c.max_floor_area_m2 > c.min_floor_area_m2,
            "csv.max_floor_area_m2",
            "must be > csv.min_floor_area_m2",
        );

        let d = &self.database;
        check(d.prefer_ratio > 1.0, "database.prefer_ratio", "must be > 1.0");
        check(
            d.reject_ratio > d.prefer_ratio,
            "database.reject_ratio",
            "must be > database.prefer_ratio",
        );
        check(
            d.max_fallback_eui > 0.0,
            "database.max_fallback_eui",
            "must be > 0",
        );

        let p = &self.plausibility;
        check(p.eui_band_low > 0.0, "plausibility.eui_band_low", "must be > 0");
        check(
            p.eui_band_high > p.eui_band_low,
            "plausibility.eui_band_high",
            "must be > plausibility.eui_band_low",
        );
        check(
            p.accept_multiple >= 1.0,
            "plausibility.accept_multiple",
            "must be >= 1.0",
        );
        check(
            p.trigger_multiple >= p.accept_multiple,
            "plausibility.trigger_multiple",
            "must be >= plausibility.accept_multiple",
        );

        let r = &self.derived;
        check(
            r.operating_hours > 0.0,
            "derived.operating_hours",
            "must be > 0",
        );
        check(r.peak_factor > 0.0, "derived.peak_factor", "must be > 0");
        check(
            r.low_eui_threshold >= 0.0,
            "derived.low_eui_threshold",
            "must be >= 0",
        );
        check(
            (0.0..=1.0).contains(&r.min_breakdown_coverage),
            "derived.min_breakdown_coverage",
            "must be in [0.0, 1.0]",
        );
        check(
            !r.rating_bands.is_empty(),
            "derived.rating_bands",
            "must contain at least one band",
        );
        check(
            r.rating_bands
                .windows(2)
                .all(|w| w[0].max_eui < w[1].max_eui),
            "derived.rating_bands",
            "max_eui must be strictly ascending",
        );

        check(
            self.diagnostics.log_excerpt_chars > 0,
            "diagnostics.log_excerpt_chars",
            "must be > 0",
        );

        errors
    }
}
