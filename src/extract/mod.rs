//! Format extractors: one per artifact kind, each independent and
//! side-effect-free.
//!
//! Metric extractors implement [`Extractor`] and return a [`PartialMetrics`]
//! tagged with their [`Source`]. The error-log scanner is separate
//! ([`log::LogExtractor`]) because it gates reconciliation rather than
//! contributing energy readings.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::artifacts::ArtifactSet;
use crate::error::ExtractError;
use crate::report::Warning;

pub mod csv_table;
pub mod database;
pub mod log;
pub mod meter;
pub mod report;

pub use csv_table::CsvExtractor;
pub use database::{DatabaseExtractor, DbStrategy};
pub use log::{LogExtractor, LogOutcome};
pub use meter::MeterExtractor;
pub use report::ReportExtractor;

/// Canonical end-use categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndUse {
    Heating,
    Cooling,
    Lighting,
    Equipment,
    Fans,
    Pumps,
    HeatRejection,
    Humidification,
    HeatRecovery,
    WaterSystems,
    Refrigeration,
    Generators,
}

/// Tabular report row labels, normalized (lowercase, no spaces).
const REPORT_LABELS: &[(&str, EndUse)] = &[
    ("heating", EndUse::Heating),
    ("cooling", EndUse::Cooling),
    ("interiorlighting", EndUse::Lighting),
    ("exteriorlighting", EndUse::Lighting),
    ("lighting", EndUse::Lighting),
    ("interiorequipment", EndUse::Equipment),
    ("exteriorequipment", EndUse::Equipment),
    ("equipment", EndUse::Equipment),
    ("fans", EndUse::Fans),
    ("pumps", EndUse::Pumps),
    ("heatrejection", EndUse::HeatRejection),
    ("humidification", EndUse::Humidification),
    ("heatrecovery", EndUse::HeatRecovery),
    ("watersystems", EndUse::WaterSystems),
    ("refrigeration", EndUse::Refrigeration),
    ("generators", EndUse::Generators),
];

/// Meter-name keywords, checked in order. Specific names come before the
/// generic `heating`/`cooling` they contain.
const METER_KEYWORDS: &[(&str, EndUse)] = &[
    ("heatrecovery", EndUse::HeatRecovery),
    ("heatrejection", EndUse::HeatRejection),
    ("humidif", EndUse::Humidification),
    ("watersystems", EndUse::WaterSystems),
    ("refrigeration", EndUse::Refrigeration),
    ("cogeneration", EndUse::Generators),
    ("generator", EndUse::Generators),
    ("heating", EndUse::Heating),
    ("cooling", EndUse::Cooling),
    ("lights", EndUse::Lighting),
    ("lighting", EndUse::Lighting),
    ("equipment", EndUse::Equipment),
    ("fans", EndUse::Fans),
    ("pumps", EndUse::Pumps),
];

/// Meter scopes that aggregate several end uses.
const AGGREGATE_SCOPES: &[&str] = &["facility", "building", "hvac", "plant", "system"];

impl EndUse {
    pub const ALL: [EndUse; 12] = [
        Self::Heating,
        Self::Cooling,
        Self::Lighting,
        Self::Equipment,
        Self::Fans,
        Self::Pumps,
        Self::HeatRejection,
        Self::Humidification,
        Self::HeatRecovery,
        Self::WaterSystems,
        Self::Refrigeration,
        Self::Generators,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heating => "heating",
            Self::Cooling => "cooling",
            Self::Lighting => "lighting",
            Self::Equipment => "equipment",
            Self::Fans => "fans",
            Self::Pumps => "pumps",
            Self::HeatRejection => "heat_rejection",
            Self::Humidification => "humidification",
            Self::HeatRecovery => "heat_recovery",
            Self::WaterSystems => "water_systems",
            Self::Refrigeration => "refrigeration",
            Self::Generators => "generators",
        }
    }

    /// Classifies a meter name such as `InteriorLights:Electricity`.
    ///
    /// Facility/building aggregates, zone sub-meters (already contained in
    /// the building-level end-use meter) and energy-transfer meters (loads,
    /// not consumption) return `None`.
    pub fn from_meter_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        if lower.contains(":zone:")
            || lower.contains(":spacetype:")
            || lower.contains("energytransfer")
        {
            return None;
        }
        let mut parts = lower.split(':');
        let head = parts.next()?.replace(' ', "");
        if let Some(scope) = parts.next() {
            if AGGREGATE_SCOPES.contains(&scope.trim()) {
                return None;
            }
        }
        METER_KEYWORDS
            .iter()
            .find(|(kw, _)| head.contains(kw))
            .map(|(_, end_use)| *end_use)
    }

    /// Classifies a tabular row label such as `Interior Lighting`.
    pub fn from_report_label(label: &str) -> Option<Self> {
        let key = normalize_label(label);
        REPORT_LABELS
            .iter()
            .find(|(l, _)| *l == key)
            .map(|(_, end_use)| *end_use)
    }
}

impl fmt::Display for EndUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fuel meters that restate or net out another facility meter.
const DERIVED_FACILITY_FUELS: &[&str] = &[
    "electricitypurchased",
    "electricityproduced",
    "electricitynet",
    "electricitysurplussold",
    "energytransfer",
    "carbonequivalent",
];

/// True for a whole-building fuel aggregate such as `Electricity:Facility`.
pub(crate) fn is_facility_meter(name: &str) -> bool {
    let lower = name.trim().to_ascii_lowercase();
    let Some((fuel, scope)) = lower.split_once(':') else {
        return false;
    };
    let fuel = fuel.replace(' ', "");
    scope.trim() == "facility" && !DERIVED_FACILITY_FUELS.contains(&fuel.as_str())
}

/// Lowercases and strips whitespace and markup leftovers from a row label.
pub(crate) fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Which extractor supplied a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Report,
    Meter,
    Csv,
    Database,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Report => "report",
            Self::Meter => "meter",
            Self::Csv => "csv",
            Self::Database => "database",
        };
        f.write_str(s)
    }
}

/// Readings from a single extractor. Energy in kWh, area in m².
#[derive(Debug, Clone, PartialEq)]
pub struct PartialMetrics {
    pub source: Source,
    pub total_kwh: Option<f64>,
    pub breakdown: BTreeMap<EndUse, f64>,
    pub floor_area_m2: Option<f64>,
    /// Set by the database extractor: which query strategy produced the total.
    pub db_strategy: Option<DbStrategy>,
    /// Non-fatal observations made while extracting.
    pub warnings: Vec<Warning>,
}

impl PartialMetrics {
    /// An empty record for `source`.
    pub fn empty(source: Source) -> Self {
        Self {
            source,
            total_kwh: None,
            breakdown: BTreeMap::new(),
            floor_area_m2: None,
            db_strategy: None,
            warnings: Vec::new(),
        }
    }

    /// True when no energy or area field was extracted.
    pub fn is_empty(&self) -> bool {
        self.total_kwh.is_none() && self.breakdown.is_empty() && self.floor_area_m2.is_none()
    }

    /// Sum of all breakdown categories (kWh).
    pub fn breakdown_sum(&self) -> f64 {
        self.breakdown.values().sum()
    }

    pub(crate) fn add(&mut self, end_use: EndUse, kwh: f64) {
        *self.breakdown.entry(end_use).or_insert(0.0) += kwh;
    }
}

/// A metric extractor for one artifact kind.
///
/// Implementations read the artifacts they need, close them before
/// returning, and never mutate shared state, so one instance can serve
/// concurrent runs.
pub trait Extractor: Send + Sync {
    /// Provenance tag for every record this extractor produces.
    fn source(&self) -> Source;

    /// Extracts a partial record from the run's artifacts.
    ///
    /// A missing artifact yields an empty record, not an error.
    ///
    /// # Errors
    ///
    /// Returns an `ExtractError` when an artifact exists but cannot be read
    /// or parsed; the caller degrades it to an empty record.
    fn extract(&self, artifacts: &ArtifactSet) -> Result<PartialMetrics, ExtractError>;
}
