//! Meter-file extractor.
//!
//! The meter file starts with a data dictionary that registers numeric IDs:
//!
//! ```text
//! 13,1,Electricity:Facility [J] !Hourly
//! 38,9,Heating:Electricity [J] !Monthly [Value,Min,Month,Day,Hour,Minute,Max,Month,Day,Hour,Minute]
//! End of Data Dictionary
//! ```
//!
//! followed by data lines `id,value[,...]` up to `End of Data`.

use std::collections::{BTreeMap, HashMap};
use std::fs;

use tracing::{debug, warn};

use super::{EndUse, Extractor, PartialMetrics, Source, is_facility_meter};
use crate::artifacts::{ArtifactKind, ArtifactSet};
use crate::config::MeterPolicy;
use crate::error::ExtractError;
use crate::report::{Warning, WarningKind};
use crate::units::{EnergyUnit, parse_number};

const DICTIONARY_END: &str = "End of Data Dictionary";
const DATA_END: &str = "End of Data";

/// One registered meter series.
#[derive(Debug, Clone)]
struct Series {
    name: String,
    unit: EnergyUnit,
}

/// Per-series totals after dictionary/data matching, converted to kWh and
/// deduplicated across reporting frequencies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterTotals {
    /// Meter name → kWh.
    pub by_name: BTreeMap<String, f64>,
}

impl MeterTotals {
    /// Parses meter-file text.
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::Malformed` if non-empty text has no data
    /// dictionary terminator.
    pub fn parse(text: &str) -> Result<Self, ExtractError> {
        let mut series: HashMap<u32, Series> = HashMap::new();
        let mut sums: HashMap<u32, f64> = HashMap::new();
        let mut in_data = false;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with(DICTIONARY_END) {
                in_data = true;
                continue;
            }
            if in_data && line.starts_with(DATA_END) {
                break;
            }

            if in_data {
                let mut fields = line.split(',');
                let Some(id) = fields.next().and_then(|f| f.trim().parse::<u32>().ok()) else {
                    continue;
                };
                if !series.contains_key(&id) {
                    continue;
                }
                // Zero and negative readings are placeholders.
                if let Some(value) = fields.next().and_then(parse_number) {
                    if value > 0.0 {
                        *sums.entry(id).or_insert(0.0) += value;
                    }
                }
            } else if let Some((id, entry)) = parse_dictionary_line(line) {
                series.insert(id, entry);
            }
        }

        if !in_data && !text.trim().is_empty() {
            return Err(ExtractError::malformed(
                "meter file",
                format!("missing \"{DICTIONARY_END}\" marker"),
            ));
        }

        // The same meter may be reported at several frequencies; count it once.
        let mut by_name: BTreeMap<String, f64> = BTreeMap::new();
        for (id, raw) in sums {
            let Some(s) = series.get(&id) else { continue };
            let kwh = s.unit.to_kwh(raw);
            let slot = by_name.entry(s.name.clone()).or_insert(0.0);
            if kwh > *slot {
                *slot = kwh;
            }
        }
        Ok(Self { by_name })
    }

    /// Sum of facility-level fuel meters, if any were reported.
    pub fn facility_kwh(&self) -> Option<f64> {
        let mut found = false;
        let mut total = 0.0;
        for (name, kwh) in &self.by_name {
            if is_facility_meter(name) {
                found = true;
                total += kwh;
            }
        }
        found.then_some(total)
    }

    /// End-use breakdown from the non-aggregate meters.
    pub fn breakdown(&self) -> BTreeMap<EndUse, f64> {
        let mut breakdown = BTreeMap::new();
        for (name, kwh) in &self.by_name {
            if let Some(end_use) = EndUse::from_meter_name(name) {
                *breakdown.entry(end_use).or_insert(0.0) += kwh;
            }
        }
        breakdown
    }
}

/// Parses `id,count,Name [unit] !Frequency`. Non-energy series are skipped.
fn parse_dictionary_line(line: &str) -> Option<(u32, Series)> {
    let mut parts = line.splitn(3, ',');
    let id = parts.next()?.trim().parse::<u32>().ok()?;
    parts.next()?.trim().parse::<usize>().ok()?;
    let rest = parts.next()?;
    let name_unit = rest.split_once('!').map_or(rest, |(head, _)| head);
    let unit = EnergyUnit::from_tag(name_unit)?;
    let name = name_unit.split('[').next()?.trim();
    if name.is_empty() {
        return None;
    }
    Some((
        id,
        Series {
            name: name.to_string(),
            unit,
        },
    ))
}

/// Extracts end-use breakdown and facility total from the meter file.
#[derive(Debug, Clone)]
pub struct MeterExtractor {
    discrepancy_tolerance: f64,
}

impl MeterExtractor {
    pub fn new(policy: &MeterPolicy) -> Self {
        Self {
            discrepancy_tolerance: policy.breakdown_discrepancy_tolerance,
        }
    }

    /// Builds a partial record from parsed meter totals.
    ///
    /// The facility total is preferred over the breakdown sum because the
    /// breakdown categories are not exhaustive for complex buildings. A gap
    /// beyond the tolerance is reported, not corrected.
    pub fn metrics_from_totals(&self, totals: &MeterTotals) -> PartialMetrics {
        let mut partial = PartialMetrics::empty(Source::Meter);
        partial.breakdown = totals.breakdown();
        let breakdown_sum = partial.breakdown_sum();

        match totals.facility_kwh() {
            Some(facility) => {
                partial.total_kwh = Some(facility);
                if facility > 0.0 && !partial.breakdown.is_empty() {
                    let gap = (breakdown_sum - facility).abs() / facility;
                    if gap > self.discrepancy_tolerance {
                        warn!(
                            facility_kwh = facility,
                            breakdown_kwh = breakdown_sum,
                            "meter breakdown disagrees with facility total"
                        );
                        partial.warnings.push(Warning::new(
                            WarningKind::SourceDiscrepancy,
                            format!(
                                "meter breakdown sum {breakdown_sum:.2} kWh differs from facility \
                                 total {facility:.2} kWh by {:.1}%",
                                gap * 100.0
                            ),
                        ));
                    }
                }
            }
            None if !partial.breakdown.is_empty() => {
                partial.total_kwh = Some(breakdown_sum);
            }
            None => {}
        }
        partial
    }
}

impl Extractor for MeterExtractor {
    fn source(&self) -> Source {
        Source::Meter
    }

    fn extract(&self, artifacts: &ArtifactSet) -> Result<PartialMetrics, ExtractError> {
        let Some(artifact) = artifacts.first_of_kind(ArtifactKind::Meter) else {
            return Ok(PartialMetrics::empty(Source::Meter));
        };
        let bytes = fs::read(&artifact.path).map_err(|e| ExtractError::io(&artifact.path, e))?;
        let totals = MeterTotals::parse(&String::from_utf8_lossy(&bytes))?;
        let partial = self.metrics_from_totals(&totals);
        debug!(
            file = %artifact.file_name(),
            series = totals.by_name.len(),
            total_kwh = ?partial.total_kwh,
            "extracted meter readings"
        );
        Ok(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METER: &str = "\
Program Version,EnergyPlus, Version 9.6.0
1,5,Environment Title[],Latitude[deg],Longitude[deg],Time Zone[],Elevation[m]
2,8,Day of Simulation[],Month[],Day of Month[],DST Indicator[1=yes 0=no],Hour[],StartMinute[],EndMinute[],DayType
13,1,Electricity:Facility [J] !Hourly
14,1,Heating:Electricity [J] !Hourly
15,1,Cooling:Electricity [J] !Hourly
16,9,Electricity:Facility [J] !Monthly [Value,Min,Month,Day,Hour,Minute,Max,Month,Day,Hour,Minute]
End of Data Dictionary
1,RUN PERIOD 1,40.0,-105.0,-7.0,1600.0
2,1,1,1,0,1,0.00,60.00,Monday
13,2000000.0
14,1000000.0
15,500000.0
2,1,1,1,0,2,0.00,60.00,Monday
13,4000000.0
14,1000000.0
15,500000.0
14,-5.0
15,0.0
16,6000000.0,2000000.0,1,1,1,60,4000000.0,1,1,2,60
End of Data
";

    fn extractor() -> MeterExtractor {
        MeterExtractor::new(&MeterPolicy::default())
    }

    #[test]
    fn sums_positive_values_per_series() {
        let totals = MeterTotals::parse(METER).expect("parse");
        let heating = totals.by_name.get("Heating:Electricity").copied();
        assert!((heating.unwrap_or(0.0) - 2_000_000.0 / 3_600_000.0).abs() < 1e-9);
        let cooling = totals.by_name.get("Cooling:Electricity").copied();
        assert!((cooling.unwrap_or(0.0) - 1_000_000.0 / 3_600_000.0).abs() < 1e-9);
    }

    #[test]
    fn multi_frequency_meter_counted_once() {
        let totals = MeterTotals::parse(METER).expect("parse");
        let facility = totals.facility_kwh().unwrap_or(0.0);
        assert!((facility - 6_000_000.0 / 3_600_000.0).abs() < 1e-9);
    }

    #[test]
    fn facility_total_preferred_and_gap_warned() {
        let totals = MeterTotals::parse(METER).expect("parse");
        let partial = extractor().metrics_from_totals(&totals);
        let total = partial.total_kwh.unwrap_or(0.0);
        assert!((total - 6_000_000.0 / 3_600_000.0).abs() < 1e-9);
        assert_eq!(partial.breakdown.len(), 2);
        assert_eq!(partial.warnings.len(), 1);
        assert_eq!(partial.warnings[0].kind, WarningKind::SourceDiscrepancy);
    }

    #[test]
    fn breakdown_sum_used_without_facility_meter() {
        let text = "\
14,1,Heating:Electricity [J] !Hourly
17,1,InteriorLights:Electricity [J] !Hourly
End of Data Dictionary
14,3600000
17,7200000
End of Data
";
        let totals = MeterTotals::parse(text).expect("parse");
        let partial = extractor().metrics_from_totals(&totals);
        assert_eq!(partial.total_kwh, Some(3.0));
        assert_eq!(partial.breakdown.get(&EndUse::Lighting), Some(&2.0));
        assert!(partial.warnings.is_empty());
    }

    #[test]
    fn missing_dictionary_marker_is_malformed() {
        let err = MeterTotals::parse("13,1,Electricity:Facility [J] !Hourly\n13,5\n");
        assert!(matches!(err, Err(ExtractError::Malformed { .. })));
    }

    #[test]
    fn empty_file_is_empty_record() {
        let totals = MeterTotals::parse("").expect("empty parses");
        let partial = extractor().metrics_from_totals(&totals);
        assert!(partial.is_empty());
    }
}
