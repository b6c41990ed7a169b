//! Tabular CSV extractor.
//!
//! Lower-confidence source, mostly used to backfill floor area. Handles the
//! simulator's tabular CSV layout where each table has a title row, a header
//! row carrying bracketed units (`,,Electricity [GJ],Natural Gas [GJ],Water [m3]`)
//! and labelled data rows (`,Heating,10.00,2.50,0.00`), as well as plain
//! `label,value` files.

use std::fs::File;
use std::io::{BufReader, Read};

use tracing::{debug, warn};

use super::{EndUse, Extractor, PartialMetrics, Source, normalize_label};
use crate::artifacts::{ArtifactKind, ArtifactSet};
use crate::config::CsvPolicy;
use crate::error::ExtractError;
use crate::report::{Warning, WarningKind};
use crate::units::{AreaUnit, EnergyUnit, parse_number};

const AREA_LABEL: &str = "totalbuildingarea";
const TOTAL_LABEL: &str = "totalenduses";

/// Extracts floor area and energy line items from tabular CSV files.
#[derive(Debug, Clone)]
pub struct CsvExtractor {
    min_area_m2: f64,
    max_area_m2: f64,
}

/// Column units declared by the most recent table header.
#[derive(Debug, Default)]
struct TableHeader {
    energy: Vec<Option<EnergyUnit>>,
    area: Option<AreaUnit>,
}

impl TableHeader {
    fn from_cells(cells: &[&str]) -> Option<Self> {
        let tagged = |c: &&str| c.contains('[');
        if !cells.iter().any(tagged) {
            return None;
        }
        let energy: Vec<Option<EnergyUnit>> = cells
            .iter()
            .map(|c| if tagged(c) { EnergyUnit::from_tag(c) } else { None })
            .collect();
        let area = cells
            .iter()
            .find_map(|c| if tagged(c) { AreaUnit::from_tag(c) } else { None });
        Some(Self { energy, area })
    }

    fn has_energy_columns(&self) -> bool {
        self.energy.iter().any(Option::is_some)
    }
}

impl CsvExtractor {
    pub fn new(policy: &CsvPolicy) -> Self {
        Self {
            min_area_m2: policy.min_floor_area_m2,
            max_area_m2: policy.max_floor_area_m2,
        }
    }

    /// Parses one CSV document into a partial record.
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::Csv` if the reader fails (e.g. invalid UTF-8).
    pub fn parse<R: Read>(&self, reader: R) -> Result<PartialMetrics, ExtractError> {
        let mut partial = PartialMetrics::empty(Source::Csv);
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut header = TableHeader::default();
        let mut end_uses_done = false;

        for record in rdr.records() {
            let record = record?;
            let cells: Vec<&str> = record.iter().map(str::trim).collect();
            let has_numbers = cells.iter().any(|c| parse_number(c).is_some());

            if !has_numbers {
                // Header rows declare units; any other text-only row starts a new table.
                header = TableHeader::from_cells(&cells).unwrap_or_default();
                continue;
            }

            let Some((label_idx, label)) = cells
                .iter()
                .enumerate()
                .find(|(_, c)| !c.is_empty() && parse_number(c).is_none())
            else {
                continue;
            };
            let key = normalize_label(label);

            if key.contains(AREA_LABEL) {
                self.accept_area(&cells[label_idx + 1..], &header, &mut partial);
                continue;
            }

            if end_uses_done {
                continue;
            }
            let is_total = key == TOTAL_LABEL;
            let end_use = EndUse::from_report_label(label);
            if !is_total && end_use.is_none() {
                continue;
            }
            let Some(kwh) = line_item_kwh(&cells, label_idx, &header) else {
                continue;
            };
            if is_total && header.has_energy_columns() {
                end_uses_done = true;
            }
            if kwh <= 0.0 {
                continue;
            }
            if is_total {
                partial.total_kwh = Some(partial.total_kwh.unwrap_or(0.0) + kwh);
            } else if let Some(end_use) = end_use {
                partial.add(end_use, kwh);
            }
        }
        Ok(partial)
    }

    fn accept_area(&self, cells: &[&str], header: &TableHeader, partial: &mut PartialMetrics) {
        if partial.floor_area_m2.is_some() {
            return;
        }
        let Some(raw) = cells.iter().find_map(|c| parse_number(c)) else {
            return;
        };
        let unit = header.area.unwrap_or(AreaUnit::SquareMetre);
        let m2 = unit.to_m2(raw);
        if (self.min_area_m2..=self.max_area_m2).contains(&m2) {
            partial.floor_area_m2 = Some(m2);
        } else {
            warn!(area_m2 = m2, "CSV floor area outside accepted range");
            partial.warnings.push(Warning::new(
                WarningKind::ImplausibleValue,
                format!(
                    "CSV total building area {m2:.1} m² outside [{}, {}] m², ignored",
                    self.min_area_m2, self.max_area_m2
                ),
            ));
        }
    }
}

/// Value of a line-item row: the last numeric cell, restricted to
/// energy-unit columns when the table header declares them.
fn line_item_kwh(cells: &[&str], label_idx: usize, header: &TableHeader) -> Option<f64> {
    let candidates = cells.iter().enumerate().skip(label_idx + 1).rev();
    if header.has_energy_columns() {
        candidates
            .filter_map(|(i, c)| {
                let unit = header.energy.get(i).copied().flatten()?;
                parse_number(c).map(|v| unit.to_kwh(v))
            })
            .next()
    } else {
        candidates.filter_map(|(_, c)| parse_number(c)).next()
    }
}

impl Extractor for CsvExtractor {
    fn source(&self) -> Source {
        Source::Csv
    }

    fn extract(&self, artifacts: &ArtifactSet) -> Result<PartialMetrics, ExtractError> {
        let mut merged = PartialMetrics::empty(Source::Csv);
        for artifact in artifacts.of_kind(ArtifactKind::TabularCsv) {
            let file = File::open(&artifact.path).map_err(|e| ExtractError::io(&artifact.path, e))?;
            let partial = self.parse(BufReader::new(file))?;
            debug!(
                file = %artifact.file_name(),
                area_m2 = ?partial.floor_area_m2,
                total_kwh = ?partial.total_kwh,
                items = partial.breakdown.len(),
                "extracted CSV table"
            );

            // First file to supply a field wins.
            if merged.floor_area_m2.is_none() {
                merged.floor_area_m2 = partial.floor_area_m2;
            }
            if merged.total_kwh.is_none() {
                merged.total_kwh = partial.total_kwh;
            }
            if merged.breakdown.is_empty() {
                merged.breakdown = partial.breakdown;
            }
            merged.warnings.extend(partial.warnings);
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABULAR: &str = "\
REPORT:,Annual Building Utility Performance Summary
Building Area
,,Area [m2]
,Total Building Area,927.20
,Net Conditioned Building Area,927.20
End Uses
,,Electricity [GJ],Natural Gas [GJ],Water [m3]
,Heating,0.00,10.00,0.00
,Cooling,5.00,0.00,0.00
,Interior Lighting,2.00,0.00,0.00
,Exterior Lighting,1.00,0.00,0.00
,Total End Uses,8.00,10.00,3.50
End Uses By Subcategory
,,Subcategory,Electricity [GJ]
,Heating,General,99.00
";

    fn extractor() -> CsvExtractor {
        CsvExtractor::new(&CsvPolicy::default())
    }

    #[test]
    fn extracts_area_from_total_building_area_row() {
        let partial = extractor().parse(TABULAR.as_bytes()).expect("parse");
        assert_eq!(partial.floor_area_m2, Some(927.2));
    }

    #[test]
    fn line_items_use_last_energy_column() {
        let partial = extractor().parse(TABULAR.as_bytes()).expect("parse");
        let heating = partial.breakdown.get(&EndUse::Heating).copied().unwrap_or(0.0);
        assert!((heating - 10.0 * 277.778).abs() < 1e-6);
        let lighting = partial.breakdown.get(&EndUse::Lighting).copied().unwrap_or(0.0);
        assert!((lighting - 0.0).abs() < 1e-9);
        let total = partial.total_kwh.unwrap_or(0.0);
        assert!((total - 10.0 * 277.778).abs() < 1e-6);
    }

    #[test]
    fn tables_after_total_end_uses_are_ignored() {
        let partial = extractor().parse(TABULAR.as_bytes()).expect("parse");
        let heating = partial.breakdown.get(&EndUse::Heating).copied().unwrap_or(0.0);
        assert!(heating < 99.0 * 277.778);
    }

    #[test]
    fn small_area_rejected_as_noise() {
        let text = ",,Area [m2]\n,Total Building Area,30.0\n";
        let partial = extractor().parse(text.as_bytes()).expect("parse");
        assert_eq!(partial.floor_area_m2, None);
        assert_eq!(partial.warnings.len(), 1);
        assert_eq!(partial.warnings[0].kind, WarningKind::ImplausibleValue);
    }

    #[test]
    fn square_feet_converted_before_range_check() {
        let text = ",,Area [ft2]\n,Total Building Area,10000\n";
        let partial = extractor().parse(text.as_bytes()).expect("parse");
        let area = partial.floor_area_m2.unwrap_or(0.0);
        assert!((area - 929.0304).abs() < 1e-6);
    }

    #[test]
    fn plain_label_value_rows_default_to_kwh() {
        let text = "Heating,1200\nFans,300\nPumps,50\n";
        let partial = extractor().parse(text.as_bytes()).expect("parse");
        assert_eq!(partial.breakdown.get(&EndUse::Heating), Some(&1200.0));
        assert_eq!(partial.breakdown.get(&EndUse::Fans), Some(&300.0));
        assert_eq!(partial.total_kwh, None);
    }
}
