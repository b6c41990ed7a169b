//! Markup-report extractor.
//!
//! Reads the "End Uses" table of the tabular HTML report: one row per
//! end-use category, one column per energy carrier (`Electricity [GJ]`,
//! `Natural Gas [GJ]`, ..., `Water [m3]`), closed by a `Total End Uses` row.
//! The report's own total is authoritative because it includes carriers and
//! categories that are not tracked individually.

use std::fs;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::{EndUse, Extractor, PartialMetrics, Source, normalize_label};
use crate::artifacts::{ArtifactKind, ArtifactSet};
use crate::error::ExtractError;
use crate::units::{AreaUnit, EnergyUnit, parse_number};

static END_USES_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<b>\s*End Uses\s*</b>").expect("title regex"));
static TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<table[^>]*>(.*?)</table>").expect("table regex"));
static ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("row regex"));
static CELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<t[dh][^>]*>(.*?)</t[dh]>").expect("cell regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

/// Floor-area row labels, in priority order.
const AREA_LABELS: &[&str] = &[
    "totalbuildingarea",
    "netconditionedbuildingarea",
    "conditionedbuildingarea",
];

const TOTAL_LABEL: &str = "totalenduses";

type Table = Vec<Vec<String>>;

fn clean_cell(raw: &str) -> String {
    TAG.replace_all(raw, "")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

fn parse_table(inner: &str) -> Table {
    ROW.captures_iter(inner)
        .map(|row| {
            CELL.captures_iter(&row[1])
                .map(|cell| clean_cell(&cell[1]))
                .collect()
        })
        .filter(|cells: &Vec<String>| !cells.is_empty())
        .collect()
}

fn all_tables(html: &str) -> Vec<Table> {
    TABLE
        .captures_iter(html)
        .map(|c| parse_table(&c[1]))
        .collect()
}

/// Per-column energy units of a header row. `None` when the header declares
/// no energy units at all, in which case every numeric column is taken as GJ.
fn column_units(header: &[String]) -> Option<Vec<Option<EnergyUnit>>> {
    let units: Vec<Option<EnergyUnit>> = header
        .iter()
        .map(|c| {
            if c.contains('[') {
                EnergyUnit::from_tag(c)
            } else {
                None
            }
        })
        .collect();
    units.iter().any(Option::is_some).then_some(units)
}

/// Sums a row's energy cells in kWh, or `None` if it has none.
fn row_kwh(row: &[String], units: Option<&[Option<EnergyUnit>]>) -> Option<f64> {
    let mut found = false;
    let mut total = 0.0;
    for (i, cell) in row.iter().enumerate().skip(1) {
        let unit = match units {
            Some(units) => match units.get(i).copied().flatten() {
                Some(unit) => unit,
                None => continue,
            },
            None => EnergyUnit::Gigajoule,
        };
        if let Some(value) = parse_number(cell) {
            found = true;
            total += unit.to_kwh(value);
        }
    }
    found.then_some(total)
}

/// Reads the "End Uses" table into total and breakdown.
fn end_uses(html: &str, partial: &mut PartialMetrics) {
    let Some(title) = END_USES_TITLE.find(html) else {
        return;
    };
    let Some(table) = TABLE.captures_at(html, title.end()) else {
        return;
    };
    let rows = parse_table(&table[1]);
    let Some((header, body)) = rows.split_first() else {
        return;
    };
    let units = column_units(header);

    let mut reported_total = None;
    for row in body {
        let Some(label) = row.first() else { continue };
        let Some(kwh) = row_kwh(row, units.as_deref()) else {
            continue;
        };
        if normalize_label(label) == TOTAL_LABEL {
            reported_total = Some(kwh);
        } else if let Some(end_use) = EndUse::from_report_label(label) {
            partial.add(end_use, kwh);
        }
    }

    partial.total_kwh = match reported_total {
        Some(total) => Some(total),
        None if !partial.breakdown.is_empty() => Some(partial.breakdown_sum()),
        None => None,
    };
}

/// First row matching an area label (in priority order), converted to m².
fn floor_area(tables: &[Table]) -> Option<f64> {
    for wanted in AREA_LABELS {
        for table in tables {
            let area_unit = table
                .first()
                .and_then(|header| header.iter().find_map(|c| AreaUnit::from_tag(c)))
                .unwrap_or(AreaUnit::SquareMetre);
            for row in table {
                let Some(label) = row.first() else { continue };
                if normalize_label(label) != *wanted {
                    continue;
                }
                if let Some(value) = row.iter().skip(1).find_map(|c| parse_number(c)) {
                    return Some(area_unit.to_m2(value));
                }
            }
        }
    }
    None
}

/// Parses a whole markup report.
pub fn parse_report(html: &str) -> PartialMetrics {
    let mut partial = PartialMetrics::empty(Source::Report);
    end_uses(html, &mut partial);
    partial.floor_area_m2 = floor_area(&all_tables(html));
    partial
}

/// Extracts the end-use table and floor area from markup reports.
#[derive(Debug, Clone, Default)]
pub struct ReportExtractor;

impl ReportExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for ReportExtractor {
    fn source(&self) -> Source {
        Source::Report
    }

    fn extract(&self, artifacts: &ArtifactSet) -> Result<PartialMetrics, ExtractError> {
        let mut fallback_area = None;
        for artifact in artifacts.of_kind(ArtifactKind::ReportMarkup) {
            let bytes =
                fs::read(&artifact.path).map_err(|e| ExtractError::io(&artifact.path, e))?;
            let mut partial = parse_report(&String::from_utf8_lossy(&bytes));
            debug!(
                file = %artifact.file_name(),
                total_kwh = ?partial.total_kwh,
                area_m2 = ?partial.floor_area_m2,
                "parsed markup report"
            );
            if partial.total_kwh.is_some() {
                if partial.floor_area_m2.is_none() {
                    partial.floor_area_m2 = fallback_area;
                }
                return Ok(partial);
            }
            fallback_area = fallback_area.or(partial.floor_area_m2);
        }
        let mut partial = PartialMetrics::empty(Source::Report);
        partial.floor_area_m2 = fallback_area;
        Ok(partial)
    }
}
