//! Embedded-database extractor.
//!
//! The simulator's SQLite output stores a variable/meter dictionary and a
//! value table keyed by dictionary index and time index. Table and column
//! names differ between versions, so the schema is probed first and queries
//! are built from the probed identifiers.
//!
//! Every dictionary entry is read at its maximum time index (the final,
//! cumulative reading for run-period frequency), then three strategies are
//! tried in order over those readings.

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use super::{EndUse, Extractor, PartialMetrics, Source, is_facility_meter};
use crate::artifacts::{ArtifactKind, ArtifactSet};
use crate::error::ExtractError;
use crate::units::{AreaUnit, EnergyUnit};

/// Which query strategy produced a database total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DbStrategy {
    /// Facility electricity/gas meters at run-period frequency.
    FacilityMeters,
    /// Any facility-named series at run-period frequency.
    FacilityVariables,
    /// Anything loosely named annual/total/facility.
    LooseMatch,
}

const KEY_COLUMNS: &[&str] = &[
    "ReportDataDictionaryIndex",
    "ReportVariableDataDictionaryIndex",
    "ReportMeterDataDictionaryIndex",
];
const NAME_COLUMNS: &[&str] = &["Name", "VariableName"];
const UNIT_COLUMNS: &[&str] = &["Units", "VariableUnits"];
const FREQUENCY_COLUMNS: &[&str] = &["ReportingFrequency"];
const VALUE_COLUMNS: &[&str] = &["Value", "VariableValue"];
const TIME_COLUMNS: &[&str] = &["TimeIndex"];
const METER_FLAG_COLUMNS: &[&str] = &["IsMeter"];

/// Dictionary/data table pairs, modern layout first.
const TABLE_PAIRS: &[(&str, &str, bool)] = &[
    ("ReportDataDictionary", "ReportData", false),
    ("ReportMeterDictionary", "ReportMeterData", true),
    ("ReportVariableDictionary", "ReportVariableData", false),
];

const RUN_PERIOD_FREQUENCIES: &[&str] = &["runperiod", "annual", "environment"];

/// Probed identifiers for one dictionary/data table pair.
#[derive(Debug, Clone)]
struct SeriesTables {
    dictionary: String,
    data: String,
    dict_key: String,
    data_key: String,
    name: String,
    units: Option<String>,
    frequency: Option<String>,
    value: String,
    time: String,
    meter_flag: Option<String>,
    all_meters: bool,
}

/// Final reading of one dictionary entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DbReading {
    pub name: String,
    pub unit: Option<EnergyUnit>,
    pub frequency: String,
    pub is_meter: bool,
    pub value: f64,
}

impl DbReading {
    fn is_run_period(&self) -> bool {
        let f: String = self
            .frequency
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        RUN_PERIOD_FREQUENCIES.contains(&f.as_str())
    }

    fn kwh(&self) -> Option<f64> {
        self.unit
            .map(|u| u.to_kwh(self.value))
            .filter(|v| *v > 0.0)
    }
}

fn words(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

/// Facility-named series that restate or net out purchased energy.
fn is_derived_series(name: &str) -> bool {
    let w = words(name);
    w.iter().any(|w| {
        matches!(w.as_str(), "net" | "surplus" | "produced" | "sold")
            || w.starts_with("electricitynet")
            || w.starts_with("electricityproduced")
            || w.starts_with("electricitysurplus")
            || w.starts_with("electricitypurchased")
    })
}

fn is_electricity_or_gas(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("electricity") || lower.contains("gas")
}

/// Strategy A: facility electricity/gas meters at run-period frequency.
///
/// Every matched meter also feeds the breakdown, so the breakdown is
/// populated even when only facility aggregates carry the total.
fn facility_meters(readings: &[DbReading], partial: &mut PartialMetrics) -> Option<f64> {
    let mut total = None;
    for r in readings
        .iter()
        .filter(|r| r.is_meter && r.is_run_period() && is_electricity_or_gas(&r.name))
    {
        let Some(kwh) = r.kwh() else { continue };
        if is_facility_meter(&r.name) {
            *total.get_or_insert(0.0) += kwh;
        } else if let Some(end_use) = EndUse::from_meter_name(&r.name) {
            partial.add(end_use, kwh);
        }
    }
    total
}

/// Strategy B: any facility-named series at run-period frequency.
fn facility_variables(readings: &[DbReading]) -> Option<f64> {
    let mut total = None;
    for r in readings.iter().filter(|r| {
        r.is_run_period()
            && r.name.to_ascii_lowercase().contains("facility")
            && !is_derived_series(&r.name)
    }) {
        if let Some(kwh) = r.kwh() {
            *total.get_or_insert(0.0) += kwh;
        }
    }
    total
}

/// Strategy C: anything loosely named annual/total/facility.
fn loose_match(readings: &[DbReading]) -> Option<f64> {
    let mut total = None;
    for r in readings.iter().filter(|r| {
        let lower = r.name.to_ascii_lowercase();
        (lower.contains("annual") || lower.contains("total") || lower.contains("facility"))
            && !is_derived_series(&r.name)
    }) {
        if let Some(kwh) = r.kwh() {
            *total.get_or_insert(0.0) += kwh;
        }
    }
    total
}

/// Applies strategies A, B, C in order to a set of final readings.
pub fn metrics_from_readings(readings: &[DbReading]) -> PartialMetrics {
    let mut partial = PartialMetrics::empty(Source::Database);
    let attempt = facility_meters(readings, &mut partial)
        .map(|t| (t, DbStrategy::FacilityMeters))
        .or_else(|| facility_variables(readings).map(|t| (t, DbStrategy::FacilityVariables)))
        .or_else(|| loose_match(readings).map(|t| (t, DbStrategy::LooseMatch)));
    if let Some((total, strategy)) = attempt {
        partial.total_kwh = Some(total);
        partial.db_strategy = Some(strategy);
    }
    partial
}

fn table_names(conn: &Connection) -> Result<BTreeSet<String>, ExtractError> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type IN ('table', 'view')")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(names)
}

fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>, ExtractError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cols)
}

fn pick(columns: &[String], variants: &[&str]) -> Option<String> {
    variants
        .iter()
        .find_map(|v| columns.iter().find(|c| c.eq_ignore_ascii_case(v)).cloned())
}

fn probe_series_tables(
    conn: &Connection,
    tables: &BTreeSet<String>,
) -> Result<Vec<SeriesTables>, ExtractError> {
    let mut found = Vec::new();
    for (dictionary, data, all_meters) in TABLE_PAIRS {
        if !tables.contains(*dictionary) || !tables.contains(*data) {
            continue;
        }
        let dict_cols = column_names(conn, dictionary)?;
        let data_cols = column_names(conn, data)?;
        let (Some(dict_key), Some(data_key), Some(name), Some(value), Some(time)) = (
            pick(&dict_cols, KEY_COLUMNS),
            pick(&data_cols, KEY_COLUMNS),
            pick(&dict_cols, NAME_COLUMNS),
            pick(&data_cols, VALUE_COLUMNS),
            pick(&data_cols, TIME_COLUMNS),
        ) else {
            debug!(dictionary, "dictionary table lacks expected columns");
            continue;
        };
        found.push(SeriesTables {
            dictionary: (*dictionary).to_string(),
            data: (*data).to_string(),
            dict_key,
            data_key,
            name,
            units: pick(&dict_cols, UNIT_COLUMNS),
            frequency: pick(&dict_cols, FREQUENCY_COLUMNS),
            value,
            time,
            meter_flag: pick(&dict_cols, METER_FLAG_COLUMNS),
            all_meters: *all_meters,
        });
    }
    Ok(found)
}

/// Reads every dictionary entry at its maximum time index.
fn final_readings(conn: &Connection, t: &SeriesTables) -> Result<Vec<DbReading>, ExtractError> {
    let units = t.units.as_deref().map_or("NULL".to_string(), |c| format!("d.\"{c}\""));
    let frequency = t
        .frequency
        .as_deref()
        .map_or("''".to_string(), |c| format!("d.\"{c}\""));
    let meter = match (&t.meter_flag, t.all_meters) {
        (_, true) => "1".to_string(),
        (Some(c), false) => format!("d.\"{c}\""),
        (None, false) => "0".to_string(),
    };
    let sql = format!(
        "SELECT d.\"{name}\", {units}, {frequency}, {meter}, r.\"{value}\" \
         FROM \"{dict}\" d \
         JOIN \"{data}\" r ON r.\"{data_key}\" = d.\"{dict_key}\" \
         WHERE r.\"{time}\" = (SELECT MAX(r2.\"{time}\") FROM \"{data}\" r2 \
                               WHERE r2.\"{data_key}\" = d.\"{dict_key}\")",
        name = t.name,
        value = t.value,
        dict = t.dictionary,
        data = t.data,
        data_key = t.data_key,
        dict_key = t.dict_key,
        time = t.time,
    );
    let mut stmt = conn.prepare(&sql)?;
    let readings = stmt
        .query_map([], |row| {
            let units: Option<String> = row.get(1)?;
            let is_meter: Option<i64> = row.get(3)?;
            Ok(DbReading {
                name: row.get(0)?,
                unit: units.as_deref().and_then(EnergyUnit::from_tag),
                frequency: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                is_meter: is_meter.unwrap_or(0) != 0,
                value: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(readings)
}

/// Floor area from the tabular-data view, when the database carries it.
fn tabular_floor_area(
    conn: &Connection,
    tables: &BTreeSet<String>,
) -> Result<Option<f64>, ExtractError> {
    if !tables.contains("TabularDataWithStrings") {
        return Ok(None);
    }
    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT Value, Units FROM TabularDataWithStrings \
             WHERE RowName = 'Total Building Area' LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row.and_then(|(value, units)| {
        let value = value.trim().parse::<f64>().ok().filter(|v| *v > 0.0)?;
        let unit = units
            .as_deref()
            .and_then(AreaUnit::from_tag)
            .unwrap_or(AreaUnit::SquareMetre);
        Some(unit.to_m2(value))
    }))
}

fn read_database(conn: &Connection) -> Result<PartialMetrics, ExtractError> {
    let tables = table_names(conn)?;
    let mut readings = Vec::new();
    for t in probe_series_tables(conn, &tables)? {
        readings.extend(final_readings(conn, &t)?);
    }
    let mut partial = metrics_from_readings(&readings);
    partial.floor_area_m2 = tabular_floor_area(conn, &tables)?;
    Ok(partial)
}

/// Extracts totals from the embedded SQLite database.
#[derive(Debug, Clone, Default)]
pub struct DatabaseExtractor;

impl DatabaseExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Opens `path` read-only, reads it, and closes the connection before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::Sqlite` if the file is not a readable database.
    pub fn read_path(&self, path: &Path) -> Result<PartialMetrics, ExtractError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let outcome = read_database(&conn);
        conn.close().map_err(|(_, e)| ExtractError::Sqlite(e))?;
        outcome
    }
}

impl Extractor for DatabaseExtractor {
    fn source(&self) -> Source {
        Source::Database
    }

    fn extract(&self, artifacts: &ArtifactSet) -> Result<PartialMetrics, ExtractError> {
        let Some(artifact) = artifacts.first_of_kind(ArtifactKind::EmbeddedDb) else {
            return Ok(PartialMetrics::empty(Source::Database));
        };
        let partial = self.read_path(&artifact.path)?;
        info!(
            file = %artifact.file_name(),
            strategy = ?partial.db_strategy,
            total_kwh = ?partial.total_kwh,
            "extracted database readings"
        );
        Ok(partial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn reading(name: &str, unit: &str, freq: &str, meter: bool, value: f64) -> DbReading {
        DbReading {
            name: name.to_string(),
            unit: EnergyUnit::from_tag(unit),
            frequency: freq.to_string(),
            is_meter: meter,
            value,
        }
    }

    #[test]
    fn strategy_a_sums_facility_meters_and_classifies_children() {
        let readings = vec![
            reading("Electricity:Facility", "J", "Run Period", true, 36e9),
            reading("NaturalGas:Facility", "J", "Run Period", true, 18e9),
            reading("Heating:NaturalGas", "J", "Run Period", true, 18e9),
            reading("InteriorLights:Electricity", "J", "Run Period", true, 7.2e9),
            reading("Electricity:Facility", "J", "Hourly", true, 1e6),
        ];
        let partial = metrics_from_readings(&readings);
        assert_eq!(partial.db_strategy, Some(DbStrategy::FacilityMeters));
        assert!((partial.total_kwh.unwrap_or(0.0) - 15_000.0).abs() < 1e-6);
        assert_eq!(partial.breakdown.get(&EndUse::Heating), Some(&5000.0));
        assert_eq!(partial.breakdown.get(&EndUse::Lighting), Some(&2000.0));
    }

    #[test]
    fn strategy_b_used_when_no_facility_meters() {
        let readings = vec![
            reading("Facility Total Purchased Electricity Energy", "J", "Annual", false, 3.6e9),
            reading("Facility Net Purchased Electricity Energy", "J", "Annual", false, 3.6e9),
            reading("Facility Total Electricity Demand Rate", "W", "Annual", false, 9e5),
        ];
        let partial = metrics_from_readings(&readings);
        assert_eq!(partial.db_strategy, Some(DbStrategy::FacilityVariables));
        assert!((partial.total_kwh.unwrap_or(0.0) - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn strategy_c_is_last_resort() {
        let readings = vec![reading("Total Site Energy", "kWh", "Hourly", false, 42.0)];
        let partial = metrics_from_readings(&readings);
        assert_eq!(partial.db_strategy, Some(DbStrategy::LooseMatch));
        assert_eq!(partial.total_kwh, Some(42.0));
    }

    #[test]
    fn nothing_matched_is_empty() {
        let readings = vec![reading("Zone Mean Air Temperature", "C", "Hourly", false, 21.0)];
        let partial = metrics_from_readings(&readings);
        assert!(partial.is_empty());
        assert_eq!(partial.db_strategy, None);
    }

    fn modern_db(path: &Path) {
        let conn = Connection::open(path).expect("create db");
        conn.execute_batch(
            "CREATE TABLE ReportDataDictionary (
                 ReportDataDictionaryIndex INTEGER PRIMARY KEY, IsMeter INTEGER,
                 Type TEXT, IndexGroup TEXT, TimestepType TEXT, KeyValue TEXT,
                 Name TEXT, ReportingFrequency TEXT, ScheduleName TEXT, Units TEXT);
             CREATE TABLE ReportData (
                 ReportDataIndex INTEGER PRIMARY KEY, TimeIndex INTEGER,
                 ReportDataDictionaryIndex INTEGER, Value REAL);
             CREATE TABLE TabularDataWithStrings (
                 TabularDataIndex INTEGER PRIMARY KEY, ReportName TEXT, ReportForString TEXT,
                 TableName TEXT, RowName TEXT, ColumnName TEXT, Units TEXT, Value TEXT);",
        )
        .expect("schema");
        let dict = [
            (1, 1, "Electricity:Facility", "Run Period", "J"),
            (2, 1, "Cooling:Electricity", "Run Period", "J"),
        ];
        for (idx, meter, name, freq, units) in dict {
            conn.execute(
                "INSERT INTO ReportDataDictionary
                 (ReportDataDictionaryIndex, IsMeter, Name, ReportingFrequency, Units)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![idx, meter, name, freq, units],
            )
            .expect("dict row");
        }
        // Time index 1 is a sizing period, 2 the run period.
        let data = [(1, 1, 1.0e6), (2, 1, 7.2e9), (1, 2, 5.0e5), (2, 2, 3.6e9)];
        for (time, dict_idx, value) in data {
            conn.execute(
                "INSERT INTO ReportData (TimeIndex, ReportDataDictionaryIndex, Value)
                 VALUES (?1, ?2, ?3)",
                params![time, dict_idx, value],
            )
            .expect("data row");
        }
        conn.execute(
            "INSERT INTO TabularDataWithStrings (RowName, ColumnName, Units, Value)
             VALUES ('Total Building Area', 'Area', 'm2', '  1500.00')",
            [],
        )
        .expect("tabular row");
    }

    #[test]
    fn reads_modern_schema_at_max_time_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("eplusout.sql");
        modern_db(&path);

        let partial = DatabaseExtractor::new().read_path(&path).expect("read");
        assert_eq!(partial.db_strategy, Some(DbStrategy::FacilityMeters));
        assert!((partial.total_kwh.unwrap_or(0.0) - 2000.0).abs() < 1e-6);
        assert_eq!(partial.breakdown.get(&EndUse::Cooling), Some(&1000.0));
        assert_eq!(partial.floor_area_m2, Some(1500.0));
    }

    #[test]
    fn reads_legacy_meter_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("legacy.sqlite");
        let conn = Connection::open(&path).expect("create db");
        conn.execute_batch(
            "CREATE TABLE ReportMeterDictionary (
                 ReportMeterDataDictionaryIndex INTEGER PRIMARY KEY, VariableType TEXT,
                 VariableName TEXT, ReportingFrequency TEXT, VariableUnits TEXT);
             CREATE TABLE ReportMeterData (
                 TimeIndex INTEGER, ReportMeterDataDictionaryIndex INTEGER, VariableValue REAL);
             INSERT INTO ReportMeterDictionary VALUES (7, 'Sum', 'Electricity:Facility', 'Annual', 'GJ');
             INSERT INTO ReportMeterData VALUES (3, 7, 10.0);",
        )
        .expect("legacy schema");
        drop(conn);

        let partial = DatabaseExtractor::new().read_path(&path).expect("read");
        assert_eq!(partial.db_strategy, Some(DbStrategy::FacilityMeters));
        assert!((partial.total_kwh.unwrap_or(0.0) - 2777.78).abs() < 1e-6);
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.sql");
        std::fs::write(&path, "this is not a database").expect("write");
        assert!(DatabaseExtractor::new().read_path(&path).is_err());
    }
}
