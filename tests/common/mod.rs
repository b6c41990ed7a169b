//! Shared test fixtures: simulation run directories built in a tempdir.

#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};
use tempfile::TempDir;

/// A run directory that is removed when dropped.
pub struct RunDir {
    dir: TempDir,
}

impl RunDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir should be created"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `contents` to `name` inside the run directory.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("fixture file should be written");
        path
    }
}

/// Simulator log for a run that completed normally.
pub const CLEAN_LOG: &str = "\
Program Version,EnergyPlus, Version 9.6.0
   ************* Beginning Zone Sizing Calculations
   ** Warning ** Weather file location will be used rather than entered Location object.
   ************* EnergyPlus Completed Successfully-- 1 Warning; 0 Severe Errors
";

/// Simulator log for a run that terminated on a fatal error.
pub const FATAL_LOG: &str = "\
Program Version,EnergyPlus, Version 9.6.0
   ** Severe  ** Node connection error for AirLoopHVAC=VAV SYS 1
   **  Fatal  ** Errors occurred on processing input file. Preceding condition(s) cause termination.
   ************* EnergyPlus Terminated--Fatal Error Detected. 0 Warning; 1 Severe Errors
";

/// Markup report with an optional building-area table and an optional
/// "End Uses" table whose rows are `(label, electricity GJ)`.
pub fn markup_report(
    area_m2: Option<f64>,
    end_uses: &[(&str, f64)],
    total_gj: Option<f64>,
) -> String {
    let mut html = String::from(
        "<html><body>\n<p>Report: <b>Annual Building Utility Performance Summary</b></p>\n",
    );
    if let Some(area) = area_m2 {
        let _ = write!(
            html,
            "<b>Building Area</b><br><br>\n<table border=\"1\">\n\
             <tr><td></td><td align=\"right\">Area [m2]</td></tr>\n\
             <tr><td align=\"right\">Total Building Area</td><td align=\"right\">{area:>12.2}</td></tr>\n\
             </table>\n"
        );
    }
    if !end_uses.is_empty() || total_gj.is_some() {
        html.push_str(
            "<b>End Uses</b><br><br>\n<table border=\"1\">\n\
             <tr><td></td><td align=\"right\">Electricity [GJ]</td><td align=\"right\">Water [m3]</td></tr>\n",
        );
        for (label, gj) in end_uses {
            let _ = writeln!(
                html,
                "<tr><td align=\"right\">{label}</td><td align=\"right\">{gj:>12.4}</td><td align=\"right\">0.00</td></tr>"
            );
        }
        if let Some(total) = total_gj {
            let _ = writeln!(
                html,
                "<tr><td align=\"right\">Total End Uses</td><td align=\"right\">{total:>12.4}</td><td align=\"right\">4.00</td></tr>"
            );
        }
        html.push_str("</table>\n");
    }
    html.push_str("</body></html>\n");
    html
}

/// Meter file with one hourly series per `(name, joules)` entry, the value
/// split over two data lines.
pub fn meter_file(series: &[(&str, f64)]) -> String {
    let mut text = String::from("Program Version,EnergyPlus, Version 9.6.0\n");
    for (i, (name, _)) in series.iter().enumerate() {
        let _ = writeln!(text, "{},1,{name} [J] !Hourly", 100 + i);
    }
    text.push_str("End of Data Dictionary\n");
    for hour in 0..2 {
        let _ = writeln!(text, "2,1,1,1,0,{},0.00,60.00,Monday", hour + 1);
        for (i, (_, joules)) in series.iter().enumerate() {
            let _ = writeln!(text, "{},{}", 100 + i, joules / 2.0);
        }
    }
    text.push_str("End of Data\n");
    text
}

/// Tabular CSV carrying only a building-area table.
pub fn area_csv(area_m2: f64) -> String {
    format!(
        "REPORT:,Annual Building Utility Performance Summary\n\
         Building Area\n\
         ,,Area [m2]\n\
         ,Total Building Area,{area_m2:.2}\n"
    )
}

/// Creates a modern-schema database holding only facility-named output
/// variables (no meters), so totals come from the facility-variable strategy.
pub fn facility_variable_db(path: &Path, joules: f64) {
    let conn = Connection::open(path).expect("db should be created");
    conn.execute_batch(
        "CREATE TABLE ReportDataDictionary (
             ReportDataDictionaryIndex INTEGER PRIMARY KEY, IsMeter INTEGER,
             Type TEXT, IndexGroup TEXT, TimestepType TEXT, KeyValue TEXT,
             Name TEXT, ReportingFrequency TEXT, ScheduleName TEXT, Units TEXT);
         CREATE TABLE ReportData (
             ReportDataIndex INTEGER PRIMARY KEY, TimeIndex INTEGER,
             ReportDataDictionaryIndex INTEGER, Value REAL);",
    )
    .expect("schema should be created");
    conn.execute(
        "INSERT INTO ReportDataDictionary
         (ReportDataDictionaryIndex, IsMeter, Name, ReportingFrequency, Units)
         VALUES (1, 0, 'Facility Total Purchased Electricity Energy', 'Run Period', 'J')",
        [],
    )
    .expect("dictionary row");
    conn.execute(
        "INSERT INTO ReportData (TimeIndex, ReportDataDictionaryIndex, Value) VALUES (?1, 1, ?2)",
        params![1, joules],
    )
    .expect("data row");
}

/// The reference run: report heating 10 GJ, cooling 5 GJ and total 20 GJ;
/// meter heating 2 MJ, cooling 1 MJ and facility electricity 6 MJ.
pub fn reference_run() -> RunDir {
    let run = RunDir::new();
    run.write("eplusout.err", CLEAN_LOG);
    run.write(
        "eplustbl.htm",
        &markup_report(None, &[("Heating", 10.0), ("Cooling", 5.0)], Some(20.0)),
    );
    run.write(
        "eplusout.mtr",
        &meter_file(&[
            ("Heating:Electricity", 2_000_000.0),
            ("Cooling:Electricity", 1_000_000.0),
            ("Electricity:Facility", 6_000_000.0),
        ]),
    );
    run
}
