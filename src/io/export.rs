//! CSV export of the end-use breakdown.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::report::SimulationReport;

const HEADER: [&str; 3] = ["end_use", "kwh", "share_pct"];

/// Exports a report's breakdown to a CSV file at the given path.
///
/// One row per category in canonical order, followed by a `total` row when
/// the report carries a total.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_breakdown_csv(report: &SimulationReport, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_breakdown_csv(report, io::BufWriter::new(file))
}

/// Writes a report's breakdown as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_breakdown_csv(report: &SimulationReport, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HEADER)?;

    let shares = report.breakdown_shares();
    for (end_use, kwh) in &report.breakdown {
        let share = shares
            .get(end_use)
            .map_or_else(String::new, |s| format!("{s:.2}"));
        wtr.write_record([end_use.as_str().to_string(), format!("{kwh:.4}"), share])?;
    }
    if let Some(total) = report.total_energy_kwh {
        wtr.write_record(["total".to_string(), format!("{total:.4}"), "100.00".to_string()])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{EndUse, Source};
    use crate::reconcile::CanonicalMetrics;
    use crate::reconcile::derived::DerivedMetrics;
    use crate::report::DiagnosticsBundle;

    fn report(total: Option<f64>) -> SimulationReport {
        let mut c = CanonicalMetrics::default();
        c.total_kwh = total;
        c.total_source = total.map(|_| Source::Report);
        c.breakdown.insert(EndUse::Cooling, 25.0);
        c.breakdown.insert(EndUse::Heating, 75.0);
        SimulationReport::from_canonical(
            c,
            DerivedMetrics::default(),
            None,
            DiagnosticsBundle::default(),
            365,
        )
    }

    fn render(report: &SimulationReport) -> String {
        let mut buf = Vec::new();
        write_breakdown_csv(report, &mut buf).ok();
        String::from_utf8(buf).unwrap_or_default()
    }

    #[test]
    fn rows_follow_canonical_order_with_total_last() {
        let out = render(&report(Some(100.0)));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "end_use,kwh,share_pct");
        assert_eq!(lines[1], "heating,75.0000,75.00");
        assert_eq!(lines[2], "cooling,25.0000,25.00");
        assert_eq!(lines[3], "total,100.0000,100.00");
    }

    #[test]
    fn no_total_leaves_shares_blank() {
        let out = render(&report(None));
        assert!(out.lines().any(|l| l == "heating,75.0000,"));
        assert!(!out.contains("total"));
    }

    #[test]
    fn export_writes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("breakdown.csv");
        export_breakdown_csv(&report(Some(100.0)), &path).expect("export");
        let text = std::fs::read_to_string(&path).expect("read back");
        assert_eq!(text.lines().count(), 4);
    }
}
