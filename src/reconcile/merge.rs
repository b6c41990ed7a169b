//! The trust policy: how one extractor's partial record folds into the
//! canonical record.
//!
//! | Source   | Total                  | Breakdown                  | Area     |
//! |----------|------------------------|----------------------------|----------|
//! | Report   | authoritative          | seeds categories           | backfill |
//! | Meter    | backfill only          | overrides per category     | -        |
//! | Csv      | backfill only          | absent categories only     | backfill |
//! | Database | ratio test vs. prior   | larger value per category  | backfill |

use tracing::{debug, warn};

use super::CanonicalMetrics;
use crate::config::DatabasePolicy;
use crate::extract::{DbStrategy, PartialMetrics, Source};
use crate::report::{Warning, WarningKind};

/// How a breakdown value from a partial record combines with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakdownRule {
    FillAbsent,
    Override,
    KeepLarger,
}

fn merge_breakdown(
    canonical: &mut CanonicalMetrics,
    partial: &PartialMetrics,
    rule: BreakdownRule,
) {
    for (&end_use, &kwh) in &partial.breakdown {
        if kwh <= 0.0 {
            continue;
        }
        let take = match (canonical.breakdown.get(&end_use), rule) {
            (None, _) => true,
            (Some(_), BreakdownRule::FillAbsent) => false,
            (Some(_), BreakdownRule::Override) => true,
            (Some(prev), BreakdownRule::KeepLarger) => kwh > *prev,
        };
        if take {
            canonical.breakdown.insert(end_use, kwh);
            canonical.breakdown_sources.insert(end_use, partial.source);
        }
    }
}

/// A zero total counts as absent on both sides.
fn backfill_total(canonical: &mut CanonicalMetrics, partial: &PartialMetrics) {
    if !canonical.has_total() {
        if let Some(total) = partial.total_kwh.filter(|t| *t > 0.0) {
            canonical.total_kwh = Some(total);
            canonical.total_source = Some(partial.source);
        }
    }
}

fn backfill_area(canonical: &mut CanonicalMetrics, partial: &PartialMetrics) {
    if canonical.floor_area_m2.is_none() {
        if let Some(area) = partial.floor_area_m2.filter(|a| *a > 0.0) {
            canonical.floor_area_m2 = Some(area);
            canonical.area_source = Some(partial.source);
        }
    }
}

/// Folds one partial record into the canonical record.
pub fn merge(canonical: &mut CanonicalMetrics, partial: PartialMetrics, policy: &DatabasePolicy) {
    match partial.source {
        Source::Report => {
            backfill_total(canonical, &partial);
            merge_breakdown(canonical, &partial, BreakdownRule::FillAbsent);
            backfill_area(canonical, &partial);
        }
        Source::Meter => {
            merge_breakdown(canonical, &partial, BreakdownRule::Override);
            backfill_total(canonical, &partial);
        }
        Source::Csv => {
            backfill_area(canonical, &partial);
            backfill_total(canonical, &partial);
            merge_breakdown(canonical, &partial, BreakdownRule::FillAbsent);
        }
        Source::Database => merge_database(canonical, &partial, policy),
    }
    canonical.warnings.extend(partial.warnings);
}

/// Cross-validates a database total against the prior total.
fn merge_database(
    canonical: &mut CanonicalMetrics,
    partial: &PartialMetrics,
    policy: &DatabasePolicy,
) {
    backfill_area(canonical, partial);

    let Some(db_total) = partial.total_kwh.filter(|t| *t > 0.0) else {
        merge_breakdown(canonical, partial, BreakdownRule::KeepLarger);
        return;
    };

    if partial.db_strategy == Some(DbStrategy::FacilityVariables)
        && !fallback_plausible(canonical, db_total, policy)
    {
        return;
    }

    let prior = canonical.total_kwh.filter(|t| *t > 0.0);
    match prior {
        None => {
            canonical.total_kwh = Some(db_total);
            canonical.total_source = Some(Source::Database);
            canonical.db_strategy = partial.db_strategy;
            merge_breakdown(canonical, partial, BreakdownRule::KeepLarger);
        }
        Some(prior) => {
            let ratio = db_total / prior;
            if ratio >= policy.reject_ratio {
                warn!(db_total, prior, ratio, "database total rejected");
                canonical.warnings.push(Warning::new(
                    WarningKind::ImplausibleValue,
                    format!(
                        "database total {db_total:.1} kWh is {ratio:.0}× the prior total \
                         {prior:.1} kWh; database ignored"
                    ),
                ));
                return;
            }
            if ratio > policy.prefer_ratio {
                debug!(db_total, prior, ratio, "database total preferred");
                canonical.total_kwh = Some(db_total);
                canonical.total_source = Some(Source::Database);
                canonical.db_strategy = partial.db_strategy;
            }
            merge_breakdown(canonical, partial, BreakdownRule::KeepLarger);
        }
    }
}

/// Fallback-strategy totals must give a believable intensity.
fn fallback_plausible(
    canonical: &mut CanonicalMetrics,
    db_total: f64,
    policy: &DatabasePolicy,
) -> bool {
    let Some(area) = canonical.floor_area_m2.filter(|a| *a > 0.0) else {
        canonical.warnings.push(Warning::new(
            WarningKind::LowConfidence,
            "database total from facility-named series could not be checked against floor area",
        ));
        return true;
    };
    let eui = db_total / area;
    if eui > policy.max_fallback_eui {
        warn!(db_total, eui, "database fallback total rejected");
        canonical.warnings.push(Warning::new(
            WarningKind::ImplausibleValue,
            format!(
                "database fallback total gives EUI {eui:.1} kWh/m² above {} kWh/m²; ignored",
                policy.max_fallback_eui
            ),
        ));
        return false;
    }
    true
}
