//! Period-scaling plausibility correction.
//!
//! Some artifacts report energy already scaled to a full year while the run
//! covered only part of one (or the reverse). A total far above what the
//! floor area supports for the simulated period is rescaled by
//! `period_days / 365`, and the correction is kept only if it brings the
//! value back into range.

use tracing::{debug, warn};

use super::{CanonicalMetrics, SimulationContext};
use crate::config::PlausibilityPolicy;
use crate::report::{Warning, WarningKind};

/// What the corrector did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Floor area or total unknown.
    Skipped,
    /// Total within the trigger multiple of the expected window.
    NotNeeded,
    /// Total and breakdown scaled by `factor`.
    Applied { factor: f64 },
    /// Scaling did not produce a plausible value; original restored.
    Reverted,
}

/// Upper edge of the expected energy window for the period (kWh).
pub fn window_max_kwh(floor_area_m2: f64, period_days: u32, policy: &PlausibilityPolicy) -> f64 {
    f64::from(period_days) / 365.0 * policy.eui_band_high * floor_area_m2
}

/// Checks the total against the expected window and rescales if needed.
pub fn correct_period(
    canonical: &mut CanonicalMetrics,
    ctx: &SimulationContext,
    policy: &PlausibilityPolicy,
) -> Correction {
    let (Some(total), Some(area)) = (canonical.total_kwh, canonical.floor_area_m2) else {
        return Correction::Skipped;
    };
    if total <= 0.0 || area <= 0.0 {
        return Correction::Skipped;
    }

    let window_max = window_max_kwh(area, ctx.period_days, policy);
    if total <= policy.trigger_multiple * window_max {
        return Correction::NotNeeded;
    }

    let factor = f64::from(ctx.period_days) / 365.0;
    let corrected = total * factor;
    if corrected < total && corrected <= policy.accept_multiple * window_max {
        canonical.total_kwh = Some(corrected);
        for kwh in canonical.breakdown.values_mut() {
            *kwh *= factor;
        }
        debug!(total, corrected, factor, "applied period correction");
        return Correction::Applied { factor };
    }

    warn!(total, window_max, "total implausible for period and floor area");
    canonical.warnings.push(Warning::new(
        WarningKind::ImplausibleValue,
        format!(
            "total {total:.1} kWh exceeds {:.0}× the expected maximum {window_max:.1} kWh \
             for {} days over {area:.1} m²; period scaling did not resolve it",
            policy.trigger_multiple, ctx.period_days
        ),
    ));
    Correction::Reverted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::EndUse;

    fn canonical(total: f64, area: f64) -> CanonicalMetrics {
        let mut c = CanonicalMetrics::default();
        c.total_kwh = Some(total);
        c.floor_area_m2 = Some(area);
        c
    }

    #[test]
    fn seven_day_run_with_annual_total_is_rescaled() {
        let policy = PlausibilityPolicy::default();
        let ctx = SimulationContext::new(7);
        let window_max = window_max_kwh(1000.0, 7, &policy);
        let original = 50.0 * window_max;
        let mut c = canonical(original, 1000.0);
        c.breakdown.insert(EndUse::Heating, original / 2.0);

        let result = correct_period(&mut c, &ctx, &policy);
        assert_eq!(result, Correction::Applied { factor: 7.0 / 365.0 });
        let total = c.total_kwh.unwrap_or(0.0);
        assert!((total - original * 7.0 / 365.0).abs() < 1e-6);
        let heating = c.breakdown.get(&EndUse::Heating).copied().unwrap_or(0.0);
        assert!((heating - original / 2.0 * 7.0 / 365.0).abs() < 1e-6);
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn plausible_total_untouched() {
        let mut c = canonical(150_000.0, 1000.0);
        let result = correct_period(
            &mut c,
            &SimulationContext::annual(),
            &PlausibilityPolicy::default(),
        );
        assert_eq!(result, Correction::NotNeeded);
        assert_eq!(c.total_kwh, Some(150_000.0));
    }

    #[test]
    fn annual_run_cannot_be_rescaled_and_is_flagged() {
        let mut c = canonical(10_000_000.0, 1000.0);
        let result = correct_period(
            &mut c,
            &SimulationContext::annual(),
            &PlausibilityPolicy::default(),
        );
        assert_eq!(result, Correction::Reverted);
        assert_eq!(c.total_kwh, Some(10_000_000.0));
        assert_eq!(c.warnings[0].kind, WarningKind::ImplausibleValue);
    }

    #[test]
    fn total_below_low_band_is_left_alone() {
        let mut c = canonical(10.0, 1000.0);
        let result = correct_period(
            &mut c,
            &SimulationContext::annual(),
            &PlausibilityPolicy::default(),
        );
        assert_eq!(result, Correction::NotNeeded);
        assert_eq!(c.total_kwh, Some(10.0));
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn skipped_without_floor_area() {
        let mut c = CanonicalMetrics::default();
        c.total_kwh = Some(1e12);
        let result = correct_period(
            &mut c,
            &SimulationContext::new(7),
            &PlausibilityPolicy::default(),
        );
        assert_eq!(result, Correction::Skipped);
    }
}
