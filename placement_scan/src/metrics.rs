//! Named metric formulas over aggregated counters.

use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::error::{choices, ReportError, Result};
use crate::grouping::AggregateRow;
use crate::record::{Counter, Counters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PrimaryCtr,
    SecondaryCtr,
    /// Video success rate on primary impressions.
    Vsr,
    VsrSecondary,
    InteractionRate,
    InteractionRateSecondary,
    ViewRate,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::PrimaryCtr,
        Metric::SecondaryCtr,
        Metric::Vsr,
        Metric::VsrSecondary,
        Metric::InteractionRate,
        Metric::InteractionRateSecondary,
        Metric::ViewRate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::PrimaryCtr => "primary_ctr",
            Metric::SecondaryCtr => "secondary_ctr",
            Metric::Vsr => "vsr",
            Metric::VsrSecondary => "vsr_secondary",
            Metric::InteractionRate => "interaction_rate",
            Metric::InteractionRateSecondary => "interaction_rate_secondary",
            Metric::ViewRate => "view_rate",
        }
    }

    /// Numerator terms and denominator of the formula.
    fn terms(self) -> (&'static [Counter], Counter) {
        use Counter::*;
        match self {
            Metric::PrimaryCtr => (&[PrimaryClicks], PrimaryImpressions),
            Metric::SecondaryCtr => (&[SecondaryClicks], SecondaryImpressions),
            Metric::Vsr => (&[CompletionEvents], PrimaryImpressions),
            Metric::VsrSecondary => (&[CompletionEvents], SecondaryImpressions),
            Metric::InteractionRate => (&[InteractiveSessions, PrimaryClicks], PrimaryImpressions),
            Metric::InteractionRateSecondary => {
                (&[InteractiveSessions, SecondaryClicks], SecondaryImpressions)
            }
            Metric::ViewRate => (&[ViewableImpressions], PrimaryImpressions),
        }
    }

    /// Counters the formula reads.
    pub fn inputs(self) -> Vec<Counter> {
        let (numerator, denominator) = self.terms();
        let mut inputs = numerator.to_vec();
        inputs.push(denominator);
        inputs
    }

    /// Summed numerator and non-zero denominator, or `None` when the
    /// denominator is absent or zero, or any numerator term is absent.
    fn operands(self, counters: &Counters) -> Option<(u64, u64)> {
        let (numerator, denominator) = self.terms();
        let den = counters.get(denominator).filter(|&d| d > 0)?;
        let mut num = 0u64;
        for &term in numerator {
            num = num.saturating_add(counters.get(term)?);
        }
        Some((num, den))
    }

    /// Unscaled ratio; undefined under the same conditions as [`Metric::percent`].
    pub fn ratio(self, counters: &Counters) -> Option<f64> {
        let (num, den) = self.operands(counters)?;
        Some(num as f64 / den as f64)
    }

    /// Percentage as reported: half-to-even at 2 decimals, except
    /// `view_rate` which truncates to a whole percent.
    pub fn percent(self, counters: &Counters) -> Option<f64> {
        let (num, den) = self.operands(counters)?;
        Some(match self {
            Metric::ViewRate => (u128::from(num) * 100 / u128::from(den)) as f64,
            _ => round_half_even(num as f64 / den as f64 * 100.0, 2),
        })
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = ReportError;

    /// Accepts canonical names and the legacy report headers
    /// (`DFP CTR`, `CTR`, `3P CTR`, `VSR`, `3P VSR`, `IR`, `3P IR`, `View %`).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let legacy = match s.trim() {
            "DFP CTR" | "CTR" => Some(Metric::PrimaryCtr),
            "3P CTR" => Some(Metric::SecondaryCtr),
            "VSR" => Some(Metric::Vsr),
            "3P VSR" => Some(Metric::VsrSecondary),
            "IR" => Some(Metric::InteractionRate),
            "3P IR" => Some(Metric::InteractionRateSecondary),
            "View %" => Some(Metric::ViewRate),
            _ => None,
        };
        if let Some(metric) = legacy {
            return Ok(metric);
        }
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == s.trim())
            .ok_or_else(|| ReportError::UnrecognizedMetric {
                given: s.to_string(),
                valid: choices(Metric::ALL.iter().map(|m| m.name())),
            })
    }
}

/// Rounds to `decimals` places, ties to even.
pub fn round_half_even(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round_ties_even() / scale
}

/// Evaluates `metric_name` for every row, in row order.
pub fn compute_metric(rows: &[AggregateRow], metric_name: &str) -> Result<Vec<Option<f64>>> {
    let metric: Metric = metric_name.parse()?;
    Ok(rows.iter().map(|row| metric.percent(&row.counters)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(imps: Option<u64>, clicks: Option<u64>) -> Counters {
        Counters {
            primary_impressions: imps,
            primary_clicks: clicks,
            ..Counters::default()
        }
    }

    #[test]
    fn test_ctr_rounds_to_two_decimals() {
        let c = counters(Some(1200), Some(5));
        assert_eq!(Metric::PrimaryCtr.percent(&c), Some(0.42));
    }

    #[test]
    fn test_round_half_even() {
        assert!((round_half_even(12.5, 0) - 12.0).abs() < 1e-9);
        assert!((round_half_even(13.5, 0) - 14.0).abs() < 1e-9);
        assert!((round_half_even(0.41666, 2) - 0.42).abs() < 1e-9);
    }

    #[test]
    fn test_zero_denominator_is_undefined() {
        let c = counters(Some(0), Some(0));
        for metric in Metric::ALL {
            assert_eq!(metric.percent(&c), None, "{metric}");
        }
        assert_eq!(Metric::PrimaryCtr.percent(&counters(None, Some(3))), None);
    }

    #[test]
    fn test_absent_numerator_term_is_undefined() {
        let mut c = counters(Some(1000), Some(10));
        assert_eq!(Metric::InteractionRate.percent(&c), None);

        c.interactive_sessions = Some(15);
        assert_eq!(Metric::InteractionRate.percent(&c), Some(2.5));
    }

    #[test]
    fn test_view_rate_truncates() {
        let c = Counters {
            primary_impressions: Some(3),
            viewable_impressions: Some(2),
            ..Counters::default()
        };
        assert_eq!(Metric::ViewRate.percent(&c), Some(66.0));

        let exact = Counters {
            primary_impressions: Some(100),
            viewable_impressions: Some(29),
            ..Counters::default()
        };
        assert_eq!(Metric::ViewRate.percent(&exact), Some(29.0));
    }

    #[test]
    fn test_secondary_formulas_use_secondary_impressions() {
        let c = Counters {
            primary_impressions: Some(1000),
            secondary_impressions: Some(800),
            secondary_clicks: Some(8),
            interactive_sessions: Some(12),
            completion_events: Some(200),
            ..Counters::default()
        };
        assert_eq!(Metric::SecondaryCtr.percent(&c), Some(1.0));
        assert_eq!(Metric::InteractionRateSecondary.percent(&c), Some(2.5));
        assert_eq!(Metric::VsrSecondary.percent(&c), Some(25.0));
        assert_eq!(Metric::Vsr.percent(&c), Some(20.0));
    }

    fn aggregate(counters: Counters) -> AggregateRow {
        AggregateRow {
            dimensions: Default::default(),
            counters,
            record_count: 1,
        }
    }

    #[test]
    fn test_compute_metric_by_name() {
        let rows = vec![
            aggregate(counters(Some(1200), Some(5))),
            aggregate(counters(Some(0), Some(0))),
            aggregate(counters(Some(400), Some(2))),
            aggregate(counters(Some(300), None)),
        ];

        let ctr = compute_metric(&rows, "primary_ctr").unwrap();
        assert_eq!(ctr, vec![Some(0.42), None, Some(0.5), None]);

        assert_eq!(compute_metric(&rows, "DFP CTR").unwrap(), ctr);

        let err = compute_metric(&rows, "cpm").unwrap_err();
        assert!(matches!(err, ReportError::UnrecognizedMetric { .. }));
        assert!(err.is_invalid_parameter());
    }

    #[test]
    fn test_metric_names_parse() {
        assert_eq!("DFP CTR".parse::<Metric>().unwrap(), Metric::PrimaryCtr);
        assert_eq!("View %".parse::<Metric>().unwrap(), Metric::ViewRate);
        assert_eq!("vsr_secondary".parse::<Metric>().unwrap(), Metric::VsrSecondary);
        let err = "cpm".parse::<Metric>().unwrap_err();
        assert!(matches!(err, ReportError::UnrecognizedMetric { .. }));
        assert!(err.to_string().contains("interaction_rate"));
    }
}
