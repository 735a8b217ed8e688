//! Immutable lookup tables shared by the reports.
//!
//! A [`Catalog`] is built once (normally [`Catalog::standard`]) and passed by
//! reference into each report call.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{choices, ReportError, Result};
use crate::grouping::Dimension;
use crate::metrics::Metric;
use crate::record::{AdSource, Counter, SegmentType};

/// Label used as `creative_version` for unclassified volume.
pub const NO_MATCH_LABEL: &str = "no match";

/// The full placement key used by most per-segment rules.
pub const PLACEMENT_KEYS: [Dimension; 5] = [
    Dimension::Advertiser,
    Dimension::Placement,
    Dimension::CreativeVersion,
    Dimension::Site,
    Dimension::SegmentType,
];

/// Metrics a segment reports for one ad source, and the counters they read.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiSet {
    pub metrics: Vec<Metric>,
    pub counters: Vec<Counter>,
}

/// How a rule decides a KPI counter shows no signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTest {
    /// The summed counter was never reported.
    Absent,
    /// The summed counter was reported and is exactly 0.
    Zero,
}

impl SignalTest {
    pub fn no_signal(self, value: Option<u64>) -> bool {
        match self {
            SignalTest::Absent => value.is_none(),
            SignalTest::Zero => value == Some(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchReason {
    NoKpiActions,
    NoClicks,
}

impl MismatchReason {
    pub fn label(self) -> &'static str {
        match self {
            MismatchReason::NoKpiActions => "no_kpi_actions",
            MismatchReason::NoClicks => "no_clicks",
        }
    }
}

/// Per-segment mismatch rule.
#[derive(Debug, Clone, PartialEq)]
pub struct MismatchRule {
    pub group_keys: Vec<Dimension>,
    pub kpi_counter: Counter,
    pub test: SignalTest,
    pub reason: MismatchReason,
    /// Replaces `creative_version` in the output when set.
    pub creative_label: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    kpi_sets: HashMap<(AdSource, SegmentType), KpiSet>,
    mismatch_rules: HashMap<SegmentType, MismatchRule>,
    benchmark_kpis: HashMap<SegmentType, Metric>,
}

impl Catalog {
    pub fn standard() -> Self {
        let mut kpi_sets = HashMap::new();
        let mut mismatch_rules = HashMap::new();
        let mut benchmark_kpis = HashMap::new();

        for segment in SegmentType::ALL {
            for source in [AdSource::Primary, AdSource::Secondary] {
                kpi_sets.insert((source, segment), kpi_set(source, segment));
            }
            mismatch_rules.insert(segment, mismatch_rule(segment));
            benchmark_kpis.insert(segment, benchmark_kpi(segment));
        }

        Self {
            kpi_sets,
            mismatch_rules,
            benchmark_kpis,
        }
    }

    /// KPI set for `segment` under `source`.
    pub fn kpi_set(&self, source: AdSource, segment: SegmentType) -> Result<&KpiSet> {
        self.kpi_sets
            .get(&(source, segment))
            .ok_or_else(|| ReportError::InvalidSegment {
                given: segment.slug().to_string(),
                valid: choices(self.reportable_segments(source).iter().map(|s| s.slug())),
            })
    }

    /// Segments that have a KPI set for `source`, in taxonomy order.
    pub fn reportable_segments(&self, source: AdSource) -> Vec<SegmentType> {
        SegmentType::ALL
            .into_iter()
            .filter(|s| self.kpi_sets.contains_key(&(source, *s)))
            .collect()
    }

    pub fn mismatch_rule(&self, segment: SegmentType) -> Option<&MismatchRule> {
        self.mismatch_rules.get(&segment)
    }

    /// KPI a segment is benchmarked on.
    pub fn benchmark_kpi(&self, segment: SegmentType) -> Option<Metric> {
        self.benchmark_kpis.get(&segment).copied()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

fn kpi_set(source: AdSource, segment: SegmentType) -> KpiSet {
    use SegmentType::*;

    let (ctr, ir, vsr) = match source {
        AdSource::Primary => (Metric::PrimaryCtr, Metric::InteractionRate, Metric::Vsr),
        AdSource::Secondary => (
            Metric::SecondaryCtr,
            Metric::InteractionRateSecondary,
            Metric::VsrSecondary,
        ),
    };
    let metrics = match segment {
        BrandedDriver | TrafficDriver | CoBrandedDriver | Unclassified => vec![ctr],
        Video | VideoAutoplay => vec![ctr, vsr],
        InteractiveNonVideo | BrandSurvey => vec![ctr, ir],
        InteractiveVideo => vec![ctr, ir, vsr],
    };

    let mut counters: Vec<Counter> = Vec::new();
    for metric in metrics.iter().chain([&Metric::ViewRate]) {
        for counter in metric.inputs() {
            if !counters.contains(&counter) {
                counters.push(counter);
            }
        }
    }

    KpiSet { metrics, counters }
}

fn mismatch_rule(segment: SegmentType) -> MismatchRule {
    use SegmentType::*;

    match segment {
        InteractiveNonVideo | BrandSurvey => MismatchRule {
            group_keys: PLACEMENT_KEYS.to_vec(),
            kpi_counter: Counter::InteractiveSessions,
            test: SignalTest::Absent,
            reason: MismatchReason::NoKpiActions,
            creative_label: None,
        },
        Unclassified => MismatchRule {
            group_keys: vec![
                Dimension::Advertiser,
                Dimension::Placement,
                Dimension::Site,
                Dimension::SegmentType,
            ],
            kpi_counter: Counter::PrimaryClicks,
            test: SignalTest::Zero,
            reason: MismatchReason::NoClicks,
            creative_label: Some(NO_MATCH_LABEL),
        },
        Video | InteractiveVideo => MismatchRule {
            group_keys: PLACEMENT_KEYS.to_vec(),
            kpi_counter: Counter::CompletionEvents,
            test: SignalTest::Absent,
            reason: MismatchReason::NoKpiActions,
            creative_label: None,
        },
        BrandedDriver | TrafficDriver | CoBrandedDriver | VideoAutoplay => MismatchRule {
            group_keys: PLACEMENT_KEYS.to_vec(),
            kpi_counter: Counter::PrimaryClicks,
            test: SignalTest::Zero,
            reason: MismatchReason::NoKpiActions,
            creative_label: None,
        },
    }
}

fn benchmark_kpi(segment: SegmentType) -> Metric {
    use SegmentType::*;

    match segment {
        InteractiveNonVideo | BrandSurvey => Metric::InteractionRate,
        Video | InteractiveVideo => Metric::Vsr,
        BrandedDriver | TrafficDriver | CoBrandedDriver | VideoAutoplay | Unclassified => {
            Metric::PrimaryCtr
        }
    }
}
