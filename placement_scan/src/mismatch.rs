//! Flags placements whose primary KPI shows no signal despite enough volume.
//!
//! One [`MismatchRule`](crate::catalog::MismatchRule) per segment type decides
//! the grouping, the KPI counter and whether "no signal" means absent or zero.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{Catalog, MismatchReason, MismatchRule};
use crate::error::Result;
use crate::grouping::{filter_records, group_rows, DateWindow, Dimension, GroupingPolicy};
use crate::record::{Counter, PerformanceRecord, SegmentType};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MismatchRow {
    pub advertiser: String,
    pub site: String,
    pub creative_version: String,
    pub placement: String,
    pub segment_type: String,
    pub volume: u64,
    pub mismatch_reason: MismatchReason,
}

pub fn find_mismatches(
    records: &[PerformanceRecord],
    window: &DateWindow,
    impression_threshold: u64,
    catalog: &Catalog,
    policy: GroupingPolicy,
) -> Result<Vec<MismatchRow>> {
    let filtered = filter_records(records, window, |_| true);
    if filtered.is_empty() {
        return Err(window.empty_error());
    }

    let segments: BTreeSet<SegmentType> = filtered.iter().map(|r| r.segment_type).collect();

    let mut mismatches = Vec::new();
    for segment in segments {
        let Some(rule) = catalog.mismatch_rule(segment) else {
            debug!(%segment, "no mismatch rule for segment");
            continue;
        };
        let slice: Vec<&PerformanceRecord> = filtered
            .iter()
            .copied()
            .filter(|r| r.segment_type == segment)
            .collect();

        let found = apply_rule(&slice, rule, impression_threshold, policy)?;
        if found.is_empty() {
            info!(%segment, threshold = impression_threshold, "no mismatches for this segment");
        } else {
            debug!(%segment, count = found.len(), "mismatches found");
        }
        mismatches.extend(found);
    }

    mismatches.sort_by(|a, b| b.volume.cmp(&a.volume));
    Ok(mismatches)
}

fn apply_rule(
    records: &[&PerformanceRecord],
    rule: &MismatchRule,
    impression_threshold: u64,
    policy: GroupingPolicy,
) -> Result<Vec<MismatchRow>> {
    let grouped = group_rows(records, &rule.group_keys, &[], policy)?;

    Ok(grouped
        .rows
        .into_iter()
        .filter(|row| row.volume(Counter::PrimaryImpressions) >= impression_threshold)
        .filter(|row| rule.test.no_signal(row.counters.get(rule.kpi_counter)))
        .map(|row| MismatchRow {
            advertiser: row.dim(Dimension::Advertiser).to_string(),
            site: row.dim(Dimension::Site).to_string(),
            creative_version: match rule.creative_label {
                Some(label) => label.to_string(),
                None => row.dim(Dimension::CreativeVersion).to_string(),
            },
            placement: row.dim(Dimension::Placement).to_string(),
            segment_type: row.dim(Dimension::SegmentType).to_string(),
            volume: row.volume(Counter::PrimaryImpressions),
            mismatch_reason: rule.reason,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportError;
    use crate::grouping::tests::{day, make_record};

    fn window() -> DateWindow {
        DateWindow::new(day(1), day(10))
    }

    fn run(records: &[PerformanceRecord], threshold: u64) -> Result<Vec<MismatchRow>> {
        find_mismatches(
            records,
            &window(),
            threshold,
            &Catalog::standard(),
            GroupingPolicy::default(),
        )
    }

    #[test]
    fn test_interactive_without_sessions_is_flagged() {
        let record =
            make_record(2, "Acme", "home", SegmentType::InteractiveNonVideo, 2000, Some(4));
        let rows = run(&[record], 1000).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mismatch_reason, MismatchReason::NoKpiActions);
        assert_eq!(rows[0].volume, 2000);
        assert_eq!(rows[0].creative_version, "v1");
    }

    #[test]
    fn test_interactive_with_zero_sessions_is_not_flagged() {
        let mut record =
            make_record(2, "Acme", "home", SegmentType::InteractiveNonVideo, 2000, Some(4));
        record.counters.interactive_sessions = Some(0);
        assert!(run(&[record], 1000).unwrap().is_empty());
    }

    #[test]
    fn test_driver_needs_exact_zero_clicks() {
        let records = vec![
            make_record(2, "Acme", "home", SegmentType::BrandedDriver, 600, Some(0)),
            make_record(3, "Acme", "home", SegmentType::BrandedDriver, 600, Some(0)),
            make_record(2, "Beta", "home", SegmentType::TrafficDriver, 5000, None),
            make_record(2, "Gamma", "home", SegmentType::VideoAutoplay, 1500, Some(2)),
        ];
        let rows = run(&records, 1000).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].advertiser, "Acme");
        assert_eq!(rows[0].volume, 1200);
    }

    #[test]
    fn test_unclassified_uses_no_match_label() {
        let mut a = make_record(2, "Acme", "home", SegmentType::Unclassified, 700, Some(0));
        let mut b = a.clone();
        a.creative_version = "c1".to_string();
        b.creative_version = "c2".to_string();

        let rows = run(&[a, b], 1000).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].creative_version, "no match");
        assert_eq!(rows[0].mismatch_reason, MismatchReason::NoClicks);
        assert_eq!(rows[0].volume, 1400);
    }

    #[test]
    fn test_video_without_completions_sorted_by_volume() {
        let mut seen = make_record(2, "Acme", "a", SegmentType::Video, 3000, Some(1));
        seen.counters.completion_events = Some(10);
        let records = vec![
            seen,
            make_record(2, "Acme", "b", SegmentType::Video, 1500, Some(1)),
            make_record(2, "Acme", "c", SegmentType::InteractiveVideo, 4000, Some(1)),
            make_record(2, "Acme", "d", SegmentType::BrandSurvey, 999, Some(1)),
        ];
        let rows = run(&records, 1000).unwrap();
        let placements: Vec<_> = rows.iter().map(|r| r.placement.as_str()).collect();
        assert_eq!(placements, vec!["c", "b"]);
    }

    #[test]
    fn test_empty_window_fails() {
        let record = make_record(20, "Acme", "home", SegmentType::Video, 3000, Some(1));
        let err = run(&[record], 1000).unwrap_err();
        assert!(matches!(err, ReportError::NoRecordsInWindow { .. }));
    }
}
