//! Date-window filtering and multi-key aggregation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::error::{ReportError, Result};
use crate::record::{Counter, Counters, PerformanceRecord};

/// Non-counter columns a table can be grouped by or carry along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Advertiser,
    Placement,
    CreativeVersion,
    Site,
    SegmentType,
    OrderId,
    LineItem,
    Date,
}

impl Dimension {
    pub fn name(self) -> &'static str {
        match self {
            Dimension::Advertiser => "advertiser",
            Dimension::Placement => "placement",
            Dimension::CreativeVersion => "creative_version",
            Dimension::Site => "site",
            Dimension::SegmentType => "segment_type",
            Dimension::OrderId => "order_id",
            Dimension::LineItem => "line_item",
            Dimension::Date => "date",
        }
    }

    pub fn value_of(self, record: &PerformanceRecord) -> String {
        match self {
            Dimension::Advertiser => record.advertiser.clone(),
            Dimension::Placement => record.placement.clone(),
            Dimension::CreativeVersion => record.creative_version.clone(),
            Dimension::Site => record.site.code().to_string(),
            Dimension::SegmentType => record.segment_type.slug().to_string(),
            Dimension::OrderId => record.order_id.clone(),
            Dimension::LineItem => record.line_item.clone(),
            Dimension::Date => record.date.to_string(),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive `[from, to]` date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    pub(crate) fn empty_error(&self) -> ReportError {
        ReportError::NoRecordsInWindow {
            from: self.from.to_string(),
            to: self.to.to_string(),
        }
    }
}

/// How to treat carried dimensions that vary inside one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupingPolicy {
    /// Fail with [`ReportError::DataQuality`] on the first conflict instead of
    /// recording a warning.
    pub strict: bool,
}

/// A carried dimension took more than one value inside a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataQualityWarning {
    pub dimension: Dimension,
    pub group: String,
    pub first: String,
    pub conflicting: String,
}

impl From<DataQualityWarning> for ReportError {
    fn from(w: DataQualityWarning) -> Self {
        ReportError::DataQuality {
            dimension: w.dimension.name().to_string(),
            group: w.group,
            first: w.first,
            conflicting: w.conflicting,
        }
    }
}

/// Counters summed over one group key.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    /// Group key values plus carried dimensions.
    pub dimensions: BTreeMap<Dimension, String>,
    pub counters: Counters,
    pub record_count: usize,
}

impl AggregateRow {
    /// Dimension value, or `""` when the row does not carry it.
    pub fn dim(&self, dimension: Dimension) -> &str {
        self.dimensions
            .get(&dimension)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn volume(&self, counter: Counter) -> u64 {
        self.counters.volume(counter)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Grouped {
    /// One row per key, ordered by key.
    pub rows: Vec<AggregateRow>,
    pub warnings: Vec<DataQualityWarning>,
}

/// Records inside `window` that satisfy `predicate`, in input order.
pub fn filter_records<'a, P>(
    records: &'a [PerformanceRecord],
    window: &DateWindow,
    predicate: P,
) -> Vec<&'a PerformanceRecord>
where
    P: Fn(&PerformanceRecord) -> bool,
{
    records
        .iter()
        .filter(|r| window.contains(r.date) && predicate(*r))
        .collect()
}

/// Sums counters per distinct `group_keys` combination.
///
/// `carried` dimensions are copied into each row and must be constant inside
/// the group; the first-seen value is kept and every conflict is reported.
pub fn group_rows(
    records: &[&PerformanceRecord],
    group_keys: &[Dimension],
    carried: &[Dimension],
    policy: GroupingPolicy,
) -> Result<Grouped> {
    let mut groups: BTreeMap<Vec<String>, AggregateRow> = BTreeMap::new();
    let mut warnings = Vec::new();
    let mut reported: BTreeSet<(Vec<String>, Dimension)> = BTreeSet::new();

    for record in records {
        let key: Vec<String> = group_keys.iter().map(|d| d.value_of(record)).collect();

        let row = groups.entry(key.clone()).or_insert_with(|| {
            let mut dimensions = BTreeMap::new();
            for (dim, value) in group_keys.iter().zip(&key) {
                dimensions.insert(*dim, value.clone());
            }
            for dim in carried {
                dimensions
                    .entry(*dim)
                    .or_insert_with(|| dim.value_of(record));
            }
            AggregateRow {
                dimensions,
                counters: Counters::default(),
                record_count: 0,
            }
        });

        for dim in carried.iter().filter(|d| !group_keys.contains(d)) {
            let value = dim.value_of(record);
            let first = row.dim(*dim);
            if first != value && reported.insert((key.clone(), *dim)) {
                let warning = DataQualityWarning {
                    dimension: *dim,
                    group: describe_key(group_keys, &key),
                    first: first.to_string(),
                    conflicting: value,
                };
                if policy.strict {
                    return Err(warning.into());
                }
                warn!(
                    dimension = %warning.dimension,
                    group = %warning.group,
                    first = %warning.first,
                    conflicting = %warning.conflicting,
                    "carried dimension varies within group, keeping first value"
                );
                warnings.push(warning);
            }
        }

        row.counters.accumulate(&record.counters);
        row.record_count += 1;
    }

    debug!(
        input = records.len(),
        groups = groups.len(),
        keys = %describe_dims(group_keys),
        "grouped records"
    );

    Ok(Grouped {
        rows: groups.into_values().collect(),
        warnings,
    })
}

/// Filter by date window and predicate, then group.
pub fn filter_and_group<P>(
    records: &[PerformanceRecord],
    window: &DateWindow,
    predicate: P,
    group_keys: &[Dimension],
    policy: GroupingPolicy,
) -> Result<Grouped>
where
    P: Fn(&PerformanceRecord) -> bool,
{
    let filtered = filter_records(records, window, predicate);
    group_rows(&filtered, group_keys, &[], policy)
}

fn describe_key(dims: &[Dimension], values: &[String]) -> String {
    dims.iter()
        .zip(values)
        .map(|(d, v)| format!("{d}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_dims(dims: &[Dimension]) -> String {
    dims.iter().map(|d| d.name()).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::record::{SegmentType, Site};

    pub(crate) fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2017, 11, d).unwrap()
    }

    pub(crate) fn make_record(
        date: u32,
        advertiser: &str,
        placement: &str,
        segment_type: SegmentType,
        impressions: u64,
        clicks: Option<u64>,
    ) -> PerformanceRecord {
        PerformanceRecord {
            date: day(date),
            advertiser: advertiser.to_string(),
            placement: placement.to_string(),
            site: Site::Qz,
            segment_type,
            creative_version: "v1".to_string(),
            order_id: "order-1".to_string(),
            line_item: "li-1".to_string(),
            counters: Counters {
                primary_impressions: Some(impressions),
                primary_clicks: clicks,
                ..Counters::default()
            },
        }
    }

    fn window() -> DateWindow {
        DateWindow::new(day(1), day(10))
    }

    #[test]
    fn test_date_bounds_are_inclusive() {
        let records = vec![
            make_record(1, "Acme", "home", SegmentType::Video, 10, Some(1)),
            make_record(10, "Acme", "home", SegmentType::Video, 20, Some(1)),
            make_record(11, "Acme", "home", SegmentType::Video, 40, Some(1)),
        ];
        let filtered = filter_records(&records, &window(), |_| true);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_group_sums_per_key() {
        let records = vec![
            make_record(2, "Acme", "home", SegmentType::BrandedDriver, 500, Some(5)),
            make_record(3, "Acme", "home", SegmentType::BrandedDriver, 700, Some(0)),
            make_record(3, "Beta", "home", SegmentType::BrandedDriver, 100, None),
        ];
        let grouped = filter_and_group(
            &records,
            &window(),
            |_| true,
            &[Dimension::Advertiser, Dimension::Placement],
            GroupingPolicy::default(),
        )
        .unwrap();

        assert_eq!(grouped.rows.len(), 2);
        let acme = &grouped.rows[0];
        assert_eq!(acme.dim(Dimension::Advertiser), "Acme");
        assert_eq!(acme.counters.primary_impressions, Some(1200));
        assert_eq!(acme.counters.primary_clicks, Some(5));
        assert_eq!(acme.record_count, 2);

        let beta = &grouped.rows[1];
        assert_eq!(beta.counters.primary_clicks, None);
        assert!(grouped.warnings.is_empty());
    }

    #[test]
    fn test_sum_preservation() {
        let mut records = Vec::new();
        for i in 0..40u64 {
            let seg = SegmentType::ALL[(i % 9) as usize];
            let adv = ["Acme", "Beta", "Gamma"][(i % 3) as usize];
            records.push(make_record(
                1 + (i % 10) as u32,
                adv,
                &format!("p{}", i % 4),
                seg,
                100 + i * 7,
                Some(i % 5),
            ));
        }
        let grouped = filter_and_group(
            &records,
            &window(),
            |_| true,
            &[Dimension::SegmentType, Dimension::Advertiser],
            GroupingPolicy::default(),
        )
        .unwrap();

        for counter in [Counter::PrimaryImpressions, Counter::PrimaryClicks] {
            let input: u64 = records.iter().map(|r| r.counters.volume(counter)).sum();
            let output: u64 = grouped.rows.iter().map(|r| r.volume(counter)).sum();
            assert_eq!(input, output, "{counter}");
        }
        let count: usize = grouped.rows.iter().map(|r| r.record_count).sum();
        assert_eq!(count, records.len());
    }

    #[test]
    fn test_carried_dimension_conflict_is_reported() {
        let mut a = make_record(2, "Acme", "home", SegmentType::Video, 10, Some(1));
        let mut b = a.clone();
        a.line_item = "li-1".to_string();
        b.line_item = "li-2".to_string();
        let records = vec![a, b];
        let filtered = filter_records(&records, &window(), |_| true);

        let grouped = group_rows(
            &filtered,
            &[Dimension::Advertiser],
            &[Dimension::LineItem],
            GroupingPolicy::default(),
        )
        .unwrap();
        assert_eq!(grouped.rows.len(), 1);
        assert_eq!(grouped.rows[0].dim(Dimension::LineItem), "li-1");
        assert_eq!(grouped.warnings.len(), 1);
        assert_eq!(grouped.warnings[0].conflicting, "li-2");

        let strict = group_rows(
            &filtered,
            &[Dimension::Advertiser],
            &[Dimension::LineItem],
            GroupingPolicy { strict: true },
        );
        assert!(matches!(strict, Err(ReportError::DataQuality { .. })));
    }
}
