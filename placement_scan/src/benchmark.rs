//! Comparison of aggregated KPI and viewability rates against external
//! per-placement benchmarks.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, PLACEMENT_KEYS};
use crate::error::{ReportError, Result};
use crate::grouping::{
    filter_records, group_rows, AggregateRow, DataQualityWarning, DateWindow, Dimension,
    GroupingPolicy,
};
use crate::metrics::Metric;
use crate::record::{normalize_placement, Counter, PerformanceRecord, SegmentType, Site};

/// One KPI benchmark as supplied by the benchmark source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    pub placement: String,
    pub kpi_name: String,
    /// Fraction, not percent.
    pub benchmark_rate: f64,
    #[serde(default)]
    pub data_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewabilityEntry {
    pub placement: String,
    pub benchmark_viewable_rate: f64,
}

/// KPI benchmarks keyed by (lower-cased placement, KPI).
#[derive(Debug, Clone, Default)]
pub struct BenchmarkTable {
    rates: HashMap<(String, Metric), f64>,
}

impl BenchmarkTable {
    /// Builds the lookup, keeping only entries of `data_source` when given.
    /// Entries with an unknown KPI name are skipped; for duplicate keys the
    /// first entry wins.
    pub fn from_entries(entries: &[BenchmarkEntry], data_source: Option<&str>) -> Self {
        let mut rates = HashMap::new();
        for entry in entries {
            if let Some(wanted) = data_source {
                if entry.data_source.as_deref() != Some(wanted) {
                    continue;
                }
            }
            let metric: Metric = match entry.kpi_name.parse() {
                Ok(m) => m,
                Err(e) => {
                    warn!(placement = %entry.placement, error = %e, "skipping benchmark entry");
                    continue;
                }
            };
            let key = (normalize_placement(&entry.placement), metric);
            if rates.contains_key(&key) {
                warn!(placement = %key.0, kpi = %metric, "duplicate benchmark entry ignored");
                continue;
            }
            rates.insert(key, entry.benchmark_rate);
        }
        debug!(entries = rates.len(), "benchmark table built");
        Self { rates }
    }

    pub fn rate(&self, placement: &str, kpi: Metric) -> Option<f64> {
        self.rates
            .get(&(normalize_placement(placement), kpi))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Viewability benchmarks keyed by lower-cased placement.
#[derive(Debug, Clone, Default)]
pub struct ViewabilityTable {
    rates: HashMap<String, f64>,
}

impl ViewabilityTable {
    pub fn from_entries(entries: &[ViewabilityEntry]) -> Self {
        let mut rates = HashMap::new();
        for entry in entries {
            rates
                .entry(normalize_placement(&entry.placement))
                .or_insert(entry.benchmark_viewable_rate);
        }
        Self { rates }
    }

    pub fn rate(&self, placement: &str) -> Option<f64> {
        self.rates.get(&normalize_placement(placement)).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkRow {
    pub advertiser: String,
    pub placement: String,
    pub creative_version: String,
    pub site: String,
    pub segment_type: String,
    pub order_id: String,
    pub volume: u64,
    pub kpi_name: Metric,
    pub kpi_rate: Option<f64>,
    pub benchmark_rate: Option<f64>,
    /// `kpi_rate - benchmark_rate`; undefined when either side is.
    pub below_bench: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BenchmarkSummary {
    pub above_count: usize,
    pub below_count: usize,
    /// Rows with no benchmark for their (placement, KPI).
    pub unmatched_count: usize,
    /// Rows with a benchmark but an undefined KPI rate.
    pub undefined_count: usize,
    pub above_volume: u64,
    pub below_volume: u64,
    /// Share of compared volume at or above benchmark, in percent.
    pub pct_volume_above: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkComparison {
    /// Every qualifying row with its join result, volume descending.
    pub joined: Vec<BenchmarkRow>,
    pub summary: BenchmarkSummary,
    /// Rows strictly below benchmark, volume descending.
    pub below: Vec<BenchmarkRow>,
    /// Groups whose carried `order_id` was not constant.
    pub warnings: Vec<DataQualityWarning>,
}

/// Compares each qualifying placement's KPI rate with its benchmark.
pub fn compare_to_benchmark(
    records: &[PerformanceRecord],
    benchmarks: &BenchmarkTable,
    window: &DateWindow,
    site: &str,
    impression_threshold: u64,
    catalog: &Catalog,
    policy: GroupingPolicy,
) -> Result<BenchmarkComparison> {
    let site: Site = site.parse()?;

    let filtered = filter_records(records, window, |r| r.site == site);
    let segments: BTreeSet<SegmentType> = filtered.iter().map(|r| r.segment_type).collect();

    let mut joined = Vec::new();
    let mut warnings = Vec::new();
    for segment in segments {
        let Some(kpi) = catalog.benchmark_kpi(segment) else {
            continue;
        };
        let slice: Vec<&PerformanceRecord> = filtered
            .iter()
            .copied()
            .filter(|r| r.segment_type == segment)
            .collect();
        // order is carried so underperformers can be traced back to a buy
        let grouped = group_rows(&slice, &PLACEMENT_KEYS, &[Dimension::OrderId], policy)?;
        warnings.extend(grouped.warnings);

        for row in qualifying(grouped.rows, impression_threshold) {
            let placement = row.dim(Dimension::Placement).to_string();
            let kpi_rate = kpi.ratio(&row.counters);
            let benchmark_rate = benchmarks.rate(&placement, kpi);
            let below_bench = match (kpi_rate, benchmark_rate) {
                (Some(rate), Some(bench)) => Some(rate - bench),
                _ => None,
            };
            joined.push(BenchmarkRow {
                advertiser: row.dim(Dimension::Advertiser).to_string(),
                placement,
                creative_version: row.dim(Dimension::CreativeVersion).to_string(),
                site: row.dim(Dimension::Site).to_string(),
                segment_type: row.dim(Dimension::SegmentType).to_string(),
                order_id: row.dim(Dimension::OrderId).to_string(),
                volume: row.volume(Counter::PrimaryImpressions),
                kpi_name: kpi,
                kpi_rate,
                benchmark_rate,
                below_bench,
            });
        }
    }
    joined.sort_by(|a, b| b.volume.cmp(&a.volume));

    let summary = summarize(&joined)?;
    info!(
        above = summary.above_count,
        below = summary.below_count,
        unmatched = summary.unmatched_count,
        pct_volume_above = summary.pct_volume_above,
        "benchmark comparison"
    );

    let below = joined
        .iter()
        .filter(|r| r.below_bench.is_some_and(|d| d < 0.0))
        .cloned()
        .collect();

    Ok(BenchmarkComparison {
        joined,
        summary,
        below,
        warnings,
    })
}

fn summarize(rows: &[BenchmarkRow]) -> Result<BenchmarkSummary> {
    let mut summary = BenchmarkSummary::default();
    for row in rows {
        match (row.benchmark_rate, row.below_bench) {
            (None, _) => summary.unmatched_count += 1,
            (Some(_), None) => summary.undefined_count += 1,
            (Some(_), Some(delta)) if delta >= 0.0 => {
                summary.above_count += 1;
                summary.above_volume += row.volume;
            }
            (Some(_), Some(_)) => {
                summary.below_count += 1;
                summary.below_volume += row.volume;
            }
        }
    }
    if summary.unmatched_count > 0 {
        warn!(rows = summary.unmatched_count, "rows without a benchmark entry");
    }

    let compared = summary.above_volume + summary.below_volume;
    if compared == 0 {
        return Err(ReportError::NoBenchmarkMatches {
            unmatched: summary.unmatched_count,
        });
    }
    summary.pct_volume_above = summary.above_volume as f64 / compared as f64 * 100.0;
    Ok(summary)
}

fn qualifying(
    rows: Vec<AggregateRow>,
    impression_threshold: u64,
) -> impl Iterator<Item = AggregateRow> {
    rows.into_iter()
        .filter(move |r| r.volume(Counter::PrimaryImpressions) >= impression_threshold)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewabilityRow {
    pub advertiser: String,
    pub site: String,
    pub placement: String,
    pub creative_version: String,
    pub segment_type: String,
    pub volume: u64,
    pub viewable_rate: f64,
    pub benchmark_viewable_rate: f64,
    pub below_view: f64,
}

/// Placements whose viewable-impression ratio is below their viewability
/// benchmark, most-below first.
pub fn compare_viewability(
    records: &[PerformanceRecord],
    benchmarks: &ViewabilityTable,
    window: &DateWindow,
    site: &str,
    impression_threshold: u64,
    policy: GroupingPolicy,
) -> Result<Vec<ViewabilityRow>> {
    let site: Site = site.parse()?;

    let filtered = filter_records(records, window, |r| r.site == site);
    let grouped = group_rows(&filtered, &PLACEMENT_KEYS, &[], policy)?;

    let mut rows: Vec<ViewabilityRow> = qualifying(grouped.rows, impression_threshold)
        .filter_map(|row| {
            let placement = row.dim(Dimension::Placement).to_string();
            let viewable_rate = Metric::ViewRate.ratio(&row.counters)?;
            let benchmark_viewable_rate = benchmarks.rate(&placement)?;
            let below_view = viewable_rate - benchmark_viewable_rate;
            (below_view < 0.0).then(|| ViewabilityRow {
                advertiser: row.dim(Dimension::Advertiser).to_string(),
                site: row.dim(Dimension::Site).to_string(),
                placement,
                creative_version: row.dim(Dimension::CreativeVersion).to_string(),
                segment_type: row.dim(Dimension::SegmentType).to_string(),
                volume: row.volume(Counter::PrimaryImpressions),
                viewable_rate,
                benchmark_viewable_rate,
                below_view,
            })
        })
        .collect();

    rows.sort_by(|a, b| a.below_view.total_cmp(&b.below_view));
    Ok(rows)
}
