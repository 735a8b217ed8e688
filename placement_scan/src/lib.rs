//! Placement performance engine: derived ad metrics, share ranking,
//! mismatch detection and benchmark comparison over a closed batch of
//! ad-server records.

pub mod benchmark;
pub mod catalog;
pub mod config;
pub mod error;
pub mod grouping;
pub mod loader;
pub mod metrics;
pub mod mismatch;
pub mod output;
pub mod record;
pub mod reports;
pub mod share;

pub use benchmark::{
    compare_to_benchmark, compare_viewability, BenchmarkComparison, BenchmarkEntry,
    BenchmarkTable, ViewabilityEntry, ViewabilityTable,
};
pub use catalog::Catalog;
pub use error::{ReportError, Result};
pub use grouping::{filter_and_group, DateWindow, Dimension, GroupingPolicy};
pub use metrics::{compute_metric, Metric};
pub use mismatch::find_mismatches;
pub use record::{AdSource, Counters, PerformanceRecord, SegmentType, Site};
pub use reports::{locate_unclassified, metric_report, site_summary};
pub use share::add_share_columns;
