//! Volume reports: site/segment summary, per-advertiser metrics and the
//! unclassified-volume locator.

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, warn};

use crate::catalog::{Catalog, NO_MATCH_LABEL};
use crate::error::Result;
use crate::grouping::{filter_records, group_rows, DateWindow, Dimension, GroupingPolicy};
use crate::metrics::Metric;
use crate::output::group_thousands;
use crate::record::{AdSource, PerformanceRecord, SegmentType, Site};
use crate::share::add_share_columns;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SiteSummaryRow {
    pub segment_type: String,
    pub site: String,
    #[serde(skip)]
    pub volume: u64,
    /// Thousands-grouped volume, for display only.
    #[serde(rename = "volume")]
    pub volume_display: String,
    pub share: u64,
    pub cumulative_share: u64,
}

/// Impression volume per (segment type, site), ranked by volume.
pub fn site_summary(
    records: &[PerformanceRecord],
    window: &DateWindow,
    ad_source: &str,
    policy: GroupingPolicy,
) -> Result<Vec<SiteSummaryRow>> {
    let source: AdSource = ad_source.parse()?;
    let volume = source.impressions();

    let filtered = filter_records(records, window, |_| true);
    let grouped = group_rows(
        &filtered,
        &[Dimension::SegmentType, Dimension::Site],
        &[],
        policy,
    )?;
    let ranked = add_share_columns(grouped.rows, volume)?;

    Ok(ranked
        .into_iter()
        .map(|r| SiteSummaryRow {
            segment_type: r.row.dim(Dimension::SegmentType).to_string(),
            site: r.row.dim(Dimension::Site).to_string(),
            volume: r.volume,
            volume_display: group_thousands(r.volume),
            share: r.share,
            cumulative_share: r.cumulative_share,
        })
        .collect())
}

/// One (advertiser, placement) line of a metric report.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReportRow {
    pub advertiser: String,
    pub placement: String,
    pub ad_source: AdSource,
    pub volume: u64,
    pub share: u64,
    pub cumulative_share: u64,
    /// KPI values in the segment's declared order; `None` is undefined.
    pub metrics: Vec<(Metric, Option<f64>)>,
    pub view_rate: Option<f64>,
}

impl MetricReportRow {
    /// Column names in output order.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut cols = vec![
            "advertiser",
            "placement",
            self.ad_source.impressions().name(),
            "share",
            "cumulative_share",
        ];
        cols.extend(self.metrics.iter().map(|(m, _)| m.name()));
        cols.push(Metric::ViewRate.name());
        cols
    }
}

impl Serialize for MetricReportRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(6 + self.metrics.len()))?;
        map.serialize_entry("advertiser", &self.advertiser)?;
        map.serialize_entry("placement", &self.placement)?;
        map.serialize_entry(self.ad_source.impressions().name(), &self.volume)?;
        map.serialize_entry("share", &self.share)?;
        map.serialize_entry("cumulative_share", &self.cumulative_share)?;
        for (metric, value) in &self.metrics {
            map.serialize_entry(metric.name(), value)?;
        }
        map.serialize_entry(Metric::ViewRate.name(), &self.view_rate)?;
        map.end()
    }
}

/// KPI metrics per (advertiser, placement) for one site, segment and ad source.
pub fn metric_report(
    records: &[PerformanceRecord],
    window: &DateWindow,
    site: &str,
    segment_type: &str,
    ad_source: &str,
    catalog: &Catalog,
    policy: GroupingPolicy,
) -> Result<Vec<MetricReportRow>> {
    let site: Site = site.parse()?;
    let segment: SegmentType = segment_type.parse()?;
    let source: AdSource = ad_source.parse()?;
    let kpis = catalog.kpi_set(source, segment)?;

    let filtered = filter_records(records, window, |r| {
        r.segment_type == segment && r.site == site
    });
    let grouped = group_rows(
        &filtered,
        &[Dimension::Advertiser, Dimension::Placement],
        &[],
        policy,
    )?;

    for counter in &kpis.counters {
        let absent_everywhere = !grouped.rows.is_empty()
            && grouped
                .rows
                .iter()
                .all(|r| r.counters.get(*counter).is_none());
        if absent_everywhere {
            warn!(
                %counter,
                %segment,
                %site,
                "required counter absent for every placement, dependent metrics are undefined"
            );
        }
    }

    let volume = source.impressions();
    let ranked = add_share_columns(grouped.rows, volume)?;
    debug!(rows = ranked.len(), %segment, %site, "metric report ranked");

    Ok(ranked
        .into_iter()
        .map(|r| MetricReportRow {
            advertiser: r.row.dim(Dimension::Advertiser).to_string(),
            placement: r.row.dim(Dimension::Placement).to_string(),
            ad_source: source,
            volume: r.volume,
            share: r.share,
            cumulative_share: r.cumulative_share,
            metrics: kpis
                .metrics
                .iter()
                .map(|m| (*m, m.percent(&r.row.counters)))
                .collect(),
            view_rate: Metric::ViewRate.percent(&r.row.counters),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UnclassifiedRow {
    pub advertiser: String,
    pub order_id: String,
    pub site: String,
    pub line_item: String,
    pub status: &'static str,
    pub impressions: u64,
}

/// Per order, the (advertiser, site, line item) groups carrying unclassified
/// volume strictly above `impression_threshold`.
pub fn locate_unclassified(
    records: &[PerformanceRecord],
    window: &DateWindow,
    impression_threshold: u64,
    policy: GroupingPolicy,
) -> Result<Vec<UnclassifiedRow>> {
    let filtered = filter_records(records, window, |r| {
        r.segment_type == SegmentType::Unclassified
    });
    let grouped = group_rows(
        &filtered,
        &[
            Dimension::OrderId,
            Dimension::Advertiser,
            Dimension::Site,
            Dimension::LineItem,
        ],
        &[],
        policy,
    )?;

    Ok(grouped
        .rows
        .into_iter()
        .filter_map(|row| {
            let impressions = row.counters.primary_impressions?;
            (impressions > impression_threshold).then(|| UnclassifiedRow {
                advertiser: row.dim(Dimension::Advertiser).to_string(),
                order_id: row.dim(Dimension::OrderId).to_string(),
                site: row.dim(Dimension::Site).to_string(),
                line_item: row.dim(Dimension::LineItem).to_string(),
                status: NO_MATCH_LABEL,
                impressions,
            })
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

    #[test]
    fn test_site_summary_shares() {
        let records = vec![
            make_record(2, "Acme", "home", SegmentType::Video, 900, Some(1)),
            make_record(3, "Beta", "home", SegmentType::BrandedDriver, 100, Some(1)),
        ];
        let rows =
            site_summary(&records, &window(), "primary", GroupingPolicy::default()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].segment_type, "video");
        assert_eq!((rows[0].share, rows[0].cumulative_share), (90, 90));
        assert_eq!((rows[1].share, rows[1].cumulative_share), (10, 100));
    }

    #[test]
    fn test_site_summary_formats_volume_last() {
        let records = vec![make_record(
            2,
            "Acme",
            "home",
            SegmentType::Video,
            1_234_567,
            Some(1),
        )];
        let rows = site_summary(&records, &window(), "DFP", GroupingPolicy::default()).unwrap();
        assert_eq!(rows[0].volume, 1_234_567);
        assert_eq!(rows[0].volume_display, "1,234,567");
        assert_eq!(rows[0].share, 100);
    }

    #[test]
    fn test_site_summary_rejects_unknown_ad_source() {
        let err = site_summary(&[], &window(), "tv", GroupingPolicy::default()).unwrap_err();
        assert!(matches!(err, ReportError::InvalidAdSource { .. }));
    }

    #[test]
    fn test_metric_report_branded_driver() {
        let records = vec![
            make_record(2, "Acme", "home", SegmentType::BrandedDriver, 500, Some(5)),
            make_record(4, "Acme", "home", SegmentType::BrandedDriver, 700, Some(0)),
            make_record(4, "Acme", "home", SegmentType::Video, 700, Some(0)),
        ];
        let rows = metric_report(
            &records,
            &window(),
            "qz",
            "branded driver",
            "primary",
            &Catalog::standard(),
            GroupingPolicy::default(),
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.volume, 1200);
        assert_eq!(row.metrics, vec![(Metric::PrimaryCtr, Some(0.42))]);
        assert_eq!(row.view_rate, None);
        assert_eq!(
            row.columns(),
            vec![
                "advertiser",
                "placement",
                "primary_impressions",
                "share",
                "cumulative_share",
                "primary_ctr",
                "view_rate"
            ]
        );
    }

    #[test]
    fn test_metric_report_validates_before_work() {
        let catalog = Catalog::standard();
        let run = |site: &str, segment: &str| {
            metric_report(
                &[],
                &window(),
                site,
                segment,
                "primary",
                &catalog,
                GroupingPolicy::default(),
            )
            .unwrap_err()
        };

        let err = run("xx", "video");
        assert!(matches!(err, ReportError::InvalidSite { .. }));
        assert!(err.to_string().contains("qz; wrk; zty"));

        assert!(matches!(run("qz", "banner"), ReportError::InvalidSegment { .. }));
        assert!(matches!(run("qz", "video"), ReportError::EmptyInput(_)));
    }

    #[test]
    fn test_metric_report_secondary_columns_serialize_in_order() {
        let mut record = make_record(2, "Acme", "home", SegmentType::Video, 1000, Some(3));
        record.counters.secondary_impressions = Some(800);
        record.counters.secondary_clicks = Some(8);
        record.counters.completion_events = Some(200);
        record.counters.viewable_impressions = Some(555);

        let rows = metric_report(
            &[record],
            &window(),
            "qz",
            "video",
            "3P",
            &Catalog::standard(),
            GroupingPolicy::default(),
        )
        .unwrap();

        let json = serde_json::to_string(&rows[0]).unwrap();
        assert_eq!(
            json,
            r#"{"advertiser":"Acme","placement":"home","secondary_impressions":800,"share":100,"cumulative_share":100,"secondary_ctr":1.0,"vsr_secondary":25.0,"view_rate":55.0}"#
        );
    }

    #[test]
    fn test_rerun_is_identical() {
        let records: Vec<_> = (0..30u64)
            .map(|i| {
                make_record(
                    1 + (i % 10) as u32,
                    ["Acme", "Beta"][(i % 2) as usize],
                    &format!("p{}", i % 5),
                    SegmentType::BrandedDriver,
                    100 + i,
                    Some(i % 3),
                )
            })
            .collect();
        let run = || {
            let rows = metric_report(
                &records,
                &window(),
                "qz",
                "branded_driver",
                "primary",
                &Catalog::standard(),
                GroupingPolicy::default(),
            )
            .unwrap();
            serde_json::to_string(&rows).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_locate_unclassified_per_order() {
        let mut a = make_record(2, "Acme", "home", SegmentType::Unclassified, 800, Some(0));
        let mut b = a.clone();
        b.date = day(3);
        let mut c = a.clone();
        c.order_id = "order-2".to_string();
        c.counters.primary_impressions = Some(1000);
        let d = make_record(2, "Acme", "home", SegmentType::Video, 5000, Some(0));
        a.line_item = "li-1".to_string();
        b.line_item = "li-1".to_string();

        let rows = locate_unclassified(&[a, b, c, d], &window(), 1000, GroupingPolicy::default())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].order_id, "order-1");
        assert_eq!(rows[0].impressions, 1600);
        assert_eq!(rows[0].status, "no match");
    }
}
