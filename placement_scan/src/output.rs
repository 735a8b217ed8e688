//! Presentation: CSV and JSON-lines rendering of report rows.

use std::io::{self, Write};

use serde::Serialize;

use crate::benchmark::{BenchmarkRow, ViewabilityRow};
use crate::mismatch::MismatchRow;
use crate::reports::{MetricReportRow, SiteSummaryRow, UnclassifiedRow};

/// `1234567` -> `"1,234,567"`.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Undefined values render as an empty cell.
fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Header plus stringified rows, ready for CSV.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub trait ToTable {
    fn to_table(&self) -> Table;
}

fn header(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

impl ToTable for [SiteSummaryRow] {
    fn to_table(&self) -> Table {
        Table {
            header: header(&["segment_type", "site", "volume", "share", "cumulative_share"]),
            rows: self
                .iter()
                .map(|r| {
                    vec![
                        r.segment_type.clone(),
                        r.site.clone(),
                        r.volume_display.clone(),
                        r.share.to_string(),
                        r.cumulative_share.to_string(),
                    ]
                })
                .collect(),
        }
    }
}

impl ToTable for [MetricReportRow] {
    fn to_table(&self) -> Table {
        let header = self
            .first()
            .map(|r| r.columns().into_iter().map(String::from).collect())
            .unwrap_or_default();
        Table {
            header,
            rows: self
                .iter()
                .map(|r| {
                    let mut cells = vec![
                        r.advertiser.clone(),
                        r.placement.clone(),
                        r.volume.to_string(),
                        r.share.to_string(),
                        r.cumulative_share.to_string(),
                    ];
                    cells.extend(r.metrics.iter().map(|(_, v)| cell(*v)));
                    cells.push(cell(r.view_rate));
                    cells
                })
                .collect(),
        }
    }
}

impl ToTable for [MismatchRow] {
    fn to_table(&self) -> Table {
        Table {
            header: header(&[
                "advertiser",
                "site",
                "creative_version",
                "placement",
                "segment_type",
                "volume",
                "mismatch_reason",
            ]),
            rows: self
                .iter()
                .map(|r| {
                    vec![
                        r.advertiser.clone(),
                        r.site.clone(),
                        r.creative_version.clone(),
                        r.placement.clone(),
                        r.segment_type.clone(),
                        r.volume.to_string(),
                        r.mismatch_reason.label().to_string(),
                    ]
                })
                .collect(),
        }
    }
}

impl ToTable for [BenchmarkRow] {
    fn to_table(&self) -> Table {
        Table {
            header: header(&[
                "advertiser",
                "placement",
                "creative_version",
                "site",
                "segment_type",
                "order_id",
                "volume",
                "kpi_name",
                "kpi_rate",
                "benchmark_rate",
                "below_bench",
            ]),
            rows: self
                .iter()
                .map(|r| {
                    vec![
                        r.advertiser.clone(),
                        r.placement.clone(),
                        r.creative_version.clone(),
                        r.site.clone(),
                        r.segment_type.clone(),
                        r.order_id.clone(),
                        r.volume.to_string(),
                        r.kpi_name.to_string(),
                        cell(r.kpi_rate),
                        cell(r.benchmark_rate),
                        cell(r.below_bench),
                    ]
                })
                .collect(),
        }
    }
}

impl ToTable for [ViewabilityRow] {
    fn to_table(&self) -> Table {
        Table {
            header: header(&[
                "advertiser",
                "site",
                "placement",
                "creative_version",
                "segment_type",
                "volume",
                "viewable_rate",
                "benchmark_viewable_rate",
                "below_view",
            ]),
            rows: self
                .iter()
                .map(|r| {
                    vec![
                        r.advertiser.clone(),
                        r.site.clone(),
                        r.placement.clone(),
                        r.creative_version.clone(),
                        r.segment_type.clone(),
                        r.volume.to_string(),
                        r.viewable_rate.to_string(),
                        r.benchmark_viewable_rate.to_string(),
                        r.below_view.to_string(),
                    ]
                })
                .collect(),
        }
    }
}

impl ToTable for [UnclassifiedRow] {
    fn to_table(&self) -> Table {
        Table {
            header: header(&[
                "advertiser",
                "order_id",
                "site",
                "line_item",
                "status",
                "impressions",
            ]),
            rows: self
                .iter()
                .map(|r| {
                    vec![
                        r.advertiser.clone(),
                        r.order_id.clone(),
                        r.site.clone(),
                        r.line_item.clone(),
                        r.status.to_string(),
                        r.impressions.to_string(),
                    ]
                })
                .collect(),
        }
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn write_csv<W: Write>(out: &mut W, table: &Table) -> io::Result<()> {
    let line = |cells: &[String]| {
        cells
            .iter()
            .map(|c| csv_field(c))
            .collect::<Vec<_>>()
            .join(",")
    };
    writeln!(out, "{}", line(&table.header))?;
    for row in &table.rows {
        writeln!(out, "{}", line(row))?;
    }
    Ok(())
}

/// One JSON object per line.
pub fn write_json_lines<W: Write, T: Serialize>(out: &mut W, rows: &[T]) -> io::Result<()> {
    for row in rows {
        serde_json::to_writer(&mut *out, row)?;
        writeln!(out)?;
    }
    Ok(())
}
