use std::{env, fs::OpenOptions, io::Write};

use anyhow::{Context, Result};
use aws_sdk_s3::Client as S3Client;
use chrono::{Days, NaiveDate};
use serde_json::{json, Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Where generated export rows go.
enum ExportSink {
    /// Every day appended to one JSONL file.
    File(std::fs::File),
    /// One object per export day under `<prefix>/date=YYYY-MM-DD/`.
    S3 {
        client: S3Client,
        bucket: String,
        prefix: String,
    },
}

impl ExportSink {
    async fn from_env() -> Result<Self> {
        match env::var("EXPORT_DESTINATION").as_deref() {
            Ok("s3") => {
                let bucket = env::var("S3_BUCKET").context(
                    "S3_BUCKET environment variable required when EXPORT_DESTINATION=s3",
                )?;
                let prefix = env::var("S3_PREFIX").unwrap_or_default();
                let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .load()
                    .await;

                info!(%bucket, %prefix, "exporting one S3 object per day");
                Ok(ExportSink::S3 {
                    client: S3Client::new(&config),
                    bucket,
                    prefix,
                })
            }
            _ => {
                let path = env::var("EXPORT_FILE")
                    .unwrap_or_else(|_| "performance_export.jsonl".to_string());
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("Failed to open export file: {}", path))?;

                info!(%path, "exporting to local file");
                Ok(ExportSink::File(file))
            }
        }
    }

    /// Writes all rows of one export day.
    async fn write_day(&mut self, date: NaiveDate, rows: &[Value]) -> Result<()> {
        let mut body = String::new();
        for row in rows {
            body.push_str(&row.to_string());
            body.push('\n');
        }

        match self {
            ExportSink::File(file) => {
                file.write_all(body.as_bytes())?;
                file.flush()?;
            }
            ExportSink::S3 {
                client,
                bucket,
                prefix,
            } => {
                let key = day_key(prefix, date);
                client
                    .put_object()
                    .bucket(bucket.as_str())
                    .key(&key)
                    .body(body.into_bytes().into())
                    .content_type("application/x-ndjson")
                    .send()
                    .await
                    .with_context(|| format!("Failed to write s3://{}/{}", bucket, key))?;
                info!(rows = rows.len(), "wrote s3://{}/{}", bucket, key);
            }
        }
        Ok(())
    }
}

/// Object key for one export day. Rerunning a day overwrites its object.
fn day_key(prefix: &str, date: NaiveDate) -> String {
    let name = format!("date={}/performance_export.jsonl", date.format("%Y-%m-%d"));
    match prefix.trim_end_matches('/') {
        "" => name,
        prefix => format!("{prefix}/{name}"),
    }
}

/// A creative line the generator delivers every day.
struct Line {
    advertiser: &'static str,
    order_id: &'static str,
    line_item: &'static str,
    placement: &'static str,
    site: &'static str,
    segment_type: &'static str,
    creative_version: &'static str,
    daily_impressions: u64,
    /// Per-mille click rate; 0 produces a zero-click line.
    clicks_per_mille: u64,
    /// Report interactive sessions / completion events when the segment has them.
    reports_kpi: bool,
}

const LINES: &[Line] = &[
    Line {
        advertiser: "Acme",
        order_id: "ord-100",
        line_item: "li-1",
        placement: "Home_Top",
        site: "qz",
        segment_type: "branded driver",
        creative_version: "acme-a",
        daily_impressions: 5200,
        clicks_per_mille: 3,
        reports_kpi: true,
    },
    Line {
        advertiser: "Acme",
        order_id: "ord-100",
        line_item: "li-2",
        placement: "article_inline",
        site: "qz",
        segment_type: "traffic driver",
        creative_version: "acme-b",
        daily_impressions: 3100,
        clicks_per_mille: 0,
        reports_kpi: true,
    },
    Line {
        advertiser: "Globex",
        order_id: "ord-200",
        line_item: "li-1",
        placement: "video_pre",
        site: "wrk",
        segment_type: "video",
        creative_version: "globex-v",
        daily_impressions: 4100,
        clicks_per_mille: 2,
        reports_kpi: true,
    },
    Line {
        advertiser: "Globex",
        order_id: "ord-200",
        line_item: "li-2",
        placement: "video_mid",
        site: "wrk",
        segment_type: "video",
        creative_version: "globex-v2",
        daily_impressions: 2400,
        clicks_per_mille: 1,
        reports_kpi: false,
    },
    Line {
        advertiser: "Initech",
        order_id: "ord-300",
        line_item: "li-1",
        placement: "box_right",
        site: "zty",
        segment_type: "interactive non video",
        creative_version: "ini-x",
        daily_impressions: 2900,
        clicks_per_mille: 2,
        reports_kpi: false,
    },
    Line {
        advertiser: "Initech",
        order_id: "ord-300",
        line_item: "li-2",
        placement: "box_left",
        site: "zty",
        segment_type: "interactive video",
        creative_version: "ini-y",
        daily_impressions: 1800,
        clicks_per_mille: 4,
        reports_kpi: true,
    },
    Line {
        advertiser: "Umbrella",
        order_id: "ord-400",
        line_item: "li-1",
        placement: "survey_bottom",
        site: "qz",
        segment_type: "brand survey",
        creative_version: "umb-s",
        daily_impressions: 1500,
        clicks_per_mille: 1,
        reports_kpi: true,
    },
    Line {
        advertiser: "Umbrella",
        order_id: "ord-400",
        line_item: "li-9",
        placement: "home_top",
        site: "qz",
        segment_type: "no match",
        creative_version: "unknown",
        daily_impressions: 900,
        clicks_per_mille: 0,
        reports_kpi: false,
    },
    Line {
        advertiser: "Hooli",
        order_id: "ord-500",
        line_item: "li-1",
        placement: "feed_auto",
        site: "wrk",
        segment_type: "video autoplay",
        creative_version: "hooli-ap",
        daily_impressions: 6000,
        clicks_per_mille: 1,
        reports_kpi: true,
    },
    Line {
        advertiser: "Hooli",
        order_id: "ord-500",
        line_item: "li-2",
        placement: "feed_co",
        site: "wrk",
        segment_type: "co-branded driver",
        creative_version: "hooli-co",
        daily_impressions: 2200,
        clicks_per_mille: 5,
        reports_kpi: true,
    },
];

/// One export row for `line` on day number `day`, using the legacy export
/// column names the analyzer accepts.
fn export_row(line: &Line, date: NaiveDate, day: u64) -> Value {
    // small deterministic day-to-day wobble
    let wobble = (day * 37 + line.daily_impressions) % 200;
    let imps = line.daily_impressions + wobble;
    let third_party = imps * 96 / 100;
    let clicks = imps * line.clicks_per_mille / 1000;

    let mut row = Map::new();
    row.insert("Date".into(), json!(date.format("%Y-%m-%d").to_string()));
    row.insert("Advertiser".into(), json!(line.advertiser));
    row.insert("Order".into(), json!(line.order_id));
    row.insert("Line item".into(), json!(line.line_item));
    row.insert("placement".into(), json!(line.placement));
    row.insert("site".into(), json!(line.site));
    row.insert("creative.type".into(), json!(line.segment_type));
    row.insert("creative_version".into(), json!(line.creative_version));
    row.insert("DFP Creative ID Impressions".into(), json!(imps));
    row.insert("DFP Creative ID Clicks".into(), json!(clicks));
    row.insert("Normalized 3P Impressions".into(), json!(third_party));
    row.insert("Normalized 3P Clicks".into(), json!(third_party * line.clicks_per_mille / 1000));
    row.insert(
        "Ad server Active View viewable impressions".into(),
        json!(imps * (45 + (day % 4) * 5) / 100),
    );

    let interactive =
        line.segment_type.starts_with("interactive") || line.segment_type == "brand survey";
    let video = line.segment_type == "video" || line.segment_type == "interactive video";
    if interactive && line.reports_kpi {
        row.insert("int sessions".into(), json!(imps * 12 / 1000));
    }
    if video && line.reports_kpi {
        row.insert("result_5".into(), json!(imps * 28 / 100));
    }

    Value::Object(row)
}

/// Synthetic ad-server export:
/// - One row per creative line per day.
/// - A few lines deliberately miss their KPI counters or clicks.
/// - Writes JSONL to a local file or S3.
///
/// Environment variables:
/// - START_DATE: first export day, YYYY-MM-DD (default: 2017-11-01)
/// - DAYS: number of days to export (default: 10)
/// - EXPORT_DESTINATION: "local" or "s3" (default: local)
/// - EXPORT_FILE: path when using local (default: performance_export.jsonl)
/// - S3_BUCKET: bucket when using s3, one object per day (required for s3)
/// - S3_PREFIX: key prefix when using s3 (optional)
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let start = env::var("START_DATE").unwrap_or_else(|_| "2017-11-01".to_string());
    let start = NaiveDate::parse_from_str(&start, "%Y-%m-%d")
        .with_context(|| format!("invalid START_DATE: {start}"))?;
    let days: u64 = env::var("DAYS")
        .unwrap_or_else(|_| "10".to_string())
        .parse()
        .context("invalid DAYS")?;

    let mut sink = ExportSink::from_env().await?;

    info!(%start, days, lines = LINES.len(), "generating export");

    let mut written = 0usize;
    for day in 0..days {
        let date = start
            .checked_add_days(Days::new(day))
            .context("date out of range")?;

        let rows: Vec<Value> = LINES.iter().map(|line| export_row(line, date, day)).collect();
        sink.write_day(date, &rows)
            .await
            .with_context(|| format!("Failed to export {date}"))?;
        written += rows.len();
    }

    info!(rows = written, "done");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day_one() -> NaiveDate {
        NaiveDate::from_ymd_opt(2017, 11, 1).unwrap()
    }

    #[test]
    fn test_kpi_counters_omitted_when_not_reported() {
        let missing = LINES
            .iter()
            .find(|l| l.segment_type == "interactive non video")
            .unwrap();
        let row = export_row(missing, day_one(), 0);
        assert!(row.get("int sessions").is_none());
        assert!(row.get("result_5").is_none());

        let video = LINES.iter().find(|l| l.placement == "video_pre").unwrap();
        let row = export_row(video, day_one(), 0);
        assert!(row["result_5"].as_u64().unwrap() > 0);
        assert!(row.get("int sessions").is_none());
    }

    #[test]
    fn test_day_key_partitions_by_date() {
        let date = NaiveDate::from_ymd_opt(2017, 11, 3).unwrap();
        assert_eq!(day_key("", date), "date=2017-11-03/performance_export.jsonl");
        assert_eq!(
            day_key("exports/qz/", date),
            "exports/qz/date=2017-11-03/performance_export.jsonl"
        );
    }

    #[test]
    fn test_zero_click_line_has_zero_clicks() {
        let line = LINES.iter().find(|l| l.clicks_per_mille == 0).unwrap();
        let row = export_row(line, day_one(), 3);
        assert_eq!(row["DFP Creative ID Clicks"], json!(0));
        assert_eq!(row["Date"], json!("2017-11-01"));
    }
}
