//! Input adapter: reads performance exports and benchmark tables from a
//! local path, `s3://bucket/key` or an `http(s)://` URL.

use std::io::{BufRead, BufReader, Cursor};

use anyhow::{Context, Result};
use aws_sdk_s3::Client as S3Client;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::benchmark::{BenchmarkEntry, ViewabilityEntry};
use crate::record::PerformanceRecord;

/// Parse an S3 URI like s3://bucket/key into (bucket, key)
pub fn parse_s3_uri(uri: &str) -> Option<(String, String)> {
    let stripped = uri.strip_prefix("s3://")?;
    let (bucket, key) = stripped.split_once('/')?;
    Some((bucket.to_string(), key.to_string()))
}

fn is_http(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Download an object from S3 and return its contents as bytes
async fn download_from_s3(client: &S3Client, bucket: &str, key: &str) -> Result<Vec<u8>> {
    let resp = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .with_context(|| format!("Failed to download s3://{bucket}/{key}"))?;

    let bytes = resp
        .body
        .collect()
        .await
        .with_context(|| "Failed to read S3 object body")?
        .into_bytes()
        .to_vec();

    Ok(bytes)
}

async fn fetch_http(url: &str) -> Result<Vec<u8>> {
    let resp = reqwest::get(url)
        .await
        .with_context(|| format!("Failed to fetch {url}"))?
        .error_for_status()
        .with_context(|| format!("Bad status from {url}"))?;
    let bytes = resp
        .bytes()
        .await
        .with_context(|| format!("Failed to read body from {url}"))?;
    Ok(bytes.to_vec())
}

/// Raw bytes of `location`.
pub async fn read_location(location: &str) -> Result<Vec<u8>> {
    if let Some((bucket, key)) = parse_s3_uri(location) {
        let aws_conf = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        let client = S3Client::new(&aws_conf);
        download_from_s3(&client, &bucket, &key).await
    } else if is_http(location) {
        fetch_http(location).await
    } else {
        std::fs::read(location).with_context(|| format!("Failed to open file: {location}"))
    }
}

/// Parses JSONL into `T`, skipping blank lines. Errors name the 1-based line.
pub fn parse_lines<T: DeserializeOwned, R: BufRead>(reader: R) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let item: T = serde_json::from_str(trimmed)
            .with_context(|| format!("Failed to parse JSON on line {}", line_no + 1))?;
        out.push(item);
    }
    Ok(out)
}

/// Accepts either a JSON array or JSONL.
pub fn parse_table<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>> {
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
    if first == Some(&b'[') {
        serde_json::from_slice(bytes).context("Failed to parse JSON array")
    } else {
        parse_lines(BufReader::new(Cursor::new(bytes)))
    }
}

pub async fn load_records(location: &str) -> Result<Vec<PerformanceRecord>> {
    let bytes = read_location(location).await?;
    let records: Vec<PerformanceRecord> = parse_table(&bytes)
        .with_context(|| format!("Invalid performance records in {location}"))?;
    info!(count = records.len(), source = location, "loaded performance records");
    Ok(records)
}

pub async fn load_benchmarks(location: &str) -> Result<Vec<BenchmarkEntry>> {
    let bytes = read_location(location).await?;
    let entries: Vec<BenchmarkEntry> = parse_table(&bytes)
        .with_context(|| format!("Invalid benchmark table in {location}"))?;
    debug!(count = entries.len(), source = location, "loaded KPI benchmarks");
    Ok(entries)
}

pub async fn load_viewability(location: &str) -> Result<Vec<ViewabilityEntry>> {
    let bytes = read_location(location).await?;
    let entries: Vec<ViewabilityEntry> = parse_table(&bytes)
        .with_context(|| format!("Invalid viewability table in {location}"))?;
    debug!(count = entries.len(), source = location, "loaded viewability benchmarks");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SegmentType;

    #[test]
    fn test_parse_s3_uri() {
        assert_eq!(
            parse_s3_uri("s3://bucket/path/to/export.jsonl"),
            Some(("bucket".to_string(), "path/to/export.jsonl".to_string()))
        );
        assert_eq!(parse_s3_uri("/tmp/export.jsonl"), None);
        assert_eq!(parse_s3_uri("s3://bucket-only"), None);
    }

    #[test]
    fn test_parse_lines_skips_blank_and_reports_line() {
        let text = concat!(
            r#"{"date":"2017-11-01","advertiser":"Acme","placement":"Home","site":"qz","segment_type":"video","primary_impressions":10}"#,
            "\n\n",
            r#"{"date":"2017-11-02","advertiser":"Acme","placement":"home","site":"qz","segment_type":"no match"}"#,
            "\n",
        );
        let records: Vec<PerformanceRecord> = parse_lines(Cursor::new(text)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].placement, "home");
        assert_eq!(records[1].segment_type, SegmentType::Unclassified);
        assert_eq!(records[1].counters.primary_impressions, None);

        let bad = "{\"date\":\"2017-11-01\"}\nnot json\n";
        let err = parse_lines::<PerformanceRecord, _>(Cursor::new(bad)).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_parse_table_accepts_array_and_jsonl() {
        let array = br#" [{"placement":"Home","kpi_name":"CTR","benchmark_rate":0.004}]"#;
        let entries: Vec<BenchmarkEntry> = parse_table(array).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data_source, None);

        let lines = b"{\"placement\":\"a\",\"benchmark_viewable_rate\":0.7}\n{\"placement\":\"b\",\"benchmark_viewable_rate\":0.5}\n";
        let entries: Vec<ViewabilityEntry> = parse_table(lines).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
