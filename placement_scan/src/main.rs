use std::{
    env,
    fs::File,
    io::{self, BufWriter, Write},
};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use placement_scan::{
    benchmark::{BenchmarkTable, ViewabilityTable},
    catalog::Catalog,
    config::{Config, ReportKind},
    loader,
    output::{write_csv, write_json_lines, ToTable},
    compare_to_benchmark, compare_viewability, find_mismatches, locate_unclassified,
    metric_report, site_summary,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let config = Config::from_args(env::args().skip(1))?;
    let catalog = Catalog::standard();

    let records = loader::load_records(&config.input_path).await?;
    let window = &config.window;
    let site = config.site.as_deref().unwrap_or_default();

    match config.report {
        ReportKind::SiteSummary => {
            let rows = site_summary(&records, window, &config.ad_source, config.policy)?;
            emit(&config, config.report.file_stem(), &rows)?;
        }
        ReportKind::Metric => {
            let segment = config.segment.as_deref().unwrap_or_default();
            let rows = metric_report(
                &records,
                window,
                site,
                segment,
                &config.ad_source,
                &catalog,
                config.policy,
            )?;
            emit(&config, config.report.file_stem(), &rows)?;
        }
        ReportKind::Mismatch => {
            let rows = find_mismatches(
                &records,
                window,
                config.min_impressions,
                &catalog,
                config.policy,
            )?;
            emit(&config, config.report.file_stem(), &rows)?;
        }
        ReportKind::Benchmark => {
            let location = config
                .benchmarks
                .as_deref()
                .context("--benchmarks is required")?;
            let entries = loader::load_benchmarks(location).await?;
            let table = BenchmarkTable::from_entries(&entries, config.bench_source.as_deref());

            let result = compare_to_benchmark(
                &records,
                &table,
                window,
                site,
                config.min_impressions,
                &catalog,
                config.policy,
            )?;

            let s = &result.summary;
            eprintln!(
                "\nabove/at benchmark: {} rows ({} imps), below: {} rows ({} imps), \
                 no benchmark: {}, undefined KPI: {}",
                s.above_count,
                s.above_volume,
                s.below_count,
                s.below_volume,
                s.unmatched_count,
                s.undefined_count
            );
            eprintln!("{:.2}% of compared volume at or above benchmark", s.pct_volume_above);
            if !result.warnings.is_empty() {
                eprintln!(
                    "{} groups with more than one order id (first kept, rerun with --strict to fail)",
                    result.warnings.len()
                );
            }

            if config.out_dir.is_some() {
                emit(&config, "benchmark_joined", &result.joined)?;
            }
            emit(&config, config.report.file_stem(), &result.below)?;
        }
        ReportKind::Viewability => {
            let location = config
                .viewability
                .as_deref()
                .context("--viewability is required")?;
            let entries = loader::load_viewability(location).await?;
            let table = ViewabilityTable::from_entries(&entries);

            let rows = compare_viewability(
                &records,
                &table,
                window,
                site,
                config.min_impressions,
                config.policy,
            )?;
            emit(&config, config.report.file_stem(), &rows)?;
        }
        ReportKind::NoMatch => {
            let rows =
                locate_unclassified(&records, window, config.min_impressions, config.policy)?;
            emit(&config, config.report.file_stem(), &rows)?;
        }
    }

    Ok(())
}

/// Writes rows as CSV or JSON lines, to stdout or `<out>/<stem>.{csv,jsonl}`.
fn emit<T>(config: &Config, stem: &str, rows: &[T]) -> Result<()>
where
    T: Serialize,
    [T]: ToTable,
{
    match &config.out_dir {
        Some(out_dir) => {
            std::fs::create_dir_all(out_dir)
                .with_context(|| format!("Failed to create output directory: {}", out_dir))?;

            let ext = if config.json { "jsonl" } else { "csv" };
            let path = format!("{}/{}.{}", out_dir, stem, ext);
            let file =
                File::create(&path).with_context(|| format!("Failed to create {}", path))?;
            let mut out = BufWriter::new(file);
            write_rows(&mut out, config.json, rows)?;
            out.flush()?;
            info!(rows = rows.len(), path = %path, "report written");
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            write_rows(&mut out, config.json, rows)?;
        }
    }
    Ok(())
}

fn write_rows<W: Write, T>(out: &mut W, json: bool, rows: &[T]) -> Result<()>
where
    T: Serialize,
    [T]: ToTable,
{
    if json {
        write_json_lines(out, rows)?;
    } else {
        write_csv(out, &rows.to_table())?;
    }
    Ok(())
}
