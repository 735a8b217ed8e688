use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

// Benchmark table shapes as consumed by placement_scan.

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KpiBenchmark {
    placement: String,
    kpi_name: String,
    benchmark_rate: f64,
    #[serde(default)]
    data_source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ViewabilityBenchmark {
    placement: String,
    benchmark_viewable_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BenchmarkFile {
    #[serde(default)]
    kpi: Vec<KpiBenchmark>,
    #[serde(default)]
    viewability: Vec<ViewabilityBenchmark>,
}

#[derive(Debug, Deserialize)]
struct SourceFilter {
    source: Option<String>,
}

fn kpi(placement: &str, kpi_name: &str, rate: f64, source: &str) -> KpiBenchmark {
    KpiBenchmark {
        placement: placement.to_string(),
        kpi_name: kpi_name.to_string(),
        benchmark_rate: rate,
        data_source: Some(source.to_string()),
    }
}

fn view(placement: &str, rate: f64) -> ViewabilityBenchmark {
    ViewabilityBenchmark {
        placement: placement.to_string(),
        benchmark_viewable_rate: rate,
    }
}

/// Built-in tables matching the placements fake_delivery exports.
fn default_tables() -> BenchmarkFile {
    BenchmarkFile {
        kpi: vec![
            kpi("home_top", "CTR", 0.0025, "dfp"),
            kpi("article_inline", "CTR", 0.0015, "dfp"),
            kpi("video_pre", "VSR", 0.30, "dfp"),
            kpi("video_mid", "VSR", 0.25, "dfp"),
            kpi("box_right", "IR", 0.010, "dfp"),
            kpi("box_left", "VSR", 0.25, "dfp"),
            kpi("survey_bottom", "IR", 0.008, "dfp"),
            kpi("feed_auto", "CTR", 0.0012, "dfp"),
            kpi("feed_co", "CTR", 0.0040, "dfp"),
            kpi("home_top", "CTR", 0.0030, "3p"),
        ],
        viewability: vec![
            view("home_top", 0.55),
            view("article_inline", 0.50),
            view("video_pre", 0.60),
            view("video_mid", 0.60),
            view("box_right", 0.50),
            view("box_left", 0.50),
            view("feed_auto", 0.65),
            view("feed_co", 0.45),
        ],
    }
}

fn load_tables() -> Result<BenchmarkFile> {
    match env::var("BENCH_FILE") {
        Ok(path) => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to open benchmark file: {}", path))?;
            serde_json::from_slice(&bytes)
                .with_context(|| format!("Invalid benchmark file: {}", path))
        }
        Err(_) => Ok(default_tables()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let tables = Arc::new(load_tables()?);
    info!(
        kpi = tables.kpi.len(),
        viewability = tables.viewability.len(),
        "benchmark tables loaded"
    );

    let app = Router::new()
        .route("/benchmarks/kpi", get(handle_kpi))
        .route("/benchmarks/viewability", get(handle_viewability))
        .with_state(tables);

    let addr: SocketAddr = env::var("BENCH_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3100".to_string())
        .parse()
        .context("invalid BENCH_ADDR")?;
    info!("bench_server listening on http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// KPI benchmarks, optionally only those of `?source=NAME`.
async fn handle_kpi(
    State(tables): State<Arc<BenchmarkFile>>,
    Query(filter): Query<SourceFilter>,
) -> Json<Vec<KpiBenchmark>> {
    let rows: Vec<KpiBenchmark> = tables
        .kpi
        .iter()
        .filter(|b| match &filter.source {
            Some(source) => b.data_source.as_deref() == Some(source.as_str()),
            None => true,
        })
        .cloned()
        .collect();
    info!(rows = rows.len(), source = ?filter.source, "served KPI benchmarks");
    Json(rows)
}

async fn handle_viewability(
    State(tables): State<Arc<BenchmarkFile>>,
) -> Json<Vec<ViewabilityBenchmark>> {
    Json(tables.viewability.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_kpi_source_filter() {
        let tables = Arc::new(default_tables());

        let Json(all) = handle_kpi(
            State(tables.clone()),
            Query(SourceFilter { source: None }),
        )
        .await;
        assert_eq!(all.len(), tables.kpi.len());

        let Json(third_party) = handle_kpi(
            State(tables),
            Query(SourceFilter {
                source: Some("3p".to_string()),
            }),
        )
        .await;
        assert_eq!(third_party.len(), 1);
        assert_eq!(third_party[0].placement, "home_top");
    }

    #[test]
    fn test_benchmark_file_sections_default_to_empty() {
        let text = r#"{"viewability":[{"placement":"a","benchmark_viewable_rate":0.5}]}"#;
        let file: BenchmarkFile = serde_json::from_str(text).unwrap();
        assert!(file.kpi.is_empty());
        assert_eq!(file.viewability.len(), 1);
    }
}
