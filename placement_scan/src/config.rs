use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

use crate::grouping::{DateWindow, GroupingPolicy};

const USAGE: &str = "Usage: placement_scan <path_or_s3_uri> --report KIND --from YYYY-MM-DD --to YYYY-MM-DD [OPTIONS]\n\n\
     Reports:\n  \
     site-summary               Volume share per segment type and site\n  \
     metric                     KPI metrics per advertiser/placement (needs --site, --segment)\n  \
     mismatch                   Placements with volume but no KPI signal\n  \
     benchmark                  Placements below KPI benchmark (needs --site, --benchmarks)\n  \
     viewability                Placements below viewability benchmark (needs --site, --viewability)\n  \
     no-match                   Unclassified volume per order\n\n\
     Options:\n  \
     --site qz|wrk|zty\n  \
     --segment NAME             e.g. branded_driver, \"interactive video\"\n  \
     --ad-source primary|secondary   (also DFP|3P, default primary)\n  \
     --min-impressions N        Volume threshold (default 1000)\n  \
     --benchmarks LOCATION      KPI benchmark table (path, s3:// or http(s)://)\n  \
     --viewability LOCATION     Viewability benchmark table\n  \
     --bench-source NAME        Only use benchmark entries of this data source\n  \
     --out DIR                  Write CSV into DIR instead of stdout\n  \
     --json                     Emit JSON lines instead of CSV\n  \
     --strict                   Fail when a grouped dimension is not constant\n\n\
     Examples:\n  \
     placement_scan export.jsonl --report site-summary --from 2017-11-01 --to 2017-11-10\n  \
     placement_scan s3://bucket/export.jsonl --report benchmark --site qz \\\n    \
     --from 2017-11-01 --to 2017-11-10 --benchmarks http://127.0.0.1:3100/benchmarks/kpi";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    SiteSummary,
    Metric,
    Mismatch,
    Benchmark,
    Viewability,
    NoMatch,
}

impl ReportKind {
    pub fn file_stem(self) -> &'static str {
        match self {
            ReportKind::SiteSummary => "site_summary",
            ReportKind::Metric => "metric_report",
            ReportKind::Mismatch => "mismatches",
            ReportKind::Benchmark => "below_benchmark",
            ReportKind::Viewability => "below_viewability",
            ReportKind::NoMatch => "no_match",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub input_path: String,
    pub report: ReportKind,
    pub window: DateWindow,
    pub site: Option<String>,
    pub segment: Option<String>,
    pub ad_source: String,
    pub min_impressions: u64,
    pub benchmarks: Option<String>,
    pub viewability: Option<String>,
    pub bench_source: Option<String>,
    pub out_dir: Option<String>,
    pub json: bool,
    pub policy: GroupingPolicy,
}

impl Config {
    /// Parses CLI arguments (without the program name).
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let input_path = match args.next() {
            Some(p) if !p.starts_with("--") => p,
            _ => bail!(USAGE),
        };

        let mut report = None;
        let mut from = None;
        let mut to = None;
        let mut site = None;
        let mut segment = None;
        let mut ad_source = "primary".to_string();
        let mut min_impressions: u64 = 1000;
        let mut benchmarks = None;
        let mut viewability = None;
        let mut bench_source = None;
        let mut out_dir = None;
        let mut json = false;
        let mut strict = false;

        let rest: Vec<String> = args.collect();
        let mut i = 0;
        while i < rest.len() {
            let flag = rest[i].as_str();
            let value = || {
                rest.get(i + 1)
                    .cloned()
                    .with_context(|| format!("{flag} requires a value"))
            };
            match flag {
                "--report" => {
                    report = Some(match value()?.as_str() {
                        "site-summary" => ReportKind::SiteSummary,
                        "metric" => ReportKind::Metric,
                        "mismatch" => ReportKind::Mismatch,
                        "benchmark" => ReportKind::Benchmark,
                        "viewability" => ReportKind::Viewability,
                        "no-match" => ReportKind::NoMatch,
                        other => bail!(
                            "unknown report '{other}', expected one of: site-summary|metric|mismatch|benchmark|viewability|no-match"
                        ),
                    });
                    i += 2;
                }
                "--from" => {
                    from = Some(parse_date(&value()?, flag)?);
                    i += 2;
                }
                "--to" => {
                    to = Some(parse_date(&value()?, flag)?);
                    i += 2;
                }
                "--site" => {
                    site = Some(value()?);
                    i += 2;
                }
                "--segment" => {
                    segment = Some(value()?);
                    i += 2;
                }
                "--ad-source" => {
                    ad_source = value()?;
                    i += 2;
                }
                "--min-impressions" => {
                    min_impressions = value()?
                        .parse::<u64>()
                        .context("invalid value for --min-impressions")?;
                    i += 2;
                }
                "--benchmarks" => {
                    benchmarks = Some(value()?);
                    i += 2;
                }
                "--viewability" => {
                    viewability = Some(value()?);
                    i += 2;
                }
                "--bench-source" => {
                    bench_source = Some(value()?);
                    i += 2;
                }
                "--out" => {
                    out_dir = Some(value()?);
                    i += 2;
                }
                "--json" => {
                    json = true;
                    i += 1;
                }
                "--strict" => {
                    strict = true;
                    i += 1;
                }
                other => bail!("Unknown argument: {other}"),
            }
        }

        let report = report.context("--report is required")?;
        let from = from.context("--from is required")?;
        let to = to.context("--to is required")?;
        if from > to {
            bail!("--from {from} is after --to {to}");
        }

        match report {
            ReportKind::Metric if site.is_none() || segment.is_none() => {
                bail!("metric report requires --site and --segment")
            }
            ReportKind::Benchmark if site.is_none() || benchmarks.is_none() => {
                bail!("benchmark report requires --site and --benchmarks")
            }
            ReportKind::Viewability if site.is_none() || viewability.is_none() => {
                bail!("viewability report requires --site and --viewability")
            }
            _ => {}
        }

        Ok(Config {
            input_path,
            report,
            window: DateWindow::new(from, to),
            site,
            segment,
            ad_source,
            min_impressions,
            benchmarks,
            viewability,
            bench_source,
            out_dir,
            json,
            policy: GroupingPolicy { strict },
        })
    }
}

fn parse_date(value: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("invalid date for {flag}: '{value}', expected YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_metric_report_args() {
        let config = Config::from_args(args(
            "export.jsonl --report metric --from 2017-11-01 --to 2017-11-10 --site qz --segment video --ad-source 3P --min-impressions 500 --strict",
        ))
        .unwrap();

        assert_eq!(config.report, ReportKind::Metric);
        assert_eq!(config.site.as_deref(), Some("qz"));
        assert_eq!(config.ad_source, "3P");
        assert_eq!(config.min_impressions, 500);
        assert!(config.policy.strict);
        assert_eq!(
            config.window.from,
            NaiveDate::from_ymd_opt(2017, 11, 1).unwrap()
        );
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_args(args("x.jsonl --report mismatch --from 2017-11-01 --to 2017-11-01"))
                .unwrap();
        assert_eq!(config.min_impressions, 1000);
        assert_eq!(config.ad_source, "primary");
        assert!(!config.json);
        assert!(!config.policy.strict);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Config::from_args(Vec::new()).is_err());
        for line in [
            "x.jsonl --report sideways --from 2017-11-01 --to 2017-11-02",
            "x.jsonl --report mismatch --from 2017-11-05 --to 2017-11-02",
            "x.jsonl --report mismatch --from 11/01/2017 --to 2017-11-02",
            "x.jsonl --report benchmark --site qz --from 2017-11-01 --to 2017-11-02",
        ] {
            assert!(Config::from_args(args(line)).is_err(), "{line}");
        }

        let err = Config::from_args(args(
            "x.jsonl --report mismatch --from 2017-11-01 --to 2017-11-02 --bogus",
        ))
        .unwrap_err();
        assert_eq!(err.to_string(), "Unknown argument: --bogus");
    }
}
