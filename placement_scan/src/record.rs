//! Canonical input schema: one [`PerformanceRecord`] per (date, placement,
//! creative) row of an ad-server export.
//!
//! Counters are `Option<u64>`. `None` means the counter was not reported for
//! the row, which is different from a reported zero; sums keep that
//! distinction (see [`Counters::accumulate`]).

use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{choices, ReportError};

/// Known site codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Qz,
    Wrk,
    Zty,
}

impl Site {
    pub const ALL: [Site; 3] = [Site::Qz, Site::Wrk, Site::Zty];

    pub fn code(self) -> &'static str {
        match self {
            Site::Qz => "qz",
            Site::Wrk => "wrk",
            Site::Zty => "zty",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Site {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Site::ALL
            .into_iter()
            .find(|site| site.code() == wanted)
            .ok_or_else(|| ReportError::InvalidSite {
                given: s.to_string(),
                valid: choices(Site::ALL.iter().map(|s| s.code())),
            })
    }
}

/// Creative / segment taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum SegmentType {
    BrandedDriver,
    TrafficDriver,
    CoBrandedDriver,
    Video,
    VideoAutoplay,
    InteractiveNonVideo,
    InteractiveVideo,
    BrandSurvey,
    /// Creative could not be matched to a type ("no match").
    Unclassified,
}

impl SegmentType {
    pub const ALL: [SegmentType; 9] = [
        SegmentType::BrandedDriver,
        SegmentType::TrafficDriver,
        SegmentType::CoBrandedDriver,
        SegmentType::Video,
        SegmentType::VideoAutoplay,
        SegmentType::InteractiveNonVideo,
        SegmentType::InteractiveVideo,
        SegmentType::BrandSurvey,
        SegmentType::Unclassified,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            SegmentType::BrandedDriver => "branded_driver",
            SegmentType::TrafficDriver => "traffic_driver",
            SegmentType::CoBrandedDriver => "co_branded_driver",
            SegmentType::Video => "video",
            SegmentType::VideoAutoplay => "video_autoplay",
            SegmentType::InteractiveNonVideo => "interactive_non_video",
            SegmentType::InteractiveVideo => "interactive_video",
            SegmentType::BrandSurvey => "brand_survey",
            SegmentType::Unclassified => "unclassified",
        }
    }

    /// Segments whose slug ends in `_driver`.
    pub fn is_driver(self) -> bool {
        self.slug().ends_with("driver")
    }

    /// Segments whose slug ends in `_autoplay`.
    pub fn is_autoplay(self) -> bool {
        self.slug().ends_with("autoplay")
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for SegmentType {
    type Err = ReportError;

    /// Accepts the snake_case slug or the legacy spaced label
    /// (`"interactive non video"`, `"co-branded driver"`, `"no match"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        if normalized == "no_match" {
            return Ok(SegmentType::Unclassified);
        }
        SegmentType::ALL
            .into_iter()
            .find(|seg| seg.slug() == normalized)
            .ok_or_else(|| ReportError::InvalidSegment {
                given: s.to_string(),
                valid: choices(SegmentType::ALL.iter().map(|s| s.slug())),
            })
    }
}

impl TryFrom<String> for SegmentType {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Which ad server's impression/click counters a report is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdSource {
    /// First-party ad server (legacy name `DFP`).
    Primary,
    /// Third-party verification counts (legacy name `3P`).
    Secondary,
}

impl AdSource {
    pub fn impressions(self) -> Counter {
        match self {
            AdSource::Primary => Counter::PrimaryImpressions,
            AdSource::Secondary => Counter::SecondaryImpressions,
        }
    }

    pub fn clicks(self) -> Counter {
        match self {
            AdSource::Primary => Counter::PrimaryClicks,
            AdSource::Secondary => Counter::SecondaryClicks,
        }
    }
}

impl FromStr for AdSource {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" | "dfp" => Ok(AdSource::Primary),
            "secondary" | "3p" => Ok(AdSource::Secondary),
            _ => Err(ReportError::InvalidAdSource {
                given: s.to_string(),
                valid: choices(["primary (DFP)", "secondary (3P)"]),
            }),
        }
    }
}

/// Names of the summable counter columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Counter {
    PrimaryImpressions,
    PrimaryClicks,
    SecondaryImpressions,
    SecondaryClicks,
    InteractiveSessions,
    CompletionEvents,
    ViewableImpressions,
}

impl Counter {
    pub const ALL: [Counter; 7] = [
        Counter::PrimaryImpressions,
        Counter::PrimaryClicks,
        Counter::SecondaryImpressions,
        Counter::SecondaryClicks,
        Counter::InteractiveSessions,
        Counter::CompletionEvents,
        Counter::ViewableImpressions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::PrimaryImpressions => "primary_impressions",
            Counter::PrimaryClicks => "primary_clicks",
            Counter::SecondaryImpressions => "secondary_impressions",
            Counter::SecondaryClicks => "secondary_clicks",
            Counter::InteractiveSessions => "interactive_sessions",
            Counter::CompletionEvents => "completion_events",
            Counter::ViewableImpressions => "viewable_impressions",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counter block shared by input records and aggregates.
///
/// Legacy export column names are accepted as aliases so older files load
/// into the canonical schema unchanged.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    #[serde(default, alias = "DFP Creative ID Impressions")]
    pub primary_impressions: Option<u64>,
    #[serde(default, alias = "DFP Creative ID Clicks")]
    pub primary_clicks: Option<u64>,
    #[serde(default, alias = "Normalized 3P Impressions")]
    pub secondary_impressions: Option<u64>,
    #[serde(default, alias = "Normalized 3P Clicks")]
    pub secondary_clicks: Option<u64>,
    #[serde(default, alias = "int sessions")]
    pub interactive_sessions: Option<u64>,
    #[serde(default, alias = "result_5")]
    pub completion_events: Option<u64>,
    #[serde(default, alias = "Ad server Active View viewable impressions")]
    pub viewable_impressions: Option<u64>,
}

impl Counters {
    pub fn get(&self, counter: Counter) -> Option<u64> {
        match counter {
            Counter::PrimaryImpressions => self.primary_impressions,
            Counter::PrimaryClicks => self.primary_clicks,
            Counter::SecondaryImpressions => self.secondary_impressions,
            Counter::SecondaryClicks => self.secondary_clicks,
            Counter::InteractiveSessions => self.interactive_sessions,
            Counter::CompletionEvents => self.completion_events,
            Counter::ViewableImpressions => self.viewable_impressions,
        }
    }

    fn slot(&mut self, counter: Counter) -> &mut Option<u64> {
        match counter {
            Counter::PrimaryImpressions => &mut self.primary_impressions,
            Counter::PrimaryClicks => &mut self.primary_clicks,
            Counter::SecondaryImpressions => &mut self.secondary_impressions,
            Counter::SecondaryClicks => &mut self.secondary_clicks,
            Counter::InteractiveSessions => &mut self.interactive_sessions,
            Counter::CompletionEvents => &mut self.completion_events,
            Counter::ViewableImpressions => &mut self.viewable_impressions,
        }
    }

    /// Counter value with absence read as zero. Only for volume/sorting.
    pub fn volume(&self, counter: Counter) -> u64 {
        self.get(counter).unwrap_or(0)
    }

    /// Adds `other` into `self`. A sum stays `None` only while every
    /// contribution so far was `None`.
    pub fn accumulate(&mut self, other: &Counters) {
        for counter in Counter::ALL {
            if let Some(v) = other.get(counter) {
                let slot = self.slot(counter);
                *slot = Some(slot.unwrap_or(0).saturating_add(v));
            }
        }
    }
}

/// One row of the input dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    #[serde(alias = "Date")]
    pub date: NaiveDate,
    #[serde(alias = "Advertiser")]
    pub advertiser: String,
    #[serde(deserialize_with = "canonical_placement")]
    pub placement: String,
    pub site: Site,
    #[serde(alias = "creative.type")]
    pub segment_type: SegmentType,
    #[serde(default, alias = "creative.version")]
    pub creative_version: String,
    #[serde(default, alias = "Order")]
    pub order_id: String,
    #[serde(default, alias = "Line item")]
    pub line_item: String,
    #[serde(flatten)]
    pub counters: Counters,
}

/// Placement names are compared case-insensitively everywhere; the stored
/// form is trimmed and lower-cased.
pub fn normalize_placement(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn canonical_placement<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(normalize_placement(&raw))
}
