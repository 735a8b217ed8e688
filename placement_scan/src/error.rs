use thiserror::Error;

/// Errors raised by the report engine.
///
/// Parameter validation failures are raised before any aggregation work.
/// Undefined metric values (zero denominators) are not errors.
#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("unknown site '{given}', expected one of: {valid}")]
    InvalidSite { given: String, valid: String },
    #[error("unknown segment type '{given}', expected one of: {valid}")]
    InvalidSegment { given: String, valid: String },
    #[error("unknown ad source '{given}', expected one of: {valid}")]
    InvalidAdSource { given: String, valid: String },
    #[error("unrecognized metric '{given}', expected one of: {valid}")]
    UnrecognizedMetric { given: String, valid: String },
    #[error("cannot compute shares: {0}")]
    EmptyInput(String),
    #[error("no records between {from} and {to}")]
    NoRecordsInWindow { from: String, to: String },
    #[error("no rows matched a benchmark entry ({unmatched} rows without benchmark)")]
    NoBenchmarkMatches { unmatched: usize },
    #[error("dimension '{dimension}' is not constant within group [{group}]: '{first}' vs '{conflicting}'")]
    DataQuality {
        dimension: String,
        group: String,
        first: String,
        conflicting: String,
    },
}

impl ReportError {
    /// True for the failures caused by an unknown site, segment, ad source or
    /// metric name.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(
            self,
            ReportError::InvalidSite { .. }
                | ReportError::InvalidSegment { .. }
                | ReportError::InvalidAdSource { .. }
                | ReportError::UnrecognizedMetric { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// Joins valid choices for an error message, `"a; b; c"`.
pub(crate) fn choices<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
