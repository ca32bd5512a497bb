use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::model::Year;

/// Request-level failures. These abort the call that raised them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The request references the census year that is never collected.
    #[error("year {year} is not supported: no data is collected for it")]
    UnsupportedYear { year: Year },

    #[error("year {year} is not present in the table")]
    UnknownYear { year: Year },

    /// The base year must come strictly before the comparison year.
    #[error("base year {base} must precede comparison year {comparison}")]
    InvalidYearPair { base: Year, comparison: Year },

    #[error("rank count must be at least 1")]
    InvalidRankCount,

    #[error("no derived column named '{name}'")]
    UnknownColumn { name: String },

    #[error("region '{id}' appears more than once")]
    DuplicateRegion { id: String },

    /// Column names end up in output file names, so no path separators.
    #[error("invalid column name '{name}'")]
    InvalidColumnName { name: String },

    #[error("a derived column named '{name}' already exists")]
    DuplicateColumn { name: String },

    #[error("column '{name}' has {actual} values but the table has {expected} rows")]
    ColumnLength {
        name: String,
        expected: usize,
        actual: usize,
    },
}

// ---------------------------------------------------------------------------
// Per-region exclusions
// ---------------------------------------------------------------------------

/// Why a region was left out of a derived column, filter or ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// The base-year value is absent or NaN.
    MissingBaseYear,
    /// The comparison-year value is absent or NaN.
    MissingComparisonYear,
    /// The base-year value is zero in percentage mode.
    DivisionByZero,
    /// An input or the computed change is infinite or NaN.
    NonFinite,
    /// A filtered year value is at or below the threshold.
    BelowThreshold,
    /// A filtered year value is absent.
    MissingValue,
    MissingCentroid,
    OutOfBounds,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MissingBaseYear => "missing base year",
            Self::MissingComparisonYear => "missing comparison year",
            Self::DivisionByZero => "division by zero",
            Self::NonFinite => "non-finite value",
            Self::BelowThreshold => "below threshold",
            Self::MissingValue => "missing value",
            Self::MissingCentroid => "missing centroid",
            Self::OutOfBounds => "out of bounds",
        };
        f.write_str(label)
    }
}

/// One excluded region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub region: String,
    pub reason: ExclusionReason,
}

/// Every region dropped by one operation, in table order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ExclusionReport {
    pub excluded: Vec<Exclusion>,
}

impl ExclusionReport {
    pub fn push(&mut self, region: &str, reason: ExclusionReason) {
        self.excluded.push(Exclusion {
            region: region.to_string(),
            reason,
        });
    }

    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    /// Reason for `region`, if it was excluded.
    pub fn reason_for(&self, region: &str) -> Option<ExclusionReason> {
        self.excluded
            .iter()
            .find(|e| e.region == region)
            .map(|e| e.reason)
    }

    pub fn count_by_reason(&self) -> BTreeMap<ExclusionReason, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.excluded {
            *counts.entry(e.reason).or_insert(0) += 1;
        }
        counts
    }

    /// Emit one warning per reason, so a run's log shows how complete it was.
    pub fn log_summary(&self, context: &str) {
        for (reason, count) in self.count_by_reason() {
            log::warn!("{context}: excluded {count} region(s): {reason}");
        }
    }
}
