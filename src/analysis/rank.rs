use serde::Serialize;

use super::delta::round_to;
use crate::data::error::{ExclusionReason, ExclusionReport, PipelineError};
use crate::data::model::{DerivedColumn, RegionTable};

/// One ranked region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub region: String,
    pub value: f64,
}

/// The top (or bottom) regions for one metric. Recomputed per query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSubset {
    pub metric: String,
    pub ascending: bool,
    pub entries: Vec<RankedEntry>,
    /// Regions holding a value that cannot be ordered. Regions already
    /// excluded by the column itself are reported there, not here.
    #[serde(skip_serializing_if = "ExclusionReport::is_empty")]
    pub skipped: ExclusionReport,
}

impl RankedSubset {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// A zero-length subset is a valid outcome: every region was filtered
    /// out or excluded upstream.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pairs(&self) -> Vec<(&str, f64)> {
        self.entries
            .iter()
            .map(|e| (e.region.as_str(), e.value))
            .collect()
    }

    /// Display copy with values rounded. Order is kept as ranked.
    pub fn rounded(&self, decimals: u32) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|e| RankedEntry {
                    region: e.region.clone(),
                    value: round_to(e.value, decimals),
                })
                .collect(),
            ..self.clone()
        }
    }
}

/// Rank the table's derived column `metric` and keep the first `n` rows.
pub fn top_n(
    table: &RegionTable,
    metric: &str,
    n: usize,
    ascending: bool,
) -> Result<RankedSubset, PipelineError> {
    let column = table
        .column(metric)
        .ok_or_else(|| PipelineError::UnknownColumn {
            name: metric.to_string(),
        })?;
    rank_column(table, column, n, ascending)
}

/// Like [`top_n`] for a column that has not been appended to `table`.
///
/// Sorting is stable, so ties keep table order. Regions without a value are
/// left out rather than sorted to either end; a non-finite value, only
/// possible in a hand-built column, is left out and recorded in `skipped`.
pub fn rank_column(
    table: &RegionTable,
    column: &DerivedColumn,
    n: usize,
    ascending: bool,
) -> Result<RankedSubset, PipelineError> {
    if n == 0 {
        return Err(PipelineError::InvalidRankCount);
    }
    if column.values.len() != table.len() {
        return Err(PipelineError::ColumnLength {
            name: column.name.clone(),
            expected: table.len(),
            actual: column.values.len(),
        });
    }

    let mut skipped = ExclusionReport::default();
    let mut entries: Vec<RankedEntry> = Vec::with_capacity(column.populated());
    for (region, value) in table.regions().iter().zip(&column.values) {
        match *value {
            Some(v) if v.is_finite() => entries.push(RankedEntry {
                region: region.id.clone(),
                value: v,
            }),
            Some(_) => skipped.push(&region.id, ExclusionReason::NonFinite),
            None => {}
        }
    }
    skipped.log_summary(&column.name);

    if ascending {
        entries.sort_by(|a, b| a.value.total_cmp(&b.value));
    } else {
        entries.sort_by(|a, b| b.value.total_cmp(&a.value));
    }
    entries.truncate(n);

    if entries.is_empty() {
        log::warn!("{}: no regions left to rank", column.name);
    }

    Ok(RankedSubset {
        metric: column.name.clone(),
        ascending,
        entries,
        skipped,
    })
}
