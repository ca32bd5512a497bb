//! Runs an [`AnalysisConfig`] end to end: load → filter → derive → rank →
//! export.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::analysis::{compute_all, top_n, RankedSubset};
use crate::config::AnalysisConfig;
use crate::data::error::ExclusionReport;
use crate::data::filter::{filter_min_value, filter_within_bounds};
use crate::data::loader::load_file;
use crate::data::model::RegionTable;
use crate::export::{write_ranked, write_table};

/// What one run produced.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// The filtered table with every requested derived column appended.
    pub table: RegionTable,
    /// Regions removed by the filters before any delta was computed.
    pub filtered_out: ExclusionReport,
    /// One ranking per requested delta, in request order.
    pub rankings: Vec<RankedSubset>,
    pub written: Vec<PathBuf>,
}

/// Apply the plan's filters to a loaded table.
pub fn prepare(
    table: &RegionTable,
    config: &AnalysisConfig,
) -> Result<(RegionTable, ExclusionReport)> {
    let mut table = table.clone();
    let mut dropped = ExclusionReport::default();

    if let Some(bounds) = config.effective_bounds() {
        let out = filter_within_bounds(&table, &bounds);
        dropped.excluded.extend(out.dropped.excluded);
        table = out.table;
    }

    if let Some(threshold) = config.min_value {
        let out = filter_min_value(&table, &config.threshold_years(), threshold)
            .context("applying minimum value filter")?;
        dropped.excluded.extend(out.dropped.excluded);
        table = out.table;
    }

    Ok((table, dropped))
}

/// Derive, rank and optionally export, on an already loaded table.
pub fn analyze(loaded: &RegionTable, config: &AnalysisConfig) -> Result<AnalysisReport> {
    let (mut table, filtered_out) = prepare(loaded, config)?;
    compute_all(&mut table, &config.deltas).context("computing deltas")?;

    let mut rankings = Vec::with_capacity(config.deltas.len());
    for request in &config.deltas {
        let name = request.column_name();
        let ranked = top_n(&table, &name, config.top, config.ascending)
            .with_context(|| format!("ranking {name}"))?;
        rankings.push(match config.round {
            Some(decimals) => ranked.rounded(decimals),
            None => ranked,
        });
    }

    let mut written = Vec::new();
    if let Some(dir) = &config.output_dir {
        for ranked in &rankings {
            let path = dir.join(format!("top_{}_{}.csv", config.top, ranked.metric));
            write_ranked(&path, ranked)?;
            written.push(path);
        }
        let path = dir.join("table.csv");
        write_table(&path, &table)?;
        written.push(path);
    }

    Ok(AnalysisReport {
        table,
        filtered_out,
        rankings,
        written,
    })
}

/// Load the plan's input and run it.
pub fn run(config: &AnalysisConfig) -> Result<AnalysisReport> {
    let loaded = load_file(&config.input, &config.layout)
        .with_context(|| format!("loading {}", config.input.display()))?;
    analyze(&loaded, config)
}
