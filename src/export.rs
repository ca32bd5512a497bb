use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::analysis::RankedSubset;
use crate::data::loader::TableLayout;
use crate::data::model::RegionTable;

const YEAR_PREFIX: &str = "year_";

#[derive(Serialize)]
struct RankedRow<'a> {
    rank: usize,
    region: &'a str,
    value: f64,
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

/// Write a ranked subset as `.csv` (`rank,region,value`) or `.json`.
pub fn write_ranked(path: &Path, subset: &RankedSubset) -> Result<()> {
    ensure_parent(path)?;
    match extension(path).as_str() {
        "csv" => {
            let mut writer = csv::Writer::from_path(path).context("opening CSV for writing")?;
            for (i, entry) in subset.entries.iter().enumerate() {
                writer
                    .serialize(RankedRow {
                        rank: i + 1,
                        region: &entry.region,
                        value: entry.value,
                    })
                    .with_context(|| format!("writing rank {}", i + 1))?;
            }
            writer.flush().context("flushing CSV")?;
        }
        "json" => {
            let text = serde_json::to_string_pretty(subset).context("serializing ranking")?;
            std::fs::write(path, text).context("writing JSON")?;
        }
        other => bail!("Unsupported output extension: .{other}"),
    }
    log::info!(
        "Wrote {} ranked regions for {} to {}",
        subset.len(),
        subset.metric,
        path.display()
    );
    Ok(())
}

/// Layout that reads a table written by [`write_table`] back in. Year
/// columns carry a prefix so derived names like `pct_2019_2021` are not
/// mistaken for years.
pub fn written_table_layout() -> TableLayout {
    TableLayout {
        id_column: "region".to_string(),
        year_prefix: Some(YEAR_PREFIX.to_string()),
        latitude_column: "latitude".to_string(),
        longitude_column: "longitude".to_string(),
    }
}

/// Write the augmented table as CSV: id, years, centroid, derived columns.
/// Missing cells are left empty.
pub fn write_table(path: &Path, table: &RegionTable) -> Result<()> {
    if extension(path) != "csv" {
        bail!("Tables are written as .csv, got {}", path.display());
    }
    ensure_parent(path)?;

    let mut writer = csv::Writer::from_path(path).context("opening CSV for writing")?;

    let mut header = vec!["region".to_string()];
    header.extend(table.years().iter().map(|y| format!("{YEAR_PREFIX}{y}")));
    header.push("latitude".to_string());
    header.push("longitude".to_string());
    header.extend(table.columns().iter().map(|c| c.name.clone()));
    writer.write_record(&header).context("writing CSV header")?;

    let fmt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
    for (row, region) in table.regions().iter().enumerate() {
        let mut record = vec![region.id.clone()];
        record.extend(table.years().iter().map(|y| fmt(region.value(*y))));
        record.push(fmt(region.centroid.map(|c| c.latitude)));
        record.push(fmt(region.centroid.map(|c| c.longitude)));
        record.extend(table.columns().iter().map(|c| fmt(c.values[row])));
        writer
            .write_record(&record)
            .with_context(|| format!("writing row for {}", region.id))?;
    }
    writer.flush().context("flushing CSV")?;

    log::info!("Wrote {} to {}", table, path.display());
    Ok(())
}
