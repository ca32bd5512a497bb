use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::DeltaRequest;
use crate::data::filter::BoundingBox;
use crate::data::loader::TableLayout;
use crate::data::model::Year;

fn default_top() -> usize {
    20
}

/// A complete analysis plan: what to load, how to filter, which deltas to
/// compute and where the rankings go.
///
/// ```json
/// {
///   "input": "household_counts.csv",
///   "layout": { "id_column": "County", "year_prefix": "County_" },
///   "min_value": 1,
///   "deltas": [
///     { "year_a": 2019, "year_b": 2023, "annualize": true },
///     { "year_a": 2022, "year_b": 2023 }
///   ],
///   "top": 20,
///   "output_dir": "output_pct"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub input: PathBuf,
    #[serde(default)]
    pub layout: TableLayout,
    /// Drop regions at or below this value before computing deltas.
    #[serde(default)]
    pub min_value: Option<f64>,
    /// Years checked by `min_value`. Empty means every year the deltas use.
    #[serde(default)]
    pub min_value_years: Vec<Year>,
    /// Restrict to the continental US. Ignored when `bounds` is set.
    #[serde(default)]
    pub continental: bool,
    #[serde(default)]
    pub bounds: Option<BoundingBox>,
    #[serde(default)]
    pub deltas: Vec<DeltaRequest>,
    #[serde(default = "default_top")]
    pub top: usize,
    #[serde(default)]
    pub ascending: bool,
    /// Decimal places for exported rankings. Ranking always uses full precision.
    #[serde(default)]
    pub round: Option<u32>,
    /// Rankings and the augmented table are written here when set.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl AnalysisConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            layout: TableLayout::default(),
            min_value: None,
            min_value_years: Vec::new(),
            continental: false,
            bounds: None,
            deltas: Vec::new(),
            top: default_top(),
            ascending: false,
            round: None,
            output_dir: None,
        }
    }

    /// The bounding box to filter by, if any.
    pub fn effective_bounds(&self) -> Option<BoundingBox> {
        self.bounds
            .or(self.continental.then_some(BoundingBox::CONTINENTAL_US))
    }

    /// Years the minimum-value filter checks.
    pub fn threshold_years(&self) -> Vec<Year> {
        if !self.min_value_years.is_empty() {
            return self.min_value_years.clone();
        }
        let mut years: Vec<Year> = self
            .deltas
            .iter()
            .flat_map(|d| [d.year_a, d.year_b])
            .collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}

/// Read a JSON plan. Relative paths inside it are resolved against the
/// plan's own directory, not the process working directory.
pub fn load_config(path: &Path) -> Result<AnalysisConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let mut config: AnalysisConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    if config.input.is_relative() {
        config.input = base.join(&config.input);
    }
    if let Some(dir) = config.output_dir.as_mut().filter(|d| d.is_relative()) {
        *dir = base.join(&*dir);
    }

    log::debug!("Loaded config from {}: {config:?}", path.display());
    Ok(config)
}
