//! Household-count trends by region.
//!
//! Loads per-region yearly household counts, computes absolute and
//! percentage changes between years, and ranks regions by the size of the
//! change. Rendering is left to whoever consumes the exported rankings.

pub mod analysis;
pub mod config;
pub mod data;
pub mod export;
pub mod pipeline;

pub use analysis::{compute_delta, top_n, DeltaMode, DeltaRequest, RankedSubset};
pub use data::error::{ExclusionReason, ExclusionReport, PipelineError};
pub use data::model::{RegionSeries, RegionTable, Year, EXCLUDED_YEAR};
