/// Derived-metrics pipeline: deltas between years, then ranking.
///
/// Architecture:
/// ```text
///   RegionTable (filtered)
///        │
///        ▼
///   ┌──────────┐
///   │  delta    │  (year_a, year_b, mode, annualize) → DerivedColumn
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  rank     │  stable sort, drop excluded rows → RankedSubset
///   └──────────┘
/// ```

pub mod delta;
pub mod rank;

pub use delta::{
    compute_all, compute_delta, round_column, year_over_year, year_over_year_requests, DeltaMode,
    DeltaRequest,
};
pub use rank::{rank_column, top_n, RankedEntry, RankedSubset};
