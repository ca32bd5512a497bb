/// Data layer: core types, loading, and filtering.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file + TableLayout → RegionTable
///   └──────────┘
///        │
///        ▼
///   ┌─────────────┐
///   │ RegionTable  │  Vec<RegionSeries>, year set, derived columns
///   └─────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  threshold / bounding box → smaller table + exclusions
///   └──────────┘
/// ```

pub mod error;
pub mod filter;
pub mod loader;
pub mod model;
