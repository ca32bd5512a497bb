use serde::{Deserialize, Serialize};

use super::error::{ExclusionReason, ExclusionReport, PipelineError};
use super::model::{RegionTable, Year};
use crate::analysis::delta::check_year;

// ---------------------------------------------------------------------------
// Filter outcome
// ---------------------------------------------------------------------------

/// The rows that survived a filter, plus why the others did not.
#[derive(Debug, Clone)]
pub struct Filtered {
    pub table: RegionTable,
    pub dropped: ExclusionReport,
}

// ---------------------------------------------------------------------------
// Minimum value
// ---------------------------------------------------------------------------

/// Drop every region whose value in any of `years` is `<= threshold`, or is
/// missing. Run this before computing percentage deltas so tiny denominators
/// never reach the ranking.
pub fn filter_min_value(
    table: &RegionTable,
    years: &[Year],
    threshold: f64,
) -> Result<Filtered, PipelineError> {
    for &year in years {
        check_year(table, year)?;
    }

    let mut dropped = ExclusionReport::default();
    let keep: Vec<bool> = table
        .regions()
        .iter()
        .map(|region| {
            for &year in years {
                match region.value(year) {
                    None => {
                        dropped.push(&region.id, ExclusionReason::MissingValue);
                        return false;
                    }
                    Some(v) if v <= threshold => {
                        dropped.push(&region.id, ExclusionReason::BelowThreshold);
                        return false;
                    }
                    Some(_) => {}
                }
            }
            true
        })
        .collect();

    log::debug!(
        "min value {threshold}: kept {} of {} regions",
        table.len() - dropped.len(),
        table.len()
    );
    dropped.log_summary("min value filter");

    Ok(Filtered {
        table: table.retain_rows(&keep),
        dropped,
    })
}

// ---------------------------------------------------------------------------
// Bounding box
// ---------------------------------------------------------------------------

/// Inclusive latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// The lower 48 states.
    pub const CONTINENTAL_US: BoundingBox = BoundingBox {
        min_latitude: 24.5,
        max_latitude: 49.5,
        min_longitude: -125.0,
        max_longitude: -66.0,
    };

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&latitude)
            && (self.min_longitude..=self.max_longitude).contains(&longitude)
    }
}

/// Keep regions whose centroid lies inside `bounds`. Regions without a
/// centroid cannot be placed and are dropped.
pub fn filter_within_bounds(table: &RegionTable, bounds: &BoundingBox) -> Filtered {
    let mut dropped = ExclusionReport::default();
    let keep: Vec<bool> = table
        .regions()
        .iter()
        .map(|region| match region.centroid {
            None => {
                dropped.push(&region.id, ExclusionReason::MissingCentroid);
                false
            }
            Some(c) if !bounds.contains(c.latitude, c.longitude) => {
                dropped.push(&region.id, ExclusionReason::OutOfBounds);
                false
            }
            Some(_) => true,
        })
        .collect();

    dropped.log_summary("bounds filter");

    Filtered {
        table: table.retain_rows(&keep),
        dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::RegionSeries;

    fn table() -> RegionTable {
        let mut gap = RegionSeries::new("gap").with_value(2019, 9.0);
        gap.values.insert(2021, None);
        RegionTable::from_regions(vec![
            RegionSeries::new("big").with_value(2019, 500.0).with_value(2021, 600.0),
            RegionSeries::new("tiny").with_value(2019, 1.0).with_value(2021, 80.0),
            RegionSeries::new("shrunk").with_value(2019, 40.0).with_value(2021, 0.5),
            gap,
        ])
        .unwrap()
    }

    fn ids(table: &RegionTable) -> Vec<&str> {
        table.regions().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn drops_regions_at_or_below_threshold_in_any_column() {
        let out = filter_min_value(&table(), &[2019, 2021], 1.0).unwrap();
        assert_eq!(ids(&out.table), vec!["big"]);
        assert_eq!(out.dropped.reason_for("tiny"), Some(ExclusionReason::BelowThreshold));
        assert_eq!(out.dropped.reason_for("shrunk"), Some(ExclusionReason::BelowThreshold));
        assert_eq!(out.dropped.reason_for("gap"), Some(ExclusionReason::MissingValue));
    }

    #[test]
    fn only_listed_years_are_checked() {
        let out = filter_min_value(&table(), &[2019], 1.0).unwrap();
        assert_eq!(ids(&out.table), vec!["big", "shrunk", "gap"]);
        assert_eq!(out.table.years().len(), 2);
    }

    #[test]
    fn validates_listed_years() {
        assert_eq!(
            filter_min_value(&table(), &[2020], 0.0).unwrap_err(),
            PipelineError::UnsupportedYear { year: 2020 }
        );
        assert_eq!(
            filter_min_value(&table(), &[2015], 0.0).unwrap_err(),
            PipelineError::UnknownYear { year: 2015 }
        );
    }

    #[test]
    fn keeps_only_continental_centroids() {
        let table = RegionTable::from_regions(vec![
            RegionSeries::new("Cook IL").with_value(2019, 1.0).with_centroid(41.8, -87.6),
            RegionSeries::new("Honolulu HI").with_value(2019, 1.0).with_centroid(21.3, -157.8),
            RegionSeries::new("unplaced").with_value(2019, 1.0),
        ])
        .unwrap();
        let out = filter_within_bounds(&table, &BoundingBox::CONTINENTAL_US);
        assert_eq!(ids(&out.table), vec!["Cook IL"]);
        assert_eq!(out.dropped.reason_for("Honolulu HI"), Some(ExclusionReason::OutOfBounds));
        assert_eq!(out.dropped.reason_for("unplaced"), Some(ExclusionReason::MissingCentroid));
    }
}
