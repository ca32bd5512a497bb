use serde::{Deserialize, Serialize};

use crate::data::error::{ExclusionReason, ExclusionReport, PipelineError};
use crate::data::model::{DerivedColumn, RegionTable, Year, EXCLUDED_YEAR};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaMode {
    Absolute,
    #[default]
    Percentage,
}

/// One derived metric: compare `year_b` against the base `year_a`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaRequest {
    pub year_a: Year,
    pub year_b: Year,
    #[serde(default)]
    pub mode: DeltaMode,
    /// Divide by the elapsed year count to get an average annual rate.
    #[serde(default)]
    pub annualize: bool,
    /// Column name; derived from the other fields when absent.
    #[serde(default)]
    pub name: Option<String>,
}

impl DeltaRequest {
    pub fn new(year_a: Year, year_b: Year, mode: DeltaMode) -> Self {
        Self {
            year_a,
            year_b,
            mode,
            annualize: false,
            name: None,
        }
    }

    pub fn annualized(mut self) -> Self {
        self.annualize = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Explicit name, or e.g. `pct_2019_2021` / `abs_annual_2012_2023`.
    pub fn column_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let prefix = match self.mode {
            DeltaMode::Absolute => "abs",
            DeltaMode::Percentage => "pct",
        };
        let annual = if self.annualize { "_annual" } else { "" };
        format!("{prefix}{annual}_{}_{}", self.year_a, self.year_b)
    }

    /// Years between base and comparison, as a divisor.
    pub fn elapsed_years(&self) -> f64 {
        f64::from(i32::from(self.year_b) - i32::from(self.year_a))
    }

    /// Request-level checks. Any failure here aborts the whole computation.
    pub fn validate(&self, table: &RegionTable) -> Result<(), PipelineError> {
        if let Some(name) = &self.name {
            check_column_name(name)?;
        }
        for year in [self.year_a, self.year_b] {
            check_year(table, year)?;
        }
        if self.year_a >= self.year_b {
            return Err(PipelineError::InvalidYearPair {
                base: self.year_a,
                comparison: self.year_b,
            });
        }
        Ok(())
    }
}

/// Names become part of output file names: no separators, no `.`/`..`.
pub(crate) fn check_column_name(name: &str) -> Result<(), PipelineError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(PipelineError::InvalidColumnName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// A year is usable when it is not the census gap and the table carries it.
pub(crate) fn check_year(table: &RegionTable, year: Year) -> Result<(), PipelineError> {
    if year == EXCLUDED_YEAR {
        return Err(PipelineError::UnsupportedYear { year });
    }
    if !table.years().contains(&year) {
        return Err(PipelineError::UnknownYear { year });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

/// Compute one derived column over every region of `table`.
///
/// Regions whose base or comparison value is missing, whose base is zero in
/// percentage mode, or whose inputs or result are not finite get `None` and an
/// entry in the column's exclusion report. Values are kept at full precision.
pub fn compute_delta(
    table: &RegionTable,
    request: &DeltaRequest,
) -> Result<DerivedColumn, PipelineError> {
    request.validate(table)?;

    let name = request.column_name();
    let mut exclusions = ExclusionReport::default();
    let values = table
        .regions()
        .iter()
        .map(|region| {
            let Some(base) = region.value(request.year_a) else {
                exclusions.push(&region.id, ExclusionReason::MissingBaseYear);
                return None;
            };
            let Some(comparison) = region.value(request.year_b) else {
                exclusions.push(&region.id, ExclusionReason::MissingComparisonYear);
                return None;
            };
            if !base.is_finite() || !comparison.is_finite() {
                exclusions.push(&region.id, ExclusionReason::NonFinite);
                return None;
            }

            let delta = match request.mode {
                DeltaMode::Absolute => comparison - base,
                DeltaMode::Percentage => {
                    if base == 0.0 {
                        exclusions.push(&region.id, ExclusionReason::DivisionByZero);
                        return None;
                    }
                    100.0 * (comparison - base) / base
                }
            };

            let delta = if request.annualize {
                delta / request.elapsed_years()
            } else {
                delta
            };
            // A base near zero can still overflow to infinity.
            if !delta.is_finite() {
                exclusions.push(&region.id, ExclusionReason::NonFinite);
                return None;
            }
            Some(delta)
        })
        .collect();

    log::debug!(
        "{name}: {} of {} regions computed",
        table.len() - exclusions.len(),
        table.len()
    );
    exclusions.log_summary(&name);

    Ok(DerivedColumn {
        name,
        source: Some(request.clone()),
        values,
        exclusions,
    })
}

/// Compute and append each request in order, stopping at the first
/// request-level error.
pub fn compute_all(
    table: &mut RegionTable,
    requests: &[DeltaRequest],
) -> Result<(), PipelineError> {
    for request in requests {
        let column = compute_delta(table, request)?;
        table.push_column(column)?;
    }
    Ok(())
}

/// One step per consecutive pair of years present in the table. The census
/// gap makes 2019→2021 a single two-year step; steps longer than a year are
/// annualized so the columns stay comparable.
pub fn year_over_year_requests(table: &RegionTable, mode: DeltaMode) -> Vec<DeltaRequest> {
    let years: Vec<Year> = table
        .years()
        .iter()
        .copied()
        .filter(|y| *y != EXCLUDED_YEAR)
        .collect();

    years
        .windows(2)
        .map(|pair| {
            let request = DeltaRequest::new(pair[0], pair[1], mode);
            if pair[1] - pair[0] > 1 {
                request.annualized()
            } else {
                // A single year already is an annual rate; keep the short name.
                request
            }
        })
        .collect()
}

/// Append the year-over-year columns to `table`.
pub fn year_over_year(
    table: &mut RegionTable,
    mode: DeltaMode,
) -> Result<Vec<String>, PipelineError> {
    let requests = year_over_year_requests(table, mode);
    compute_all(table, &requests)?;
    Ok(requests.iter().map(DeltaRequest::column_name).collect())
}

// ---------------------------------------------------------------------------
// Opt-in display rounding
// ---------------------------------------------------------------------------

pub(crate) fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Copy of `column` rounded for display. Rank before rounding.
pub fn round_column(column: &DerivedColumn, decimals: u32) -> DerivedColumn {
    DerivedColumn {
        values: column
            .values
            .iter()
            .map(|v| v.map(|v| round_to(v, decimals)))
            .collect(),
        ..column.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::RegionSeries;

    fn table() -> RegionTable {
        RegionTable::from_regions(vec![
            RegionSeries::new("A")
                .with_value(2019, 100.0)
                .with_value(2021, 150.0)
                .with_value(2022, 120.0),
            RegionSeries::new("B")
                .with_value(2019, 50.0)
                .with_value(2021, 0.0)
                .with_value(2022, 10.0),
            RegionSeries::new("C")
                .with_value(2019, 0.0)
                .with_value(2021, 10.0)
                .with_value(2022, 30.0),
        ])
        .unwrap()
    }

    fn pct(a: Year, b: Year) -> DeltaRequest {
        DeltaRequest::new(a, b, DeltaMode::Percentage)
    }

    fn value(table: &RegionTable, column: &DerivedColumn, id: &str) -> Option<f64> {
        let idx = table.regions().iter().position(|r| r.id == id).unwrap();
        column.values[idx]
    }

    #[test]
    fn percentage_matches_formula_exactly() {
        let t = table();
        let col = compute_delta(&t, &pct(2019, 2021)).unwrap();
        assert_eq!(value(&t, &col, "A"), Some(100.0 * (150.0 - 100.0) / 100.0));
        assert_eq!(value(&t, &col, "B"), Some(-100.0));
        assert_eq!(value(&t, &col, "C"), None);
        assert_eq!(col.exclusions.reason_for("C"), Some(ExclusionReason::DivisionByZero));
        assert_eq!(col.name, "pct_2019_2021");
    }

    #[test]
    fn absolute_mode_accepts_zero_base() {
        let t = table();
        let col = compute_delta(&t, &DeltaRequest::new(2019, 2021, DeltaMode::Absolute)).unwrap();
        assert_eq!(col.values, vec![Some(50.0), Some(-50.0), Some(10.0)]);
        assert!(col.exclusions.is_empty());
    }

    #[test]
    fn annualize_divides_by_true_elapsed_years() {
        let t = table();
        let plain = compute_delta(&t, &pct(2019, 2021)).unwrap();
        let annual = compute_delta(&t, &pct(2019, 2021).annualized()).unwrap();
        assert_eq!(value(&t, &annual, "A"), value(&t, &plain, "A").map(|v| v / 2.0));

        let plain = compute_delta(&t, &pct(2021, 2022)).unwrap();
        let annual = compute_delta(&t, &pct(2021, 2022).annualized()).unwrap();
        assert_eq!(value(&t, &annual, "A"), value(&t, &plain, "A"));
        assert_eq!(annual.name, "pct_annual_2021_2022");
    }

    #[test]
    fn rejects_the_census_gap_year() {
        let t = table();
        for (a, b) in [(2020, 2021), (2019, 2020)] {
            let err = compute_delta(&t, &pct(a, b)).unwrap_err();
            assert_eq!(err, PipelineError::UnsupportedYear { year: 2020 });
        }
    }

    #[test]
    fn rejects_unknown_and_reversed_years() {
        let t = table();
        assert_eq!(
            compute_delta(&t, &DeltaRequest::new(2012, 2021, DeltaMode::Absolute)).unwrap_err(),
            PipelineError::UnknownYear { year: 2012 }
        );
        assert_eq!(
            compute_delta(&t, &DeltaRequest::new(2021, 2019, DeltaMode::Absolute)).unwrap_err(),
            PipelineError::InvalidYearPair {
                base: 2021,
                comparison: 2019
            }
        );
    }

    #[test]
    fn rejects_column_names_that_are_paths() {
        let t = table();
        for name in ["../x", "out/top", "a\\b", "..", ""] {
            let err = compute_delta(&t, &pct(2019, 2021).named(name)).unwrap_err();
            assert_eq!(err, PipelineError::InvalidColumnName { name: name.into() });
        }
        let col = compute_delta(&t, &pct(2019, 2021).named("growth 19-21")).unwrap();
        assert_eq!(col.name, "growth 19-21");
    }

    #[test]
    fn missing_values_are_excluded_not_zeroed() {
        let mut sparse = RegionSeries::new("D").with_value(2021, 5.0);
        sparse.values.insert(2019, None);
        let t = RegionTable::from_regions(vec![
            sparse,
            RegionSeries::new("E").with_value(2019, 5.0),
            RegionSeries::new("F").with_value(2019, 2.0).with_value(2021, 3.0),
        ])
        .unwrap();
        let col = compute_delta(&t, &DeltaRequest::new(2019, 2021, DeltaMode::Absolute)).unwrap();
        assert_eq!(col.values, vec![None, None, Some(1.0)]);
        assert_eq!(col.exclusions.reason_for("D"), Some(ExclusionReason::MissingBaseYear));
        assert_eq!(
            col.exclusions.reason_for("E"),
            Some(ExclusionReason::MissingComparisonYear)
        );
    }

    #[test]
    fn non_finite_results_are_excluded() {
        let t = RegionTable::from_regions(vec![
            RegionSeries::new("inf")
                .with_value(2019, f64::INFINITY)
                .with_value(2021, f64::INFINITY),
            RegionSeries::new("tiny").with_value(2019, 1e-308).with_value(2021, 1.0),
            RegionSeries::new("huge").with_value(2019, -f64::MAX).with_value(2021, f64::MAX),
            RegionSeries::new("ok").with_value(2019, 100.0).with_value(2021, 150.0),
        ])
        .unwrap();

        let col = compute_delta(&t, &pct(2019, 2021)).unwrap();
        assert_eq!(col.values, vec![None, None, None, Some(50.0)]);
        assert_eq!(col.exclusions.count_by_reason()[&ExclusionReason::NonFinite], 3);

        let col = compute_delta(&t, &DeltaRequest::new(2019, 2021, DeltaMode::Absolute)).unwrap();
        assert_eq!(col.values, vec![None, Some(1.0 - 1e-308), None, Some(50.0)]);
        assert_eq!(col.exclusions.reason_for("inf"), Some(ExclusionReason::NonFinite));
        assert_eq!(col.exclusions.reason_for("huge"), Some(ExclusionReason::NonFinite));
        assert!(col.values.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn compute_all_leaves_years_untouched() {
        let mut t = table();
        let before = t.regions().to_vec();
        compute_all(
            &mut t,
            &[
                pct(2019, 2021),
                DeltaRequest::new(2019, 2022, DeltaMode::Absolute),
            ],
        )
        .unwrap();
        assert_eq!(t.regions(), before.as_slice());
        assert_eq!(t.columns().len(), 2);
        assert!(t.column("abs_2019_2022").is_some());
    }

    #[test]
    fn year_over_year_spans_the_gap_once() {
        let mut t = table();
        let names = year_over_year(&mut t, DeltaMode::Percentage).unwrap();
        assert_eq!(names, vec!["pct_annual_2019_2021", "pct_2021_2022"]);

        let step = t.column("pct_annual_2019_2021").unwrap();
        assert_eq!(value(&t, step, "A"), Some(25.0));
        let step = t.column("pct_2021_2022").unwrap();
        assert_eq!(step.exclusions.reason_for("B"), Some(ExclusionReason::DivisionByZero));
    }

    #[test]
    fn rounding_is_a_separate_step() {
        let t = RegionTable::from_regions(vec![RegionSeries::new("A")
            .with_value(2019, 3.0)
            .with_value(2021, 4.0)])
        .unwrap();
        let col = compute_delta(&t, &pct(2019, 2021)).unwrap();
        assert_eq!(col.values[0], Some(100.0 / 3.0));
        assert_eq!(round_column(&col, 2).values[0], Some(33.33));
    }
}
