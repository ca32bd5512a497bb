use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{ExclusionReport, PipelineError};
use crate::analysis::DeltaRequest;

// ---------------------------------------------------------------------------
// Years
// ---------------------------------------------------------------------------

/// A calendar year of the household-count series.
pub type Year = u16;

/// The census year that is never present in the source data.
pub const EXCLUDED_YEAR: Year = 2020;

/// The years the household sheets normally carry (2010–2019, 2021–2023).
pub const EXPECTED_YEARS: [Year; 13] = [
    2010, 2011, 2012, 2013, 2014, 2015, 2016, 2017, 2018, 2019, 2021, 2022, 2023,
];

// ---------------------------------------------------------------------------
// Centroid – optional map position of a region
// ---------------------------------------------------------------------------

/// Geographic centroid of a region, consumed by map renderers downstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub latitude: f64,
    pub longitude: f64,
}

// ---------------------------------------------------------------------------
// RegionSeries – one row of the table
// ---------------------------------------------------------------------------

/// One region (PUMA or county) with its household count per year.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSeries {
    /// Region identifier, unique within a table.
    pub id: String,
    /// Year → value. `None` marks a missing cell.
    pub values: BTreeMap<Year, Option<f64>>,
    pub centroid: Option<Centroid>,
}

impl RegionSeries {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: BTreeMap::new(),
            centroid: None,
        }
    }

    /// Builder-style helper used by loaders and tests.
    pub fn with_value(mut self, year: Year, value: f64) -> Self {
        self.values.insert(year, Some(value));
        self
    }

    pub fn with_centroid(mut self, latitude: f64, longitude: f64) -> Self {
        self.centroid = Some(Centroid {
            latitude,
            longitude,
        });
        self
    }

    /// Value for `year`, treating NaN the same as an absent cell.
    pub fn value(&self, year: Year) -> Option<f64> {
        self.values
            .get(&year)
            .copied()
            .flatten()
            .filter(|v| !v.is_nan())
    }
}

// ---------------------------------------------------------------------------
// DerivedColumn – a computed metric aligned with the table rows
// ---------------------------------------------------------------------------

/// A named metric column. `values[i]` belongs to `RegionTable::regions[i]`;
/// excluded regions hold `None` and are listed in `exclusions`.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedColumn {
    pub name: String,
    /// The request that produced the column, if it came from `compute_delta`.
    pub source: Option<DeltaRequest>,
    pub values: Vec<Option<f64>>,
    pub exclusions: ExclusionReport,
}

impl DerivedColumn {
    /// Number of regions with a value.
    pub fn populated(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// RegionTable – the complete loaded dataset
// ---------------------------------------------------------------------------

/// Rows in original file order plus any appended derived columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegionTable {
    regions: Vec<RegionSeries>,
    years: BTreeSet<Year>,
    columns: Vec<DerivedColumn>,
}

impl RegionTable {
    /// Build a table, rejecting duplicate region identifiers.
    pub fn from_regions(regions: Vec<RegionSeries>) -> Result<Self, PipelineError> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(regions.len());
        for region in &regions {
            if !seen.insert(region.id.as_str()) {
                return Err(PipelineError::DuplicateRegion {
                    id: region.id.clone(),
                });
            }
        }

        let years = regions
            .iter()
            .flat_map(|r| r.values.keys().copied())
            .collect();

        Ok(Self {
            regions,
            years,
            columns: Vec::new(),
        })
    }

    pub fn regions(&self) -> &[RegionSeries] {
        &self.regions
    }

    /// Sorted set of years present in at least one row.
    pub fn years(&self) -> &BTreeSet<Year> {
        &self.years
    }

    pub fn columns(&self) -> &[DerivedColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&DerivedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn region(&self, id: &str) -> Option<&RegionSeries> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Append a derived column. Years are never overwritten and column
    /// names must be unique.
    pub fn push_column(&mut self, column: DerivedColumn) -> Result<(), PipelineError> {
        if column.values.len() != self.regions.len() {
            return Err(PipelineError::ColumnLength {
                name: column.name,
                expected: self.regions.len(),
                actual: column.values.len(),
            });
        }
        if self.column(&column.name).is_some() {
            return Err(PipelineError::DuplicateColumn { name: column.name });
        }
        self.columns.push(column);
        Ok(())
    }

    /// Keep only rows whose index satisfies `keep`, carrying the derived
    /// columns along so they stay aligned.
    pub(crate) fn retain_rows(&self, keep: &[bool]) -> Self {
        let regions: Vec<RegionSeries> = self
            .regions
            .iter()
            .zip(keep)
            .filter(|(_, k)| **k)
            .map(|(r, _)| r.clone())
            .collect();

        let columns = self
            .columns
            .iter()
            .map(|c| DerivedColumn {
                name: c.name.clone(),
                source: c.source.clone(),
                values: c
                    .values
                    .iter()
                    .zip(keep)
                    .filter(|(_, k)| **k)
                    .map(|(v, _)| *v)
                    .collect(),
                exclusions: c.exclusions.clone(),
            })
            .collect();

        Self {
            regions,
            // The year set describes the schema, not the surviving rows.
            years: self.years.clone(),
            columns,
        }
    }
}

impl fmt::Display for RegionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let years: Vec<String> = self.years.iter().map(|y| y.to_string()).collect();
        write!(
            f,
            "{} regions, years [{}], {} derived columns",
            self.regions.len(),
            years.join(", "),
            self.columns.len()
        )
    }
}
