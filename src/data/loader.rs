use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::model::{Centroid, RegionSeries, RegionTable, Year, EXCLUDED_YEAR};

// ---------------------------------------------------------------------------
// Table layout – which columns mean what
// ---------------------------------------------------------------------------

/// Describes how a wide household sheet maps onto a [`RegionTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableLayout {
    /// Column holding the region identifier.
    pub id_column: String,
    /// When set, only `<prefix><digits>` headers are year columns
    /// (`House_ct_` matches `House_ct_2019`).
    pub year_prefix: Option<String>,
    pub latitude_column: String,
    pub longitude_column: String,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            id_column: "region".to_string(),
            year_prefix: None,
            latitude_column: "CENTLAT".to_string(),
            longitude_column: "CENTLON".to_string(),
        }
    }
}

/// Interpret a column header as a year.
///
/// Four trailing digits are taken literally, two mean `20xx`
/// (`County_19` → 2019). Anything else is not a year column.
pub fn year_from_header(header: &str, prefix: Option<&str>) -> Option<Year> {
    let header = header.trim();
    let digits = match prefix {
        Some(p) => {
            let rest = header.strip_prefix(p)?;
            if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            rest
        }
        None => {
            let start = header
                .char_indices()
                .rev()
                .take_while(|(_, c)| c.is_ascii_digit())
                .last()
                .map(|(i, _)| i)?;
            &header[start..]
        }
    };

    match digits.len() {
        4 => digits
            .parse::<Year>()
            .ok()
            .filter(|y| (1900..=2100).contains(y)),
        2 => digits.parse::<Year>().ok().map(|y| 2000 + y),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a household table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one row per region, one numeric column per year
/// * `.json`    – `[{ "region": "...", "2019": 123.0, ... }, ...]`
/// * `.csv`     – header row, one row per region
pub fn load_file(path: &Path, layout: &TableLayout) -> Result<RegionTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let (headers, rows) = match ext.as_str() {
        "parquet" | "pq" => read_parquet(path)?,
        "json" => read_json(path)?,
        "csv" => read_csv(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };

    let table = build_table(&headers, rows, layout)
        .with_context(|| format!("building table from {}", path.display()))?;
    log::info!("Loaded {} from {}", table, path.display());
    Ok(table)
}

// ---------------------------------------------------------------------------
// Raw cells shared by all readers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Numeric reading of a cell. `Ok(None)` for blanks and NaN markers.
    fn as_f64(&self) -> std::result::Result<Option<f64>, String> {
        match self {
            Cell::Number(v) => finite_or_missing(*v).map_err(|_| format!("{v} is not finite")),
            Cell::Missing => Ok(None),
            Cell::Text(s) => {
                let s = s.trim();
                if is_missing_marker(s) {
                    return Ok(None);
                }
                // Spreadsheet exports often keep thousands separators.
                let v = s
                    .replace(',', "")
                    .parse::<f64>()
                    .map_err(|_| format!("'{s}' is not a number"))?;
                finite_or_missing(v).map_err(|_| format!("'{s}' is not finite"))
            }
        }
    }

    fn as_id(&self) -> Option<String> {
        match self {
            Cell::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Cell::Number(v) if v.fract() == 0.0 && v.is_finite() => Some(format!("{}", *v as i64)),
            Cell::Number(v) => Some(v.to_string()),
            Cell::Missing => None,
        }
    }
}

/// NaN reads as a blank cell; infinities are rejected.
fn finite_or_missing(v: f64) -> std::result::Result<Option<f64>, ()> {
    if v.is_nan() {
        Ok(None)
    } else if v.is_infinite() {
        Err(())
    } else {
        Ok(Some(v))
    }
}

fn is_missing_marker(s: &str) -> bool {
    s.is_empty()
        || s.eq_ignore_ascii_case("nan")
        || s.eq_ignore_ascii_case("na")
        || s.eq_ignore_ascii_case("null")
}

type RawTable = (Vec<String>, Vec<Vec<Cell>>);

// ---------------------------------------------------------------------------
// Column resolution
// ---------------------------------------------------------------------------

fn build_table(
    headers: &[String],
    rows: Vec<Vec<Cell>>,
    layout: &TableLayout,
) -> Result<RegionTable> {
    let id_idx = headers
        .iter()
        .position(|h| h == &layout.id_column)
        .with_context(|| format!("missing id column '{}'", layout.id_column))?;
    let lat_idx = headers.iter().position(|h| h == &layout.latitude_column);
    let lon_idx = headers.iter().position(|h| h == &layout.longitude_column);

    let mut year_cols: Vec<(usize, Year)> = Vec::new();
    let mut seen: BTreeMap<Year, &str> = BTreeMap::new();
    for (idx, header) in headers.iter().enumerate() {
        if Some(idx) == lat_idx || Some(idx) == lon_idx || idx == id_idx {
            continue;
        }
        let Some(year) = year_from_header(header, layout.year_prefix.as_deref()) else {
            continue;
        };
        if year == EXCLUDED_YEAR {
            log::warn!("Skipping column '{header}': {EXCLUDED_YEAR} is not a supported year");
            continue;
        }
        if let Some(previous) = seen.insert(year, header.as_str()) {
            bail!("columns '{previous}' and '{header}' both map to year {year}");
        }
        year_cols.push((idx, year));
    }

    if year_cols.is_empty() {
        log::warn!("No year columns found among {} headers", headers.len());
    } else {
        log::debug!("Year columns: {year_cols:?}");
    }

    let mut regions = Vec::with_capacity(rows.len());
    for (row_no, row) in rows.iter().enumerate() {
        let id = row
            .get(id_idx)
            .and_then(Cell::as_id)
            .with_context(|| format!("Row {row_no}: empty '{}'", layout.id_column))?;

        let mut region = RegionSeries::new(id);
        for &(idx, year) in &year_cols {
            let cell = row.get(idx).unwrap_or(&Cell::Missing);
            let value = cell
                .as_f64()
                .map_err(|msg| anyhow::anyhow!("Row {row_no}, column '{}': {msg}", headers[idx]))?;
            region.values.insert(year, value);
        }

        if let (Some(lat), Some(lon)) = (lat_idx, lon_idx) {
            let read = |idx: usize| -> Result<Option<f64>> {
                row.get(idx)
                    .unwrap_or(&Cell::Missing)
                    .as_f64()
                    .map_err(|msg| {
                        anyhow::anyhow!("Row {row_no}, column '{}': {msg}", headers[idx])
                    })
            };
            if let (Some(latitude), Some(longitude)) = (read(lat)?, read(lon)?) {
                region.centroid = Some(Centroid {
                    latitude,
                    longitude,
                });
            }
        }

        regions.push(region);
    }

    Ok(RegionTable::from_regions(regions)?)
}

// ---------------------------------------------------------------------------
// CSV reader
// ---------------------------------------------------------------------------

fn read_csv(path: &Path) -> Result<RawTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        rows.push(
            record
                .iter()
                .map(|value| Cell::Text(value.to_string()))
                .collect(),
        );
    }

    Ok((headers, rows))
}

// ---------------------------------------------------------------------------
// JSON reader
// ---------------------------------------------------------------------------

/// Records-oriented JSON, the default `df.to_json(orient='records')`.
fn read_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut headers: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
        objects.push(obj);
    }

    let rows = objects
        .into_iter()
        .map(|obj| {
            headers
                .iter()
                .map(|h| obj.get(h).map_or(Cell::Missing, json_to_cell))
                .collect()
        })
        .collect();

    Ok((headers, rows))
}

fn json_to_cell(val: &JsonValue) -> Cell {
    match val {
        JsonValue::Number(n) => n.as_f64().map_or(Cell::Missing, Cell::Number),
        JsonValue::String(s) => Cell::Text(s.clone()),
        JsonValue::Null => Cell::Missing,
        other => Cell::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet reader
// ---------------------------------------------------------------------------

/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`). Integer columns become year values as
/// readily as float columns do.
fn read_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for row in 0..batch.num_rows() {
            rows.push(
                batch
                    .columns()
                    .iter()
                    .map(|col| extract_cell(col, row))
                    .collect(),
            );
        }
    }

    Ok((headers, rows))
}

fn extract_cell(col: &Arc<dyn Array>, row: usize) -> Cell {
    if col.is_null(row) {
        return Cell::Missing;
    }
    let number = match col.data_type() {
        DataType::Float64 => col.as_primitive_opt::<Float64Type>().map(|a| a.value(row)),
        DataType::Float32 => col
            .as_primitive_opt::<Float32Type>()
            .map(|a| a.value(row) as f64),
        DataType::Int64 => col
            .as_primitive_opt::<Int64Type>()
            .map(|a| a.value(row) as f64),
        DataType::Int32 => col
            .as_primitive_opt::<Int32Type>()
            .map(|a| a.value(row) as f64),
        DataType::Utf8 => {
            return col
                .as_string_opt::<i32>()
                .map_or(Cell::Missing, |a| Cell::Text(a.value(row).to_string()));
        }
        DataType::LargeUtf8 => {
            return col
                .as_string_opt::<i64>()
                .map_or(Cell::Missing, |a| Cell::Text(a.value(row).to_string()));
        }
        other => return Cell::Text(format!("{other:?}")),
    };
    number.map_or(Cell::Missing, Cell::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_year_headers() {
        assert_eq!(year_from_header("House_ct_2019", None), Some(2019));
        assert_eq!(year_from_header("County_21", None), Some(2021));
        assert_eq!(year_from_header("2012", None), Some(2012));
        assert_eq!(year_from_header("PUMA12 name", None), None);
        assert_eq!(year_from_header("GEO_ID", None), None);
        assert_eq!(year_from_header("Count_123", None), None);
        assert_eq!(year_from_header("House_ct_2019", Some("House_ct_")), Some(2019));
        assert_eq!(year_from_header("Adj_Count_21", Some("Count_")), None);
    }

    #[test]
    fn loads_csv_with_missing_cells_and_centroids() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "counts.csv",
            "County,County_19,County_21,CENTLAT,CENTLON\n\
             Cook IL,\"1,000\",1100,41.8,-87.6\n\
             Kern CA,NaN,500,,\n",
        );
        let layout = TableLayout {
            id_column: "County".into(),
            ..TableLayout::default()
        };
        let table = load_file(&path, &layout).unwrap();

        assert_eq!(table.len(), 2);
        let cook = table.region("Cook IL").unwrap();
        assert_eq!(cook.value(2019), Some(1000.0));
        assert_eq!(cook.value(2021), Some(1100.0));
        assert!(cook.centroid.is_some());

        let kern = table.region("Kern CA").unwrap();
        assert_eq!(kern.value(2019), None);
        assert_eq!(kern.centroid, None);
    }

    #[test]
    fn skips_the_excluded_year_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "t.csv", "region,2019,2020,2021\nA,1,2,3\n");
        let table = load_file(&path, &TableLayout::default()).unwrap();
        assert!(!table.years().contains(&EXCLUDED_YEAR));
        assert_eq!(table.years().len(), 2);
    }

    #[test]
    fn rejects_non_numeric_year_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "t.csv", "region,2019\nA,lots\n");
        let err = load_file(&path, &TableLayout::default()).unwrap_err();
        assert!(format!("{err:#}").contains("not a number"));
    }

    #[test]
    fn rejects_infinite_cells() {
        let dir = tempfile::tempdir().unwrap();
        for cell in ["inf", "-Infinity"] {
            let path = write_temp(&dir, "t.csv", &format!("region,2019\nA,{cell}\n"));
            let err = load_file(&path, &TableLayout::default()).unwrap_err();
            assert!(format!("{err:#}").contains("not finite"), "{cell}: {err:#}");
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "t.csv", "region,2019\nA,1\nA,2\n");
        let err = load_file(&path, &TableLayout::default()).unwrap_err();
        assert!(format!("{err:#}").contains("more than once"));
    }

    #[test]
    fn loads_json_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "t.json",
            r#"[{"region": 4201, "2019": 10, "2021": null}, {"region": "B", "2019": 5.5}]"#,
        );
        let table = load_file(&path, &TableLayout::default()).unwrap();
        assert_eq!(table.regions()[0].id, "4201");
        assert_eq!(table.regions()[0].value(2021), None);
        assert_eq!(table.region("B").unwrap().value(2019), Some(5.5));
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = load_file(Path::new("data.xlsx"), &TableLayout::default()).unwrap_err();
        assert!(err.to_string().contains(".xlsx"));
    }
}
