use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use household_trends::data::model::{Year, EXPECTED_YEARS};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }
}

/// A region's household count per year: a base count compounding at its
/// own growth rate, with a little yearly noise.
fn household_series(rng: &mut SimpleRng, years: &[Year]) -> Vec<Option<f64>> {
    let base = rng.uniform(25_000.0, 120_000.0);
    let growth = rng.uniform(-0.02, 0.04);
    years
        .iter()
        .map(|&year| {
            let elapsed = f64::from(year - years[0]);
            let noise = rng.uniform(-0.01, 0.01);
            Some((base * (1.0 + growth).powf(elapsed) * (1.0 + noise)).round())
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let stem = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sample_households".to_string());

    let mut rng = SimpleRng::new(42);
    let years: Vec<Year> = EXPECTED_YEARS.to_vec();

    let mut ids: Vec<String> = Vec::new();
    let mut lats: Vec<Option<f64>> = Vec::new();
    let mut lons: Vec<Option<f64>> = Vec::new();
    let mut counts: Vec<Vec<Option<f64>>> = vec![Vec::new(); years.len()];

    for i in 0..200 {
        ids.push(format!("PUMA {:05}", 100 + i));
        lats.push(Some(rng.uniform(25.0, 49.0)));
        lons.push(Some(rng.uniform(-124.0, -67.0)));
        for (col, value) in counts.iter_mut().zip(household_series(&mut rng, &years)) {
            col.push(value);
        }
    }

    // Edge rows: a zero base, a gap in the series, and one outside the
    // continental box.
    let mut edge = |id: &str, lat: f64, lon: f64, values: Vec<Option<f64>>| {
        ids.push(id.to_string());
        lats.push(Some(lat));
        lons.push(Some(lon));
        for (col, value) in counts.iter_mut().zip(values) {
            col.push(value);
        }
    };
    let new_build: Vec<Option<f64>> = years
        .iter()
        .map(|&y| Some(if y < 2019 { 0.0 } else { f64::from(y - 2018) * 500.0 }))
        .collect();
    edge("PUMA new-build", 33.4, -111.9, new_build);
    let gap: Vec<Option<f64>> = years
        .iter()
        .map(|&y| (y != 2019).then_some(40_000.0))
        .collect();
    edge("PUMA gap", 39.7, -104.9, gap);
    edge("PUMA Honolulu", 21.3, -157.8, household_series(&mut rng, &years));

    let mut fields = vec![Field::new("region", DataType::Utf8, false)];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(StringArray::from(
        ids.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
    ))];
    for (year, values) in years.iter().zip(counts) {
        fields.push(Field::new(format!("House_ct_{year}"), DataType::Float64, true));
        columns.push(Arc::new(Float64Array::from(values)));
    }
    fields.push(Field::new("CENTLAT", DataType::Float64, true));
    fields.push(Field::new("CENTLON", DataType::Float64, true));
    columns.push(Arc::new(Float64Array::from(lats)));
    columns.push(Arc::new(Float64Array::from(lons)));

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    // Write Parquet
    let parquet_path = format!("{stem}.parquet");
    let file = std::fs::File::create(&parquet_path).context("creating parquet output")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;

    // Same rows as CSV
    let csv_path = format!("{stem}.csv");
    let mut csv_writer = csv::Writer::from_path(&csv_path).context("creating CSV output")?;
    let header: Vec<String> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    csv_writer.write_record(&header)?;
    for row in 0..batch.num_rows() {
        let mut record = vec![ids[row].clone()];
        for col in batch.columns().iter().skip(1) {
            let values = col
                .as_any()
                .downcast_ref::<Float64Array>()
                .context("expected Float64 column")?;
            record.push(if values.is_null(row) {
                String::new()
            } else {
                values.value(row).to_string()
            });
        }
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;

    println!(
        "Wrote {} regions ({} years each) to {parquet_path} and {csv_path}",
        ids.len(),
        years.len()
    );
    Ok(())
}
