use std::sync::Arc;

use arrow::array::{Float64Array, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

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
}

fn main() {
    let mut rng = SimpleRng::new(42);

    let states = [
        ("California", 3.9),
        ("Texas", 2.4),
        ("New York", 2.0),
        ("Florida", 1.4),
        ("Illinois", 1.0),
    ];
    // Share of state output per sector.
    let sectors = [
        ("Information", 0.12),
        ("Manufacturing", 0.10),
        ("Finance and insurance", 0.09),
        ("Agriculture", 0.02),
        ("Government", 0.11),
    ];
    let years = 2013..=2023;

    let mut all_state: Vec<String> = Vec::new();
    let mut all_industry: Vec<String> = Vec::new();
    let mut all_year: Vec<i32> = Vec::new();
    let mut all_value: Vec<Option<f64>> = Vec::new();

    for &(state, size) in &states {
        for year in years.clone() {
            let growth = 1.0 + 0.03 * (year - 2013) as f64;
            let mut total = 0.0;
            for &(sector, share) in &sectors {
                let noise = 0.9 + 0.2 * rng.next_f64();
                let value = (size * 1.0e6 * share * growth * noise).round();
                total += value;

                // Occasionally suppressed, as in published regional accounts.
                let suppressed = rng.next_f64() < 0.02;
                all_state.push(state.to_string());
                all_industry.push(sector.to_string());
                all_year.push(year);
                all_value.push((!suppressed).then_some(value));
            }
            all_state.push(state.to_string());
            all_industry.push("All industry total".to_string());
            all_year.push(year);
            all_value.push(Some(total));
        }
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("category", DataType::Utf8, false),
        Field::new("period", DataType::Int32, false),
        Field::new("value", DataType::Float64, true),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(
                all_state.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                all_industry.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(Int32Array::from(all_year)),
            Arc::new(Float64Array::from(all_value)),
        ],
    )
    .expect("Failed to create RecordBatch");

    let output_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sample_measurements.parquet".to_string());
    let rows = batch.num_rows();
    let file = std::fs::File::create(&output_path).expect("Failed to create output file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("Failed to create writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");

    println!("Wrote {rows} measurement rows to {output_path}");
}
