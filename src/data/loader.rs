use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, ArrayRef, AsArray, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{parse_code, EntityId, GeoEntity, MeasurementRow, TranslationTable, ValueCell};
use crate::config::{GeometryLayout, MeasurementColumns};

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn read_json(path: &Path) -> Result<JsonValue> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing JSON in {}", path.display()))
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Load boundary features from a GeoJSON or TopoJSON file.
///
/// Supported layouts:
/// * GeoJSON `FeatureCollection` – one entity per feature
/// * TopoJSON `Topology` – one entity per geometry of the chosen object;
///   arcs are not decoded, the geometry object is kept as the payload
/// * a bare JSON array of feature-like objects
pub fn load_geometry(path: &Path, layout: &GeometryLayout) -> Result<Vec<GeoEntity>> {
    let root = read_json(path)?;
    let entities = geometry_from_json(&root, layout)
        .with_context(|| format!("reading geometry from {}", path.display()))?;
    log::info!("loaded {} geometry entities from {}", entities.len(), path.display());
    Ok(entities)
}

pub fn geometry_from_json(root: &JsonValue, layout: &GeometryLayout) -> Result<Vec<GeoEntity>> {
    let features = match root.get("type").and_then(|t| t.as_str()) {
        Some("FeatureCollection") => root
            .get("features")
            .and_then(|f| f.as_array())
            .context("FeatureCollection without a 'features' array")?,
        Some("Topology") => topology_geometries(root, layout)?,
        _ => root
            .as_array()
            .context("expected a FeatureCollection, a Topology or an array of features")?,
    };

    let mut entities = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let raw_id = match &layout.id_property {
            Some(prop) => feature.get("properties").and_then(|p| p.get(prop)),
            None => feature.get("id"),
        };
        let Some(id) = raw_id.and_then(EntityId::from_json) else {
            log::warn!("feature {i} has no usable identifier, skipped");
            continue;
        };
        let geometry = feature
            .get("geometry")
            .cloned()
            .unwrap_or_else(|| feature.clone());
        entities.push(GeoEntity { id, geometry });
    }
    Ok(entities)
}

fn topology_geometries<'a>(root: &'a JsonValue, layout: &GeometryLayout) -> Result<&'a Vec<JsonValue>> {
    let objects = root
        .get("objects")
        .and_then(|o| o.as_object())
        .context("Topology without an 'objects' map")?;
    let object = match &layout.topology_object {
        Some(name) => objects
            .get(name)
            .with_context(|| format!("Topology has no object '{name}'"))?,
        None => objects
            .values()
            .next()
            .context("Topology has no objects")?,
    };
    object
        .get("geometries")
        .and_then(|g| g.as_array())
        .context("Topology object is not a GeometryCollection")
}

// ---------------------------------------------------------------------------
// Measurements – public entry-point
// ---------------------------------------------------------------------------

/// Load a measurement table.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row; columns named by `columns`
/// * `.json`    – `[{ "state": "Texas", "gdp_2024": 2709393 }, ...]`
/// * `.parquet` – flat columns named by `columns`
///
/// Optional columns (category, period) that the file lacks are read as
/// absent on every row.
pub fn load_measurements(path: &Path, columns: &MeasurementColumns) -> Result<Vec<MeasurementRow>> {
    let rows = match extension(path).as_str() {
        "csv" => {
            let reader = csv::Reader::from_path(path).context("opening CSV")?;
            rows_from_csv(reader, columns)
        }
        "json" => rows_from_json(&read_json(path)?, columns),
        "parquet" | "pq" => load_parquet(path, columns),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("reading measurements from {}", path.display()))?;
    log::info!("loaded {} measurement rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Years arrive as `2014`, `"2014"` or `2014.0` depending on the exporter.
fn parse_period(raw: &str) -> Option<i32> {
    let t = raw.trim();
    t.parse::<i32>().ok().or_else(|| {
        t.parse::<f64>()
            .ok()
            .filter(|f| f.fract() == 0.0 && *f >= i32::MIN as f64 && *f <= i32::MAX as f64)
            .map(|f| f as i32)
    })
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

pub fn rows_from_csv<R: Read>(
    mut reader: csv::Reader<R>,
    columns: &MeasurementColumns,
) -> Result<Vec<MeasurementRow>> {
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let find = |name: &str| headers.iter().position(|h| h == name);

    let key_idx = find(&columns.key)
        .with_context(|| format!("CSV missing '{}' column", columns.key))?;
    let value_idx = find(&columns.value)
        .with_context(|| format!("CSV missing '{}' column", columns.value))?;
    let category_idx = columns.category.as_deref().and_then(find);
    let period_idx = columns.period.as_deref().and_then(find);

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let period = match period_idx.and_then(|i| record.get(i)).and_then(non_empty) {
            Some(raw) => Some(
                parse_period(&raw)
                    .with_context(|| format!("CSV row {row_no}: '{raw}' is not a period"))?,
            ),
            None => None,
        };
        let value = match record.get(value_idx).and_then(non_empty) {
            Some(raw) => ValueCell::Text(raw),
            None => ValueCell::Missing,
        };

        rows.push(MeasurementRow {
            key: record.get(key_idx).unwrap_or("").trim().to_string(),
            category: category_idx.and_then(|i| record.get(i)).and_then(non_empty),
            period,
            value,
        });
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   { "state": "California", "industry": "Tech", "year": 2014, "value": 120.5 },
///   ...
/// ]
/// ```
pub fn rows_from_json(root: &JsonValue, columns: &MeasurementColumns) -> Result<Vec<MeasurementRow>> {
    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut rows = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let key = obj
            .get(&columns.key)
            .and_then(json_text)
            .with_context(|| format!("Row {i}: missing '{}'", columns.key))?;
        let category = columns
            .category
            .as_ref()
            .and_then(|c| obj.get(c))
            .and_then(json_text);
        let period = match columns.period.as_ref().and_then(|c| obj.get(c)) {
            None | Some(JsonValue::Null) => None,
            Some(v) => {
                let raw = json_text(v).unwrap_or_else(|| v.to_string());
                Some(
                    parse_period(&raw)
                        .with_context(|| format!("Row {i}: '{raw}' is not a period"))?,
                )
            }
        };
        let value = match obj.get(&columns.value) {
            None | Some(JsonValue::Null) => ValueCell::Missing,
            Some(JsonValue::Number(n)) => n.as_f64().map_or(ValueCell::Missing, ValueCell::Number),
            Some(JsonValue::String(s)) => ValueCell::Text(s.clone()),
            Some(other) => ValueCell::Text(other.to_string()),
        };

        rows.push(MeasurementRow {
            key,
            category,
            period,
            value,
        });
    }
    Ok(rows)
}

fn json_text(val: &JsonValue) -> Option<String> {
    match val {
        JsonValue::String(s) => non_empty(s),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a long-format Parquet table. Key and category columns may be
/// string or integer typed, the period column integer or string, the value
/// column any numeric type (or string, parsed later).
fn load_parquet(path: &Path, columns: &MeasurementColumns) -> Result<Vec<MeasurementRow>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;
    rows_from_batches(reader, columns)
}

fn rows_from_batches<I>(batches: I, columns: &MeasurementColumns) -> Result<Vec<MeasurementRow>>
where
    I: IntoIterator<Item = std::result::Result<RecordBatch, ArrowError>>,
{
    let mut rows = Vec::new();
    // Row numbers in errors count from the start of the file.
    let mut offset = 0usize;

    for batch_result in batches {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let key_idx = schema
            .index_of(&columns.key)
            .map_err(|_| anyhow::anyhow!("Parquet file missing '{}' column", columns.key))?;
        let value_idx = schema
            .index_of(&columns.value)
            .map_err(|_| anyhow::anyhow!("Parquet file missing '{}' column", columns.value))?;
        let category_idx = columns
            .category
            .as_deref()
            .and_then(|c| schema.index_of(c).ok());
        let period_idx = columns
            .period
            .as_deref()
            .and_then(|c| schema.index_of(c).ok());

        let key_col = batch.column(key_idx);
        let value_col = batch.column(value_idx);

        for row in 0..batch.num_rows() {
            let line = offset + row;
            let key = extract_text(key_col, row)
                .with_context(|| format!("Row {line}: failed to read '{}'", columns.key))?;
            let category = category_idx.and_then(|i| extract_text(batch.column(i), row));
            let period = match period_idx {
                Some(i) => extract_period(batch.column(i), row)
                    .with_context(|| format!("Row {line}: failed to read period"))?,
                None => None,
            };

            rows.push(MeasurementRow {
                key,
                category,
                period,
                value: extract_cell(value_col, row),
            });
        }
        offset += batch.num_rows();
    }

    Ok(rows)
}

// -- Parquet / Arrow helpers --

fn extract_text(col: &ArrayRef, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    let text = match col.data_type() {
        DataType::Utf8 => col
            .as_any()
            .downcast_ref::<StringArray>()
            .map(|a| a.value(row).to_string()),
        DataType::LargeUtf8 => Some(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => col
            .as_any()
            .downcast_ref::<Int32Array>()
            .map(|a| a.value(row).to_string()),
        DataType::Int64 => col
            .as_any()
            .downcast_ref::<Int64Array>()
            .map(|a| a.value(row).to_string()),
        _ => None,
    }?;
    non_empty(&text)
}

fn extract_period(col: &ArrayRef, row: usize) -> Result<Option<i32>> {
    if col.is_null(row) {
        return Ok(None);
    }
    match col.data_type() {
        DataType::Int32 => Ok(col
            .as_any()
            .downcast_ref::<Int32Array>()
            .map(|a| a.value(row))),
        DataType::Int64 => {
            let Some(v) = col.as_any().downcast_ref::<Int64Array>().map(|a| a.value(row)) else {
                return Ok(None);
            };
            i32::try_from(v)
                .map(Some)
                .with_context(|| format!("period {v} out of range"))
        }
        DataType::Utf8 | DataType::LargeUtf8 => match extract_text(col, row) {
            Some(raw) => parse_period(&raw)
                .map(Some)
                .with_context(|| format!("'{raw}' is not a period")),
            None => Ok(None),
        },
        other => bail!("Period column has unsupported type {other:?}"),
    }
}

fn extract_cell(col: &ArrayRef, row: usize) -> ValueCell {
    if col.is_null(row) {
        return ValueCell::Missing;
    }
    let number = match col.data_type() {
        DataType::Float64 => col
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| a.value(row)),
        DataType::Float32 => col
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|a| a.value(row) as f64),
        DataType::Int32 => col
            .as_any()
            .downcast_ref::<Int32Array>()
            .map(|a| a.value(row) as f64),
        DataType::Int64 => col
            .as_any()
            .downcast_ref::<Int64Array>()
            .map(|a| a.value(row) as f64),
        _ => None,
    };
    match number {
        Some(v) => ValueCell::Number(v),
        None => match extract_text(col, row) {
            Some(raw) => ValueCell::Text(raw),
            None => ValueCell::Text(format!("{:?}", col.data_type())),
        },
    }
}

// ---------------------------------------------------------------------------
// Translation tables
// ---------------------------------------------------------------------------

/// Load a numeric-code → label table.
///
/// * `.csv`  – first column the code, second the label (header row skipped)
/// * `.json` – `{ "06": "California", "48": "Texas" }`
pub fn load_translation(path: &Path) -> Result<TranslationTable> {
    let table = match extension(path).as_str() {
        "csv" => {
            let reader = csv::Reader::from_path(path).context("opening CSV")?;
            translation_from_csv(reader)
        }
        "json" => translation_from_json(&read_json(path)?),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("reading translation table from {}", path.display()))?;
    log::info!("loaded {} translations from {}", table.len(), path.display());
    Ok(table)
}

pub fn translation_from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<TranslationTable> {
    let mut table = TranslationTable::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let raw = record.get(0).unwrap_or("");
        let code = parse_code(raw)
            .with_context(|| format!("CSV row {row_no}: '{raw}' is not a numeric code"))?;
        let label = record
            .get(1)
            .and_then(non_empty)
            .with_context(|| format!("CSV row {row_no}: missing label"))?;
        table.insert(code, &label);
    }
    Ok(table)
}

pub fn translation_from_json(root: &JsonValue) -> Result<TranslationTable> {
    let obj = root.as_object().context("Expected a JSON object of code → label")?;
    let mut table = TranslationTable::new();
    for (raw, label) in obj {
        let code = parse_code(raw).with_context(|| format!("'{raw}' is not a numeric code"))?;
        let label = label
            .as_str()
            .and_then(non_empty)
            .with_context(|| format!("code {raw}: label is not a string"))?;
        table.insert(code, &label);
    }
    Ok(table)
}
