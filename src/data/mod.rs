/// Data layer: core types, loading, and row selection.
///
/// Architecture:
/// ```text
///  .geojson / .topojson          .csv / .json / .parquet
///        │                               │
///        ▼                               ▼
///   ┌──────────┐                   ┌──────────┐
///   │  loader   │ → Vec<GeoEntity>  │  loader   │ → Vec<MeasurementRow>
///   └──────────┘                   └──────────┘
///        │                               │
///        └──────────────┬────────────────┘
///                       ▼
///              resolve / series (crate root)
///                       │
///                       ▼
///                 ┌──────────┐
///                 │  filter   │  rows of one entity, minus aggregates
///                 └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod filter;
