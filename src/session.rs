use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::data::loader;
use crate::data::model::{EntityKey, GeoEntity, MeasurementRow, TranslationTable};
use crate::error::TransformResult;
use crate::resolve::{resolve, Resolution, ResolveOptions};
use crate::series::{build_series, BuildOptions, SeriesBuild};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Datasets materialized once for a session. Every query derives a fresh
/// result from them; nothing computed is kept.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub config: Config,

    /// Boundary features (empty until geometry is loaded).
    pub geometry: Vec<GeoEntity>,

    /// Long-format or snapshot measurement rows.
    pub rows: Vec<MeasurementRow>,

    /// Code → label table, when the two datasets use different key spaces.
    pub translation: Option<TranslationTable>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn load_geometry(&mut self, path: &Path) -> Result<()> {
        self.geometry = loader::load_geometry(path, &self.config.geometry)?;
        Ok(())
    }

    pub fn load_measurements(&mut self, path: &Path) -> Result<()> {
        self.rows = loader::load_measurements(path, &self.config.measurements)?;
        Ok(())
    }

    pub fn load_translation(&mut self, path: &Path) -> Result<()> {
        self.translation = Some(loader::load_translation(path)?);
        Ok(())
    }

    /// Join geometry and measurements.
    pub fn resolve(&self) -> TransformResult<Resolution> {
        let opts = ResolveOptions {
            keys: self.config.keys.clone(),
            values: self.config.values.clone(),
            aggregate_categories: self.config.series.aggregate_categories.clone(),
            translation: self.translation.as_ref(),
        };
        resolve(&self.geometry, &self.rows, &opts)
    }

    /// Stacked series of one entity.
    pub fn series(&self, entity: &str, category_order: Option<&[String]>) -> TransformResult<SeriesBuild> {
        let opts = BuildOptions {
            keys: self.config.keys.clone(),
            values: self.config.values.clone(),
            series: self.config.series.clone(),
        };
        build_series(&self.rows, entity, category_order, &opts)
    }

    /// Distinct entity keys present in the measurement rows.
    pub fn entity_keys(&self) -> BTreeSet<EntityKey> {
        self.rows
            .iter()
            .map(|r| EntityKey::from_raw(&r.key, &self.config.keys))
            .collect()
    }

    /// Whether any measurement row belongs to `entity`.
    pub fn has_entity(&self, entity: &str) -> bool {
        self.entity_keys()
            .contains(&EntityKey::from_raw(entity, &self.config.keys))
    }
}
