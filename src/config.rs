use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Policies shared by the resolver and the series builder
// ---------------------------------------------------------------------------

/// How entity keys (and category labels) are compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPolicy {
    /// Source datasets are inconsistent here; ISO-code tables are usually
    /// upper-case while some name lists are not.
    pub case_sensitive: bool,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            case_sensitive: false,
        }
    }
}

/// Recognized "no number here" placeholders in value cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuePolicy {
    pub placeholders: Vec<String>,
}

impl Default for ValuePolicy {
    fn default() -> Self {
        Self {
            placeholders: ["(NA)", "NA", "N/A", "not available", "(D)"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ValuePolicy {
    /// Placeholders match after trimming, ignoring case.
    pub fn is_placeholder(&self, raw: &str) -> bool {
        let t = raw.trim();
        self.placeholders
            .iter()
            .any(|p| p.trim().eq_ignore_ascii_case(t))
    }
}

/// Knobs of [`crate::series::build_series`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesOptions {
    /// Subtotal rows present in the source tables. Excluded so they are not
    /// stacked on top of their own parts.
    pub aggregate_categories: Vec<String>,
    /// Category used for rows that carry none.
    pub default_category: String,
    /// Inclusive `(start, end)`; when set every period in it gets a row.
    pub period_range: Option<(i32, i32)>,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self {
            aggregate_categories: vec!["All industry total".to_string()],
            default_category: "value".to_string(),
            period_range: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Input layout
// ---------------------------------------------------------------------------

/// Which columns of a measurement table hold which field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementColumns {
    pub key: String,
    /// Optional columns that the file does not have are read as absent.
    pub category: Option<String>,
    pub period: Option<String>,
    pub value: String,
}

impl Default for MeasurementColumns {
    fn default() -> Self {
        Self {
            key: "key".to_string(),
            category: Some("category".to_string()),
            period: Some("period".to_string()),
            value: "value".to_string(),
        }
    }
}

/// Where a geometry feature keeps its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryLayout {
    /// Property holding the identifier. `None` uses the feature's own `id`.
    pub id_property: Option<String>,
    /// TopoJSON object to read. `None` takes the first object.
    pub topology_object: Option<String>,
}

// ---------------------------------------------------------------------------
// Config – the whole TOML file
// ---------------------------------------------------------------------------

/// ```toml
/// [keys]
/// case_sensitive = false
///
/// [measurements]
/// key = "state"
/// value = "gdp_2024"
///
/// [geometry]
/// id_property = "name"
///
/// [series]
/// aggregate_categories = ["All industry total"]
/// period_range = [2013, 2023]
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub keys: KeyPolicy,
    pub values: ValuePolicy,
    pub measurements: MeasurementColumns,
    pub geometry: GeometryLayout,
    pub series: SeriesOptions,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("parsing TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.measurements.key.trim().is_empty() {
            bail!("measurements.key must name a column");
        }
        if self.measurements.value.trim().is_empty() {
            bail!("measurements.value must name a column");
        }
        if let Some((start, end)) = self.series.period_range {
            crate::series::check_period_range(start, end).context("invalid series.period_range")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert!(!config.keys.case_sensitive);
        assert_eq!(config.measurements.key, "key");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml(
            r#"
            [keys]
            case_sensitive = true

            [measurements]
            key = "state"
            value = "gdp_2024"
            category = "industry"

            [series]
            period_range = [2013, 2015]
            "#,
        )
        .unwrap();
        assert!(config.keys.case_sensitive);
        assert_eq!(config.measurements.key, "state");
        assert_eq!(config.measurements.period.as_deref(), Some("period"));
        assert_eq!(config.measurements.category.as_deref(), Some("industry"));
        assert_eq!(config.series.period_range, Some((2013, 2015)));
        assert_eq!(config.series.default_category, "value");
    }

    #[test]
    fn reversed_period_range_is_rejected() {
        let err = Config::from_toml("[series]\nperiod_range = [2020, 2010]\n").unwrap_err();
        assert!(format!("{err:#}").contains("period_range"));
    }

    #[test]
    fn unbounded_period_range_is_rejected() {
        let err = Config::from_toml("[series]\nperiod_range = [-2147483648, 2147483647]\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("spans more than"));
        assert!(Config::from_toml("[series]\nperiod_range = [1900, 2100]\n").is_ok());
    }

    #[test]
    fn placeholders_ignore_case_and_padding() {
        let values = ValuePolicy::default();
        assert!(values.is_placeholder(" Not Available "));
        assert!(values.is_placeholder("(NA)"));
        assert!(!values.is_placeholder("12"));
    }
}
