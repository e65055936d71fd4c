use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::KeyPolicy;

// ---------------------------------------------------------------------------
// EntityId – identifier carried by a geometry feature
// ---------------------------------------------------------------------------

/// Identifier of a geographic entity as it appears in the source data.
///
/// Atlases disagree on how they name things: some carry a `name` property,
/// some only a numeric region code (often zero-padded text such as `"06"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Code(u32),
    Name(String),
}

impl EntityId {
    /// Classify a textual identifier. All-digit text is a numeric code.
    pub fn parse(raw: &str) -> Self {
        match parse_code(raw) {
            Some(code) => EntityId::Code(code),
            None => EntityId::Name(raw.trim().to_string()),
        }
    }

    /// Classify a JSON identifier (number or string).
    pub fn from_json(val: &JsonValue) -> Option<Self> {
        match val {
            JsonValue::String(s) if !s.trim().is_empty() => Some(EntityId::parse(s)),
            JsonValue::Number(n) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(EntityId::Code),
            _ => None,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, EntityId::Code(_))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Code(c) => write!(f, "{c}"),
            EntityId::Name(n) => write!(f, "{n}"),
        }
    }
}

/// Parse a trimmed, non-empty, all-ASCII-digit string as a region code.
pub fn parse_code(raw: &str) -> Option<u32> {
    let t = raw.trim();
    if t.is_empty() || !t.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    t.parse().ok()
}

// ---------------------------------------------------------------------------
// EntityKey – normalized join key
// ---------------------------------------------------------------------------

/// A join key in the shared key space of both datasets.
///
/// Comparison, ordering and hashing use the folded form, so two keys are
/// equal exactly when the key policy says they name the same entity. The
/// trimmed label as first written is kept for output.
#[derive(Debug, Clone)]
pub struct EntityKey {
    label: String,
    folded: String,
}

impl EntityKey {
    pub fn normalize(raw: &str, policy: &KeyPolicy) -> Self {
        let label = raw.trim().to_string();
        let folded = if policy.case_sensitive {
            label.clone()
        } else {
            label.to_lowercase()
        };
        EntityKey { label, folded }
    }

    /// Codes normalize to their decimal form, so `"06"` and `6` agree.
    pub fn from_code(code: u32) -> Self {
        let label = code.to_string();
        EntityKey {
            folded: label.clone(),
            label,
        }
    }

    /// Key for a raw measurement key or entity query: all-digit text is a
    /// code, anything else a name.
    pub fn from_raw(raw: &str, policy: &KeyPolicy) -> Self {
        match parse_code(raw) {
            Some(code) => EntityKey::from_code(code),
            None => EntityKey::normalize(raw, policy),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.label
    }
}

impl PartialEq for EntityKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for EntityKey {}

impl PartialOrd for EntityKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EntityKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.folded.cmp(&other.folded)
    }
}

impl std::hash::Hash for EntityKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl Serialize for EntityKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

// ---------------------------------------------------------------------------
// GeoEntity – one boundary feature
// ---------------------------------------------------------------------------

/// A geometry feature. The payload is kept as raw JSON; nothing in this
/// crate looks inside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoEntity {
    pub id: EntityId,
    pub geometry: JsonValue,
}

impl GeoEntity {
    pub fn new(id: EntityId) -> Self {
        GeoEntity {
            id,
            geometry: JsonValue::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// ValueCell / MeasurementRow – one row of the long-format table
// ---------------------------------------------------------------------------

/// A value cell exactly as read. Text is parsed later so placeholder
/// handling lives in one place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ValueCell {
    Number(f64),
    Text(String),
    Missing,
}

impl From<f64> for ValueCell {
    fn from(v: f64) -> Self {
        ValueCell::Number(v)
    }
}

impl From<&str> for ValueCell {
    fn from(s: &str) -> Self {
        ValueCell::Text(s.to_string())
    }
}

/// One measurement: entity × optional category × optional period.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRow {
    pub key: String,
    pub category: Option<String>,
    pub period: Option<i32>,
    pub value: ValueCell,
}

impl MeasurementRow {
    /// A single-metric snapshot row.
    pub fn snapshot(key: &str, value: impl Into<ValueCell>) -> Self {
        MeasurementRow {
            key: key.to_string(),
            category: None,
            period: None,
            value: value.into(),
        }
    }

    /// A long-format row with category and period.
    pub fn observation(
        key: &str,
        category: &str,
        period: i32,
        value: impl Into<ValueCell>,
    ) -> Self {
        MeasurementRow {
            key: key.to_string(),
            category: Some(category.to_string()),
            period: Some(period),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TranslationTable – numeric code → canonical label
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationTable {
    labels: BTreeMap<u32, String>,
}

impl TranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: u32, label: &str) {
        self.labels.insert(code, label.trim().to_string());
    }

    pub fn label(&self, code: u32) -> Option<&str> {
        self.labels.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl FromIterator<(u32, String)> for TranslationTable {
    fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
        let mut table = TranslationTable::new();
        for (code, label) in iter {
            table.insert(code, &label);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn digit_strings_are_codes() {
        assert_eq!(EntityId::parse(" 06 "), EntityId::Code(6));
        assert_eq!(EntityId::parse("California"), EntityId::Name("California".into()));
        assert_eq!(EntityId::parse("6a"), EntityId::Name("6a".into()));
        assert_eq!(EntityId::from_json(&json!(48)), Some(EntityId::Code(48)));
        assert_eq!(EntityId::from_json(&json!("48")), Some(EntityId::Code(48)));
        assert_eq!(EntityId::from_json(&json!(-1)), None);
        assert_eq!(EntityId::from_json(&json!("  ")), None);
    }

    #[test]
    fn keys_trim_and_follow_case_policy() {
        let insensitive = KeyPolicy { case_sensitive: false };
        let sensitive = KeyPolicy { case_sensitive: true };
        assert_eq!(
            EntityKey::normalize("  Texas ", &insensitive),
            EntityKey::normalize("texas", &insensitive)
        );
        assert_ne!(
            EntityKey::normalize("Texas", &sensitive),
            EntityKey::normalize("texas", &sensitive)
        );
        assert_eq!(EntityKey::normalize(" Texas\t", &sensitive).as_str(), "Texas");
    }

    #[test]
    fn folded_keys_keep_their_written_label() {
        let insensitive = KeyPolicy { case_sensitive: false };
        let key = EntityKey::normalize(" CA ", &insensitive);
        assert_eq!(key, EntityKey::normalize("ca", &insensitive));
        assert_eq!(key.as_str(), "CA");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"CA\"");
    }

    #[test]
    fn raw_keys_treat_digits_as_codes() {
        let policy = KeyPolicy::default();
        assert_eq!(EntityKey::from_raw(" 06 ", &policy), EntityKey::from_code(6));
        assert_eq!(EntityKey::from_raw("6", &policy).as_str(), "6");
        assert_eq!(EntityKey::from_raw(" Texas", &policy).as_str(), "Texas");
    }

    #[test]
    fn translation_labels_are_trimmed() {
        let table: TranslationTable = vec![(6, " California ".to_string())].into_iter().collect();
        assert_eq!(table.label(6), Some("California"));
        assert_eq!(table.label(7), None);
        assert_eq!(table.len(), 1);
    }
}
