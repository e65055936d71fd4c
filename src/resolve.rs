//! Entity resolution: join geometry features and measurement rows on one
//! normalized key space.
//!
//! ```text
//!  GeoEntity ids ──┐                        ┌── matched:  key → value / series
//!                  ├─ normalize / translate ┼── unmatched_geo
//!  row keys ───────┘                        ├── unmatched_rows
//!                                           └── diagnostics
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::config::{KeyPolicy, SeriesOptions, ValuePolicy};
use crate::data::filter::AggregateFilter;
use crate::data::model::{
    parse_code, EntityId, EntityKey, GeoEntity, MeasurementRow, TranslationTable,
};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{TransformError, TransformResult};
use crate::scale::ScaleDomain;
use crate::value::parse_cell;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryValue {
    pub category: Option<String>,
    pub value: f64,
}

/// All values of one entity for one period, categories in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSlice {
    pub period: Option<i32>,
    pub values: Vec<CategoryValue>,
}

impl PeriodSlice {
    pub fn total(&self) -> f64 {
        self.values.iter().map(|v| v.value).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KeyedValue {
    /// One number per entity.
    Snapshot(f64),
    /// Ordered by period ascending; a period-less slice sorts first.
    Series(Vec<PeriodSlice>),
}

impl KeyedValue {
    pub fn as_snapshot(&self) -> Option<f64> {
        match self {
            KeyedValue::Snapshot(v) => Some(*v),
            KeyedValue::Series(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub matched: BTreeMap<EntityKey, KeyedValue>,
    pub unmatched_geo: BTreeSet<EntityKey>,
    pub unmatched_rows: BTreeSet<EntityKey>,
    pub diagnostics: Vec<Diagnostic>,
    /// Snapshot values, or per-period totals for series data.
    pub domain: Option<ScaleDomain>,
}

#[derive(Debug, Clone)]
pub struct ResolveOptions<'a> {
    pub keys: KeyPolicy,
    pub values: ValuePolicy,
    /// Category labels of subtotal rows; these never reach a series.
    pub aggregate_categories: Vec<String>,
    pub translation: Option<&'a TranslationTable>,
}

impl Default for ResolveOptions<'_> {
    fn default() -> Self {
        ResolveOptions {
            keys: KeyPolicy::default(),
            values: ValuePolicy::default(),
            aggregate_categories: SeriesOptions::default().aggregate_categories,
            translation: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Key spaces
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Translate {
    Nothing,
    Geometry,
    Rows,
}

fn pick_translation(geo: &[GeoEntity], rows: &[MeasurementRow]) -> Translate {
    if geo.is_empty() || rows.is_empty() {
        return Translate::Nothing;
    }
    let geo_numeric = geo.iter().all(|g| g.id.is_code());
    let rows_numeric = rows.iter().all(|r| parse_code(&r.key).is_some());
    match (geo_numeric, rows_numeric) {
        (true, false) => Translate::Geometry,
        (false, true) => Translate::Rows,
        _ => Translate::Nothing,
    }
}

/// Outcome of mapping one raw identifier into the shared key space.
enum Keyed {
    Key(EntityKey),
    Untranslated(u32),
}

fn key_for_code(
    code: u32,
    translate: bool,
    table: Option<&TranslationTable>,
    policy: &KeyPolicy,
) -> Keyed {
    if !translate {
        return Keyed::Key(EntityKey::from_code(code));
    }
    match table.and_then(|t| t.label(code)) {
        Some(label) => Keyed::Key(EntityKey::normalize(label, policy)),
        None => Keyed::Untranslated(code),
    }
}

fn key_for_id(
    id: &EntityId,
    translate: bool,
    table: Option<&TranslationTable>,
    policy: &KeyPolicy,
) -> Keyed {
    match id {
        EntityId::Code(code) => key_for_code(*code, translate, table, policy),
        EntityId::Name(name) => Keyed::Key(EntityKey::normalize(name, policy)),
    }
}

// ---------------------------------------------------------------------------
// Row accumulation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SeriesAcc {
    slices: BTreeMap<Option<i32>, Vec<CategoryValue>>,
    seen: HashSet<(Option<i32>, Option<EntityKey>)>,
}

enum Acc {
    Snapshot(BTreeMap<EntityKey, f64>),
    Series(BTreeMap<EntityKey, SeriesAcc>),
}

impl Acc {
    fn keys(&self) -> BTreeSet<EntityKey> {
        match self {
            Acc::Snapshot(m) => m.keys().cloned().collect(),
            Acc::Series(m) => m.keys().cloned().collect(),
        }
    }

    fn take(&mut self, key: &EntityKey) -> Option<KeyedValue> {
        match self {
            Acc::Snapshot(m) => m.remove(key).map(KeyedValue::Snapshot),
            Acc::Series(m) => m.remove(key).map(|acc| {
                KeyedValue::Series(
                    acc.slices
                        .into_iter()
                        .map(|(period, values)| PeriodSlice { period, values })
                        .collect(),
                )
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// resolve
// ---------------------------------------------------------------------------

/// Join `geo` and `rows` on normalized keys.
///
/// Never drops data silently: every geometry entity ends up either in
/// `matched` or in `unmatched_geo`, every row key in `matched` or in
/// `unmatched_rows`. Only a missing translation table is fatal.
pub fn resolve(
    geo: &[GeoEntity],
    rows: &[MeasurementRow],
    opts: &ResolveOptions<'_>,
) -> TransformResult<Resolution> {
    let translate = pick_translation(geo, rows);
    if translate != Translate::Nothing && opts.translation.is_none() {
        return Err(TransformError::TranslationTableRequired {
            side: match translate {
                Translate::Geometry => "geometry",
                _ => "measurement",
            },
        });
    }

    let mut diagnostics = Vec::new();
    let mut unmatched_geo = BTreeSet::new();
    let mut unmatched_rows = BTreeSet::new();

    // Geometry keys
    let mut geo_keys = BTreeSet::new();
    for entity in geo {
        match key_for_id(
            &entity.id,
            translate == Translate::Geometry,
            opts.translation,
            &opts.keys,
        ) {
            Keyed::Key(k) => {
                if geo_keys.contains(&k) {
                    diagnostics.push(Diagnostic::for_entity(
                        k.as_str(),
                        DiagnosticKind::DuplicateGeometry,
                    ));
                } else {
                    geo_keys.insert(k);
                }
            }
            Keyed::Untranslated(code) => {
                diagnostics.push(Diagnostic::for_entity(
                    &code.to_string(),
                    DiagnosticKind::TranslationMissing { code },
                ));
                unmatched_geo.insert(EntityKey::from_code(code));
            }
        }
    }

    // Measurement rows
    let snapshot = rows
        .iter()
        .all(|r| r.period.is_none() && r.category.is_none());
    let mut acc = if snapshot {
        Acc::Snapshot(BTreeMap::new())
    } else {
        Acc::Series(BTreeMap::new())
    };
    let mut untranslated_codes = BTreeSet::new();
    let aggregates = AggregateFilter::new(&opts.aggregate_categories, &opts.keys);

    for (i, row) in rows.iter().enumerate() {
        let keyed = match parse_code(&row.key) {
            Some(code) if translate == Translate::Rows => {
                key_for_code(code, true, opts.translation, &opts.keys)
            }
            _ => Keyed::Key(EntityKey::from_raw(&row.key, &opts.keys)),
        };
        let key = match keyed {
            Keyed::Key(k) => k,
            Keyed::Untranslated(code) => {
                if untranslated_codes.insert(code) {
                    diagnostics.push(Diagnostic::for_row(
                        i,
                        row.key.trim(),
                        DiagnosticKind::TranslationMissing { code },
                    ));
                    unmatched_rows.insert(EntityKey::from_code(code));
                }
                continue;
            }
        };

        // Subtotals would double the per-period totals; the entity still counts.
        if let (Acc::Series(series), Some(category)) = (&mut acc, &row.category) {
            if aggregates.is_aggregate(category) {
                series.entry(key).or_default();
                continue;
            }
        }

        let (value, issue) = parse_cell(&row.value, &opts.values);
        if let Some(kind) = issue {
            diagnostics.push(Diagnostic::for_row(i, row.key.trim(), kind));
        }

        let duplicate = match &mut acc {
            Acc::Snapshot(values) => {
                if values.contains_key(&key) {
                    true
                } else {
                    values.insert(key, value);
                    false
                }
            }
            Acc::Series(series) => {
                let category = row.category.as_deref().map(str::trim);
                let entry = series.entry(key).or_default();
                let slot = (row.period, category.map(|c| EntityKey::normalize(c, &opts.keys)));
                if entry.seen.insert(slot) {
                    entry
                        .slices
                        .entry(row.period)
                        .or_default()
                        .push(CategoryValue {
                            category: category.map(str::to_string),
                            value,
                        });
                    false
                } else {
                    true
                }
            }
        };
        if duplicate {
            diagnostics.push(Diagnostic::for_row(
                i,
                row.key.trim(),
                DiagnosticKind::DuplicateEntry {
                    period: row.period,
                    category: row.category.as_deref().map(|c| c.trim().to_string()),
                },
            ));
        }
    }

    // Join
    let row_keys = acc.keys();
    let mut matched = BTreeMap::new();
    for key in &geo_keys {
        match acc.take(key) {
            Some(v) => {
                matched.insert(key.clone(), v);
            }
            None => {
                unmatched_geo.insert(key.clone());
            }
        }
    }
    unmatched_rows.extend(row_keys.into_iter().filter(|k| !geo_keys.contains(k)));

    let domain = ScaleDomain::observed(matched.values().flat_map(|v| match v {
        KeyedValue::Snapshot(x) => vec![*x],
        KeyedValue::Series(slices) => slices.iter().map(PeriodSlice::total).collect(),
    }));

    log::debug!(
        "resolved {} geometry entities against {} rows: {} matched, {} unmatched geo, {} unmatched rows, {} diagnostics",
        geo.len(),
        rows.len(),
        matched.len(),
        unmatched_geo.len(),
        unmatched_rows.len(),
        diagnostics.len()
    );

    Ok(Resolution {
        matched,
        unmatched_geo,
        unmatched_rows,
        diagnostics,
        domain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ids: &[&str]) -> Vec<GeoEntity> {
        ids.iter().map(|id| GeoEntity::new(EntityId::parse(id))).collect()
    }

    fn key(s: &str) -> EntityKey {
        EntityKey::normalize(s, &KeyPolicy::default())
    }

    #[test]
    fn snapshot_join_reports_unmatched_geometry() {
        let geo = names(&["CA", "TX", "ZZ"]);
        let rows = vec![
            MeasurementRow::snapshot("CA", 100.0),
            MeasurementRow::snapshot("TX", 50.0),
        ];
        let r = resolve(&geo, &rows, &ResolveOptions::default()).unwrap();

        assert_eq!(r.matched.len(), 2);
        assert_eq!(r.matched[&key("CA")], KeyedValue::Snapshot(100.0));
        assert_eq!(r.matched[&key("TX")], KeyedValue::Snapshot(50.0));
        assert_eq!(r.unmatched_geo, BTreeSet::from([key("ZZ")]));
        assert!(r.unmatched_rows.is_empty());
        assert!(r.diagnostics.is_empty());
        assert_eq!(r.domain, Some(ScaleDomain { min: 50.0, max: 100.0 }));
    }

    #[test]
    fn keys_are_trimmed_and_case_folded() {
        let geo = names(&["  New York "]);
        let rows = vec![MeasurementRow::snapshot("new york", 7.0)];
        let r = resolve(&geo, &rows, &ResolveOptions::default()).unwrap();
        assert_eq!(r.matched.len(), 1);

        let opts = ResolveOptions {
            keys: KeyPolicy { case_sensitive: true },
            ..Default::default()
        };
        let r = resolve(&geo, &rows, &opts).unwrap();
        assert!(r.matched.is_empty());
        assert_eq!(r.unmatched_geo.len(), 1);
        assert_eq!(r.unmatched_rows.len(), 1);
    }

    #[test]
    fn unmatched_rows_are_reported() {
        let geo = names(&["CA"]);
        let rows = vec![
            MeasurementRow::snapshot("CA", 1.0),
            MeasurementRow::snapshot("Puerto Rico", 2.0),
        ];
        let r = resolve(&geo, &rows, &ResolveOptions::default()).unwrap();
        assert_eq!(r.unmatched_rows, BTreeSet::from([key("Puerto Rico")]));
        assert!(r.unmatched_geo.is_empty());
    }

    #[test]
    fn numeric_geometry_is_translated() {
        let geo = vec![
            GeoEntity::new(EntityId::Code(6)),
            GeoEntity::new(EntityId::Code(48)),
            GeoEntity::new(EntityId::Code(99)),
        ];
        let rows = vec![
            MeasurementRow::snapshot("California", 100.0),
            MeasurementRow::snapshot("Texas", 50.0),
        ];
        let table: TranslationTable = vec![(6, "California".to_string()), (48, "Texas".to_string())]
            .into_iter()
            .collect();
        let opts = ResolveOptions {
            translation: Some(&table),
            ..Default::default()
        };
        let r = resolve(&geo, &rows, &opts).unwrap();
        assert_eq!(r.matched.len(), 2);
        assert_eq!(r.unmatched_geo, BTreeSet::from([EntityKey::from_code(99)]));
        assert_eq!(
            r.diagnostics,
            vec![Diagnostic::for_entity(
                "99",
                DiagnosticKind::TranslationMissing { code: 99 }
            )]
        );
    }

    #[test]
    fn numeric_rows_are_translated() {
        let geo = names(&["California", "Texas"]);
        let rows = vec![
            MeasurementRow::snapshot("06", 100.0),
            MeasurementRow::snapshot("72", 3.0),
            MeasurementRow::snapshot("72", 4.0),
        ];
        let table: TranslationTable = vec![(6, "California".to_string())].into_iter().collect();
        let opts = ResolveOptions {
            translation: Some(&table),
            ..Default::default()
        };
        let r = resolve(&geo, &rows, &opts).unwrap();
        assert_eq!(r.matched[&key("california")], KeyedValue::Snapshot(100.0));
        assert_eq!(r.unmatched_geo, BTreeSet::from([key("Texas")]));
        assert_eq!(r.unmatched_rows, BTreeSet::from([EntityKey::from_code(72)]));
        // one diagnostic per missing code, not per row
        assert_eq!(r.diagnostics.len(), 1);
        assert_eq!(r.diagnostics[0].row, Some(1));
    }

    #[test]
    fn shared_numeric_space_needs_no_table() {
        let geo = vec![GeoEntity::new(EntityId::Code(6))];
        let rows = vec![MeasurementRow::snapshot("006", 1.0)];
        let r = resolve(&geo, &rows, &ResolveOptions::default()).unwrap();
        assert_eq!(r.matched[&EntityKey::from_code(6)], KeyedValue::Snapshot(1.0));
    }

    #[test]
    fn missing_table_is_a_hard_error() {
        let geo = vec![GeoEntity::new(EntityId::Code(6))];
        let rows = vec![MeasurementRow::snapshot("California", 1.0)];
        let err = resolve(&geo, &rows, &ResolveOptions::default()).unwrap_err();
        assert_eq!(err, TransformError::TranslationTableRequired { side: "geometry" });
    }

    #[test]
    fn duplicates_keep_first_and_are_flagged() {
        let geo = names(&["CA"]);
        let rows = vec![
            MeasurementRow::snapshot("CA", 1.0),
            MeasurementRow::snapshot(" ca", 2.0),
        ];
        let r = resolve(&geo, &rows, &ResolveOptions::default()).unwrap();
        assert_eq!(r.matched[&key("CA")], KeyedValue::Snapshot(1.0));
        assert_eq!(
            r.diagnostics,
            vec![Diagnostic::for_row(
                1,
                "ca",
                DiagnosticKind::DuplicateEntry {
                    period: None,
                    category: None
                }
            )]
        );
    }

    #[test]
    fn long_rows_resolve_to_ordered_series() {
        let geo = names(&["CA"]);
        let rows = vec![
            MeasurementRow::observation("CA", "Tech", 2014, 30.0),
            MeasurementRow::observation("CA", "Tech", 2013, 10.0),
            MeasurementRow::observation("CA", "Farm", 2013, 5.0),
            MeasurementRow::observation("CA", "farm", 2013, 6.0),
        ];
        let r = resolve(&geo, &rows, &ResolveOptions::default()).unwrap();
        let KeyedValue::Series(slices) = &r.matched[&key("CA")] else {
            panic!("expected series");
        };
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].period, Some(2013));
        assert_eq!(slices[0].total(), 15.0);
        assert_eq!(slices[1].period, Some(2014));
        assert_eq!(r.diagnostics.len(), 1);
        assert!(matches!(
            r.diagnostics[0].kind,
            DiagnosticKind::DuplicateEntry { period: Some(2013), .. }
        ));
        assert_eq!(r.domain, Some(ScaleDomain { min: 15.0, max: 30.0 }));
    }

    #[test]
    fn aggregate_rows_stay_out_of_series_totals() {
        let geo = names(&["CA"]);
        let rows = vec![
            MeasurementRow::observation("CA", "Tech", 2013, 100.0),
            MeasurementRow::observation("CA", "Farm", 2013, 40.0),
            MeasurementRow::observation("CA", "All industry total", 2013, 140.0),
            MeasurementRow::observation("TX", "All industry total", 2013, 9.0),
        ];
        let r = resolve(&geo, &rows, &ResolveOptions::default()).unwrap();
        let KeyedValue::Series(slices) = &r.matched[&key("CA")] else {
            panic!("expected series");
        };
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].values.len(), 2);
        assert_eq!(slices[0].total(), 140.0);
        assert_eq!(r.domain, Some(ScaleDomain { min: 140.0, max: 140.0 }));
        // an entity with only subtotal rows is still reported
        assert_eq!(r.unmatched_rows, BTreeSet::from([key("TX")]));
        assert!(r.diagnostics.is_empty());

        let opts = ResolveOptions {
            aggregate_categories: Vec::new(),
            ..Default::default()
        };
        let r = resolve(&geo, &rows, &opts).unwrap();
        assert_eq!(r.domain, Some(ScaleDomain { min: 280.0, max: 280.0 }));
    }

    #[test]
    fn zero_padded_row_codes_match_series_queries() {
        let geo = vec![GeoEntity::new(EntityId::Code(6))];
        let rows = vec![
            MeasurementRow::observation("06", "Tech", 2013, 10.0),
            MeasurementRow::observation("06", "Farm", 2013, 5.0),
        ];
        let r = resolve(&geo, &rows, &ResolveOptions::default()).unwrap();
        let (matched_key, _) = r.matched.iter().next().unwrap();
        assert_eq!(matched_key.as_str(), "6");

        let built = crate::series::build_series(
            &rows,
            matched_key.as_str(),
            None,
            &crate::series::BuildOptions::default(),
        )
        .unwrap();
        assert_eq!(built.series.periods.len(), 1);
        assert_eq!(built.series.periods[0].total, 15.0);
    }

    #[test]
    fn matched_keys_keep_the_geometry_label() {
        let geo = names(&["CA", "TX"]);
        let rows = vec![
            MeasurementRow::snapshot("ca", 100.0),
            MeasurementRow::snapshot(" TX", 50.0),
        ];
        let r = resolve(&geo, &rows, &ResolveOptions::default()).unwrap();
        assert_eq!(
            serde_json::to_value(&r.matched).unwrap(),
            serde_json::json!({ "CA": 100.0, "TX": 50.0 })
        );
    }

    #[test]
    fn repeated_geometry_ids_are_flagged() {
        let geo = names(&["CA", "ca ", "TX"]);
        let rows = vec![MeasurementRow::snapshot("CA", 1.0)];
        let r = resolve(&geo, &rows, &ResolveOptions::default()).unwrap();
        assert_eq!(r.matched.len(), 1);
        assert_eq!(r.unmatched_geo, BTreeSet::from([key("TX")]));
        assert_eq!(
            r.diagnostics,
            vec![Diagnostic::for_entity("ca", DiagnosticKind::DuplicateGeometry)]
        );
    }

    #[test]
    fn placeholder_values_resolve_to_zero_with_diagnostic() {
        let geo = names(&["CA"]);
        let rows = vec![MeasurementRow::snapshot("CA", "(NA)")];
        let r = resolve(&geo, &rows, &ResolveOptions::default()).unwrap();
        assert_eq!(r.matched[&key("CA")].as_snapshot(), Some(0.0));
        assert_eq!(r.diagnostics.len(), 1);
    }
}
