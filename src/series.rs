//! Pivot long-format rows of one entity into stacked bands.
//!
//! For each period the categories are laid end to end in the declared
//! order, so band `i` starts where band `i - 1` ends and the last band ends
//! at the period total.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::config::{KeyPolicy, SeriesOptions, ValuePolicy};
use crate::data::filter::{entity_indices, AggregateFilter};
use crate::data::model::{EntityKey, MeasurementRow};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{TransformError, TransformResult};
use crate::value::parse_cell;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One category's slice of a period: the half-open interval `[low, high)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Band {
    pub category: String,
    pub value: f64,
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStack {
    pub period: i32,
    pub total: f64,
    /// Exactly one band per category, in category order.
    pub bands: Vec<Band>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackedSeries {
    pub entity: String,
    /// Stacking (and legend) order.
    pub categories: Vec<String>,
    pub periods: Vec<PeriodStack>,
}

impl StackedSeries {
    pub fn period(&self, period: i32) -> Option<&PeriodStack> {
        self.periods.iter().find(|p| p.period == period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesBuild {
    pub series: StackedSeries,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub keys: KeyPolicy,
    pub values: ValuePolicy,
    pub series: SeriesOptions,
}

// ---------------------------------------------------------------------------
// Category ordering
// ---------------------------------------------------------------------------

/// Category labels in stacking order with a normalized lookup.
struct CategoryIndex {
    labels: Vec<String>,
    lookup: HashMap<EntityKey, usize>,
    /// When true, unseen labels are an error instead of being appended.
    fixed: bool,
}

impl CategoryIndex {
    fn new(order: Option<&[String]>, policy: &KeyPolicy) -> Self {
        let mut index = CategoryIndex {
            labels: Vec::new(),
            lookup: HashMap::new(),
            fixed: false,
        };
        if let Some(order) = order {
            for label in order {
                index.insert(label.trim(), policy);
            }
            index.fixed = true;
        }
        index
    }

    fn insert(&mut self, label: &str, policy: &KeyPolicy) -> usize {
        let next = self.labels.len();
        let slot = *self
            .lookup
            .entry(EntityKey::normalize(label, policy))
            .or_insert(next);
        if slot == next {
            self.labels.push(label.to_string());
        }
        slot
    }

    fn get(&self, label: &str, policy: &KeyPolicy) -> Option<usize> {
        self.lookup.get(&EntityKey::normalize(label, policy)).copied()
    }
}

// ---------------------------------------------------------------------------
// build_series
// ---------------------------------------------------------------------------

/// Largest number of periods a fixed range may zero-fill.
pub const MAX_PERIOD_SPAN: u32 = 10_000;

/// Reject a reversed range or one too wide to materialize.
pub fn check_period_range(start: i32, end: i32) -> TransformResult<()> {
    if start > end {
        return Err(TransformError::InvalidPeriodRange { start, end });
    }
    let span = i64::from(end) - i64::from(start) + 1;
    if span > i64::from(MAX_PERIOD_SPAN) {
        return Err(TransformError::PeriodRangeTooWide {
            start,
            end,
            max: MAX_PERIOD_SPAN,
        });
    }
    Ok(())
}

/// Build the stacked series of `entity` from long-format `rows`.
///
/// With `category_order` the stacking order is fixed and a row outside it
/// fails the build with [`TransformError::UnknownCategory`]. Without it,
/// categories stack in first-seen order. Value problems, duplicates and
/// rows that cannot be placed on the period axis are returned as
/// diagnostics.
pub fn build_series(
    rows: &[MeasurementRow],
    entity: &str,
    category_order: Option<&[String]>,
    opts: &BuildOptions,
) -> TransformResult<SeriesBuild> {
    let range = opts.series.period_range;
    if let Some((start, end)) = range {
        check_period_range(start, end)?;
    }

    let aggregates = AggregateFilter::new(&opts.series.aggregate_categories, &opts.keys);
    let selected = entity_indices(rows, entity, &opts.keys, &aggregates);

    let entity = entity.trim();
    let mut categories = CategoryIndex::new(category_order, &opts.keys);
    let mut cells: BTreeMap<(i32, usize), f64> = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for i in selected {
        let row = &rows[i];
        let label = row
            .category
            .as_deref()
            .map(str::trim)
            .unwrap_or(opts.series.default_category.as_str());

        let known = categories.get(label, &opts.keys);
        if known.is_none() && categories.fixed {
            return Err(TransformError::UnknownCategory {
                row: i,
                entity: entity.to_string(),
                category: label.to_string(),
            });
        }

        let period = match row.period {
            Some(p) => p,
            None => {
                diagnostics.push(Diagnostic::for_row(i, entity, DiagnosticKind::MissingPeriod));
                continue;
            }
        };
        if let Some((start, end)) = range {
            if period < start || period > end {
                diagnostics.push(Diagnostic::for_row(
                    i,
                    entity,
                    DiagnosticKind::PeriodOutOfRange { period },
                ));
                continue;
            }
        }

        let slot = match known {
            Some(slot) => slot,
            None => categories.insert(label, &opts.keys),
        };
        if cells.contains_key(&(period, slot)) {
            diagnostics.push(Diagnostic::for_row(
                i,
                entity,
                DiagnosticKind::DuplicateEntry {
                    period: Some(period),
                    category: Some(label.to_string()),
                },
            ));
            continue;
        }

        let (value, issue) = parse_cell(&row.value, &opts.values);
        if let Some(kind) = issue {
            diagnostics.push(Diagnostic::for_row(i, entity, kind));
        }
        cells.insert((period, slot), value);
    }

    let periods: Vec<i32> = match range {
        Some((start, end)) => (start..=end).collect(),
        None => cells
            .keys()
            .map(|(p, _)| *p)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };

    let stacks = periods
        .into_iter()
        .map(|period| stack_period(period, &categories.labels, &cells))
        .collect();

    log::debug!(
        "built series for '{entity}': {} categories, {} cells, {} diagnostics",
        categories.labels.len(),
        cells.len(),
        diagnostics.len()
    );

    Ok(SeriesBuild {
        series: StackedSeries {
            entity: entity.to_string(),
            categories: categories.labels,
            periods: stacks,
        },
        diagnostics,
    })
}

fn stack_period(
    period: i32,
    labels: &[String],
    cells: &BTreeMap<(i32, usize), f64>,
) -> PeriodStack {
    let mut running = 0.0;
    let bands = labels
        .iter()
        .enumerate()
        .map(|(slot, label)| {
            let value = cells.get(&(period, slot)).copied().unwrap_or(0.0);
            let low = running;
            running += value;
            Band {
                category: label.clone(),
                value,
                low,
                high: running,
            }
        })
        .collect();
    PeriodStack {
        period,
        total: running,
        bands,
    }
}
