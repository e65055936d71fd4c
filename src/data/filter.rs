use std::collections::BTreeSet;

use super::model::{EntityKey, MeasurementRow};
use crate::config::KeyPolicy;

// ---------------------------------------------------------------------------
// Row selection predicates
// ---------------------------------------------------------------------------

/// Normalized set of category labels treated as subtotals.
#[derive(Debug, Clone, Default)]
pub struct AggregateFilter {
    sentinels: BTreeSet<EntityKey>,
    policy: KeyPolicy,
}

impl AggregateFilter {
    pub fn new(labels: &[String], policy: &KeyPolicy) -> Self {
        AggregateFilter {
            sentinels: labels
                .iter()
                .map(|l| EntityKey::normalize(l, policy))
                .collect(),
            policy: policy.clone(),
        }
    }

    /// Whether a category label names an aggregate row.
    pub fn is_aggregate(&self, category: &str) -> bool {
        self.sentinels
            .contains(&EntityKey::normalize(category, &self.policy))
    }
}

/// Return indices of rows belonging to `entity` that are not aggregates.
///
/// A row passes when:
/// * its key equals `entity` under [`EntityKey::from_raw`], so code keys
///   such as `"06"` match the resolver's `"6"`
/// * it has no category, or its category is not an aggregate sentinel
pub fn entity_indices(
    rows: &[MeasurementRow],
    entity: &str,
    policy: &KeyPolicy,
    aggregates: &AggregateFilter,
) -> Vec<usize> {
    let wanted = EntityKey::from_raw(entity, policy);
    rows.iter()
        .enumerate()
        .filter(|(_, row)| EntityKey::from_raw(&row.key, policy) == wanted)
        .filter(|(_, row)| match &row.category {
            Some(c) => !aggregates.is_aggregate(c),
            None => true,
        })
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<MeasurementRow> {
        vec![
            MeasurementRow::observation("CA", "Tech", 2013, 10.0),
            MeasurementRow::observation(" ca ", "All industry total", 2013, 30.0),
            MeasurementRow::observation("TX", "Tech", 2013, 5.0),
            MeasurementRow::observation("CA", "Farm", 2013, 20.0),
            MeasurementRow::snapshot("CA", 7.0),
        ]
    }

    #[test]
    fn selects_entity_and_drops_aggregates() {
        let policy = KeyPolicy::default();
        let aggregates = AggregateFilter::new(&["all industry TOTAL".to_string()], &policy);
        assert_eq!(entity_indices(&rows(), "ca", &policy, &aggregates), vec![0, 3, 4]);
    }

    #[test]
    fn case_sensitive_policy_is_honoured() {
        let policy = KeyPolicy { case_sensitive: true };
        let aggregates = AggregateFilter::new(&[], &policy);
        assert_eq!(entity_indices(&rows(), "ca", &policy, &aggregates), vec![1]);
        assert!(entity_indices(&rows(), "Ca", &policy, &aggregates).is_empty());
    }

    #[test]
    fn code_keys_match_in_decimal_form() {
        let policy = KeyPolicy::default();
        let aggregates = AggregateFilter::new(&[], &policy);
        let rows = vec![
            MeasurementRow::observation("06", "Tech", 2013, 10.0),
            MeasurementRow::observation("48", "Tech", 2013, 5.0),
            MeasurementRow::observation("6", "Farm", 2013, 2.0),
        ];
        assert_eq!(entity_indices(&rows, "6", &policy, &aggregates), vec![0, 2]);
        assert_eq!(entity_indices(&rows, "006", &policy, &aggregates), vec![0, 2]);
    }
}
