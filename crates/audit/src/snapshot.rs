use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Capability implemented by every entity whose mutations are audited.
pub trait Auditable {
    /// Stable, lowercase entity type name (e.g. `"material"`).
    fn entity_type(&self) -> &'static str;

    /// Identifier of the audited record, rendered as text.
    fn entity_id(&self) -> String;

    /// Human-readable representation stored alongside the diff.
    fn display(&self) -> String;

    /// Field-level view of the current state. Identity is not part of the map.
    fn snapshot(&self) -> FieldMap;
}

/// Ordered field name → JSON value map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(BTreeMap<String, JsonValue>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    ///
    /// Values that cannot be represented as JSON are recorded as `null`.
    pub fn with(mut self, name: &str, value: impl Serialize) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(JsonValue::Null);
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }
}

/// Old/new pair for a single changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: JsonValue,
    pub new: JsonValue,
}

/// Field-level diff attached to an audit entry.
///
/// Serialized as `{"added": {...}}` or `{"changed": {field: {"old", "new"}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditDiff {
    Added(FieldMap),
    Changed(BTreeMap<String, FieldChange>),
}

impl AuditDiff {
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Compare two snapshots field by field.
///
/// A field present on one side only is compared against `null`. Returns `None`
/// when nothing changed.
pub fn diff_snapshots(before: &FieldMap, after: &FieldMap) -> Option<AuditDiff> {
    let mut changed = BTreeMap::new();

    for (name, old) in before.iter() {
        let new = after.get(name).unwrap_or(&JsonValue::Null);
        if old != new {
            changed.insert(
                name.clone(),
                FieldChange {
                    old: old.clone(),
                    new: new.clone(),
                },
            );
        }
    }

    for (name, new) in after.iter() {
        if before.get(name).is_none() && !new.is_null() {
            changed.insert(
                name.clone(),
                FieldChange {
                    old: JsonValue::Null,
                    new: new.clone(),
                },
            );
        }
    }

    if changed.is_empty() {
        None
    } else {
        Some(AuditDiff::Changed(changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn identical_snapshots_produce_no_diff() {
        let a = FieldMap::new().with("code", "CEM-01").with("unit", "BAG");
        assert_eq!(diff_snapshots(&a, &a.clone()), None);
    }

    #[test]
    fn changed_field_carries_old_and_new() {
        let before = FieldMap::new().with("name", "Cement").with("unit", "BAG");
        let after = FieldMap::new().with("name", "Portland cement").with("unit", "BAG");

        let diff = diff_snapshots(&before, &after).unwrap();
        assert_eq!(
            diff.to_json(),
            json!({"changed": {"name": {"old": "Cement", "new": "Portland cement"}}})
        );
    }

    #[test]
    fn added_and_removed_fields_compare_against_null() {
        let before = FieldMap::new().with("supplier", "Acme");
        let after = FieldMap::new().with("invoice", "INV-7");

        let AuditDiff::Changed(changes) = diff_snapshots(&before, &after).unwrap() else {
            panic!("expected a changed diff");
        };
        assert_eq!(changes["supplier"].new, JsonValue::Null);
        assert_eq!(changes["invoice"].old, JsonValue::Null);
    }

    #[test]
    fn added_diff_serializes_under_added_key() {
        let diff = AuditDiff::Added(FieldMap::new().with("progress", 40));
        assert_eq!(diff.to_json(), json!({"added": {"progress": 40}}));
    }

    proptest! {
        /// Property: the diff names exactly the fields whose values differ.
        #[test]
        fn diff_names_exactly_the_differing_fields(
            values in prop::collection::vec((0i64..5, 0i64..5), 1..12)
        ) {
            let mut before = FieldMap::new();
            let mut after = FieldMap::new();
            for (idx, (a, b)) in values.iter().enumerate() {
                before.insert(&format!("f{idx}"), a);
                after.insert(&format!("f{idx}"), b);
            }

            let expected: Vec<String> = values
                .iter()
                .enumerate()
                .filter(|(_, (a, b))| a != b)
                .map(|(idx, _)| format!("f{idx}"))
                .collect();

            match diff_snapshots(&before, &after) {
                None => prop_assert!(expected.is_empty()),
                Some(AuditDiff::Changed(changes)) => {
                    let mut names: Vec<String> = changes.keys().cloned().collect();
                    names.sort();
                    let mut expected = expected.clone();
                    expected.sort();
                    prop_assert_eq!(names, expected);
                }
                Some(other) => prop_assert!(false, "unexpected diff {:?}", other),
            }
        }
    }
}
