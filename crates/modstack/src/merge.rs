//! structural merge with per-path rules
//!
//! [merge] deep-merges a source value into a target value. By default objects are merged key by key and every other
//! value is replaced. [MergeRules] override that behaviour at specific paths:
//!
//! | rule      | effect                                                                   |
//! |-----------|--------------------------------------------------------------------------|
//! | `REPLACE` | target becomes the source                                                |
//! | `COMBINE` | objects merged key-wise, arrays merged index-wise, anything else replaced |
//! | `APPEND`  | source items are added after the target items                            |
//! | `PREPEND` | source items are added before the target items                           |
//!
//! Arrays are replaced as a whole unless a rule addresses one of their items (`Tags.0`); then they are merged index
//! by index so the rule can apply.
//!
//! The merge reports every change it made as a [MergeChange] so callers can keep track of where values came from.
use crate::path::Path;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MergeOperation {
    Replace,
    Combine,
    Append,
    Prepend,
}

/// Ordered mapping from path to [MergeOperation]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeRules(Vec<(Path, MergeOperation)>);

impl MergeRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<Path>, operation: MergeOperation) -> Self {
        self.0.push((path.into(), operation));
        self
    }

    /// The first rule registered for `path`
    pub fn get(&self, path: &Path) -> Option<MergeOperation> {
        self.0
            .iter()
            .find(|(rule_path, _)| rule_path.matches(path))
            .map(|(_, operation)| *operation)
    }

    /// Whether a rule is registered strictly below `path`
    pub fn has_rules_below(&self, path: &Path) -> bool {
        self.0.iter().any(|(rule_path, _)| {
            rule_path.len() > path.len()
                && rule_path
                    .segments()
                    .iter()
                    .zip(path.segments())
                    .all(|(rule_key, key)| rule_key.matches(key))
        })
    }
}

impl<'de> Deserialize<'de> for MergeRules {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rules = IndexMap::<String, MergeOperation>::deserialize(deserializer)?;
        Ok(Self(
            rules
                .into_iter()
                .map(|(path, operation)| (Path::parse(&path), operation))
                .collect(),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Replace,
    Combine,
    Append { count: usize },
    Prepend { count: usize },
}

/// A single modification done by [merge]
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct MergeChange {
    pub path: Path,
    pub kind: ChangeKind,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum MergeError {
    #[error("{operation:?} at {path} requires arrays on both sides")]
    NotAnArray {
        path: Path,
        operation: MergeOperation,
    },
}

/// Merge `source` into `target`
///
/// Returns the list of changes in the order they were applied. Values equal to what the target already held are
/// still reported: whoever supplied a value last owns it.
pub fn merge(
    target: &mut Value,
    source: &Value,
    rules: &MergeRules,
) -> Result<Vec<MergeChange>, MergeError> {
    let mut merger = Merger {
        rules,
        changes: vec![],
    };
    merger.merge_at(target, source, &Path::root())?;
    Ok(merger.changes)
}

struct Merger<'r> {
    rules: &'r MergeRules,
    changes: Vec<MergeChange>,
}

impl Merger<'_> {
    fn merge_at(&mut self, target: &mut Value, source: &Value, path: &Path) -> Result<(), MergeError> {
        match self.rules.get(path) {
            Some(MergeOperation::Replace) => {
                *target = source.clone();
                self.record(path, ChangeKind::Replace);
            }
            Some(MergeOperation::Combine) => {
                combine(target, source);
                self.record(path, ChangeKind::Combine);
            }
            Some(operation @ (MergeOperation::Append | MergeOperation::Prepend)) => {
                let (Some(added), true) = (source.as_array(), target.is_array() || target.is_null())
                else {
                    return Err(MergeError::NotAnArray {
                        path: path.clone(),
                        operation,
                    });
                };

                let mut items = match std::mem::take(target) {
                    Value::Array(items) => items,
                    _ => vec![],
                };

                let count = added.len();
                let kind = if operation == MergeOperation::Append {
                    items.extend(added.iter().cloned());
                    ChangeKind::Append { count }
                } else {
                    items.splice(0..0, added.iter().cloned());
                    ChangeKind::Prepend { count }
                };

                *target = Value::Array(items);
                self.record(path, kind);
            }
            None => match (target, source) {
                (Value::Object(target_map), Value::Object(source_map)) => {
                    for (key, source_value) in source_map {
                        let target_value = target_map.entry(key.clone()).or_insert(Value::Null);
                        self.merge_at(target_value, source_value, &path.child(key.as_str()))?;
                    }
                }
                (Value::Array(target_items), Value::Array(source_items))
                    if self.rules.has_rules_below(path) =>
                {
                    for (index, source_value) in source_items.iter().enumerate() {
                        if target_items.len() <= index {
                            target_items.push(Value::Null);
                        }
                        self.merge_at(&mut target_items[index], source_value, &path.child(index))?;
                    }
                }
                (target, source) => {
                    *target = source.clone();
                    self.record(path, ChangeKind::Replace);
                }
            },
        }

        Ok(())
    }

    fn record(&mut self, path: &Path, kind: ChangeKind) {
        tracing::trace!(%path, ?kind, "merge change");
        self.changes.push(MergeChange::new(path.clone(), kind));
    }
}

fn combine(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(key) {
                    Some(target_value) => combine(target_value, source_value),
                    None => {
                        target_map.insert(key.clone(), source_value.clone());
                    }
                }
            }
        }
        (Value::Array(target_items), Value::Array(source_items)) => {
            for (index, source_value) in source_items.iter().enumerate() {
                match target_items.get_mut(index) {
                    Some(target_value) => combine(target_value, source_value),
                    None => target_items.push(source_value.clone()),
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rules(path: &str, operation: MergeOperation) -> MergeRules {
        MergeRules::new().with(Path::parse(path), operation)
    }

    #[test]
    fn default_merge_is_deep_for_objects() {
        let mut target = json!({ "a": { "b": 1, "c": [1, 2] }, "d": true });
        let changes = merge(
            &mut target,
            &json!({ "a": { "c": [3], "e": "new" } }),
            &MergeRules::new(),
        )
        .expect("merge");

        assert_eq!(target, json!({ "a": { "b": 1, "c": [3], "e": "new" }, "d": true }));
        assert_eq!(
            changes,
            vec![
                MergeChange::new(Path::parse("a.c"), ChangeKind::Replace),
                MergeChange::new(Path::parse("a.e"), ChangeKind::Replace),
            ]
        );
    }

    #[test]
    fn equal_values_are_still_reported() {
        let mut target = json!({ "a": 1 });
        let changes = merge(&mut target, &json!({ "a": 1 }), &MergeRules::new()).expect("merge");
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn append_and_prepend() {
        let mut target = json!({ "list": [1, 2] });
        let changes = merge(
            &mut target,
            &json!({ "list": [3] }),
            &rules("list", MergeOperation::Append),
        )
        .expect("merge");
        assert_eq!(target, json!({ "list": [1, 2, 3] }));
        assert_eq!(changes[0].kind, ChangeKind::Append { count: 1 });

        let changes = merge(
            &mut target,
            &json!({ "list": [-1, 0] }),
            &rules("list", MergeOperation::Prepend),
        )
        .expect("merge");
        assert_eq!(target, json!({ "list": [-1, 0, 1, 2, 3] }));
        assert_eq!(changes[0].kind, ChangeKind::Prepend { count: 2 });
    }

    #[test]
    fn append_to_missing_array() {
        let mut target = json!({});
        merge(
            &mut target,
            &json!({ "list": ["x"] }),
            &rules("list", MergeOperation::Append),
        )
        .expect("merge");
        assert_eq!(target, json!({ "list": ["x"] }));
    }

    #[test]
    fn append_requires_arrays() {
        let mut target = json!({ "list": "scalar" });
        let error = merge(
            &mut target,
            &json!({ "list": [1] }),
            &rules("list", MergeOperation::Append),
        )
        .expect_err("must fail");
        assert_eq!(
            error,
            MergeError::NotAnArray {
                path: Path::parse("list"),
                operation: MergeOperation::Append
            }
        );
    }

    #[test]
    fn replace_and_combine() {
        let mut target = json!({ "obj": { "a": 1, "b": 2 }, "list": [{ "x": 1 }, 2] });
        merge(
            &mut target,
            &json!({ "obj": { "c": 3 } }),
            &rules("obj", MergeOperation::Replace),
        )
        .expect("merge");
        assert_eq!(target["obj"], json!({ "c": 3 }));

        let changes = merge(
            &mut target,
            &json!({ "list": [{ "y": 2 }, 5, 6] }),
            &rules("list", MergeOperation::Combine),
        )
        .expect("merge");
        assert_eq!(target["list"], json!([{ "x": 1, "y": 2 }, 5, 6]));
        assert_eq!(
            changes,
            vec![MergeChange::new(Path::parse("list"), ChangeKind::Combine)]
        );
    }

    #[test]
    fn rules_reach_into_arrays() {
        let mut target = json!({ "Tags": [{ "a": 1 }, { "b": 2 }] });
        let changes = merge(
            &mut target,
            &json!({ "Tags": [{ "c": 3 }] }),
            &rules("Tags.0", MergeOperation::Combine),
        )
        .expect("merge");

        assert_eq!(target, json!({ "Tags": [{ "a": 1, "c": 3 }, { "b": 2 }] }));
        assert_eq!(
            changes,
            vec![MergeChange::new(Path::parse("Tags.0"), ChangeKind::Combine)]
        );

        let changes = merge(
            &mut target,
            &json!({ "Tags": [{ "x": 1 }, { "y": [1] }, "new"] }),
            &rules("Tags.1.y", MergeOperation::Append),
        )
        .expect("merge");
        assert_eq!(
            target,
            json!({ "Tags": [{ "a": 1, "c": 3, "x": 1 }, { "b": 2, "y": [1] }, "new"] })
        );
        assert_eq!(
            changes,
            vec![
                MergeChange::new(Path::parse("Tags.0.x"), ChangeKind::Replace),
                MergeChange::new(Path::parse("Tags.1.y"), ChangeKind::Append { count: 1 }),
                MergeChange::new(Path::parse("Tags.2"), ChangeKind::Replace),
            ]
        );
    }

    #[test]
    fn arrays_without_rules_below_are_replaced() {
        let mut target = json!({ "Tags": [1, 2], "Other": [{ "a": 1 }] });
        merge(
            &mut target,
            &json!({ "Tags": [3], "Other": [{ "b": 2 }] }),
            &rules("Other.0", MergeOperation::Combine),
        )
        .expect("merge");
        assert_eq!(target, json!({ "Tags": [3], "Other": [{ "a": 1, "b": 2 }] }));
    }

    #[test]
    fn rules_deserialize_from_upper_case() {
        let rules: MergeRules =
            serde_json::from_value(json!({ "Layers": "APPEND", "Tags.0": "REPLACE" }))
                .expect("valid rules");
        assert_eq!(rules.get(&Path::parse("Layers")), Some(MergeOperation::Append));
        assert_eq!(rules.get(&Path::parse("Tags.0")), Some(MergeOperation::Replace));
        assert_eq!(rules.get(&Path::parse("Tags")), None);
    }
}
