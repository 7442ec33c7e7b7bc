//! keyword processing
//!
//! [process_keywords] rebuilds a document from its [JsonTree], children first, and lets the registered processors
//! rewrite every object carrying their keyword. A processor answers with a [Replacement]:
//!
//! - object replacement: the enclosing object (or its `level`-th ancestor) is replaced,
//! - keyword replacement: the keyword property is removed and the returned properties are merged into the object,
//! - unchanged: the object is kept as it is and takes no part in conflict detection.
//!
//! A replacement of an ancestor travels upwards as [Outcome::Pending] until the requested level is used up. Any
//! processor failure aborts the whole pass.
use crate::keyword::{Processors, Replacement};
use crate::path::Path;
use crate::tree::{JsonTree, Node, NodeType};
use serde_json::{Map, Value};

/// Result of processing a single node
#[derive(Debug, PartialEq)]
enum Outcome {
    Value(Value),
    /// `value` replaces the ancestor `level` steps above the current position
    Pending {
        level: usize,
        value: Value,
        origin: Path,
        requested: usize,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    #[error("{keyword} at {path} failed")]
    Keyword {
        path: Path,
        keyword: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("conflicting replacements at {path}: {}", .keywords.join(", "))]
    Conflict { path: Path, keywords: Vec<String> },
    #[error("replacement at level {level} was not possible at {path}")]
    LevelNotPossible { path: Path, level: usize },
}

/// Process all keywords of `tree` and return the resulting document
#[tracing::instrument(level = "debug", skip_all)]
pub fn process_keywords(tree: &JsonTree, processors: &Processors<'_>) -> Result<Value, ProcessError> {
    match process_child(tree.root(), processors)? {
        Outcome::Value(value) => Ok(value),
        Outcome::Pending {
            origin, requested, ..
        } => Err(ProcessError::LevelNotPossible {
            path: origin,
            level: requested,
        }),
    }
}

/// Process `node` and settle a pending replacement that targets its position
fn process_child(node: Node<'_>, processors: &Processors<'_>) -> Result<Outcome, ProcessError> {
    Ok(match process_node(node, processors)? {
        Outcome::Pending { level: 0, value, .. } => Outcome::Value(value),
        Outcome::Pending {
            level,
            value,
            origin,
            requested,
        } => Outcome::Pending {
            level: level - 1,
            value,
            origin,
            requested,
        },
        value => value,
    })
}

fn process_node(node: Node<'_>, processors: &Processors<'_>) -> Result<Outcome, ProcessError> {
    match node.node_type() {
        NodeType::Primitive => Ok(Outcome::Value(node.value().cloned().unwrap_or_default())),
        NodeType::Array => {
            let mut items = vec![];
            for item in node.items() {
                match process_child(item, processors)? {
                    Outcome::Value(value) => items.push(value),
                    pending => return Ok(pending),
                }
            }
            Ok(Outcome::Value(Value::Array(items)))
        }
        NodeType::Object => process_object(node, processors),
    }
}

fn process_object(node: Node<'_>, processors: &Processors<'_>) -> Result<Outcome, ProcessError> {
    let mut object = Map::new();
    for (key, child) in node.properties() {
        match process_child(child, processors)? {
            Outcome::Value(value) => {
                object.insert(key.to_string(), value);
            }
            pending => return Ok(pending),
        }
    }

    let mut replacements = vec![];
    for (keyword, _) in node.properties() {
        let Some(processor) = processors.get(keyword) else {
            continue;
        };

        let value = object.get(keyword).cloned().unwrap_or_default();
        let replacement = processor
            .process(keyword, node, &value)
            .map_err(|source| ProcessError::Keyword {
                path: node.path(),
                keyword: keyword.to_string(),
                source,
            })?;
        if replacement != Replacement::Unchanged {
            replacements.push((keyword, replacement));
        }
    }

    let objects = replacements
        .iter()
        .filter(|(_, replacement)| matches!(replacement, Replacement::Object { .. }))
        .count();
    if objects > 1 || (objects == 1 && replacements.len() > 1) {
        return Err(ProcessError::Conflict {
            path: node.path(),
            keywords: replacements
                .into_iter()
                .map(|(keyword, _)| keyword.to_string())
                .collect(),
        });
    }

    for (keyword, replacement) in replacements {
        match replacement {
            Replacement::Object { value, level: 0 } => return Ok(Outcome::Value(value)),
            Replacement::Object { value, level } => {
                let origin = node.path();
                tracing::trace!(%origin, level, "replacement pending");
                return Ok(Outcome::Pending {
                    level,
                    value,
                    origin,
                    requested: level,
                });
            }
            Replacement::Keyword(properties) => {
                object.shift_remove(keyword);
                object.extend(properties);
            }
            Replacement::Unchanged => {}
        }
    }

    Ok(Outcome::Value(Value::Object(object)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::keyword::processor;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn process(document: Value, processors: &Processors<'_>) -> Result<Value, ProcessError> {
        process_keywords(&JsonTree::parse(&document), processors)
    }

    fn replace_with(replacement: Replacement) -> Processors<'static> {
        let mut processors = Processors::new();
        processors.insert(
            "K".into(),
            processor(move |_: &str, _: Node<'_>, _: &Value| Ok(replacement.clone())),
        );
        processors
    }

    #[test]
    fn round_trip_without_keywords() {
        let document = json!({ "b": [1, { "c": null }], "a": "x", "K": { "nested": true } });
        assert_eq!(process(document.clone(), &Processors::new()).expect("processed"), document);
    }

    #[test]
    fn keyword_replacement() {
        let removed = process(json!({ "a": 1, "K": "value" }), &replace_with(Replacement::remove()));
        assert_eq!(removed.expect("processed"), json!({ "a": 1 }));

        let mut properties = Map::new();
        properties.insert("b".into(), json!(2));
        let merged = process(json!({ "a": 1, "K": "value" }), &replace_with(Replacement::keyword(properties)));
        assert_eq!(merged.expect("processed"), json!({ "a": 1, "b": 2 }));
    }

    #[test]
    fn processor_sees_processed_value() {
        let mut processors = Processors::new();
        processors.insert(
            "Inner".into(),
            processor(|_: &str, _: Node<'_>, value: &Value| Ok(Replacement::object(json!(format!("inner:{value}"))))),
        );
        processors.insert(
            "Outer".into(),
            processor(|_: &str, _: Node<'_>, value: &Value| Ok(Replacement::object(value["x"].clone()))),
        );

        let processed = process(json!({ "Outer": { "x": { "Inner": 1 } } }), &processors);
        assert_eq!(processed.expect("processed"), json!("inner:1"));
    }

    #[test]
    fn conflicting_replacements() {
        let mut processors = Processors::new();
        for keyword in ["A", "B"] {
            processors.insert(
                keyword.into(),
                processor(|_: &str, _: Node<'_>, _: &Value| Ok(Replacement::object(json!(null)))),
            );
        }

        let error = process(json!({ "x": { "A": 1, "B": 2 } }), &processors).expect_err("conflict");
        let ProcessError::Conflict { path, keywords } = error else {
            panic!("unexpected error {error}");
        };
        assert_eq!(path, Path::parse("x"));
        assert_eq!(keywords, vec!["A", "B"]);
    }

    #[test]
    fn object_and_keyword_replacement_conflict() {
        let mut processors = replace_with(Replacement::object(json!(1)));
        processors.insert(
            "L".into(),
            processor(|_: &str, _: Node<'_>, _: &Value| Ok(Replacement::remove())),
        );

        let error = process(json!({ "K": 1, "L": 2 }), &processors).expect_err("conflict");
        assert!(matches!(error, ProcessError::Conflict { .. }));
    }

    #[test]
    fn unchanged_keeps_object_and_order() {
        let mut processors = replace_with(Replacement::Unchanged);
        let kept = process(json!({ "K": "x", "a": 1 }), &processors).expect("processed");
        assert_eq!(
            kept.as_object().expect("object").keys().collect::<Vec<_>>(),
            vec!["K", "a"]
        );

        processors.insert(
            "L".into(),
            processor(|_: &str, _: Node<'_>, _: &Value| Ok(Replacement::object(json!("replaced")))),
        );
        let replaced = process(json!({ "K": "x", "L": 1 }), &processors);
        assert_eq!(replaced.expect("no conflict"), json!("replaced"));
    }

    #[test]
    fn levels() {
        let document = json!({ "x": { "y": { "K": true }, "z": 1 }, "w": 2 });

        let level0 = process(document.clone(), &replace_with(Replacement::leveled(json!("new"), 0)));
        assert_eq!(
            level0.expect("processed"),
            json!({ "x": { "y": "new", "z": 1 }, "w": 2 })
        );

        let level1 = process(document.clone(), &replace_with(Replacement::leveled(json!("new"), 1)));
        assert_eq!(level1.expect("processed"), json!({ "x": "new", "w": 2 }));

        let level2 = process(document.clone(), &replace_with(Replacement::leveled(json!("new"), 2)));
        assert_eq!(level2.expect("processed"), json!("new"));

        let error = process(document, &replace_with(Replacement::leveled(json!("new"), 3)))
            .expect_err("too deep");
        let ProcessError::LevelNotPossible { path, level } = error else {
            panic!("unexpected error {error}");
        };
        assert_eq!(path, Path::parse("x.y"));
        assert_eq!(level, 3);
    }

    #[test]
    fn levels_through_arrays() {
        let document = json!({ "list": [0, { "K": true }] });
        let processed = process(document, &replace_with(Replacement::leveled(json!([]), 1)));
        assert_eq!(processed.expect("processed"), json!({ "list": [] }));
    }

    #[test]
    fn processor_failure_is_located() {
        let mut processors = Processors::new();
        processors.insert(
            "K".into(),
            processor(|_: &str, _: Node<'_>, _: &Value| -> anyhow::Result<Replacement> {
                anyhow::bail!("broken")
            }),
        );

        let error = process(json!({ "a": [{ "K": 1 }] }), &processors).expect_err("fails");
        assert_eq!(error.to_string(), "K at a.0 failed");
    }
}
