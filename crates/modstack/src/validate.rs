//! keyword validation
//!
//! [validate_keywords] runs every registered validator on every object that carries its keyword and collects all
//! errors. Nothing aborts the walk, so a single pass reports every problem of a document.
use crate::keyword::Validators;
use crate::path::Path;
use crate::tree::{JsonTree, Node, NodeId, NodeType};
use std::fmt::{Display, Formatter};

/// A validation error and where it was found
#[derive(Debug, derive_new::new)]
pub struct LocatedError {
    /// the object carrying the keyword
    pub node: NodeId,
    pub path: Path,
    pub keyword: String,
    pub error: anyhow::Error,
}

impl Display for LocatedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}: {:#}", self.keyword, self.path, self.error)
    }
}

/// Validate all keyword occurrences, children before their parents
#[tracing::instrument(level = "debug", skip_all)]
pub fn validate_keywords(tree: &JsonTree, validators: &Validators<'_>) -> Vec<LocatedError> {
    let mut errors = vec![];
    validate_node(tree.root(), validators, &mut errors);
    tracing::debug!(errors = errors.len(), "keywords validated");
    errors
}

fn validate_node(node: Node<'_>, validators: &Validators<'_>, errors: &mut Vec<LocatedError>) {
    match node.node_type() {
        NodeType::Primitive => {}
        NodeType::Array => {
            for item in node.items() {
                validate_node(item, validators, errors);
            }
        }
        NodeType::Object => {
            for (_, child) in node.properties() {
                validate_node(child, validators, errors);
            }

            for (keyword, child) in node.properties() {
                let Some(validator) = validators.get(keyword) else {
                    continue;
                };

                let value = child.to_json();
                let path = node.path();
                errors.extend(
                    validator
                        .validate(keyword, node, &value)
                        .into_iter()
                        .map(|error| LocatedError::new(node.id(), path.clone(), keyword.to_string(), error)),
                );
            }
        }
    }
}
