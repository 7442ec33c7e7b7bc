//! `Parameter` keyword
//!
//! `{ Parameter: <name> }` refers to a declared template parameter and becomes `{ Ref: <name> }`.
use super::{BoxedProcessor, BoxedValidator, KeywordDefinition, KeywordParams, Replacement};
use crate::tree::Node;
use serde_json::{json, Value};

#[derive(Debug)]
pub struct ParameterKeyword {
    keyword: String,
}

impl Default for ParameterKeyword {
    fn default() -> Self {
        Self {
            keyword: "Parameter".to_string(),
        }
    }
}

impl KeywordDefinition for ParameterKeyword {
    fn keyword(&self) -> &str {
        &self.keyword
    }

    fn validator<'a>(&self, params: KeywordParams<'a>) -> anyhow::Result<BoxedValidator<'a>> {
        let declared = params.services.parameter_names();
        Ok(super::validator(
            move |_keyword: &str, _node: Node<'_>, value: &Value| -> Vec<anyhow::Error> {
                match value.as_str() {
                    None => vec![anyhow::anyhow!("parameter name must be a string, found {value}")],
                    Some(name) if !declared.iter().any(|declared| declared == name) => {
                        vec![anyhow::anyhow!("parameter {name} is not declared")]
                    }
                    Some(_) => vec![],
                }
            },
        ))
    }

    fn processor<'a>(&self, _params: KeywordParams<'a>) -> anyhow::Result<BoxedProcessor<'a>> {
        Ok(super::processor(
            |_keyword: &str, _node: Node<'_>, value: &Value| -> anyhow::Result<Replacement> {
                let Some(name) = value.as_str() else {
                    anyhow::bail!("parameter name must be a string, found {value}");
                };
                Ok(Replacement::object(json!({ "Ref": name })))
            },
        ))
    }
}
