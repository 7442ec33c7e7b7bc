//! `Function` keyword
//!
//! Marks the code property of a function resource:
//!
//! ```yaml
//! CodeUri:
//!   Function:
//!     name: my-function
//!     middlewares:
//!       - resource: auth
//! ```
//!
//! Processing replaces the code object with the artifact key of the code that ends up backing the function, which
//! may live in a different module than the resource after extension.
use super::{
    resource_address, BoxedProcessor, BoxedValidator, KeywordDefinition, KeywordParams, Process,
    Replacement, Validate,
};
use crate::function::{CodeIdentity, FunctionSchema};
use crate::path::PathKey;
use crate::tree::Node;
use serde_json::Value;

#[derive(derive_new::new, Debug)]
pub struct FunctionKeyword {
    schema: FunctionSchema,
}

impl KeywordDefinition for FunctionKeyword {
    fn keyword(&self) -> &str {
        &self.schema.function_keyword
    }

    fn validator<'a>(&self, params: KeywordParams<'a>) -> anyhow::Result<BoxedValidator<'a>> {
        Ok(Box::new(FunctionCode::new(self.schema.clone(), params)))
    }

    fn processor<'a>(&self, params: KeywordParams<'a>) -> anyhow::Result<BoxedProcessor<'a>> {
        Ok(Box::new(FunctionCode::new(self.schema.clone(), params)))
    }
}

#[derive(derive_new::new)]
struct FunctionCode<'a> {
    schema: FunctionSchema,
    params: KeywordParams<'a>,
}

impl FunctionCode<'_> {
    /// Name of the resource whose code property holds `node`
    fn owning_resource(&self, node: Node<'_>) -> anyhow::Result<String> {
        let path = node.path();
        match path.segments() {
            [PathKey::Key(resources), PathKey::Key(resource), PathKey::Key(properties), PathKey::Key(code)]
                if resources == "Resources"
                    && properties == "Properties"
                    && *code == self.schema.code_property =>
            {
                Ok(resource.clone())
            }
            _ => anyhow::bail!(
                "{} may only be used in the {} property of a resource",
                self.schema.function_keyword,
                self.schema.code_property
            ),
        }
    }
}

/// Artifact key of a function's (or middleware's) code
pub fn artifact_key(hash: &str, code: &CodeIdentity) -> String {
    format!("functions/{hash}/{}", code.name)
}

impl Validate for FunctionCode<'_> {
    fn validate(&self, _keyword: &str, node: Node<'_>, value: &Value) -> Vec<anyhow::Error> {
        let mut errors = vec![];

        if let Err(error) = self.owning_resource(node) {
            errors.push(error);
        }

        if value.get("name").and_then(Value::as_str).is_none() {
            errors.push(anyhow::anyhow!("function name missing"));
        }

        match value.get(&self.schema.middlewares_field) {
            None => {}
            Some(Value::Array(middlewares)) => {
                for (index, middleware) in middlewares.iter().enumerate() {
                    if let Err(error) = resource_address(middleware) {
                        errors.push(error.context(format!("invalid middleware #{index}")));
                    }
                }
            }
            Some(other) => errors.push(anyhow::anyhow!(
                "{} must be a list, found {other}",
                self.schema.middlewares_field
            )),
        }

        errors
    }
}

impl Process for FunctionCode<'_> {
    fn process(&self, _keyword: &str, node: Node<'_>, _value: &Value) -> anyhow::Result<Replacement> {
        let resource = self.owning_resource(node)?;
        let function = self
            .params
            .services
            .get_function(self.params.module, &resource)?;

        let code = &function.code.function;
        let hash = self.params.services.get_module_hash(&code.module);
        Ok(Replacement::object(Value::String(artifact_key(&hash, code))))
    }
}
