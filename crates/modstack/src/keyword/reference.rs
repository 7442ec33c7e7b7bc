//! `Ref` keyword
//!
//! `{ Ref: { module?, resource } }` points at a resource of any module. Processing replaces the object with the
//! template-level reference `{ Ref: <module hash><resource> }` of the family root the resource belongs to.
//! A plain string value (`{ Ref: AWS::Region }`) is left untouched.
use super::{
    resource_address, BoxedProcessor, BoxedValidator, KeywordDefinition, KeywordParams, Process,
    Replacement, Services, Validate,
};
use crate::tree::Node;
use serde_json::{json, Value};

#[derive(derive_new::new, Debug)]
pub struct ReferenceKeyword {
    keyword: String,
}

impl KeywordDefinition for ReferenceKeyword {
    fn keyword(&self) -> &str {
        &self.keyword
    }

    fn validator<'a>(&self, params: KeywordParams<'a>) -> anyhow::Result<BoxedValidator<'a>> {
        Ok(Box::new(ReferenceResolver::new(params)))
    }

    fn processor<'a>(&self, params: KeywordParams<'a>) -> anyhow::Result<BoxedProcessor<'a>> {
        Ok(Box::new(ReferenceResolver::new(params)))
    }
}

#[derive(derive_new::new)]
struct ReferenceResolver<'a> {
    params: KeywordParams<'a>,
}

impl ReferenceResolver<'_> {
    /// Logical id of the referenced resource
    fn logical_id(&self, value: &Value) -> anyhow::Result<String> {
        let (module, resource) = resource_address(value)?;
        let module = module.unwrap_or(self.params.module);

        let Some(merged) = self.params.services.get_resource(module, resource) else {
            anyhow::bail!("referenced resource {module}.{resource} does not exist");
        };

        Ok(logical_id(self.params.services, &merged.root.module, &merged.root.resource))
    }
}

/// Template-level name of a resource
pub fn logical_id(services: &dyn Services, module: &str, resource: &str) -> String {
    format!("{}{}", services.get_module_hash(module), resource)
}

impl Validate for ReferenceResolver<'_> {
    fn validate(&self, _keyword: &str, _node: Node<'_>, value: &Value) -> Vec<anyhow::Error> {
        if value.is_string() {
            return vec![];
        }

        match self.logical_id(value) {
            Ok(_) => vec![],
            Err(error) => vec![error],
        }
    }
}

impl Process for ReferenceResolver<'_> {
    fn process(&self, keyword: &str, _node: Node<'_>, value: &Value) -> anyhow::Result<Replacement> {
        if value.is_string() {
            return Ok(Replacement::Unchanged);
        }

        let id = self.logical_id(value)?;
        tracing::trace!(%id, "reference resolved");
        Ok(Replacement::object(json!({ keyword: id })))
    }
}
