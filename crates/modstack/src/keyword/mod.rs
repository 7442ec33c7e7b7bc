//! keyword definitions
//!
//! A keyword is a reserved property name. Any object containing it is handed to the keyword's validator and
//! processor instead of being treated as plain data. Keywords form an open set: anything implementing
//! [KeywordDefinition] can be registered with a [crate::project::Project].
mod function;
mod parameter;
mod reference;

pub use function::{artifact_key, FunctionKeyword};
pub use parameter::ParameterKeyword;
pub use reference::{logical_id, ReferenceKeyword};

use crate::extend::MergedResource;
use crate::function::{FinalFunctionResource, FunctionError, FunctionSchema};
use crate::tree::Node;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// What a processor wants done with the object containing its keyword
#[derive(Debug, Clone, PartialEq)]
pub enum Replacement {
    /// Replace the enclosing object, or its `level`-th ancestor, with `value`
    Object { value: Value, level: usize },
    /// Remove the keyword property and merge these properties into the enclosing object
    Keyword(Map<String, Value>),
    /// Leave the enclosing object as it is
    Unchanged,
}

impl Replacement {
    pub fn object(value: Value) -> Self {
        Self::Object { value, level: 0 }
    }

    pub fn leveled(value: Value, level: usize) -> Self {
        Self::Object { value, level }
    }

    pub fn keyword(properties: Map<String, Value>) -> Self {
        Self::Keyword(properties)
    }

    /// Remove the keyword property and nothing else
    pub fn remove() -> Self {
        Self::Keyword(Map::new())
    }
}

/// Checks a single keyword occurrence
pub trait Validate {
    fn validate(&self, keyword: &str, node: Node<'_>, value: &Value) -> Vec<anyhow::Error>;
}

// blanket impl for Fn
impl<F> Validate for F
where
    F: Fn(&str, Node<'_>, &Value) -> Vec<anyhow::Error>,
{
    fn validate(&self, keyword: &str, node: Node<'_>, value: &Value) -> Vec<anyhow::Error> {
        self(keyword, node, value)
    }
}

/// Computes the replacement for a single keyword occurrence
pub trait Process {
    fn process(&self, keyword: &str, node: Node<'_>, value: &Value) -> anyhow::Result<Replacement>;
}

// blanket impl for Fn
impl<F> Process for F
where
    F: Fn(&str, Node<'_>, &Value) -> anyhow::Result<Replacement>,
{
    fn process(&self, keyword: &str, node: Node<'_>, value: &Value) -> anyhow::Result<Replacement> {
        self(keyword, node, value)
    }
}

pub type BoxedValidator<'a> = Box<dyn Validate + 'a>;
pub type BoxedProcessor<'a> = Box<dyn Process + 'a>;
pub type Validators<'a> = IndexMap<String, BoxedValidator<'a>>;
pub type Processors<'a> = IndexMap<String, BoxedProcessor<'a>>;

/// Box a validator closure
pub fn validator<'a, F>(validate: F) -> BoxedValidator<'a>
where
    F: Fn(&str, Node<'_>, &Value) -> Vec<anyhow::Error> + 'a,
{
    Box::new(validate)
}

/// Box a processor closure
pub fn processor<'a, F>(process: F) -> BoxedProcessor<'a>
where
    F: Fn(&str, Node<'_>, &Value) -> anyhow::Result<Replacement> + 'a,
{
    Box::new(process)
}

/// Lookups a keyword may need while validating or processing a module
pub trait Services {
    /// Merged resource (with provenance) of any resource of any module
    fn get_resource(&self, module: &str, resource: &str) -> Option<Arc<MergedResource>>;

    /// Stable short identifier of a module
    fn get_module_hash(&self, module: &str) -> String;

    /// All declared parameter names
    fn parameter_names(&self) -> Vec<String>;

    /// Final function resource of a function resource
    fn get_function(
        &self,
        module: &str,
        resource: &str,
    ) -> Result<Arc<FinalFunctionResource>, FunctionError>;
}

/// Context handed to keyword factories
#[derive(derive_new::new, Clone, Copy)]
pub struct KeywordParams<'a> {
    pub root_dir: &'a std::path::Path,
    /// module the document belongs to
    pub module: &'a str,
    pub services: &'a dyn Services,
}

/// A pluggable keyword
pub trait KeywordDefinition {
    fn keyword(&self) -> &str;

    fn validator<'a>(&self, params: KeywordParams<'a>) -> anyhow::Result<BoxedValidator<'a>>;

    fn processor<'a>(&self, params: KeywordParams<'a>) -> anyhow::Result<BoxedProcessor<'a>>;
}

/// The keywords every project understands
pub fn builtin(schema: &FunctionSchema) -> Vec<Box<dyn KeywordDefinition>> {
    vec![
        Box::new(ReferenceKeyword::new(schema.reference_keyword.clone())),
        Box::new(ParameterKeyword::default()),
        Box::new(FunctionKeyword::new(schema.clone())),
    ]
}

/// Read `{ module?, resource }`, the shape shared by references and middleware entries
pub(crate) fn resource_address(value: &Value) -> anyhow::Result<(Option<&str>, &str)> {
    let Some(object) = value.as_object() else {
        anyhow::bail!("expected an object with a resource name, found {value}");
    };

    let Some(resource) = object.get("resource").and_then(Value::as_str) else {
        anyhow::bail!("resource name missing");
    };

    let module = match object.get("module") {
        None => None,
        Some(Value::String(module)) => Some(module.as_str()),
        Some(other) => anyhow::bail!("module name must be a string, found {other}"),
    };

    Ok((module, resource))
}
