//! Function composition
//!
//! A function resource is composed from several sources:
//!
//! 1. the function resource itself,
//! 2. everything its extenders merged into it (see [crate::extend]),
//! 3. middlewares and layers injected by [Extension]s,
//! 4. the properties of each middleware it uses (middlewares are resources too and may be extended themselves).
//!
//! The result is a [FinalFunctionResource]: the composed resource plus the identity of the code that backs it.
//! Functions can not be extended by other functions directly; they are only extended through layers and
//! middlewares, or by resources extending them.
use crate::extend::{ExtendResolver, ResourceId};
use crate::merge::{merge, MergeError, MergeOperation, MergeRules};
use crate::path::Path;
use crate::source_map::{get_resource_property_source, PropertySource};
use crate::util::qualify_references;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

/// Structural names the composition needs to know about
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FunctionSchema {
    /// resource types treated as functions
    pub function_types: Vec<String>,
    pub middleware_type: String,
    /// property holding the code keyword
    pub code_property: String,
    pub function_keyword: String,
    pub middleware_keyword: String,
    /// list of middlewares inside the function keyword
    pub middlewares_field: String,
    pub layers_property: String,
    pub reference_keyword: String,
}

impl Default for FunctionSchema {
    fn default() -> Self {
        Self {
            function_types: vec!["AWS::Serverless::Function".to_string()],
            middleware_type: "Middleware".to_string(),
            code_property: "CodeUri".to_string(),
            function_keyword: "Function".to_string(),
            middleware_keyword: "Middleware".to_string(),
            middlewares_field: "middlewares".to_string(),
            layers_property: "Layers".to_string(),
            reference_keyword: "Ref".to_string(),
        }
    }
}

impl FunctionSchema {
    pub fn function_code_path(&self) -> Path {
        Path::root()
            .child(self.code_property.as_str())
            .child(self.function_keyword.as_str())
    }

    pub fn middleware_code_path(&self) -> Path {
        Path::root()
            .child(self.code_property.as_str())
            .child(self.middleware_keyword.as_str())
    }

    pub fn middlewares_path(&self) -> Path {
        self.function_code_path()
            .child(self.middlewares_field.as_str())
    }

    pub fn layers_path(&self) -> Path {
        Path::root().child(self.layers_property.as_str())
    }

    pub fn is_function_type(&self, resource_type: &str) -> bool {
        self.function_types.iter().any(|known| known == resource_type)
    }
}

/// Middlewares and layers a module injects into every (matching) function
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, derive_new::new)]
pub struct Extension {
    pub module: String,
    #[serde(default)]
    pub middlewares: Vec<Contribution>,
    #[serde(default)]
    pub layers: Vec<Contribution>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, derive_new::new)]
pub struct Contribution {
    pub resource: String,
    /// function types this applies to, all when absent
    #[serde(default)]
    pub types: Option<Vec<String>>,
}

impl Contribution {
    pub fn applies_to(&self, function_type: &str) -> bool {
        self.types
            .as_ref()
            .map_or(true, |types| types.iter().any(|allowed| allowed == function_type))
    }
}

/// Module and name of a piece of code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_new::new)]
pub struct CodeIdentity {
    pub module: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionCode {
    pub function: CodeIdentity,
    pub middlewares: Vec<CodeIdentity>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct FinalFunctionResource {
    pub code: FunctionCode,
    pub resource: Value,
}

/// Composes and caches [FinalFunctionResource]s
#[derive(Debug)]
pub struct FunctionResolver {
    schema: FunctionSchema,
    extensions: Vec<Extension>,
    cache: RefCell<HashMap<ResourceId, Arc<FinalFunctionResource>>>,
    compositions: Cell<usize>,
}

impl FunctionResolver {
    pub fn new(schema: FunctionSchema, extensions: Vec<Extension>) -> Self {
        Self {
            schema,
            extensions,
            cache: Default::default(),
            compositions: Cell::new(0),
        }
    }

    pub fn schema(&self) -> &FunctionSchema {
        &self.schema
    }

    /// Number of functions composed so far (cache hits excluded)
    pub fn compositions(&self) -> usize {
        self.compositions.get()
    }

    /// Composed function resource, computed once per function
    pub fn get_final_function_resource(
        &self,
        context: &ExtendResolver,
        id: &ResourceId,
    ) -> Result<Arc<FinalFunctionResource>, FunctionError> {
        if let Some(cached) = self.cache.borrow().get(id) {
            return Ok(cached.clone());
        }

        let composed = Arc::new(self.compose(context, id)?);
        self.compositions.set(self.compositions.get() + 1);
        self.cache.borrow_mut().insert(id.clone(), composed.clone());
        Ok(composed)
    }

    #[tracing::instrument(level = "debug", skip(self, context), fields(function = %id))]
    fn compose(
        &self,
        context: &ExtendResolver,
        id: &ResourceId,
    ) -> Result<FinalFunctionResource, FunctionError> {
        let schema = &self.schema;
        let raw = context
            .documents()
            .resource(id)
            .ok_or_else(|| FunctionError::NotFound(id.clone()))?;

        let function_type = raw.get("Type").and_then(Value::as_str).unwrap_or_default();
        if !schema.is_function_type(function_type) {
            return Err(FunctionError::NotAFunction {
                resource: id.clone(),
                resource_type: function_type.to_string(),
            });
        }

        if raw.get("Extend").is_some() {
            return Err(FunctionError::ExtendedFunction(id.clone()));
        }

        let code_keyword_path = Path::root().child("Properties").child(schema.code_property.as_str());
        let has_code_keyword = code_keyword_path
            .lookup(raw)
            .is_some_and(|code| code.get(&schema.function_keyword).is_some());
        if !has_code_keyword {
            return Err(FunctionError::MissingCodeKeyword {
                resource: id.clone(),
                keyword: schema.function_keyword.clone(),
            });
        }

        let merged = context
            .get(id)
            .ok_or_else(|| FunctionError::NotFound(id.clone()))?;
        let mut properties = merged
            .properties()
            .cloned()
            .unwrap_or_else(|| json!({}));
        let mut source_map = merged.source_map.clone();

        let function = code_identity(&properties, &source_map, &schema.function_code_path())
            .ok_or_else(|| FunctionError::MissingCodeName(id.clone()))?;

        self.inject_extensions(function_type, &mut properties, &mut source_map, id)?;
        qualify_references(&mut properties, &source_map, schema);
        dedup_at(&mut properties, &schema.middlewares_path());

        let layer_rules = MergeRules::new().with(schema.layers_path(), MergeOperation::Append);
        let mut middlewares = vec![];
        for (index, address) in middleware_addresses(&properties, schema).into_iter().enumerate() {
            let Some(middleware_id) = address else {
                return Err(FunctionError::InvalidMiddlewareReference {
                    resource: id.clone(),
                    index,
                });
            };

            let (code, middleware_properties) = self.middleware(context, id, &middleware_id)?;
            merge(&mut properties, &middleware_properties, &layer_rules).map_err(|source| {
                FunctionError::Merge {
                    resource: middleware_id.clone(),
                    source,
                }
            })?;
            middlewares.push(code);
        }

        dedup_at(&mut properties, &schema.layers_path());

        let mut resource = merged.resource.clone();
        if let Some(object) = resource.as_object_mut() {
            object.insert("Properties".to_string(), properties);
        }

        tracing::debug!(
            function = %function.name,
            middlewares = middlewares.len(),
            "function composed"
        );

        Ok(FinalFunctionResource {
            code: FunctionCode {
                function,
                middlewares,
            },
            resource,
        })
    }

    /// Merge the middlewares and layers of every extension that applies to `function_type`
    fn inject_extensions(
        &self,
        function_type: &str,
        properties: &mut Value,
        source_map: &mut PropertySource,
        id: &ResourceId,
    ) -> Result<(), FunctionError> {
        let schema = &self.schema;
        let rules = MergeRules::new()
            .with(schema.middlewares_path(), MergeOperation::Append)
            .with(schema.layers_path(), MergeOperation::Append);

        for extension in &self.extensions {
            let middlewares = extension
                .middlewares
                .iter()
                .filter(|contribution| contribution.applies_to(function_type))
                .map(|contribution| {
                    let middleware = json!({ "module": extension.module, "resource": contribution.resource });
                    let injected = json!({
                        schema.code_property.as_str(): {
                            schema.function_keyword.as_str(): { schema.middlewares_field.as_str(): [middleware] }
                        }
                    });
                    (contribution, injected)
                });

            let layers = extension
                .layers
                .iter()
                .filter(|contribution| contribution.applies_to(function_type))
                .map(|contribution| {
                    let reference = json!({
                        schema.reference_keyword.as_str(): { "module": extension.module, "resource": contribution.resource }
                    });
                    (contribution, json!({ schema.layers_property.as_str(): [reference] }))
                });

            for (contribution, injected) in middlewares.chain(layers) {
                let contributor = ResourceId::new(extension.module.clone(), contribution.resource.clone());
                tracing::trace!(%contributor, function = %id, "inject extension");
                let changes = merge(properties, &injected, &rules).map_err(|source| {
                    FunctionError::Merge {
                        resource: id.clone(),
                        source,
                    }
                })?;
                for change in &changes {
                    source_map.apply(change, &contributor, properties);
                }
            }
        }

        Ok(())
    }

    /// Code identity and mergeable properties of a middleware
    fn middleware(
        &self,
        context: &ExtendResolver,
        function: &ResourceId,
        id: &ResourceId,
    ) -> Result<(CodeIdentity, Value), FunctionError> {
        let schema = &self.schema;
        let not_found = || FunctionError::MiddlewareNotFound {
            resource: function.clone(),
            middleware: id.clone(),
        };

        let raw = context.documents().resource(id).ok_or_else(not_found)?;
        let middleware_type = raw.get("Type").and_then(Value::as_str).unwrap_or_default();
        if middleware_type != schema.middleware_type {
            return Err(FunctionError::NotAMiddleware {
                resource: id.clone(),
                resource_type: middleware_type.to_string(),
            });
        }

        let has_code_keyword = Path::root()
            .child("Properties")
            .child(schema.code_property.as_str())
            .lookup(raw)
            .is_some_and(|code| code.get(&schema.middleware_keyword).is_some());
        if !has_code_keyword {
            return Err(FunctionError::MissingCodeKeyword {
                resource: id.clone(),
                keyword: schema.middleware_keyword.clone(),
            });
        }

        let merged = context.get(id).ok_or_else(not_found)?;
        let mut properties = merged
            .properties()
            .cloned()
            .unwrap_or_else(|| json!({}));

        let code = code_identity(&properties, &merged.source_map, &schema.middleware_code_path())
            .ok_or_else(|| FunctionError::MissingCodeName(id.clone()))?;

        qualify_references(&mut properties, &merged.source_map, schema);
        if let Some(object) = properties.as_object_mut() {
            object.shift_remove(&schema.code_property);
        }

        Ok((code, properties))
    }
}

/// `{ name }` below the code keyword, owned by whoever supplied the name
fn code_identity(properties: &Value, source_map: &PropertySource, code_path: &Path) -> Option<CodeIdentity> {
    let name_path = code_path.child("name");
    let name = name_path.lookup(properties)?.as_str()?;
    let source = get_resource_property_source(&name_path, source_map);
    Some(CodeIdentity::new(source.module, name.to_string()))
}

/// Qualified middleware entries, `None` for entries that are not a resource address
fn middleware_addresses(properties: &Value, schema: &FunctionSchema) -> Vec<Option<ResourceId>> {
    let Some(entries) = schema
        .middlewares_path()
        .lookup(properties)
        .and_then(Value::as_array)
    else {
        return vec![];
    };

    entries
        .iter()
        .map(|entry| {
            let module = entry.get("module")?.as_str()?;
            let resource = entry.get("resource")?.as_str()?;
            Some(ResourceId::from_parts(module, resource))
        })
        .collect()
}

/// Remove deep-equal duplicates from the array at `path`, first occurrence wins
fn dedup_at(properties: &mut Value, path: &Path) {
    let Some(items) = path.lookup_mut(properties).and_then(Value::as_array_mut) else {
        return;
    };

    let mut unique: Vec<Value> = Vec::with_capacity(items.len());
    for item in items.drain(..) {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    *items = unique;
}

#[derive(thiserror::Error, Debug)]
pub enum FunctionError {
    #[error("function {0} not found")]
    NotFound(ResourceId),
    #[error("{resource} is of type {resource_type:?} which is not a function type")]
    NotAFunction {
        resource: ResourceId,
        resource_type: String,
    },
    #[error("function {0} must not extend another resource, use layers or middlewares instead")]
    ExtendedFunction(ResourceId),
    #[error("{resource} has no {keyword} keyword in its code property")]
    MissingCodeKeyword { resource: ResourceId, keyword: String },
    #[error("{0} does not name its code")]
    MissingCodeName(ResourceId),
    #[error("middleware #{index} of function {resource} is not a resource address")]
    InvalidMiddlewareReference { resource: ResourceId, index: usize },
    #[error("middleware {middleware} used by function {resource} not found")]
    MiddlewareNotFound {
        resource: ResourceId,
        middleware: ResourceId,
    },
    #[error("{resource} is of type {resource_type:?} which is not a middleware type")]
    NotAMiddleware {
        resource: ResourceId,
        resource_type: String,
    },
    #[error("failed to merge {resource}")]
    Merge {
        resource: ResourceId,
        source: MergeError,
    },
}
