//! A set of modules that are compiled together
//!
//! [Project] owns the module documents and everything derived from them: the [ExtendResolver], the
//! [FunctionResolver] and the registered keywords. It is also the [Services] implementation keywords use to look up
//! resources of other modules.
use crate::documents::{LoadError, ModuleDocuments};
use crate::extend::{ExtendError, ExtendResolver, MergedResource, ResourceId};
use crate::function::{
    Extension, FinalFunctionResource, FunctionError, FunctionResolver, FunctionSchema,
};
use crate::keyword::{
    self, logical_id, KeywordDefinition, KeywordParams, Processors, Services, Validators,
};
use crate::manifest::{Manifest, ManifestError};
use crate::process::{process_keywords, ProcessError};
use crate::tree::JsonTree;
use crate::util::qualify_references;
use crate::validate::{validate_keywords, LocatedError};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

type ModuleHash = Box<dyn Fn(&str) -> String>;

pub struct Project {
    root_dir: PathBuf,
    extend: ExtendResolver,
    functions: FunctionResolver,
    parameters: Vec<String>,
    module_hash: ModuleHash,
    keywords: Vec<Box<dyn KeywordDefinition>>,
}

/// First 8 hex digits of the SHA-256 of the module name
pub fn default_module_hash(module: &str) -> String {
    let digest = Sha256::digest(module.as_bytes());
    hex::encode(&digest[..4])
}

impl Project {
    /// Resolves all extensions right away, a broken `Extend` fails here
    pub fn new(
        documents: ModuleDocuments,
        schema: FunctionSchema,
        extensions: Vec<Extension>,
    ) -> Result<Self, ProjectError> {
        let keywords = keyword::builtin(&schema);
        Ok(Self {
            root_dir: PathBuf::from("."),
            extend: ExtendResolver::new(documents)?,
            functions: FunctionResolver::new(schema, extensions),
            parameters: vec![],
            module_hash: Box::new(default_module_hash),
            keywords,
        })
    }

    #[tracing::instrument(level = "debug")]
    pub fn from_manifest(path: &Path) -> Result<Self, ProjectError> {
        let (manifest, root_dir) = Manifest::load(path)?;
        let documents = manifest.documents(&root_dir)?;

        Ok(Self::new(documents, manifest.schema, manifest.extensions)?
            .with_parameters(manifest.parameters)
            .with_root_dir(root_dir))
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_root_dir(mut self, root_dir: PathBuf) -> Self {
        self.root_dir = root_dir;
        self
    }

    pub fn with_module_hash(mut self, module_hash: impl Fn(&str) -> String + 'static) -> Self {
        self.module_hash = Box::new(module_hash);
        self
    }

    /// Register an additional keyword, replacing a registered keyword of the same name
    pub fn with_keyword(mut self, definition: Box<dyn KeywordDefinition>) -> Self {
        self.keywords
            .retain(|registered| registered.keyword() != definition.keyword());
        self.keywords.push(definition);
        self
    }

    pub fn extend(&self) -> &ExtendResolver {
        &self.extend
    }

    pub fn functions(&self) -> &FunctionResolver {
        &self.functions
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.extend.documents().module_names()
    }

    fn document(&self, module: &str) -> Result<&Value, ProjectError> {
        self.extend
            .documents()
            .get(module)
            .map(|document| &document.document)
            .ok_or_else(|| ProjectError::UnknownModule(module.to_string()))
    }

    fn keyword_params<'a>(&'a self, module: &'a str) -> KeywordParams<'a> {
        KeywordParams::new(&self.root_dir, module, self)
    }

    fn keyword_setup_failed(definition: &dyn KeywordDefinition) -> impl FnOnce(anyhow::Error) -> ProjectError + '_ {
        move |source| ProjectError::KeywordSetup {
            keyword: definition.keyword().to_string(),
            source,
        }
    }

    /// Validate the keywords of a module's own document
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn validate(&self, module: &str) -> Result<Vec<LocatedError>, ProjectError> {
        let document = self.document(module)?;
        let params = self.keyword_params(module);

        let mut validators = Validators::new();
        for definition in &self.keywords {
            let validator = definition
                .validator(params)
                .map_err(Self::keyword_setup_failed(&**definition))?;
            validators.insert(definition.keyword().to_string(), validator);
        }

        Ok(validate_keywords(&JsonTree::parse(document), &validators))
    }

    /// Validate every module, all errors are reported together
    pub fn validate_all(&self) -> Result<ValidationErrors, ProjectError> {
        let mut errors = ValidationErrors::default();
        for module in self.module_names() {
            for error in self.validate(module)? {
                errors.log(module, error);
            }
        }
        Ok(errors)
    }

    /// Compile a module into its final document
    ///
    /// Extending resources disappear (their properties live in the resource they extend), extended resources carry
    /// the properties of their whole family and functions are composed with their middlewares and layers. The
    /// resulting document is processed with all registered keywords and its resources are renamed to their
    /// logical ids.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn compile(&self, module: &str) -> Result<Value, ProjectError> {
        let mut document = self.document(module)?.clone();
        if let Some(resources) = document.get_mut("Resources").and_then(Value::as_object_mut) {
            *resources = self.expand_resources(module, resources)?;
        }

        let params = self.keyword_params(module);
        let mut processors = Processors::new();
        for definition in &self.keywords {
            let processor = definition
                .processor(params)
                .map_err(Self::keyword_setup_failed(&**definition))?;
            processors.insert(definition.keyword().to_string(), processor);
        }

        let mut compiled = process_keywords(&JsonTree::parse(&document), &processors)?;
        if let Some(resources) = compiled.get_mut("Resources").and_then(Value::as_object_mut) {
            *resources = std::mem::take(resources)
                .into_iter()
                .map(|(name, resource)| (logical_id(self, module, &name), resource))
                .collect();
        }

        tracing::info!(module, "module compiled");
        Ok(compiled)
    }

    fn expand_resources(
        &self,
        module: &str,
        resources: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ProjectError> {
        let schema = self.functions.schema();
        let mut expanded = Map::new();

        for (name, resource) in resources {
            let id = ResourceId::from_parts(module, name);
            if let Some(target) = self.extend.extended_by(&id) {
                tracing::debug!(%id, %target, "extending resource merged into its target");
                continue;
            }

            let resource_type = resource.get("Type").and_then(Value::as_str).unwrap_or_default();
            if resource_type == schema.middleware_type {
                continue;
            }

            let body = if schema.is_function_type(resource_type) {
                self.functions
                    .get_final_function_resource(&self.extend, &id)?
                    .resource
                    .clone()
            } else {
                let merged = self
                    .extend
                    .get(&id)
                    .ok_or_else(|| ProjectError::UnknownResource(id.clone()))?;
                let mut body = merged.resource.clone();
                if let Some(properties) = body.get_mut("Properties") {
                    qualify_references(properties, &merged.source_map, schema);
                }
                body
            };

            expanded.insert(name.clone(), body);
        }

        Ok(expanded)
    }
}

impl Services for Project {
    fn get_resource(&self, module: &str, resource: &str) -> Option<Arc<MergedResource>> {
        self.extend
            .get(&ResourceId::from_parts(module, resource))
            .cloned()
    }

    fn get_module_hash(&self, module: &str) -> String {
        (self.module_hash)(module)
    }

    fn parameter_names(&self) -> Vec<String> {
        self.parameters.clone()
    }

    fn get_function(
        &self,
        module: &str,
        resource: &str,
    ) -> Result<Arc<FinalFunctionResource>, FunctionError> {
        self.functions
            .get_final_function_resource(&self.extend, &ResourceId::from_parts(module, resource))
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("root_dir", &self.root_dir)
            .field("extend", &self.extend)
            .field("functions", &self.functions)
            .field("parameters", &self.parameters)
            .field(
                "keywords",
                &self
                    .keywords
                    .iter()
                    .map(|definition| definition.keyword())
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

/// Validation errors of all modules
#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: Vec<(String, LocatedError)>,
}

impl ValidationErrors {
    pub fn log(&mut self, module: &str, error: LocatedError) {
        tracing::trace!(module, %error, "validation error");
        self.errors.push((module.to_string(), error));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LocatedError)> {
        self.errors
            .iter()
            .map(|(module, error)| (module.as_str(), error))
    }
}

impl std::error::Error for ValidationErrors {}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} validation error(s)", self.errors.len())?;
        for (module, error) in &self.errors {
            writeln!(f, "  {module}: {error}")?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("failed to read manifest")]
    Manifest(#[from] ManifestError),
    #[error("failed to load module")]
    Load(#[from] LoadError),
    #[error("failed to resolve extensions")]
    Extend(#[from] ExtendError),
    #[error("failed to compose function")]
    Function(#[from] FunctionError),
    #[error("failed to process keywords")]
    Process(#[from] ProcessError),
    #[error("unknown module {0}")]
    UnknownModule(String),
    #[error("resource {0} not found")]
    UnknownResource(ResourceId),
    #[error("keyword {keyword} could not be set up")]
    KeywordSetup {
        keyword: String,
        source: anyhow::Error,
    },
}
