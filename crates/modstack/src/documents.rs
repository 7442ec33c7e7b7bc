//! collection of module documents (json document and location of the module)
//!
//! [ModuleDocuments] tracks
//! - the module name
//! - the module location (where its document was loaded from)
//! - the document itself
//! and keeps modules in insertion order. Iteration order over modules and their resources is stable, which keeps
//! extension merges deterministic.
use crate::extend::ResourceId;
use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Default, Debug)]
pub struct ModuleDocuments {
    modules: IndexMap<String, ModuleDocument>,
}

#[derive(Debug)]
pub struct ModuleDocument {
    pub location: Option<PathBuf>,
    pub document: Value,
}

impl ModuleDocuments {
    /// Inserts a module document
    ///
    /// A module that was already inserted is replaced but keeps its position.
    pub fn insert(
        &mut self,
        module: impl Into<String>,
        document: Value,
        location: Option<PathBuf>,
    ) {
        self.modules.insert(
            module.into(),
            ModuleDocument {
                location,
                document,
            },
        );
    }

    pub fn get(&self, module: &str) -> Option<&ModuleDocument> {
        self.modules.get(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &ModuleDocument)> {
        self.modules
            .iter()
            .map(|(name, document)| (name.as_str(), document))
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// All resources of all modules
    pub fn resources(&self) -> impl Iterator<Item = (ResourceId, &Value)> {
        self.modules.iter().flat_map(|(module, document)| {
            document
                .document
                .get("Resources")
                .and_then(Value::as_object)
                .into_iter()
                .flatten()
                .map(move |(name, resource)| (ResourceId::new(module.clone(), name.clone()), resource))
        })
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&Value> {
        self.modules
            .get(&id.module)?
            .document
            .get("Resources")?
            .get(&id.resource)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleDocuments {
    /// Load a module document from a yaml or json file
    pub fn load_file(&mut self, module: &str, file_path: &Path) -> Result<(), LoadError> {
        let file_path = file_path.canonicalize()?;
        tracing::info!(module, path = %file_path.display(), "loading module");

        if self.modules.contains_key(module) {
            return Err(LoadError::DuplicateModule(module.to_string()));
        }

        let file_contents = std::fs::read_to_string(&file_path)?;
        let document: Value = match file_path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&file_contents)?,
            _ => serde_yaml::from_str(&file_contents)?,
        };

        if !document.is_object() {
            return Err(LoadError::NotAnObject(file_path));
        }

        self.insert(module, document, Some(file_path));
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("module {0} is defined more than once")]
    DuplicateModule(String),
    #[error("document {} is not an object", .0.display())]
    NotAnObject(PathBuf),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse yaml file")]
    YamlParseFailed(#[from] serde_yaml::Error),
    #[error("Unable to parse json file")]
    JsonParseFailed(#[from] serde_json::Error),
}

/// Utility macro to create [ModuleDocuments]
///
/// ```
/// # use modstack::module_documents;
/// let documents = module_documents! {
///   "one" => serde_json::json!({ "Resources": {} }),
///   "two" => serde_json::json!({ "Resources": {} })
/// };
/// assert_eq!(documents.len(), 2);
/// ```
#[macro_export]
macro_rules! module_documents {
    { $($module:expr => $document:expr),+ $(,)? } => {{
        let mut docs = $crate::documents::ModuleDocuments::default();
        $(
            docs.insert($module, $document, None);
        )+

        docs
    }};
}

#[cfg(test)]
pub(crate) mod test {
    use serde_json::json;

    #[test]
    fn iterators() {
        let documents = module_documents! {
            "one" => json!({ "Resources": { "a": { "Type": "T" }, "b": { "Type": "T" } } }),
            "two" => json!({ "Parameters": {} }),
            "three" => json!({ "Resources": { "c": { "Type": "T" } } })
        };

        assert_eq!(documents.len(), 3);
        assert_eq!(documents.resources().count(), 3);

        let names: Vec<_> = documents
            .resources()
            .map(|(id, _)| id.to_string())
            .collect();
        assert_eq!(names, ["one.a", "one.b", "three.c"]);
    }

    #[test]
    fn lookup() {
        let documents = module_documents! {
            "one" => json!({ "Resources": { "a": { "Type": "T" } } })
        };
        let id = crate::extend::ResourceId::from_parts("one", "a");
        assert_eq!(documents.resource(&id), Some(&json!({ "Type": "T" })));
        assert!(documents
            .resource(&crate::extend::ResourceId::from_parts("one", "b"))
            .is_none());
    }

    #[test]
    fn reinserted_module_keeps_position() {
        let mut documents = module_documents! {
            "one" => json!({}),
            "two" => json!({})
        };
        documents.insert("one", json!({ "Resources": {} }), Some("one.yaml".into()));

        let modules: Vec<_> = documents
            .modules()
            .map(|(name, document)| (name, document.location.clone()))
            .collect();
        assert_eq!(
            modules,
            vec![("one", Some(std::path::PathBuf::from("one.yaml"))), ("two", None)]
        );
    }
}
