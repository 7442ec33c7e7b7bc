//! project manifest
//!
//! ```yaml
//! modules:
//!   - name: base
//!     path: base/template.yaml
//!   - name: app
//!     path: app/template.json
//! parameters:
//!   - Stage
//! extensions:
//!   - module: observability
//!     middlewares:
//!       - resource: tracing
//!         types: [AWS::Serverless::Function]
//!     layers:
//!       - resource: otel
//! schema:
//!   code_property: CodeUri
//! ```
//!
//! Module paths are relative to the directory of the manifest.
use crate::documents::{LoadError, ModuleDocuments};
use crate::function::{Extension, FunctionSchema};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// in dependency order, bases first
    pub modules: Vec<ModuleEntry>,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<Extension>,
    #[serde(default)]
    pub schema: FunctionSchema,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleEntry {
    pub name: String,
    pub path: PathBuf,
}

impl Manifest {
    /// Read a manifest, returns it together with the directory it was found in
    pub fn load(path: &Path) -> Result<(Self, PathBuf), ManifestError> {
        let path = path.canonicalize().map_err(|source| ManifestError::Io {
            path: path.to_owned(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loading manifest");

        let contents = std::fs::read_to_string(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        let manifest = Self::parse(&contents)?;
        let root_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok((manifest, root_dir))
    }

    pub fn parse(contents: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_yaml::from_str(contents)?;

        let mut names: Vec<&str> = vec![];
        for module in &manifest.modules {
            if names.contains(&module.name.as_str()) {
                return Err(ManifestError::DuplicateModule(module.name.clone()));
            }
            names.push(&module.name);
        }

        for extension in &manifest.extensions {
            if !names.contains(&extension.module.as_str()) {
                return Err(ManifestError::UnknownExtensionModule(extension.module.clone()));
            }
        }

        Ok(manifest)
    }

    /// Load the document of every module
    pub fn documents(&self, root_dir: &Path) -> Result<ModuleDocuments, LoadError> {
        let mut documents = ModuleDocuments::default();
        for module in &self.modules {
            documents.load_file(&module.name, &root_dir.join(&module.path))?;
        }
        Ok(documents)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("unable to read {}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid manifest")]
    Invalid(#[from] serde_yaml::Error),
    #[error("module {0} is listed more than once")]
    DuplicateModule(String),
    #[error("extension module {0} is not listed in modules")]
    UnknownExtensionModule(String),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::function::Contribution;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse() {
        let manifest = Manifest::parse(
            r#"
modules:
  - name: base
    path: base.yaml
  - name: app
    path: app/template.json
parameters: [Stage]
extensions:
  - module: base
    middlewares:
      - resource: tracing
        types: [Function]
schema:
  function_types: [Function]
"#,
        )
        .expect("valid manifest");

        assert_eq!(manifest.modules.len(), 2);
        assert_eq!(manifest.modules[1].path, PathBuf::from("app/template.json"));
        assert_eq!(manifest.parameters, vec!["Stage"]);
        assert_eq!(
            manifest.extensions,
            vec![Extension::new(
                "base".into(),
                vec![Contribution::new("tracing".into(), Some(vec!["Function".into()]))],
                vec![],
            )]
        );
        assert_eq!(manifest.schema.function_types, vec!["Function"]);
        assert_eq!(manifest.schema.code_property, "CodeUri");
    }

    #[test]
    fn rejects_inconsistent_manifests() {
        let duplicate = Manifest::parse(
            "modules: [{ name: a, path: a.yaml }, { name: a, path: b.yaml }]",
        );
        assert!(matches!(duplicate, Err(ManifestError::DuplicateModule(name)) if name == "a"));

        let unknown = Manifest::parse(
            "modules: [{ name: a, path: a.yaml }]\nextensions: [{ module: b }]",
        );
        assert!(matches!(unknown, Err(ManifestError::UnknownExtensionModule(name)) if name == "b"));

        assert!(matches!(Manifest::parse("modules: 1"), Err(ManifestError::Invalid(_))));
    }
}
