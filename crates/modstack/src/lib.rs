//! # modstack - modular template composition
//!
//! `modstack` compiles infrastructure templates that are split over many independently authored modules. Modules
//! reference, extend and override each other's resources; the result is one plain document per module.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `modstack` works internally.
//!
//! ### Terms
//!
//! - a `module` is a named document (YAML or JSON), listed in the project manifest ([manifest::Manifest])
//! - a module document has a `Resources` object; every entry is a `resource` with a `Type` and `Properties`
//! - a resource is addressed by `(module, resource)`, see [extend::ResourceId]
//! - a `keyword` is a reserved property name; an object containing it is rewritten during compilation
//!
//! This is a valid module document:
//! ```yaml
//! Parameters:
//!   Stage:
//!     Type: String
//!
//! Resources:
//!   api:
//!     Type: AWS::Serverless::Function
//!     Extend:
//!       module: base
//!       resource: api
//!     Properties:
//!       Environment:
//!         Variables:
//!           STAGE: { Parameter: Stage }
//!       Layers:
//!         - Ref: { resource: shared }
//! ```
//!
//! ### Loading modules
//!
//! [documents::ModuleDocuments] stores the document of every module together with the file it was loaded from.
//! Modules keep the order of the manifest, which makes every later step deterministic.
//!
//! ### Extension
//!
//! see [extend::ExtendResolver::new]
//!
//! A resource with an `Extend` declaration contributes its properties to the resource it extends. All resources
//! linked that way form a family whose root is the one resource that extends nothing. The properties of all members
//! are merged into the root ([merge::merge], with the `rules` of each declaration) and every merged value is
//! attributed to the member that supplied it ([source_map::PropertySource]).
//!
//! Attribution matters for references: `Ref: { resource: shared }` written in module `app` and merged into a resource
//! of module `base` still means `app.shared`. [util::qualify_references] adds the module before the reference
//! leaves its family.
//!
//! ### Functions
//!
//! see [function::FunctionResolver]
//!
//! Function resources additionally receive the middlewares and layers of [function::Extension]s and the
//! properties of every middleware they use. The composed result knows which module's code backs the function.
//!
//! ### Keywords
//!
//! A module document is turned into a [tree::JsonTree] and walked children first.
//!
//! - [validate::validate_keywords] collects every problem of a document
//! - [process::process_keywords] rewrites every keyword occurrence and builds the output document
//!
//! Keywords are pluggable ([keyword::KeywordDefinition]). The built-in ones are `Ref`, `Parameter` and `Function`.
//!
//! ### Output
//!
//! [project::Project::compile] does all of the above for one module. Resources are renamed to their logical id
//! (module hash followed by resource name) which is also what `Ref` resolves to.
//!
pub mod documents;
pub mod extend;
pub mod function;
pub mod keyword;
pub mod manifest;
pub mod merge;
pub mod path;
pub mod process;
pub mod project;
pub mod source_map;
pub mod tree;
pub mod util;
pub mod validate;
mod visit;
