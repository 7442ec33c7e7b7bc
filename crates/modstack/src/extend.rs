//! Resource extension
//!
//! A resource may declare that it extends a resource of another (or the same) module:
//!
//! ```yaml
//! Resources:
//!   api:
//!     Type: AWS::Serverless::Function
//!     Extend:
//!       module: base
//!       resource: api
//!       rules:
//!         Layers: APPEND
//!     Properties:
//!       Layers:
//!         - Ref: { resource: tracing }
//! ```
//!
//! All resources connected through `Extend` form a family. The family root is the one resource without an `Extend`
//! declaration. [ExtendResolver] merges the `Properties` of every family member into the root's `Properties`,
//! nearest extenders first, and keeps a [PropertySource] map so it is known which member supplied which value.
//! Every member of a family resolves to the same [MergedResource].
use crate::documents::ModuleDocuments;
use crate::merge::{merge, MergeError, MergeRules};
use crate::source_map::PropertySource;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Unique address of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, derive_new::new)]
pub struct ResourceId {
    pub module: String,
    pub resource: String,
}

impl ResourceId {
    pub fn from_parts(module: &str, resource: &str) -> Self {
        Self::new(module.to_string(), resource.to_string())
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.module, self.resource)
    }
}

/// The `Extend` field of a resource
#[derive(Debug, Clone, Deserialize)]
pub struct ExtendDeclaration {
    /// defaults to the declaring module
    #[serde(default)]
    pub module: Option<String>,
    pub resource: String,
    #[serde(default)]
    pub rules: MergeRules,
}

impl ExtendDeclaration {
    /// Parse the declaration of `resource`, if any
    pub fn of(id: &ResourceId, resource: &Value) -> Result<Option<Self>, ExtendError> {
        let Some(extend) = resource.get("Extend") else {
            return Ok(None);
        };

        serde_json::from_value(extend.clone())
            .map(Some)
            .map_err(|source| ExtendError::InvalidDeclaration {
                resource: id.clone(),
                source,
            })
    }

    pub fn target(&self, declaring_module: &str) -> ResourceId {
        ResourceId::new(
            self.module
                .clone()
                .unwrap_or_else(|| declaring_module.to_string()),
            self.resource.clone(),
        )
    }
}

#[derive(Debug, Default)]
struct ExtendNode {
    /// resources extending this one, in declaration order
    from: Vec<ResourceId>,
    /// the resource this one extends
    to: Option<ResourceId>,
    rules: MergeRules,
}

/// A resource with the properties of its whole family merged in
#[derive(Debug, PartialEq)]
pub struct MergedResource {
    /// family root
    pub root: ResourceId,
    /// root resource with merged `Properties`
    pub resource: Value,
    pub source_map: PropertySource,
}

impl MergedResource {
    pub fn properties(&self) -> Option<&Value> {
        self.resource.get("Properties")
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.resource.get("Type").and_then(Value::as_str)
    }
}

#[derive(Debug)]
pub struct ExtendResolver {
    documents: ModuleDocuments,
    nodes: IndexMap<ResourceId, ExtendNode>,
    merged: IndexMap<ResourceId, Arc<MergedResource>>,
}

impl ExtendResolver {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(documents: ModuleDocuments) -> Result<Self, ExtendError> {
        let mut resolver = Self {
            documents,
            nodes: Default::default(),
            merged: Default::default(),
        };

        resolver.link()?;
        resolver.merge_families()?;

        Ok(resolver)
    }

    /// Build the extend node of every resource
    fn link(&mut self) -> Result<(), ExtendError> {
        for (id, resource) in self.documents.resources() {
            if !resource.is_object() {
                return Err(ExtendError::MalformedResource(id));
            }
            self.nodes.entry(id).or_default();
        }

        let declarations = self
            .documents
            .resources()
            .map(|(id, resource)| ExtendDeclaration::of(&id, resource).map(|decl| (id, decl)))
            .collect::<Result<Vec<_>, _>>()?;

        for (id, declaration) in declarations {
            let Some(declaration) = declaration else {
                continue;
            };

            let target = declaration.target(&id.module);
            let Some(target_node) = self.nodes.get_mut(&target) else {
                return Err(ExtendError::TargetNotFound {
                    resource: id,
                    target,
                });
            };
            target_node.from.push(id.clone());

            tracing::trace!(%id, %target, "extend link");
            if let Some(node) = self.nodes.get_mut(&id) {
                node.to = Some(target);
                node.rules = declaration.rules;
            }
        }

        Ok(())
    }

    fn find_root(&self, id: &ResourceId) -> Result<ResourceId, ExtendError> {
        let mut visited = vec![id.clone()];
        let mut current = id;
        while let Some(next) = self.nodes.get(current).and_then(|node| node.to.as_ref()) {
            if visited.contains(next) {
                return Err(ExtendError::Cycle(visited));
            }
            visited.push(next.clone());
            current = next;
        }
        Ok(current.clone())
    }

    fn merge_families(&mut self) -> Result<(), ExtendError> {
        let ids: Vec<ResourceId> = self.nodes.keys().cloned().collect();
        for id in ids {
            let root = self.find_root(&id)?;
            if self.merged.contains_key(&root) {
                continue;
            }

            let (members, merged) = self.merge_family(&root)?;
            tracing::debug!(%root, members = members.len(), "extension family merged");

            let merged = Arc::new(merged);
            for member in members {
                self.merged.insert(member, merged.clone());
            }
        }

        Ok(())
    }

    /// Merge all extenders of `root`, breadth first
    fn merge_family(
        &self,
        root: &ResourceId,
    ) -> Result<(Vec<ResourceId>, MergedResource), ExtendError> {
        let root_resource = self
            .documents
            .resource(root)
            .ok_or_else(|| ExtendError::MalformedResource(root.clone()))?;
        let root_type = root_resource.get("Type");

        let mut properties = own_properties(root_resource);
        let mut source_map = PropertySource::new(root.clone());
        let mut members = vec![root.clone()];
        let mut seen: HashSet<&ResourceId> = HashSet::from([root]);

        let mut queue: VecDeque<&ResourceId> = self.extenders(root).iter().collect();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }

            let resource = self
                .documents
                .resource(current)
                .ok_or_else(|| ExtendError::MalformedResource(current.clone()))?;

            if let (Some(own_type), Some(root_type)) = (resource.get("Type"), root_type) {
                if own_type != root_type {
                    return Err(ExtendError::TypeMismatch {
                        resource: current.clone(),
                        resource_type: type_name(own_type),
                        root: root.clone(),
                        root_type: type_name(root_type),
                    });
                }
            }

            let rules = self
                .nodes
                .get(current)
                .map(|node| &node.rules)
                .cloned()
                .unwrap_or_default();

            let changes = merge(&mut properties, &own_properties(resource), &rules).map_err(
                |source| ExtendError::Merge {
                    resource: current.clone(),
                    source,
                },
            )?;
            for change in &changes {
                source_map.apply(change, current, &properties);
            }

            members.push(current.clone());
            queue.extend(self.extenders(current));
        }

        let mut resource = root_resource.clone();
        if let Some(object) = resource.as_object_mut() {
            object.insert("Properties".to_string(), properties);
        }

        Ok((
            members,
            MergedResource {
                root: root.clone(),
                resource,
                source_map,
            },
        ))
    }

    pub fn documents(&self) -> &ModuleDocuments {
        &self.documents
    }

    /// Merged resource of any family member
    pub fn get(&self, id: &ResourceId) -> Option<&Arc<MergedResource>> {
        self.merged.get(id)
    }

    /// All resources of all modules and their merged counterpart
    pub fn resource_map(&self) -> &IndexMap<ResourceId, Arc<MergedResource>> {
        &self.merged
    }

    /// Resources that directly extend `id`
    pub fn extenders(&self, id: &ResourceId) -> &[ResourceId] {
        self.nodes
            .get(id)
            .map(|node| node.from.as_slice())
            .unwrap_or_default()
    }

    /// The resource `id` directly extends
    pub fn extended_by(&self, id: &ResourceId) -> Option<&ResourceId> {
        self.nodes.get(id).and_then(|node| node.to.as_ref())
    }
}

fn type_name(resource_type: &Value) -> String {
    resource_type
        .as_str()
        .map_or_else(|| resource_type.to_string(), str::to_string)
}

fn own_properties(resource: &Value) -> Value {
    match resource.get("Properties") {
        Some(properties @ Value::Object(_)) => properties.clone(),
        _ => Value::Object(Default::default()),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ExtendError {
    #[error("resource {0} is not an object")]
    MalformedResource(ResourceId),
    #[error("invalid Extend declaration on {resource}")]
    InvalidDeclaration {
        resource: ResourceId,
        source: serde_json::Error,
    },
    #[error("extended resource not found: {resource} extends {target}")]
    TargetNotFound {
        resource: ResourceId,
        target: ResourceId,
    },
    #[error("extension cycle: {}", display_chain(.0))]
    Cycle(Vec<ResourceId>),
    #[error("disallowed type boundary: {resource} ({resource_type}) can not extend {root} ({root_type})")]
    TypeMismatch {
        resource: ResourceId,
        resource_type: String,
        root: ResourceId,
        root_type: String,
    },
    #[error("failed to merge {resource}")]
    Merge {
        resource: ResourceId,
        source: MergeError,
    },
}

fn display_chain(chain: &[ResourceId]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
