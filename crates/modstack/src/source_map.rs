//! property provenance
//!
//! A [PropertySource] tree runs parallel to the `Properties` of a merged resource. Each node names the resource
//! that supplied the value at its path most recently. Paths without a node of their own belong to their nearest
//! ancestor node.
use crate::extend::ResourceId;
use crate::merge::{ChangeKind, MergeChange};
use crate::path::{Path, PathKey};
use indexmap::IndexMap;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct PropertySource {
    source: ResourceId,
    children: Overlay,
}

/// Recorded attributions below a node
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Overlay {
    #[default]
    Leaf,
    Object(IndexMap<String, PropertySource>),
    /// Sparse: `None` means "same as the array itself"
    Array(Vec<Option<PropertySource>>),
}

impl Overlay {
    fn object_mut(&mut self) -> &mut IndexMap<String, PropertySource> {
        match self {
            Overlay::Object(map) => map,
            other => {
                *other = Overlay::Object(IndexMap::new());
                other.object_mut()
            }
        }
    }

    fn array_mut(&mut self) -> &mut Vec<Option<PropertySource>> {
        match self {
            Overlay::Array(items) => items,
            other => {
                *other = Overlay::Array(vec![]);
                other.array_mut()
            }
        }
    }
}

impl PropertySource {
    pub fn new(source: ResourceId) -> Self {
        Self {
            source,
            children: Overlay::Leaf,
        }
    }

    /// The recorded node for a direct child
    pub fn child(&self, key: &PathKey) -> Option<&PropertySource> {
        match (&self.children, key) {
            (Overlay::Object(map), PathKey::Key(key)) => map.get(key),
            (Overlay::Array(items), PathKey::Index(index)) => {
                items.get(*index).and_then(Option::as_ref)
            }
            _ => None,
        }
    }

    /// The recorded node at exactly `path`
    pub fn get(&self, path: &[PathKey]) -> Option<&PropertySource> {
        path.iter().try_fold(self, |node, key| node.child(key))
    }

    /// Longest chain of recorded nodes below this one
    pub fn height(&self) -> usize {
        let children: Box<dyn Iterator<Item = &PropertySource>> = match &self.children {
            Overlay::Leaf => return 0,
            Overlay::Object(map) => Box::new(map.values()),
            Overlay::Array(items) => Box::new(items.iter().flatten()),
        };
        children.map(|child| child.height() + 1).max().unwrap_or(0)
    }

    /// Node at `path`, creating missing nodes that inherit their parent's source
    fn node_mut(&mut self, path: &[PathKey]) -> &mut PropertySource {
        let Some((key, rest)) = path.split_first() else {
            return self;
        };

        let inherited = self.source.clone();
        let child = match key {
            PathKey::Key(key) => self
                .children
                .object_mut()
                .entry(key.clone())
                .or_insert_with(|| PropertySource::new(inherited)),
            PathKey::Index(index) => {
                let items = self.children.array_mut();
                if items.len() <= *index {
                    items.resize(*index + 1, None);
                }
                items[*index].get_or_insert_with(|| PropertySource::new(inherited))
            }
        };

        child.node_mut(rest)
    }

    /// Attribute a merge change to `contributor`
    ///
    /// `merged` is the merged properties value after the change was applied; appends need it to find out which
    /// indices are new.
    pub fn apply(&mut self, change: &MergeChange, contributor: &ResourceId, merged: &Value) {
        let node = self.node_mut(change.path.segments());
        match change.kind {
            ChangeKind::Replace | ChangeKind::Combine => {
                *node = PropertySource::new(contributor.clone());
            }
            ChangeKind::Append { count } => {
                let len = change
                    .path
                    .lookup(merged)
                    .and_then(Value::as_array)
                    .map_or(count, Vec::len);
                let items = node.children.array_mut();
                if items.len() < len {
                    items.resize(len, None);
                }
                for slot in items.iter_mut().take(len).skip(len.saturating_sub(count)) {
                    *slot = Some(PropertySource::new(contributor.clone()));
                }
            }
            ChangeKind::Prepend { count } => {
                let items = node.children.array_mut();
                items.splice(
                    0..0,
                    std::iter::repeat_with(|| Some(PropertySource::new(contributor.clone())))
                        .take(count),
                );
            }
        }
    }
}

/// Result of [get_resource_property_source]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySourceMatch {
    pub module: String,
    pub resource: String,
    /// Path segments left over below the matched node.
    ///
    /// Negative when the path ends on a node that has recorded children: the value is the negated height of that
    /// node's recorded subtree.
    pub depth: isize,
}

/// Find who supplied the value at `path`
pub fn get_resource_property_source(path: &Path, map: &PropertySource) -> PropertySourceMatch {
    let mut current = map;
    let mut matched = 0;
    for key in path.segments() {
        let Some(child) = current.child(key) else {
            break;
        };
        current = child;
        matched += 1;
    }

    let depth = if matched < path.len() {
        (path.len() - matched) as isize
    } else {
        -(current.height() as isize)
    };

    PropertySourceMatch {
        module: current.source.module.clone(),
        resource: current.source.resource.clone(),
        depth,
    }
}
