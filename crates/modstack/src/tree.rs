//! Immutable JSON node tree
//!
//! [JsonTree] stores all nodes of one document in a flat arena. Every node knows its parent and the key under which
//! the parent refers to it, so a [Node] can reconstruct its own [Path]. Once [JsonTree::parse] returns, the tree
//! cannot be changed; processing always produces a new [serde_json::Value].
use crate::path::{Path, PathKey};
use indexmap::IndexMap;
use serde_json::Value;

/// Index of a node inside its [JsonTree]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Object,
    Array,
    Primitive,
}

#[derive(Debug)]
enum NodeKind {
    Object(IndexMap<String, NodeId>),
    Array(Vec<NodeId>),
    Primitive(Value),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<(PathKey, NodeId)>,
}

#[derive(Debug)]
pub struct JsonTree {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl JsonTree {
    /// Build a tree from a json value
    pub fn parse(value: &Value) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.insert(value, None);
        tracing::trace!(nodes = tree.nodes.len(), "json tree built");
        tree
    }

    /// Build a tree from anything that serializes into json
    ///
    /// Fails when the value has no json representation (for example a map with non-string keys).
    pub fn from_serialize<T: serde::Serialize>(value: &T) -> Result<Self, TreeError> {
        let value = serde_json::to_value(value)?;
        Ok(Self::parse(&value))
    }

    fn insert(&mut self, value: &Value, parent: Option<(PathKey, NodeId)>) -> NodeId {
        let id = NodeId(self.nodes.len());
        // placeholder until the children are attached
        self.nodes.push(NodeData {
            kind: NodeKind::Primitive(Value::Null),
            parent,
        });

        let kind = match value {
            Value::Object(map) => NodeKind::Object(
                map.iter()
                    .map(|(key, child)| {
                        let child_id = self.insert(child, Some((PathKey::Key(key.clone()), id)));
                        (key.clone(), child_id)
                    })
                    .collect(),
            ),
            Value::Array(items) => NodeKind::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, child)| self.insert(child, Some((PathKey::Index(index), id))))
                    .collect(),
            ),
            primitive => NodeKind::Primitive(primitive.clone()),
        };

        self.nodes[id.0].kind = kind;
        id
    }

    pub fn root(&self) -> Node<'_> {
        Node {
            tree: self,
            id: self.root,
        }
    }

    pub fn get(&self, id: NodeId) -> Option<Node<'_>> {
        (id.0 < self.nodes.len()).then_some(Node { tree: self, id })
    }

    /// Follow a path from the root
    pub fn navigate(&self, path: &[PathKey]) -> Option<Node<'_>> {
        path.iter().try_fold(self.root(), |node, key| node.child(key))
    }
}

/// Borrowed view of a single node
#[derive(Clone, Copy)]
pub struct Node<'t> {
    tree: &'t JsonTree,
    id: NodeId,
}

impl<'t> Node<'t> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn data(&self) -> &'t NodeData {
        &self.tree.nodes[self.id.0]
    }

    fn wrap(&self, id: NodeId) -> Node<'t> {
        Node {
            tree: self.tree,
            id,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self.data().kind {
            NodeKind::Object(_) => NodeType::Object,
            NodeKind::Array(_) => NodeType::Array,
            NodeKind::Primitive(_) => NodeType::Primitive,
        }
    }

    /// The scalar of a primitive node
    pub fn value(&self) -> Option<&'t Value> {
        match &self.data().kind {
            NodeKind::Primitive(value) => Some(value),
            _ => None,
        }
    }

    /// Items of an array node, empty for any other node
    pub fn items(&self) -> impl Iterator<Item = Node<'t>> + 't {
        let node = *self;
        let ids: &'t [NodeId] = match &self.data().kind {
            NodeKind::Array(items) => items.as_slice(),
            _ => &[],
        };
        ids.iter().map(move |id| node.wrap(*id))
    }

    /// Properties of an object node in source order, empty for any other node
    pub fn properties(&self) -> impl Iterator<Item = (&'t str, Node<'t>)> + 't {
        let node = *self;
        let properties = match &self.data().kind {
            NodeKind::Object(properties) => Some(properties),
            _ => None,
        };
        properties
            .into_iter()
            .flat_map(|properties| properties.iter())
            .map(move |(key, id)| (key.as_str(), node.wrap(*id)))
    }

    pub fn property(&self, key: &str) -> Option<Node<'t>> {
        match &self.data().kind {
            NodeKind::Object(properties) => properties.get(key).map(|id| self.wrap(*id)),
            _ => None,
        }
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.property(key).is_some()
    }

    pub fn child(&self, key: &PathKey) -> Option<Node<'t>> {
        match (&self.data().kind, key) {
            (NodeKind::Object(properties), PathKey::Key(key)) => {
                properties.get(key).map(|id| self.wrap(*id))
            }
            (NodeKind::Array(items), PathKey::Index(index)) => {
                items.get(*index).map(|id| self.wrap(*id))
            }
            _ => None,
        }
    }

    /// The key the parent uses for this node and the parent itself
    pub fn parent(&self) -> Option<(&'t PathKey, Node<'t>)> {
        self.data()
            .parent
            .as_ref()
            .map(|(key, parent)| (key, self.wrap(*parent)))
    }

    /// All ancestors, nearest first
    pub fn ancestors(&self) -> impl Iterator<Item = Node<'t>> + 't {
        std::iter::successors(self.parent().map(|(_, parent)| parent), |node| {
            node.parent().map(|(_, parent)| parent)
        })
    }

    /// Path from the root to this node
    pub fn path(&self) -> Path {
        let mut keys = vec![];
        let mut current = *self;
        while let Some((key, parent)) = current.parent() {
            keys.push(key.clone());
            current = parent;
        }
        keys.reverse();
        Path(keys)
    }

    /// Rebuild a plain json value from this node and its descendants
    pub fn to_json(&self) -> Value {
        match &self.data().kind {
            NodeKind::Primitive(value) => value.clone(),
            NodeKind::Array(_) => Value::Array(self.items().map(|item| item.to_json()).collect()),
            NodeKind::Object(_) => Value::Object(
                self.properties()
                    .map(|(key, child)| (key.to_string(), child.to_json()))
                    .collect(),
            ),
        }
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("path", &self.path().to_string())
            .field("type", &self.node_type())
            .finish()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TreeError {
    #[error("value can not be represented as json")]
    NotJson(#[from] serde_json::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "Resources": {
                "bucket": { "Type": "Bucket", "Properties": { "Tags": ["a", "b", { "k": null }] } }
            },
            "Version": 2,
            "Enabled": true
        })
    }

    #[test]
    fn round_trip() {
        let value = sample();
        assert_eq!(JsonTree::parse(&value).root().to_json(), value);
        assert_eq!(JsonTree::parse(&json!(42)).root().to_json(), json!(42));
    }

    #[test]
    fn property_order_is_preserved() {
        let tree = JsonTree::parse(&json!({ "z": 1, "a": 2, "m": 3 }));
        let keys: Vec<_> = tree.root().properties().map(|(key, _)| key).collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn paths() {
        let tree = JsonTree::parse(&sample());
        assert_eq!(tree.root().path(), Path::root());

        let node = tree
            .navigate(&Path::parse("Resources.bucket.Properties.Tags.2.k").0)
            .expect("node exists");
        assert_eq!(node.path().to_string(), "Resources.bucket.Properties.Tags.2.k");
        assert_eq!(node.node_type(), NodeType::Primitive);
        assert_eq!(node.ancestors().count(), 6);
    }

    #[test]
    fn path_fidelity_after_rebuild() {
        let tree = JsonTree::parse(&sample());
        let rebuilt = JsonTree::parse(&tree.root().to_json());

        let mut stack = vec![tree.root()];
        while let Some(node) = stack.pop() {
            let twin = rebuilt.navigate(node.path().segments()).expect("same shape");
            assert_eq!(twin.node_type(), node.node_type());
            assert_eq!(twin.value(), node.value());
            stack.extend(node.items());
            stack.extend(node.properties().map(|(_, child)| child));
        }
    }

    #[test]
    fn non_json_values_are_rejected() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(vec![1u8], 1);
        assert!(matches!(
            JsonTree::from_serialize(&map),
            Err(TreeError::NotJson(_))
        ));
    }
}
