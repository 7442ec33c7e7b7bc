//! property paths
//!
//! A path addresses a value inside a JSON document: each segment is either an object key or an array index.
//! Paths are written dotted (`CodeUri.Function.middlewares`, `Layers.0`) in merge rules and error messages.
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// A single path segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    Key(String),
    Index(usize),
}

impl PathKey {
    /// A key segment matches an index segment when it spells the same number
    pub fn matches(&self, other: &PathKey) -> bool {
        match (self, other) {
            (PathKey::Key(a), PathKey::Key(b)) => a == b,
            (PathKey::Index(a), PathKey::Index(b)) => a == b,
            (PathKey::Key(key), PathKey::Index(index)) | (PathKey::Index(index), PathKey::Key(key)) => {
                key.parse::<usize>().is_ok_and(|parsed| parsed == *index)
            }
        }
    }
}

impl From<&str> for PathKey {
    fn from(value: &str) -> Self {
        PathKey::Key(value.to_string())
    }
}

impl From<String> for PathKey {
    fn from(value: String) -> Self {
        PathKey::Key(value)
    }
}

impl From<usize> for PathKey {
    fn from(value: usize) -> Self {
        PathKey::Index(value)
    }
}

impl Display for PathKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PathKey::Key(key) => f.write_str(key),
            PathKey::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Owned path from the document root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(pub Vec<PathKey>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted path
    ///
    /// Segments made of digits only become [PathKey::Index]. The empty string is the root path.
    pub fn parse(dotted: &str) -> Self {
        if dotted.is_empty() {
            return Self::root();
        }

        Self(
            dotted
                .split('.')
                .map(|segment| match segment.parse::<usize>() {
                    Ok(index) => PathKey::Index(index),
                    Err(_) => PathKey::Key(segment.to_string()),
                })
                .collect(),
        )
    }

    pub fn child(&self, key: impl Into<PathKey>) -> Self {
        let mut path = self.clone();
        path.0.push(key.into());
        path
    }

    pub fn segments(&self) -> &[PathKey] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up the value at this path
    pub fn lookup<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.0.iter().try_fold(value, |current, key| match (current, key) {
            (Value::Object(map), PathKey::Key(key)) => map.get(key),
            (Value::Array(items), PathKey::Index(index)) => items.get(*index),
            _ => None,
        })
    }

    /// Look up the value at this path mutably
    pub fn lookup_mut<'v>(&self, value: &'v mut Value) -> Option<&'v mut Value> {
        self.0.iter().try_fold(value, |current, key| match (current, key) {
            (Value::Object(map), PathKey::Key(key)) => map.get_mut(key),
            (Value::Array(items), PathKey::Index(index)) => items.get_mut(*index),
            _ => None,
        })
    }

    /// Segment-wise equality using [PathKey::matches]
    pub fn matches(&self, other: &Path) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a.matches(b))
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }

        for (index, key) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            key.fmt(f)?;
        }
        Ok(())
    }
}

impl From<Vec<PathKey>> for Path {
    fn from(value: Vec<PathKey>) -> Self {
        Self(value)
    }
}

impl From<&[&str]> for Path {
    fn from(value: &[&str]) -> Self {
        Self(value.iter().map(|key| PathKey::from(*key)).collect())
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dotted = String::deserialize(deserializer)?;
        Ok(Path::parse(&dotted))
    }
}
