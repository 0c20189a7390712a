//! In-memory manifest tree and document locations.

use relimg_core::error::{RelimgError, Result};
use serde_yaml::{Mapping, Value};

/// One step from a node to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Path from the document root to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Location {
    segments: Vec<PathSegment>,
}

impl Location {
    /// The document root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Location made of map keys only (e.g. `["spec", "relatedImages"]`).
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: keys.into_iter().map(|k| PathSegment::Key(k.into())).collect(),
        }
    }

    /// Child location under a map key.
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut child = self.clone();
        child.segments.push(PathSegment::Key(key.into()));
        child
    }

    /// Child location at a sequence index.
    pub fn index(&self, index: usize) -> Self {
        let mut child = self.clone();
        child.segments.push(PathSegment::Index(index));
        child
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "<root>");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{}", key)?,
                PathSegment::Key(key) => write!(f, ".{}", key)?,
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// A parsed bundle manifest.
///
/// Maps keep document order, so untouched content serializes back in the
/// same shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    root: Value,
}

impl ManifestDocument {
    /// Parse a YAML document. The top level must be a mapping.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(root)
    }

    /// Wrap an already parsed value. The top level must be a mapping.
    pub fn from_value(root: Value) -> Result<Self> {
        if !root.is_mapping() {
            return Err(RelimgError::manifest(
                Location::root(),
                "top-level document must be a mapping",
            ));
        }
        Ok(Self { root })
    }

    /// Serialize back to YAML.
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Node at `location`, if present. YAML tags on the way are looked through.
    pub fn get(&self, location: &Location) -> Option<&Value> {
        let mut node = &self.root;
        for segment in location.segments() {
            node = match (untag(node), segment) {
                (Value::Mapping(mapping), PathSegment::Key(key)) => mapping.get(key.as_str())?,
                (Value::Sequence(items), PathSegment::Index(index)) => items.get(*index)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Mutable node at `location`, if present. YAML tags on the way are looked through.
    pub fn get_mut(&mut self, location: &Location) -> Option<&mut Value> {
        let mut node = &mut self.root;
        for segment in location.segments() {
            node = match (untag_mut(node), segment) {
                (Value::Mapping(mapping), PathSegment::Key(key)) => {
                    mapping.get_mut(key.as_str())?
                }
                (Value::Sequence(items), PathSegment::Index(index)) => items.get_mut(*index)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// String scalar at `location`, if the node is a string.
    pub fn get_str(&self, location: &Location) -> Option<&str> {
        self.get(location).map(untag).and_then(Value::as_str)
    }

    /// Replace the string scalar at `location`, keeping any tag on it.
    ///
    /// Fails if the node is missing or is not a string scalar.
    pub fn set_str(&mut self, location: &Location, value: &str) -> Result<()> {
        match self.get_mut(location).map(untag_mut) {
            Some(node @ Value::String(_)) => {
                *node = Value::String(value.to_string());
                Ok(())
            }
            Some(_) => Err(RelimgError::manifest(location, "expected a string scalar")),
            None => Err(RelimgError::manifest(location, "no such node")),
        }
    }

    /// Mapping at a keys-only location, creating empty mappings on the way.
    ///
    /// Missing and null nodes become empty mappings. Fails if an existing
    /// node on the path is anything else.
    pub fn ensure_mapping(&mut self, keys: &[String]) -> Result<&mut Mapping> {
        let mut location = Location::root();
        let mut node = &mut self.root;
        for key in keys {
            let mapping = node
                .as_mapping_mut()
                .ok_or_else(|| RelimgError::manifest(&location, "expected a mapping"))?;
            location = location.key(key.as_str());
            if !mapping.contains_key(key.as_str()) {
                mapping.insert(Value::String(key.clone()), Value::Null);
            }
            node = mapping
                .get_mut(key.as_str())
                .ok_or_else(|| RelimgError::manifest(&location, "no such node"))?;
            if node.is_null() {
                *node = Value::Mapping(Mapping::new());
            }
        }
        node.as_mapping_mut()
            .ok_or_else(|| RelimgError::manifest(&location, "expected a mapping"))
    }
}

/// The value under any YAML tags (`!Custom value`).
pub(crate) fn untag(node: &Value) -> &Value {
    match node {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn untag_mut(node: &mut Value) -> &mut Value {
    match node {
        Value::Tagged(tagged) => untag_mut(&mut tagged.value),
        other => other,
    }
}
