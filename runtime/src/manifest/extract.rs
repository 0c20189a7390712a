//! Discovery of image references inside a manifest.
//!
//! Two shapes are recognized:
//! - a key from the image-key list (default `image`) with a string value;
//! - a `value` key whose sibling `name` starts with the related-image prefix
//!   (default `RELATED_IMAGE_`), as used by operand env vars.
//!
//! The walk is depth-first pre-order, map keys in document order. Nothing is
//! deduplicated: every occurrence keeps its own location.

use relimg_core::config::RelimgConfig;
use serde_yaml::{Mapping, Value};

use super::document::{untag, Location, ManifestDocument};
use crate::oci::ImageReference;

/// A discovered image reference and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub location: Location,
    /// Scalar text exactly as found in the document.
    pub raw: String,
    pub reference: ImageReference,
}

/// A candidate string that could not be parsed as an image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionWarning {
    pub location: Location,
    pub raw: String,
    pub reason: String,
}

impl std::fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: '{}': {}", self.location, self.raw, self.reason)
    }
}

/// Walks a manifest and collects image reference occurrences.
#[derive(Debug, Clone)]
pub struct Extractor {
    image_keys: Vec<String>,
    related_image_prefix: String,
    skip: Option<Location>,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(&RelimgConfig::default())
    }
}

impl Extractor {
    /// Extractor for the configured keys, prefix, and related-images path.
    pub fn new(config: &RelimgConfig) -> Self {
        Self {
            image_keys: config.image_keys.clone(),
            related_image_prefix: config.related_image_prefix.clone(),
            skip: Some(Location::from_keys(config.related_images_keys())),
        }
    }

    /// Use a different env var prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.related_image_prefix = prefix.into();
        self
    }

    /// Also walk the related-images list.
    pub fn without_skip(mut self) -> Self {
        self.skip = None;
        self
    }

    /// Collect all occurrences and warnings in document order.
    pub fn extract(&self, doc: &ManifestDocument) -> (Vec<Occurrence>, Vec<ExtractionWarning>) {
        let mut walk = Walk::default();
        self.visit(doc.root(), &Location::root(), &mut walk);
        tracing::debug!(
            occurrences = walk.occurrences.len(),
            warnings = walk.warnings.len(),
            "Extracted image references"
        );
        (walk.occurrences, walk.warnings)
    }

    fn visit(&self, node: &Value, location: &Location, walk: &mut Walk) {
        if self.skip.as_ref() == Some(location) {
            return;
        }
        match node {
            Value::Mapping(mapping) => self.visit_mapping(mapping, location, walk),
            Value::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.visit(item, &location.index(i), walk);
                }
            }
            Value::Tagged(tagged) => self.visit(&tagged.value, location, walk),
            _ => {}
        }
    }

    fn visit_mapping(&self, mapping: &Mapping, location: &Location, walk: &mut Walk) {
        let related_env = mapping
            .get("name")
            .map(untag)
            .and_then(Value::as_str)
            .is_some_and(|name| name.starts_with(&self.related_image_prefix));

        for (key, value) in mapping {
            // Only string keys are addressable
            let Some(key) = key.as_str() else {
                continue;
            };
            let child = location.key(key);
            let is_candidate =
                self.image_keys.iter().any(|k| k == key) || (related_env && key == "value");

            match untag(value).as_str() {
                Some(raw) if is_candidate => walk.candidate(child, raw),
                _ => self.visit(value, &child, walk),
            }
        }
    }
}

#[derive(Default)]
struct Walk {
    occurrences: Vec<Occurrence>,
    warnings: Vec<ExtractionWarning>,
}

impl Walk {
    fn candidate(&mut self, location: Location, raw: &str) {
        match ImageReference::parse(raw) {
            Ok(reference) => self.occurrences.push(Occurrence {
                location,
                raw: raw.to_string(),
                reference,
            }),
            Err(e) => {
                tracing::warn!(location = %location, raw, error = %e, "Skipping unparseable image reference");
                self.warnings.push(ExtractionWarning {
                    location,
                    raw: raw.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}
