//! Disconnected-capability marker.

use relimg_core::config::AnnotationConfig;
use relimg_core::error::Result;
use serde_yaml::Value;

use super::document::ManifestDocument;

/// Older annotation listing infrastructure features as a JSON string array.
pub const LEGACY_INFRASTRUCTURE_FEATURES: &str = "operators.openshift.io/infrastructure-features";

const LEGACY_DISCONNECTED_FEATURE: &str = "disconnected";

/// Sets the disconnected annotation under `metadata.annotations`.
#[derive(Debug, Clone, Default)]
pub struct Annotator {
    config: AnnotationConfig,
}

impl Annotator {
    pub fn new(config: AnnotationConfig) -> Self {
        Self { config }
    }

    /// Apply the annotation. Returns whether the document changed.
    ///
    /// Also adds `disconnected` to the legacy infrastructure-features list
    /// when that annotation is present and readable.
    pub fn annotate(&self, doc: &mut ManifestDocument) -> Result<bool> {
        let annotations =
            doc.ensure_mapping(&["metadata".to_string(), "annotations".to_string()])?;

        let key = self.config.key.as_str();
        let mut changed = false;
        if annotations.get(key).and_then(Value::as_str) != Some(self.config.value.as_str()) {
            annotations.insert(
                Value::String(key.to_string()),
                Value::String(self.config.value.clone()),
            );
            changed = true;
        }

        if let Some(legacy) = annotations.get_mut(LEGACY_INFRASTRUCTURE_FEATURES) {
            changed |= merge_legacy_feature(legacy)?;
        }

        if changed {
            tracing::debug!(annotation = key, "Marked manifest as disconnected-capable");
        }
        Ok(changed)
    }
}

/// Annotate with the default key and value.
pub fn annotate(doc: &mut ManifestDocument) -> Result<bool> {
    Annotator::default().annotate(doc)
}

fn merge_legacy_feature(legacy: &mut Value) -> Result<bool> {
    let features = legacy
        .as_str()
        .map(serde_json::from_str::<Vec<String>>);

    let mut features = match features {
        Some(Ok(features)) => features,
        Some(Err(e)) => {
            tracing::warn!(annotation = LEGACY_INFRASTRUCTURE_FEATURES, error = %e, "Leaving unreadable legacy annotation unchanged");
            return Ok(false);
        }
        None => {
            tracing::warn!(annotation = LEGACY_INFRASTRUCTURE_FEATURES, "Leaving non-string legacy annotation unchanged");
            return Ok(false);
        }
    };

    if features.iter().any(|f| f == LEGACY_DISCONNECTED_FEATURE) {
        return Ok(false);
    }
    features.push(LEGACY_DISCONNECTED_FEATURE.to_string());
    *legacy = Value::String(serde_json::to_string(&features)?);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::document::Location;

    fn annotation(doc: &ManifestDocument, key: &str) -> Option<String> {
        doc.get_str(&Location::from_keys(["metadata", "annotations", key]))
            .map(str::to_string)
    }

    const KEY: &str = "features.operators.openshift.io/disconnected";

    #[test]
    fn test_annotate_creates_maps() {
        let mut doc = ManifestDocument::from_yaml_str("spec: {}\n").unwrap();
        assert!(annotate(&mut doc).unwrap());
        assert_eq!(annotation(&doc, KEY).as_deref(), Some("true"));
    }

    #[test]
    fn test_annotate_is_idempotent() {
        let mut doc =
            ManifestDocument::from_yaml_str("metadata:\n  name: x\n  annotations:\n").unwrap();
        assert!(annotate(&mut doc).unwrap());
        let once = doc.clone();
        assert!(!annotate(&mut doc).unwrap());
        assert_eq!(doc, once);
    }

    #[test]
    fn test_annotate_overwrites_other_value() {
        let yaml = format!("metadata:\n  annotations:\n    {}: \"false\"\n    other: kept\n", KEY);
        let mut doc = ManifestDocument::from_yaml_str(&yaml).unwrap();
        assert!(annotate(&mut doc).unwrap());
        assert_eq!(annotation(&doc, KEY).as_deref(), Some("true"));
        assert_eq!(annotation(&doc, "other").as_deref(), Some("kept"));
    }

    #[test]
    fn test_annotate_custom_key() {
        let annotator = Annotator::new(AnnotationConfig {
            key: "example.com/offline".to_string(),
            value: "yes".to_string(),
        });
        let mut doc = ManifestDocument::from_yaml_str("metadata: {}\n").unwrap();
        assert!(annotator.annotate(&mut doc).unwrap());
        assert_eq!(annotation(&doc, "example.com/offline").as_deref(), Some("yes"));
        assert_eq!(annotation(&doc, KEY), None);
    }

    #[test]
    fn test_annotate_merges_legacy_features() {
        let yaml = format!(
            "metadata:\n  annotations:\n    {}: '[\"proxy-aware\"]'\n",
            LEGACY_INFRASTRUCTURE_FEATURES
        );
        let mut doc = ManifestDocument::from_yaml_str(&yaml).unwrap();
        assert!(annotate(&mut doc).unwrap());
        assert_eq!(
            annotation(&doc, LEGACY_INFRASTRUCTURE_FEATURES).as_deref(),
            Some(r#"["proxy-aware","disconnected"]"#)
        );
        assert!(!annotate(&mut doc).unwrap());
    }

    #[test]
    fn test_annotate_leaves_bad_legacy_value() {
        let yaml = format!(
            "metadata:\n  annotations:\n    {}: not-json\n",
            LEGACY_INFRASTRUCTURE_FEATURES
        );
        let mut doc = ManifestDocument::from_yaml_str(&yaml).unwrap();
        assert!(annotate(&mut doc).unwrap());
        assert_eq!(
            annotation(&doc, LEGACY_INFRASTRUCTURE_FEATURES).as_deref(),
            Some("not-json")
        );
    }

    #[test]
    fn test_annotate_rejects_non_mapping_metadata() {
        let mut doc = ManifestDocument::from_yaml_str("metadata: [1, 2]\n").unwrap();
        assert!(annotate(&mut doc).is_err());
    }
}
