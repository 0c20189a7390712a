use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{RelimgError, Result};

/// Default prefix of environment variables that carry related images.
pub const DEFAULT_RELATED_IMAGE_PREFIX: &str = "RELATED_IMAGE_";

/// Default dotted path of the related-images list in a bundle manifest.
pub const DEFAULT_RELATED_IMAGES_PATH: &str = "spec.relatedImages";

/// Default annotation marking an Operator as disconnected-capable.
pub const DEFAULT_DISCONNECTED_ANNOTATION: &str = "features.operators.openshift.io/disconnected";

/// Configuration for a pin run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelimgConfig {
    /// Env var name prefix that marks a `value` as an image reference
    pub related_image_prefix: String,

    /// Keys whose string values are image references
    pub image_keys: Vec<String>,

    /// Dotted path of the related-images list (e.g. `spec.relatedImages`)
    pub related_images_path: String,

    /// Disconnected-capability marker
    pub annotation: AnnotationConfig,

    /// Digest resolution settings
    pub resolver: ResolverConfig,

    /// Apply the resolvable subset when some references fail
    pub allow_partial: bool,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for RelimgConfig {
    fn default() -> Self {
        Self {
            related_image_prefix: DEFAULT_RELATED_IMAGE_PREFIX.to_string(),
            image_keys: vec!["image".to_string()],
            related_images_path: DEFAULT_RELATED_IMAGES_PATH.to_string(),
            annotation: AnnotationConfig::default(),
            resolver: ResolverConfig::default(),
            allow_partial: false,
            log_level: LogLevel::Info,
        }
    }
}

impl RelimgConfig {
    /// Load configuration from a YAML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            RelimgError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_yaml::from_str(&data).map_err(|e| {
            RelimgError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.related_image_prefix.is_empty() {
            return Err(RelimgError::ConfigError(
                "related_image_prefix must not be empty".to_string(),
            ));
        }
        if self.image_keys.iter().any(|k| k.is_empty()) {
            return Err(RelimgError::ConfigError(
                "image_keys must not contain empty keys".to_string(),
            ));
        }
        if self.related_images_path.split('.').any(|s| s.is_empty()) {
            return Err(RelimgError::ConfigError(format!(
                "invalid related_images_path '{}'",
                self.related_images_path
            )));
        }
        if self.annotation.key.is_empty() {
            return Err(RelimgError::ConfigError(
                "annotation.key must not be empty".to_string(),
            ));
        }
        if self.resolver.max_concurrency == 0 {
            return Err(RelimgError::ConfigError(
                "resolver.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.resolver.timeout_secs == 0 {
            return Err(RelimgError::ConfigError(
                "resolver.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Related-images path split into its map keys.
    pub fn related_images_keys(&self) -> Vec<String> {
        self.related_images_path
            .split('.')
            .map(str::to_string)
            .collect()
    }
}

/// Annotation written by the disconnected-capability annotator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Annotation key under `metadata.annotations`
    pub key: String,

    /// Annotation value
    pub value: String,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_DISCONNECTED_ANNOTATION.to_string(),
            value: "true".to_string(),
        }
    }
}

/// Digest resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Per-lookup timeout in seconds
    pub timeout_secs: u64,

    /// Maximum concurrent registry lookups
    pub max_concurrency: usize,

    /// Platform (`os/arch[/variant]`) to select from multi-arch indexes
    pub platform: Option<String>,

    /// Pin the multi-arch index digest itself instead of rejecting it
    pub pin_index: bool,

    /// Registries reached over plain HTTP
    pub insecure_registries: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_concurrency: 8,
            platform: None,
            pin_index: false,
            insecure_registries: Vec::new(),
        }
    }
}

impl ResolverConfig {
    /// Per-lookup timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!(
                "unknown log level: '{}' (supported: debug, info, warn, error)",
                s
            )),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines (default).
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: '{}' (supported: text, json)", s)),
        }
    }
}
