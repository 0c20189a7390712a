//! Registry inspection: tag → digest lookups against container registries.
//!
//! The resolver depends only on the [`RegistryInspector`] trait.
//! [`OciRegistryInspector`] implements it with the `oci-distribution` crate.

use std::time::Duration;

use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::errors::OciDistributionError;
use oci_distribution::manifest::{ImageIndexEntry, OciManifest};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};
use relimg_core::config::ResolverConfig;
use relimg_core::error::{RelimgError, Result};

use super::credentials::CredentialStore;
use super::reference::{canonical_repository, Identity};

/// Why a registry lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("authentication failed: {0}")]
    AuthError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    /// Tag points at a multi-arch index and no single digest could be chosen.
    #[error("tag resolves to a multi-arch index without a single digest (platforms: {})", .platforms.join(", "))]
    AmbiguousManifest { platforms: Vec<String> },

    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid registry reference: {0}")]
    InvalidReference(String),
}

/// Registry inspection capability.
///
/// Returns the digest (`algorithm:hex`) that `registry/repository:tag`
/// currently points at.
#[async_trait]
pub trait RegistryInspector: Send + Sync {
    async fn inspect(
        &self,
        registry: &str,
        repository: &str,
        tag: &str,
    ) -> std::result::Result<String, InspectError>;
}

/// Authentication credentials for a container registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Create authentication from environment variables.
    ///
    /// Reads `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`.
    /// Falls back to anonymous if not set.
    pub fn from_env() -> Self {
        let username = std::env::var("REGISTRY_USERNAME").ok();
        let password = std::env::var("REGISTRY_PASSWORD").ok();

        if username.is_some() && password.is_some() {
            Self { username, password }
        } else {
            Self::anonymous()
        }
    }

    /// Stored credentials for the image's most specific scope, then env
    /// vars, then anonymous.
    pub fn for_identity(identity: &Identity) -> Self {
        match CredentialStore::default_path().and_then(|store| store.lookup(identity)) {
            Ok(Some(credential)) => Self::basic(credential.username, credential.password),
            Ok(None) => Self::from_env(),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable credential store");
                Self::from_env()
            }
        }
    }

    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

/// What to do when a tag points at a multi-arch image index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexPolicy {
    /// Report `AmbiguousManifest`.
    Reject,
    /// Pick the entry for this platform.
    Platform {
        os: String,
        architecture: String,
        variant: Option<String>,
    },
    /// Pin the index digest itself.
    PinIndex,
}

impl IndexPolicy {
    /// Build the policy from resolver settings. `pin_index` wins over `platform`.
    pub fn from_config(config: &ResolverConfig) -> Result<Self> {
        if config.pin_index {
            return Ok(Self::PinIndex);
        }
        match config.platform.as_deref() {
            Some(platform) => Self::parse_platform(platform),
            None => Ok(Self::Reject),
        }
    }

    /// Parse `os/arch[/variant]`.
    pub fn parse_platform(platform: &str) -> Result<Self> {
        let parts: Vec<&str> = platform.split('/').collect();
        match parts.as_slice() {
            [os, arch] if !os.is_empty() && !arch.is_empty() => Ok(Self::Platform {
                os: os.to_string(),
                architecture: arch.to_string(),
                variant: None,
            }),
            [os, arch, variant] if !os.is_empty() && !arch.is_empty() && !variant.is_empty() => {
                Ok(Self::Platform {
                    os: os.to_string(),
                    architecture: arch.to_string(),
                    variant: Some(variant.to_string()),
                })
            }
            _ => Err(RelimgError::ConfigError(format!(
                "invalid platform '{}': expected os/arch[/variant]",
                platform
            ))),
        }
    }

    /// Choose a digest from an index given its own digest and its entries.
    fn select(
        &self,
        index_digest: &str,
        entries: &[PlatformEntry],
    ) -> std::result::Result<String, InspectError> {
        match self {
            Self::PinIndex => Ok(index_digest.to_string()),
            Self::Reject => Err(InspectError::AmbiguousManifest {
                platforms: entries.iter().map(PlatformEntry::label).collect(),
            }),
            Self::Platform {
                os,
                architecture,
                variant,
            } => entries
                .iter()
                .find(|e| {
                    e.os == *os
                        && e.architecture == *architecture
                        && (variant.is_none() || e.variant == *variant)
                })
                .map(|e| e.digest.clone())
                .ok_or_else(|| InspectError::AmbiguousManifest {
                    platforms: entries.iter().map(PlatformEntry::label).collect(),
                }),
        }
    }
}

/// Platform-qualified entry of an image index.
#[derive(Debug, Clone)]
struct PlatformEntry {
    digest: String,
    os: String,
    architecture: String,
    variant: Option<String>,
}

impl PlatformEntry {
    fn from_index_entry(entry: &ImageIndexEntry) -> Self {
        match &entry.platform {
            Some(p) => Self {
                digest: entry.digest.clone(),
                os: p.os.clone(),
                architecture: p.architecture.clone(),
                variant: p.variant.clone(),
            },
            None => Self {
                digest: entry.digest.clone(),
                os: "unknown".to_string(),
                architecture: "unknown".to_string(),
                variant: None,
            },
        }
    }

    fn label(&self) -> String {
        match &self.variant {
            Some(v) => format!("{}/{}/{}", self.os, self.architecture, v),
            None => format!("{}/{}", self.os, self.architecture),
        }
    }
}

/// Registry inspector backed by `oci-distribution`.
pub struct OciRegistryInspector {
    client: Client,
    auth: Option<RegistryAuth>,
    index_policy: IndexPolicy,
}

impl OciRegistryInspector {
    /// Create an inspector; credentials are looked up per registry.
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let protocol = if config.insecure_registries.is_empty() {
            ClientProtocol::Https
        } else {
            ClientProtocol::HttpsExcept(config.insecure_registries.clone())
        };
        let client = Client::new(ClientConfig {
            protocol,
            ..Default::default()
        });

        Ok(Self {
            client,
            auth: None,
            index_policy: IndexPolicy::from_config(config)?,
        })
    }

    /// Use fixed credentials for every registry.
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    fn auth_for(&self, identity: &Identity) -> OciRegistryAuth {
        match &self.auth {
            Some(auth) => auth.to_oci_auth(),
            None => RegistryAuth::for_identity(identity).to_oci_auth(),
        }
    }
}

#[async_trait]
impl RegistryInspector for OciRegistryInspector {
    async fn inspect(
        &self,
        registry: &str,
        repository: &str,
        tag: &str,
    ) -> std::result::Result<String, InspectError> {
        let reference = oci_reference(registry, repository, tag)?;
        tracing::debug!(reference = %reference, "Inspecting manifest");

        let auth = self.auth_for(&Identity {
            registry: registry.to_string(),
            repository: canonical_repository(registry, repository),
        });
        let (manifest, digest) = self
            .client
            .pull_manifest(&reference, &auth)
            .await
            .map_err(classify_error)?;

        match manifest {
            OciManifest::Image(_) => Ok(digest),
            OciManifest::ImageIndex(index) => {
                let entries: Vec<PlatformEntry> = index
                    .manifests
                    .iter()
                    .map(PlatformEntry::from_index_entry)
                    .collect();
                tracing::debug!(
                    reference = %reference,
                    index_digest = %digest,
                    entries = entries.len(),
                    "Tag points at an image index"
                );
                self.index_policy.select(&digest, &entries)
            }
        }
    }
}

/// Build the client reference for `registry/repository:tag`.
fn oci_reference(
    registry: &str,
    repository: &str,
    tag: &str,
) -> std::result::Result<Reference, InspectError> {
    let ref_str = format!(
        "{}/{}:{}",
        registry,
        canonical_repository(registry, repository),
        tag
    );
    ref_str
        .parse::<Reference>()
        .map_err(|e| InspectError::InvalidReference(format!("'{}': {}", ref_str, e)))
}

/// Map client errors onto the inspection failure kinds.
fn classify_error(err: OciDistributionError) -> InspectError {
    match err {
        OciDistributionError::AuthenticationFailure(msg) => InspectError::AuthError(msg),
        OciDistributionError::UnauthorizedError { url } => {
            InspectError::AuthError(format!("unauthorized: {}", url))
        }
        OciDistributionError::ImageManifestNotFoundError(msg) => InspectError::NotFound(msg),
        OciDistributionError::RequestError(e) => InspectError::NetworkError(e.to_string()),
        other => classify_message(other.to_string()),
    }
}

fn classify_message(message: String) -> InspectError {
    let upper = message.to_uppercase();
    if upper.contains("MANIFEST_UNKNOWN")
        || upper.contains("NAME_UNKNOWN")
        || upper.contains("NOT FOUND")
        || upper.contains("404")
    {
        InspectError::NotFound(message)
    } else if upper.contains("UNAUTHORIZED")
        || upper.contains("DENIED")
        || upper.contains("401")
        || upper.contains("403")
    {
        InspectError::AuthError(message)
    } else {
        InspectError::NetworkError(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(digest: &str, os: &str, arch: &str, variant: Option<&str>) -> PlatformEntry {
        PlatformEntry {
            digest: digest.to_string(),
            os: os.to_string(),
            architecture: arch.to_string(),
            variant: variant.map(str::to_string),
        }
    }

    fn sample_index() -> Vec<PlatformEntry> {
        vec![
            entry("sha256:aaa", "linux", "amd64", None),
            entry("sha256:bbb", "linux", "arm64", Some("v8")),
        ]
    }

    #[test]
    fn test_registry_auth_to_oci() {
        assert!(matches!(
            RegistryAuth::anonymous().to_oci_auth(),
            OciRegistryAuth::Anonymous
        ));
        assert!(matches!(
            RegistryAuth::basic("user", "pass").to_oci_auth(),
            OciRegistryAuth::Basic(_, _)
        ));
    }

    #[test]
    fn test_parse_platform() {
        assert_eq!(
            IndexPolicy::parse_platform("linux/amd64").unwrap(),
            IndexPolicy::Platform {
                os: "linux".to_string(),
                architecture: "amd64".to_string(),
                variant: None,
            }
        );
        assert!(matches!(
            IndexPolicy::parse_platform("linux/arm64/v8").unwrap(),
            IndexPolicy::Platform { variant: Some(_), .. }
        ));
        assert!(IndexPolicy::parse_platform("linux").is_err());
        assert!(IndexPolicy::parse_platform("linux//v8").is_err());
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = ResolverConfig::default();
        assert_eq!(IndexPolicy::from_config(&config).unwrap(), IndexPolicy::Reject);

        config.platform = Some("linux/amd64".to_string());
        assert!(matches!(
            IndexPolicy::from_config(&config).unwrap(),
            IndexPolicy::Platform { .. }
        ));

        config.pin_index = true;
        assert_eq!(IndexPolicy::from_config(&config).unwrap(), IndexPolicy::PinIndex);
    }

    #[test]
    fn test_reject_reports_platforms() {
        let err = IndexPolicy::Reject
            .select("sha256:index", &sample_index())
            .unwrap_err();
        assert_eq!(
            err,
            InspectError::AmbiguousManifest {
                platforms: vec!["linux/amd64".to_string(), "linux/arm64/v8".to_string()],
            }
        );
        assert!(err.to_string().contains("linux/amd64, linux/arm64/v8"));
    }

    #[test]
    fn test_platform_selects_entry() {
        let policy = IndexPolicy::parse_platform("linux/arm64").unwrap();
        assert_eq!(policy.select("sha256:index", &sample_index()).unwrap(), "sha256:bbb");

        let policy = IndexPolicy::parse_platform("linux/arm64/v7").unwrap();
        assert!(policy.select("sha256:index", &sample_index()).is_err());
    }

    #[test]
    fn test_pin_index_uses_index_digest() {
        assert_eq!(
            IndexPolicy::PinIndex
                .select("sha256:index", &sample_index())
                .unwrap(),
            "sha256:index"
        );
    }

    #[test]
    fn test_oci_reference_adds_docker_hub_library() {
        let reference = oci_reference("docker.io", "memcached", "1.4.36-alpine").unwrap();
        assert_eq!(reference.registry(), "docker.io");
        assert_eq!(reference.repository(), "library/memcached");
        assert_eq!(reference.tag(), Some("1.4.36-alpine"));

        let reference = oci_reference("quay.io", "org/app", "v1").unwrap();
        assert_eq!(reference.registry(), "quay.io");
        assert_eq!(reference.repository(), "org/app");
    }

    #[test]
    fn test_classify_message() {
        assert!(matches!(
            classify_message("MANIFEST_UNKNOWN: manifest unknown".to_string()),
            InspectError::NotFound(_)
        ));
        assert!(matches!(
            classify_message("DENIED: requested access to the resource is denied".to_string()),
            InspectError::AuthError(_)
        ));
        assert!(matches!(
            classify_message("connection reset by peer".to_string()),
            InspectError::NetworkError(_)
        ));
    }

    #[test]
    fn test_inspector_construction() {
        let config = ResolverConfig {
            insecure_registries: vec!["localhost:5000".to_string()],
            ..Default::default()
        };
        let inspector = OciRegistryInspector::new(&config)
            .unwrap()
            .with_auth(RegistryAuth::basic("u", "p"));
        let identity = Identity {
            registry: "quay.io".to_string(),
            repository: "org/app".to_string(),
        };
        assert!(matches!(inspector.auth_for(&identity), OciRegistryAuth::Basic(_, _)));

        let bad = ResolverConfig {
            platform: Some("amd64".to_string()),
            ..Default::default()
        };
        assert!(OciRegistryInspector::new(&bad).is_err());
    }
}
