//! OCI image reference parsing.
//!
//! Parses image references like `docker.io/memcached:1.4.36-alpine` or
//! `quay.io/org/operator@sha256:...` into structured components.

use relimg_core::error::{RelimgError, Result};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Digest algorithms accepted after `@`.
const DIGEST_ALGORITHMS: &[&str] = &["sha256", "sha384", "sha512"];

/// Rendering form for [`ImageReference::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceForm {
    /// `registry/repository:tag`
    Tag,
    /// `registry/repository@algorithm:hex`
    Digest,
}

/// Image identity: registry plus repository, regardless of tag or digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub registry: String,
    pub repository: String,
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)
    }
}

/// Parsed OCI image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry hostname, optionally with port (e.g., "quay.io", "localhost:5000")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "org/operator")
    pub repository: String,
    /// Tag (e.g., "latest", "1.4.36-alpine")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `nginx:1.25` → docker.io/library/nginx:1.25
    /// - `myuser/myimage` → docker.io/myuser/myimage:latest
    /// - `quay.io/org/image:tag` → quay.io/org/image:tag
    /// - `quay.io/org/image@sha256:abc...` → quay.io/org/image@sha256:abc...
    ///
    /// Templated placeholders (`{{ .Values.image }}`, `${IMAGE}`) are rejected
    /// because they are not concrete references yet.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(RelimgError::parse(reference, "empty image reference"));
        }

        // Split off digest first (@ separator)
        let (name_tag, digest) = match reference.rfind('@') {
            Some(at_pos) => {
                let digest = &reference[at_pos + 1..];
                validate_digest(reference, digest)?;
                (&reference[..at_pos], Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // Split tag on the last colon after the last slash
        let (name, tag) = match name_tag.rfind('/') {
            Some(slash_pos) => {
                let after_slash = &name_tag[slash_pos + 1..];
                match after_slash.rfind(':') {
                    Some(colon_pos) => (
                        &name_tag[..slash_pos + 1 + colon_pos],
                        Some(&after_slash[colon_pos + 1..]),
                    ),
                    None => (name_tag, None),
                }
            }
            // Without a slash there is no registry, so any colon starts a tag
            None => match name_tag.rfind(':') {
                Some(colon_pos) => (&name_tag[..colon_pos], Some(&name_tag[colon_pos + 1..])),
                None => (name_tag, None),
            },
        };

        if let Some(tag) = tag {
            validate_tag(reference, tag)?;
        }

        let (registry, repository) = Self::split_registry_repository(reference, name)?;

        // Apply default tag if no tag and no digest
        let tag = match (tag, &digest) {
            (Some(tag), _) => Some(tag.to_string()),
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (None, Some(_)) => None,
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Split a name into registry and repository components.
    fn split_registry_repository(reference: &str, name: &str) -> Result<(String, String)> {
        // The first component is a registry when it looks like a hostname
        // (contains a dot or colon, or is "localhost")
        let registry_end = name.find('/').filter(|&slash_pos| {
            let first = &name[..slash_pos];
            first.contains('.') || first.contains(':') || first == "localhost"
        });

        let (registry, repository) = match registry_end {
            Some(slash_pos) => (
                name[..slash_pos].to_string(),
                name[slash_pos + 1..].to_string(),
            ),
            None => {
                let repository = if name.contains('/') {
                    name.to_string()
                } else {
                    // Single name like "nginx" → "library/nginx" for Docker Hub
                    format!("library/{}", name)
                };
                (DEFAULT_REGISTRY.to_string(), repository)
            }
        };

        validate_registry(reference, &registry)?;
        validate_repository(reference, &repository)?;
        Ok((registry, repository))
    }

    /// Registry and canonical repository, used for grouping and deduplication.
    ///
    /// `docker.io/memcached` and `memcached` share the identity
    /// `docker.io/library/memcached`.
    pub fn identity(&self) -> Identity {
        Identity {
            registry: self.registry.clone(),
            repository: canonical_repository(&self.registry, &self.repository),
        }
    }

    /// Last path segment of the repository (e.g. "memcached").
    pub fn name(&self) -> &str {
        self.repository
            .rsplit('/')
            .next()
            .unwrap_or(&self.repository)
    }

    /// True when the reference carries a tag and no digest.
    pub fn is_tag_form(&self) -> bool {
        self.tag.is_some() && self.digest.is_none()
    }

    /// True when the reference is pinned by digest.
    pub fn is_digest_form(&self) -> bool {
        self.digest.is_some()
    }

    /// Render the reference in the requested canonical form.
    pub fn render(&self, form: ReferenceForm) -> Result<String> {
        match form {
            ReferenceForm::Tag => {
                let tag = self.tag.as_ref().ok_or_else(|| {
                    RelimgError::StateError(format!("reference '{}' has no tag", self))
                })?;
                Ok(format!("{}/{}:{}", self.registry, self.repository, tag))
            }
            ReferenceForm::Digest => {
                let digest = self.digest.as_ref().ok_or_else(|| {
                    RelimgError::StateError(format!("reference '{}' has no digest", self))
                })?;
                Ok(format!("{}/{}@{}", self.registry, self.repository, digest))
            }
        }
    }

    /// Derive a digest-form reference with the same identity.
    pub fn with_digest(&self, digest: impl Into<String>) -> ImageReference {
        ImageReference {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: None,
            digest: Some(digest.into()),
        }
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

impl std::str::FromStr for ImageReference {
    type Err = RelimgError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Repository path as the registry serves it.
///
/// Docker Hub keeps single-segment repositories under `library/`; every other
/// registry is taken as written.
pub fn canonical_repository(registry: &str, repository: &str) -> String {
    if registry == DEFAULT_REGISTRY && !repository.contains('/') {
        format!("library/{}", repository)
    } else {
        repository.to_string()
    }
}

fn validate_digest(reference: &str, digest: &str) -> Result<()> {
    let (algorithm, encoded) = digest.split_once(':').ok_or_else(|| {
        RelimgError::parse(reference, "invalid digest format: expected algorithm:hex")
    })?;
    if !DIGEST_ALGORITHMS.contains(&algorithm) {
        return Err(RelimgError::parse(
            reference,
            format!("unrecognized digest algorithm '{}'", algorithm),
        ));
    }
    if encoded.is_empty() || !encoded.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
        return Err(RelimgError::parse(
            reference,
            "digest must be lowercase hexadecimal",
        ));
    }
    Ok(())
}

fn validate_tag(reference: &str, tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(RelimgError::parse(reference, "empty tag"));
    }
    if let Some(c) = tag
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(RelimgError::parse(
            reference,
            format!("invalid character '{}' in tag", c),
        ));
    }
    Ok(())
}

fn validate_registry(reference: &str, registry: &str) -> Result<()> {
    if registry.is_empty()
        || !registry
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
    {
        return Err(RelimgError::parse(
            reference,
            format!("invalid registry '{}'", registry),
        ));
    }
    Ok(())
}

fn validate_repository(reference: &str, repository: &str) -> Result<()> {
    if repository.is_empty() {
        return Err(RelimgError::parse(reference, "no repository path"));
    }
    for segment in repository.split('/') {
        if segment.is_empty() {
            return Err(RelimgError::parse(
                reference,
                "empty segment in repository path",
            ));
        }
        if let Some(c) = segment
            .chars()
            .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '.' | '_' | '-'))
        {
            return Err(RelimgError::parse(
                reference,
                format!("invalid character '{}' in repository path", c),
            ));
        }
    }
    Ok(())
}
