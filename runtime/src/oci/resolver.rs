//! Tag → digest resolution with a run-scoped cache and bounded fan-out.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use relimg_core::config::ResolverConfig;
use relimg_core::error::RelimgError;
use tokio_util::sync::CancellationToken;

use super::reference::{ImageReference, ReferenceForm};
use super::registry::{InspectError, RegistryInspector};
use crate::cache::resolution_cache::{CacheLookup, ResolutionCache};

/// A reference whose digest could not be looked up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reference}: {cause}")]
pub struct ResolutionFailure {
    pub reference: ImageReference,
    pub cause: InspectError,
}

/// Error returned by [`DigestResolver::resolve`].
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Contract violation or other fatal condition.
    #[error(transparent)]
    Fatal(#[from] RelimgError),

    /// The lookup for this reference failed; other references are unaffected.
    #[error(transparent)]
    Failed(ResolutionFailure),
}

/// Result of resolving a batch of references.
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    /// `(tag-form, digest-form)` pairs in first-discovery order.
    pub resolved: Vec<(ImageReference, ImageReference)>,
    /// Failed lookups in first-discovery order.
    pub failures: Vec<ResolutionFailure>,
}

impl ResolutionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Resolves tag-form references to digest-form references.
pub struct DigestResolver {
    inspector: Arc<dyn RegistryInspector>,
    cache: ResolutionCache,
    timeout: Duration,
    max_concurrency: usize,
}

impl DigestResolver {
    /// Create a resolver with a fresh cache.
    pub fn new(inspector: Arc<dyn RegistryInspector>, config: &ResolverConfig) -> Self {
        Self {
            inspector,
            cache: ResolutionCache::new(),
            timeout: config.timeout(),
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// Override the per-lookup timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Resolve one tag-form reference.
    ///
    /// A digest-form input is a caller bug and yields a fatal
    /// `PreconditionError`; registry problems yield [`ResolveError::Failed`].
    pub async fn resolve(
        &self,
        reference: &ImageReference,
    ) -> std::result::Result<ImageReference, ResolveError> {
        let tag = match (&reference.tag, &reference.digest) {
            (Some(tag), None) => tag.as_str(),
            _ => {
                return Err(RelimgError::PreconditionError(format!(
                    "cannot resolve '{}': not a tag-form reference",
                    reference
                ))
                .into())
            }
        };
        let key = lookup_key(reference, tag);

        let timeout = self.timeout;
        let lookup = self
            .cache
            .get_or_resolve(&key, || async move {
                let digest = tokio::time::timeout(
                    timeout,
                    self.inspector
                        .inspect(&reference.registry, &reference.repository, tag),
                )
                .await
                .map_err(|_| InspectError::Timeout(timeout))??;

                // Reject malformed digests before they reach the cache
                ImageReference::parse(&format!(
                    "{}/{}@{}",
                    reference.registry, reference.repository, digest
                ))
                .map_err(|e| {
                    InspectError::NetworkError(format!("registry returned bad digest: {}", e))
                })?;
                Ok::<String, InspectError>(digest)
            })
            .await;

        match lookup {
            Ok(CacheLookup::Hit(digest)) => {
                tracing::debug!(reference = %key, digest = %digest, "Resolved from cache");
                Ok(reference.with_digest(digest))
            }
            Ok(CacheLookup::Fresh(digest)) => {
                tracing::debug!(reference = %key, digest = %digest, "Resolved from registry");
                Ok(reference.with_digest(digest))
            }
            Err(cause) => {
                tracing::warn!(reference = %key, cause = %cause, "Digest resolution failed");
                Err(ResolveError::Failed(ResolutionFailure {
                    reference: reference.clone(),
                    cause,
                }))
            }
        }
    }

    /// Resolve every distinct tag-form reference in `references`.
    ///
    /// Digest-form references are skipped. Lookups run concurrently up to
    /// the configured limit; the report keeps first-discovery order.
    /// Cancelling `cancel` aborts the batch with [`RelimgError::Cancelled`].
    pub async fn resolve_all(
        &self,
        references: &[ImageReference],
        cancel: &CancellationToken,
    ) -> relimg_core::Result<ResolutionReport> {
        let mut seen = HashSet::new();
        let unique: Vec<&ImageReference> = references
            .iter()
            .filter(|r| r.is_tag_form())
            .filter(|r| seen.insert(r.full_reference()))
            .collect();

        tracing::info!(
            references = unique.len(),
            concurrency = self.max_concurrency,
            "Resolving image digests"
        );

        let lookups = stream::iter(unique)
            .map(|reference| async move { (reference, self.resolve(reference).await) })
            .buffered(self.max_concurrency)
            .collect::<Vec<_>>();

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(RelimgError::Cancelled(
                    "digest resolution interrupted".to_string(),
                ));
            }
            results = lookups => results,
        };

        let mut report = ResolutionReport::default();
        for (reference, result) in results {
            match result {
                Ok(pinned) => report.resolved.push((reference.clone(), pinned)),
                Err(ResolveError::Failed(failure)) => report.failures.push(failure),
                Err(ResolveError::Fatal(e)) => return Err(e),
            }
        }

        tracing::info!(
            resolved = report.resolved.len(),
            failed = report.failures.len(),
            cached = self.cache.len(),
            "Digest resolution finished"
        );
        Ok(report)
    }
}

/// Cache key for a tag lookup; spellings of one identity share it.
fn lookup_key(reference: &ImageReference, tag: &str) -> String {
    format!("{}:{}", reference.identity(), tag)
}
