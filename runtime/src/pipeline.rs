//! One pin run over one manifest document.
//!
//! extract → resolve → policy → rewrite → related images → annotate
//!
//! The run owns its document and resolution cache. Nothing is written to disk
//! here; callers decide what to do with the outcome.

use std::sync::Arc;
use std::time::Duration;

use relimg_core::config::RelimgConfig;
use relimg_core::error::Result;
use tokio_util::sync::CancellationToken;

use crate::manifest::{
    merge_related_images, synthesize, Annotator, ExtractionWarning, Extractor, ManifestDocument,
    Occurrence, RelatedImageEntry, RewriteMapping, Rewriter,
};
use crate::oci::{DigestResolver, ImageReference, RegistryInspector, ResolutionFailure};

/// Everything a pin run produced.
#[derive(Debug, Clone)]
pub struct PinOutcome {
    /// Output document. Equal to the input when the run was not applied.
    pub document: ManifestDocument,
    pub occurrences: Vec<Occurrence>,
    pub warnings: Vec<ExtractionWarning>,
    /// `(tag-form, digest-form)` pairs in first-discovery order.
    pub resolved: Vec<(ImageReference, ImageReference)>,
    pub failures: Vec<ResolutionFailure>,
    /// Entries synthesized for this run (before merging).
    pub related_images: Vec<RelatedImageEntry>,
    /// The disconnected annotation was added or changed.
    pub annotated: bool,
    /// Rewrites were applied to `document`.
    pub applied: bool,
}

impl PinOutcome {
    /// No lookup failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Output differs from the input document.
    pub fn has_changes(&self, input: &ManifestDocument) -> bool {
        self.document != *input
    }
}

/// Pins every image reference in a manifest.
pub struct Pipeline {
    config: RelimgConfig,
    inspector: Arc<dyn RegistryInspector>,
    lookup_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(config: RelimgConfig, inspector: Arc<dyn RegistryInspector>) -> Self {
        Self {
            config,
            inspector,
            lookup_timeout: None,
        }
    }

    /// Override the configured per-lookup timeout.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> &RelimgConfig {
        &self.config
    }

    /// Run over `doc`. The input is not modified.
    ///
    /// Failed lookups are reported in the outcome. With failures and
    /// `allow_partial` off, the returned document equals the input.
    pub async fn run(
        &self,
        doc: &ManifestDocument,
        cancel: &CancellationToken,
    ) -> Result<PinOutcome> {
        let extractor = Extractor::new(&self.config);
        let (occurrences, warnings) = extractor.extract(doc);
        tracing::info!(
            occurrences = occurrences.len(),
            warnings = warnings.len(),
            "Discovered image references"
        );

        let pending: Vec<ImageReference> = occurrences
            .iter()
            .filter(|o| o.reference.is_tag_form())
            .map(|o| o.reference.clone())
            .collect();

        let mut resolver = DigestResolver::new(Arc::clone(&self.inspector), &self.config.resolver);
        if let Some(timeout) = self.lookup_timeout {
            resolver = resolver.with_timeout(timeout);
        }
        let report = resolver.resolve_all(&pending, cancel).await?;
        tracing::info!(
            resolved = report.resolved.len(),
            failed = report.failures.len(),
            "Resolved image references"
        );

        let mut outcome = PinOutcome {
            document: doc.clone(),
            occurrences,
            warnings,
            resolved: report.resolved,
            failures: report.failures,
            related_images: Vec::new(),
            annotated: false,
            applied: false,
        };

        if !outcome.failures.is_empty() && !self.config.allow_partial {
            tracing::warn!(
                failed = outcome.failures.len(),
                "Not applying changes: some references could not be resolved"
            );
            return Ok(outcome);
        }

        let mapping = RewriteMapping::from_pairs(outcome.resolved.iter().cloned())?;
        let mut document = Rewriter::new(extractor).rewrite_occurrences(
            doc,
            &outcome.occurrences,
            &mapping,
        )?;

        // Already pinned references are inventoried alongside resolved ones.
        // Occurrences left unresolved contribute nothing, so an entry's name
        // and digest always come from the same occurrence.
        let pinned: Vec<(ImageReference, ImageReference)> = outcome
            .occurrences
            .iter()
            .filter_map(|occurrence| {
                let target = if occurrence.reference.is_digest_form() {
                    Some(&occurrence.reference)
                } else {
                    mapping.get(&occurrence.reference)
                };
                target.map(|t| (occurrence.reference.clone(), t.clone()))
            })
            .collect();

        let related = synthesize(&pinned)?;
        let merged = merge_related_images(
            &mut document,
            &related,
            &self.config.related_images_keys(),
        )?;
        tracing::info!(
            entries = related.len(),
            changed = merged,
            "Updated related images"
        );

        outcome.annotated = Annotator::new(self.config.annotation.clone()).annotate(&mut document)?;
        outcome.related_images = related;
        outcome.document = document;
        outcome.applied = true;
        Ok(outcome)
    }
}
