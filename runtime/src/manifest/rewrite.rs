//! Location-targeted replacement of tag-form references.

use std::collections::HashMap;

use relimg_core::error::{RelimgError, Result};

use super::document::ManifestDocument;
use super::extract::{Extractor, Occurrence};
use crate::oci::{ImageReference, ReferenceForm};

/// Tag-form reference → digest-form reference.
///
/// Every pair shares one identity, and the target is always digest form.
#[derive(Debug, Clone, Default)]
pub struct RewriteMapping {
    pairs: Vec<(ImageReference, ImageReference)>,
    by_tag: HashMap<String, usize>,
}

impl RewriteMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from `(old, new)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ImageReference, ImageReference)>,
    {
        let mut mapping = Self::new();
        for (old, new) in pairs {
            mapping.insert(old, new)?;
        }
        Ok(mapping)
    }

    /// Add a pair. A later pair for the same tag-form reference replaces the earlier one.
    pub fn insert(&mut self, old: ImageReference, new: ImageReference) -> Result<()> {
        if !old.is_tag_form() {
            return Err(RelimgError::PreconditionError(format!(
                "mapping source '{}' is not a tag-form reference",
                old
            )));
        }
        if !new.is_digest_form() {
            return Err(RelimgError::PreconditionError(format!(
                "mapping target '{}' is not a digest-form reference",
                new
            )));
        }
        if old.identity() != new.identity() {
            return Err(RelimgError::PreconditionError(format!(
                "mapping '{}' -> '{}' changes image identity",
                old, new
            )));
        }

        let key = old.render(ReferenceForm::Tag)?;
        match self.by_tag.get(&key) {
            Some(&i) => self.pairs[i] = (old, new),
            None => {
                self.by_tag.insert(key, self.pairs.len());
                self.pairs.push((old, new));
            }
        }
        Ok(())
    }

    /// Digest-form target for a tag-form reference.
    pub fn get(&self, old: &ImageReference) -> Option<&ImageReference> {
        if !old.is_tag_form() {
            return None;
        }
        let key = old.render(ReferenceForm::Tag).ok()?;
        self.by_tag.get(&key).map(|&i| &self.pairs[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ImageReference, ImageReference)> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Replaces mapped references at their exact locations.
///
/// The input document is never modified. Unmatched scalars, including other
/// text that happens to contain the same reference, are left alone.
#[derive(Debug, Clone, Default)]
pub struct Rewriter {
    extractor: Extractor,
}

impl Rewriter {
    pub fn new(extractor: Extractor) -> Self {
        Self { extractor }
    }

    /// Extract occurrences from `doc` and rewrite the mapped ones.
    pub fn rewrite(
        &self,
        doc: &ManifestDocument,
        mapping: &RewriteMapping,
    ) -> Result<ManifestDocument> {
        let (occurrences, _) = self.extractor.extract(doc);
        self.rewrite_occurrences(doc, &occurrences, mapping)
    }

    /// Rewrite previously extracted occurrences.
    ///
    /// Fails with a `ManifestError` if an occurrence's scalar no longer
    /// matches what was extracted.
    pub fn rewrite_occurrences(
        &self,
        doc: &ManifestDocument,
        occurrences: &[Occurrence],
        mapping: &RewriteMapping,
    ) -> Result<ManifestDocument> {
        let mut out = doc.clone();
        let mut rewritten = 0usize;

        for occurrence in occurrences {
            let Some(target) = mapping.get(&occurrence.reference) else {
                continue;
            };

            match out.get_str(&occurrence.location) {
                Some(current) if current == occurrence.raw => {}
                Some(current) => {
                    return Err(RelimgError::manifest(
                        &occurrence.location,
                        format!("expected '{}', found '{}'", occurrence.raw, current),
                    ))
                }
                None => {
                    return Err(RelimgError::manifest(
                        &occurrence.location,
                        format!("expected '{}', found no string scalar", occurrence.raw),
                    ))
                }
            }

            let pinned = target.render(ReferenceForm::Digest)?;
            out.set_str(&occurrence.location, &pinned)?;
            tracing::debug!(location = %occurrence.location, from = %occurrence.raw, to = %pinned, "Rewrote image reference");
            rewritten += 1;
        }

        tracing::debug!(rewritten, "Rewrite complete");
        Ok(out)
    }
}
