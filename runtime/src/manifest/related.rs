//! Related-images inventory: synthesis from resolved references and merge
//! into the manifest's list.

use std::collections::HashSet;

use relimg_core::error::{RelimgError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::document::{Location, ManifestDocument};
use crate::oci::{ImageReference, ReferenceForm};

/// One `{name, image}` entry of the related-images list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedImageEntry {
    pub name: String,
    pub image: String,
}

/// Build one entry per identity from `(source, pinned)` pairs in discovery order.
///
/// The first pair of each identity supplies both the name (derived from its
/// source reference) and the digest. Names are made unique with `-2`, `-3`,
/// ... suffixes.
pub fn synthesize(pinned: &[(ImageReference, ImageReference)]) -> Result<Vec<RelatedImageEntry>> {
    let mut seen = HashSet::new();
    let mut taken = HashSet::new();
    let mut entries = Vec::new();

    for (source, target) in pinned {
        if !seen.insert(source.identity()) {
            continue;
        }

        let base = base_name(source);
        let mut name = base.clone();
        let mut suffix = 2;
        while taken.contains(&name) {
            name = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        taken.insert(name.clone());

        entries.push(RelatedImageEntry {
            name,
            image: target.render(ReferenceForm::Digest)?,
        });
    }

    Ok(entries)
}

/// Derive an entry name such as `memcached-1.4.36` from a reference.
fn base_name(reference: &ImageReference) -> String {
    let name = match &reference.tag {
        Some(tag) => {
            let version = tag.split('-').next().filter(|v| !v.is_empty()).unwrap_or(tag);
            format!("{}-{}", reference.name(), version)
        }
        None => reference.name().to_string(),
    };
    name.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Merge synthesized entries into the list at `path`, creating it if absent.
///
/// An existing entry with the same image is kept as is. Otherwise an entry
/// with the same name is replaced in place, or the new entry is appended.
/// Entries without a synthesized counterpart are never touched. Returns the
/// number of entries added or replaced.
pub fn merge_related_images(
    doc: &mut ManifestDocument,
    entries: &[RelatedImageEntry],
    path: &[String],
) -> Result<usize> {
    let (list_key, parent_keys) = path
        .split_last()
        .ok_or_else(|| RelimgError::ConfigError("empty related images path".to_string()))?;
    let location = Location::from_keys(path.iter().map(String::as_str));

    let parent = doc.ensure_mapping(parent_keys)?;
    let list = parent
        .entry(Value::String(list_key.clone()))
        .or_insert(Value::Null);
    if list.is_null() {
        *list = Value::Sequence(Vec::new());
    }
    let list = list
        .as_sequence_mut()
        .ok_or_else(|| RelimgError::manifest(&location, "expected a sequence"))?;

    let mut changed = 0;
    for entry in entries {
        let field = |item: &Value, key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);

        if list
            .iter()
            .any(|item| field(item, "image").as_deref() == Some(entry.image.as_str()))
        {
            continue;
        }

        let value = serde_yaml::to_value(entry)?;
        match list
            .iter()
            .position(|item| field(item, "name").as_deref() == Some(entry.name.as_str()))
        {
            Some(i) => {
                tracing::debug!(name = %entry.name, image = %entry.image, "Replacing related image");
                list[i] = value;
            }
            None => {
                tracing::debug!(name = %entry.name, image = %entry.image, "Adding related image");
                list.push(value);
            }
        }
        changed += 1;
    }

    Ok(changed)
}
