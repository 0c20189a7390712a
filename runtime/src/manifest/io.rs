//! Reading and writing manifest files.

use std::path::Path;

use relimg_core::error::Result;

use super::document::ManifestDocument;

/// Read a YAML manifest from disk.
pub fn load(path: &Path) -> Result<ManifestDocument> {
    let data = std::fs::read_to_string(path)?;
    ManifestDocument::from_yaml_str(&data)
}

/// Write a manifest atomically (temp file + rename in the same directory).
pub fn save(doc: &ManifestDocument, path: &Path) -> Result<()> {
    write_atomic(path, doc.to_yaml_string()?.as_bytes())?;
    tracing::debug!(path = %path.display(), "Wrote manifest");
    Ok(())
}

/// Replace `path` with `contents`, creating parent directories.
///
/// Readers see either the old file or the new one, never a partial write.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("relimg.tmp");
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
