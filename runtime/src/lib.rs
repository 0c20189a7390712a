//! relimg runtime - tag-to-digest resolution and bundle manifest rewriting.
//!
//! This crate turns an Operator bundle manifest that references images by
//! mutable tag into one that pins every image by digest, lists them in a
//! related-images inventory, and carries the disconnected-capability marker.

#![allow(clippy::result_large_err)]

pub mod cache;
pub mod manifest;
pub mod oci;
pub mod pipeline;

// Re-export common types
pub use cache::ResolutionCache;
pub use manifest::{
    annotate, merge_related_images, synthesize, Annotator, ExtractionWarning, Extractor,
    Location, ManifestDocument, Occurrence, RelatedImageEntry, RewriteMapping, Rewriter,
};
pub use oci::{
    Credential, CredentialStore, DigestResolver, IndexPolicy, InspectError, OciRegistryInspector,
    ReferenceForm, RegistryAuth, RegistryInspector, ResolutionFailure, ResolutionReport,
};
pub use oci::{Identity, ImageReference};
pub use pipeline::{PinOutcome, Pipeline};

/// relimg runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
