//! Bundle manifest model and the passes that rewrite it.
//!
//! ```text
//!   ManifestDocument ──► Extractor ──► [Occurrence]      (location + reference)
//!                                          │
//!                 resolution mapping ──────┤
//!                                          ▼
//!                        Rewriter      (location-targeted, pure)
//!                        synthesize + merge_related_images
//!                        Annotator
//! ```
//!
//! Every pass works on one run-owned document value. Only `io` touches the
//! filesystem.

pub mod annotate;
pub mod document;
pub mod extract;
pub mod io;
pub mod related;
pub mod rewrite;

pub use annotate::{annotate, Annotator};
pub use document::{Location, ManifestDocument, PathSegment};
pub use extract::{ExtractionWarning, Extractor, Occurrence};
pub use related::{merge_related_images, synthesize, RelatedImageEntry};
pub use rewrite::{RewriteMapping, Rewriter};
