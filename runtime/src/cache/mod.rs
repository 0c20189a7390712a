//! Run-scoped caches.
//!
//! - `ResolutionCache`: tag-form reference → digest, shared by all lookups of one run

pub mod resolution_cache;

pub use resolution_cache::ResolutionCache;
