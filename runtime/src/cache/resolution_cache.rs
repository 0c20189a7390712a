//! In-memory cache of tag → digest resolutions for a single run.
//!
//! Each tag-form reference owns one slot. Concurrent callers for the same
//! reference wait on the slot's initialization, so at most one lookup is in
//! flight per reference. Failed lookups leave the slot empty and are retried
//! by the next caller. Nothing is persisted; the cache is dropped with its run.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Served from the cache without a lookup.
    Hit(String),
    /// Produced by the lookup that ran for this call.
    Fresh(String),
}

impl CacheLookup {
    /// The cached or freshly resolved digest.
    pub fn digest(&self) -> &str {
        match self {
            Self::Hit(d) | Self::Fresh(d) => d,
        }
    }

    pub fn into_digest(self) -> String {
        match self {
            Self::Hit(d) | Self::Fresh(d) => d,
        }
    }
}

/// Tag-form reference → digest cache.
#[derive(Default)]
pub struct ResolutionCache {
    slots: DashMap<String, Arc<OnceCell<String>>>,
}

impl ResolutionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached digest for a tag-form reference, if resolved.
    pub fn get(&self, key: &str) -> Option<String> {
        self.slots.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Return the cached digest or run `lookup` to produce it.
    ///
    /// Only a successful lookup populates the slot.
    pub async fn get_or_resolve<F, Fut, E>(&self, key: &str, lookup: F) -> Result<CacheLookup, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        // Clone the slot out so no map guard is held across the await
        let slot = Arc::clone(&*self.slots.entry(key.to_string()).or_default());

        if let Some(digest) = slot.get() {
            return Ok(CacheLookup::Hit(digest.clone()));
        }

        let mut fresh = false;
        let digest = slot
            .get_or_try_init(|| {
                fresh = true;
                lookup()
            })
            .await?
            .clone();

        Ok(if fresh {
            CacheLookup::Fresh(digest)
        } else {
            CacheLookup::Hit(digest)
        })
    }

    /// Number of resolved entries.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
