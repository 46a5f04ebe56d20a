//! Session-scoped cache of decrypted attachment content.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::config::{CacheConfig, CachePolicy};
use crate::model::attachment::AttachmentId;
use crate::model::payload::Payload;

/// Maps attachment IDs to decrypted content so remounting a view does not
/// download and decrypt the same attachment again.
///
/// Entries are immutable once written. With [`CachePolicy::Unbounded`]
/// nothing is ever evicted and memory grows with every distinct attachment
/// viewed in the session; [`CachePolicy::Lru`] caps the entry count.
pub struct FetchedAttachmentCache {
    entries: Mutex<LruCache<AttachmentId, Payload>>,
    policy: CachePolicy,
}

impl FetchedAttachmentCache {
    /// A cache that never evicts.
    pub fn unbounded() -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            policy: CachePolicy::Unbounded,
        }
    }

    /// A cache holding at most `capacity` entries (minimum 1).
    pub fn lru(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            policy: CachePolicy::Lru,
        }
    }

    /// Build from the `[cache]` config section.
    pub fn from_config(config: &CacheConfig) -> Self {
        match config.policy {
            CachePolicy::Unbounded => Self::unbounded(),
            CachePolicy::Lru => Self::lru(config.capacity),
        }
    }

    /// The active eviction policy.
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Cached content for `id`, marking it as recently used.
    pub fn get(&self, id: &AttachmentId) -> Option<Payload> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Store content for `id`. An existing entry is kept as is.
    pub fn set(&self, id: AttachmentId, content: Payload) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.contains(&id) {
            return;
        }
        debug!(id = %id, len = content.len(), "Caching decrypted attachment");
        if let Some((evicted, _)) = entries.push(id, content) {
            debug!(id = %evicted, "Evicted cached attachment");
        }
    }

    /// `true` if `id` is cached. Does not touch recency.
    pub fn contains(&self, id: &AttachmentId) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FetchedAttachmentCache {
    fn default() -> Self {
        Self::unbounded()
    }
}
