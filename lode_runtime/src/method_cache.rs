//! Class-level lookup memo.
//!
//! Full lookup walks the ancestor chain, which is O(n) in hierarchy depth.
//! This memo keeps the last lookup outcome per (class, name) pair so the
//! megamorphic dispatch tier, which has no per-site cache, still avoids the
//! walk on repeated sends.
//!
//! # Cache Hierarchy
//!
//! 1. **Dispatch chain** - per call site, guarded entries
//! 2. **Lookup memo (this)** - per class table, keyed by (class, name)
//! 3. **Ancestor walk** - full lookup, populates both
//!
//! # Invalidation
//!
//! Entries are never purged by mutators. Each stored outcome carries the
//! tokens of the lookup that produced it and is re-validated on read, so a
//! redefinition makes the stale entry miss until the next insert replaces it.

use crate::method::MethodLookup;
use lode_core::{ClassId, Symbol, all_valid};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Method Cache
// =============================================================================

type CacheKey = (ClassId, Symbol);

/// Memo of lookup outcomes keyed by (class, name).
pub struct MethodCache {
    cache: RwLock<FxHashMap<CacheKey, MethodLookup>>,

    /// Valid entry found.
    hits: AtomicU64,

    /// No entry for the key.
    misses: AtomicU64,

    /// Entry present but one of its tokens was invalid.
    stale: AtomicU64,
}

impl MethodCache {
    /// Create a new empty memo.
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(FxHashMap::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale: AtomicU64::new(0),
        }
    }

    /// Look up a memoized outcome. Returns `None` on a miss or when the
    /// stored outcome has been invalidated.
    #[inline]
    pub fn get(&self, class: ClassId, name: Symbol) -> Option<MethodLookup> {
        let guard = self.cache.read();
        match guard.get(&(class, name)) {
            Some(lookup) if all_valid(lookup.tokens()) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(lookup.clone())
            }
            Some(_) => {
                self.stale.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store an outcome, replacing any previous one for the key.
    #[inline]
    pub fn insert(&self, class: ClassId, name: Symbol, lookup: MethodLookup) {
        self.cache.write().insert((class, name), lookup);
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// (hits, misses, stale)
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.stale.load(Ordering::Relaxed),
        )
    }

    /// Hit rate as a percentage; 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let (hits, misses, stale) = self.stats();
        let total = hits + misses + stale;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MethodCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
