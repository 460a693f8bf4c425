//! Per-site counters and classification.
//!
//! Both cache kinds go through the same lifecycle:
//!
//! ```text
//!   Uninitialized ──first miss──► Monomorphic ──new key──► Polymorphic
//!                                                              │ limit reached
//!                                                       ┌──────▼──────┐
//!                                                       │ Megamorphic │  (generic, no entries)
//!                                                       └─────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Classification
// =============================================================================

/// Where a site is in its specialization lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteClassification {
    /// No entry installed yet.
    Uninitialized,
    /// Exactly one entry.
    Monomorphic,
    /// More than one entry, below the limit.
    Polymorphic,
    /// Gave up specializing; every execution takes the slow path.
    Megamorphic,
}

impl SiteClassification {
    pub(crate) fn from_len(len: usize, megamorphic: bool) -> Self {
        match (megamorphic, len) {
            (true, _) => SiteClassification::Megamorphic,
            (false, 0) => SiteClassification::Uninitialized,
            (false, 1) => SiteClassification::Monomorphic,
            (false, _) => SiteClassification::Polymorphic,
        }
    }
}

// =============================================================================
// Counters
// =============================================================================

/// Hot-path counters, updated with relaxed atomics.
#[derive(Debug, Default)]
pub(crate) struct SiteCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    generic: AtomicU64,
}

impl SiteCounters {
    #[inline(always)]
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn generic(&self) {
        self.generic.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize, megamorphic: bool) -> SiteStats {
        SiteStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            generic: self.generic.load(Ordering::Relaxed),
            entries,
            classification: SiteClassification::from_len(entries, megamorphic),
        }
    }
}

/// Snapshot of one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteStats {
    /// Executions answered by a cache entry.
    pub hits: u64,
    /// Executions that fell through to the slow path and specialized.
    pub misses: u64,
    /// Executions served by the slow path after the site went generic.
    pub generic: u64,
    /// Entries currently retained.
    pub entries: usize,
    pub classification: SiteClassification,
}

impl SiteStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses + self.generic
    }

    /// Hit rate as a percentage (0.0-100.0).
    pub fn hit_rate(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.hits as f32 / total as f32) * 100.0
        }
    }
}

// =============================================================================
// Breakdown
// =============================================================================

/// Classification counts across many sites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SiteBreakdown {
    pub uninitialized: usize,
    pub monomorphic: usize,
    pub polymorphic: usize,
    pub megamorphic: usize,
}

impl SiteBreakdown {
    pub(crate) fn record(&mut self, classification: SiteClassification) {
        match classification {
            SiteClassification::Uninitialized => self.uninitialized += 1,
            SiteClassification::Monomorphic => self.monomorphic += 1,
            SiteClassification::Polymorphic => self.polymorphic += 1,
            SiteClassification::Megamorphic => self.megamorphic += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.uninitialized + self.monomorphic + self.polymorphic + self.megamorphic
    }

    /// Percentage of sites that are monomorphic.
    pub fn monomorphic_percentage(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.monomorphic as f32 / total as f32) * 100.0
        }
    }
}
