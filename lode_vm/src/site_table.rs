//! Registry of cache sites.
//!
//! Front ends identify a site by the code unit it belongs to and the offset
//! of the instruction within it. The table creates sites lazily with the
//! configured limits and hands out shared references, so every execution of
//! an instruction reaches the same cache.

use crate::binding_cache::LocalVariableSite;
use crate::dispatch::DispatchSite;
use crate::site_stats::{SiteBreakdown, SiteStats};
use lode_core::CacheConfig;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

// =============================================================================
// Site Identifier
// =============================================================================

/// Unique identifier of a cache site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteId {
    /// Code unit containing the site.
    pub code_id: u32,
    /// Instruction offset within the code unit.
    pub offset: u32,
}

impl SiteId {
    #[inline]
    pub const fn new(code_id: u32, offset: u32) -> Self {
        Self { code_id, offset }
    }
}

// =============================================================================
// Site Table
// =============================================================================

/// All dispatch and variable sites of one VM.
#[derive(Debug)]
pub struct SiteTable {
    dispatch_limit: usize,
    binding_limit: usize,
    dispatch: RwLock<FxHashMap<SiteId, Arc<DispatchSite>>>,
    variables: RwLock<FxHashMap<SiteId, Arc<LocalVariableSite>>>,
}

impl SiteTable {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            dispatch_limit: config.dispatch_chain_limit,
            binding_limit: config.binding_cache_limit,
            dispatch: RwLock::new(FxHashMap::default()),
            variables: RwLock::new(FxHashMap::default()),
        }
    }

    /// The send site `id`, created on first use.
    pub fn dispatch_site(&self, id: SiteId) -> Arc<DispatchSite> {
        if let Some(site) = self.dispatch.read().get(&id) {
            return Arc::clone(site);
        }
        let limit = self.dispatch_limit;
        Arc::clone(
            self.dispatch
                .write()
                .entry(id)
                .or_insert_with(|| Arc::new(DispatchSite::new(limit))),
        )
    }

    /// The variable-access site `id`, created on first use.
    pub fn variable_site(&self, id: SiteId) -> Arc<LocalVariableSite> {
        if let Some(site) = self.variables.read().get(&id) {
            return Arc::clone(site);
        }
        let limit = self.binding_limit;
        Arc::clone(
            self.variables
                .write()
                .entry(id)
                .or_insert_with(|| Arc::new(LocalVariableSite::new(limit))),
        )
    }

    pub fn dispatch_stats(&self, id: SiteId) -> Option<SiteStats> {
        self.dispatch.read().get(&id).map(|site| site.stats())
    }

    pub fn variable_stats(&self, id: SiteId) -> Option<SiteStats> {
        self.variables.read().get(&id).map(|site| site.stats())
    }

    /// Number of sites of both kinds.
    pub fn site_count(&self) -> usize {
        self.dispatch.read().len() + self.variables.read().len()
    }

    /// Classification counts of the send sites.
    pub fn dispatch_breakdown(&self) -> SiteBreakdown {
        let mut breakdown = SiteBreakdown::default();
        for site in self.dispatch.read().values() {
            breakdown.record(site.stats().classification);
        }
        breakdown
    }

    /// Classification counts of the variable sites.
    pub fn variable_breakdown(&self) -> SiteBreakdown {
        let mut breakdown = SiteBreakdown::default();
        for site in self.variables.read().values() {
            breakdown.record(site.stats().classification);
        }
        breakdown
    }

    /// Forget every site. Sites already handed out keep working.
    pub fn clear(&self) {
        self.dispatch.write().clear();
        self.variables.write().clear();
    }
}
