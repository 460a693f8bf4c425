//! Scope resolution caches.
//!
//! A `LocalVariableSite` caches where a variable name lives relative to the
//! shape of the binding's current scope. Entries are keyed by
//! (name identity, current-scope shape identity) and record the shape path
//! that was walked plus the layout token of every shape on it:
//!
//! ```text
//!   key (x, S9) ─► path [S9, S4]  slot 0 @ depth 1     (positive)
//!   key (z, S9) ─► path [S9, S4, S1] to root            (negative)
//! ```
//!
//! A hit re-walks exactly the recorded path comparing shape ids and never
//! searches. A negative hit also requires the last scope to still be the
//! outermost one, so grafting an ancestor above it turns the entry into a
//! miss.
//!
//! `set` of a new name remembers the single-slot shape it synthesized, so a
//! site executed repeatedly from the same starting shape keeps producing
//! scopes of one shape identity.
//!
//! After `limit` distinct keys the site goes generic for good and runs the
//! uncached algorithms from `lode_runtime::binding`.

use crate::site_stats::{SiteCounters, SiteStats};
use lode_core::{LodeError, LodeResult, Symbol, TokenSet, ValidityToken, Value, all_valid};
use lode_runtime::{Binding, ChainTrace, ScopeHeap, ScopeId, ScopeShape, ShapeId, SlotId};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

type ShapePath = SmallVec<[ShapeId; 4]>;

// =============================================================================
// Entries
// =============================================================================

/// Single-slot shape handed out by `set` on a missing name.
#[derive(Debug, Clone)]
struct NewLocal {
    shape: Arc<ScopeShape>,
    layout: ValidityToken,
}

#[derive(Debug)]
struct ResolutionEntry {
    name: Symbol,
    path: ShapePath,
    tokens: TokenSet,
    /// Slot index in the last scope of the path; `None` for a negative entry.
    slot: Option<SlotId>,
    new_local: Option<NewLocal>,
}

impl ResolutionEntry {
    fn from_trace(name: Symbol, trace: ChainTrace) -> Self {
        Self {
            name,
            slot: trace.found.map(|found| found.slot),
            path: trace.shapes,
            tokens: trace.tokens,
            new_local: None,
        }
    }

    #[inline]
    fn key_matches(&self, name: Symbol, shape: ShapeId) -> bool {
        self.name == name && self.path.first() == Some(&shape)
    }

    /// Last scope of the recorded path, if the chain still matches.
    #[inline]
    fn revalidate(&self, heap: &ScopeHeap, scope: ScopeId) -> Option<ScopeId> {
        if !all_valid(&self.tokens) {
            return None;
        }
        heap.follow(scope, &self.path, self.slot.is_none())
    }

    fn resolution(&self, end: ScopeId) -> Resolution {
        match self.slot {
            Some(slot) => Resolution::Found { owner: end, slot },
            None => Resolution::Absent {
                new_local: self
                    .new_local
                    .as_ref()
                    .filter(|local| local.layout.check())
                    .map(|local| Arc::clone(&local.shape)),
            },
        }
    }
}

#[derive(Debug)]
struct NameListEntry {
    path: ShapePath,
    tokens: TokenSet,
    names: Arc<[Symbol]>,
}

/// Outcome of resolving a name against a chain.
#[derive(Debug)]
enum Resolution {
    Found { owner: ScopeId, slot: SlotId },
    Absent { new_local: Option<Arc<ScopeShape>> },
}

#[derive(Debug, Default)]
struct SiteState {
    entries: SmallVec<[ResolutionEntry; 4]>,
    name_lists: SmallVec<[NameListEntry; 2]>,
}

impl SiteState {
    fn len(&self) -> usize {
        self.entries.len() + self.name_lists.len()
    }
}

// =============================================================================
// Local Variable Site
// =============================================================================

/// The cache of one variable-access site.
#[derive(Debug)]
pub struct LocalVariableSite {
    state: RwLock<SiteState>,
    generic: AtomicBool,
    limit: usize,
    counters: SiteCounters,
}

impl LocalVariableSite {
    /// Create an empty site retaining at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            state: RwLock::new(SiteState::default()),
            generic: AtomicBool::new(false),
            limit,
            counters: SiteCounters::default(),
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Value of `name`, innermost slot first.
    pub fn get(&self, heap: &ScopeHeap, binding: &Binding, name: Symbol) -> LodeResult<Value> {
        binding.check_name(name)?;
        match self.resolve(heap, binding.scope(), name) {
            Some(Resolution::Found { owner, slot }) => heap.read_slot(owner, slot),
            Some(Resolution::Absent { .. }) => Err(LodeError::local_not_defined(name, binding)),
            None => binding.local_variable_get(heap, name),
        }
    }

    /// Whether `name` has a slot anywhere in the chain.
    pub fn defined(&self, heap: &ScopeHeap, binding: &Binding, name: Symbol) -> LodeResult<bool> {
        binding.check_name(name)?;
        match self.resolve(heap, binding.scope(), name) {
            Some(Resolution::Found { .. }) => Ok(true),
            Some(Resolution::Absent { .. }) => Ok(false),
            None => binding.local_variable_defined(heap, name),
        }
    }

    /// Write `name`, creating a new innermost scope if no slot exists.
    pub fn set(
        &self,
        heap: &ScopeHeap,
        binding: &mut Binding,
        name: Symbol,
        value: Value,
    ) -> LodeResult<Value> {
        binding.check_name(name)?;
        let scope = binding.scope();
        match self.resolve(heap, scope, name) {
            Some(Resolution::Found { owner, slot }) => {
                heap.write_slot(owner, slot, value.clone())?;
            }
            Some(Resolution::Absent { new_local }) => {
                let shape = match new_local {
                    Some(shape) => shape,
                    None => self.synthesize_local(heap, scope, name),
                };
                binding.push_local(heap, shape, value.clone())?;
            }
            None => return binding.local_variable_set(heap, name, value),
        }
        Ok(value)
    }

    /// Visible names in the chain, innermost first.
    pub fn names(&self, heap: &ScopeHeap, binding: &Binding) -> LodeResult<Vec<Symbol>> {
        if self.generic.load(Ordering::Acquire) {
            self.counters.generic();
            return binding.local_variable_names(heap);
        }

        let scope = binding.scope();
        let Some(shape) = heap.shape_id_of(scope) else {
            return binding.local_variable_names(heap);
        };
        {
            let state = self.state.read();
            let cached = state.name_lists.iter().find(|e| e.path.first() == Some(&shape));
            if let Some(entry) = cached {
                if all_valid(&entry.tokens) && heap.follow(scope, &entry.path, true).is_some() {
                    self.counters.hit();
                    return Ok(entry.names.to_vec());
                }
            }
        }

        // Trace before listing: a slot appended in between invalidates the
        // traced token, so the entry can only be conservatively stale.
        let traced = heap.trace(scope, None);
        let names = binding.local_variable_names(heap)?;
        let entry = NameListEntry {
            path: traced.shapes,
            tokens: traced.tokens,
            names: names.as_slice().into(),
        };
        self.install(
            |state| match state.name_lists.iter_mut().find(|e| e.path.first() == Some(&shape)) {
                Some(slot) => *slot = entry,
                None => state.name_lists.push(entry),
            },
            |state| state.name_lists.iter().any(|e| e.path.first() == Some(&shape)),
        );
        Ok(names)
    }

    // =========================================================================
    // Specialization
    // =========================================================================

    /// Cached or freshly traced resolution; `None` means use the uncached
    /// algorithm.
    fn resolve(&self, heap: &ScopeHeap, scope: ScopeId, name: Symbol) -> Option<Resolution> {
        if self.generic.load(Ordering::Acquire) {
            self.counters.generic();
            return None;
        }

        let shape = heap.shape_id_of(scope)?;
        {
            let state = self.state.read();
            if let Some(entry) = state.entries.iter().find(|e| e.key_matches(name, shape)) {
                if let Some(end) = entry.revalidate(heap, scope) {
                    self.counters.hit();
                    return Some(entry.resolution(end));
                }
            }
        }
        self.specialize(heap, scope, name, shape)
    }

    #[cold]
    fn specialize(
        &self,
        heap: &ScopeHeap,
        scope: ScopeId,
        name: Symbol,
        shape: ShapeId,
    ) -> Option<Resolution> {
        let traced = heap.trace(scope, Some(name));
        // The chain changed under us; answer uncached this time.
        let end = heap.follow(scope, &traced.shapes, traced.reaches_root())?;

        let entry = ResolutionEntry::from_trace(name, traced);
        let resolution = entry.resolution(end);
        trace!(
            variable = %name,
            shape = shape.raw(),
            depth = entry.path.len() - 1,
            found = entry.slot.is_some(),
            "resolution entry installed"
        );
        self.install(
            |state| match state.entries.iter_mut().find(|e| e.key_matches(name, shape)) {
                Some(slot) => *slot = entry,
                None => state.entries.push(entry),
            },
            |state| state.entries.iter().any(|e| e.key_matches(name, shape)),
        );
        Some(resolution)
    }

    /// Store an entry unless that would exceed the limit with a new key, in
    /// which case the site goes generic.
    fn install(&self, store: impl FnOnce(&mut SiteState), has_key: impl Fn(&SiteState) -> bool) {
        let mut state = self.state.write();
        if self.generic.load(Ordering::Relaxed) {
            return;
        }
        self.counters.miss();
        if !has_key(&state) && state.len() >= self.limit {
            self.generic.store(true, Ordering::Release);
            *state = SiteState::default();
            debug!(limit = self.limit, "variable site went generic");
            return;
        }
        store(&mut state);
    }

    /// Make the single-slot shape for a new `name` set from `scope`, and
    /// remember it on the negative entry keyed by `scope`'s shape.
    fn synthesize_local(&self, heap: &ScopeHeap, scope: ScopeId, name: Symbol) -> Arc<ScopeShape> {
        let shape = heap.new_shape(&[name]);
        let local = NewLocal {
            layout: shape.layout_token(),
            shape: Arc::clone(&shape),
        };
        if let Some(base) = heap.shape_id_of(scope) {
            let mut state = self.state.write();
            if let Some(entry) = state.entries.iter_mut().find(|e| e.key_matches(name, base)) {
                if entry.slot.is_none() {
                    entry.new_local = Some(local);
                }
            }
        }
        shape
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Entries currently retained.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the site has given up caching.
    #[inline]
    pub fn is_generic(&self) -> bool {
        self.generic.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn stats(&self) -> SiteStats {
        self.counters.snapshot(self.len(), self.is_generic())
    }
}

// =============================================================================
// Tests
// =============================================================================
