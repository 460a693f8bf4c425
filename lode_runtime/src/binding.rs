//! Bindings: reseatable handles on a scope chain.
//!
//! A binding points at its current (innermost) scope. Writes to existing
//! slots go through to the shared scope; introducing a new name never touches
//! shared structure and instead pushes a new scope holding just that name and
//! reseats the binding onto it. Duplicates share the scope, not the pointer.
//!
//! The methods here are the uncached algorithms. `lode_vm` layers per-site
//! caches over them and falls back to them when a site goes generic.

use crate::scope::{LinkError, ResolvedSlot, ScopeHeap, ScopeId, ScopeShape, SlotId};
use lode_core::{LodeError, LodeResult, Symbol, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Names starting with this are global-like and never live in a scope.
pub const HIDDEN_PREFIX: &str = "$";
/// Marker used by the front end for compiler temporaries.
pub const TEMP_MARKER: &str = "__lode_temp";

/// Whether `name` is reserved and may not be read, written, or listed
/// through a binding.
#[inline]
pub fn is_hidden_name(name: Symbol) -> bool {
    let s = name.as_str();
    s.starts_with(HIDDEN_PREFIX) || s.starts_with(TEMP_MARKER)
}

// =============================================================================
// Source Location
// =============================================================================

/// File and line recorded when a binding is captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: Arc<str>,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<Arc<str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

// =============================================================================
// Binding
// =============================================================================

/// A handle on a scope chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    scope: ScopeId,
    location: Option<SourceLocation>,
}

impl Binding {
    /// Binding on an existing scope with no recorded location.
    pub fn new(scope: ScopeId) -> Self {
        Self {
            scope,
            location: None,
        }
    }

    /// Binding on an existing scope, tagged with where it was captured.
    pub fn capture(scope: ScopeId, location: Option<SourceLocation>) -> Self {
        Self { scope, location }
    }

    /// Current (innermost) scope.
    #[inline]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    #[inline]
    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    /// Point this binding at another scope. Other bindings are unaffected.
    #[inline]
    pub fn reseat(&mut self, scope: ScopeId) {
        self.scope = scope;
    }

    /// A second binding sharing the current scope and location.
    #[inline]
    pub fn duplicate(&self) -> Binding {
        self.clone()
    }

    /// `self` of the current scope.
    pub fn receiver(&self, heap: &ScopeHeap) -> LodeResult<Value> {
        heap.receiver_of(self.scope)
    }

    /// Reject hidden names with a NameError.
    #[inline]
    pub fn check_name(&self, name: Symbol) -> LodeResult<()> {
        if is_hidden_name(name) {
            Err(LodeError::bad_local_name(name, self))
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Uncached Operations
    // =========================================================================

    /// Where `name` lives relative to the current scope.
    pub fn find_slot(&self, heap: &ScopeHeap, name: Symbol) -> Option<(ScopeId, ResolvedSlot)> {
        heap.find_slot(self.scope, name)
    }

    pub fn local_variable_defined(&self, heap: &ScopeHeap, name: Symbol) -> LodeResult<bool> {
        self.check_name(name)?;
        heap.check(self.scope)?;
        Ok(self.find_slot(heap, name).is_some())
    }

    pub fn local_variable_get(&self, heap: &ScopeHeap, name: Symbol) -> LodeResult<Value> {
        self.check_name(name)?;
        heap.check(self.scope)?;
        match self.find_slot(heap, name) {
            Some((owner, resolved)) => heap.read_slot(owner, resolved.slot),
            None => Err(LodeError::local_not_defined(name, &*self)),
        }
    }

    pub fn local_variable_set(
        &mut self,
        heap: &ScopeHeap,
        name: Symbol,
        value: Value,
    ) -> LodeResult<Value> {
        self.check_name(name)?;
        heap.check(self.scope)?;
        match self.find_slot(heap, name) {
            Some((owner, resolved)) => heap.write_slot(owner, resolved.slot, value.clone())?,
            None => {
                let shape = heap.new_shape(&[name]);
                self.push_local(heap, shape, value.clone())?;
            }
        }
        Ok(value)
    }

    /// Push a scope of `shape` (whose first slot is the new name) holding
    /// `value`, and reseat onto it.
    pub fn push_local(
        &mut self,
        heap: &ScopeHeap,
        shape: Arc<ScopeShape>,
        value: Value,
    ) -> LodeResult<ScopeId> {
        let scope = heap.child_scope(self.scope, shape)?;
        heap.write_slot(scope, SlotId(0), value)?;
        self.scope = scope;
        Ok(scope)
    }

    /// Every visible name in the chain, innermost first.
    pub fn local_variable_names(&self, heap: &ScopeHeap) -> LodeResult<Vec<Symbol>> {
        heap.check(self.scope)?;
        Ok(heap.chain_names(self.scope, |name| !is_hidden_name(name)))
    }

    /// Link `ancestor` above the outermost scope of this binding's chain,
    /// then reseat onto a fresh empty scope so shape-keyed caches miss.
    ///
    /// Nothing is mutated if `ancestor`'s chain already shares a scope with
    /// this chain, or if either scope is unknown to `heap`.
    pub fn insert_ancestor(&mut self, heap: &ScopeHeap, ancestor: ScopeId) -> LodeResult<()> {
        let root = heap.link_root(self.scope, ancestor).map_err(|err| match err {
            LinkError::Cycle(_) => LodeError::cyclic_link(&*self, ancestor),
            LinkError::Unknown(scope) => LodeError::unknown_scope(scope),
        })?;
        let fresh = heap.child_scope(self.scope, heap.new_shape(&[]))?;
        debug!(
            root = root.0,
            ancestor = ancestor.0,
            scope = fresh.0,
            "ancestor scope grafted"
        );
        self.scope = fresh;
        Ok(())
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "#<Binding {} at {}>", self.scope, loc),
            None => write!(f, "#<Binding {}>", self.scope),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
