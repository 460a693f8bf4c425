//! Captured lexical scopes.
//!
//! Scopes live in an arena (`ScopeHeap`) and are addressed by `ScopeId`. Each
//! scope has a shape (its ordered slot names), a values store, an optional
//! enclosing scope, and the receiver that was active when it was created.
//!
//! ```text
//!   binding ──► [shape 9: x]  ──► [shape 4: a, b] ──► [shape 1: self_var] ──► ∅
//!               innermost                                outermost (root)
//! ```
//!
//! # Shapes
//!
//! Shapes are compared by identity (`ShapeId`), never structurally. A shape
//! may be shared by many scopes (every activation of the same block). The
//! only structural change a shape supports is appending a slot
//! (`ScopeHeap::declare`); it invalidates the shape's layout token before the
//! slot becomes visible, and scopes sharing the shape grow their values store
//! lazily (an unwritten slot reads as `nil`).
//!
//! # Chain Traces
//!
//! Resolution caches need to re-walk a chain cheaply and know it is still the
//! chain they specialized on. `trace` records the shape id and layout token of
//! every scope walked; `follow` re-walks a recorded trace and fails as soon as
//! one hop differs.
//!
//! # Handles
//!
//! `ScopeId` is a plain index and may come from outside the heap. Scopes are
//! never freed, so a handle the heap allocated stays valid; any other handle
//! is reported as `LodeError::UnknownScope` by the fallible operations and
//! ends a walk early in the total ones.

use lode_core::{CyclicToken, LodeError, LodeResult, Symbol, TokenSet, ValidityToken, Value};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

// =============================================================================
// Identifiers
// =============================================================================

/// Identity of a scope shape. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ShapeId(pub u64);

impl ShapeId {
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Handle to a scope in the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ScopeId(pub u32);

impl ScopeId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope {}", self.0)
    }
}

/// Index of a slot within a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SlotId(pub u32);

impl SlotId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// =============================================================================
// Shape
// =============================================================================

#[derive(Debug, Default)]
struct SlotTable {
    names: Vec<Symbol>,
    index: FxHashMap<Symbol, SlotId>,
}

/// Ordered slot layout of a scope.
#[derive(Debug)]
pub struct ScopeShape {
    id: ShapeId,
    slots: RwLock<SlotTable>,
    /// "This shape has no additional slots."
    layout: CyclicToken,
}

impl ScopeShape {
    fn new(id: ShapeId, names: &[Symbol]) -> Self {
        let mut table = SlotTable::default();
        for &name in names {
            if !table.index.contains_key(&name) {
                table.index.insert(name, SlotId(table.names.len() as u32));
                table.names.push(name);
            }
        }
        Self {
            id,
            slots: RwLock::new(table),
            layout: CyclicToken::new(format!("shape {} has no additional slots", id.raw())),
        }
    }

    #[inline]
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// Slot for `name`, if this shape has one.
    #[inline]
    pub fn find_slot(&self, name: Symbol) -> Option<SlotId> {
        self.slots.read().index.get(&name).copied()
    }

    /// Slot names in declaration order.
    pub fn slot_names(&self) -> Vec<Symbol> {
        self.slots.read().names.clone()
    }

    pub fn len(&self) -> usize {
        self.slots.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Token for the current layout.
    #[inline]
    pub fn layout_token(&self) -> ValidityToken {
        self.layout.current()
    }

    /// Slot lookup and layout token read under one lock, so the token
    /// describes exactly the layout that produced the answer.
    fn probe(&self, name: Option<Symbol>) -> (Option<SlotId>, ValidityToken) {
        let slots = self.slots.read();
        let slot = name.and_then(|n| slots.index.get(&n).copied());
        (slot, self.layout.current())
    }

    fn append(&self, name: Symbol) -> SlotId {
        let mut slots = self.slots.write();
        if let Some(&slot) = slots.index.get(&name) {
            return slot;
        }
        self.layout.invalidate_and_renew();
        let slot = SlotId(slots.names.len() as u32);
        slots.names.push(name);
        slots.index.insert(name, slot);
        slot
    }
}

// =============================================================================
// Scope Nodes
// =============================================================================

#[derive(Debug)]
struct ScopeNode {
    shape: Arc<ScopeShape>,
    values: Vec<Value>,
    parent: Option<ScopeId>,
    receiver: Value,
}

impl ScopeNode {
    #[inline]
    fn read(&self, slot: SlotId) -> Value {
        self.values.get(slot.index()).cloned().unwrap_or_default()
    }

    #[inline]
    fn write(&mut self, slot: SlotId, value: Value) {
        let index = slot.index();
        if index >= self.values.len() {
            self.values.resize(index + 1, Value::Nil);
        }
        self.values[index] = value;
    }
}

// =============================================================================
// Chain Trace
// =============================================================================

/// Slot location relative to a starting scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSlot {
    pub slot: SlotId,
    /// Enclosing-scope hops from the starting scope to the owner.
    pub depth: u32,
}

/// Record of one walk along a scope chain.
#[derive(Debug, Clone)]
pub struct ChainTrace {
    /// Shape of every scope walked, starting scope first.
    pub shapes: SmallVec<[ShapeId; 4]>,
    /// Layout token of every shape walked, same order.
    pub tokens: TokenSet,
    /// Where the name was found, if it was searched for and found.
    pub found: Option<ResolvedSlot>,
}

impl ChainTrace {
    /// Whether the walk reached the end of the chain.
    ///
    /// Every trace without a hit is a full walk.
    #[inline]
    pub fn reaches_root(&self) -> bool {
        self.found.is_none()
    }
}

// =============================================================================
// Scope Heap
// =============================================================================

/// Why `link_root` refused to link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkError {
    /// The ancestor's chain reaches this scope of ours.
    Cycle(ScopeId),
    /// A handle the heap never allocated.
    Unknown(ScopeId),
}

/// Arena of scopes.
pub struct ScopeHeap {
    nodes: RwLock<Vec<ScopeNode>>,
    next_shape: AtomicU64,
}

impl ScopeHeap {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            next_shape: AtomicU64::new(0),
        }
    }

    /// Number of scopes ever allocated.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `scope` was allocated by this heap.
    #[inline]
    pub fn contains(&self, scope: ScopeId) -> bool {
        scope.index() < self.nodes.read().len()
    }

    /// `Ok` if `scope` was allocated by this heap.
    pub fn check(&self, scope: ScopeId) -> LodeResult<()> {
        if self.contains(scope) {
            Ok(())
        } else {
            Err(LodeError::unknown_scope(scope))
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Create a shape with a fresh identity.
    pub fn new_shape(&self, names: &[Symbol]) -> Arc<ScopeShape> {
        let id = ShapeId(self.next_shape.fetch_add(1, Ordering::Relaxed));
        Arc::new(ScopeShape::new(id, names))
    }

    fn alloc(
        nodes: &mut Vec<ScopeNode>,
        shape: Arc<ScopeShape>,
        parent: Option<ScopeId>,
        receiver: Value,
    ) -> ScopeId {
        let id = ScopeId(nodes.len() as u32);
        nodes.push(ScopeNode {
            shape,
            values: Vec::new(),
            parent,
            receiver,
        });
        id
    }

    /// Allocate a scope with the given shape. Fails if `parent` is unknown.
    pub fn push_scope(
        &self,
        shape: Arc<ScopeShape>,
        parent: Option<ScopeId>,
        receiver: Value,
    ) -> LodeResult<ScopeId> {
        let mut nodes = self.nodes.write();
        if let Some(parent) = parent {
            if parent.index() >= nodes.len() {
                return Err(LodeError::unknown_scope(parent));
            }
        }
        Ok(Self::alloc(&mut nodes, shape, parent, receiver))
    }

    /// Allocate an outermost scope with a fresh empty shape.
    pub fn root_scope(&self, receiver: Value) -> ScopeId {
        let shape = self.new_shape(&[]);
        Self::alloc(&mut self.nodes.write(), shape, None, receiver)
    }

    /// Allocate a scope under `parent` that inherits its receiver.
    pub fn child_scope(&self, parent: ScopeId, shape: Arc<ScopeShape>) -> LodeResult<ScopeId> {
        let mut nodes = self.nodes.write();
        let receiver = match nodes.get(parent.index()) {
            Some(node) => node.receiver.clone(),
            None => return Err(LodeError::unknown_scope(parent)),
        };
        Ok(Self::alloc(&mut nodes, shape, Some(parent), receiver))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn shape_of(&self, scope: ScopeId) -> Option<Arc<ScopeShape>> {
        self.nodes.read().get(scope.index()).map(|node| Arc::clone(&node.shape))
    }

    #[inline]
    pub fn shape_id_of(&self, scope: ScopeId) -> Option<ShapeId> {
        self.nodes.read().get(scope.index()).map(|node| node.shape.id())
    }

    /// Enclosing scope; `None` for an outermost or unknown scope.
    #[inline]
    pub fn parent_of(&self, scope: ScopeId) -> Option<ScopeId> {
        self.nodes.read().get(scope.index()).and_then(|node| node.parent)
    }

    pub fn receiver_of(&self, scope: ScopeId) -> LodeResult<Value> {
        match self.nodes.read().get(scope.index()) {
            Some(node) => Ok(node.receiver.clone()),
            None => Err(LodeError::unknown_scope(scope)),
        }
    }

    /// Read a slot of a specific scope.
    pub fn read_slot(&self, scope: ScopeId, slot: SlotId) -> LodeResult<Value> {
        match self.nodes.read().get(scope.index()) {
            Some(node) => Ok(node.read(slot)),
            None => Err(LodeError::unknown_scope(scope)),
        }
    }

    /// Write a slot of a specific scope in place.
    pub fn write_slot(&self, scope: ScopeId, slot: SlotId, value: Value) -> LodeResult<()> {
        match self.nodes.write().get_mut(scope.index()) {
            Some(node) => {
                node.write(slot, value);
                Ok(())
            }
            None => Err(LodeError::unknown_scope(scope)),
        }
    }

    /// Scopes from `scope` outward, `scope` first. Empty for an unknown
    /// scope.
    pub fn chain(&self, scope: ScopeId) -> Vec<ScopeId> {
        let nodes = self.nodes.read();
        let mut chain = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            match nodes.get(id.index()) {
                Some(node) => {
                    chain.push(id);
                    current = node.parent;
                }
                None => break,
            }
        }
        chain
    }

    /// The scope `depth` hops out from `scope`.
    pub fn scope_at_depth(&self, scope: ScopeId, depth: u32) -> Option<ScopeId> {
        let nodes = self.nodes.read();
        nodes.get(scope.index())?;
        let mut current = scope;
        for _ in 0..depth {
            current = nodes.get(current.index())?.parent?;
        }
        Some(current)
    }

    // =========================================================================
    // Structural Changes
    // =========================================================================

    /// Append a slot to the shape of `scope`.
    ///
    /// Every scope sharing that shape gains the slot. Returns the existing
    /// slot if the name is already declared.
    pub fn declare(&self, scope: ScopeId, name: Symbol) -> LodeResult<SlotId> {
        let shape = self
            .shape_of(scope)
            .ok_or_else(|| LodeError::unknown_scope(scope))?;
        let slot = shape.append(name);
        debug!(shape = shape.id().raw(), name = %name, "slot declared");
        Ok(slot)
    }

    /// Link the outermost scope of `scope`'s chain to `ancestor`.
    ///
    /// Fails without mutating anything if either handle is unknown or if
    /// `ancestor`'s own chain shares any scope with `scope`'s chain. Returns
    /// the scope that was re-linked.
    pub(crate) fn link_root(
        &self,
        scope: ScopeId,
        ancestor: ScopeId,
    ) -> Result<ScopeId, LinkError> {
        let mut nodes = self.nodes.write();
        for id in [scope, ancestor] {
            if id.index() >= nodes.len() {
                return Err(LinkError::Unknown(id));
            }
        }

        // Every parent link points at an allocated scope.
        let mut members = FxHashSet::default();
        let mut root = scope;
        members.insert(root);
        while let Some(parent) = nodes[root.index()].parent {
            root = parent;
            members.insert(root);
        }

        let mut current = Some(ancestor);
        while let Some(id) = current {
            if members.contains(&id) {
                return Err(LinkError::Cycle(id));
            }
            current = nodes[id.index()].parent;
        }

        nodes[root.index()].parent = Some(ancestor);
        Ok(root)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Walk outward from `scope` looking for `name`, recording every hop.
    ///
    /// With `name == None` the walk always covers the whole chain. An
    /// unknown scope yields an empty trace.
    pub fn trace(&self, scope: ScopeId, name: Option<Symbol>) -> ChainTrace {
        let nodes = self.nodes.read();
        let mut trace = ChainTrace {
            shapes: SmallVec::new(),
            tokens: TokenSet::new(),
            found: None,
        };

        let mut current = nodes.get(scope.index());
        let mut depth = 0u32;
        while let Some(node) = current {
            let (slot, token) = node.shape.probe(name);
            trace.shapes.push(node.shape.id());
            trace.tokens.push(token);
            if let Some(slot) = slot {
                trace.found = Some(ResolvedSlot { slot, depth });
                break;
            }
            current = node.parent.and_then(|id| nodes.get(id.index()));
            depth += 1;
        }
        trace
    }

    /// Re-walk a recorded chain from `scope`.
    ///
    /// Returns the last scope of the walk if every hop has the recorded
    /// shape (and, with `to_root`, the last scope is still outermost).
    pub fn follow(&self, scope: ScopeId, shapes: &[ShapeId], to_root: bool) -> Option<ScopeId> {
        let nodes = self.nodes.read();
        let (last, rest) = shapes.split_last()?;
        let mut current = scope;
        for &expected in rest {
            let node = nodes.get(current.index())?;
            if node.shape.id() != expected {
                return None;
            }
            current = node.parent?;
        }
        let node = nodes.get(current.index())?;
        if node.shape.id() != *last || (to_root && node.parent.is_some()) {
            return None;
        }
        Some(current)
    }

    /// Uncached search for `name`.
    pub fn find_slot(&self, scope: ScopeId, name: Symbol) -> Option<(ScopeId, ResolvedSlot)> {
        let nodes = self.nodes.read();
        let mut current = Some(scope);
        let mut depth = 0u32;
        while let Some(id) = current {
            let node = nodes.get(id.index())?;
            if let Some(slot) = node.shape.find_slot(name) {
                return Some((id, ResolvedSlot { slot, depth }));
            }
            current = node.parent;
            depth += 1;
        }
        None
    }

    /// Every slot name in the chain, innermost first, de-duplicated.
    /// `keep` filters names (hidden names are dropped by callers this way).
    pub fn chain_names(&self, scope: ScopeId, keep: impl Fn(Symbol) -> bool) -> Vec<Symbol> {
        let nodes = self.nodes.read();
        let mut seen = FxHashSet::default();
        let mut names = Vec::new();
        let mut current = nodes.get(scope.index());
        while let Some(node) = current {
            for name in node.shape.slot_names() {
                if keep(name) && seen.insert(name) {
                    names.push(name);
                }
            }
            current = node.parent.and_then(|id| nodes.get(id.index()));
        }
        names
    }
}

impl Default for ScopeHeap {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
