//! Dispatch cache chains.
//!
//! Every send site owns a `DispatchSite`: an immutable, singly-linked chain of
//! guarded entries tested head to tail, most recently installed first.
//!
//! ```text
//!   head ──► [name=:foo, Boxed(C2), tokens] ──► [name=:foo, Unboxed(Integer, Int)] ──► ∅
//! ```
//!
//! An entry applies when, in order:
//! 1. the message name is identical,
//! 2. every token is still valid,
//! 3. the receiver passes the guard.
//!
//! Stale entries are skipped, never unlinked. The chain is bounded by the
//! configured limit: a miss on a full chain discards it and flips the site
//! to the megamorphic tier, where every send performs the full lookup (still
//! memoized per class by the class table).
//!
//! # Concurrency
//!
//! Readers clone the head `Arc` under a short read lock and walk without
//! locks. Prepending builds the new node completely before swapping it in
//! under the write lock, so a reader sees either the old or the new chain.

use crate::site_stats::{SiteCounters, SiteStats};
use lode_core::{ClassId, LodeError, LodeResult, Repr, Symbol, TokenSet, Value, all_valid};
use lode_runtime::{LookupTarget, Method, MethodLookup, MethodResolver};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

// =============================================================================
// Guards
// =============================================================================

/// Receiver test of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Object receiver whose current class is `class`.
    Boxed { class: ClassId },
    /// Non-object receiver of class `class` with representation `repr`.
    Unboxed { class: ClassId, repr: Repr },
}

impl Guard {
    /// The guard that admits `receiver`, whose class is `class`.
    #[inline]
    pub fn for_receiver(class: ClassId, receiver: &Value) -> Self {
        match receiver {
            Value::Object(_) => Guard::Boxed { class },
            other => Guard::Unboxed {
                class,
                repr: other.repr(),
            },
        }
    }

    /// Test a receiver. Unboxed guards compare the class as well as the
    /// representation, since `true` and `false` share one.
    #[inline(always)]
    pub fn matches<R: MethodResolver + ?Sized>(&self, resolver: &R, receiver: &Value) -> bool {
        match (self, receiver) {
            (Guard::Boxed { class }, Value::Object(obj)) => obj.class_id() == *class,
            (Guard::Boxed { .. }, _) | (Guard::Unboxed { .. }, Value::Object(_)) => false,
            (Guard::Unboxed { class, repr }, value) => {
                value.repr() == *repr && resolver.class_of(value) == *class
            }
        }
    }

    #[inline]
    pub fn class(&self) -> ClassId {
        match self {
            Guard::Boxed { class } | Guard::Unboxed { class, .. } => *class,
        }
    }
}

// =============================================================================
// Entries
// =============================================================================

/// What a matching entry answers with.
#[derive(Debug, Clone)]
pub enum EntryTarget {
    /// Invoke the method.
    Method(Method),
    /// Invoke the missing-method handler with the message name prepended.
    MethodMissing(Method),
    /// Nothing applies; the send fails with a lookup failure.
    Missing,
}

impl EntryTarget {
    fn from_lookup(lookup: MethodLookup) -> (Self, TokenSet) {
        match lookup {
            MethodLookup::Found(result) => {
                let target = match result.target {
                    LookupTarget::Method(m) => EntryTarget::Method(m),
                    LookupTarget::MethodMissing(m) => EntryTarget::MethodMissing(m),
                };
                (target, result.tokens)
            }
            MethodLookup::NotFound { tokens } => (EntryTarget::Missing, tokens),
        }
    }

    /// Whether a send of this message would find a real method.
    #[inline]
    pub fn responds(&self) -> bool {
        matches!(self, EntryTarget::Method(_))
    }

    /// Perform the send.
    pub fn invoke(&self, name: Symbol, receiver: &Value, args: &[Value]) -> LodeResult<Value> {
        match self {
            EntryTarget::Method(method) => method.call(receiver, args),
            EntryTarget::MethodMissing(handler) => {
                let mut full: SmallVec<[Value; 8]> = SmallVec::with_capacity(args.len() + 1);
                full.push(Value::Symbol(name));
                full.extend(args.iter().cloned());
                handler.call(receiver, &full)
            }
            EntryTarget::Missing => Err(LodeError::undefined_method(name, receiver)),
        }
    }
}

/// One node of a dispatch chain. Immutable once linked.
#[derive(Debug)]
struct CacheEntry {
    name: Symbol,
    guard: Guard,
    target: EntryTarget,
    tokens: TokenSet,
    next: Option<Arc<CacheEntry>>,
}

impl CacheEntry {
    #[inline(always)]
    fn applies<R: MethodResolver + ?Sized>(
        &self,
        resolver: &R,
        name: Symbol,
        receiver: &Value,
    ) -> bool {
        self.name == name && all_valid(&self.tokens) && self.guard.matches(resolver, receiver)
    }

    /// Whether every token this entry depends on is still valid.
    #[inline]
    fn is_live(&self) -> bool {
        all_valid(&self.tokens)
    }
}

/// First entry of a chain that applies to the send.
#[inline]
fn find_applicable<'a, R: MethodResolver + ?Sized>(
    head: Option<&'a CacheEntry>,
    resolver: &R,
    name: Symbol,
    receiver: &Value,
) -> Option<&'a CacheEntry> {
    let mut cursor = head;
    while let Some(entry) = cursor {
        if entry.applies(resolver, name, receiver) {
            return Some(entry);
        }
        cursor = entry.next.as_deref();
    }
    None
}

// =============================================================================
// Dispatch Site
// =============================================================================

#[derive(Debug, Default)]
struct Chain {
    head: Option<Arc<CacheEntry>>,
    len: usize,
}

/// The cache of one send site.
#[derive(Debug)]
pub struct DispatchSite {
    chain: RwLock<Chain>,
    megamorphic: AtomicBool,
    limit: usize,
    counters: SiteCounters,
}

impl DispatchSite {
    /// Create an empty site that holds at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            chain: RwLock::new(Chain::default()),
            megamorphic: AtomicBool::new(false),
            limit,
            counters: SiteCounters::default(),
        }
    }

    /// Send `name` to `receiver`.
    pub fn dispatch<R: MethodResolver + ?Sized>(
        &self,
        resolver: &R,
        name: Symbol,
        receiver: &Value,
        args: &[Value],
    ) -> LodeResult<Value> {
        self.resolve(resolver, name, receiver).invoke(name, receiver, args)
    }

    /// Whether `receiver` has a method for `name`, answered from the same
    /// chain as `dispatch`.
    pub fn responds_to<R: MethodResolver + ?Sized>(
        &self,
        resolver: &R,
        name: Symbol,
        receiver: &Value,
    ) -> bool {
        self.resolve(resolver, name, receiver).responds()
    }

    /// Target for a send, from the chain or the slow path.
    #[inline]
    pub fn resolve<R: MethodResolver + ?Sized>(
        &self,
        resolver: &R,
        name: Symbol,
        receiver: &Value,
    ) -> EntryTarget {
        if !self.megamorphic.load(Ordering::Acquire) {
            let head = self.chain.read().head.clone();
            if let Some(entry) = find_applicable(head.as_deref(), resolver, name, receiver) {
                self.counters.hit();
                return entry.target.clone();
            }
        }
        self.specialize(resolver, name, receiver)
    }

    /// Slow path: full lookup, then prepend an entry or go megamorphic.
    ///
    /// Another thread may have installed an applicable entry while this one
    /// was looking up; that entry answers instead and nothing is prepended.
    #[cold]
    fn specialize<R: MethodResolver + ?Sized>(
        &self,
        resolver: &R,
        name: Symbol,
        receiver: &Value,
    ) -> EntryTarget {
        let class = resolver.class_of(receiver);
        let (target, tokens) = EntryTarget::from_lookup(resolver.lookup_method(class, name));

        if self.megamorphic.load(Ordering::Acquire) {
            self.counters.generic();
            return target;
        }

        let mut chain = self.chain.write();
        if self.megamorphic.load(Ordering::Relaxed) {
            self.counters.generic();
            return target;
        }
        if let Some(entry) = find_applicable(chain.head.as_deref(), resolver, name, receiver) {
            self.counters.hit();
            return entry.target.clone();
        }
        self.counters.miss();

        if chain.len >= self.limit {
            self.megamorphic.store(true, Ordering::Release);
            *chain = Chain::default();
            debug!(message = %name, limit = self.limit, "dispatch site went megamorphic");
            return target;
        }

        let guard = Guard::for_receiver(class, receiver);
        let entry = Arc::new(CacheEntry {
            name,
            guard,
            target: target.clone(),
            tokens,
            next: chain.head.take(),
        });
        chain.head = Some(entry);
        chain.len += 1;
        trace!(message = %name, ?guard, len = chain.len, "dispatch entry installed");
        target
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Entries currently linked, live or stale.
    pub fn len(&self) -> usize {
        self.chain.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries whose tokens are all still valid.
    pub fn live_entries(&self) -> usize {
        let head = self.chain.read().head.clone();
        let mut cursor = head.as_deref();
        let mut live = 0;
        while let Some(entry) = cursor {
            if entry.is_live() {
                live += 1;
            }
            cursor = entry.next.as_deref();
        }
        live
    }

    /// Guards of the linked entries, head first.
    pub fn guards(&self) -> Vec<Guard> {
        let head = self.chain.read().head.clone();
        let mut cursor = head.as_deref();
        let mut guards = Vec::new();
        while let Some(entry) = cursor {
            guards.push(entry.guard);
            cursor = entry.next.as_deref();
        }
        guards
    }

    #[inline]
    pub fn is_megamorphic(&self) -> bool {
        self.megamorphic.load(Ordering::Acquire)
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn stats(&self) -> SiteStats {
        self.counters.snapshot(self.len(), self.is_megamorphic())
    }
}

// =============================================================================
// Tests
// =============================================================================
