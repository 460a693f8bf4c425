//! Callable targets and method lookup results.
//!
//! A lookup result pairs the target with the validity tokens that justify it.
//! Dispatch caches copy both into their entries; as long as every token is
//! valid the target is still what a full lookup would return.

use lode_core::{ClassId, LodeResult, Symbol, TokenSet, Value};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Method
// =============================================================================

/// Native body of a method: `(receiver, args) -> result`.
pub type MethodBody = Arc<dyn Fn(&Value, &[Value]) -> LodeResult<Value> + Send + Sync>;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// A method installed in a class's method table.
///
/// Every definition gets a fresh serial, so a redefinition with the same
/// name and owner is still distinguishable from the original.
#[derive(Clone)]
pub struct Method {
    name: Symbol,
    owner: ClassId,
    serial: u64,
    body: MethodBody,
}

impl Method {
    /// Wrap a native body.
    pub fn new<F>(name: Symbol, owner: ClassId, body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> LodeResult<Value> + Send + Sync + 'static,
    {
        Self::from_body(name, owner, Arc::new(body))
    }

    /// Wrap an already shared body.
    pub fn from_body(name: Symbol, owner: ClassId, body: MethodBody) -> Self {
        Self {
            name,
            owner,
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            body,
        }
    }

    #[inline]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// Class whose method table holds this method.
    #[inline]
    pub fn owner(&self) -> ClassId {
        self.owner
    }

    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Invoke the body.
    #[inline]
    pub fn call(&self, receiver: &Value, args: &[Value]) -> LodeResult<Value> {
        (self.body)(receiver, args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("serial", &self.serial)
            .finish()
    }
}

// =============================================================================
// Lookup Result
// =============================================================================

/// What a successful lookup resolved to.
#[derive(Debug, Clone)]
pub enum LookupTarget {
    /// The method named by the message.
    Method(Method),
    /// The receiver's missing-method handler; it receives the message name
    /// as its first argument.
    MethodMissing(Method),
}

impl LookupTarget {
    #[inline]
    pub fn method(&self) -> &Method {
        match self {
            LookupTarget::Method(m) | LookupTarget::MethodMissing(m) => m,
        }
    }
}

/// A resolved target plus the tokens it depends on.
#[derive(Debug, Clone)]
pub struct MethodLookupResult {
    pub target: LookupTarget,
    pub tokens: TokenSet,
}

/// Outcome of a full method lookup.
#[derive(Debug, Clone)]
pub enum MethodLookup {
    Found(MethodLookupResult),
    /// No method and no missing-method handler. The tokens cover every
    /// method table that was searched, so the negative answer can be cached.
    NotFound { tokens: TokenSet },
}

impl MethodLookup {
    /// Tokens the outcome depends on.
    #[inline]
    pub fn tokens(&self) -> &TokenSet {
        match self {
            MethodLookup::Found(result) => &result.tokens,
            MethodLookup::NotFound { tokens } => tokens,
        }
    }

    #[inline]
    pub fn is_found(&self) -> bool {
        matches!(self, MethodLookup::Found(_))
    }
}

// =============================================================================
// Resolver Seam
// =============================================================================

/// What the dispatch caches need from the class system.
///
/// The caches never read method tables directly; every slow path goes
/// through this trait.
pub trait MethodResolver {
    /// Current class of a receiver. For objects this reads the (possibly
    /// singleton) class slot; for primitives it is fixed by representation.
    fn class_of(&self, receiver: &Value) -> ClassId;

    /// Full lookup of `name` starting at `class`, including the
    /// missing-method fallback policy.
    fn lookup_method(&self, class: ClassId, name: Symbol) -> MethodLookup;
}
