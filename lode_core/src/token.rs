//! Validity tokens.
//!
//! A token stands for one fact about program structure ("the lookup of `foo`
//! in class `A` is unchanged", "shape 12 has no additional slots"). Caches
//! capture the tokens their specialization depends on and test them before
//! every use. Mutators invalidate the token *before* the mutation becomes
//! observable.
//!
//! # Ordering
//!
//! Invalidation is a `Release` store and checks are `Acquire` loads, so a
//! holder that observes a token as valid also observes every write that
//! happened before the token was issued, and a holder that reads a mutated
//! structure after the mutator published it will see the token invalid.
//!
//! # Lifecycle
//!
//! ```text
//!   issue() ──► valid ──invalidate()──► invalid (forever)
//! ```
//!
//! A `CyclicToken` keeps "the current token for a fact" and replaces it with
//! a fresh one on every change.

use parking_lot::RwLock;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::trace;

// =============================================================================
// Validity Token
// =============================================================================

struct TokenState {
    valid: AtomicBool,
    fact: Box<str>,
}

/// Shared handle to a one-way validity flag.
///
/// Cloning the handle shares the flag; every holder observes the
/// invalidation.
#[derive(Clone)]
pub struct ValidityToken(Arc<TokenState>);

impl ValidityToken {
    /// Issue a new token in the valid state.
    pub fn issue(fact: impl Into<String>) -> Self {
        Self(Arc::new(TokenState {
            valid: AtomicBool::new(true),
            fact: fact.into().into_boxed_str(),
        }))
    }

    /// Whether the fact still holds. Never has side effects.
    #[inline(always)]
    pub fn check(&self) -> bool {
        self.0.valid.load(Ordering::Acquire)
    }

    /// Permanently invalidate the token.
    ///
    /// Idempotent; returns `true` only for the call that flipped it.
    pub fn invalidate(&self) -> bool {
        let was_valid = self.0.valid.swap(false, Ordering::AcqRel);
        if was_valid {
            trace!(fact = %self.0.fact, "validity token invalidated");
        }
        was_valid
    }

    /// Description of the fact this token stands for.
    pub fn fact(&self) -> &str {
        &self.0.fact
    }

    /// Whether two handles share the same flag.
    #[inline]
    pub fn same_as(&self, other: &ValidityToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ValidityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidityToken")
            .field("fact", &self.fact())
            .field("valid", &self.check())
            .finish()
    }
}

/// Inline storage for the tokens one cache entry depends on.
///
/// Most method lookups walk one or two classes.
pub type TokenSet = SmallVec<[ValidityToken; 4]>;

/// Whether every token in the set is still valid.
#[inline(always)]
pub fn all_valid(tokens: &[ValidityToken]) -> bool {
    tokens.iter().all(ValidityToken::check)
}

// =============================================================================
// Cyclic Token
// =============================================================================

/// The current token for a fact that may change many times.
///
/// Each change invalidates the outstanding token and installs a fresh one,
/// so caches built after the change depend on the new token only.
pub struct CyclicToken {
    fact: Box<str>,
    current: RwLock<ValidityToken>,
}

impl CyclicToken {
    /// Create a holder with a valid initial token.
    pub fn new(fact: impl Into<String>) -> Self {
        let fact = fact.into().into_boxed_str();
        let current = ValidityToken::issue(&*fact);
        Self {
            fact,
            current: RwLock::new(current),
        }
    }

    /// The token representing the current state of the fact.
    #[inline]
    pub fn current(&self) -> ValidityToken {
        self.current.read().clone()
    }

    /// Invalidate the outstanding token and issue a replacement.
    ///
    /// Call this before making the change visible.
    pub fn invalidate_and_renew(&self) {
        let mut slot = self.current.write();
        slot.invalidate();
        *slot = ValidityToken::issue(&*self.fact);
    }

    pub fn fact(&self) -> &str {
        &self.fact
    }
}

impl fmt::Debug for CyclicToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CyclicToken")
            .field("fact", &self.fact())
            .finish()
    }
}
