//! Global symbol interning.
//!
//! Message names and variable names are compared by identity on every cache
//! probe, so they are interned once into a process-wide table and carried
//! around as a 4-byte `Symbol`. Interned strings are leaked; the set of names
//! a program uses is small and lives as long as the program.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::OnceLock;

// =============================================================================
// Symbol
// =============================================================================

/// An interned name.
///
/// Two symbols are equal iff they were interned from equal strings, so
/// equality is a single integer compare.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Symbol(u32);

impl Symbol {
    /// Raw table index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The interned text.
    pub fn as_str(self) -> &'static str {
        interner().read().names[self.0 as usize]
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Interner
// =============================================================================

#[derive(Default)]
struct Interner {
    map: FxHashMap<&'static str, Symbol>,
    names: Vec<&'static str>,
}

static INTERNER: OnceLock<RwLock<Interner>> = OnceLock::new();

#[inline]
fn interner() -> &'static RwLock<Interner> {
    INTERNER.get_or_init(|| RwLock::new(Interner::default()))
}

/// Intern a name, returning its symbol.
///
/// The read path takes only a shared lock; the write lock is taken once per
/// distinct name.
pub fn intern(name: &str) -> Symbol {
    if let Some(&sym) = interner().read().map.get(name) {
        return sym;
    }

    let mut table = interner().write();
    // Another thread may have won the race between the two locks.
    if let Some(&sym) = table.map.get(name) {
        return sym;
    }
    let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
    let sym = Symbol(table.names.len() as u32);
    table.names.push(leaked);
    table.map.insert(leaked, sym);
    sym
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_identity() {
        let a = intern("foo");
        let b = intern("foo");
        let c = intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_as_str_round_trips() {
        let sym = intern("local_variable_get");
        assert_eq!(sym.as_str(), "local_variable_get");
        assert_eq!(format!("{}", sym), "local_variable_get");
        assert_eq!(format!("{:?}", sym), ":local_variable_get");
    }

    #[test]
    fn test_intern_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| intern("shared_across_threads")))
            .collect();
        let syms: Vec<Symbol> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(syms.windows(2).all(|w| w[0] == w[1]));
    }
}
