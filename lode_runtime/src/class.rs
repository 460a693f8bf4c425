//! Class objects.
//!
//! A class owns a method table and, for every name that has ever been looked
//! up through it, a cyclic validity token meaning "the lookup of this name in
//! this class is unchanged". Tokens are per (class, name) so redefining one
//! method never disturbs caches that depend on another.

use crate::method::Method;
use lode_core::{ClassId, CyclicToken, Symbol, ValidityToken};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

bitflags::bitflags! {
    /// Class attributes relevant to lookup.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassFlags: u8 {
        /// Created during bootstrap.
        const BUILTIN = 1 << 0;
        /// Per-object class attached to exactly one object.
        const SINGLETON = 1 << 1;
        /// Instances are unboxed primitives.
        const IMMEDIATE = 1 << 2;
    }
}

/// A class in the class table.
#[derive(Debug)]
pub struct ClassObject {
    id: ClassId,
    name: String,
    superclass: Option<ClassId>,
    flags: ClassFlags,
    /// Object id a singleton class is attached to.
    attached: Option<u64>,
    methods: FxHashMap<Symbol, Method>,
    /// Created lazily by lookups, so the class table can hand them out while
    /// only holding a shared lock.
    lookup_tokens: Mutex<FxHashMap<Symbol, CyclicToken>>,
}

impl ClassObject {
    pub(crate) fn new(
        id: ClassId,
        name: String,
        superclass: Option<ClassId>,
        flags: ClassFlags,
    ) -> Self {
        Self {
            id,
            name,
            superclass,
            flags,
            attached: None,
            methods: FxHashMap::default(),
            lookup_tokens: Mutex::new(FxHashMap::default()),
        }
    }

    pub(crate) fn singleton(
        id: ClassId,
        name: String,
        superclass: ClassId,
        object_id: u64,
    ) -> Self {
        let mut class = Self::new(id, name, Some(superclass), ClassFlags::SINGLETON);
        class.attached = Some(object_id);
        class
    }

    #[inline]
    pub fn id(&self) -> ClassId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn superclass(&self) -> Option<ClassId> {
        self.superclass
    }

    #[inline]
    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.flags.contains(ClassFlags::SINGLETON)
    }

    /// Object id this singleton class belongs to.
    #[inline]
    pub fn attached_object(&self) -> Option<u64> {
        self.attached
    }

    /// Method defined directly in this class (not inherited).
    #[inline]
    pub fn method(&self, name: Symbol) -> Option<&Method> {
        self.methods.get(&name)
    }

    /// Names defined directly in this class.
    pub fn method_names(&self) -> Vec<Symbol> {
        self.methods.keys().copied().collect()
    }

    /// Current token for "lookup of `name` through this class is unchanged".
    pub fn lookup_token(&self, name: Symbol) -> ValidityToken {
        let mut tokens = self.lookup_tokens.lock();
        tokens
            .entry(name)
            .or_insert_with(|| CyclicToken::new(format!("lookup of {} in {}", name, self.name)))
            .current()
    }

    /// Invalidate the token for one name. Names never looked up have no
    /// token and nothing can depend on them.
    pub(crate) fn renew_token(&self, name: Symbol) {
        if let Some(token) = self.lookup_tokens.lock().get(&name) {
            token.invalidate_and_renew();
        }
    }

    /// Invalidate every token of this class.
    pub(crate) fn renew_all_tokens(&self) {
        for token in self.lookup_tokens.lock().values() {
            token.invalidate_and_renew();
        }
    }

    pub(crate) fn insert_method(&mut self, method: Method) -> Option<Method> {
        self.methods.insert(method.name(), method)
    }

    pub(crate) fn remove_method(&mut self, name: Symbol) -> Option<Method> {
        self.methods.remove(&name)
    }

    pub(crate) fn set_superclass(&mut self, superclass: Option<ClassId>) {
        self.superclass = superclass;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::{Value, intern};

    fn class(name: &str) -> ClassObject {
        ClassObject::new(ClassId(7), name.to_owned(), None, ClassFlags::empty())
    }

    #[test]
    fn test_lookup_token_is_stable_until_renewed() {
        let c = class("Point");
        let x = intern("x");
        let first = c.lookup_token(x);
        let again = c.lookup_token(x);
        assert!(first.same_as(&again));
        assert_eq!(first.fact(), "lookup of x in Point");

        c.renew_token(x);
        assert!(!first.check());
        assert!(c.lookup_token(x).check());
    }

    #[test]
    fn test_renew_is_per_name() {
        let c = class("Point");
        let x = c.lookup_token(intern("x"));
        let y = c.lookup_token(intern("y"));

        c.renew_token(intern("x"));
        assert!(!x.check());
        assert!(y.check());
    }

    #[test]
    fn test_renew_all() {
        let c = class("Point");
        let x = c.lookup_token(intern("x"));
        let y = c.lookup_token(intern("y"));
        c.renew_all_tokens();
        assert!(!x.check());
        assert!(!y.check());
    }

    #[test]
    fn test_method_table() {
        let mut c = class("Point");
        let name = intern("norm");
        assert!(c.method(name).is_none());
        c.insert_method(Method::new(name, c.id(), |_, _| Ok(Value::Int(0))));
        assert!(c.method(name).is_some());
        assert_eq!(c.method_names(), vec![name]);
        assert!(c.remove_method(name).is_some());
        assert!(c.method(name).is_none());
    }

    #[test]
    fn test_singleton_flags() {
        let s = ClassObject::singleton(ClassId(9), "#<Class:x>".into(), ClassId(1), 42);
        assert!(s.is_singleton());
        assert_eq!(s.attached_object(), Some(42));
        assert_eq!(s.superclass(), Some(ClassId(1)));
    }
}
