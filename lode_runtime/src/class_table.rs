//! The class table: authoritative method tables and full method lookup.
//!
//! Every mutation that can change the outcome of a lookup invalidates the
//! affected (class, name) tokens *before* it publishes the change:
//!
//! | mutation                  | tokens renewed                  |
//! |---------------------------|---------------------------------|
//! | `define_method(C, n)`     | (C, n)                          |
//! | `remove_method(C, n)`     | (C, n)                          |
//! | `set_superclass(C, S)`    | every token of C                |
//! | `singleton_class_of(obj)` | none; the receiver's class id changes instead |
//!
//! A lookup of `n` from class `K` collects the (class, n) token of every class
//! it walks through, so a definition anywhere between `K` and the owner of the
//! found method invalidates the result.

use crate::class::{ClassFlags, ClassObject};
use crate::method::{LookupTarget, Method, MethodLookup, MethodLookupResult, MethodResolver};
use crate::method_cache::MethodCache;
use lode_core::{ClassId, LodeError, LodeResult, ObjectRef, Symbol, TokenSet, Value, intern};
use parking_lot::RwLock;
use tracing::debug;

/// Name of the fallback handler consulted when a message is not understood.
pub const METHOD_MISSING: &str = "method_missing";

// =============================================================================
// Builtin Classes
// =============================================================================

/// Ids of the classes created at bootstrap.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinClasses {
    pub basic_object: ClassId,
    pub object: ClassId,
    pub nil_class: ClassId,
    pub true_class: ClassId,
    pub false_class: ClassId,
    pub integer: ClassId,
    pub float: ClassId,
    pub symbol: ClassId,
    pub string: ClassId,
}

// =============================================================================
// Class Table
// =============================================================================

/// Registry of all classes.
///
/// Interior locking lets call sites dispatch through a shared reference
/// while method bodies redefine methods.
pub struct ClassTable {
    classes: RwLock<Vec<ClassObject>>,
    builtins: BuiltinClasses,
    memo: Option<MethodCache>,
    method_missing: Symbol,
}

impl ClassTable {
    /// Bootstrap a table with the builtin hierarchy and the lookup memo.
    pub fn new() -> Self {
        Self::with_method_cache(true)
    }

    /// Bootstrap a table, optionally without the lookup memo.
    pub fn with_method_cache(enabled: bool) -> Self {
        let mut classes = Vec::with_capacity(16);
        let mut add = |name: &str, superclass: Option<ClassId>, flags: ClassFlags| {
            let id = ClassId(classes.len() as u32);
            classes.push(ClassObject::new(id, name.to_owned(), superclass, flags));
            id
        };

        let basic_object = add("BasicObject", None, ClassFlags::BUILTIN);
        let object = add("Object", Some(basic_object), ClassFlags::BUILTIN);
        let immediate = ClassFlags::BUILTIN | ClassFlags::IMMEDIATE;
        let builtins = BuiltinClasses {
            basic_object,
            object,
            nil_class: add("NilClass", Some(object), immediate),
            true_class: add("TrueClass", Some(object), immediate),
            false_class: add("FalseClass", Some(object), immediate),
            integer: add("Integer", Some(object), immediate),
            float: add("Float", Some(object), immediate),
            symbol: add("Symbol", Some(object), immediate),
            string: add("String", Some(object), immediate),
        };

        Self {
            classes: RwLock::new(classes),
            builtins,
            memo: enabled.then(MethodCache::new),
            method_missing: intern(METHOD_MISSING),
        }
    }

    #[inline]
    pub fn builtins(&self) -> &BuiltinClasses {
        &self.builtins
    }

    /// The lookup memo, if enabled.
    pub fn method_cache(&self) -> Option<&MethodCache> {
        self.memo.as_ref()
    }

    // =========================================================================
    // Class Definition
    // =========================================================================

    /// Define a new class. `None` inherits from `Object`.
    pub fn define_class(&self, name: &str, superclass: Option<ClassId>) -> ClassId {
        let superclass = superclass.unwrap_or(self.builtins.object);
        let mut classes = self.classes.write();
        let id = ClassId(classes.len() as u32);
        classes.push(ClassObject::new(
            id,
            name.to_owned(),
            Some(superclass),
            ClassFlags::empty(),
        ));
        debug!(class = name, id = id.raw(), "class defined");
        id
    }

    /// Allocate an instance.
    pub fn new_object(&self, class: ClassId) -> Value {
        Value::Object(ObjectRef::new(class))
    }

    pub fn class_name(&self, class: ClassId) -> String {
        self.classes.read()[class.index()].name().to_owned()
    }

    pub fn superclass_of(&self, class: ClassId) -> Option<ClassId> {
        self.classes.read()[class.index()].superclass()
    }

    pub fn is_singleton(&self, class: ClassId) -> bool {
        self.classes.read()[class.index()].is_singleton()
    }

    /// `class` followed by its superclasses, nearest first.
    pub fn ancestors(&self, class: ClassId) -> Vec<ClassId> {
        let classes = self.classes.read();
        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(id) = current {
            chain.push(id);
            current = classes[id.index()].superclass();
        }
        chain
    }

    /// Re-parent a class. Fails if `superclass` already inherits from
    /// `class`.
    pub fn set_superclass(&self, class: ClassId, superclass: ClassId) -> LodeResult<()> {
        let mut classes = self.classes.write();

        let mut current = Some(superclass);
        while let Some(id) = current {
            if id == class {
                return Err(LodeError::cyclic_link(
                    classes[class.index()].name(),
                    classes[superclass.index()].name(),
                ));
            }
            current = classes[id.index()].superclass();
        }

        let target = &mut classes[class.index()];
        target.renew_all_tokens();
        target.set_superclass(Some(superclass));
        debug!(class = target.name(), superclass = superclass.raw(), "superclass changed");
        Ok(())
    }

    /// The singleton class of `obj`, creating and attaching it on first use.
    ///
    /// Attaching changes the object's class id, so every dispatch entry that
    /// guarded on the old class stops matching this object.
    pub fn singleton_class_of(&self, obj: &ObjectRef) -> ClassId {
        let mut classes = self.classes.write();
        let current = obj.class_id();
        if classes[current.index()].attached_object() == Some(obj.id()) {
            return current;
        }

        let id = ClassId(classes.len() as u32);
        let name = format!("#<Class:#<object:{}>>", obj.id());
        debug!(class = %name, superclass = current.raw(), "singleton class attached");
        classes.push(ClassObject::singleton(id, name, current, obj.id()));
        obj.reclass(id);
        id
    }

    // =========================================================================
    // Method Tables
    // =========================================================================

    /// Define (or redefine) a method from a native body.
    pub fn define_method<F>(&self, class: ClassId, name: Symbol, body: F) -> Method
    where
        F: Fn(&Value, &[Value]) -> LodeResult<Value> + Send + Sync + 'static,
    {
        let method = Method::new(name, class, body);
        self.install_method(method.clone());
        method
    }

    /// Install a method in its owner's table.
    pub fn install_method(&self, method: Method) {
        let name = method.name();
        let mut classes = self.classes.write();
        let class = &mut classes[method.owner().index()];
        class.renew_token(name);
        let redefined = class.insert_method(method).is_some();
        debug!(class = class.name(), method = %name, redefined, "method installed");
    }

    /// Remove a method defined directly in `class`.
    pub fn remove_method(&self, class: ClassId, name: Symbol) -> Option<Method> {
        let mut classes = self.classes.write();
        let target = &mut classes[class.index()];
        target.renew_token(name);
        let removed = target.remove_method(name);
        if removed.is_some() {
            debug!(class = target.name(), method = %name, "method removed");
        }
        removed
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Full lookup without consulting the memo.
    pub fn lookup_uncached(&self, class: ClassId, name: Symbol) -> MethodLookup {
        let classes = self.classes.read();
        let mut tokens = TokenSet::new();

        if let Some(method) = Self::walk(&classes, class, name, &mut tokens) {
            return MethodLookup::Found(MethodLookupResult {
                target: LookupTarget::Method(method),
                tokens,
            });
        }

        if name != self.method_missing {
            if let Some(handler) = Self::walk(&classes, class, self.method_missing, &mut tokens) {
                return MethodLookup::Found(MethodLookupResult {
                    target: LookupTarget::MethodMissing(handler),
                    tokens,
                });
            }
        }

        MethodLookup::NotFound { tokens }
    }

    fn walk(
        classes: &[ClassObject],
        start: ClassId,
        name: Symbol,
        tokens: &mut TokenSet,
    ) -> Option<Method> {
        let mut current = Some(start);
        while let Some(id) = current {
            let class = &classes[id.index()];
            tokens.push(class.lookup_token(name));
            if let Some(method) = class.method(name) {
                return Some(method.clone());
            }
            current = class.superclass();
        }
        None
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodResolver for ClassTable {
    #[inline]
    fn class_of(&self, receiver: &Value) -> ClassId {
        let b = &self.builtins;
        match receiver {
            Value::Object(obj) => obj.class_id(),
            Value::Nil => b.nil_class,
            Value::Bool(true) => b.true_class,
            Value::Bool(false) => b.false_class,
            Value::Int(_) => b.integer,
            Value::Float(_) => b.float,
            Value::Symbol(_) => b.symbol,
            Value::Str(_) => b.string,
        }
    }

    fn lookup_method(&self, class: ClassId, name: Symbol) -> MethodLookup {
        if let Some(memo) = &self.memo {
            if let Some(hit) = memo.get(class, name) {
                return hit;
            }
            let lookup = self.lookup_uncached(class, name);
            memo.insert(class, name, lookup.clone());
            return lookup;
        }
        self.lookup_uncached(class, name)
    }
}

// =============================================================================
// Tests
// =============================================================================
