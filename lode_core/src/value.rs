//! Runtime values seen by the lookup core.
//!
//! The core never inspects object fields; it only needs to know whether a
//! receiver is a heap object (and which class it currently has) or an unboxed
//! primitive (and which representation it uses).

use crate::intern::Symbol;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

// =============================================================================
// Class Identity
// =============================================================================

/// Identity of a class in the collaborator's class table.
///
/// Ids are never reused, so an id captured by a cache entry stays meaningful
/// for the lifetime of the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ClassId(pub u32);

impl ClassId {
    /// Raw table index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index into the class table.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// =============================================================================
// Representation
// =============================================================================

/// Primitive representation of a value.
///
/// Unboxed dispatch entries guard on this in addition to the class, mirroring
/// a check of the host-level type of the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Repr {
    Nil = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    Symbol = 4,
    Str = 5,
    Object = 6,
}

// =============================================================================
// Object Handles
// =============================================================================

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct ObjectCell {
    id: u64,
    class: AtomicU32,
}

/// Handle to a heap object.
///
/// Only the class slot is modeled. The slot is atomic because attaching a
/// singleton class reclassifies a live object while other sites may be
/// reading it.
#[derive(Clone)]
pub struct ObjectRef(Arc<ObjectCell>);

impl ObjectRef {
    /// Allocate a new object of the given class.
    pub fn new(class: ClassId) -> Self {
        Self(Arc::new(ObjectCell {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            class: AtomicU32::new(class.raw()),
        }))
    }

    /// Unique object id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Current class of the object.
    #[inline(always)]
    pub fn class_id(&self) -> ClassId {
        ClassId(self.0.class.load(Ordering::Acquire))
    }

    /// Move the object to another class.
    ///
    /// Intended for the class table when it attaches a singleton class.
    #[inline]
    pub fn reclass(&self, class: ClassId) {
        self.0.class.store(class.raw(), Ordering::Release);
    }

    /// Identity comparison.
    #[inline]
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<object:{} class={}>", self.id(), self.class_id().raw())
    }
}

// =============================================================================
// Value
// =============================================================================

/// A runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Symbol(Symbol),
    Str(Arc<str>),
    Object(ObjectRef),
}

impl Value {
    /// Build a string value.
    #[inline]
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    /// Primitive representation tag.
    #[inline(always)]
    pub fn repr(&self) -> Repr {
        match self {
            Value::Nil => Repr::Nil,
            Value::Bool(_) => Repr::Bool,
            Value::Int(_) => Repr::Int,
            Value::Float(_) => Repr::Float,
            Value::Symbol(_) => Repr::Symbol,
            Value::Str(_) => Repr::Str,
            Value::Object(_) => Repr::Object,
        }
    }

    /// Whether this value is a heap object.
    #[inline(always)]
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    #[inline]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Symbol(s) => write!(f, ":{}", s),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Object(obj) => write!(f, "#<object:{}>", obj.id()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Symbol> for Value {
    fn from(v: Symbol) -> Self {
        Value::Symbol(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::intern;

    #[test]
    fn test_repr_tags() {
        assert_eq!(Value::Nil.repr(), Repr::Nil);
        assert_eq!(Value::Bool(true).repr(), Repr::Bool);
        assert_eq!(Value::Int(1).repr(), Repr::Int);
        assert_eq!(Value::Float(1.5).repr(), Repr::Float);
        assert_eq!(Value::Symbol(intern("x")).repr(), Repr::Symbol);
        assert_eq!(Value::str("x").repr(), Repr::Str);
        assert_eq!(Value::Object(ObjectRef::new(ClassId(0))).repr(), Repr::Object);
    }

    #[test]
    fn test_object_identity_equality() {
        let a = ObjectRef::new(ClassId(3));
        let b = ObjectRef::new(ClassId(3));
        assert_eq!(Value::Object(a.clone()), Value::Object(a.clone()));
        assert_ne!(Value::Object(a), Value::Object(b));
    }

    #[test]
    fn test_reclass_is_visible_through_clones() {
        let obj = ObjectRef::new(ClassId(1));
        let alias = obj.clone();
        obj.reclass(ClassId(9));
        assert_eq!(alias.class_id(), ClassId(9));
    }

    #[test]
    fn test_object_ids_are_unique() {
        let a = ObjectRef::new(ClassId(0));
        let b = ObjectRef::new(ClassId(0));
        assert_ne!(a.id(), b.id());
    }
}
