//! Runtime collaborator for the Lode lookup core.
//!
//! This crate owns the authoritative structure the caches specialize on:
//! - `ClassTable`: classes, method tables, per-(class, name) lookup tokens
//! - `MethodCache`: global lookup memo keyed by (class, name)
//! - `ScopeHeap`: captured scopes and their shapes
//! - `Binding`: reseatable handles on scope chains, with the uncached
//!   variable algorithms

pub mod binding;
pub mod class;
pub mod class_table;
pub mod method;
pub mod method_cache;
pub mod scope;

pub use binding::{Binding, SourceLocation, is_hidden_name};
pub use class::{ClassFlags, ClassObject};
pub use class_table::{BuiltinClasses, ClassTable, METHOD_MISSING};
pub use method::{
    LookupTarget, Method, MethodBody, MethodLookup, MethodLookupResult, MethodResolver,
};
pub use method_cache::MethodCache;
pub use scope::{ChainTrace, ResolvedSlot, ScopeHeap, ScopeId, ScopeShape, ShapeId, SlotId};
