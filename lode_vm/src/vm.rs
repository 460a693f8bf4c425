//! The engine facade.
//!
//! `Vm` owns the class table, the scope heap and the site table, and exposes
//! the operations a front end calls from its instructions: sends,
//! `respond_to?`, local-variable access through bindings, and binding
//! reflection.

use crate::binding_cache::LocalVariableSite;
use crate::dispatch::DispatchSite;
use crate::site_table::{SiteId, SiteTable};
use lode_core::{CacheConfig, ConfigError, LodeResult, Symbol, Value};
use lode_runtime::{Binding, ClassTable, ScopeHeap, ScopeId, SourceLocation};
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Variable Operations
// =============================================================================

/// A local-variable operation through a binding.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableOp {
    Get,
    Set(Value),
    Defined,
}

/// Result of a `VariableOp`.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableOutcome {
    /// Read or written value.
    Value(Value),
    /// Answer to `Defined`.
    Defined(bool),
}

impl VariableOutcome {
    pub fn into_value(self) -> Option<Value> {
        match self {
            VariableOutcome::Value(v) => Some(v),
            VariableOutcome::Defined(_) => None,
        }
    }

    pub fn as_defined(&self) -> Option<bool> {
        match self {
            VariableOutcome::Defined(d) => Some(*d),
            VariableOutcome::Value(_) => None,
        }
    }
}

// =============================================================================
// Vm
// =============================================================================

/// One engine instance.
pub struct Vm {
    config: CacheConfig,
    classes: ClassTable,
    scopes: ScopeHeap,
    sites: SiteTable,
}

impl Vm {
    /// Build an engine. Fails if a cache limit is zero.
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(
            dispatch_chain_limit = config.dispatch_chain_limit,
            binding_cache_limit = config.binding_cache_limit,
            method_cache = config.method_cache_enabled,
            "vm created"
        );
        Ok(Self {
            classes: ClassTable::with_method_cache(config.method_cache_enabled),
            scopes: ScopeHeap::new(),
            sites: SiteTable::new(&config),
            config,
        })
    }

    /// Build an engine from `LODE_*` environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(CacheConfig::from_env())
    }

    #[inline]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[inline]
    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    #[inline]
    pub fn scopes(&self) -> &ScopeHeap {
        &self.scopes
    }

    #[inline]
    pub fn sites(&self) -> &SiteTable {
        &self.sites
    }

    // =========================================================================
    // Sites
    // =========================================================================

    /// Registered send site.
    pub fn dispatch_site(&self, id: SiteId) -> Arc<DispatchSite> {
        self.sites.dispatch_site(id)
    }

    /// Registered variable-access site.
    pub fn variable_site(&self, id: SiteId) -> Arc<LocalVariableSite> {
        self.sites.variable_site(id)
    }

    /// Unregistered send site with the configured limit.
    pub fn new_dispatch_site(&self) -> DispatchSite {
        DispatchSite::new(self.config.dispatch_chain_limit)
    }

    /// Unregistered variable-access site with the configured limit.
    pub fn new_variable_site(&self) -> LocalVariableSite {
        LocalVariableSite::new(self.config.binding_cache_limit)
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    pub fn dispatch(
        &self,
        site: &DispatchSite,
        name: Symbol,
        receiver: &Value,
        args: &[Value],
    ) -> LodeResult<Value> {
        site.dispatch(&self.classes, name, receiver, args)
    }

    pub fn responds_to(&self, site: &DispatchSite, name: Symbol, receiver: &Value) -> bool {
        site.responds_to(&self.classes, name, receiver)
    }

    // =========================================================================
    // Local Variables
    // =========================================================================

    pub fn resolve_variable(
        &self,
        site: &LocalVariableSite,
        binding: &mut Binding,
        name: Symbol,
        op: VariableOp,
    ) -> LodeResult<VariableOutcome> {
        match op {
            VariableOp::Get => site.get(&self.scopes, binding, name).map(VariableOutcome::Value),
            VariableOp::Set(value) => site
                .set(&self.scopes, binding, name, value)
                .map(VariableOutcome::Value),
            VariableOp::Defined => site
                .defined(&self.scopes, binding, name)
                .map(VariableOutcome::Defined),
        }
    }

    pub fn local_variable_get(
        &self,
        site: &LocalVariableSite,
        binding: &Binding,
        name: Symbol,
    ) -> LodeResult<Value> {
        site.get(&self.scopes, binding, name)
    }

    pub fn local_variable_set(
        &self,
        site: &LocalVariableSite,
        binding: &mut Binding,
        name: Symbol,
        value: Value,
    ) -> LodeResult<Value> {
        site.set(&self.scopes, binding, name, value)
    }

    pub fn local_variable_defined(
        &self,
        site: &LocalVariableSite,
        binding: &Binding,
        name: Symbol,
    ) -> LodeResult<bool> {
        site.defined(&self.scopes, binding, name)
    }

    pub fn list_variable_names(
        &self,
        site: &LocalVariableSite,
        binding: &Binding,
    ) -> LodeResult<Vec<Symbol>> {
        site.names(&self.scopes, binding)
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Binding on a fresh outermost scope with `receiver` as `self`.
    pub fn top_level_binding(&self, receiver: Value) -> Binding {
        Binding::new(self.scopes.root_scope(receiver))
    }

    /// Binding on an existing scope (a block entry or a caller's frame).
    pub fn capture_binding(&self, scope: ScopeId, location: Option<SourceLocation>) -> Binding {
        Binding::capture(scope, location)
    }

    /// Splice `ancestor` above the outermost scope of `binding`'s chain.
    ///
    /// Fails with a structural violation on a cycle or on a scope this
    /// engine never allocated.
    pub fn graft_ancestor(&self, binding: &mut Binding, ancestor: ScopeId) -> LodeResult<()> {
        binding.insert_ancestor(&self.scopes, ancestor)
    }

    pub fn duplicate_binding(&self, binding: &Binding) -> Binding {
        binding.duplicate()
    }

    pub fn binding_receiver(&self, binding: &Binding) -> LodeResult<Value> {
        binding.receiver(&self.scopes)
    }

    pub fn binding_source_location(&self, binding: &Binding) -> Option<(Arc<str>, u32)> {
        binding
            .location()
            .map(|loc| (Arc::clone(&loc.file), loc.line))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self {
            config: CacheConfig::default(),
            classes: ClassTable::new(),
            scopes: ScopeHeap::new(),
            sites: SiteTable::new(&CacheConfig::default()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
