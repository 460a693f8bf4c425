//! Cache configuration.
//!
//! All limits are tunable per embedding. Values are resolved once when the
//! engine is built; sites copy the limit they need at construction.
//!
//! # Example
//!
//! ```ignore
//! use lode_core::CacheConfig;
//!
//! // Keep fewer specializations per site for a memory-constrained host
//! let config = CacheConfig {
//!     dispatch_chain_limit: 4,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use thiserror::Error;

/// Environment variable overriding `dispatch_chain_limit`.
pub const ENV_DISPATCH_CACHE: &str = "LODE_DISPATCH_CACHE";
/// Environment variable overriding `binding_cache_limit`.
pub const ENV_BINDING_CACHE: &str = "LODE_BINDING_CACHE";
/// Environment variable toggling the global lookup memo.
pub const ENV_METHOD_CACHE: &str = "LODE_METHOD_CACHE";

/// Limits for the dispatch and scope resolution caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries in one call site's dispatch chain.
    ///
    /// A miss on a full chain rewrites the site to the megamorphic tier.
    ///
    /// Default: 8
    pub dispatch_chain_limit: usize,

    /// Maximum number of distinct shape-keyed entries at one variable
    /// access site before it falls back to the uncached walk for good.
    ///
    /// Default: 4
    pub binding_cache_limit: usize,

    /// Whether the class table memoizes lookups by (class, name).
    ///
    /// Default: true
    pub method_cache_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dispatch_chain_limit: 8,
            binding_cache_limit: 4,
            method_cache_enabled: true,
        }
    }
}

impl CacheConfig {
    /// Configuration that never specializes beyond one entry per site.
    pub fn monomorphic() -> Self {
        Self {
            dispatch_chain_limit: 1,
            binding_cache_limit: 1,
            ..Default::default()
        }
    }

    /// Configuration for heavily polymorphic code.
    pub fn wide() -> Self {
        Self {
            dispatch_chain_limit: 16,
            binding_cache_limit: 8,
            ..Default::default()
        }
    }

    /// Defaults overridden by `LODE_*` environment variables.
    ///
    /// Unparseable values are ignored and leave the default in place.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dispatch_chain_limit: Self::env_usize(ENV_DISPATCH_CACHE)
                .unwrap_or(defaults.dispatch_chain_limit),
            binding_cache_limit: Self::env_usize(ENV_BINDING_CACHE)
                .unwrap_or(defaults.binding_cache_limit),
            method_cache_enabled: Self::env_bool(ENV_METHOD_CACHE)
                .unwrap_or(defaults.method_cache_enabled),
        }
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch_chain_limit == 0 {
            return Err(ConfigError::ZeroDispatchLimit);
        }
        if self.binding_cache_limit == 0 {
            return Err(ConfigError::ZeroBindingLimit);
        }
        Ok(())
    }

    fn env_usize(key: &str) -> Option<usize> {
        Self::parse_usize(std::env::var(key).ok()?.as_str())
    }

    fn env_bool(key: &str) -> Option<bool> {
        Self::parse_bool(std::env::var(key).ok()?.as_str())
    }

    fn parse_usize(raw: &str) -> Option<usize> {
        raw.trim().parse().ok()
    }

    fn parse_bool(raw: &str) -> Option<bool> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" => Some(false),
            _ => None,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("dispatch chain limit must be at least 1")]
    ZeroDispatchLimit,
    #[error("binding cache limit must be at least 1")]
    ZeroBindingLimit,
}
