//! Shared foundation for the Lode adaptive lookup core.
//!
//! This crate provides:
//! - Runtime values (`Value`) and object handles with a reclassable class slot
//! - Interned message and variable names (`Symbol`)
//! - Validity tokens used to invalidate specialized caches
//! - Error types reported to the hosting language
//! - Cache configuration (chain limits, binding cache limits)

pub mod config;
pub mod error;
pub mod intern;
pub mod token;
pub mod value;

pub use config::{CacheConfig, ConfigError};
pub use error::{LodeError, LodeResult, NameErrorReason};
pub use intern::{Symbol, intern};
pub use token::{CyclicToken, TokenSet, ValidityToken, all_valid};
pub use value::{ClassId, ObjectRef, Repr, Value};
