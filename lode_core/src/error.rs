//! Errors reported to the hosting language.
//!
//! Every failure carries the offending name and a description of the binding
//! or receiver involved. None of them is retried inside the core; token
//! invalidation and megamorphic rewrites are never errors.

use crate::intern::Symbol;
use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// Why a variable name was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameErrorReason {
    /// The name is reserved for hidden/internal slots.
    BadName,
    /// No slot with that name exists anywhere in the chain.
    NotDefined,
}

impl fmt::Display for NameErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameErrorReason::BadName => write!(f, "bad local variable name"),
            NameErrorReason::NotDefined => write!(f, "local variable not defined"),
        }
    }
}

/// Errors raised by the lookup core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LodeError {
    /// Hidden name accessed directly, or no slot found on `get`.
    #[error("NameError: {reason} '{name}' for {binding}")]
    NameError {
        name: String,
        binding: String,
        reason: NameErrorReason,
    },

    /// No applicable method and no missing-method fallback.
    #[error("NoMethodError: undefined method '{message}' for {receiver}")]
    LookupFailure { message: String, receiver: String },

    /// Linking `ancestor` above `subject` would make a chain cyclic.
    #[error("StructuralViolation: inserting {ancestor} above {subject} would create a cycle")]
    StructuralViolation { subject: String, ancestor: String },

    /// A scope handle the heap never allocated.
    #[error("StructuralViolation: unknown {scope}")]
    UnknownScope { scope: String },

    /// A method body failed.
    #[error("{message}")]
    Raised { message: String },
}

impl LodeError {
    pub fn bad_local_name(name: Symbol, binding: impl fmt::Display) -> Self {
        LodeError::NameError {
            name: name.as_str().to_owned(),
            binding: binding.to_string(),
            reason: NameErrorReason::BadName,
        }
    }

    pub fn local_not_defined(name: Symbol, binding: impl fmt::Display) -> Self {
        LodeError::NameError {
            name: name.as_str().to_owned(),
            binding: binding.to_string(),
            reason: NameErrorReason::NotDefined,
        }
    }

    pub fn undefined_method(message: Symbol, receiver: &Value) -> Self {
        LodeError::LookupFailure {
            message: message.as_str().to_owned(),
            receiver: receiver.to_string(),
        }
    }

    pub fn cyclic_link(subject: impl fmt::Display, ancestor: impl fmt::Display) -> Self {
        LodeError::StructuralViolation {
            subject: subject.to_string(),
            ancestor: ancestor.to_string(),
        }
    }

    pub fn unknown_scope(scope: impl fmt::Display) -> Self {
        LodeError::UnknownScope {
            scope: scope.to_string(),
        }
    }

    pub fn raised(message: impl Into<String>) -> Self {
        LodeError::Raised {
            message: message.into(),
        }
    }

    /// Whether this is a NameError (of either reason).
    pub fn is_name_error(&self) -> bool {
        matches!(self, LodeError::NameError { .. })
    }
}

/// Result type for lookup core operations.
pub type LodeResult<T> = Result<T, LodeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::intern;

    #[test]
    fn test_name_error_display() {
        let err = LodeError::bad_local_name(intern("$x"), "#<Binding scope=3>");
        assert_eq!(
            err.to_string(),
            "NameError: bad local variable name '$x' for #<Binding scope=3>"
        );
        assert!(err.is_name_error());
    }

    #[test]
    fn test_not_defined_display() {
        let err = LodeError::local_not_defined(intern("y"), "#<Binding scope=0>");
        assert!(err.to_string().contains("local variable not defined 'y'"));
    }

    #[test]
    fn test_lookup_failure_display() {
        let err = LodeError::undefined_method(intern("frob"), &Value::Int(3));
        assert_eq!(err.to_string(), "NoMethodError: undefined method 'frob' for 3");
        assert!(!err.is_name_error());
    }

    #[test]
    fn test_structural_violation_display() {
        let err = LodeError::cyclic_link("scope 4", "scope 1");
        assert!(matches!(err, LodeError::StructuralViolation { .. }));
        assert!(err.to_string().contains("would create a cycle"));
    }

    #[test]
    fn test_unknown_scope_display() {
        let err = LodeError::unknown_scope("scope 10000");
        assert_eq!(err.to_string(), "StructuralViolation: unknown scope 10000");
        assert!(!err.is_name_error());
    }
}
