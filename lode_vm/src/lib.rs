//! Self-specializing lookup caches for the Lode engine.
//!
//! - [`dispatch`]: per-site dispatch cache chains with a megamorphic tier
//! - [`binding_cache`]: per-site scope resolution caches
//! - [`site_table`]: registry of sites keyed by code unit and offset
//! - [`vm`]: the facade a front end calls into
//!
//! # Example
//!
//! ```ignore
//! use lode_core::{CacheConfig, Value, intern};
//! use lode_vm::Vm;
//!
//! let vm = Vm::new(CacheConfig::default())?;
//! let point = vm.classes().define_class("Point", None);
//! vm.classes().define_method(point, intern("x"), |_, _| Ok(Value::Int(1)));
//!
//! let site = vm.new_dispatch_site();
//! let obj = vm.classes().new_object(point);
//! assert_eq!(vm.dispatch(&site, intern("x"), &obj, &[])?, Value::Int(1));
//! ```

pub mod binding_cache;
pub mod dispatch;
pub mod site_stats;
pub mod site_table;
pub mod vm;

pub use binding_cache::LocalVariableSite;
pub use dispatch::{DispatchSite, EntryTarget, Guard};
pub use site_stats::{SiteBreakdown, SiteClassification, SiteStats};
pub use site_table::{SiteId, SiteTable};
pub use vm::{VariableOp, VariableOutcome, Vm};
