//! End-to-end tests for local-variable access through bindings.
//!
//! Coverage:
//! - set/get/defined? round trips and hidden-name rejection
//! - duplicate bindings sharing scopes but not new names
//! - ancestor grafting, including cycle rejection
//! - cached entries staying correct across structural changes

use lode_core::{CacheConfig, LodeError, Symbol, Value, intern};
use lode_runtime::{Binding, ScopeId, SlotId, SourceLocation};
use lode_vm::{SiteClassification, VariableOp, VariableOutcome, Vm};

fn vm() -> Vm {
    Vm::new(CacheConfig::default()).unwrap()
}

fn syms(names: &[&str]) -> Vec<Symbol> {
    names.iter().map(|n| intern(n)).collect()
}

// =============================================================================
// Set / Get / Defined
// =============================================================================

mod access {
    use super::*;

    #[test]
    fn test_set_then_get_and_defined() {
        let vm = vm();
        let set_site = vm.new_variable_site();
        let get_site = vm.new_variable_site();
        let def_site = vm.new_variable_site();
        let mut b = vm.top_level_binding(Value::Nil);

        for (i, name) in ["alpha", "beta", "gamma"].into_iter().enumerate() {
            let name = intern(name);
            let value = Value::Int(i as i64);
            vm.local_variable_set(&set_site, &mut b, name, value.clone()).unwrap();
            assert_eq!(vm.local_variable_get(&get_site, &b, name).unwrap(), value);
            assert!(vm.local_variable_defined(&def_site, &b, name).unwrap());
        }
    }

    #[test]
    fn test_get_undefined_is_name_error() {
        let vm = vm();
        let site = vm.new_variable_site();
        let b = vm.top_level_binding(Value::Nil);
        let err = vm.local_variable_get(&site, &b, intern("ghost")).unwrap_err();
        match err {
            LodeError::NameError { name, .. } => assert_eq!(name, "ghost"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_hidden_names_always_fail() {
        let vm = vm();
        let site = vm.new_variable_site();
        let mut b = vm.top_level_binding(Value::Nil);

        // Plant a hidden slot directly, as a front end would for temporaries
        let scope = b.scope();
        let slot = vm.scopes().declare(scope, intern("$last_match")).unwrap();
        vm.scopes().write_slot(scope, slot, Value::Int(1)).unwrap();

        for hidden in ["$last_match", "__lode_temp_0"] {
            let name = intern(hidden);
            let set = vm.local_variable_set(&site, &mut b, name, Value::Nil);
            assert!(set.unwrap_err().is_name_error());
            assert!(vm.local_variable_get(&site, &b, name).unwrap_err().is_name_error());
            assert!(vm.local_variable_defined(&site, &b, name).unwrap_err().is_name_error());
        }
        let names = vm.list_variable_names(&site, &b).unwrap();
        assert!(!names.contains(&intern("$last_match")));
    }

    #[test]
    fn test_set_returns_value() {
        let vm = vm();
        let site = vm.new_variable_site();
        let mut b = vm.top_level_binding(Value::Nil);
        let out = vm
            .resolve_variable(&site, &mut b, intern("s"), VariableOp::Set(Value::str("hi")))
            .unwrap();
        assert_eq!(out, VariableOutcome::Value(Value::str("hi")));
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let vm = vm();
        let heap = vm.scopes();
        let outer = heap.push_scope(heap.new_shape(&syms(&["v"])), None, Value::Nil).unwrap();
        heap.write_slot(outer, SlotId(0), Value::Int(1)).unwrap();
        let inner = heap.child_scope(outer, heap.new_shape(&syms(&["v"]))).unwrap();
        heap.write_slot(inner, SlotId(0), Value::Int(2)).unwrap();

        let site = vm.new_variable_site();
        let b = Binding::new(inner);
        assert_eq!(vm.local_variable_get(&site, &b, intern("v")).unwrap(), Value::Int(2));
        assert_eq!(vm.list_variable_names(&site, &b).unwrap(), syms(&["v"]));
    }
}

// =============================================================================
// Duplicates
// =============================================================================

mod duplicates {
    use super::*;

    #[test]
    fn test_new_name_on_duplicate_is_private() {
        let vm = vm();
        let site = vm.new_variable_site();
        let mut original = vm.top_level_binding(Value::Nil);
        vm.local_variable_set(&site, &mut original, intern("shared"), Value::Int(1)).unwrap();

        let mut copy = vm.duplicate_binding(&original);
        vm.local_variable_set(&site, &mut copy, intern("mine"), Value::Int(2)).unwrap();

        assert!(vm.local_variable_get(&site, &original, intern("mine")).is_err());
        assert!(!vm.local_variable_defined(&site, &original, intern("mine")).unwrap());
        assert_eq!(vm.local_variable_get(&site, &copy, intern("mine")).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_existing_name_is_shared_both_ways() {
        let vm = vm();
        let site = vm.new_variable_site();
        let mut original = vm.top_level_binding(Value::Nil);
        vm.local_variable_set(&site, &mut original, intern("n"), Value::Int(1)).unwrap();
        let mut copy = vm.duplicate_binding(&original);

        vm.local_variable_set(&site, &mut copy, intern("n"), Value::Int(2)).unwrap();
        assert_eq!(vm.local_variable_get(&site, &original, intern("n")).unwrap(), Value::Int(2));

        vm.local_variable_set(&site, &mut original, intern("n"), Value::Int(3)).unwrap();
        assert_eq!(vm.local_variable_get(&site, &copy, intern("n")).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_duplicate_keeps_receiver_and_location() {
        let vm = vm();
        let top = vm.top_level_binding(Value::Int(42));
        let b = vm.capture_binding(top.scope(), Some(SourceLocation::new("eval", 7)));
        let dup = vm.duplicate_binding(&b);
        assert_eq!(vm.binding_receiver(&dup).unwrap(), Value::Int(42));
        assert_eq!(vm.binding_source_location(&dup).map(|(_, line)| line), Some(7));
    }
}

// =============================================================================
// Grafting
// =============================================================================

mod grafting {
    use super::*;

    fn ancestor_with(vm: &Vm, names: &[&str]) -> ScopeId {
        let heap = vm.scopes();
        let scope = heap.push_scope(heap.new_shape(&syms(names)), None, Value::Nil).unwrap();
        for i in 0..names.len() {
            heap.write_slot(scope, SlotId(i as u32), Value::Int(100 + i as i64)).unwrap();
        }
        scope
    }

    #[test]
    fn test_graft_exposes_ancestor_names() {
        let vm = vm();
        let site = vm.new_variable_site();
        let names_site = vm.new_variable_site();
        let mut b = vm.top_level_binding(Value::Nil);
        vm.local_variable_set(&site, &mut b, intern("local"), Value::Int(1)).unwrap();
        assert_eq!(vm.list_variable_names(&names_site, &b).unwrap(), syms(&["local"]));

        let ancestor = ancestor_with(&vm, &["up1", "up2"]);
        vm.graft_ancestor(&mut b, ancestor).unwrap();

        let names = vm.list_variable_names(&names_site, &b).unwrap();
        assert_eq!(names, syms(&["local", "up1", "up2"]));
        assert_eq!(vm.local_variable_get(&site, &b, intern("up2")).unwrap(), Value::Int(101));
    }

    #[test]
    fn test_cached_get_survives_graft() {
        let vm = vm();
        let site = vm.new_variable_site();
        let mut b = vm.top_level_binding(Value::Nil);
        vm.local_variable_set(&site, &mut b, intern("pre"), Value::Int(5)).unwrap();

        let get_site = vm.new_variable_site();
        assert_eq!(vm.local_variable_get(&get_site, &b, intern("pre")).unwrap(), Value::Int(5));
        assert_eq!(vm.local_variable_get(&get_site, &b, intern("pre")).unwrap(), Value::Int(5));

        let before = b.scope();
        vm.graft_ancestor(&mut b, ancestor_with(&vm, &["post"])).unwrap();
        assert_ne!(b.scope(), before);
        assert_eq!(vm.local_variable_get(&get_site, &b, intern("pre")).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_negative_entry_misses_after_graft() {
        let vm = vm();
        let site = vm.new_variable_site();
        let mut b = vm.top_level_binding(Value::Nil);
        let stale_view = vm.duplicate_binding(&b);

        assert!(!vm.local_variable_defined(&site, &stale_view, intern("late")).unwrap());
        assert!(!vm.local_variable_defined(&site, &stale_view, intern("late")).unwrap());

        vm.graft_ancestor(&mut b, ancestor_with(&vm, &["late"])).unwrap();

        // The old binding still sits on the old scope, whose chain grew
        assert!(vm.local_variable_defined(&site, &stale_view, intern("late")).unwrap());
    }

    #[test]
    fn test_graft_of_own_chain_is_rejected() {
        let vm = vm();
        let site = vm.new_variable_site();
        let mut b = vm.top_level_binding(Value::Nil);
        let root = b.scope();
        vm.local_variable_set(&site, &mut b, intern("x"), Value::Int(1)).unwrap();
        vm.local_variable_set(&site, &mut b, intern("y"), Value::Int(2)).unwrap();
        let chain = vm.scopes().chain(b.scope());
        let current = b.scope();

        for target in [root, current] {
            let err = vm.graft_ancestor(&mut b, target).unwrap_err();
            assert!(matches!(err, LodeError::StructuralViolation { .. }));
        }
        assert_eq!(b.scope(), current);
        assert_eq!(vm.scopes().chain(b.scope()), chain);
        assert_eq!(vm.local_variable_get(&site, &b, intern("x")).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_graft_rejects_ancestor_reaching_into_chain() {
        let vm = vm();
        let mut b = vm.top_level_binding(Value::Nil);
        let root = b.scope();
        let sibling = vm.scopes().child_scope(root, vm.scopes().new_shape(&[])).unwrap();

        let err = vm.graft_ancestor(&mut b, sibling).unwrap_err();
        assert!(matches!(err, LodeError::StructuralViolation { .. }));
        assert_eq!(vm.scopes().parent_of(root), None);
    }

    #[test]
    fn test_graft_of_unallocated_scope_is_reported() {
        let vm = vm();
        let site = vm.new_variable_site();
        let mut b = vm.top_level_binding(Value::Nil);
        vm.local_variable_set(&site, &mut b, intern("x"), Value::Int(1)).unwrap();
        let current = b.scope();
        let chain = vm.scopes().chain(current);

        let err = vm.graft_ancestor(&mut b, ScopeId(10_000)).unwrap_err();
        assert_eq!(
            err,
            LodeError::UnknownScope {
                scope: "scope 10000".into(),
            }
        );
        assert_eq!(b.scope(), current);
        assert_eq!(vm.scopes().chain(current), chain);
        assert_eq!(vm.local_variable_get(&site, &b, intern("x")).unwrap(), Value::Int(1));
    }
}

// =============================================================================
// Site Behavior
// =============================================================================

mod sites {
    use super::*;

    #[test]
    fn test_loop_sets_share_one_shape() {
        let vm = vm();
        let site = vm.new_variable_site();
        let base = vm.scopes().new_shape(&[]);
        let mut produced = Vec::new();

        for i in 0..5 {
            let scope = vm.scopes().push_scope(base.clone(), None, Value::Nil).unwrap();
            let mut b = Binding::new(scope);
            vm.local_variable_set(&site, &mut b, intern("i"), Value::Int(i)).unwrap();
            produced.push(vm.scopes().shape_id_of(b.scope()).unwrap());
        }
        produced.dedup();
        assert_eq!(produced.len(), 1);
        assert_eq!(site.stats().classification, SiteClassification::Monomorphic);
    }

    #[test]
    fn test_generic_site_stays_correct() {
        let vm = Vm::new(CacheConfig::monomorphic()).unwrap();
        let site = vm.new_variable_site();
        let mut b = vm.top_level_binding(Value::Nil);

        for i in 0..6 {
            let name = intern(&format!("v{i}"));
            vm.local_variable_set(&site, &mut b, name, Value::Int(i)).unwrap();
        }
        assert!(site.is_generic());
        for i in 0..6 {
            let name = intern(&format!("v{i}"));
            assert_eq!(vm.local_variable_get(&site, &b, name).unwrap(), Value::Int(i));
        }
        assert_eq!(vm.list_variable_names(&site, &b).unwrap().len(), 6);
    }

    #[test]
    fn test_registered_variable_site() {
        let vm = vm();
        let id = lode_vm::SiteId::new(3, 12);
        let b = vm.top_level_binding(Value::Nil);
        for _ in 0..3 {
            let site = vm.variable_site(id);
            assert!(!vm.local_variable_defined(&site, &b, intern("q")).unwrap());
        }
        let stats = vm.sites().variable_stats(id).unwrap();
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }
}
