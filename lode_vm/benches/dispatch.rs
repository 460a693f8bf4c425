//! Lookup Cache Benchmarks
//!
//! # Benchmark Categories
//!
//! 1. **Dispatch**: monomorphic hit, polymorphic hit, megamorphic slow path
//! 2. **Invalidation**: resend after a redefinition
//! 3. **Variables**: cached vs uncached resolution across nested scopes

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lode_core::{CacheConfig, Value, intern};
use lode_runtime::{Binding, SlotId};
use lode_vm::Vm;

// =============================================================================
// Benchmark Helpers
// =============================================================================

/// A VM with `n` classes each defining `value` returning its index.
fn vm_with_classes(n: usize) -> (Vm, Vec<Value>) {
    let vm = Vm::new(CacheConfig::wide()).unwrap();
    let objects = (0..n)
        .map(|i| {
            let class = vm.classes().define_class(&format!("Bench{i}"), None);
            vm.classes()
                .define_method(class, intern("value"), move |_, _| Ok(Value::Int(i as i64)));
            vm.classes().new_object(class)
        })
        .collect();
    (vm, objects)
}

/// A binding `depth` scopes deep, with `target` declared in the outermost.
fn deep_binding(vm: &Vm, depth: usize) -> Binding {
    let heap = vm.scopes();
    let mut scope = heap
        .push_scope(heap.new_shape(&[intern("target")]), None, Value::Nil)
        .unwrap();
    heap.write_slot(scope, SlotId(0), Value::Int(1)).unwrap();
    for i in 0..depth {
        let shape = heap.new_shape(&[intern(&format!("pad{i}"))]);
        scope = heap.child_scope(scope, shape).unwrap();
    }
    Binding::new(scope)
}

// =============================================================================
// Dispatch Benchmarks
// =============================================================================

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let name = intern("value");

    for width in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("cached", width), &width, |b, &width| {
            let (vm, objects) = vm_with_classes(width);
            let site = vm.new_dispatch_site();
            for obj in &objects {
                vm.dispatch(&site, name, obj, &[]).unwrap();
            }
            b.iter(|| {
                for obj in &objects {
                    black_box(vm.dispatch(&site, name, black_box(obj), &[]).unwrap());
                }
            })
        });
    }

    group.bench_function("megamorphic", |b| {
        let (vm, objects) = vm_with_classes(32);
        let site = vm.new_dispatch_site();
        b.iter(|| {
            for obj in &objects {
                black_box(vm.dispatch(&site, name, black_box(obj), &[]).unwrap());
            }
        })
    });

    group.bench_function("responds_to", |b| {
        let (vm, objects) = vm_with_classes(1);
        let site = vm.new_dispatch_site();
        b.iter(|| black_box(vm.responds_to(&site, name, &objects[0])))
    });

    group.finish();
}

fn bench_invalidation(c: &mut Criterion) {
    c.bench_function("dispatch_after_redefinition", |b| {
        let (vm, objects) = vm_with_classes(1);
        let class = objects[0].as_object().map(|o| o.class_id()).unwrap();
        let name = intern("value");
        b.iter(|| {
            let site = vm.new_dispatch_site();
            vm.classes().define_method(class, name, |_, _| Ok(Value::Nil));
            black_box(vm.dispatch(&site, name, &objects[0], &[]).unwrap())
        })
    });
}

// =============================================================================
// Variable Benchmarks
// =============================================================================

fn bench_variables(c: &mut Criterion) {
    let mut group = c.benchmark_group("variables");
    let target = intern("target");

    for depth in [0usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("cached_get", depth), &depth, |b, &depth| {
            let vm = Vm::default();
            let binding = deep_binding(&vm, depth);
            let site = vm.new_variable_site();
            b.iter(|| black_box(vm.local_variable_get(&site, &binding, target).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("uncached_get", depth), &depth, |b, &depth| {
            let vm = Vm::default();
            let binding = deep_binding(&vm, depth);
            b.iter(|| black_box(binding.local_variable_get(vm.scopes(), target).unwrap()))
        });
    }

    group.bench_function("list_names", |b| {
        let vm = Vm::default();
        let binding = deep_binding(&vm, 8);
        let site = vm.new_variable_site();
        b.iter(|| black_box(vm.list_variable_names(&site, &binding).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_invalidation, bench_variables);
criterion_main!(benches);
