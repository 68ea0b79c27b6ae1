// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
use aerojs::{Context, ContextConfig, ErrorKind, Generation, NoopExterns, Value};
use pretty_assertions::assert_eq;

mod common;
use common::*;

fn ctx_with_debug_gc() -> Context {
    let mut config = ContextConfig::default();
    config.engine.gc.enable_debug();
    Context::new(config, Box::new(NoopExterns)).unwrap()
}

#[test]
fn weakref_observes_collection() {
    let mut ctx = ctx_with_debug_gc();
    let target = ctx.new_object().unwrap();
    ctx.add_root(target);
    let weakref = ctx.new_weakref(Value::Object(target)).unwrap();
    ctx.add_root(weakref);

    // Reachable target: deref sees it, across collections.
    assert_eq!(ctx.weakref_deref(weakref).unwrap(), Value::Object(target));
    ctx.trigger_gc(true);
    assert_eq!(ctx.weakref_deref(weakref).unwrap(), Value::Object(target));

    // Drop the only strong reference and collect.
    ctx.remove_root(target);
    ctx.trigger_gc(true);
    assert!(ctx.weakref_deref(weakref).unwrap().is_undefined());

    // The transition is monotonic.
    ctx.trigger_gc(true);
    assert!(ctx.weakref_deref(weakref).unwrap().is_undefined());
}

#[test]
fn finalization_registry_invokes_cleanup_once() {
    let mut ctx = ctx_with_debug_gc();
    let log = ctx.new_array(Vec::new()).unwrap();
    ctx.add_root(log);
    let callback = ctx
        .new_function("cleanup", 1, push_arg, vec![Value::Object(log)])
        .unwrap();
    let registry = ctx.new_finalization_registry(Value::Object(callback)).unwrap();
    ctx.add_root(registry);

    let target = ctx.new_object().unwrap();
    ctx.add_root(target);
    let held = ctx.str_value("x");
    ctx.registry_register(registry, Value::Object(target), held, Value::Undefined)
        .unwrap();

    // Still reachable: no cleanup.
    ctx.trigger_gc(true);
    ctx.drain_microtasks().unwrap();
    assert_eq!(ctx.array_length(log).unwrap(), 0);

    ctx.remove_root(target);
    ctx.trigger_gc(true);
    ctx.drain_microtasks().unwrap();
    assert_eq!(array_values(&mut ctx, log), vec![held]);

    // Exactly once per registration.
    ctx.trigger_gc(true);
    ctx.drain_microtasks().unwrap();
    assert_eq!(ctx.array_length(log).unwrap(), 1);
}

#[test]
fn unregister_prevents_cleanup() {
    let mut ctx = ctx_with_debug_gc();
    let log = ctx.new_array(Vec::new()).unwrap();
    ctx.add_root(log);
    let callback = ctx
        .new_function("cleanup", 1, push_arg, vec![Value::Object(log)])
        .unwrap();
    let registry = ctx.new_finalization_registry(Value::Object(callback)).unwrap();
    ctx.add_root(registry);

    let target = ctx.new_object().unwrap();
    ctx.add_root(target);
    let token = ctx.new_object().unwrap();
    ctx.add_root(token);
    let held = ctx.str_value("never");
    ctx.registry_register(registry, Value::Object(target), held, Value::Object(token))
        .unwrap();

    assert!(ctx.registry_unregister(registry, Value::Object(token)).unwrap());
    // A second unregister finds nothing.
    assert!(!ctx.registry_unregister(registry, Value::Object(token)).unwrap());

    ctx.remove_root(target);
    ctx.trigger_gc(true);
    ctx.drain_microtasks().unwrap();
    assert_eq!(ctx.array_length(log).unwrap(), 0);
}

#[test]
fn cleanup_some_drains_already_dead_entries() {
    let mut ctx = ctx_with_debug_gc();
    let log = ctx.new_array(Vec::new()).unwrap();
    ctx.add_root(log);
    let callback = ctx
        .new_function("cleanup", 1, push_arg, vec![Value::Object(log)])
        .unwrap();
    let registry = ctx.new_finalization_registry(Value::Object(callback)).unwrap();
    ctx.add_root(registry);

    // Two registrations; both targets die in one cycle. The provider
    // already queued them, so cleanupSome afterwards finds nothing more.
    let a = ctx.new_object().unwrap();
    let b = ctx.new_object().unwrap();
    ctx.add_root(a);
    ctx.add_root(b);
    let held_a = ctx.str_value("a");
    let held_b = ctx.str_value("b");
    ctx.registry_register(registry, Value::Object(a), held_a, Value::Undefined)
        .unwrap();
    ctx.registry_register(registry, Value::Object(b), held_b, Value::Undefined)
        .unwrap();
    ctx.remove_root(a);
    ctx.remove_root(b);
    ctx.trigger_gc(true);

    ctx.registry_cleanup_some(registry, None).unwrap();
    ctx.drain_microtasks().unwrap();
    // Registration order, exactly once each.
    assert_eq!(array_values(&mut ctx, log), vec![held_a, held_b]);
    assert_eq!(ctx.registry_len(registry).unwrap(), 0);
}

#[test]
fn idempotent_cycle_collects_nothing() {
    let mut ctx = ctx_with_debug_gc();
    let keep = ctx.new_array(Vec::new()).unwrap();
    ctx.add_root(keep);
    for _ in 0..32 {
        let junk = ctx.new_object().unwrap();
        let _ = junk;
    }
    ctx.trigger_gc(true);
    assert!(ctx.gc_stats().last_objects_collected >= 32);

    // No allocations since the last cycle: nothing to reclaim.
    ctx.trigger_gc(true);
    assert_eq!(ctx.gc_stats().last_objects_collected, 0);
    assert_eq!(ctx.gc_stats().last_bytes_collected, 0);
}

#[test]
fn survivors_promote_through_generations() {
    let mut config = ContextConfig::default();
    config.engine.gc.enable_debug().set_promotion_age(1);
    let mut ctx = Context::new(config, Box::new(NoopExterns)).unwrap();

    let survivor = ctx.new_object().unwrap();
    ctx.add_root(survivor);
    assert_eq!(ctx.object_generation(survivor), Some(Generation::Young));
    ctx.trigger_gc(true);
    ctx.trigger_gc(true);
    assert_eq!(ctx.object_generation(survivor), Some(Generation::Middle));
    ctx.trigger_gc(true);
    ctx.trigger_gc(true);
    assert_eq!(ctx.object_generation(survivor), Some(Generation::Old));
}

#[test]
fn compaction_forwards_references() {
    let mut ctx = ctx_with_debug_gc();

    // Junk first so it fragments the low end of the arena, then a survivor
    // array referencing a survivor object allocated above it.
    for _ in 0..128 {
        ctx.new_object().unwrap();
    }
    let inner = ctx.new_object().unwrap();
    let marker = ctx.str_value("marker");
    ctx.set_str(inner, "tag", marker).unwrap();
    let keep = ctx.new_array(vec![Value::Object(inner)]).unwrap();
    ctx.add_root(keep);
    let weakref = ctx.new_weakref(Value::Object(inner)).unwrap();
    ctx.add_root(weakref);

    ctx.trigger_gc(true);
    assert!(ctx.gc_stats().compactions > 0, "fragmentation should compact");

    // Strong edge still works after the slide.
    let inner = ctx.array_get(keep, 0).unwrap().as_object().unwrap();
    assert_eq!(ctx.get_str(inner, "tag").unwrap(), marker);
    // The weak handle was forwarded with it.
    assert_eq!(ctx.weakref_deref(weakref).unwrap(), Value::Object(inner));
}

#[test]
fn weakmap_entries_die_with_their_keys() {
    let mut ctx = ctx_with_debug_gc();
    let map = ctx.new_weakmap().unwrap();
    ctx.add_root(map);
    let key = ctx.new_object().unwrap();
    ctx.add_root(key);
    let payload = ctx.str_value("payload");
    ctx.weakmap_set(map, Value::Object(key), payload).unwrap();

    assert_eq!(ctx.weakmap_get(map, Value::Object(key)).unwrap(), payload);
    ctx.trigger_gc(true);
    assert_eq!(ctx.weakmap_get(map, Value::Object(key)).unwrap(), payload);

    let stale_key = key;
    ctx.remove_root(key);
    ctx.trigger_gc(true);
    assert!(ctx
        .weakmap_get(map, Value::Object(stale_key))
        .unwrap()
        .is_undefined());
}

#[test]
fn handle_stats_track_invalidations() {
    let mut ctx = ctx_with_debug_gc();
    let target = ctx.new_object().unwrap();
    ctx.add_root(target);
    let weakref = ctx.new_weakref(Value::Object(target)).unwrap();
    ctx.add_root(weakref);
    let registered = ctx.handle_stats().registrations;
    assert!(registered >= 1);

    ctx.remove_root(target);
    ctx.trigger_gc(true);
    assert!(ctx.handle_stats().invalidations >= 1);
}

#[test]
fn memory_limit_surfaces_as_oom() {
    let mut ctx = Context::with_defaults();
    let used = ctx.heap_bytes();
    ctx.set_memory_limit(Some(used + 64));
    let mut failed = false;
    for _ in 0..64 {
        match ctx.new_array(vec![Value::Int32(0); 64]) {
            Ok(r) => ctx.add_root(r),
            Err(aerojs::ExecutionError::OutOfMemory) => {
                failed = true;
                break;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert!(failed, "allocation under a tiny limit must fail");

    // Raising the limit unblocks allocation again.
    ctx.set_memory_limit(None);
    ctx.new_object().unwrap();
}

#[test]
fn execution_time_limit_aborts_at_safepoints() {
    let mut ctx = Context::with_defaults();
    ctx.set_execution_time_limit(std::time::Duration::ZERO);
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(matches!(
        ctx.checkpoint(),
        Err(aerojs::ExecutionError::Aborted)
    ));

    // Calls poll the same safepoint.
    let f = ctx.new_function("", 0, identity, Vec::new()).unwrap();
    assert!(matches!(
        ctx.call(Value::Object(f), Value::Undefined, &[]),
        Err(aerojs::ExecutionError::Aborted)
    ));

    ctx.clear_execution_time_limit();
    ctx.checkpoint().unwrap();
}

#[test]
fn microtask_arguments_are_gc_roots() {
    let mut ctx = ctx_with_debug_gc();
    let log = ctx.new_array(Vec::new()).unwrap();
    ctx.add_root(log);
    let payload = ctx.new_object().unwrap();
    let tag = ctx.str_value("survives");
    ctx.set_str(payload, "tag", tag).unwrap();
    let callback = ctx
        .new_function("", 1, push_arg, vec![Value::Object(log)])
        .unwrap();
    ctx.enqueue_microtask(Value::Object(callback), vec![Value::Object(payload)])
        .unwrap();

    // Neither the callback nor the payload is rooted, but both are queued.
    ctx.trigger_gc(true);
    ctx.drain_microtasks().unwrap();
    let logged = ctx.array_get(log, 0).unwrap().as_object().unwrap();
    assert_eq!(ctx.get_str(logged, "tag").unwrap(), tag);
}

#[test]
fn random_object_graphs_survive_collection() {
    use rand::{Rng, SeedableRng};

    // Build a random graph of objects and arrays, drop random roots, and
    // collect with heap verification on. The collector must neither free a
    // reachable object nor leave a dangling edge.
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x4AE2_05);
    let mut ctx = ctx_with_debug_gc();
    let mut nodes = Vec::new();
    for i in 0..200 {
        let node = if rng.gen_bool(0.5) {
            ctx.new_object().unwrap()
        } else {
            ctx.new_array(Vec::new()).unwrap()
        };
        // Wire a couple of random edges back into the existing graph.
        for _ in 0..rng.gen_range(0..3) {
            if nodes.is_empty() {
                break;
            }
            let target: aerojs::ObjRef = nodes[rng.gen_range(0..nodes.len())];
            let key = format!("edge{}", rng.gen_range(0..4));
            ctx.set_str(node, &key, Value::Object(target)).unwrap();
        }
        if i % 3 == 0 {
            ctx.add_root(node);
        }
        nodes.push(node);
    }

    for round in 0..4 {
        ctx.trigger_gc(true);
        // Rooted nodes must still be live and fully traversable (the debug
        // verifier walked every edge already).
        assert!(ctx.live_objects() > 0, "round {round} emptied the heap");
    }
}

#[test]
fn raise_builds_typed_errors() {
    let mut ctx = Context::with_defaults();
    let err = ctx.range_error("out of range");
    let Some(value) = err.thrown_value() else {
        panic!("expected a thrown value");
    };
    let obj = value.as_object().unwrap();
    assert_eq!(ctx.error_kind_of(obj), Some(ErrorKind::Range));
    assert_eq!(ctx.display_value(value), "RangeError: out of range");
}
