// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
use aerojs::{ErrorKind, ObjectKind, PromiseState, Value};
use pretty_assertions::assert_eq;

mod common;
use common::*;

#[test]
fn resolution_chain() {
    // new Promise(r => r(1)).then(x => x + 1).then(x => x * 2)
    let mut ctx = new_ctx();
    let executor = ctx
        .new_function("", 2, executor_resolve_capture, vec![Value::Int32(1)])
        .unwrap();
    let p = ctx.promise_with_executor(Value::Object(executor)).unwrap();
    ctx.add_root(p);

    let f = ctx.new_function("", 1, add_one, Vec::new()).unwrap();
    let p2 = ctx.promise_then(p, Some(Value::Object(f)), None).unwrap();
    let g = ctx.new_function("", 1, double, Vec::new()).unwrap();
    let p3 = ctx.promise_then(p2, Some(Value::Object(g)), None).unwrap();
    ctx.add_root(p3);

    assert_eq!(ctx.promise_state(p3).unwrap().0, PromiseState::Pending);
    ctx.drain_microtasks().unwrap();
    let (state, result) = ctx.promise_state(p3).unwrap();
    assert_eq!(state, PromiseState::Fulfilled);
    assert!(ctx.strict_eq(result, Value::Int32(4)));
}

#[test]
fn thenable_assimilation() {
    // Promise.resolve({ then(res) { res(42) } }).then(v => v)
    let mut ctx = new_ctx();
    let thenable = ctx.new_object().unwrap();
    ctx.add_root(thenable);
    let then = ctx.new_function("then", 2, then_resolve_42, Vec::new()).unwrap();
    ctx.set_str(thenable, "then", Value::Object(then)).unwrap();

    let p = ctx.promise_resolve_value(Value::Object(thenable)).unwrap();
    let id = ctx.new_function("", 1, identity, Vec::new()).unwrap();
    let p2 = ctx.promise_then(p, Some(Value::Object(id)), None).unwrap();
    ctx.add_root(p2);

    ctx.drain_microtasks().unwrap();
    let (state, result) = ctx.promise_state(p2).unwrap();
    assert_eq!(state, PromiseState::Fulfilled);
    assert_eq!(result, Value::Int32(42));
}

#[test]
fn any_of_all_rejecting_inputs() {
    // Promise.any([Promise.reject('a'), Promise.reject('b')])
    let mut ctx = new_ctx();
    let a = ctx.str_value("a");
    let b = ctx.str_value("b");
    let ra = ctx.promise_rejected_value(a).unwrap();
    let rb = ctx.promise_rejected_value(b).unwrap();
    let inputs = ctx
        .new_array(vec![Value::Object(ra), Value::Object(rb)])
        .unwrap();
    let p = ctx.promise_any(Value::Object(inputs)).unwrap();
    ctx.add_root(p);

    ctx.drain_microtasks().unwrap();
    let (state, reason) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Rejected);

    let err = reason.as_object().expect("AggregateError object");
    assert_eq!(ctx.error_kind_of(err), Some(ErrorKind::Aggregate));
    let errors = ctx.get_str(err, "errors").unwrap();
    let errors = errors.as_object().expect("errors array");
    assert_eq!(array_values(&mut ctx, errors), vec![a, b]);
}

#[test]
fn empty_any_rejects_with_empty_aggregate() {
    let mut ctx = new_ctx();
    let inputs = ctx.new_array(Vec::new()).unwrap();
    let p = ctx.promise_any(Value::Object(inputs)).unwrap();
    ctx.add_root(p);
    ctx.drain_microtasks().unwrap();
    let (state, reason) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Rejected);
    let err = reason.as_object().unwrap();
    assert_eq!(ctx.error_kind_of(err), Some(ErrorKind::Aggregate));
    let errors = ctx.get_str(err, "errors").unwrap().as_object().unwrap();
    assert_eq!(ctx.array_length(errors).unwrap(), 0);
}

#[test]
fn all_preserves_order_and_rejects_on_first_rejection() {
    let mut ctx = new_ctx();
    let one = ctx.promise_resolve_value(Value::Int32(1)).unwrap();
    let two = ctx.promise_resolve_value(Value::Int32(2)).unwrap();
    let inputs = ctx
        .new_array(vec![Value::Object(one), Value::Int32(3), Value::Object(two)])
        .unwrap();
    let p = ctx.promise_all(Value::Object(inputs)).unwrap();
    ctx.add_root(p);
    ctx.drain_microtasks().unwrap();
    let (state, result) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Fulfilled);
    let values = result.as_object().unwrap();
    assert_eq!(
        array_values(&mut ctx, values),
        vec![Value::Int32(1), Value::Int32(3), Value::Int32(2)]
    );

    // A rejecting member rejects the whole combinator.
    let boom = ctx.str_value("boom");
    let bad = ctx.promise_rejected_value(boom).unwrap();
    let inputs = ctx
        .new_array(vec![Value::Int32(1), Value::Object(bad)])
        .unwrap();
    let p = ctx.promise_all(Value::Object(inputs)).unwrap();
    ctx.add_root(p);
    ctx.drain_microtasks().unwrap();
    let (state, reason) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Rejected);
    assert_eq!(reason, boom);
}

#[test]
fn empty_all_fulfills_immediately() {
    let mut ctx = new_ctx();
    let inputs = ctx.new_array(Vec::new()).unwrap();
    let p = ctx.promise_all(Value::Object(inputs)).unwrap();
    ctx.add_root(p);
    ctx.drain_microtasks().unwrap();
    let (state, result) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Fulfilled);
    assert_eq!(ctx.array_length(result.as_object().unwrap()).unwrap(), 0);
}

#[test]
fn all_settled_never_rejects() {
    let mut ctx = new_ctx();
    let ok = ctx.promise_resolve_value(Value::Int32(7)).unwrap();
    let boom = ctx.str_value("boom");
    let bad = ctx.promise_rejected_value(boom).unwrap();
    let inputs = ctx
        .new_array(vec![Value::Object(ok), Value::Object(bad)])
        .unwrap();
    let p = ctx.promise_all_settled(Value::Object(inputs)).unwrap();
    ctx.add_root(p);
    ctx.drain_microtasks().unwrap();

    let (state, result) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Fulfilled);
    let records = result.as_object().unwrap();
    assert_eq!(ctx.array_length(records).unwrap(), 2);

    let first = ctx.array_get(records, 0).unwrap().as_object().unwrap();
    let status = ctx.get_str(first, "status").unwrap();
    let fulfilled = ctx.str_value("fulfilled");
    assert_eq!(status, fulfilled);
    assert_eq!(ctx.get_str(first, "value").unwrap(), Value::Int32(7));
    assert!(ctx.get_str(first, "reason").unwrap().is_undefined());

    let second = ctx.array_get(records, 1).unwrap().as_object().unwrap();
    let status = ctx.get_str(second, "status").unwrap();
    let rejected = ctx.str_value("rejected");
    assert_eq!(status, rejected);
    assert_eq!(ctx.get_str(second, "reason").unwrap(), boom);
    assert!(ctx.get_str(second, "value").unwrap().is_undefined());
}

#[test]
fn race_settles_with_first_and_empty_race_stays_pending() {
    let mut ctx = new_ctx();
    let first = ctx.promise_resolve_value(Value::Int32(1)).unwrap();
    let second = ctx.promise_resolve_value(Value::Int32(2)).unwrap();
    let inputs = ctx
        .new_array(vec![Value::Object(first), Value::Object(second)])
        .unwrap();
    let p = ctx.promise_race(Value::Object(inputs)).unwrap();
    ctx.add_root(p);
    ctx.drain_microtasks().unwrap();
    let (state, result) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Fulfilled);
    assert_eq!(result, Value::Int32(1));

    let empty = ctx.new_array(Vec::new()).unwrap();
    let forever = ctx.promise_race(Value::Object(empty)).unwrap();
    ctx.add_root(forever);
    ctx.drain_microtasks().unwrap();
    assert_eq!(ctx.promise_state(forever).unwrap().0, PromiseState::Pending);
}

#[test]
fn iterator_abort_rejects_combinator() {
    // An "iterable" whose next() throws.
    let mut ctx = new_ctx();
    let reason = ctx.str_value("next failed");
    let iterator = ctx.new_object().unwrap();
    ctx.add_root(iterator);
    let next = ctx
        .new_function("next", 0, throw_capture, vec![reason])
        .unwrap();
    ctx.set_str(iterator, "next", Value::Object(next)).unwrap();

    let p = ctx.promise_all(Value::Object(iterator)).unwrap();
    ctx.add_root(p);
    ctx.drain_microtasks().unwrap();
    let (state, rejected_with) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Rejected);
    assert_eq!(rejected_with, reason);
}

#[test]
fn settlement_is_one_shot() {
    let mut ctx = new_ctx();
    let p = ctx.new_promise().unwrap();
    ctx.add_root(p);
    ctx.promise_resolve(p, Value::Int32(1)).unwrap();
    ctx.promise_reject(p, Value::Int32(2)).unwrap();
    ctx.promise_resolve(p, Value::Int32(3)).unwrap();
    ctx.drain_microtasks().unwrap();
    let (state, result) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Fulfilled);
    assert_eq!(result, Value::Int32(1));
}

#[test]
fn self_resolution_rejects_with_type_error() {
    let mut ctx = new_ctx();
    let p = ctx.new_promise().unwrap();
    ctx.add_root(p);
    ctx.promise_resolve(p, Value::Object(p)).unwrap();
    ctx.drain_microtasks().unwrap();
    let (state, reason) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Rejected);
    let err = reason.as_object().expect("TypeError object");
    assert_eq!(ctx.error_kind_of(err), Some(ErrorKind::Type));
}

#[test]
fn executor_throw_rejects() {
    let mut ctx = new_ctx();
    let reason = ctx.str_value("boom");
    let executor = ctx
        .new_function("", 2, throw_capture, vec![reason])
        .unwrap();
    let p = ctx.promise_with_executor(Value::Object(executor)).unwrap();
    ctx.add_root(p);
    let (state, result) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Rejected);
    assert_eq!(result, reason);
    // Keep the rejection handled so the drain stays quiet.
    let swallow = ctx.new_function("", 1, identity, Vec::new()).unwrap();
    ctx.promise_catch(p, Some(Value::Object(swallow))).unwrap();
    ctx.drain_microtasks().unwrap();
}

#[test]
fn handler_throw_rejects_downstream() {
    let mut ctx = new_ctx();
    let reason = ctx.str_value("handler boom");
    let p = ctx.promise_resolve_value(Value::Int32(1)).unwrap();
    let bad = ctx.new_function("", 1, throw_capture, vec![reason]).unwrap();
    let p2 = ctx.promise_then(p, Some(Value::Object(bad)), None).unwrap();
    ctx.add_root(p2);
    let p3 = ctx.promise_catch(p2, None).unwrap();
    ctx.add_root(p3);
    ctx.drain_microtasks().unwrap();
    let (state, result) = ctx.promise_state(p2).unwrap();
    assert_eq!(state, PromiseState::Rejected);
    assert_eq!(result, reason);
    // The catch passthrough rethrows into p3.
    assert_eq!(ctx.promise_state(p3).unwrap().0, PromiseState::Rejected);
}

#[test]
fn finally_passes_value_through() {
    let mut ctx = new_ctx();
    let log = ctx.new_array(Vec::new()).unwrap();
    ctx.add_root(log);
    let p = ctx.promise_resolve_value(Value::Int32(9)).unwrap();
    let cb = ctx
        .new_function("", 0, push_arg, vec![Value::Object(log)])
        .unwrap();
    let p2 = ctx.promise_finally(p, Value::Object(cb)).unwrap();
    ctx.add_root(p2);
    ctx.drain_microtasks().unwrap();
    let (state, result) = ctx.promise_state(p2).unwrap();
    assert_eq!(state, PromiseState::Fulfilled);
    assert_eq!(result, Value::Int32(9));
    // The callback ran exactly once (with no argument).
    assert_eq!(ctx.array_length(log).unwrap(), 1);
}

#[test]
fn finally_callback_throw_overrides() {
    let mut ctx = new_ctx();
    let reason = ctx.str_value("cleanup failed");
    let p = ctx.promise_resolve_value(Value::Int32(9)).unwrap();
    let cb = ctx.new_function("", 0, throw_capture, vec![reason]).unwrap();
    let p2 = ctx.promise_finally(p, Value::Object(cb)).unwrap();
    ctx.add_root(p2);
    let guard = ctx.promise_catch(p2, None).unwrap();
    ctx.add_root(guard);
    ctx.drain_microtasks().unwrap();
    let (state, result) = ctx.promise_state(p2).unwrap();
    assert_eq!(state, PromiseState::Rejected);
    assert_eq!(result, reason);
}

#[test]
fn resolve_passes_existing_promise_through() {
    let mut ctx = new_ctx();
    let p = ctx.new_promise().unwrap();
    ctx.add_root(p);
    let same = ctx.promise_resolve_value(Value::Object(p)).unwrap();
    assert_eq!(same, p);
}

#[test]
fn empty_drain_is_a_no_op() {
    let mut ctx = new_ctx();
    assert_eq!(ctx.microtask_queue_len(), 0);
    ctx.drain_microtasks().unwrap();
    ctx.drain_microtasks().unwrap();
    assert_eq!(ctx.microtask_queue_len(), 0);
}

#[test]
fn unhandled_rejections_reach_the_host_hook() {
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recording(Rc<RefCell<Vec<String>>>);
    impl aerojs::Externs for Recording {
        fn unhandled_rejection(
            &mut self,
            ctx: &mut aerojs::Context,
            _promise: aerojs::ObjRef,
            reason: Value,
        ) {
            self.0.borrow_mut().push(ctx.display_value(reason));
        }
    }

    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut ctx = aerojs::Context::new(
        aerojs::ContextConfig::default(),
        Box::new(Recording(seen.clone())),
    )
    .unwrap();

    let reason = ctx.str_value("nobody caught me");
    let p = ctx.promise_rejected_value(reason).unwrap();
    ctx.add_root(p);
    ctx.drain_microtasks().unwrap();
    assert_eq!(seen.borrow().as_slice(), ["nobody caught me"]);

    // A handled rejection stays quiet.
    let reason = ctx.str_value("caught");
    let p = ctx.promise_rejected_value(reason).unwrap();
    ctx.add_root(p);
    let swallow = ctx.new_function("", 1, common::identity, Vec::new()).unwrap();
    ctx.promise_catch(p, Some(Value::Object(swallow))).unwrap();
    ctx.drain_microtasks().unwrap();
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn builtin_surface_is_reachable_from_the_global() {
    let mut ctx = new_ctx();
    let global = ctx.global_object();
    let promise_ctor = ctx.get_str(global, "Promise").unwrap();
    assert!(ctx.is_callable(promise_ctor));

    // Promise.resolve(5).then via the property surface.
    let five = ctx
        .invoke(promise_ctor, "resolve", &[Value::Int32(5)])
        .unwrap();
    let p = five.as_object().unwrap();
    assert_eq!(ctx.object_kind(p), Some(ObjectKind::Promise));
    let id = ctx.new_function("", 1, identity, Vec::new()).unwrap();
    let derived = ctx.invoke(five, "then", &[Value::Object(id)]).unwrap();
    let derived = derived.as_object().unwrap();
    ctx.add_root(derived);
    ctx.drain_microtasks().unwrap();
    let (state, result) = ctx.promise_state(derived).unwrap();
    assert_eq!(state, PromiseState::Fulfilled);
    assert_eq!(result, Value::Int32(5));
}
