// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Shared fixtures for the integration suites: a handful of native
//! functions standing in for script handlers.
#![allow(dead_code)]

use aerojs::error::ExecutionError;
use aerojs::{Context, Result, Value};

pub fn new_ctx() -> Context {
    let _ = env_logger::builder().is_test(true).try_init();
    Context::with_defaults()
}

fn first(args: &[Value]) -> Value {
    args.first().copied().unwrap_or(Value::Undefined)
}

/// `x => x`
pub fn identity(_ctx: &mut Context, _this: Value, args: &[Value], _caps: &[Value]) -> Result<Value> {
    Ok(first(args))
}

/// `x => x + 1`
pub fn add_one(ctx: &mut Context, _this: Value, args: &[Value], _caps: &[Value]) -> Result<Value> {
    let n = first(args).as_number().unwrap_or(f64::NAN);
    Ok(ctx.number(n + 1.0))
}

/// `x => x * 2`
pub fn double(ctx: &mut Context, _this: Value, args: &[Value], _caps: &[Value]) -> Result<Value> {
    let n = first(args).as_number().unwrap_or(f64::NAN);
    Ok(ctx.number(n * 2.0))
}

/// `x => { log.push(x) }` with the log array captured.
pub fn push_arg(ctx: &mut Context, _this: Value, args: &[Value], caps: &[Value]) -> Result<Value> {
    let log = caps[0].as_object().expect("log capture");
    ctx.array_push(log, first(args))?;
    Ok(Value::Undefined)
}

/// `() => captures[0]`
pub fn return_capture(
    _ctx: &mut Context,
    _this: Value,
    _args: &[Value],
    caps: &[Value],
) -> Result<Value> {
    Ok(caps[0])
}

/// `() => { throw captures[0] }`
pub fn throw_capture(
    _ctx: &mut Context,
    _this: Value,
    _args: &[Value],
    caps: &[Value],
) -> Result<Value> {
    Err(ExecutionError::Thrown(caps[0]))
}

/// A `then` implementation that immediately resolves with 42.
pub fn then_resolve_42(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let resolve = first(args);
    ctx.call(resolve, Value::Undefined, &[Value::Int32(42)])?;
    Ok(Value::Undefined)
}

/// Executor calling `resolve(captures[0])` synchronously.
pub fn executor_resolve_capture(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    caps: &[Value],
) -> Result<Value> {
    let resolve = first(args);
    ctx.call(resolve, Value::Undefined, &[caps[0]])?;
    Ok(Value::Undefined)
}

/// The array contents of a live Array object.
pub fn array_values(ctx: &mut Context, array: aerojs::ObjRef) -> Vec<Value> {
    let len = ctx.array_length(array).expect("array");
    (0..len)
        .map(|i| ctx.array_get(array, i).expect("element"))
        .collect()
}
