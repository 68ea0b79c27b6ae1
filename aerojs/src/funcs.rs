// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Native function machinery.
//!
//! Without the interpreter tier, every callable in the engine is a native
//! entry point plus a vector of captured values. Captures are ordinary
//! heap-traced values, which is what lets the collector see through
//! closures (resolve/reject pairs, combinator accumulators) without any
//! special cases.

use aerojs_shared::sys::MAX_CALL_DEPTH;

use crate::context::Context;
use crate::error::Result;
use crate::object::{ObjectKind, Payload};
use crate::value::{ObjRef, StringId, Value};

/// A native entry point: `(context, this, args, captures) -> completion`.
pub type NativeFn = fn(&mut Context, Value, &[Value], &[Value]) -> Result<Value>;

/// Payload of a Function object (ordinary or bound).
#[derive(Debug)]
pub struct FunctionPayload {
    pub name: StringId,
    pub arity: u32,
    pub native: NativeFn,
    pub captures: Vec<Value>,
    pub bound: Option<Box<BoundFunction>>,
}

/// Extra state of a bound function: `Function.prototype.bind` output.
#[derive(Debug)]
pub struct BoundFunction {
    pub target: ObjRef,
    pub this: Value,
    pub args: Vec<Value>,
}

impl Context {
    /// Whether a value is callable.
    pub fn is_callable(&self, value: Value) -> bool {
        value
            .as_object()
            .and_then(|r| self.heap.get(r))
            .is_some_and(|obj| obj.is_callable())
    }

    /// Invoke a callable value. Non-callables raise a TypeError; handler
    /// throws surface as `Err(Thrown)` completions for the caller to route.
    pub fn call(&mut self, callee: Value, this: Value, args: &[Value]) -> Result<Value> {
        self.limiter.checkpoint()?;
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(self.range_error("maximum call stack size exceeded"));
        }

        let mut func_ref = match callee.as_object() {
            Some(r) if self.heap.get(r).is_some_and(|o| o.kind == ObjectKind::Function) => r,
            _ => return Err(self.type_error("value is not a function")),
        };

        // Unwrap bound-function chains, accumulating leading arguments.
        let mut this = this;
        let mut call_args: Vec<Value> = args.to_vec();
        let (native, captures) = loop {
            let payload = match &self.heap.get(func_ref).expect("callee checked above").payload {
                Payload::Function(p) => p,
                _ => return Err(self.type_error("function object carries no code")),
            };
            match &payload.bound {
                Some(bound) => {
                    this = bound.this;
                    let mut merged = bound.args.clone();
                    merged.extend(call_args);
                    call_args = merged;
                    func_ref = bound.target;
                }
                None => break (payload.native, payload.captures.clone()),
            }
        };

        // Root the callee, receiver and arguments for the duration of the
        // call; a native may legally trigger a collection.
        let root_base = self.temp_roots.len();
        self.temp_roots.push(Value::Object(func_ref));
        self.temp_roots.push(this);
        self.temp_roots.extend(call_args.iter().copied());

        self.call_depth += 1;
        let result = native(self, this, &call_args, &captures);
        self.call_depth -= 1;

        self.temp_roots.truncate(root_base);
        result
    }

    /// Convenience: look a method up on an object and invoke it.
    pub fn invoke(&mut self, target: Value, method: &str, args: &[Value]) -> Result<Value> {
        let obj = match target.as_object() {
            Some(r) => r,
            None => return Err(self.type_error("cannot invoke a method on a primitive")),
        };
        let callee = self.get_str(obj, method)?;
        self.call(callee, target, args)
    }
}
