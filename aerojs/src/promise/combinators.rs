// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! The promise combinators: all, allSettled, race, any.
//!
//! Each combinator subscribes to `Promise.resolve` of every input and
//! accumulates into a heap-allocated state object (a counter plus a result
//! array), so the bookkeeping survives collection like any other value.

use crate::context::Context;
use crate::error::{ExecutionError, Result};
use crate::object::PropertyDescriptor;
use crate::value::{ObjRef, Value};

impl Context {
    /// Materialize an iterable: arrays directly, otherwise anything with a
    /// callable `next`. A throwing `next` propagates as the thrown value.
    pub(crate) fn iterate_to_values(&mut self, iterable: Value) -> Result<Vec<Value>> {
        let Some(obj) = iterable.as_object() else {
            return Err(self.type_error("value is not iterable"));
        };
        if let Some(crate::object::Payload::Array(elements)) =
            self.heap.get(obj).map(|o| &o.payload)
        {
            return Ok(elements.clone());
        }

        let next = self.get_str(obj, "next")?;
        if !self.is_callable(next) {
            return Err(self.type_error("value is not iterable"));
        }
        let mut values = Vec::new();
        loop {
            self.limiter.checkpoint()?;
            let step = self.call(next, iterable, &[])?;
            let Some(step_obj) = step.as_object() else {
                return Err(self.type_error("iterator result is not an object"));
            };
            let done = self.get_str(step_obj, "done")?;
            if self.to_boolean(done) {
                return Ok(values);
            }
            values.push(self.get_str(step_obj, "value")?);
        }
    }

    /// `Promise.all`: fulfill with all values in iteration order, reject on
    /// the first rejection. An empty iterable fulfills with `[]`.
    pub fn promise_all(&mut self, iterable: Value) -> Result<ObjRef> {
        let result = self.new_promise()?;
        let items = match self.iterate_to_values(iterable) {
            Ok(items) => items,
            Err(ExecutionError::Thrown(reason)) => {
                self.promise_reject(result, reason)?;
                return Ok(result);
            }
            Err(other) => return Err(other),
        };
        if items.is_empty() {
            let empty = self.new_array(Vec::new())?;
            self.promise_resolve(result, Value::Object(empty))?;
            return Ok(result);
        }

        let values = self.new_array(vec![Value::Undefined; items.len()])?;
        let state = self.new_counter(items.len())?;
        for (index, item) in items.into_iter().enumerate() {
            let inner = self.promise_resolve_value(item)?;
            let on_fulfilled = self.new_function(
                "",
                1,
                all_on_fulfilled,
                vec![
                    Value::Object(state),
                    Value::Int32(index as i32),
                    Value::Object(values),
                    Value::Object(result),
                ],
            )?;
            let on_rejected =
                self.new_function("", 1, settle_reject, vec![Value::Object(result)])?;
            self.promise_then(
                inner,
                Some(Value::Object(on_fulfilled)),
                Some(Value::Object(on_rejected)),
            )?;
        }
        Ok(result)
    }

    /// `Promise.race`: settle with the first input settlement. An empty
    /// iterable leaves the result forever pending.
    pub fn promise_race(&mut self, iterable: Value) -> Result<ObjRef> {
        let result = self.new_promise()?;
        let items = match self.iterate_to_values(iterable) {
            Ok(items) => items,
            Err(ExecutionError::Thrown(reason)) => {
                self.promise_reject(result, reason)?;
                return Ok(result);
            }
            Err(other) => return Err(other),
        };
        for item in items {
            let inner = self.promise_resolve_value(item)?;
            let on_fulfilled =
                self.new_function("", 1, settle_fulfill, vec![Value::Object(result)])?;
            let on_rejected =
                self.new_function("", 1, settle_reject, vec![Value::Object(result)])?;
            self.promise_then(
                inner,
                Some(Value::Object(on_fulfilled)),
                Some(Value::Object(on_rejected)),
            )?;
        }
        Ok(result)
    }

    /// `Promise.allSettled`: always fulfills, with `{status, value}` /
    /// `{status, reason}` records in iteration order.
    pub fn promise_all_settled(&mut self, iterable: Value) -> Result<ObjRef> {
        let result = self.new_promise()?;
        let items = match self.iterate_to_values(iterable) {
            Ok(items) => items,
            Err(ExecutionError::Thrown(reason)) => {
                self.promise_reject(result, reason)?;
                return Ok(result);
            }
            Err(other) => return Err(other),
        };
        if items.is_empty() {
            let empty = self.new_array(Vec::new())?;
            self.promise_resolve(result, Value::Object(empty))?;
            return Ok(result);
        }

        let values = self.new_array(vec![Value::Undefined; items.len()])?;
        let state = self.new_counter(items.len())?;
        for (index, item) in items.into_iter().enumerate() {
            let inner = self.promise_resolve_value(item)?;
            let captures = vec![
                Value::Object(state),
                Value::Int32(index as i32),
                Value::Object(values),
                Value::Object(result),
            ];
            let on_fulfilled =
                self.new_function("", 1, all_settled_on_fulfilled, captures.clone())?;
            let on_rejected = self.new_function("", 1, all_settled_on_rejected, captures)?;
            self.promise_then(
                inner,
                Some(Value::Object(on_fulfilled)),
                Some(Value::Object(on_rejected)),
            )?;
        }
        Ok(result)
    }

    /// `Promise.any`: fulfill with the first fulfillment; if everything
    /// rejects, reject with an AggregateError preserving iteration order.
    /// An empty iterable rejects immediately.
    pub fn promise_any(&mut self, iterable: Value) -> Result<ObjRef> {
        let result = self.new_promise()?;
        let items = match self.iterate_to_values(iterable) {
            Ok(items) => items,
            Err(ExecutionError::Thrown(reason)) => {
                self.promise_reject(result, reason)?;
                return Ok(result);
            }
            Err(other) => return Err(other),
        };
        if items.is_empty() {
            let aggregate = self.aggregate_error("all promises were rejected", Vec::new())?;
            self.promise_reject(result, Value::Object(aggregate))?;
            return Ok(result);
        }

        let errors = self.new_array(vec![Value::Undefined; items.len()])?;
        let state = self.new_counter(items.len())?;
        for (index, item) in items.into_iter().enumerate() {
            let inner = self.promise_resolve_value(item)?;
            let on_fulfilled =
                self.new_function("", 1, settle_fulfill, vec![Value::Object(result)])?;
            let on_rejected = self.new_function(
                "",
                1,
                any_on_rejected,
                vec![
                    Value::Object(state),
                    Value::Int32(index as i32),
                    Value::Object(errors),
                    Value::Object(result),
                ],
            )?;
            self.promise_then(
                inner,
                Some(Value::Object(on_fulfilled)),
                Some(Value::Object(on_rejected)),
            )?;
        }
        Ok(result)
    }

    // ---- shared accumulator plumbing ----------------------------------

    fn new_counter(&mut self, remaining: usize) -> Result<ObjRef> {
        let state = self.new_object_with_proto(None)?;
        let key = self.intern("remaining");
        self.heap
            .get_mut(state)
            .expect("freshly allocated")
            .properties
            .insert(
                key,
                PropertyDescriptor::data(Value::Int32(remaining as i32), true, false, false),
            );
        Ok(state)
    }

    /// Decrement the counter, returning the new value.
    fn counter_decrement(&mut self, state: ObjRef) -> i32 {
        let key = self.intern("remaining");
        let Some(desc) = self
            .heap
            .get_mut(state)
            .and_then(|o| o.properties.get_mut(key))
        else {
            return i32::MAX;
        };
        let next = match desc.value {
            Some(Value::Int32(n)) => n - 1,
            _ => i32::MAX,
        };
        desc.value = Some(Value::Int32(next));
        next
    }

    fn store_element(&mut self, array: ObjRef, index: i32, value: Value) {
        if let Some(crate::object::Payload::Array(elements)) =
            self.heap.get_mut(array).map(|o| &mut o.payload)
        {
            if let Some(slot) = elements.get_mut(index as usize) {
                *slot = value;
            }
        }
    }
}

fn accumulator(captures: &[Value]) -> (ObjRef, i32, ObjRef, ObjRef) {
    let state = captures[0].as_object().expect("state capture");
    let index = match captures[1] {
        Value::Int32(i) => i,
        _ => unreachable!("index capture"),
    };
    let array = captures[2].as_object().expect("array capture");
    let result = captures[3].as_object().expect("result capture");
    (state, index, array, result)
}

fn all_on_fulfilled(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    let (state, index, values, result) = accumulator(captures);
    let value = args.first().copied().unwrap_or(Value::Undefined);
    ctx.store_element(values, index, value);
    if ctx.counter_decrement(state) == 0 {
        ctx.promise_resolve(result, Value::Object(values))?;
    }
    Ok(Value::Undefined)
}

fn all_settled_on_fulfilled(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    let (state, index, values, result) = accumulator(captures);
    let value = args.first().copied().unwrap_or(Value::Undefined);
    let record = ctx.new_object()?;
    let status = ctx.str_value("fulfilled");
    ctx.set_str(record, "status", status)?;
    ctx.set_str(record, "value", value)?;
    ctx.store_element(values, index, Value::Object(record));
    if ctx.counter_decrement(state) == 0 {
        ctx.promise_resolve(result, Value::Object(values))?;
    }
    Ok(Value::Undefined)
}

fn all_settled_on_rejected(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    let (state, index, values, result) = accumulator(captures);
    let reason = args.first().copied().unwrap_or(Value::Undefined);
    let record = ctx.new_object()?;
    let status = ctx.str_value("rejected");
    ctx.set_str(record, "status", status)?;
    ctx.set_str(record, "reason", reason)?;
    ctx.store_element(values, index, Value::Object(record));
    if ctx.counter_decrement(state) == 0 {
        ctx.promise_resolve(result, Value::Object(values))?;
    }
    Ok(Value::Undefined)
}

fn any_on_rejected(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    let (state, index, errors, result) = accumulator(captures);
    let reason = args.first().copied().unwrap_or(Value::Undefined);
    ctx.store_element(errors, index, reason);
    if ctx.counter_decrement(state) == 0 {
        let collected = match ctx.heap.get(errors).map(|o| &o.payload) {
            Some(crate::object::Payload::Array(elements)) => elements.clone(),
            _ => Vec::new(),
        };
        let aggregate = ctx.aggregate_error("all promises were rejected", collected)?;
        ctx.promise_reject(result, Value::Object(aggregate))?;
    }
    Ok(Value::Undefined)
}

/// Settle the captured promise with the first argument (race/any fast
/// paths); the promise's own guard makes later settlements no-ops.
fn settle_fulfill(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    let result = captures[0].as_object().expect("result capture");
    let value = args.first().copied().unwrap_or(Value::Undefined);
    ctx.promise_resolve(result, value)?;
    Ok(Value::Undefined)
}

fn settle_reject(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    let result = captures[0].as_object().expect("result capture");
    let reason = args.first().copied().unwrap_or(Value::Undefined);
    ctx.promise_reject(result, reason)?;
    Ok(Value::Undefined)
}
