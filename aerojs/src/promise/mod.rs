// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! The promise state machine and resolution protocol.
//!
//! Settlement is one-shot: the `already_resolved` flag guards the external
//! resolving surface of every promise, and each resolving-function pair
//! (executor or thenable job) additionally carries its own once-flag so a
//! misbehaving thenable cannot double-settle. Reactions only ever run as
//! microtasks.

use aerojs_shared::PromiseState;

use crate::context::Context;
use crate::error::{ExecutionError, Result};
use crate::microtask::Job;
use crate::object::{Object, ObjectKind, Payload, PropertyDescriptor};
use crate::value::{ObjRef, Value};

mod combinators;

/// Which settlement a reaction record responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Fulfill,
    Reject,
}

/// One half of a `then` registration: the handler (absent means
/// passthrough) and the derived promise it settles.
#[derive(Debug)]
pub struct Reaction {
    pub kind: ReactionKind,
    pub handler: Option<Value>,
    pub capability: ObjRef,
}

/// Kind-specific state of a Promise object.
#[derive(Debug)]
pub struct PromisePayload {
    pub state: PromiseState,
    pub result: Value,
    pub reactions: Vec<Reaction>,
    /// Set the first time the resolution protocol runs for this promise.
    pub already_resolved: bool,
    /// A rejection handler has been (or will be) attached.
    pub handled: bool,
}

impl Default for PromisePayload {
    fn default() -> Self {
        PromisePayload {
            state: PromiseState::Pending,
            result: Value::Undefined,
            reactions: Vec::new(),
            already_resolved: false,
            handled: false,
        }
    }
}

impl Context {
    // ---- construction --------------------------------------------------

    /// A fresh pending promise.
    pub fn new_promise(&mut self) -> Result<ObjRef> {
        let proto = self.intrinsics.promise_prototype;
        let mut obj = Object::new(
            ObjectKind::Promise,
            Some(proto),
            Payload::Promise(PromisePayload::default()),
        );
        obj.class_name = Some("Promise");
        self.alloc(obj)
    }

    /// `new Promise(executor)`: run the executor synchronously with a
    /// guarded resolve/reject pair; an executor throw rejects.
    pub fn promise_with_executor(&mut self, executor: Value) -> Result<ObjRef> {
        if !self.is_callable(executor) {
            return Err(self.type_error("Promise executor must be callable"));
        }
        let promise = self.new_promise()?;
        let (resolve, reject) = self.create_resolving_functions(promise)?;
        match self.call(executor, Value::Undefined, &[resolve, reject]) {
            Ok(_) => {}
            Err(ExecutionError::Thrown(reason)) => {
                // Routed through the guarded reject function: a settlement
                // that already happened wins over the throw.
                self.call(reject, Value::Undefined, &[reason])?;
            }
            Err(other) => return Err(other),
        }
        Ok(promise)
    }

    /// `Promise.resolve(v)`: existing promises pass through unchanged.
    pub fn promise_resolve_value(&mut self, value: Value) -> Result<ObjRef> {
        if let Some(r) = value.as_object() {
            if self.heap.get(r).map(|o| o.kind) == Some(ObjectKind::Promise) {
                return Ok(r);
            }
        }
        let promise = self.new_promise()?;
        self.promise_payload_mut(promise)?.already_resolved = true;
        self.resolution(promise, value)?;
        Ok(promise)
    }

    /// `Promise.reject(r)`.
    pub fn promise_rejected_value(&mut self, reason: Value) -> Result<ObjRef> {
        let promise = self.new_promise()?;
        self.promise_payload_mut(promise)?.already_resolved = true;
        self.reject_internal(promise, reason)?;
        Ok(promise)
    }

    // ---- state ---------------------------------------------------------

    pub fn promise_state(&self, promise: ObjRef) -> Option<(PromiseState, Value)> {
        match self.heap.get(promise).map(|o| &o.payload) {
            Some(Payload::Promise(p)) => Some((p.state, p.result)),
            _ => None,
        }
    }

    pub(crate) fn promise_payload_mut(&mut self, promise: ObjRef) -> Result<&mut PromisePayload> {
        let is_promise = matches!(
            self.heap.get(promise).map(|o| &o.payload),
            Some(Payload::Promise(_))
        );
        if !is_promise {
            return Err(self.type_error("value is not a promise"));
        }
        match &mut self.heap.get_mut(promise).expect("checked above").payload {
            Payload::Promise(p) => Ok(p),
            _ => unreachable!("kind tags are immutable"),
        }
    }

    // ---- the resolution protocol --------------------------------------

    /// Resolve `promise` with `value`. A no-op once the promise's external
    /// resolving surface has been used.
    pub fn promise_resolve(&mut self, promise: ObjRef, value: Value) -> Result<()> {
        let payload = self.promise_payload_mut(promise)?;
        if payload.already_resolved {
            return Ok(());
        }
        payload.already_resolved = true;
        self.resolution(promise, value)
    }

    /// Reject `promise` with `reason`, same guard as resolve.
    pub fn promise_reject(&mut self, promise: ObjRef, reason: Value) -> Result<()> {
        let payload = self.promise_payload_mut(promise)?;
        if payload.already_resolved {
            return Ok(());
        }
        payload.already_resolved = true;
        self.reject_internal(promise, reason)
    }

    /// The resolution procedure: self-resolution rejects, thenables are
    /// assimilated on a microtask, anything else fulfills.
    pub(crate) fn resolution(&mut self, promise: ObjRef, value: Value) -> Result<()> {
        if value == Value::Object(promise) {
            let err = self.raise(
                aerojs_shared::ErrorKind::Type,
                "promise cannot be resolved with itself",
            );
            return match err {
                ExecutionError::Thrown(reason) => self.reject_internal(promise, reason),
                other => Err(other),
            };
        }

        if let Some(obj) = value.as_object() {
            // The `then` read happens synchronously; a throwing getter
            // rejects right here. Only the invocation is deferred.
            let then = match self.get_str(obj, "then") {
                Ok(then) => then,
                Err(ExecutionError::Thrown(reason)) => {
                    return self.reject_internal(promise, reason)
                }
                Err(other) => return Err(other),
            };
            if self.is_callable(then) {
                self.microtasks.enqueue(Job::ResolveThenable {
                    promise,
                    thenable: value,
                    then,
                });
                return Ok(());
            }
        }

        self.fulfill_internal(promise, value)
    }

    pub(crate) fn fulfill_internal(&mut self, promise: ObjRef, value: Value) -> Result<()> {
        let payload = self.promise_payload_mut(promise)?;
        if payload.state.is_settled() {
            return Ok(());
        }
        payload.state = PromiseState::Fulfilled;
        payload.result = value;
        let reactions = std::mem::take(&mut payload.reactions);
        for reaction in reactions {
            if reaction.kind == ReactionKind::Fulfill {
                self.microtasks.enqueue(Job::Reaction {
                    kind: ReactionKind::Fulfill,
                    handler: reaction.handler,
                    capability: reaction.capability,
                    argument: value,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn reject_internal(&mut self, promise: ObjRef, reason: Value) -> Result<()> {
        let payload = self.promise_payload_mut(promise)?;
        if payload.state.is_settled() {
            return Ok(());
        }
        payload.state = PromiseState::Rejected;
        payload.result = reason;
        let handled = payload.handled;
        let reactions = std::mem::take(&mut payload.reactions);
        let mut had_reject_reaction = false;
        for reaction in reactions {
            if reaction.kind == ReactionKind::Reject {
                had_reject_reaction = true;
                self.microtasks.enqueue(Job::Reaction {
                    kind: ReactionKind::Reject,
                    handler: reaction.handler,
                    capability: reaction.capability,
                    argument: reason,
                });
            }
        }
        if !had_reject_reaction && !handled {
            // Candidate for the unhandled-rejection report at drain end.
            self.pending_rejections.push(promise);
        }
        Ok(())
    }

    // ---- then / catch / finally ---------------------------------------

    /// Register reactions, returning the derived promise. Missing handlers
    /// pass fulfillments through and rethrow rejections.
    pub fn promise_then(
        &mut self,
        promise: ObjRef,
        on_fulfilled: Option<Value>,
        on_rejected: Option<Value>,
    ) -> Result<ObjRef> {
        let capability = self.new_promise()?;
        let payload = self.promise_payload_mut(promise)?;
        payload.handled = true;
        match payload.state {
            PromiseState::Pending => {
                payload.reactions.push(Reaction {
                    kind: ReactionKind::Fulfill,
                    handler: on_fulfilled,
                    capability,
                });
                payload.reactions.push(Reaction {
                    kind: ReactionKind::Reject,
                    handler: on_rejected,
                    capability,
                });
            }
            PromiseState::Fulfilled => {
                let argument = payload.result;
                self.microtasks.enqueue(Job::Reaction {
                    kind: ReactionKind::Fulfill,
                    handler: on_fulfilled,
                    capability,
                    argument,
                });
            }
            PromiseState::Rejected => {
                let argument = payload.result;
                self.microtasks.enqueue(Job::Reaction {
                    kind: ReactionKind::Reject,
                    handler: on_rejected,
                    capability,
                    argument,
                });
            }
        }
        Ok(capability)
    }

    pub fn promise_catch(&mut self, promise: ObjRef, on_rejected: Option<Value>) -> Result<ObjRef> {
        self.promise_then(promise, None, on_rejected)
    }

    /// `finally(cb)`: the callback runs on either settlement and the
    /// original value/reason passes through, unless the callback throws or
    /// returns a promise that rejects.
    pub fn promise_finally(&mut self, promise: ObjRef, callback: Value) -> Result<ObjRef> {
        if !self.is_callable(callback) {
            return self.promise_then(promise, None, None);
        }
        let on_fulfilled = self.new_function("", 1, finally_fulfill, vec![callback])?;
        let on_rejected = self.new_function("", 1, finally_reject, vec![callback])?;
        self.promise_then(
            promise,
            Some(Value::Object(on_fulfilled)),
            Some(Value::Object(on_rejected)),
        )
    }

    // ---- resolving functions ------------------------------------------

    /// The (resolve, reject) function pair handed to an executor. The pair
    /// shares a once-flag object.
    pub fn create_resolving_functions(&mut self, promise: ObjRef) -> Result<(Value, Value)> {
        let flag = self.new_once_flag()?;
        let captures = vec![Value::Object(flag), Value::Object(promise)];
        let resolve = self.new_function("resolve", 1, executor_resolve, captures.clone())?;
        let reject = self.new_function("reject", 1, executor_reject, captures)?;
        Ok((Value::Object(resolve), Value::Object(reject)))
    }

    fn new_once_flag(&mut self) -> Result<ObjRef> {
        let flag = self.new_object_with_proto(None)?;
        let key = self.intern("consumed");
        self.heap
            .get_mut(flag)
            .expect("freshly allocated")
            .properties
            .insert(
                key,
                PropertyDescriptor::data(Value::Bool(false), true, false, false),
            );
        Ok(flag)
    }

    /// Consume a once-flag; true exactly on the first call.
    fn consume_once_flag(&mut self, flag: ObjRef) -> bool {
        let key = self.intern("consumed");
        let Some(object) = self.heap.get_mut(flag) else {
            return false;
        };
        let Some(desc) = object.properties.get_mut(key) else {
            return false;
        };
        if desc.value == Some(Value::Bool(true)) {
            return false;
        }
        desc.value = Some(Value::Bool(true));
        true
    }

    // ---- microtask job bodies -----------------------------------------

    pub(crate) fn run_reaction_job(
        &mut self,
        kind: ReactionKind,
        handler: Option<Value>,
        capability: ObjRef,
        argument: Value,
    ) -> Result<()> {
        match handler {
            Some(handler) => match self.call(handler, Value::Undefined, &[argument]) {
                Ok(value) => {
                    self.promise_payload_mut(capability)?.already_resolved = true;
                    self.resolution(capability, value)
                }
                Err(ExecutionError::Thrown(reason)) => self.reject_internal(capability, reason),
                Err(ExecutionError::OutOfMemory) => {
                    // Synthetic out-of-memory rejection in the promise that
                    // was active when the limit tripped.
                    let reason = self.raise(
                        aerojs_shared::ErrorKind::Range,
                        "allocation failed: memory limit reached",
                    );
                    match reason {
                        ExecutionError::Thrown(reason) => {
                            self.reject_internal(capability, reason)
                        }
                        other => Err(other),
                    }
                }
                Err(other) => Err(other),
            },
            // Passthrough: identity for fulfillments, rethrow for
            // rejections.
            None => match kind {
                ReactionKind::Fulfill => {
                    self.promise_payload_mut(capability)?.already_resolved = true;
                    self.resolution(capability, argument)
                }
                ReactionKind::Reject => self.reject_internal(capability, argument),
            },
        }
    }

    pub(crate) fn run_thenable_job(
        &mut self,
        promise: ObjRef,
        thenable: Value,
        then: Value,
    ) -> Result<()> {
        let flag = self.new_once_flag()?;
        let captures = vec![Value::Object(flag), Value::Object(promise)];
        let resolve = self.new_function("", 1, thenable_resolve, captures.clone())?;
        let reject = self.new_function("", 1, thenable_reject, captures)?;
        match self.call(
            then,
            thenable,
            &[Value::Object(resolve), Value::Object(reject)],
        ) {
            Ok(_) => Ok(()),
            Err(ExecutionError::Thrown(reason)) => {
                // The guarded reject: ignored if the thenable already
                // settled the promise.
                if self.consume_once_flag(flag) {
                    self.reject_internal(promise, reason)
                } else {
                    Ok(())
                }
            }
            Err(other) => Err(other),
        }
    }
}

// ---- native function bodies -------------------------------------------

fn once_pair(captures: &[Value]) -> (ObjRef, ObjRef) {
    let flag = captures[0].as_object().expect("once flag capture");
    let promise = captures[1].as_object().expect("promise capture");
    (flag, promise)
}

fn executor_resolve(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    let (flag, promise) = once_pair(captures);
    if ctx.consume_once_flag(flag) {
        let value = args.first().copied().unwrap_or(Value::Undefined);
        ctx.promise_resolve(promise, value)?;
    }
    Ok(Value::Undefined)
}

fn executor_reject(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    let (flag, promise) = once_pair(captures);
    if ctx.consume_once_flag(flag) {
        let reason = args.first().copied().unwrap_or(Value::Undefined);
        ctx.promise_reject(promise, reason)?;
    }
    Ok(Value::Undefined)
}

/// Resolve callback handed to a thenable's `then`. Runs the resolution
/// procedure directly: the promise's external surface is already consumed.
fn thenable_resolve(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    let (flag, promise) = once_pair(captures);
    if ctx.consume_once_flag(flag) {
        let value = args.first().copied().unwrap_or(Value::Undefined);
        ctx.resolution(promise, value)?;
    }
    Ok(Value::Undefined)
}

fn thenable_reject(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    let (flag, promise) = once_pair(captures);
    if ctx.consume_once_flag(flag) {
        let reason = args.first().copied().unwrap_or(Value::Undefined);
        ctx.reject_internal(promise, reason)?;
    }
    Ok(Value::Undefined)
}

/// `finally` fulfill wrapper: run the callback, wait for a returned
/// thenable, then pass the original value through.
fn finally_fulfill(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    let callback = captures[0];
    let original = args.first().copied().unwrap_or(Value::Undefined);
    let result = ctx.call(callback, Value::Undefined, &[])?;
    if is_thenable(ctx, result)? {
        let waiter = ctx.promise_resolve_value(result)?;
        let pass = ctx.new_function("", 0, passthrough_value, vec![original])?;
        let chained = ctx.promise_then(waiter, Some(Value::Object(pass)), None)?;
        return Ok(Value::Object(chained));
    }
    Ok(original)
}

/// `finally` reject wrapper: run the callback, wait, then rethrow the
/// original reason.
fn finally_reject(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    let callback = captures[0];
    let original = args.first().copied().unwrap_or(Value::Undefined);
    let result = ctx.call(callback, Value::Undefined, &[])?;
    if is_thenable(ctx, result)? {
        let waiter = ctx.promise_resolve_value(result)?;
        let rethrow = ctx.new_function("", 0, rethrow_reason, vec![original])?;
        let chained = ctx.promise_then(waiter, Some(Value::Object(rethrow)), None)?;
        return Ok(Value::Object(chained));
    }
    Err(ExecutionError::Thrown(original))
}

fn passthrough_value(
    _ctx: &mut Context,
    _this: Value,
    _args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    Ok(captures[0])
}

fn rethrow_reason(
    _ctx: &mut Context,
    _this: Value,
    _args: &[Value],
    captures: &[Value],
) -> Result<Value> {
    Err(ExecutionError::Thrown(captures[0]))
}

fn is_thenable(ctx: &mut Context, value: Value) -> Result<bool> {
    let Some(obj) = value.as_object() else {
        return Ok(false);
    };
    let then = ctx.get_str(obj, "then")?;
    Ok(ctx.is_callable(then))
}
