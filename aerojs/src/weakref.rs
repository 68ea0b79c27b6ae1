// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! WeakRef objects: a weak handle plus an atomic target-alive flag that
//! makes `deref` a cheap read on the fast path. The flag is refreshed by
//! the collector's post-GC provider, monotonically: once false, it never
//! flips back for the same target.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::context::Context;
use crate::error::Result;
use crate::handle::WeakHandle;
use crate::object::{Object, ObjectKind, Payload};
use crate::value::{ObjRef, Value};

#[derive(Debug)]
pub struct WeakRefPayload {
    pub handle: WeakHandle,
    pub target_alive: AtomicBool,
}

impl Context {
    /// `new WeakRef(target)`. The target must be an object.
    pub fn new_weakref(&mut self, target: Value) -> Result<ObjRef> {
        let Some(target) = target.as_object() else {
            return Err(self.type_error("WeakRef target must be an object"));
        };
        let handle = self.handles.create_weak_handle(Some(target));
        let proto = self.intrinsics.weakref_prototype;
        let mut obj = Object::new(
            ObjectKind::WeakRef,
            Some(proto),
            Payload::WeakRef(WeakRefPayload {
                handle,
                target_alive: AtomicBool::new(true),
            }),
        );
        obj.class_name = Some("WeakRef");
        self.alloc(obj)
    }

    /// `WeakRef.prototype.deref`: the target while it is alive, undefined
    /// forever after.
    pub fn weakref_deref(&mut self, weakref: ObjRef) -> Result<Value> {
        let (alive, target) = match self.heap.get(weakref).map(|o| &o.payload) {
            Some(Payload::WeakRef(w)) => (
                w.target_alive.load(Ordering::Acquire),
                w.handle.target(),
            ),
            _ => return Err(self.type_error("receiver is not a WeakRef")),
        };
        if !alive {
            return Ok(Value::Undefined);
        }
        match target {
            Some(t) if self.heap.contains(t) => Ok(Value::Object(t)),
            _ => {
                // The handle died since the last provider pass; fold the
                // fast-path flag forward.
                if let Some(Payload::WeakRef(w)) = self.heap.get(weakref).map(|o| &o.payload) {
                    w.target_alive.store(false, Ordering::Release);
                }
                Ok(Value::Undefined)
            }
        }
    }

    /// Drop the target early. Used by the engine when tearing down scopes.
    pub fn weakref_clear(&mut self, weakref: ObjRef) -> Result<()> {
        match self.heap.get(weakref).map(|o| &o.payload) {
            Some(Payload::WeakRef(w)) => {
                w.handle.reset();
                w.target_alive.store(false, Ordering::Release);
                Ok(())
            }
            _ => Err(self.type_error("receiver is not a WeakRef")),
        }
    }
}

/// Post-GC provider: fold handle validity into the fast-path flag.
pub(crate) fn weakref_provider(ctx: &mut Context, weakref: ObjRef) {
    if let Some(Payload::WeakRef(w)) = ctx.heap.get(weakref).map(|o| &o.payload) {
        if !w.handle.is_valid() {
            w.target_alive.store(false, Ordering::Release);
        }
    }
}
