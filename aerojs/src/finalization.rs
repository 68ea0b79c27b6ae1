// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! FinalizationRegistry: per-entry weak targets with held values, token
//! unregistration, and cleanup callbacks that only ever run from the
//! microtask queue. An entry is enqueued at most once; unregistering before
//! the collection wins.

use std::collections::HashMap;

use crate::context::Context;
use crate::error::Result;
use crate::handle::WeakHandle;
use crate::microtask::Job;
use crate::object::{Object, ObjectKind, Payload};
use crate::value::{ObjRef, Value};

#[derive(Debug)]
pub struct RegistryEntry {
    pub target: WeakHandle,
    pub held: Value,
    pub token: Value,
}

#[derive(Debug)]
pub struct RegistryPayload {
    pub callback: Value,
    pub entries: Vec<RegistryEntry>,
    /// Token object → entry indices, rebuilt on unregistration.
    pub token_map: HashMap<ObjRef, Vec<usize>>,
    /// Reentrancy guard: one cleanup scan at a time.
    pub cleanup_in_progress: bool,
}

impl Default for RegistryPayload {
    fn default() -> Self {
        RegistryPayload {
            callback: Value::Undefined,
            entries: Vec::new(),
            token_map: HashMap::new(),
            cleanup_in_progress: false,
        }
    }
}

impl Context {
    /// `new FinalizationRegistry(cleanupCallback)`.
    pub fn new_finalization_registry(&mut self, callback: Value) -> Result<ObjRef> {
        if !self.is_callable(callback) {
            return Err(self.type_error("FinalizationRegistry requires a callable cleanup callback"));
        }
        let proto = self.intrinsics.finalization_registry_prototype;
        let mut obj = Object::new(
            ObjectKind::FinalizationRegistry,
            Some(proto),
            Payload::FinalizationRegistry(RegistryPayload {
                callback,
                ..Default::default()
            }),
        );
        obj.class_name = Some("FinalizationRegistry");
        self.alloc(obj)
    }

    fn registry_payload_mut(&mut self, registry: ObjRef) -> Result<&mut RegistryPayload> {
        let ok = matches!(
            self.heap.get(registry).map(|o| &o.payload),
            Some(Payload::FinalizationRegistry(_))
        );
        if !ok {
            return Err(self.type_error("receiver is not a FinalizationRegistry"));
        }
        match &mut self.heap.get_mut(registry).expect("checked above").payload {
            Payload::FinalizationRegistry(p) => Ok(p),
            _ => unreachable!("kind tags are immutable"),
        }
    }

    /// `register(target, heldValue, unregisterToken?)`.
    pub fn registry_register(
        &mut self,
        registry: ObjRef,
        target: Value,
        held: Value,
        token: Value,
    ) -> Result<()> {
        let Some(target_ref) = target.as_object() else {
            return Err(self.type_error("register target must be an object"));
        };
        if self.same_value(target, held) {
            return Err(self.type_error("target and held value cannot be the same"));
        }
        let token_ref = match token {
            Value::Undefined => None,
            Value::Object(r) => Some(r),
            _ => return Err(self.type_error("unregister token must be an object")),
        };

        let handle = self.handles.create_weak_handle(Some(target_ref));
        let payload = self.registry_payload_mut(registry)?;
        let index = payload.entries.len();
        payload.entries.push(RegistryEntry {
            target: handle,
            held,
            token,
        });
        if let Some(token_ref) = token_ref {
            payload.token_map.entry(token_ref).or_default().push(index);
        }
        Ok(())
    }

    /// `unregister(token)`: drop every entry registered under the token.
    /// True if anything was removed.
    pub fn registry_unregister(&mut self, registry: ObjRef, token: Value) -> Result<bool> {
        let Some(token_ref) = token.as_object() else {
            return Err(self.type_error("unregister token must be an object"));
        };
        let payload = self.registry_payload_mut(registry)?;
        if !payload.token_map.contains_key(&token_ref) {
            return Ok(false);
        }
        let before = payload.entries.len();
        payload
            .entries
            .retain(|entry| entry.token.as_object() != Some(token_ref));
        let removed = before - payload.entries.len();
        rebuild_token_map(payload);
        Ok(removed > 0)
    }

    /// `cleanupSome(callback?)`: synchronously scan for entries whose
    /// target already died and enqueue their cleanups, using the given
    /// callback if callable, the registry's own otherwise. The callbacks
    /// themselves still run on the microtask queue.
    pub fn registry_cleanup_some(&mut self, registry: ObjRef, callback: Option<Value>) -> Result<()> {
        if let Some(cb) = callback {
            if !cb.is_undefined() && !self.is_callable(cb) {
                return Err(self.type_error("cleanupSome callback must be callable"));
            }
        }
        let payload = self.registry_payload_mut(registry)?;
        if payload.cleanup_in_progress {
            return Ok(());
        }
        payload.cleanup_in_progress = true;

        let callback = match callback {
            Some(cb) if !cb.is_undefined() => cb,
            _ => payload.callback,
        };
        let jobs = drain_dead_entries(payload, callback);
        for job in jobs {
            self.microtasks.enqueue(job);
        }

        self.registry_payload_mut(registry)?.cleanup_in_progress = false;
        Ok(())
    }

    /// Number of live registrations, for diagnostics.
    pub fn registry_len(&mut self, registry: ObjRef) -> Result<usize> {
        Ok(self.registry_payload_mut(registry)?.entries.len())
    }
}

/// Remove entries whose targets died and turn them into cleanup jobs, in
/// registration order.
fn drain_dead_entries(payload: &mut RegistryPayload, callback: Value) -> Vec<Job> {
    let mut jobs = Vec::new();
    let mut any_dead = false;
    for entry in &payload.entries {
        if !entry.target.is_valid() {
            any_dead = true;
            jobs.push(Job::Cleanup {
                callback,
                held: entry.held,
            });
        }
    }
    if any_dead {
        payload.entries.retain(|entry| entry.target.is_valid());
        rebuild_token_map(payload);
    }
    jobs
}

fn rebuild_token_map(payload: &mut RegistryPayload) {
    payload.token_map.clear();
    for (index, entry) in payload.entries.iter().enumerate() {
        if let Some(token) = entry.token.as_object() {
            payload.token_map.entry(token).or_default().push(index);
        }
    }
}

/// Post-GC provider: enqueue cleanups for entries whose handles were just
/// invalidated. Runs after every validity flip of the cycle has completed.
pub(crate) fn registry_provider(ctx: &mut Context, registry: ObjRef) {
    let jobs = match ctx.heap.get_mut(registry).map(|o| &mut o.payload) {
        Some(Payload::FinalizationRegistry(payload)) => {
            let callback = payload.callback;
            drain_dead_entries(payload, callback)
        }
        _ => return,
    };
    for job in jobs {
        ctx.microtasks.enqueue(job);
    }
}
