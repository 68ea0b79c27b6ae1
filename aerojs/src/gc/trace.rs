// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Object graph walking. One function knows which fields of an object are
//! strong references; the mark phase and the compactor both use it, so the
//! two can never disagree about reachability.
//!
//! Weak edges are the whole point of this file's few omissions: WeakRef
//! targets, WeakMap keys, WeakSet members and registry targets are *not*
//! visited here.

use crate::object::{Object, Payload};
use crate::value::{ObjRef, Value};

/// Visit a value's object reference, if it has one.
fn visit_value<F: FnMut(ObjRef)>(visit: &mut F, v: Value) {
    if let Value::Object(r) = v {
        visit(r);
    }
}

/// Visit every strong object reference held by `obj`.
pub(crate) fn visit_children<F: FnMut(ObjRef)>(obj: &Object, visit: &mut F) {
    if let Some(proto) = obj.prototype {
        visit(proto);
    }
    for (_, desc) in obj.properties.iter() {
        if let Some(value) = desc.value {
            visit_value(visit, value);
        }
        if let Some(get) = desc.get {
            visit(get);
        }
        if let Some(set) = desc.set {
            visit(set);
        }
    }
    for (_, desc) in &obj.sym_properties {
        if let Some(value) = desc.value {
            visit_value(visit, value);
        }
        if let Some(get) = desc.get {
            visit(get);
        }
        if let Some(set) = desc.set {
            visit(set);
        }
    }

    match &obj.payload {
        Payload::None
        | Payload::Error(_)
        | Payload::Date(_)
        | Payload::RegExp { .. }
        | Payload::ArrayBuffer(_)
        | Payload::WasmModule(_)
        | Payload::WasmMemory(_) => {}

        Payload::Array(elements) => {
            for &v in elements {
                visit_value(visit, v);
            }
        }
        Payload::Wrapper(value) => visit_value(visit, *value),

        Payload::Function(f) => {
            for &v in &f.captures {
                visit_value(visit, v);
            }
            if let Some(bound) = &f.bound {
                visit(bound.target);
                visit_value(visit, bound.this);
                for &v in &bound.args {
                    visit_value(visit, v);
                }
            }
        }

        Payload::Map(entries) => {
            for &(k, v) in entries {
                visit_value(visit, k);
                visit_value(visit, v);
            }
        }
        Payload::Set(members) => {
            for &v in members {
                visit_value(visit, v);
            }
        }

        // Weak keys/members are invisible; held values are strong.
        Payload::WeakMap(entries) => {
            for (_, v) in entries {
                visit_value(visit, *v);
            }
        }
        Payload::WeakSet(_) => {}

        Payload::Promise(p) => {
            visit_value(visit, p.result);
            for reaction in &p.reactions {
                if let Some(handler) = reaction.handler {
                    visit_value(visit, handler);
                }
                visit(reaction.capability);
            }
        }

        // The target is weak; only the fast-path flag lives here.
        Payload::WeakRef(_) => {}

        Payload::FinalizationRegistry(reg) => {
            visit_value(visit, reg.callback);
            for entry in &reg.entries {
                visit_value(visit, entry.held);
                visit_value(visit, entry.token);
            }
        }

        Payload::TypedArray(ta) => visit(ta.buffer),
        Payload::DataView { buffer, .. } => visit(*buffer),
        Payload::Proxy { target, handler } => {
            visit(*target);
            visit(*handler);
        }
        Payload::WasmInstance { module, exports } => {
            visit(*module);
            visit(*exports);
        }
        Payload::WasmTable(t) => {
            for &v in &t.elements {
                visit_value(visit, v);
            }
        }
        Payload::WasmGlobal(g) => visit_value(visit, g.value),
    }
}

/// Rewrite every strong object reference through `fwd` (compaction).
pub(crate) fn forward_children(obj: &mut Object, fwd: &impl Fn(ObjRef) -> ObjRef) {
    let fwd_value = |v: &mut Value| {
        if let Value::Object(r) = v {
            *r = fwd(*r);
        }
    };
    let fwd_desc = |desc: &mut crate::object::PropertyDescriptor| {
        if let Some(value) = &mut desc.value {
            fwd_value(value);
        }
        if let Some(get) = &mut desc.get {
            *get = fwd(*get);
        }
        if let Some(set) = &mut desc.set {
            *set = fwd(*set);
        }
    };

    if let Some(proto) = &mut obj.prototype {
        *proto = fwd(*proto);
    }
    for entry in obj.properties.iter_mut() {
        fwd_desc(&mut entry.1);
    }
    for (_, desc) in &mut obj.sym_properties {
        fwd_desc(desc);
    }

    match &mut obj.payload {
        Payload::None
        | Payload::Error(_)
        | Payload::Date(_)
        | Payload::RegExp { .. }
        | Payload::ArrayBuffer(_)
        | Payload::WasmModule(_)
        | Payload::WasmMemory(_)
        | Payload::WeakRef(_)
        | Payload::WeakSet(_) => {}

        Payload::Array(elements) => elements.iter_mut().for_each(fwd_value),
        Payload::Wrapper(value) => fwd_value(value),

        Payload::Function(f) => {
            f.captures.iter_mut().for_each(fwd_value);
            if let Some(bound) = &mut f.bound {
                bound.target = fwd(bound.target);
                fwd_value(&mut bound.this);
                bound.args.iter_mut().for_each(fwd_value);
            }
        }

        Payload::Map(entries) => {
            for (k, v) in entries {
                fwd_value(k);
                fwd_value(v);
            }
        }
        Payload::Set(members) => members.iter_mut().for_each(fwd_value),
        Payload::WeakMap(entries) => {
            for (_, v) in entries {
                fwd_value(v);
            }
        }

        Payload::Promise(p) => {
            fwd_value(&mut p.result);
            for reaction in &mut p.reactions {
                if let Some(handler) = &mut reaction.handler {
                    fwd_value(handler);
                }
                reaction.capability = fwd(reaction.capability);
            }
        }

        Payload::FinalizationRegistry(reg) => {
            fwd_value(&mut reg.callback);
            for entry in &mut reg.entries {
                fwd_value(&mut entry.held);
                fwd_value(&mut entry.token);
            }
        }

        Payload::TypedArray(ta) => ta.buffer = fwd(ta.buffer),
        Payload::DataView { buffer, .. } => *buffer = fwd(*buffer),
        Payload::Proxy { target, handler } => {
            *target = fwd(*target);
            *handler = fwd(*handler);
        }
        Payload::WasmInstance { module, exports } => {
            *module = fwd(*module);
            *exports = fwd(*exports);
        }
        Payload::WasmTable(t) => t.elements.iter_mut().for_each(fwd_value),
        Payload::WasmGlobal(g) => fwd_value(&mut g.value),
    }
}
