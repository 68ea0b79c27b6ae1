// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Structured clone: a deep copy over the transferable subset of the value
//! graph. Identity and cycles are preserved through a memo table; functions
//! and the other unclonable kinds raise a TypeError.

use std::collections::HashMap;

use crate::context::Context;
use crate::error::Result;
use crate::object::{Object, ObjectKind, Payload};
use crate::value::{ObjRef, Value};

impl Context {
    pub fn structured_clone(&mut self, value: Value) -> Result<Value> {
        let mut memo = HashMap::new();
        self.clone_value(value, &mut memo)
    }

    fn clone_value(&mut self, value: Value, memo: &mut HashMap<ObjRef, ObjRef>) -> Result<Value> {
        match value {
            Value::Symbol(_) => Err(self.type_error("symbols cannot be cloned")),
            Value::Object(r) => {
                if let Some(&existing) = memo.get(&r) {
                    return Ok(Value::Object(existing));
                }
                self.clone_object(r, memo).map(Value::Object)
            }
            primitive => Ok(primitive),
        }
    }

    fn clone_object(&mut self, source: ObjRef, memo: &mut HashMap<ObjRef, ObjRef>) -> Result<ObjRef> {
        let kind = match self.heap.get(source) {
            Some(obj) => obj.kind,
            None => return Err(self.type_error("object reference is no longer live")),
        };

        let target = match kind {
            ObjectKind::Ordinary => {
                let target = self.new_object()?;
                memo.insert(source, target);
                self.clone_plain_properties(source, target, memo)?;
                target
            }
            ObjectKind::Array => {
                let target = self.new_array(Vec::new())?;
                memo.insert(source, target);
                let elements = match self.heap.get(source).map(|o| &o.payload) {
                    Some(Payload::Array(e)) => e.clone(),
                    _ => unreachable!("array payload invariant"),
                };
                for element in elements {
                    let cloned = self.clone_value(element, memo)?;
                    self.array_push(target, cloned)?;
                }
                self.clone_plain_properties(source, target, memo)?;
                target
            }
            ObjectKind::Map => {
                let target = self.new_map()?;
                memo.insert(source, target);
                let entries = self.map_entries(source)?;
                for (k, v) in entries {
                    let ck = self.clone_value(k, memo)?;
                    let cv = self.clone_value(v, memo)?;
                    self.map_set(target, ck, cv)?;
                }
                target
            }
            ObjectKind::Set => {
                let target = self.new_set()?;
                memo.insert(source, target);
                let members = self.set_members(source)?;
                for member in members {
                    let cloned = self.clone_value(member, memo)?;
                    self.set_add(target, cloned)?;
                }
                target
            }
            ObjectKind::ArrayBuffer => {
                let bytes = match self.heap.get(source).map(|o| &o.payload) {
                    Some(Payload::ArrayBuffer(b)) => b.clone(),
                    _ => unreachable!("buffer payload invariant"),
                };
                let proto = self.intrinsics.object_prototype;
                let mut obj =
                    Object::new(ObjectKind::ArrayBuffer, Some(proto), Payload::ArrayBuffer(bytes));
                obj.class_name = Some("ArrayBuffer");
                let target = self.alloc(obj)?;
                memo.insert(source, target);
                target
            }
            ObjectKind::TypedArray => {
                let ta = match self.heap.get(source).map(|o| &o.payload) {
                    Some(Payload::TypedArray(ta)) => *ta,
                    _ => unreachable!("typed array payload invariant"),
                };
                let buffer = self.clone_object(ta.buffer, memo)?;
                let proto = self.intrinsics.object_prototype;
                let mut payload = ta;
                payload.buffer = buffer;
                let mut obj =
                    Object::new(ObjectKind::TypedArray, Some(proto), Payload::TypedArray(payload));
                obj.class_name = Some("TypedArray");
                let target = self.alloc(obj)?;
                memo.insert(source, target);
                target
            }
            ObjectKind::DataView => {
                let (buffer, byte_offset, byte_length) =
                    match self.heap.get(source).map(|o| &o.payload) {
                        Some(&Payload::DataView {
                            buffer,
                            byte_offset,
                            byte_length,
                        }) => (buffer, byte_offset, byte_length),
                        _ => unreachable!("data view payload invariant"),
                    };
                let buffer = self.clone_object(buffer, memo)?;
                let proto = self.intrinsics.object_prototype;
                let mut obj = Object::new(
                    ObjectKind::DataView,
                    Some(proto),
                    Payload::DataView {
                        buffer,
                        byte_offset,
                        byte_length,
                    },
                );
                obj.class_name = Some("DataView");
                let target = self.alloc(obj)?;
                memo.insert(source, target);
                target
            }
            ObjectKind::Date => {
                let time = match self.heap.get(source).map(|o| &o.payload) {
                    Some(&Payload::Date(t)) => t,
                    _ => unreachable!("date payload invariant"),
                };
                let proto = self.intrinsics.object_prototype;
                let mut obj = Object::new(ObjectKind::Date, Some(proto), Payload::Date(time));
                obj.class_name = Some("Date");
                let target = self.alloc(obj)?;
                memo.insert(source, target);
                target
            }
            ObjectKind::RegExp => {
                let (pattern, flags) = match self.heap.get(source).map(|o| &o.payload) {
                    Some(&Payload::RegExp { source, flags }) => (source, flags),
                    _ => unreachable!("regexp payload invariant"),
                };
                let proto = self.intrinsics.object_prototype;
                let mut obj = Object::new(
                    ObjectKind::RegExp,
                    Some(proto),
                    Payload::RegExp {
                        source: pattern,
                        flags,
                    },
                );
                obj.class_name = Some("RegExp");
                let target = self.alloc(obj)?;
                memo.insert(source, target);
                target
            }
            ObjectKind::Error => {
                let error_kind = match self.heap.get(source).map(|o| &o.payload) {
                    Some(&Payload::Error(k)) => k,
                    _ => unreachable!("error payload invariant"),
                };
                let message_key = self.intern("message");
                let message = self
                    .heap
                    .get(source)
                    .and_then(|o| o.properties.get(message_key))
                    .and_then(|d| d.value)
                    .map(|m| self.display_value(m))
                    .unwrap_or_default();
                let target = self.new_error(error_kind, &message)?;
                memo.insert(source, target);
                target
            }
            ObjectKind::StringWrapper | ObjectKind::NumberWrapper | ObjectKind::BooleanWrapper => {
                let primitive = match self.heap.get(source).map(|o| &o.payload) {
                    Some(&Payload::Wrapper(v)) => v,
                    _ => unreachable!("wrapper payload invariant"),
                };
                let proto = self.intrinsics.object_prototype;
                let obj = Object::new(kind, Some(proto), Payload::Wrapper(primitive));
                let target = self.alloc(obj)?;
                memo.insert(source, target);
                target
            }
            ObjectKind::Function
            | ObjectKind::Promise
            | ObjectKind::WeakRef
            | ObjectKind::FinalizationRegistry
            | ObjectKind::WeakMap
            | ObjectKind::WeakSet
            | ObjectKind::Proxy
            | ObjectKind::ModuleNamespace
            | ObjectKind::WasmModule
            | ObjectKind::WasmInstance
            | ObjectKind::WasmMemory
            | ObjectKind::WasmTable
            | ObjectKind::WasmGlobal => {
                return Err(self.type_error("value kind cannot be cloned"));
            }
        };
        Ok(target)
    }

    /// Copy own enumerable string-keyed data, reading through getters the
    /// way a serializer would.
    fn clone_plain_properties(
        &mut self,
        source: ObjRef,
        target: ObjRef,
        memo: &mut HashMap<ObjRef, ObjRef>,
    ) -> Result<()> {
        let keys = self.own_enumerable_keys(source)?;
        for key in keys {
            if let super::ops::Key::Index(_) = key {
                continue; // array elements are cloned through the payload
            }
            let value = self.get(source, key)?;
            let cloned = self.clone_value(value, memo)?;
            self.set(target, key, cloned)?;
        }
        Ok(())
    }
}
