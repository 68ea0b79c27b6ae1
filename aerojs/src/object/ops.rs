// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Property meta-operations: get/set/define/delete/has and the prototype
//! pair. All dispatch is on the kind tag; arrays maintain their length
//! here, typed arrays convert at the boundary, proxies reroute through
//! their handler traps.

use crate::context::Context;
use crate::error::Result;
use crate::object::{ObjectKind, Payload, PropertyDescriptor};
use crate::value::{ObjRef, StringId, SymbolId, Value};

/// A property key: canonical array index, interned string, or symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Index(u32),
    Str(StringId),
    Sym(SymbolId),
}

impl Context {
    /// Parse a textual key, canonicalizing array indices.
    pub fn key(&mut self, name: &str) -> Key {
        if let Ok(index) = name.parse::<u32>() {
            if index != u32::MAX && index.to_string() == name {
                return Key::Index(index);
            }
        }
        Key::Str(self.intern(name))
    }

    fn key_string_id(&mut self, key: Key) -> Option<StringId> {
        match key {
            Key::Str(id) => Some(id),
            Key::Index(i) => Some(self.intern(&i.to_string())),
            Key::Sym(_) => None,
        }
    }

    fn key_value(&mut self, key: Key) -> Value {
        match key {
            Key::Index(i) => Value::Int32(i as i32),
            Key::Str(id) => Value::String(id),
            Key::Sym(id) => Value::Symbol(id),
        }
    }

    // ---- own-property access ------------------------------------------

    /// Own property of `obj` under `key`, without walking the prototype
    /// chain or invoking accessors. Kind-specific storage (array elements,
    /// array length, typed-array elements) is surfaced as synthesized data
    /// descriptors.
    pub fn get_own_property(&mut self, obj: ObjRef, key: Key) -> Result<Option<PropertyDescriptor>> {
        let Some(object) = self.heap.get(obj) else {
            return Err(self.type_error("object reference is no longer live"));
        };
        match (key, object.kind) {
            (Key::Index(i), ObjectKind::Array) => {
                let Payload::Array(elements) = &object.payload else {
                    unreachable!("array payload invariant");
                };
                return Ok(elements
                    .get(i as usize)
                    .map(|&v| PropertyDescriptor::plain(v)));
            }
            (Key::Index(i), ObjectKind::TypedArray) => {
                return Ok(self
                    .typed_array_get(obj, i)
                    .map(|v| PropertyDescriptor::data(v, true, true, false)));
            }
            (Key::Sym(id), _) => return Ok(object.sym_get(id).copied()),
            _ => {}
        }

        if let (ObjectKind::Array, Key::Str(id)) = (object.kind, key) {
            if self.string(id) == "length" {
                let Some(Payload::Array(elements)) = self.heap.get(obj).map(|o| &o.payload) else {
                    unreachable!("array payload invariant");
                };
                let len = elements.len();
                return Ok(Some(PropertyDescriptor::data(
                    self.number(len as f64),
                    true,
                    false,
                    false,
                )));
            }
        }

        let Some(id) = self.key_string_id(key) else {
            return Ok(None);
        };
        Ok(self
            .heap
            .get(obj)
            .expect("checked above")
            .properties
            .get(id)
            .copied())
    }

    // ---- get -----------------------------------------------------------

    /// `obj[key]`, walking the prototype chain; accessor descriptors invoke
    /// their getter with the original receiver. Absence yields undefined.
    pub fn get(&mut self, obj: ObjRef, key: Key) -> Result<Value> {
        self.get_with_receiver(obj, key, Value::Object(obj))
    }

    pub fn get_str(&mut self, obj: ObjRef, name: &str) -> Result<Value> {
        let key = self.key(name);
        self.get(obj, key)
    }

    fn get_with_receiver(&mut self, obj: ObjRef, key: Key, receiver: Value) -> Result<Value> {
        if self.heap.get(obj).map(|o| o.kind) == Some(ObjectKind::Proxy) {
            return self.proxy_get(obj, key, receiver);
        }
        match self.get_own_property(obj, key)? {
            Some(desc) if desc.is_data() => Ok(desc.value.unwrap_or(Value::Undefined)),
            Some(desc) => match desc.get {
                Some(getter) => self.call(Value::Object(getter), receiver, &[]),
                None => Ok(Value::Undefined),
            },
            None => match self.heap.get(obj).and_then(|o| o.prototype) {
                Some(proto) => self.get_with_receiver(proto, key, receiver),
                None => Ok(Value::Undefined),
            },
        }
    }

    // ---- set -----------------------------------------------------------

    /// `obj[key] = value`. Returns false on a rejected write (read-only
    /// ancestor data property, missing setter, frozen receiver); strict
    /// callers surface that as a TypeError.
    pub fn set(&mut self, obj: ObjRef, key: Key, value: Value) -> Result<bool> {
        self.set_with_receiver(obj, key, value, obj)
    }

    pub fn set_str(&mut self, obj: ObjRef, name: &str, value: Value) -> Result<bool> {
        let key = self.key(name);
        self.set(obj, key, value)
    }

    fn set_with_receiver(
        &mut self,
        obj: ObjRef,
        key: Key,
        value: Value,
        receiver: ObjRef,
    ) -> Result<bool> {
        let kind = match self.heap.get(obj) {
            Some(o) => o.kind,
            None => return Err(self.type_error("object reference is no longer live")),
        };

        match (kind, key) {
            (ObjectKind::Proxy, _) => return self.proxy_set(obj, key, value, receiver),
            (ObjectKind::Array, Key::Index(i)) if obj == receiver => {
                return self.array_set_element(obj, i, value);
            }
            (ObjectKind::TypedArray, Key::Index(i)) if obj == receiver => {
                self.typed_array_set(obj, i, value)?;
                return Ok(true);
            }
            (ObjectKind::Array, Key::Str(id)) if obj == receiver && self.string(id) == "length" => {
                return self.array_set_length(obj, value);
            }
            _ => {}
        }

        match self.get_own_property(obj, key)? {
            Some(desc) if desc.is_accessor() => match desc.set {
                Some(setter) => {
                    self.call(Value::Object(setter), Value::Object(receiver), &[value])?;
                    Ok(true)
                }
                None => Ok(false),
            },
            Some(desc) => {
                if !desc.is_writable() {
                    return Ok(false);
                }
                if obj == receiver {
                    self.store_own_value(receiver, key, value, desc)
                } else {
                    self.create_own_plain(receiver, key, value)
                }
            }
            None => match self.heap.get(obj).and_then(|o| o.prototype) {
                Some(proto) => self.set_with_receiver(proto, key, value, receiver),
                None => self.create_own_plain(receiver, key, value),
            },
        }
    }

    fn store_own_value(
        &mut self,
        obj: ObjRef,
        key: Key,
        value: Value,
        mut desc: PropertyDescriptor,
    ) -> Result<bool> {
        match key {
            Key::Sym(id) => {
                desc.value = Some(value);
                self.heap
                    .get_mut(obj)
                    .expect("live receiver")
                    .sym_insert(id, desc);
                Ok(true)
            }
            _ => {
                let id = self.key_string_id(key).expect("string-like key");
                desc.value = Some(value);
                self.heap
                    .get_mut(obj)
                    .expect("live receiver")
                    .properties
                    .insert(id, desc);
                Ok(true)
            }
        }
    }

    fn create_own_plain(&mut self, receiver: ObjRef, key: Key, value: Value) -> Result<bool> {
        let Some(object) = self.heap.get(receiver) else {
            return Err(self.type_error("object reference is no longer live"));
        };
        if !object.extensible {
            return Ok(false);
        }
        match (object.kind, key) {
            (ObjectKind::Array, Key::Index(i)) => self.array_set_element(receiver, i, value),
            (ObjectKind::TypedArray, Key::Index(_)) => Ok(true), // out-of-bounds writes vanish
            _ => self.store_own_value(receiver, key, value, PropertyDescriptor::plain(value)),
        }
    }

    // ---- define --------------------------------------------------------

    /// `Object.defineProperty` semantics: validates the transition against
    /// the existing descriptor.
    pub fn define_own(&mut self, obj: ObjRef, key: Key, desc: PropertyDescriptor) -> Result<bool> {
        let current = self.get_own_property(obj, key)?;
        let merged = match current {
            None => {
                let Some(object) = self.heap.get(obj) else {
                    return Err(self.type_error("object reference is no longer live"));
                };
                if !object.extensible {
                    return Ok(false);
                }
                desc
            }
            Some(current) => {
                if !current.configurable {
                    if desc.configurable {
                        return Ok(false);
                    }
                    if desc.enumerable != current.enumerable {
                        return Ok(false);
                    }
                    if desc.is_accessor() != current.is_accessor() {
                        return Ok(false);
                    }
                    if current.is_data() {
                        if !current.is_writable() {
                            if desc.writable == Some(true) {
                                return Ok(false);
                            }
                            if let (Some(new), Some(old)) = (desc.value, current.value) {
                                if !self.same_value(new, old) {
                                    return Ok(false);
                                }
                            }
                        }
                    } else if desc.get != current.get || desc.set != current.set {
                        return Ok(false);
                    }
                }
                merge_descriptors(current, desc)
            }
        };

        match key {
            Key::Sym(id) => {
                self.heap
                    .get_mut(obj)
                    .expect("live receiver")
                    .sym_insert(id, merged);
            }
            _ => {
                let id = self.key_string_id(key).expect("string-like key");
                self.heap
                    .get_mut(obj)
                    .expect("live receiver")
                    .properties
                    .insert(id, merged);
            }
        }
        Ok(true)
    }

    pub fn define_str(&mut self, obj: ObjRef, name: &str, desc: PropertyDescriptor) -> Result<bool> {
        let key = self.key(name);
        self.define_own(obj, key, desc)
    }

    // ---- delete / has --------------------------------------------------

    /// `delete obj[key]`. Fails only on a non-configurable own property.
    pub fn delete(&mut self, obj: ObjRef, key: Key) -> Result<bool> {
        if self.heap.get(obj).map(|o| o.kind) == Some(ObjectKind::Proxy) {
            return self.proxy_delete(obj, key);
        }
        match key {
            Key::Index(i) => {
                if let Some(object) = self.heap.get_mut(obj) {
                    if let Payload::Array(elements) = &mut object.payload {
                        if let Some(slot) = elements.get_mut(i as usize) {
                            *slot = Value::Undefined;
                        }
                        return Ok(true);
                    }
                }
                let Some(id) = self.key_string_id(key) else {
                    return Ok(true);
                };
                self.delete_string_keyed(obj, id)
            }
            Key::Str(id) => self.delete_string_keyed(obj, id),
            Key::Sym(id) => {
                let Some(object) = self.heap.get_mut(obj) else {
                    return Err(self.type_error("object reference is no longer live"));
                };
                match object.sym_properties.iter().position(|(k, _)| *k == id) {
                    Some(i) if object.sym_properties[i].1.configurable => {
                        object.sym_properties.remove(i);
                        Ok(true)
                    }
                    Some(_) => Ok(false),
                    None => Ok(true),
                }
            }
        }
    }

    fn delete_string_keyed(&mut self, obj: ObjRef, id: StringId) -> Result<bool> {
        let Some(object) = self.heap.get_mut(obj) else {
            return Err(self.type_error("object reference is no longer live"));
        };
        match object.properties.get(id) {
            Some(desc) if !desc.configurable => Ok(false),
            Some(_) => {
                object.properties.remove(id);
                Ok(true)
            }
            None => Ok(true),
        }
    }

    /// `key in obj`: own or inherited.
    pub fn has(&mut self, obj: ObjRef, key: Key) -> Result<bool> {
        if self.heap.get(obj).map(|o| o.kind) == Some(ObjectKind::Proxy) {
            let (target, handler) = self.proxy_parts(obj)?;
            return match self.proxy_trap(handler, "has")? {
                Some(trap) => {
                    let key_value = self.key_value(key);
                    let result = self.call(
                        trap,
                        Value::Object(handler),
                        &[Value::Object(target), key_value],
                    )?;
                    Ok(self.to_boolean(result))
                }
                None => self.has(target, key),
            };
        }
        if self.get_own_property(obj, key)?.is_some() {
            return Ok(true);
        }
        match self.heap.get(obj).and_then(|o| o.prototype) {
            Some(proto) => self.has(proto, key),
            None => Ok(false),
        }
    }

    pub fn has_str(&mut self, obj: ObjRef, name: &str) -> Result<bool> {
        let key = self.key(name);
        self.has(obj, key)
    }

    // ---- prototype -----------------------------------------------------

    pub fn get_prototype(&self, obj: ObjRef) -> Option<ObjRef> {
        self.heap.get(obj).and_then(|o| o.prototype)
    }

    /// Set the prototype link. Fails on a non-extensible receiver and on
    /// any assignment that would create a prototype cycle.
    pub fn set_prototype(&mut self, obj: ObjRef, proto: Option<ObjRef>) -> Result<bool> {
        let Some(object) = self.heap.get(obj) else {
            return Err(self.type_error("object reference is no longer live"));
        };
        if !object.extensible {
            return Ok(false);
        }
        let mut walk = proto;
        while let Some(ancestor) = walk {
            if ancestor == obj {
                return Ok(false);
            }
            walk = self.heap.get(ancestor).and_then(|o| o.prototype);
        }
        self.heap.get_mut(obj).expect("checked above").prototype = proto;
        Ok(true)
    }

    // ---- enumeration ---------------------------------------------------

    /// Own enumerable string-keyed properties in order: array indices
    /// first, then insertion order.
    pub fn own_enumerable_keys(&mut self, obj: ObjRef) -> Result<Vec<Key>> {
        let Some(object) = self.heap.get(obj) else {
            return Err(self.type_error("object reference is no longer live"));
        };
        let mut keys = Vec::new();
        if let Payload::Array(elements) = &object.payload {
            keys.extend((0..elements.len() as u32).map(Key::Index));
        }
        keys.extend(
            object
                .properties
                .iter()
                .filter(|(_, d)| d.enumerable)
                .map(|(id, _)| Key::Str(*id)),
        );
        Ok(keys)
    }

    // ---- arrays --------------------------------------------------------

    pub fn array_length(&mut self, obj: ObjRef) -> Result<usize> {
        match self.heap.get(obj).map(|o| &o.payload) {
            Some(Payload::Array(elements)) => Ok(elements.len()),
            _ => Err(self.type_error("value is not an array")),
        }
    }

    pub fn array_push(&mut self, obj: ObjRef, value: Value) -> Result<usize> {
        match self.heap.get_mut(obj).map(|o| &mut o.payload) {
            Some(Payload::Array(elements)) => {
                elements.push(value);
                Ok(elements.len())
            }
            _ => Err(self.type_error("value is not an array")),
        }
    }

    pub fn array_get(&mut self, obj: ObjRef, index: usize) -> Result<Value> {
        match self.heap.get(obj).map(|o| &o.payload) {
            Some(Payload::Array(elements)) => {
                Ok(elements.get(index).copied().unwrap_or(Value::Undefined))
            }
            _ => Err(self.type_error("value is not an array")),
        }
    }

    fn array_set_element(&mut self, obj: ObjRef, index: u32, value: Value) -> Result<bool> {
        let Some(Payload::Array(elements)) = self.heap.get_mut(obj).map(|o| &mut o.payload) else {
            return Err(self.type_error("value is not an array"));
        };
        let index = index as usize;
        if index >= elements.len() {
            elements.resize(index + 1, Value::Undefined);
        }
        elements[index] = value;
        Ok(true)
    }

    fn array_set_length(&mut self, obj: ObjRef, value: Value) -> Result<bool> {
        let requested = match value.as_number() {
            Some(n) if n.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&n) => n as usize,
            _ => return Err(self.range_error("invalid array length")),
        };
        let Some(Payload::Array(elements)) = self.heap.get_mut(obj).map(|o| &mut o.payload) else {
            return Err(self.type_error("value is not an array"));
        };
        elements.resize(requested, Value::Undefined);
        Ok(true)
    }

    // ---- typed arrays --------------------------------------------------

    fn typed_array_get(&self, obj: ObjRef, index: u32) -> Option<Value> {
        let Some(Payload::TypedArray(ta)) = self.heap.get(obj).map(|o| &o.payload) else {
            return None;
        };
        let ta = *ta;
        if index as usize >= ta.length {
            return None;
        }
        let Some(Payload::ArrayBuffer(bytes)) = self.heap.get(ta.buffer).map(|o| &o.payload)
        else {
            return None;
        };
        let width = ta.element.byte_size();
        let at = ta.byte_offset + index as usize * width;
        let raw = bytes.get(at..at + width)?;
        use crate::object::ElementType::*;
        let value = match ta.element {
            Int8 => Value::Int32(raw[0] as i8 as i32),
            Uint8 | Uint8Clamped => Value::Int32(raw[0] as i32),
            Int16 => Value::Int32(i16::from_le_bytes([raw[0], raw[1]]) as i32),
            Uint16 => Value::Int32(u16::from_le_bytes([raw[0], raw[1]]) as i32),
            Int32 => Value::Int32(i32::from_le_bytes(raw.try_into().ok()?)),
            Uint32 => {
                let v = u32::from_le_bytes(raw.try_into().ok()?);
                if v <= i32::MAX as u32 {
                    Value::Int32(v as i32)
                } else {
                    Value::Double(f64::from(v))
                }
            }
            Float32 => Value::Double(f64::from(f32::from_le_bytes(raw.try_into().ok()?))),
            Float64 => Value::Double(f64::from_le_bytes(raw.try_into().ok()?)),
        };
        Some(value)
    }

    fn typed_array_set(&mut self, obj: ObjRef, index: u32, value: Value) -> Result<()> {
        let Some(Payload::TypedArray(ta)) = self.heap.get(obj).map(|o| &o.payload) else {
            return Err(self.type_error("value is not a typed array"));
        };
        let ta = *ta;
        if index as usize >= ta.length {
            // Out-of-bounds writes are dropped, as on integer-indexed
            // exotic objects.
            return Ok(());
        }
        let n = value.as_number().unwrap_or(f64::NAN);
        use crate::object::ElementType::*;
        let width = ta.element.byte_size();
        let mut raw = [0u8; 8];
        match ta.element {
            Int8 => raw[0] = to_int32(n) as i8 as u8,
            Uint8 => raw[0] = to_int32(n) as u8,
            Uint8Clamped => raw[0] = n.clamp(0.0, 255.0).round_ties_even() as u8,
            Int16 => raw[..2].copy_from_slice(&(to_int32(n) as i16).to_le_bytes()),
            Uint16 => raw[..2].copy_from_slice(&(to_int32(n) as u16).to_le_bytes()),
            Int32 => raw[..4].copy_from_slice(&to_int32(n).to_le_bytes()),
            Uint32 => raw[..4].copy_from_slice(&(to_int32(n) as u32).to_le_bytes()),
            Float32 => raw[..4].copy_from_slice(&(n as f32).to_le_bytes()),
            Float64 => raw[..8].copy_from_slice(&n.to_le_bytes()),
        }
        let Some(Payload::ArrayBuffer(bytes)) = self.heap.get_mut(ta.buffer).map(|o| &mut o.payload)
        else {
            return Err(self.type_error("typed array buffer is detached"));
        };
        let at = ta.byte_offset + index as usize * width;
        if let Some(slice) = bytes.get_mut(at..at + width) {
            slice.copy_from_slice(&raw[..width]);
        }
        Ok(())
    }

    // ---- proxies -------------------------------------------------------

    fn proxy_parts(&mut self, obj: ObjRef) -> Result<(ObjRef, ObjRef)> {
        match self.heap.get(obj).map(|o| &o.payload) {
            Some(&Payload::Proxy { target, handler }) => Ok((target, handler)),
            _ => Err(self.type_error("value is not a proxy")),
        }
    }

    fn proxy_trap(&mut self, handler: ObjRef, name: &str) -> Result<Option<Value>> {
        let trap = self.get_str(handler, name)?;
        if trap.is_undefined() || trap.is_nullish() {
            return Ok(None);
        }
        if !self.is_callable(trap) {
            return Err(self.type_error("proxy trap is not callable"));
        }
        Ok(Some(trap))
    }

    fn proxy_get(&mut self, obj: ObjRef, key: Key, receiver: Value) -> Result<Value> {
        let (target, handler) = self.proxy_parts(obj)?;
        match self.proxy_trap(handler, "get")? {
            Some(trap) => {
                let key_value = self.key_value(key);
                self.call(
                    trap,
                    Value::Object(handler),
                    &[Value::Object(target), key_value, receiver],
                )
            }
            None => self.get_with_receiver(target, key, receiver),
        }
    }

    fn proxy_set(&mut self, obj: ObjRef, key: Key, value: Value, receiver: ObjRef) -> Result<bool> {
        let (target, handler) = self.proxy_parts(obj)?;
        match self.proxy_trap(handler, "set")? {
            Some(trap) => {
                let key_value = self.key_value(key);
                let result = self.call(
                    trap,
                    Value::Object(handler),
                    &[
                        Value::Object(target),
                        key_value,
                        value,
                        Value::Object(receiver),
                    ],
                )?;
                Ok(self.to_boolean(result))
            }
            None => self.set_with_receiver(target, key, value, target),
        }
    }

    fn proxy_delete(&mut self, obj: ObjRef, key: Key) -> Result<bool> {
        let (target, handler) = self.proxy_parts(obj)?;
        match self.proxy_trap(handler, "deleteProperty")? {
            Some(trap) => {
                let key_value = self.key_value(key);
                let result =
                    self.call(trap, Value::Object(handler), &[Value::Object(target), key_value])?;
                Ok(self.to_boolean(result))
            }
            None => self.delete(target, key),
        }
    }
}

fn merge_descriptors(current: PropertyDescriptor, update: PropertyDescriptor) -> PropertyDescriptor {
    if update.is_accessor() {
        PropertyDescriptor {
            value: None,
            writable: None,
            get: update.get.or(current.get),
            set: update.set.or(current.set),
            enumerable: update.enumerable,
            configurable: update.configurable,
        }
    } else {
        PropertyDescriptor {
            value: update.value.or(current.value),
            writable: update.writable.or(current.writable),
            get: None,
            set: None,
            enumerable: update.enumerable,
            configurable: update.configurable,
        }
    }
}

/// ToInt32 modulo semantics.
fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    n as i64 as i32
}
