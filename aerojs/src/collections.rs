// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Map, Set, and their weak counterparts. Keyed collections match with
//! SameValueZero; insertion order is preserved by storing entries in a
//! vector. Weak keys ride on weak handles and are purged by the post-GC
//! provider.

use crate::context::Context;
use crate::error::Result;
use crate::object::{Object, ObjectKind, Payload};
use crate::value::{ObjRef, Value};

impl Context {
    /// SameValueZero: SameValue, except that +0 and -0 agree.
    pub fn same_value_zero(&self, a: Value, b: Value) -> bool {
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            return x == y || (x.is_nan() && y.is_nan());
        }
        self.same_value(a, b)
    }

    // ---- Map -----------------------------------------------------------

    pub fn new_map(&mut self) -> Result<ObjRef> {
        let proto = self.intrinsics.object_prototype;
        let mut obj = Object::new(ObjectKind::Map, Some(proto), Payload::Map(Vec::new()));
        obj.class_name = Some("Map");
        self.alloc(obj)
    }

    pub fn map_set(&mut self, map: ObjRef, key: Value, value: Value) -> Result<()> {
        let position = self.map_position(map, key)?;
        let Some(Payload::Map(entries)) = self.heap.get_mut(map).map(|o| &mut o.payload) else {
            return Err(self.type_error("receiver is not a Map"));
        };
        match position {
            Some(i) => entries[i].1 = value,
            None => entries.push((key, value)),
        }
        Ok(())
    }

    pub fn map_get(&mut self, map: ObjRef, key: Value) -> Result<Value> {
        let position = self.map_position(map, key)?;
        let Some(Payload::Map(entries)) = self.heap.get(map).map(|o| &o.payload) else {
            return Err(self.type_error("receiver is not a Map"));
        };
        Ok(position.map(|i| entries[i].1).unwrap_or(Value::Undefined))
    }

    pub fn map_has(&mut self, map: ObjRef, key: Value) -> Result<bool> {
        Ok(self.map_position(map, key)?.is_some())
    }

    pub fn map_delete(&mut self, map: ObjRef, key: Value) -> Result<bool> {
        let position = self.map_position(map, key)?;
        let Some(Payload::Map(entries)) = self.heap.get_mut(map).map(|o| &mut o.payload) else {
            return Err(self.type_error("receiver is not a Map"));
        };
        match position {
            Some(i) => {
                entries.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn map_len(&mut self, map: ObjRef) -> Result<usize> {
        match self.heap.get(map).map(|o| &o.payload) {
            Some(Payload::Map(entries)) => Ok(entries.len()),
            _ => Err(self.type_error("receiver is not a Map")),
        }
    }

    pub fn map_entries(&mut self, map: ObjRef) -> Result<Vec<(Value, Value)>> {
        match self.heap.get(map).map(|o| &o.payload) {
            Some(Payload::Map(entries)) => Ok(entries.clone()),
            _ => Err(self.type_error("receiver is not a Map")),
        }
    }

    fn map_position(&mut self, map: ObjRef, key: Value) -> Result<Option<usize>> {
        let Some(Payload::Map(entries)) = self.heap.get(map).map(|o| &o.payload) else {
            return Err(self.type_error("receiver is not a Map"));
        };
        Ok(entries
            .iter()
            .position(|(k, _)| self.same_value_zero(*k, key)))
    }

    // ---- Set -----------------------------------------------------------

    pub fn new_set(&mut self) -> Result<ObjRef> {
        let proto = self.intrinsics.object_prototype;
        let mut obj = Object::new(ObjectKind::Set, Some(proto), Payload::Set(Vec::new()));
        obj.class_name = Some("Set");
        self.alloc(obj)
    }

    pub fn set_add(&mut self, set: ObjRef, value: Value) -> Result<()> {
        let present = self.set_has(set, value)?;
        let Some(Payload::Set(members)) = self.heap.get_mut(set).map(|o| &mut o.payload) else {
            return Err(self.type_error("receiver is not a Set"));
        };
        if !present {
            members.push(value);
        }
        Ok(())
    }

    pub fn set_has(&mut self, set: ObjRef, value: Value) -> Result<bool> {
        let Some(Payload::Set(members)) = self.heap.get(set).map(|o| &o.payload) else {
            return Err(self.type_error("receiver is not a Set"));
        };
        Ok(members.iter().any(|m| self.same_value_zero(*m, value)))
    }

    pub fn set_delete(&mut self, set: ObjRef, value: Value) -> Result<bool> {
        let Some(Payload::Set(members)) = self.heap.get(set).map(|o| &o.payload) else {
            return Err(self.type_error("receiver is not a Set"));
        };
        let position = members.iter().position(|m| self.same_value_zero(*m, value));
        let Some(Payload::Set(members)) = self.heap.get_mut(set).map(|o| &mut o.payload) else {
            unreachable!("kind tags are immutable");
        };
        match position {
            Some(i) => {
                members.remove(i);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_members(&mut self, set: ObjRef) -> Result<Vec<Value>> {
        match self.heap.get(set).map(|o| &o.payload) {
            Some(Payload::Set(members)) => Ok(members.clone()),
            _ => Err(self.type_error("receiver is not a Set")),
        }
    }

    // ---- WeakMap / WeakSet ---------------------------------------------

    pub fn new_weakmap(&mut self) -> Result<ObjRef> {
        let proto = self.intrinsics.object_prototype;
        let mut obj = Object::new(ObjectKind::WeakMap, Some(proto), Payload::WeakMap(Vec::new()));
        obj.class_name = Some("WeakMap");
        self.alloc(obj)
    }

    pub fn weakmap_set(&mut self, map: ObjRef, key: Value, value: Value) -> Result<()> {
        let Some(key_ref) = key.as_object() else {
            return Err(self.type_error("WeakMap keys must be objects"));
        };
        let handle = self.handles.create_weak_handle(Some(key_ref));
        let Some(Payload::WeakMap(entries)) = self.heap.get_mut(map).map(|o| &mut o.payload)
        else {
            return Err(self.type_error("receiver is not a WeakMap"));
        };
        match entries
            .iter_mut()
            .find(|(h, _)| h.target() == Some(key_ref))
        {
            Some((_, slot)) => *slot = value,
            None => entries.push((handle, value)),
        }
        Ok(())
    }

    pub fn weakmap_get(&mut self, map: ObjRef, key: Value) -> Result<Value> {
        let Some(key_ref) = key.as_object() else {
            return Ok(Value::Undefined);
        };
        match self.heap.get(map).map(|o| &o.payload) {
            Some(Payload::WeakMap(entries)) => Ok(entries
                .iter()
                .find(|(h, _)| h.target() == Some(key_ref))
                .map(|(_, v)| *v)
                .unwrap_or(Value::Undefined)),
            _ => Err(self.type_error("receiver is not a WeakMap")),
        }
    }

    pub fn new_weakset(&mut self) -> Result<ObjRef> {
        let proto = self.intrinsics.object_prototype;
        let mut obj = Object::new(ObjectKind::WeakSet, Some(proto), Payload::WeakSet(Vec::new()));
        obj.class_name = Some("WeakSet");
        self.alloc(obj)
    }

    pub fn weakset_add(&mut self, set: ObjRef, value: Value) -> Result<()> {
        let Some(member) = value.as_object() else {
            return Err(self.type_error("WeakSet members must be objects"));
        };
        let handle = self.handles.create_weak_handle(Some(member));
        let Some(Payload::WeakSet(members)) = self.heap.get_mut(set).map(|o| &mut o.payload)
        else {
            return Err(self.type_error("receiver is not a WeakSet"));
        };
        if !members.iter().any(|h| h.target() == Some(member)) {
            members.push(handle);
        }
        Ok(())
    }

    pub fn weakset_has(&mut self, set: ObjRef, value: Value) -> Result<bool> {
        let Some(member) = value.as_object() else {
            return Ok(false);
        };
        match self.heap.get(set).map(|o| &o.payload) {
            Some(Payload::WeakSet(members)) => {
                Ok(members.iter().any(|h| h.target() == Some(member)))
            }
            _ => Err(self.type_error("receiver is not a WeakSet")),
        }
    }
}

/// Post-GC provider: drop WeakMap entries whose keys died.
pub(crate) fn weakmap_provider(ctx: &mut Context, map: ObjRef) {
    if let Some(Payload::WeakMap(entries)) = ctx.heap.get_mut(map).map(|o| &mut o.payload) {
        entries.retain(|(handle, _)| handle.is_valid());
    }
}

/// Post-GC provider: drop WeakSet members that died.
pub(crate) fn weakset_provider(ctx: &mut Context, set: ObjRef) {
    if let Some(Payload::WeakSet(members)) = ctx.heap.get_mut(set).map(|o| &mut o.payload) {
        members.retain(|handle| handle.is_valid());
    }
}
