// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! The heap object representation: one struct for every kind of object,
//! a kind tag for dispatch, and a payload enum for kind-specific state.
//! There is no inheritance anywhere in the object model; every operation
//! matches on [`ObjectKind`].

use std::collections::HashMap;
use std::sync::Arc;

use aerojs_shared::ErrorKind;

use crate::finalization::RegistryPayload;
use crate::funcs::FunctionPayload;
use crate::promise::PromisePayload;
use crate::value::{ObjRef, StringId, SymbolId, Value};
use crate::weakref::WeakRefPayload;

mod ops;

pub(crate) mod clone;

pub use ops::Key;

/// The runtime category of an object, stamped at construction and immutable
/// afterwards.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum ObjectKind {
    Ordinary,
    Array,
    Function,
    StringWrapper,
    NumberWrapper,
    BooleanWrapper,
    Error,
    Date,
    RegExp,
    Map,
    Set,
    WeakMap,
    WeakSet,
    Promise,
    WeakRef,
    FinalizationRegistry,
    ArrayBuffer,
    TypedArray,
    DataView,
    Proxy,
    ModuleNamespace,
    WasmModule,
    WasmInstance,
    WasmMemory,
    WasmTable,
    WasmGlobal,
}

/// Element type of a typed array.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ElementType {
    Int8,
    Uint8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl ElementType {
    pub fn byte_size(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::Uint8 | ElementType::Uint8Clamped => 1,
            ElementType::Int16 | ElementType::Uint16 => 2,
            ElementType::Int32 | ElementType::Uint32 | ElementType::Float32 => 4,
            ElementType::Float64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TypedArrayPayload {
    pub buffer: ObjRef,
    pub element: ElementType,
    pub byte_offset: usize,
    pub length: usize,
}

#[derive(Debug)]
pub struct WasmMemoryPayload {
    pub bytes: Vec<u8>,
    pub maximum: Option<u32>,
}

#[derive(Debug)]
pub struct WasmTablePayload {
    pub element: aerojs_wasm::ValType,
    pub elements: Vec<Value>,
    pub maximum: Option<u32>,
}

#[derive(Debug)]
pub struct WasmGlobalPayload {
    pub value_type: aerojs_wasm::ValType,
    pub mutable: bool,
    pub value: Value,
}

/// Kind-specific state. The variant an object carries is fixed by its kind;
/// constructors in the context enforce the pairing.
#[derive(Debug, Default)]
pub enum Payload {
    #[default]
    None,
    Array(Vec<Value>),
    Function(FunctionPayload),
    /// Boxed primitive of a String/Number/Boolean wrapper.
    Wrapper(Value),
    Error(ErrorKind),
    Date(f64),
    RegExp {
        source: StringId,
        flags: StringId,
    },
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    WeakMap(Vec<(crate::handle::WeakHandle, Value)>),
    WeakSet(Vec<crate::handle::WeakHandle>),
    Promise(PromisePayload),
    WeakRef(WeakRefPayload),
    FinalizationRegistry(RegistryPayload),
    ArrayBuffer(Vec<u8>),
    TypedArray(TypedArrayPayload),
    DataView {
        buffer: ObjRef,
        byte_offset: usize,
        byte_length: usize,
    },
    Proxy {
        target: ObjRef,
        handler: ObjRef,
    },
    WasmModule(Arc<aerojs_wasm::Module>),
    WasmInstance {
        module: ObjRef,
        exports: ObjRef,
    },
    WasmMemory(WasmMemoryPayload),
    WasmTable(WasmTablePayload),
    WasmGlobal(WasmGlobalPayload),
}

/// A property: either a data descriptor (value + writable) or an accessor
/// descriptor (get/set), plus the shared attributes.
#[derive(Debug, Clone, Copy)]
pub struct PropertyDescriptor {
    pub value: Option<Value>,
    pub writable: Option<bool>,
    pub get: Option<ObjRef>,
    pub set: Option<ObjRef>,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    pub fn data(value: Value, writable: bool, enumerable: bool, configurable: bool) -> Self {
        PropertyDescriptor {
            value: Some(value),
            writable: Some(writable),
            get: None,
            set: None,
            enumerable,
            configurable,
        }
    }

    /// The attributes of an ordinary assignment-created property.
    pub fn plain(value: Value) -> Self {
        Self::data(value, true, true, true)
    }

    /// A non-enumerable, non-configurable method slot.
    pub fn method(value: Value) -> Self {
        Self::data(value, true, false, true)
    }

    pub fn accessor(
        get: Option<ObjRef>,
        set: Option<ObjRef>,
        enumerable: bool,
        configurable: bool,
    ) -> Self {
        PropertyDescriptor {
            value: None,
            writable: None,
            get,
            set,
            enumerable,
            configurable,
        }
    }

    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    pub fn is_data(&self) -> bool {
        !self.is_accessor()
    }

    pub fn is_writable(&self) -> bool {
        self.writable.unwrap_or(false)
    }
}

/// Insertion-ordered string-keyed property storage. Lookup goes through a
/// side index; iteration order is the entry vector.
#[derive(Debug, Default)]
pub struct PropertyMap {
    entries: Vec<(StringId, PropertyDescriptor)>,
    index: HashMap<StringId, usize>,
}

impl PropertyMap {
    pub fn get(&self, key: StringId) -> Option<&PropertyDescriptor> {
        self.index.get(&key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: StringId) -> Option<&mut PropertyDescriptor> {
        self.index.get(&key).map(|&i| &mut self.entries[i].1)
    }

    pub fn contains(&self, key: StringId) -> bool {
        self.index.contains_key(&key)
    }

    /// Insert or overwrite, keeping the original insertion position on
    /// overwrite.
    pub fn insert(&mut self, key: StringId, desc: PropertyDescriptor) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = desc,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push((key, desc));
            }
        }
    }

    pub fn remove(&mut self, key: StringId) -> Option<PropertyDescriptor> {
        let i = self.index.remove(&key)?;
        let (_, desc) = self.entries.remove(i);
        for entry in &self.entries[i..] {
            if let Some(slot) = self.index.get_mut(&entry.0) {
                *slot -= 1;
            }
        }
        Some(desc)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(StringId, PropertyDescriptor)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (StringId, PropertyDescriptor)> {
        self.entries.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = StringId> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }
}

/// Every heap entity. Kind and payload variant never change after
/// construction; everything else is ordinary mutable state.
#[derive(Debug)]
pub struct Object {
    pub kind: ObjectKind,
    pub prototype: Option<ObjRef>,
    pub properties: PropertyMap,
    pub sym_properties: Vec<(SymbolId, PropertyDescriptor)>,
    pub extensible: bool,
    pub class_name: Option<&'static str>,
    pub payload: Payload,
}

impl Object {
    pub fn new(kind: ObjectKind, prototype: Option<ObjRef>, payload: Payload) -> Self {
        Object {
            kind,
            prototype,
            properties: PropertyMap::default(),
            sym_properties: Vec::new(),
            extensible: true,
            class_name: None,
            payload,
        }
    }

    pub fn ordinary(prototype: Option<ObjRef>) -> Self {
        Self::new(ObjectKind::Ordinary, prototype, Payload::None)
    }

    pub fn is_callable(&self) -> bool {
        self.kind == ObjectKind::Function
    }

    pub fn sym_get(&self, key: SymbolId) -> Option<&PropertyDescriptor> {
        self.sym_properties
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, d)| d)
    }

    pub fn sym_insert(&mut self, key: SymbolId, desc: PropertyDescriptor) {
        match self.sym_properties.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = desc,
            None => self.sym_properties.push((key, desc)),
        }
    }

    /// Rough byte footprint used for generation accounting and the memory
    /// limiter. Deliberately coarse.
    pub fn size_estimate(&self) -> usize {
        let payload = match &self.payload {
            Payload::Array(v) => v.len() * std::mem::size_of::<Value>(),
            Payload::Map(v) => v.len() * 2 * std::mem::size_of::<Value>(),
            Payload::Set(v) => v.len() * std::mem::size_of::<Value>(),
            Payload::ArrayBuffer(b) => b.len(),
            Payload::WasmMemory(m) => m.bytes.len(),
            Payload::WasmTable(t) => t.elements.len() * std::mem::size_of::<Value>(),
            _ => 0,
        };
        std::mem::size_of::<Object>()
            + self.properties.len() * (std::mem::size_of::<PropertyDescriptor>() + 16)
            + payload
    }
}
