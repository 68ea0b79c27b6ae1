// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! The `WebAssembly` namespace: validate/compile/instantiate plus the
//! Memory/Table/Global constructors. Compilation runs the `aerojs_wasm`
//! verifier; instantiation materializes memories, tables and globals and
//! applies active segments. Calling an exported wasm function is the
//! interpreter tier's job, which this core ships without.

use std::sync::Arc;

use aerojs_shared::sys::{WASM_MAX_PAGES, WASM_PAGE_SIZE};
use aerojs_wasm::{ConstExpr, ExternKind, ImportDesc, Module, ValType};

use crate::context::Context;
use crate::error::{ExecutionError, Result};
use crate::object::{
    Object, ObjectKind, Payload, PropertyDescriptor, WasmGlobalPayload, WasmMemoryPayload,
    WasmTablePayload,
};
use crate::value::{ObjRef, Value};

/// Parsed `WebAssembly.Memory` descriptor.
#[derive(Debug, Clone, Copy)]
pub struct MemoryDescriptor {
    pub initial: u32,
    pub maximum: Option<u32>,
}

/// Parsed `WebAssembly.Table` descriptor.
#[derive(Debug, Clone, Copy)]
pub struct TableDescriptor {
    pub element: ValType,
    pub initial: u32,
    pub maximum: Option<u32>,
}

/// Parsed `WebAssembly.Global` descriptor.
#[derive(Debug, Clone, Copy)]
pub struct GlobalDescriptor {
    pub value_type: ValType,
    pub mutable: bool,
}

impl Context {
    // ---- byte-source plumbing -----------------------------------------

    /// The bytes behind an ArrayBuffer or typed-array value.
    pub fn buffer_source_bytes(&mut self, source: Value) -> Result<Vec<u8>> {
        let Some(obj) = source.as_object() else {
            return Err(self.type_error("expected an ArrayBuffer or typed array"));
        };
        match self.heap.get(obj).map(|o| &o.payload) {
            Some(Payload::ArrayBuffer(bytes)) => Ok(bytes.clone()),
            Some(Payload::TypedArray(ta)) => {
                let ta = *ta;
                let width = ta.element.byte_size();
                match self.heap.get(ta.buffer).map(|o| &o.payload) {
                    Some(Payload::ArrayBuffer(bytes)) => Ok(bytes
                        [ta.byte_offset..ta.byte_offset + ta.length * width]
                        .to_vec()),
                    _ => Err(self.type_error("typed array buffer is detached")),
                }
            }
            _ => Err(self.type_error("expected an ArrayBuffer or typed array")),
        }
    }

    pub fn new_array_buffer(&mut self, bytes: Vec<u8>) -> Result<ObjRef> {
        let proto = self.intrinsics.object_prototype;
        let mut obj = Object::new(ObjectKind::ArrayBuffer, Some(proto), Payload::ArrayBuffer(bytes));
        obj.class_name = Some("ArrayBuffer");
        self.alloc(obj)
    }

    /// A view over an existing buffer.
    pub fn new_data_view(
        &mut self,
        buffer: ObjRef,
        byte_offset: usize,
        byte_length: usize,
    ) -> Result<ObjRef> {
        let valid = match self.heap.get(buffer).map(|o| &o.payload) {
            Some(Payload::ArrayBuffer(bytes)) => byte_offset + byte_length <= bytes.len(),
            _ => return Err(self.type_error("DataView requires an ArrayBuffer")),
        };
        if !valid {
            return Err(self.range_error("DataView bounds exceed the buffer"));
        }
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
        self.alloc(obj)
    }

    /// A zero-filled typed array over a fresh buffer.
    pub fn new_typed_array(
        &mut self,
        element: crate::object::ElementType,
        length: usize,
    ) -> Result<ObjRef> {
        let buffer = self.new_array_buffer(vec![0u8; length * element.byte_size()])?;
        let proto = self.intrinsics.object_prototype;
        let mut obj = Object::new(
            ObjectKind::TypedArray,
            Some(proto),
            Payload::TypedArray(crate::object::TypedArrayPayload {
                buffer,
                element,
                byte_offset: 0,
                length,
            }),
        );
        obj.class_name = Some("TypedArray");
        self.alloc(obj)
    }

    // ---- validate / compile / instantiate -----------------------------

    /// `WebAssembly.validate(bytes)`.
    pub fn wasm_validate(&mut self, source: Value) -> Result<bool> {
        let bytes = self.buffer_source_bytes(source)?;
        Ok(aerojs_wasm::validate(&bytes))
    }

    /// `WebAssembly.compile(bytes)`: a promise of a WasmModule object. The
    /// decode error stays internal; script sees a generic rejection.
    pub fn wasm_compile(&mut self, source: Value) -> Result<ObjRef> {
        let bytes = self.buffer_source_bytes(source)?;
        match Module::parse(&bytes) {
            Ok(module) => {
                let module = self.new_wasm_module(module)?;
                self.promise_resolve_value(Value::Object(module))
            }
            Err(err) => {
                log::debug!("wasm compile rejected: {err}");
                let reason = self.raise(
                    aerojs_shared::ErrorKind::Type,
                    "WebAssembly module validation failed",
                );
                match reason {
                    ExecutionError::Thrown(reason) => {
                        let promise = self.promise_rejected_value(reason)?;
                        Ok(promise)
                    }
                    other => Err(other),
                }
            }
        }
    }

    /// `WebAssembly.instantiate(bytes | module, imports)`: a promise of an
    /// instance (module argument) or of a `{module, instance}` pair (byte
    /// argument).
    pub fn wasm_instantiate(&mut self, source: Value, imports: Value) -> Result<ObjRef> {
        if let Some(obj) = source.as_object() {
            if self.heap.get(obj).map(|o| o.kind) == Some(ObjectKind::WasmModule) {
                return match self.instantiate_module(obj, imports) {
                    Ok(instance) => self.promise_resolve_value(Value::Object(instance)),
                    Err(ExecutionError::Thrown(reason)) => self.promise_rejected_value(reason),
                    Err(other) => Err(other),
                };
            }
        }

        let compiled = self.wasm_compile(source)?;
        let Some((state, module_value)) = self.promise_state(compiled) else {
            return Err(ExecutionError::Fatal(anyhow::anyhow!(
                "compile result is not a promise"
            )));
        };
        if state == aerojs_shared::PromiseState::Rejected {
            return Ok(compiled);
        }
        let module = module_value.as_object().expect("fulfilled with a module");
        match self.instantiate_module(module, imports) {
            Ok(instance) => {
                let pair = self.new_object()?;
                self.set_str(pair, "module", module_value)?;
                self.set_str(pair, "instance", Value::Object(instance))?;
                self.promise_resolve_value(Value::Object(pair))
            }
            Err(ExecutionError::Thrown(reason)) => self.promise_rejected_value(reason),
            Err(other) => Err(other),
        }
    }

    pub fn new_wasm_module(&mut self, module: Module) -> Result<ObjRef> {
        let proto = self.intrinsics.object_prototype;
        let mut obj = Object::new(
            ObjectKind::WasmModule,
            Some(proto),
            Payload::WasmModule(Arc::new(module)),
        );
        obj.class_name = Some("Module");
        self.alloc(obj)
    }

    /// A copy of a memory's current contents.
    pub fn wasm_memory_bytes(&mut self, memory: ObjRef) -> Result<Vec<u8>> {
        match self.heap.get(memory).map(|o| &o.payload) {
            Some(Payload::WasmMemory(m)) => Ok(m.bytes.clone()),
            _ => Err(self.type_error("receiver is not a WebAssembly.Memory")),
        }
    }

    /// Export names of a compiled module, in declaration order.
    pub fn wasm_module_exports(&mut self, module: ObjRef) -> Result<Vec<String>> {
        match self.heap.get(module).map(|o| &o.payload) {
            Some(Payload::WasmModule(m)) => {
                Ok(m.exports.iter().map(|e| e.name.clone()).collect())
            }
            _ => Err(self.type_error("receiver is not a WebAssembly.Module")),
        }
    }

    // ---- instantiation -------------------------------------------------

    fn instantiate_module(&mut self, module_ref: ObjRef, imports: Value) -> Result<ObjRef> {
        let module = match self.heap.get(module_ref).map(|o| &o.payload) {
            Some(Payload::WasmModule(m)) => Arc::clone(m),
            _ => return Err(self.type_error("value is not a WebAssembly.Module")),
        };

        // Resolve imports first: every declared import must be supplied.
        let mut imported_memories = Vec::new();
        let mut imported_tables = Vec::new();
        let mut imported_globals = Vec::new();
        for import in &module.imports {
            let supplied = self.lookup_import(imports, &import.module, &import.field)?;
            match &import.desc {
                ImportDesc::Func(_) => {
                    if !self.is_callable(supplied) {
                        return Err(self.type_error("imported function is not callable"));
                    }
                }
                ImportDesc::Memory(_) => {
                    let Some(r) = supplied.as_object() else {
                        return Err(self.type_error("imported memory is not a WebAssembly.Memory"));
                    };
                    if self.heap.get(r).map(|o| o.kind) != Some(ObjectKind::WasmMemory) {
                        return Err(self.type_error("imported memory is not a WebAssembly.Memory"));
                    }
                    imported_memories.push(r);
                }
                ImportDesc::Table(_) => {
                    let Some(r) = supplied.as_object() else {
                        return Err(self.type_error("imported table is not a WebAssembly.Table"));
                    };
                    if self.heap.get(r).map(|o| o.kind) != Some(ObjectKind::WasmTable) {
                        return Err(self.type_error("imported table is not a WebAssembly.Table"));
                    }
                    imported_tables.push(r);
                }
                ImportDesc::Global(_) => {
                    let Some(r) = supplied.as_object() else {
                        return Err(self.type_error("imported global is not a WebAssembly.Global"));
                    };
                    if self.heap.get(r).map(|o| o.kind) != Some(ObjectKind::WasmGlobal) {
                        return Err(self.type_error("imported global is not a WebAssembly.Global"));
                    }
                    imported_globals.push(r);
                }
            }
        }

        // Defined memories.
        let mut memories = imported_memories;
        for memory in &module.memories {
            let r = self.new_wasm_memory(MemoryDescriptor {
                initial: memory.limits.min,
                maximum: memory.limits.max,
            })?;
            memories.push(r);
        }

        // Defined tables.
        let mut tables = imported_tables;
        for table in &module.tables {
            let r = self.new_wasm_table(TableDescriptor {
                element: table.element,
                initial: table.limits.min,
                maximum: table.limits.max,
            })?;
            tables.push(r);
        }

        // Defined globals, initializers evaluated against the imports.
        let mut globals = imported_globals;
        for global in &module.globals {
            let initial = self.eval_const_expr(&global.init, &globals)?;
            let r = self.new_wasm_global(
                GlobalDescriptor {
                    value_type: global.ty.value,
                    mutable: global.ty.mutable,
                },
                initial,
            )?;
            globals.push(r);
        }

        // Active data segments.
        for segment in &module.data {
            let aerojs_wasm::DataMode::Active { memory, offset } = &segment.mode else {
                continue;
            };
            let offset = match self.eval_const_expr(offset, &globals)? {
                Value::Int32(n) if n >= 0 => n as usize,
                _ => return Err(self.range_error("data segment offset out of range")),
            };
            let target = memories
                .get(*memory as usize)
                .copied()
                .ok_or_else(|| self.range_error("data segment memory out of range"))?;
            let Some(Payload::WasmMemory(mem)) =
                self.heap.get_mut(target).map(|o| &mut o.payload)
            else {
                return Err(self.type_error("memory object invariant violated"));
            };
            let end = offset + segment.data.len();
            if end > mem.bytes.len() {
                return Err(self.range_error("data segment does not fit in memory"));
            }
            mem.bytes[offset..end].copy_from_slice(&segment.data);
        }

        // Element segments fill table zero with function stubs.
        for segment in &module.elements {
            let offset = match self.eval_const_expr(&segment.offset, &globals)? {
                Value::Int32(n) if n >= 0 => n as usize,
                _ => return Err(self.range_error("element segment offset out of range")),
            };
            let funcs: Vec<Value> = segment
                .funcs
                .iter()
                .map(|&index| self.new_wasm_function_stub(module_ref, index).map(Value::Object))
                .collect::<Result<_>>()?;
            let target = tables
                .get(segment.table as usize)
                .copied()
                .ok_or_else(|| self.range_error("element segment table out of range"))?;
            let Some(Payload::WasmTable(table)) =
                self.heap.get_mut(target).map(|o| &mut o.payload)
            else {
                return Err(self.type_error("table object invariant violated"));
            };
            let end = offset + funcs.len();
            if end > table.elements.len() {
                return Err(self.range_error("element segment does not fit in table"));
            }
            table.elements[offset..end].copy_from_slice(&funcs);
        }

        // Exports.
        let exports = self.new_object()?;
        for export in &module.exports {
            let value = match export.kind {
                ExternKind::Func => {
                    Value::Object(self.new_wasm_function_stub(module_ref, export.index)?)
                }
                ExternKind::Memory => Value::Object(memories[export.index as usize]),
                ExternKind::Table => Value::Object(tables[export.index as usize]),
                ExternKind::Global => Value::Object(globals[export.index as usize]),
            };
            let name = export.name.clone();
            let key = self.intern(&name);
            self.heap
                .get_mut(exports)
                .expect("freshly allocated")
                .properties
                .insert(key, PropertyDescriptor::data(value, false, true, false));
        }

        let proto = self.intrinsics.object_prototype;
        let mut instance = Object::new(
            ObjectKind::WasmInstance,
            Some(proto),
            Payload::WasmInstance {
                module: module_ref,
                exports,
            },
        );
        instance.class_name = Some("Instance");
        let instance = self.alloc(instance)?;
        self.define_str(
            instance,
            "exports",
            PropertyDescriptor::data(Value::Object(exports), false, true, false),
        )?;
        Ok(instance)
    }

    fn lookup_import(&mut self, imports: Value, module: &str, field: &str) -> Result<Value> {
        let Some(root) = imports.as_object() else {
            return Err(self.type_error("imports argument must be an object"));
        };
        let namespace = self.get_str(root, module)?;
        let Some(namespace) = namespace.as_object() else {
            return Err(self.type_error("import module namespace is missing"));
        };
        let supplied = self.get_str(namespace, field)?;
        if supplied.is_undefined() {
            return Err(self.type_error("declared import is not supplied"));
        }
        Ok(supplied)
    }

    fn eval_const_expr(&mut self, expr: &ConstExpr, globals: &[ObjRef]) -> Result<Value> {
        Ok(match *expr {
            ConstExpr::I32(v) => Value::Int32(v),
            ConstExpr::I64(v) => self.new_bigint(v.into()),
            ConstExpr::F32(v) => Value::Double(f64::from(v)),
            ConstExpr::F64(v) => Value::Double(v),
            ConstExpr::RefNull(_) => Value::Null,
            ConstExpr::RefFunc(_) => Value::Null,
            ConstExpr::GlobalGet(index) => {
                let global = globals
                    .get(index as usize)
                    .copied()
                    .ok_or_else(|| self.range_error("global initializer index out of range"))?;
                match self.heap.get(global).map(|o| &o.payload) {
                    Some(Payload::WasmGlobal(g)) => g.value,
                    _ => return Err(self.type_error("global object invariant violated")),
                }
            }
        })
    }

    fn new_wasm_function_stub(&mut self, module: ObjRef, index: u32) -> Result<ObjRef> {
        let stub = self.new_function(
            &format!("wasm-function[{index}]"),
            0,
            wasm_function_stub,
            vec![Value::Object(module), Value::Int32(index as i32)],
        )?;
        Ok(stub)
    }

    // ---- Memory / Table / Global --------------------------------------

    pub fn new_wasm_memory(&mut self, desc: MemoryDescriptor) -> Result<ObjRef> {
        if u64::from(desc.initial) > WASM_MAX_PAGES
            || desc.maximum.is_some_and(|max| {
                u64::from(max) > WASM_MAX_PAGES || max < desc.initial
            })
        {
            return Err(self.range_error("invalid memory limits"));
        }
        let bytes = vec![0u8; desc.initial as usize * WASM_PAGE_SIZE];
        let proto = self.intrinsics.object_prototype;
        let mut obj = Object::new(
            ObjectKind::WasmMemory,
            Some(proto),
            Payload::WasmMemory(WasmMemoryPayload {
                bytes,
                maximum: desc.maximum,
            }),
        );
        obj.class_name = Some("Memory");
        self.alloc(obj)
    }

    pub fn new_wasm_table(&mut self, desc: TableDescriptor) -> Result<ObjRef> {
        if !desc.element.is_ref() {
            return Err(self.type_error("table element type must be funcref or externref"));
        }
        if desc.maximum.is_some_and(|max| max < desc.initial) {
            return Err(self.range_error("table maximum must not be below initial"));
        }
        let proto = self.intrinsics.object_prototype;
        let mut obj = Object::new(
            ObjectKind::WasmTable,
            Some(proto),
            Payload::WasmTable(WasmTablePayload {
                element: desc.element,
                elements: vec![Value::Null; desc.initial as usize],
                maximum: desc.maximum,
            }),
        );
        obj.class_name = Some("Table");
        self.alloc(obj)
    }

    pub fn new_wasm_global(&mut self, desc: GlobalDescriptor, initial: Value) -> Result<ObjRef> {
        let proto = self.intrinsics.object_prototype;
        let mut obj = Object::new(
            ObjectKind::WasmGlobal,
            Some(proto),
            Payload::WasmGlobal(WasmGlobalPayload {
                value_type: desc.value_type,
                mutable: desc.mutable,
                value: initial,
            }),
        );
        obj.class_name = Some("Global");
        self.alloc(obj)
    }
}

/// Exported wasm functions are materialized but not executable: running
/// wasm code is the interpreter tier's concern.
fn wasm_function_stub(
    _ctx: &mut Context,
    _this: Value,
    _args: &[Value],
    _captures: &[Value],
) -> Result<Value> {
    Err(ExecutionError::Fatal(anyhow::anyhow!(
        "wasm execution tier is not linked into this build"
    )))
}
