// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
use aerojs::context::MemoryDescriptor;
use aerojs::{ErrorKind, ExecutionError, ObjectKind, PromiseState, Value};
use pretty_assertions::assert_eq;

mod common;
use common::*;

const MINIMAL: [u8; 8] = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

/// (module (memory (export "mem") 1)
///         (func (export "add") (param i32 i32) (result i32)
///           local.get 0 local.get 1 i32.add))
fn add_module_bytes() -> Vec<u8> {
    hex::decode(concat!(
        "0061736d0100000001070160027f7f017f030201000503010001070d020361",
        "64640000036d656d02000a09010700200020016a0b",
    ))
    .unwrap()
}

#[test]
fn validate_decides_over_buffer_sources() {
    let mut ctx = new_ctx();
    let ok = ctx.new_array_buffer(MINIMAL.to_vec()).unwrap();
    ctx.add_root(ok);
    assert!(ctx.wasm_validate(Value::Object(ok)).unwrap());

    let truncated = ctx.new_array_buffer(MINIMAL[..7].to_vec()).unwrap();
    ctx.add_root(truncated);
    assert!(!ctx.wasm_validate(Value::Object(truncated)).unwrap());

    // Not a buffer source at all.
    assert!(ctx.wasm_validate(Value::Int32(1)).is_err());
}

#[test]
fn compile_fulfills_with_a_module() {
    let mut ctx = new_ctx();
    let buffer = ctx.new_array_buffer(MINIMAL.to_vec()).unwrap();
    ctx.add_root(buffer);
    let p = ctx.wasm_compile(Value::Object(buffer)).unwrap();
    ctx.add_root(p);
    ctx.drain_microtasks().unwrap();

    let (state, module) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Fulfilled);
    let module = module.as_object().unwrap();
    assert_eq!(ctx.object_kind(module), Some(ObjectKind::WasmModule));
    assert!(ctx.wasm_module_exports(module).unwrap().is_empty());
}

#[test]
fn compile_rejects_invalid_bytes() {
    let mut ctx = new_ctx();
    let buffer = ctx.new_array_buffer(vec![0x00, 0x61, 0x73]).unwrap();
    ctx.add_root(buffer);
    let p = ctx.wasm_compile(Value::Object(buffer)).unwrap();
    ctx.add_root(p);
    let swallow = ctx.new_function("", 1, identity, Vec::new()).unwrap();
    ctx.promise_catch(p, Some(Value::Object(swallow))).unwrap();
    ctx.drain_microtasks().unwrap();

    let (state, reason) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Rejected);
    let err = reason.as_object().unwrap();
    assert_eq!(ctx.error_kind_of(err), Some(ErrorKind::Type));
}

#[test]
fn validate_accepts_iff_compile_succeeds() {
    let mut ctx = new_ctx();
    for bytes in [
        MINIMAL.to_vec(),
        MINIMAL[..7].to_vec(),
        add_module_bytes(),
        vec![],
        vec![0xFF; 16],
    ] {
        let buffer = ctx.new_array_buffer(bytes).unwrap();
        ctx.add_root(buffer);
        let valid = ctx.wasm_validate(Value::Object(buffer)).unwrap();
        let p = ctx.wasm_compile(Value::Object(buffer)).unwrap();
        ctx.add_root(p);
        let swallow = ctx.new_function("", 1, identity, Vec::new()).unwrap();
        ctx.promise_catch(p, Some(Value::Object(swallow))).unwrap();
        ctx.drain_microtasks().unwrap();
        let (state, _) = ctx.promise_state(p).unwrap();
        assert_eq!(valid, state == PromiseState::Fulfilled);
    }
}

#[test]
fn instantiate_materializes_exports() {
    let mut ctx = new_ctx();
    let buffer = ctx.new_array_buffer(add_module_bytes()).unwrap();
    ctx.add_root(buffer);
    let imports = ctx.new_object().unwrap();
    ctx.add_root(imports);
    let p = ctx
        .wasm_instantiate(Value::Object(buffer), Value::Object(imports))
        .unwrap();
    ctx.add_root(p);
    ctx.drain_microtasks().unwrap();

    let (state, pair) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Fulfilled);
    let pair = pair.as_object().unwrap();
    let module = ctx.get_str(pair, "module").unwrap().as_object().unwrap();
    assert_eq!(ctx.object_kind(module), Some(ObjectKind::WasmModule));
    let instance = ctx.get_str(pair, "instance").unwrap().as_object().unwrap();
    assert_eq!(ctx.object_kind(instance), Some(ObjectKind::WasmInstance));

    let exports = ctx.get_str(instance, "exports").unwrap().as_object().unwrap();
    let mem = ctx.get_str(exports, "mem").unwrap().as_object().unwrap();
    assert_eq!(ctx.object_kind(mem), Some(ObjectKind::WasmMemory));
    let add = ctx.get_str(exports, "add").unwrap();
    assert!(ctx.is_callable(add));

    // Function exports exist but the execution tier does not.
    assert!(matches!(
        ctx.call(add, Value::Undefined, &[Value::Int32(1), Value::Int32(2)]),
        Err(ExecutionError::Fatal(_))
    ));
}

#[test]
fn instantiate_requires_declared_imports() {
    // (module (import "env" "mem" (memory 1)))
    let mut bytes = MINIMAL.to_vec();
    // import section: 1 entry, "env" "mem", kind memory, limits {min: 1}
    bytes.extend_from_slice(&[
        0x02, 0x0C, 0x01, 0x03, b'e', b'n', b'v', 0x03, b'm', b'e', b'm', 0x02, 0x00, 0x01,
    ]);

    let mut ctx = new_ctx();
    let buffer = ctx.new_array_buffer(bytes).unwrap();
    ctx.add_root(buffer);
    assert!(ctx.wasm_validate(Value::Object(buffer)).unwrap());

    // Empty imports: rejection.
    let empty = ctx.new_object().unwrap();
    ctx.add_root(empty);
    let p = ctx
        .wasm_instantiate(Value::Object(buffer), Value::Object(empty))
        .unwrap();
    ctx.add_root(p);
    let swallow = ctx.new_function("", 1, identity, Vec::new()).unwrap();
    ctx.promise_catch(p, Some(Value::Object(swallow))).unwrap();
    ctx.drain_microtasks().unwrap();
    assert_eq!(ctx.promise_state(p).unwrap().0, PromiseState::Rejected);

    // Supplying the memory makes it instantiate.
    let memory = ctx
        .new_wasm_memory(MemoryDescriptor {
            initial: 1,
            maximum: None,
        })
        .unwrap();
    ctx.add_root(memory);
    let env = ctx.new_object().unwrap();
    ctx.add_root(env);
    ctx.set_str(env, "mem", Value::Object(memory)).unwrap();
    let imports = ctx.new_object().unwrap();
    ctx.add_root(imports);
    ctx.set_str(imports, "env", Value::Object(env)).unwrap();
    let p = ctx
        .wasm_instantiate(Value::Object(buffer), Value::Object(imports))
        .unwrap();
    ctx.add_root(p);
    ctx.drain_microtasks().unwrap();
    assert_eq!(ctx.promise_state(p).unwrap().0, PromiseState::Fulfilled);
}

#[test]
fn memory_descriptor_limits_are_checked() {
    let mut ctx = new_ctx();
    // max below initial
    let err = ctx
        .new_wasm_memory(MemoryDescriptor {
            initial: 2,
            maximum: Some(1),
        })
        .expect_err("max < initial");
    let thrown = err.thrown_value().unwrap().as_object().unwrap();
    assert_eq!(ctx.error_kind_of(thrown), Some(ErrorKind::Range));

    // beyond the page ceiling
    assert!(ctx
        .new_wasm_memory(MemoryDescriptor {
            initial: 65537,
            maximum: None,
        })
        .is_err());

    // a valid one carries zeroed pages
    let memory = ctx
        .new_wasm_memory(MemoryDescriptor {
            initial: 1,
            maximum: Some(2),
        })
        .unwrap();
    assert_eq!(ctx.object_kind(memory), Some(ObjectKind::WasmMemory));
}

#[test]
fn namespace_surface_works_through_properties() {
    let mut ctx = new_ctx();
    let global = ctx.global_object();
    let ns = ctx.get_str(global, "WebAssembly").unwrap();
    let ns_obj = ns.as_object().unwrap();
    let validate = ctx.get_str(ns_obj, "validate").unwrap();
    assert!(ctx.is_callable(validate));

    let buffer = ctx.new_array_buffer(MINIMAL.to_vec()).unwrap();
    ctx.add_root(buffer);
    let verdict = ctx.invoke(ns, "validate", &[Value::Object(buffer)]).unwrap();
    assert_eq!(verdict, Value::Bool(true));

    // validate() on a non-buffer answers false rather than throwing.
    let verdict = ctx.invoke(ns, "validate", &[Value::Int32(3)]).unwrap();
    assert_eq!(verdict, Value::Bool(false));

    // The Memory constructor runs off a descriptor object.
    let desc = ctx.new_object().unwrap();
    ctx.add_root(desc);
    ctx.set_str(desc, "initial", Value::Int32(1)).unwrap();
    let memory_ctor = ctx.get_str(ns_obj, "Memory").unwrap();
    let memory = ctx
        .call(memory_ctor, Value::Undefined, &[Value::Object(desc)])
        .unwrap();
    let memory = memory.as_object().unwrap();
    assert_eq!(ctx.object_kind(memory), Some(ObjectKind::WasmMemory));
}

#[test]
fn active_data_segments_initialize_memory() {
    // (module (memory (export "m") 1) (data (i32.const 3) "\xAB\xCD"))
    let mut bytes = MINIMAL.to_vec();
    bytes.extend_from_slice(&[0x05, 0x03, 0x01, 0x00, 0x01]); // memory
    bytes.extend_from_slice(&[0x07, 0x05, 0x01, 0x01, b'm', 0x02, 0x00]); // export
    bytes.extend_from_slice(&[0x0B, 0x08, 0x01, 0x00, 0x41, 0x03, 0x0B, 0x02, 0xAB, 0xCD]); // data

    let mut ctx = new_ctx();
    let buffer = ctx.new_array_buffer(bytes).unwrap();
    ctx.add_root(buffer);
    assert!(ctx.wasm_validate(Value::Object(buffer)).unwrap());
    let imports = ctx.new_object().unwrap();
    ctx.add_root(imports);
    let p = ctx
        .wasm_instantiate(Value::Object(buffer), Value::Object(imports))
        .unwrap();
    ctx.add_root(p);
    ctx.drain_microtasks().unwrap();
    let (state, pair) = ctx.promise_state(p).unwrap();
    assert_eq!(state, PromiseState::Fulfilled);

    let pair = pair.as_object().unwrap();
    let instance = ctx.get_str(pair, "instance").unwrap().as_object().unwrap();
    let exports = ctx.get_str(instance, "exports").unwrap().as_object().unwrap();
    let memory = ctx.get_str(exports, "m").unwrap().as_object().unwrap();
    let bytes = ctx.wasm_memory_bytes(memory).unwrap();
    assert_eq!(&bytes[3..5], &[0xAB, 0xCD]);
    assert_eq!(bytes.len(), 65536);
}
