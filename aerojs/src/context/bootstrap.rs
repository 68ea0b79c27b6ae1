// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Context bootstrap: builds the prototype objects, the global object and
//! the native builtin surface (Promise, WeakRef, FinalizationRegistry,
//! WebAssembly), and registers the weak-kind GC providers. Intrinsics live
//! in the permanent generation.

use aerojs_shared::{ErrorKind, Generation};
use aerojs_wasm::ValType;

use crate::collections::{weakmap_provider, weakset_provider};
use crate::context::wasm_api::{GlobalDescriptor, MemoryDescriptor, TableDescriptor};
use crate::context::Context;
use crate::error::Result;
use crate::finalization::registry_provider;
use crate::funcs::NativeFn;
use crate::object::{Object, ObjectKind, PropertyDescriptor};
use crate::value::{ObjRef, Value};
use crate::weakref::weakref_provider;

pub(crate) fn init(ctx: &mut Context) -> Result<()> {
    // Prototype chain scaffolding first; everything else hangs off it.
    let object_prototype = ctx.alloc(Object::ordinary(None))?;
    ctx.intrinsics.object_prototype = object_prototype;
    let function_prototype = ctx.alloc(Object::ordinary(Some(object_prototype)))?;
    ctx.intrinsics.function_prototype = function_prototype;
    let array_prototype = ctx.alloc(Object::ordinary(Some(object_prototype)))?;
    ctx.intrinsics.array_prototype = array_prototype;

    let error_prototype = ctx.alloc(Object::ordinary(Some(object_prototype)))?;
    ctx.intrinsics.error_prototype = error_prototype;
    let name_value = ctx.str_value("Error");
    ctx.define_str(error_prototype, "name", PropertyDescriptor::method(name_value))?;
    let empty = ctx.str_value("");
    ctx.define_str(error_prototype, "message", PropertyDescriptor::method(empty))?;
    for i in 0..ctx.intrinsics.error_prototypes.len() {
        let kind = ctx.intrinsics.error_prototypes[i].0;
        let proto = ctx.alloc(Object::ordinary(Some(error_prototype)))?;
        let name_value = ctx.str_value(kind.name());
        ctx.define_str(proto, "name", PropertyDescriptor::method(name_value))?;
        ctx.intrinsics.error_prototypes[i].1 = proto;
    }

    let promise_prototype = ctx.alloc(Object::ordinary(Some(object_prototype)))?;
    ctx.intrinsics.promise_prototype = promise_prototype;
    let weakref_prototype = ctx.alloc(Object::ordinary(Some(object_prototype)))?;
    ctx.intrinsics.weakref_prototype = weakref_prototype;
    let registry_prototype = ctx.alloc(Object::ordinary(Some(object_prototype)))?;
    ctx.intrinsics.finalization_registry_prototype = registry_prototype;

    let global = ctx.alloc(Object::ordinary(Some(object_prototype)))?;
    ctx.intrinsics.global = global;
    ctx.define_str(
        global,
        "globalThis",
        PropertyDescriptor::data(Value::Object(global), true, false, true),
    )?;

    // Promise.
    define_method(ctx, promise_prototype, "then", 2, promise_proto_then)?;
    define_method(ctx, promise_prototype, "catch", 1, promise_proto_catch)?;
    define_method(ctx, promise_prototype, "finally", 1, promise_proto_finally)?;
    let promise_ctor_obj = ctx.new_function("Promise", 1, promise_ctor, Vec::new())?;
    define_method(ctx, promise_ctor_obj, "resolve", 1, promise_static_resolve)?;
    define_method(ctx, promise_ctor_obj, "reject", 1, promise_static_reject)?;
    define_method(ctx, promise_ctor_obj, "all", 1, promise_static_all)?;
    define_method(ctx, promise_ctor_obj, "allSettled", 1, promise_static_all_settled)?;
    define_method(ctx, promise_ctor_obj, "race", 1, promise_static_race)?;
    define_method(ctx, promise_ctor_obj, "any", 1, promise_static_any)?;
    link_constructor(ctx, promise_ctor_obj, promise_prototype)?;
    install_global(ctx, "Promise", promise_ctor_obj)?;

    // WeakRef.
    define_method(ctx, weakref_prototype, "deref", 0, weakref_proto_deref)?;
    let weakref_ctor_obj = ctx.new_function("WeakRef", 1, weakref_ctor, Vec::new())?;
    link_constructor(ctx, weakref_ctor_obj, weakref_prototype)?;
    install_global(ctx, "WeakRef", weakref_ctor_obj)?;

    // FinalizationRegistry.
    define_method(ctx, registry_prototype, "register", 2, registry_proto_register)?;
    define_method(ctx, registry_prototype, "unregister", 1, registry_proto_unregister)?;
    define_method(ctx, registry_prototype, "cleanupSome", 0, registry_proto_cleanup_some)?;
    let registry_ctor_obj =
        ctx.new_function("FinalizationRegistry", 1, registry_ctor, Vec::new())?;
    link_constructor(ctx, registry_ctor_obj, registry_prototype)?;
    install_global(ctx, "FinalizationRegistry", registry_ctor_obj)?;

    // WebAssembly namespace.
    let wasm_ns = ctx.new_object()?;
    define_method(ctx, wasm_ns, "validate", 1, wasm_validate_native)?;
    define_method(ctx, wasm_ns, "compile", 1, wasm_compile_native)?;
    define_method(ctx, wasm_ns, "instantiate", 2, wasm_instantiate_native)?;
    let memory_ctor_obj = ctx.new_function("Memory", 1, wasm_memory_ctor, Vec::new())?;
    let table_ctor_obj = ctx.new_function("Table", 1, wasm_table_ctor, Vec::new())?;
    let global_ctor_obj = ctx.new_function("Global", 2, wasm_global_ctor, Vec::new())?;
    ctx.define_str(wasm_ns, "Memory", PropertyDescriptor::method(Value::Object(memory_ctor_obj)))?;
    ctx.define_str(wasm_ns, "Table", PropertyDescriptor::method(Value::Object(table_ctor_obj)))?;
    ctx.define_str(wasm_ns, "Global", PropertyDescriptor::method(Value::Object(global_ctor_obj)))?;
    install_global(ctx, "WebAssembly", wasm_ns)?;

    // Intrinsics are never collected.
    let pinned: Vec<ObjRef> = ctx.intrinsics.iter().collect();
    for r in pinned {
        if let Some(meta) = ctx.heap.meta_mut(r) {
            meta.generation = Generation::Permanent;
        }
    }

    // Weak-kind providers, invoked by the collector after validity flips.
    ctx.handles.register_provider(ObjectKind::WeakRef, weakref_provider);
    ctx.handles
        .register_provider(ObjectKind::FinalizationRegistry, registry_provider);
    ctx.handles.register_provider(ObjectKind::WeakMap, weakmap_provider);
    ctx.handles.register_provider(ObjectKind::WeakSet, weakset_provider);

    log::trace!("context bootstrap complete, {} objects", ctx.heap.live_objects());
    Ok(())
}

fn define_method(
    ctx: &mut Context,
    target: ObjRef,
    name: &str,
    arity: u32,
    native: NativeFn,
) -> Result<ObjRef> {
    let func = ctx.new_function(name, arity, native, Vec::new())?;
    ctx.define_str(target, name, PropertyDescriptor::method(Value::Object(func)))?;
    Ok(func)
}

fn link_constructor(ctx: &mut Context, ctor: ObjRef, prototype: ObjRef) -> Result<()> {
    ctx.define_str(
        ctor,
        "prototype",
        PropertyDescriptor::data(Value::Object(prototype), false, false, false),
    )?;
    ctx.define_str(
        prototype,
        "constructor",
        PropertyDescriptor::method(Value::Object(ctor)),
    )?;
    Ok(())
}

fn install_global(ctx: &mut Context, name: &str, value: ObjRef) -> Result<()> {
    let global = ctx.intrinsics.global;
    ctx.define_str(
        global,
        name,
        PropertyDescriptor::data(Value::Object(value), true, false, true),
    )?;
    Ok(())
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).copied().unwrap_or(Value::Undefined)
}

fn callable_or_none(ctx: &Context, value: Value) -> Option<Value> {
    if ctx.is_callable(value) {
        Some(value)
    } else {
        None
    }
}

fn this_of_kind(ctx: &mut Context, this: Value, kind: ObjectKind, what: &str) -> Result<ObjRef> {
    match this.as_object() {
        Some(r) if ctx.heap.get(r).map(|o| o.kind) == Some(kind) => Ok(r),
        _ => Err(ctx.raise(
            ErrorKind::Type,
            &format!("receiver is not a {what}"),
        )),
    }
}

// ---- Promise natives ---------------------------------------------------

fn promise_ctor(ctx: &mut Context, _this: Value, args: &[Value], _caps: &[Value]) -> Result<Value> {
    let promise = ctx.promise_with_executor(arg(args, 0))?;
    Ok(Value::Object(promise))
}

fn promise_proto_then(
    ctx: &mut Context,
    this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let promise = this_of_kind(ctx, this, ObjectKind::Promise, "Promise")?;
    let on_fulfilled = callable_or_none(ctx, arg(args, 0));
    let on_rejected = callable_or_none(ctx, arg(args, 1));
    let derived = ctx.promise_then(promise, on_fulfilled, on_rejected)?;
    Ok(Value::Object(derived))
}

fn promise_proto_catch(
    ctx: &mut Context,
    this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let promise = this_of_kind(ctx, this, ObjectKind::Promise, "Promise")?;
    let on_rejected = callable_or_none(ctx, arg(args, 0));
    let derived = ctx.promise_catch(promise, on_rejected)?;
    Ok(Value::Object(derived))
}

fn promise_proto_finally(
    ctx: &mut Context,
    this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let promise = this_of_kind(ctx, this, ObjectKind::Promise, "Promise")?;
    let derived = ctx.promise_finally(promise, arg(args, 0))?;
    Ok(Value::Object(derived))
}

fn promise_static_resolve(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let promise = ctx.promise_resolve_value(arg(args, 0))?;
    Ok(Value::Object(promise))
}

fn promise_static_reject(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let promise = ctx.promise_rejected_value(arg(args, 0))?;
    Ok(Value::Object(promise))
}

fn promise_static_all(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let promise = ctx.promise_all(arg(args, 0))?;
    Ok(Value::Object(promise))
}

fn promise_static_all_settled(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let promise = ctx.promise_all_settled(arg(args, 0))?;
    Ok(Value::Object(promise))
}

fn promise_static_race(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let promise = ctx.promise_race(arg(args, 0))?;
    Ok(Value::Object(promise))
}

fn promise_static_any(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let promise = ctx.promise_any(arg(args, 0))?;
    Ok(Value::Object(promise))
}

// ---- WeakRef / FinalizationRegistry natives ----------------------------

fn weakref_ctor(ctx: &mut Context, _this: Value, args: &[Value], _caps: &[Value]) -> Result<Value> {
    let weakref = ctx.new_weakref(arg(args, 0))?;
    Ok(Value::Object(weakref))
}

fn weakref_proto_deref(
    ctx: &mut Context,
    this: Value,
    _args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let weakref = this_of_kind(ctx, this, ObjectKind::WeakRef, "WeakRef")?;
    ctx.weakref_deref(weakref)
}

fn registry_ctor(ctx: &mut Context, _this: Value, args: &[Value], _caps: &[Value]) -> Result<Value> {
    let registry = ctx.new_finalization_registry(arg(args, 0))?;
    Ok(Value::Object(registry))
}

fn registry_proto_register(
    ctx: &mut Context,
    this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let registry = this_of_kind(ctx, this, ObjectKind::FinalizationRegistry, "FinalizationRegistry")?;
    ctx.registry_register(registry, arg(args, 0), arg(args, 1), arg(args, 2))?;
    Ok(Value::Undefined)
}

fn registry_proto_unregister(
    ctx: &mut Context,
    this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let registry = this_of_kind(ctx, this, ObjectKind::FinalizationRegistry, "FinalizationRegistry")?;
    let removed = ctx.registry_unregister(registry, arg(args, 0))?;
    Ok(Value::Bool(removed))
}

fn registry_proto_cleanup_some(
    ctx: &mut Context,
    this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let registry = this_of_kind(ctx, this, ObjectKind::FinalizationRegistry, "FinalizationRegistry")?;
    let callback = args.first().copied();
    ctx.registry_cleanup_some(registry, callback)?;
    Ok(Value::Undefined)
}

// ---- WebAssembly natives -----------------------------------------------

fn wasm_validate_native(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    // A non-buffer argument is a TypeError for compile but plain false for
    // validate.
    match ctx.wasm_validate(arg(args, 0)) {
        Ok(valid) => Ok(Value::Bool(valid)),
        Err(crate::error::ExecutionError::Thrown(_)) => Ok(Value::Bool(false)),
        Err(other) => Err(other),
    }
}

fn wasm_compile_native(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let promise = ctx.wasm_compile(arg(args, 0))?;
    Ok(Value::Object(promise))
}

fn wasm_instantiate_native(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let imports = match arg(args, 1) {
        Value::Undefined => {
            let empty = ctx.new_object()?;
            Value::Object(empty)
        }
        other => other,
    };
    let promise = ctx.wasm_instantiate(arg(args, 0), imports)?;
    Ok(Value::Object(promise))
}

fn descriptor_u32(ctx: &mut Context, desc: ObjRef, name: &str) -> Result<Option<u32>> {
    let value = ctx.get_str(desc, name)?;
    if value.is_undefined() {
        return Ok(None);
    }
    match value.as_number() {
        Some(n) if n.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&n) => Ok(Some(n as u32)),
        _ => Err(ctx.raise(
            ErrorKind::Type,
            &format!("descriptor property {name:?} must be a non-negative integer"),
        )),
    }
}

fn wasm_memory_ctor(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let Some(desc) = arg(args, 0).as_object() else {
        return Err(ctx.type_error("memory descriptor must be an object"));
    };
    let Some(initial) = descriptor_u32(ctx, desc, "initial")? else {
        return Err(ctx.type_error("memory descriptor requires 'initial'"));
    };
    let maximum = descriptor_u32(ctx, desc, "maximum")?;
    let memory = ctx.new_wasm_memory(MemoryDescriptor { initial, maximum })?;
    Ok(Value::Object(memory))
}

fn wasm_table_ctor(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let Some(desc) = arg(args, 0).as_object() else {
        return Err(ctx.type_error("table descriptor must be an object"));
    };
    let element = ctx.get_str(desc, "element")?;
    let element = match element {
        Value::Undefined => ValType::FuncRef,
        Value::String(id) => match ctx.string(id) {
            "funcref" => ValType::FuncRef,
            "externref" => ValType::ExternRef,
            _ => return Err(ctx.type_error("table element must be 'funcref' or 'externref'")),
        },
        _ => return Err(ctx.type_error("table element must be 'funcref' or 'externref'")),
    };
    let Some(initial) = descriptor_u32(ctx, desc, "initial")? else {
        return Err(ctx.type_error("table descriptor requires 'initial'"));
    };
    let maximum = descriptor_u32(ctx, desc, "maximum")?;
    let table = ctx.new_wasm_table(TableDescriptor {
        element,
        initial,
        maximum,
    })?;
    Ok(Value::Object(table))
}

fn wasm_global_ctor(
    ctx: &mut Context,
    _this: Value,
    args: &[Value],
    _caps: &[Value],
) -> Result<Value> {
    let Some(desc) = arg(args, 0).as_object() else {
        return Err(ctx.type_error("global descriptor must be an object"));
    };
    let value_type = ctx.get_str(desc, "value")?;
    let value_type = match value_type {
        Value::String(id) => match ctx.string(id) {
            "i32" => ValType::I32,
            "i64" => ValType::I64,
            "f32" => ValType::F32,
            "f64" => ValType::F64,
            _ => {
                return Err(
                    ctx.type_error("global value type must be one of i32, i64, f32, f64")
                )
            }
        },
        _ => return Err(ctx.type_error("global descriptor requires a 'value' type string")),
    };
    let mutable_value = ctx.get_str(desc, "mutable")?;
    let mutable = ctx.to_boolean(mutable_value);
    let initial = match arg(args, 1) {
        Value::Undefined => Value::Int32(0),
        other => other,
    };
    let global = ctx.new_wasm_global(
        GlobalDescriptor {
            value_type,
            mutable,
        },
        initial,
    )?;
    Ok(Value::Object(global))
}
