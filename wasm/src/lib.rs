// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! WebAssembly binary decoding and validation for the AeroJS engine.
//!
//! The crate exposes exactly one decision surface: a byte vector either
//! decodes into a [`Module`] or it is rejected with a [`DecodeError`]
//! naming the offending section and byte offset. `WebAssembly.validate`
//! collapses that to a boolean; `WebAssembly.compile` keeps the error for
//! the embedder. There is no partial acceptance and no state left behind
//! by a failed parse.
//!
//! Supported: the MVP feature set plus reference types (funcref/externref),
//! sign-extension and saturating-truncation operators, and a v128
//! load/store/const subset behind the SIMD prefix.
//!
//! ## Logging
//!
//! This package emits logs using the log façade. Configure the logging
//! backend of your choice during the initialization of the consuming
//! application.

mod constexpr;
mod error;
mod func_validator;
mod leb128;
mod module;
mod reader;
mod types;

pub use error::{DecodeError, Result};
pub use types::{
    ConstExpr, DataMode, DataSegment, ElementSegment, Export, ExternKind, FuncType, Global,
    GlobalType, Import, ImportDesc, Limits, MemoryType, Module, TableType, ValType,
};

/// Decide whether `bytes` is a valid module.
///
/// Total over arbitrary input: no panic, no unbounded work beyond the input
/// length, and `validate(b) == Module::parse(b).is_ok()` for every `b`.
pub fn validate(bytes: &[u8]) -> bool {
    match Module::parse(bytes) {
        Ok(_) => true,
        Err(err) => {
            log::trace!("wasm validation failed: {err}");
            false
        }
    }
}
