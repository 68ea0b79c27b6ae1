// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Constant-expression validation.
//!
//! Global initializers and active-segment offsets admit exactly one
//! instruction from the constant subset, terminated by `end`. `global.get`
//! may only name an imported immutable global (locally defined globals are
//! not initialized yet when these expressions run).

use crate::error::{DecodeError, Result};
use crate::leb128;
use crate::reader::Reader;
use crate::types::{ConstExpr, ExternKind, Module, ValType};

const OP_GLOBAL_GET: u8 = 0x23;
const OP_I32_CONST: u8 = 0x41;
const OP_I64_CONST: u8 = 0x42;
const OP_F32_CONST: u8 = 0x43;
const OP_F64_CONST: u8 = 0x44;
const OP_REF_NULL: u8 = 0xD0;
const OP_REF_FUNC: u8 = 0xD2;
const OP_END: u8 = 0x0B;

fn bad(section: u8, r: &Reader<'_>, reason: &'static str) -> DecodeError {
    DecodeError::Section {
        section,
        offset: r.pos(),
        reason,
    }
}

/// Read one constant expression producing `expected`, consuming the
/// terminating `end`.
pub(crate) fn read_const_expr(
    r: &mut Reader<'_>,
    module: &Module,
    expected: ValType,
    section: u8,
) -> Result<ConstExpr> {
    let opcode = r.read_byte()?;
    let (expr, actual) = match opcode {
        OP_I32_CONST => (ConstExpr::I32(leb128::read_i32(r)?), ValType::I32),
        OP_I64_CONST => (ConstExpr::I64(leb128::read_i64(r)?), ValType::I64),
        OP_F32_CONST => (ConstExpr::F32(leb128::read_f32(r)?), ValType::F32),
        OP_F64_CONST => (ConstExpr::F64(leb128::read_f64(r)?), ValType::F64),
        OP_GLOBAL_GET => {
            let index = leb128::read_u32(r)?;
            if index >= module.num_imported(ExternKind::Global) {
                return Err(bad(section, r, "constant expression references a non-imported global"));
            }
            let ty = module
                .global_type(index)
                .ok_or_else(|| bad(section, r, "global index out of bounds"))?;
            if ty.mutable {
                return Err(bad(section, r, "constant expression references a mutable global"));
            }
            (ConstExpr::GlobalGet(index), ty.value)
        }
        OP_REF_NULL => {
            let ty = ValType::from_byte(r.read_byte()?)
                .filter(|ty| ty.is_ref())
                .ok_or_else(|| bad(section, r, "ref.null requires a reference type"))?;
            (ConstExpr::RefNull(ty), ty)
        }
        OP_REF_FUNC => {
            let index = leb128::read_u32(r)?;
            if index >= module.total_funcs() {
                return Err(bad(section, r, "ref.func index out of bounds"));
            }
            (ConstExpr::RefFunc(index), ValType::FuncRef)
        }
        _ => return Err(bad(section, r, "opcode not allowed in constant expression")),
    };

    if r.read_byte()? != OP_END {
        return Err(bad(section, r, "constant expression not terminated by end"));
    }
    if actual != expected {
        return Err(bad(section, r, "constant expression has the wrong type"));
    }
    Ok(expr)
}
