// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Function-body validation: a typed operand stack checked against a stack
//! of control frames, following the algorithm from the appendix of the
//! WebAssembly core specification. Code after an unconditional branch is
//! polymorphic until the enclosing `end`; the `Unknown` operand stands in
//! for "any type" there.

use crate::error::{DecodeError, Result};
use crate::leb128;
use crate::reader::Reader;
use crate::types::{Module, ValType};

use ValType::{FuncRef, F32, F64, I32, I64, V128};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum OpType {
    Known(ValType),
    Unknown,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
enum FrameKind {
    Func,
    Block,
    Loop,
    If,
    Else,
}

struct Frame {
    kind: FrameKind,
    params: Vec<ValType>,
    results: Vec<ValType>,
    height: usize,
    unreachable: bool,
}

impl Frame {
    /// Types a branch to this frame must supply: loop labels re-enter the
    /// header, everything else exits with the results.
    fn label_types(&self) -> &[ValType] {
        if self.kind == FrameKind::Loop {
            &self.params
        } else {
            &self.results
        }
    }
}

pub(crate) struct BodyValidator<'m> {
    module: &'m Module,
    func: u32,
    locals: Vec<ValType>,
    ops: Vec<OpType>,
    frames: Vec<Frame>,
}

/// Validate one code-section entry (locals vector + expression). The reader
/// must span exactly the declared body; trailing bytes reject.
pub(crate) fn validate_body(module: &Module, func: u32, r: &mut Reader<'_>) -> Result<()> {
    let ty = module
        .func_type(func)
        .ok_or(DecodeError::Body {
            func,
            offset: r.pos(),
            reason: "function index has no type",
        })?
        .clone();

    let mut locals: Vec<ValType> = ty.params.clone();
    let decls = leb128::read_u32(r)?;
    for _ in 0..decls {
        let count = leb128::read_u32(r)?;
        let vt = ValType::from_byte(r.read_byte()?).ok_or(DecodeError::Body {
            func,
            offset: r.pos(),
            reason: "invalid local type",
        })?;
        let total = locals.len() as u64 + u64::from(count);
        if total > u64::from(u32::MAX) {
            return Err(DecodeError::Body {
                func,
                offset: r.pos(),
                reason: "too many locals",
            });
        }
        locals.extend(std::iter::repeat(vt).take(count as usize));
    }

    let mut v = BodyValidator {
        module,
        func,
        locals,
        ops: Vec::new(),
        frames: vec![Frame {
            kind: FrameKind::Func,
            params: Vec::new(),
            results: ty.results,
            height: 0,
            unreachable: false,
        }],
    };
    v.run(r)?;

    if !r.is_empty() {
        return Err(DecodeError::Body {
            func,
            offset: r.pos(),
            reason: "trailing bytes after function end",
        });
    }
    Ok(())
}

impl<'m> BodyValidator<'m> {
    fn fail(&self, r: &Reader<'_>, reason: &'static str) -> DecodeError {
        DecodeError::Body {
            func: self.func,
            offset: r.pos(),
            reason,
        }
    }

    fn push(&mut self, t: ValType) {
        self.ops.push(OpType::Known(t));
    }

    fn push_all(&mut self, ts: &[ValType]) {
        for &t in ts {
            self.push(t);
        }
    }

    fn pop_any(&mut self, r: &Reader<'_>) -> Result<OpType> {
        let frame = self.frames.last().expect("control stack is never empty");
        if self.ops.len() == frame.height {
            if frame.unreachable {
                return Ok(OpType::Unknown);
            }
            return Err(self.fail(r, "operand stack underflow"));
        }
        Ok(self.ops.pop().expect("checked above"))
    }

    fn pop_expect(&mut self, t: ValType, r: &Reader<'_>) -> Result<()> {
        match self.pop_any(r)? {
            OpType::Unknown => Ok(()),
            OpType::Known(actual) if actual == t => Ok(()),
            OpType::Known(_) => Err(self.fail(r, "operand type mismatch")),
        }
    }

    fn pop_all(&mut self, ts: &[ValType], r: &Reader<'_>) -> Result<()> {
        for &t in ts.iter().rev() {
            self.pop_expect(t, r)?;
        }
        Ok(())
    }

    fn set_unreachable(&mut self) {
        let frame = self.frames.last_mut().expect("control stack is never empty");
        self.ops.truncate(frame.height);
        frame.unreachable = true;
    }

    fn apply(&mut self, pops: &[ValType], push: Option<ValType>, r: &Reader<'_>) -> Result<()> {
        self.pop_all(pops, r)?;
        if let Some(t) = push {
            self.push(t);
        }
        Ok(())
    }

    fn frame_at(&self, depth: u32, r: &Reader<'_>) -> Result<&Frame> {
        let depth = depth as usize;
        if depth >= self.frames.len() {
            return Err(self.fail(r, "branch depth exceeds control stack"));
        }
        Ok(&self.frames[self.frames.len() - 1 - depth])
    }

    fn read_block_type(&self, r: &mut Reader<'_>) -> Result<(Vec<ValType>, Vec<ValType>)> {
        let byte = r.peek_byte()?;
        if byte == 0x40 {
            r.read_byte()?;
            return Ok((Vec::new(), Vec::new()));
        }
        if let Some(t) = ValType::from_byte(byte) {
            r.read_byte()?;
            return Ok((Vec::new(), vec![t]));
        }
        let index = leb128::read_s33(r)?;
        if index < 0 {
            return Err(self.fail(r, "invalid block type"));
        }
        let ty = self
            .module
            .types
            .get(index as usize)
            .ok_or_else(|| self.fail(r, "block type index out of bounds"))?;
        Ok((ty.params.clone(), ty.results.clone()))
    }

    fn push_frame(&mut self, kind: FrameKind, params: Vec<ValType>, results: Vec<ValType>, r: &Reader<'_>) -> Result<()> {
        self.pop_all(&params, r)?;
        let height = self.ops.len();
        self.frames.push(Frame {
            kind,
            params,
            results,
            height,
            unreachable: false,
        });
        let params = self.frames.last().expect("just pushed").params.clone();
        self.push_all(&params);
        Ok(())
    }

    fn local_type(&self, index: u32, r: &Reader<'_>) -> Result<ValType> {
        self.locals
            .get(index as usize)
            .copied()
            .ok_or_else(|| self.fail(r, "local index out of bounds"))
    }

    fn require_memory(&self, r: &Reader<'_>) -> Result<()> {
        if self.module.total_memories() == 0 {
            return Err(self.fail(r, "memory instruction without a memory"));
        }
        Ok(())
    }

    fn read_mem_arg(&self, r: &mut Reader<'_>, width: u32) -> Result<()> {
        self.require_memory(r)?;
        let align = leb128::read_u32(r)?;
        let _offset = leb128::read_u32(r)?;
        // Alignment may not exceed the access width.
        if align >= 32 || (1u64 << align) > u64::from(width) {
            return Err(self.fail(r, "invalid alignment"));
        }
        Ok(())
    }

    fn load(&mut self, r: &mut Reader<'_>, width: u32, t: ValType) -> Result<()> {
        self.read_mem_arg(r, width)?;
        self.apply(&[I32], Some(t), r)
    }

    fn store(&mut self, r: &mut Reader<'_>, width: u32, t: ValType) -> Result<()> {
        self.read_mem_arg(r, width)?;
        self.apply(&[I32, t], None, r)
    }

    fn run(&mut self, r: &mut Reader<'_>) -> Result<()> {
        while !self.frames.is_empty() {
            let op = r.read_byte()?;
            match op {
                0x00 => self.set_unreachable(), // unreachable
                0x01 => {}                      // nop

                0x02 => {
                    let (params, results) = self.read_block_type(r)?;
                    self.push_frame(FrameKind::Block, params, results, r)?;
                }
                0x03 => {
                    let (params, results) = self.read_block_type(r)?;
                    self.push_frame(FrameKind::Loop, params, results, r)?;
                }
                0x04 => {
                    let (params, results) = self.read_block_type(r)?;
                    self.pop_expect(I32, r)?;
                    self.push_frame(FrameKind::If, params, results, r)?;
                }
                0x05 => {
                    let frame = self.frames.pop().expect("control stack is never empty");
                    if frame.kind != FrameKind::If {
                        return Err(self.fail(r, "else outside of if"));
                    }
                    self.pop_all(&frame.results, r)?;
                    if self.ops.len() != frame.height {
                        return Err(self.fail(r, "operands left on stack at else"));
                    }
                    let params = frame.params.clone();
                    self.frames.push(Frame {
                        kind: FrameKind::Else,
                        params: frame.params,
                        results: frame.results,
                        height: frame.height,
                        unreachable: false,
                    });
                    self.push_all(&params);
                }
                0x0B => {
                    let frame = self.frames.pop().expect("control stack is never empty");
                    self.pop_all(&frame.results, r)?;
                    if self.ops.len() != frame.height {
                        return Err(self.fail(r, "operands left on stack at end"));
                    }
                    // An if without an else must be a no-op on the stack.
                    if frame.kind == FrameKind::If && frame.params != frame.results {
                        return Err(self.fail(r, "if without else must leave the stack unchanged"));
                    }
                    if !self.frames.is_empty() {
                        self.push_all(&frame.results);
                    }
                }

                0x0C => {
                    // br
                    let depth = leb128::read_u32(r)?;
                    let tys = self.frame_at(depth, r)?.label_types().to_vec();
                    self.pop_all(&tys, r)?;
                    self.set_unreachable();
                }
                0x0D => {
                    // br_if
                    let depth = leb128::read_u32(r)?;
                    self.pop_expect(I32, r)?;
                    let tys = self.frame_at(depth, r)?.label_types().to_vec();
                    self.pop_all(&tys, r)?;
                    self.push_all(&tys);
                }
                0x0E => {
                    // br_table
                    let count = leb128::read_u32(r)?;
                    let mut labels = Vec::with_capacity(count.min(1024) as usize);
                    for _ in 0..count {
                        labels.push(leb128::read_u32(r)?);
                    }
                    let default = leb128::read_u32(r)?;
                    self.pop_expect(I32, r)?;
                    let default_tys = self.frame_at(default, r)?.label_types().to_vec();
                    for &label in &labels {
                        let tys = self.frame_at(label, r)?.label_types();
                        if tys != default_tys.as_slice() {
                            return Err(self.fail(r, "br_table label types disagree"));
                        }
                    }
                    self.pop_all(&default_tys, r)?;
                    self.set_unreachable();
                }
                0x0F => {
                    // return
                    let tys = self.frames[0].results.clone();
                    self.pop_all(&tys, r)?;
                    self.set_unreachable();
                }

                0x10 => {
                    // call
                    let index = leb128::read_u32(r)?;
                    let ty = self
                        .module
                        .func_type(index)
                        .ok_or_else(|| self.fail(r, "call index out of bounds"))?
                        .clone();
                    self.pop_all(&ty.params, r)?;
                    self.push_all(&ty.results);
                }
                0x11 => {
                    // call_indirect
                    let type_index = leb128::read_u32(r)?;
                    let table_index = leb128::read_u32(r)?;
                    if table_index != 0 {
                        return Err(self.fail(r, "call_indirect requires table 0"));
                    }
                    let table = self
                        .module
                        .table_type(table_index)
                        .ok_or_else(|| self.fail(r, "call_indirect without a table"))?;
                    if table.element != FuncRef {
                        return Err(self.fail(r, "call_indirect table must hold funcref"));
                    }
                    let ty = self
                        .module
                        .types
                        .get(type_index as usize)
                        .ok_or_else(|| self.fail(r, "call_indirect type index out of bounds"))?
                        .clone();
                    self.pop_expect(I32, r)?;
                    self.pop_all(&ty.params, r)?;
                    self.push_all(&ty.results);
                }

                0x1A => {
                    self.pop_any(r)?;
                }
                0x1B => {
                    // untyped select: numeric operands only
                    self.pop_expect(I32, r)?;
                    let a = self.pop_any(r)?;
                    let b = self.pop_any(r)?;
                    let result = match (a, b) {
                        (OpType::Known(x), OpType::Known(y)) => {
                            if x != y {
                                return Err(self.fail(r, "select operand types disagree"));
                            }
                            if x.is_ref() {
                                return Err(self.fail(r, "untyped select cannot take references"));
                            }
                            OpType::Known(x)
                        }
                        (OpType::Known(x), OpType::Unknown) | (OpType::Unknown, OpType::Known(x)) => {
                            if x.is_ref() {
                                return Err(self.fail(r, "untyped select cannot take references"));
                            }
                            OpType::Known(x)
                        }
                        (OpType::Unknown, OpType::Unknown) => OpType::Unknown,
                    };
                    self.ops.push(result);
                }
                0x1C => {
                    // typed select
                    let arity = leb128::read_u32(r)?;
                    if arity != 1 {
                        return Err(self.fail(r, "select type vector must have one entry"));
                    }
                    let t = ValType::from_byte(r.read_byte()?)
                        .ok_or_else(|| self.fail(r, "invalid select type"))?;
                    self.apply(&[t, t, I32], Some(t), r)?;
                }

                0x20 => {
                    let t = self.local_type(leb128::read_u32(r)?, r)?;
                    self.push(t);
                }
                0x21 => {
                    let t = self.local_type(leb128::read_u32(r)?, r)?;
                    self.pop_expect(t, r)?;
                }
                0x22 => {
                    let t = self.local_type(leb128::read_u32(r)?, r)?;
                    self.pop_expect(t, r)?;
                    self.push(t);
                }
                0x23 => {
                    let index = leb128::read_u32(r)?;
                    let ty = self
                        .module
                        .global_type(index)
                        .ok_or_else(|| self.fail(r, "global index out of bounds"))?;
                    self.push(ty.value);
                }
                0x24 => {
                    let index = leb128::read_u32(r)?;
                    let ty = self
                        .module
                        .global_type(index)
                        .ok_or_else(|| self.fail(r, "global index out of bounds"))?;
                    if !ty.mutable {
                        return Err(self.fail(r, "global.set of an immutable global"));
                    }
                    self.pop_expect(ty.value, r)?;
                }
                0x25 => {
                    // table.get
                    let index = leb128::read_u32(r)?;
                    let table = self
                        .module
                        .table_type(index)
                        .ok_or_else(|| self.fail(r, "table index out of bounds"))?;
                    self.apply(&[I32], Some(table.element), r)?;
                }
                0x26 => {
                    // table.set
                    let index = leb128::read_u32(r)?;
                    let table = self
                        .module
                        .table_type(index)
                        .ok_or_else(|| self.fail(r, "table index out of bounds"))?;
                    self.apply(&[I32, table.element], None, r)?;
                }

                // Memory loads.
                0x28 => self.load(r, 4, I32)?,
                0x29 => self.load(r, 8, I64)?,
                0x2A => self.load(r, 4, F32)?,
                0x2B => self.load(r, 8, F64)?,
                0x2C | 0x2D => self.load(r, 1, I32)?,
                0x2E | 0x2F => self.load(r, 2, I32)?,
                0x30 | 0x31 => self.load(r, 1, I64)?,
                0x32 | 0x33 => self.load(r, 2, I64)?,
                0x34 | 0x35 => self.load(r, 4, I64)?,

                // Memory stores.
                0x36 => self.store(r, 4, I32)?,
                0x37 => self.store(r, 8, I64)?,
                0x38 => self.store(r, 4, F32)?,
                0x39 => self.store(r, 8, F64)?,
                0x3A => self.store(r, 1, I32)?,
                0x3B => self.store(r, 2, I32)?,
                0x3C => self.store(r, 1, I64)?,
                0x3D => self.store(r, 2, I64)?,
                0x3E => self.store(r, 4, I64)?,

                0x3F => {
                    // memory.size
                    self.require_memory(r)?;
                    if r.read_byte()? != 0x00 {
                        return Err(self.fail(r, "memory.size reserved byte must be zero"));
                    }
                    self.push(I32);
                }
                0x40 => {
                    // memory.grow
                    self.require_memory(r)?;
                    if r.read_byte()? != 0x00 {
                        return Err(self.fail(r, "memory.grow reserved byte must be zero"));
                    }
                    self.apply(&[I32], Some(I32), r)?;
                }

                0x41 => {
                    leb128::read_i32(r)?;
                    self.push(I32);
                }
                0x42 => {
                    leb128::read_i64(r)?;
                    self.push(I64);
                }
                0x43 => {
                    leb128::read_f32(r)?;
                    self.push(F32);
                }
                0x44 => {
                    leb128::read_f64(r)?;
                    self.push(F64);
                }

                // Tests and comparisons.
                0x45 => self.apply(&[I32], Some(I32), r)?,
                0x46..=0x4F => self.apply(&[I32, I32], Some(I32), r)?,
                0x50 => self.apply(&[I64], Some(I32), r)?,
                0x51..=0x5A => self.apply(&[I64, I64], Some(I32), r)?,
                0x5B..=0x60 => self.apply(&[F32, F32], Some(I32), r)?,
                0x61..=0x66 => self.apply(&[F64, F64], Some(I32), r)?,

                // Numeric operators.
                0x67..=0x69 => self.apply(&[I32], Some(I32), r)?,
                0x6A..=0x78 => self.apply(&[I32, I32], Some(I32), r)?,
                0x79..=0x7B => self.apply(&[I64], Some(I64), r)?,
                0x7C..=0x8A => self.apply(&[I64, I64], Some(I64), r)?,
                0x8B..=0x91 => self.apply(&[F32], Some(F32), r)?,
                0x92..=0x98 => self.apply(&[F32, F32], Some(F32), r)?,
                0x99..=0x9F => self.apply(&[F64], Some(F64), r)?,
                0xA0..=0xA6 => self.apply(&[F64, F64], Some(F64), r)?,

                // Conversions.
                0xA7 => self.apply(&[I64], Some(I32), r)?,
                0xA8 | 0xA9 => self.apply(&[F32], Some(I32), r)?,
                0xAA | 0xAB => self.apply(&[F64], Some(I32), r)?,
                0xAC | 0xAD => self.apply(&[I32], Some(I64), r)?,
                0xAE | 0xAF => self.apply(&[F32], Some(I64), r)?,
                0xB0 | 0xB1 => self.apply(&[F64], Some(I64), r)?,
                0xB2 | 0xB3 => self.apply(&[I32], Some(F32), r)?,
                0xB4 | 0xB5 => self.apply(&[I64], Some(F32), r)?,
                0xB6 => self.apply(&[F64], Some(F32), r)?,
                0xB7 | 0xB8 => self.apply(&[I32], Some(F64), r)?,
                0xB9 | 0xBA => self.apply(&[I64], Some(F64), r)?,
                0xBB => self.apply(&[F32], Some(F64), r)?,
                0xBC => self.apply(&[F32], Some(I32), r)?,
                0xBD => self.apply(&[F64], Some(I64), r)?,
                0xBE => self.apply(&[I32], Some(F32), r)?,
                0xBF => self.apply(&[I64], Some(F64), r)?,

                // Sign extension.
                0xC0 | 0xC1 => self.apply(&[I32], Some(I32), r)?,
                0xC2..=0xC4 => self.apply(&[I64], Some(I64), r)?,

                0xD0 => {
                    let t = ValType::from_byte(r.read_byte()?)
                        .filter(|t| t.is_ref())
                        .ok_or_else(|| self.fail(r, "ref.null requires a reference type"))?;
                    self.push(t);
                }
                0xD1 => {
                    match self.pop_any(r)? {
                        OpType::Known(t) if !t.is_ref() => {
                            return Err(self.fail(r, "ref.is_null requires a reference"));
                        }
                        _ => {}
                    }
                    self.push(I32);
                }
                0xD2 => {
                    let index = leb128::read_u32(r)?;
                    if index >= self.module.total_funcs() {
                        return Err(self.fail(r, "ref.func index out of bounds"));
                    }
                    self.push(FuncRef);
                }

                0xFC => {
                    // Saturating truncations.
                    let sub = leb128::read_u32(r)?;
                    match sub {
                        0 | 1 => self.apply(&[F32], Some(I32), r)?,
                        2 | 3 => self.apply(&[F64], Some(I32), r)?,
                        4 | 5 => self.apply(&[F32], Some(I64), r)?,
                        6 | 7 => self.apply(&[F64], Some(I64), r)?,
                        _ => return Err(self.fail(r, "unsupported 0xFC opcode")),
                    }
                }
                0xFD => {
                    // SIMD subset: everything else rejects.
                    let sub = leb128::read_u32(r)?;
                    match sub {
                        0 => {
                            // v128.load
                            self.read_mem_arg(r, 16)?;
                            self.apply(&[I32], Some(V128), r)?;
                        }
                        11 => {
                            // v128.store
                            self.read_mem_arg(r, 16)?;
                            self.apply(&[I32, V128], None, r)?;
                        }
                        12 => {
                            // v128.const
                            r.read_bytes(16)?;
                            self.push(V128);
                        }
                        _ => return Err(self.fail(r, "unsupported SIMD opcode")),
                    }
                }

                _ => return Err(self.fail(r, "unknown opcode")),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FuncType;

    fn module_with(ty: FuncType) -> Module {
        Module {
            types: vec![ty],
            funcs: vec![0],
            ..Default::default()
        }
    }

    fn check(module: &Module, body: &[u8]) -> Result<()> {
        validate_body(module, 0, &mut Reader::new(body))
    }

    #[test]
    fn empty_body() {
        let m = module_with(FuncType::default());
        // no locals, just `end`
        check(&m, &[0x00 /* local decls */, 0x0B]).unwrap();
    }

    #[test]
    fn returns_constant() {
        let m = module_with(FuncType {
            params: vec![],
            results: vec![I32],
        });
        check(&m, &[0x00, 0x41, 0x2A, 0x0B]).unwrap();
    }

    #[test]
    fn add_params() {
        let m = module_with(FuncType {
            params: vec![I32, I32],
            results: vec![I32],
        });
        check(&m, &[0x00, 0x20, 0x00, 0x20, 0x01, 0x6A, 0x0B]).unwrap();
    }

    #[test]
    fn rejects_type_mismatch() {
        let m = module_with(FuncType {
            params: vec![],
            results: vec![I32],
        });
        // i64.const 1; end — wrong result type.
        assert!(check(&m, &[0x00, 0x42, 0x01, 0x0B]).is_err());
    }

    #[test]
    fn rejects_underflow() {
        let m = module_with(FuncType::default());
        // i32.add with an empty stack.
        assert!(check(&m, &[0x00, 0x6A, 0x0B]).is_err());
    }

    #[test]
    fn rejects_dangling_operand() {
        let m = module_with(FuncType::default());
        // i32.const 1; end — value left over.
        assert!(check(&m, &[0x00, 0x41, 0x01, 0x0B]).is_err());
    }

    #[test]
    fn unreachable_region_is_polymorphic() {
        let m = module_with(FuncType {
            params: vec![],
            results: vec![I32],
        });
        // unreachable; i32.add; end — the add types against the polymorphic
        // stack and the function result is satisfied the same way.
        check(&m, &[0x00, 0x00, 0x6A, 0x0B]).unwrap();
    }

    #[test]
    fn unreachable_code_must_still_parse() {
        let m = module_with(FuncType::default());
        // unreachable; <unknown opcode 0xFE>; end
        assert!(check(&m, &[0x00, 0x00, 0xFE, 0x0B]).is_err());
    }

    #[test]
    fn block_and_branch() {
        let m = module_with(FuncType::default());
        // block (empty) br 0 end end
        check(&m, &[0x00, 0x02, 0x40, 0x0C, 0x00, 0x0B, 0x0B]).unwrap();
    }

    #[test]
    fn br_depth_checked() {
        let m = module_with(FuncType::default());
        // br 7 with one frame on the stack.
        assert!(check(&m, &[0x00, 0x0C, 0x07, 0x0B]).is_err());
    }

    #[test]
    fn if_requires_condition() {
        let m = module_with(FuncType::default());
        // if (empty blocktype) with nothing on the stack.
        assert!(check(&m, &[0x00, 0x04, 0x40, 0x0B, 0x0B]).is_err());
    }

    #[test]
    fn if_else_balanced_result() {
        let m = module_with(FuncType {
            params: vec![],
            results: vec![I32],
        });
        // i32.const 1; if (result i32) i32.const 2 else i32.const 3 end; end
        check(
            &m,
            &[0x00, 0x41, 0x01, 0x04, 0x7F, 0x41, 0x02, 0x05, 0x41, 0x03, 0x0B, 0x0B],
        )
        .unwrap();
    }

    #[test]
    fn if_without_else_must_balance() {
        let m = module_with(FuncType::default());
        // i32.const 1; if (result i32) i32.const 2 end — missing else arm.
        assert!(check(&m, &[0x00, 0x41, 0x01, 0x04, 0x7F, 0x41, 0x02, 0x0B, 0x0B]).is_err());
    }

    #[test]
    fn else_outside_if_rejected() {
        let m = module_with(FuncType::default());
        assert!(check(&m, &[0x00, 0x05, 0x0B]).is_err());
    }

    #[test]
    fn trailing_bytes_rejected() {
        let m = module_with(FuncType::default());
        assert!(check(&m, &[0x00, 0x0B, 0x41]).is_err());
    }

    #[test]
    fn memory_ops_require_memory() {
        let m = module_with(FuncType::default());
        // i32.const 0; i32.load align=2 offset=0; drop; end
        assert!(check(&m, &[0x00, 0x41, 0x00, 0x28, 0x02, 0x00, 0x1A, 0x0B]).is_err());
    }

    #[test]
    fn alignment_bounded_by_width() {
        let mut m = module_with(FuncType::default());
        m.memories.push(crate::types::MemoryType {
            limits: crate::types::Limits { min: 1, max: None },
        });
        // align 3 (8 bytes) on a 4-byte i32.load.
        assert!(check(&m, &[0x00, 0x41, 0x00, 0x28, 0x03, 0x00, 0x1A, 0x0B]).is_err());
        // align 2 is fine.
        check(&m, &[0x00, 0x41, 0x00, 0x28, 0x02, 0x00, 0x1A, 0x0B]).unwrap();
    }
}
