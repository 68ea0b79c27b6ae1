// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
use aerojs_shared::sys::WASM_MAX_PAGES;

/// A WebAssembly value type.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    V128,
    FuncRef,
    ExternRef,
}

impl ValType {
    pub fn from_byte(byte: u8) -> Option<ValType> {
        match byte {
            0x7F => Some(ValType::I32),
            0x7E => Some(ValType::I64),
            0x7D => Some(ValType::F32),
            0x7C => Some(ValType::F64),
            0x7B => Some(ValType::V128),
            0x70 => Some(ValType::FuncRef),
            0x6F => Some(ValType::ExternRef),
            _ => None,
        }
    }

    pub fn is_ref(self) -> bool {
        matches!(self, ValType::FuncRef | ValType::ExternRef)
    }

    pub fn is_num(self) -> bool {
        matches!(
            self,
            ValType::I32 | ValType::I64 | ValType::F32 | ValType::F64
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
            ValType::V128 => "v128",
            ValType::FuncRef => "funcref",
            ValType::ExternRef => "externref",
        }
    }
}

/// A function signature.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

/// Size bounds of a table or memory.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl Limits {
    /// Structural validity: `max >= min`, and both within `ceiling` when one
    /// applies (pages for memories, entries for tables).
    pub fn is_valid(&self, ceiling: Option<u64>) -> bool {
        if let Some(max) = self.max {
            if max < self.min {
                return false;
            }
        }
        match ceiling {
            Some(cap) => {
                u64::from(self.min) <= cap && self.max.map_or(true, |m| u64::from(m) <= cap)
            }
            None => true,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct TableType {
    pub element: ValType,
    pub limits: Limits,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct MemoryType {
    pub limits: Limits,
}

impl MemoryType {
    pub fn is_valid(&self) -> bool {
        self.limits.is_valid(Some(WASM_MAX_PAGES))
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct GlobalType {
    pub value: ValType,
    pub mutable: bool,
}

/// What an import or export refers to.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ExternKind {
    Func,
    Table,
    Memory,
    Global,
}

impl ExternKind {
    pub fn from_byte(byte: u8) -> Option<ExternKind> {
        match byte {
            0x00 => Some(ExternKind::Func),
            0x01 => Some(ExternKind::Table),
            0x02 => Some(ExternKind::Memory),
            0x03 => Some(ExternKind::Global),
            _ => None,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum ImportDesc {
    Func(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Import {
    pub module: String,
    pub field: String,
    pub desc: ImportDesc,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Export {
    pub name: String,
    pub kind: ExternKind,
    pub index: u32,
}

/// A validated constant initializer, reduced to its single instruction.
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    GlobalGet(u32),
    RefNull(ValType),
    RefFunc(u32),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Global {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ElementSegment {
    pub table: u32,
    pub offset: ConstExpr,
    pub funcs: Vec<u32>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum DataMode {
    Active { memory: u32, offset: ConstExpr },
    Passive,
}

#[derive(PartialEq, Debug, Clone)]
pub struct DataSegment {
    pub mode: DataMode,
    pub data: Vec<u8>,
}

/// The fully decoded, validated form of a module.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type indices of locally defined functions.
    pub funcs: Vec<u32>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
    pub data_count: Option<u32>,
}

impl Module {
    pub fn num_imported(&self, kind: ExternKind) -> u32 {
        self.imports
            .iter()
            .filter(|imp| {
                matches!(
                    (&imp.desc, kind),
                    (ImportDesc::Func(_), ExternKind::Func)
                        | (ImportDesc::Table(_), ExternKind::Table)
                        | (ImportDesc::Memory(_), ExternKind::Memory)
                        | (ImportDesc::Global(_), ExternKind::Global)
                )
            })
            .count() as u32
    }

    pub fn total_funcs(&self) -> u32 {
        self.num_imported(ExternKind::Func) + self.funcs.len() as u32
    }

    pub fn total_tables(&self) -> u32 {
        self.num_imported(ExternKind::Table) + self.tables.len() as u32
    }

    pub fn total_memories(&self) -> u32 {
        self.num_imported(ExternKind::Memory) + self.memories.len() as u32
    }

    pub fn total_globals(&self) -> u32 {
        self.num_imported(ExternKind::Global) + self.globals.len() as u32
    }

    /// Type index of any function, imported or defined.
    pub fn func_type_index(&self, func: u32) -> Option<u32> {
        let imported = self.num_imported(ExternKind::Func);
        if func < imported {
            self.imports
                .iter()
                .filter_map(|imp| match imp.desc {
                    ImportDesc::Func(ty) => Some(ty),
                    _ => None,
                })
                .nth(func as usize)
        } else {
            self.funcs.get((func - imported) as usize).copied()
        }
    }

    /// Signature of any function, imported or defined.
    pub fn func_type(&self, func: u32) -> Option<&FuncType> {
        self.func_type_index(func)
            .and_then(|ty| self.types.get(ty as usize))
    }

    /// Type of any global, imported or defined.
    pub fn global_type(&self, global: u32) -> Option<GlobalType> {
        let imported = self.num_imported(ExternKind::Global);
        if global < imported {
            self.imports
                .iter()
                .filter_map(|imp| match imp.desc {
                    ImportDesc::Global(ty) => Some(ty),
                    _ => None,
                })
                .nth(global as usize)
        } else {
            self.globals.get((global - imported) as usize).map(|g| g.ty)
        }
    }

    /// Element type of any table, imported or defined.
    pub fn table_type(&self, table: u32) -> Option<TableType> {
        let imported = self.num_imported(ExternKind::Table);
        if table < imported {
            self.imports
                .iter()
                .filter_map(|imp| match imp.desc {
                    ImportDesc::Table(ty) => Some(ty),
                    _ => None,
                })
                .nth(table as usize)
        } else {
            self.tables.get((table - imported) as usize).copied()
        }
    }
}
