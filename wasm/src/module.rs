// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Module-level decoding: prologue, section framing, per-section contents
//! and the end-of-module cross-checks.

use crate::constexpr::read_const_expr;
use crate::error::{DecodeError, Result};
use crate::func_validator::validate_body;
use crate::leb128;
use crate::reader::Reader;
use crate::types::{
    DataMode, DataSegment, ElementSegment, Export, ExternKind, FuncType, Global, GlobalType,
    Import, ImportDesc, Limits, MemoryType, Module, TableType, ValType,
};

const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];
const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

const SEC_CUSTOM: u8 = 0;
const SEC_TYPE: u8 = 1;
const SEC_IMPORT: u8 = 2;
const SEC_FUNCTION: u8 = 3;
const SEC_TABLE: u8 = 4;
const SEC_MEMORY: u8 = 5;
const SEC_GLOBAL: u8 = 6;
const SEC_EXPORT: u8 = 7;
const SEC_START: u8 = 8;
const SEC_ELEMENT: u8 = 9;
const SEC_CODE: u8 = 10;
const SEC_DATA: u8 = 11;
const SEC_DATA_COUNT: u8 = 12;

/// Position of each known section in the required module order. DataCount
/// carries the highest id but sits between Element and Code.
fn section_rank(id: u8) -> u8 {
    match id {
        SEC_DATA_COUNT => 10,
        SEC_CODE => 11,
        SEC_DATA => 12,
        other => other,
    }
}

fn bad(section: u8, r: &Reader<'_>, reason: &'static str) -> DecodeError {
    DecodeError::Section {
        section,
        offset: r.pos(),
        reason,
    }
}

fn read_name(r: &mut Reader<'_>, section: u8) -> Result<String> {
    let len = leb128::read_u32(r)?;
    let bytes = r.read_bytes(len as usize)?;
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| bad(section, r, "name is not valid UTF-8"))
}

fn read_val_type(r: &mut Reader<'_>, section: u8) -> Result<ValType> {
    ValType::from_byte(r.read_byte()?).ok_or_else(|| bad(section, r, "invalid value type"))
}

fn read_limits(r: &mut Reader<'_>, section: u8) -> Result<Limits> {
    let flag = r.read_byte()?;
    if flag > 1 {
        return Err(bad(section, r, "invalid limits flag"));
    }
    let min = leb128::read_u32(r)?;
    let max = if flag == 1 {
        Some(leb128::read_u32(r)?)
    } else {
        None
    };
    let limits = Limits { min, max };
    if !limits.is_valid(None) {
        return Err(bad(section, r, "limits maximum below minimum"));
    }
    Ok(limits)
}

fn read_table_type(r: &mut Reader<'_>, section: u8) -> Result<TableType> {
    let element = read_val_type(r, section)?;
    if !element.is_ref() {
        return Err(bad(section, r, "table element must be a reference type"));
    }
    let limits = read_limits(r, section)?;
    Ok(TableType { element, limits })
}

fn read_memory_type(r: &mut Reader<'_>, section: u8) -> Result<MemoryType> {
    let limits = read_limits(r, section)?;
    let memory = MemoryType { limits };
    if !memory.is_valid() {
        return Err(bad(section, r, "memory limits exceed 65536 pages"));
    }
    Ok(memory)
}

fn read_global_type(r: &mut Reader<'_>, section: u8) -> Result<GlobalType> {
    let value = read_val_type(r, section)?;
    let mutable = match r.read_byte()? {
        0 => false,
        1 => true,
        _ => return Err(bad(section, r, "invalid global mutability")),
    };
    Ok(GlobalType { value, mutable })
}

impl Module {
    /// Decode and fully validate a binary module.
    ///
    /// Either the whole byte vector is accepted and a [`Module`] comes back,
    /// or the input is rejected; there is no partial acceptance.
    pub fn parse(bytes: &[u8]) -> Result<Module> {
        if bytes.len() < 8 || bytes[0..4] != MAGIC || bytes[4..8] != VERSION {
            return Err(DecodeError::BadPreamble);
        }

        let mut r = Reader::new(bytes);
        r.skip(8).expect("preamble length checked");

        let mut module = Module::default();
        let mut last_rank = 0u8;
        let mut code_entries = 0u32;

        while !r.is_empty() {
            let id = r.read_byte()?;
            let size = leb128::read_u32(&mut r)?;
            let mut payload = r.sub_reader(size as usize)?;

            if id == SEC_CUSTOM {
                // Custom sections carry a name and opaque bytes; only the
                // name's framing is checked.
                read_name(&mut payload, SEC_CUSTOM)?;
                continue;
            }
            if id > SEC_DATA_COUNT {
                return Err(bad(id, &payload, "unknown section id"));
            }
            let rank = section_rank(id);
            if rank <= last_rank {
                return Err(bad(id, &payload, "section out of order or duplicated"));
            }
            last_rank = rank;

            match id {
                SEC_TYPE => read_type_section(&mut payload, &mut module)?,
                SEC_IMPORT => read_import_section(&mut payload, &mut module)?,
                SEC_FUNCTION => read_function_section(&mut payload, &mut module)?,
                SEC_TABLE => read_table_section(&mut payload, &mut module)?,
                SEC_MEMORY => read_memory_section(&mut payload, &mut module)?,
                SEC_GLOBAL => read_global_section(&mut payload, &mut module)?,
                SEC_EXPORT => read_export_section(&mut payload, &mut module)?,
                SEC_START => read_start_section(&mut payload, &mut module)?,
                SEC_ELEMENT => read_element_section(&mut payload, &mut module)?,
                SEC_CODE => code_entries = read_code_section(&mut payload, &module)?,
                SEC_DATA => read_data_section(&mut payload, &mut module)?,
                SEC_DATA_COUNT => {
                    module.data_count = Some(leb128::read_u32(&mut payload)?);
                }
                _ => unreachable!("known ids dispatched above"),
            }

            if !payload.is_empty() {
                return Err(bad(id, &payload, "section content shorter than declared size"));
            }
        }

        // Cross-checks that need the whole module.
        if code_entries != module.funcs.len() as u32 {
            return Err(DecodeError::Section {
                section: SEC_CODE,
                offset: bytes.len(),
                reason: "function and code section lengths disagree",
            });
        }
        if let Some(count) = module.data_count {
            if count != module.data.len() as u32 {
                return Err(DecodeError::Section {
                    section: SEC_DATA_COUNT,
                    offset: bytes.len(),
                    reason: "data count disagrees with data section",
                });
            }
        }
        if module.total_memories() > 1 {
            return Err(DecodeError::Section {
                section: SEC_MEMORY,
                offset: bytes.len(),
                reason: "at most one memory is permitted",
            });
        }

        log::trace!(
            "decoded wasm module: {} types, {} funcs, {} exports",
            module.types.len(),
            module.total_funcs(),
            module.exports.len()
        );
        Ok(module)
    }
}

fn read_type_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = leb128::read_u32(r)?;
    for _ in 0..count {
        if r.read_byte()? != 0x60 {
            return Err(bad(SEC_TYPE, r, "function type must begin with 0x60"));
        }
        let nparams = leb128::read_u32(r)?;
        let mut params = Vec::with_capacity(nparams.min(64) as usize);
        for _ in 0..nparams {
            params.push(read_val_type(r, SEC_TYPE)?);
        }
        let nresults = leb128::read_u32(r)?;
        let mut results = Vec::with_capacity(nresults.min(64) as usize);
        for _ in 0..nresults {
            results.push(read_val_type(r, SEC_TYPE)?);
        }
        module.types.push(FuncType { params, results });
    }
    Ok(())
}

fn read_import_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = leb128::read_u32(r)?;
    for _ in 0..count {
        let module_name = read_name(r, SEC_IMPORT)?;
        let field = read_name(r, SEC_IMPORT)?;
        let desc = match r.read_byte()? {
            0x00 => {
                let ty = leb128::read_u32(r)?;
                if ty as usize >= module.types.len() {
                    return Err(bad(SEC_IMPORT, r, "imported function type out of bounds"));
                }
                ImportDesc::Func(ty)
            }
            0x01 => ImportDesc::Table(read_table_type(r, SEC_IMPORT)?),
            0x02 => ImportDesc::Memory(read_memory_type(r, SEC_IMPORT)?),
            0x03 => ImportDesc::Global(read_global_type(r, SEC_IMPORT)?),
            _ => return Err(bad(SEC_IMPORT, r, "unknown import kind")),
        };
        module.imports.push(Import {
            module: module_name,
            field,
            desc,
        });
    }
    Ok(())
}

fn read_function_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = leb128::read_u32(r)?;
    for _ in 0..count {
        let ty = leb128::read_u32(r)?;
        if ty as usize >= module.types.len() {
            return Err(bad(SEC_FUNCTION, r, "function type index out of bounds"));
        }
        module.funcs.push(ty);
    }
    Ok(())
}

fn read_table_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = leb128::read_u32(r)?;
    for _ in 0..count {
        module.tables.push(read_table_type(r, SEC_TABLE)?);
    }
    Ok(())
}

fn read_memory_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = leb128::read_u32(r)?;
    if count > 1 {
        return Err(bad(SEC_MEMORY, r, "at most one memory is permitted"));
    }
    for _ in 0..count {
        module.memories.push(read_memory_type(r, SEC_MEMORY)?);
    }
    Ok(())
}

fn read_global_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = leb128::read_u32(r)?;
    for _ in 0..count {
        let ty = read_global_type(r, SEC_GLOBAL)?;
        let init = read_const_expr(r, module, ty.value, SEC_GLOBAL)?;
        module.globals.push(Global { ty, init });
    }
    Ok(())
}

fn read_export_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = leb128::read_u32(r)?;
    for _ in 0..count {
        let name = read_name(r, SEC_EXPORT)?;
        if module.exports.iter().any(|e| e.name == name) {
            return Err(bad(SEC_EXPORT, r, "duplicate export name"));
        }
        let kind = ExternKind::from_byte(r.read_byte()?)
            .ok_or_else(|| bad(SEC_EXPORT, r, "unknown export kind"))?;
        let index = leb128::read_u32(r)?;
        let total = match kind {
            ExternKind::Func => module.total_funcs(),
            ExternKind::Table => module.total_tables(),
            ExternKind::Memory => module.total_memories(),
            ExternKind::Global => module.total_globals(),
        };
        if index >= total {
            return Err(bad(SEC_EXPORT, r, "export index out of bounds"));
        }
        module.exports.push(Export { name, kind, index });
    }
    Ok(())
}

fn read_start_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let index = leb128::read_u32(r)?;
    let ty = module
        .func_type(index)
        .ok_or_else(|| bad(SEC_START, r, "start function index out of bounds"))?;
    if !ty.params.is_empty() || !ty.results.is_empty() {
        return Err(bad(SEC_START, r, "start function must have an empty signature"));
    }
    module.start = Some(index);
    Ok(())
}

fn read_element_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = leb128::read_u32(r)?;
    for _ in 0..count {
        let table = leb128::read_u32(r)?;
        if table != 0 {
            return Err(bad(SEC_ELEMENT, r, "element segment table index must be 0"));
        }
        if module.table_type(0).is_none() {
            return Err(bad(SEC_ELEMENT, r, "element segment without a table"));
        }
        let offset = read_const_expr(r, module, ValType::I32, SEC_ELEMENT)?;
        let nfuncs = leb128::read_u32(r)?;
        let mut funcs = Vec::with_capacity(nfuncs.min(1024) as usize);
        for _ in 0..nfuncs {
            let func = leb128::read_u32(r)?;
            if func >= module.total_funcs() {
                return Err(bad(SEC_ELEMENT, r, "element function index out of bounds"));
            }
            funcs.push(func);
        }
        module.elements.push(ElementSegment { table, offset, funcs });
    }
    Ok(())
}

fn read_code_section(r: &mut Reader<'_>, module: &Module) -> Result<u32> {
    let count = leb128::read_u32(r)?;
    let imported = module.num_imported(ExternKind::Func);
    if count != module.funcs.len() as u32 {
        return Err(bad(SEC_CODE, r, "function and code section lengths disagree"));
    }
    for i in 0..count {
        let body_size = leb128::read_u32(r)?;
        let mut body = r.sub_reader(body_size as usize)?;
        validate_body(module, imported + i, &mut body)?;
    }
    Ok(count)
}

fn read_data_section(r: &mut Reader<'_>, module: &mut Module) -> Result<()> {
    let count = leb128::read_u32(r)?;
    for _ in 0..count {
        let tag = leb128::read_u32(r)?;
        let mode = match tag {
            0 => {
                if module.total_memories() == 0 {
                    return Err(bad(SEC_DATA, r, "active data segment without a memory"));
                }
                let offset = read_const_expr(r, module, ValType::I32, SEC_DATA)?;
                DataMode::Active { memory: 0, offset }
            }
            1 => DataMode::Passive,
            2 => {
                let memory = leb128::read_u32(r)?;
                if memory >= module.total_memories() {
                    return Err(bad(SEC_DATA, r, "data segment memory index out of bounds"));
                }
                let offset = read_const_expr(r, module, ValType::I32, SEC_DATA)?;
                DataMode::Active { memory, offset }
            }
            _ => return Err(bad(SEC_DATA, r, "unknown data segment kind")),
        };
        let len = leb128::read_u32(r)?;
        let data = r.read_bytes(len as usize)?.to_vec();
        module.data.push(DataSegment { mode, data });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Build a module from (id, payload) sections.
    fn module_bytes(sections: &[(u8, Vec<u8>)]) -> Vec<u8> {
        let mut bytes = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
        for (id, payload) in sections {
            bytes.push(*id);
            // Payloads in tests are short; a single LEB byte suffices.
            assert!(payload.len() < 0x80);
            bytes.push(payload.len() as u8);
            bytes.extend_from_slice(payload);
        }
        bytes
    }

    #[test]
    fn empty_module() {
        let m = Module::parse(&module_bytes(&[])).unwrap();
        assert_eq!(m.exports.len(), 0);
        assert_eq!(m.total_funcs(), 0);
    }

    #[test]
    fn truncated_preamble_rejected() {
        assert_eq!(
            Module::parse(&[0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00]),
            Err(DecodeError::BadPreamble)
        );
    }

    #[test]
    fn wrong_version_rejected() {
        assert!(Module::parse(&[0x00, 0x61, 0x73, 0x6D, 0x02, 0x00, 0x00, 0x00]).is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        assert!(Module::parse(&module_bytes(&[(13, vec![])])).is_err());
    }

    #[test]
    fn duplicate_section_rejected() {
        let sections = [(SEC_TYPE, vec![0x00]), (SEC_TYPE, vec![0x00])];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn out_of_order_sections_rejected() {
        let sections = [(SEC_FUNCTION, vec![0x00]), (SEC_TYPE, vec![0x00])];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn section_payload_must_match_size() {
        // A type section declaring zero entries but carrying a spare byte.
        assert!(Module::parse(&module_bytes(&[(SEC_TYPE, vec![0x00, 0xAA])])).is_err());
    }

    #[test]
    fn section_reading_stays_inside_declared_size() {
        // Type section claims one entry but the payload ends after 0x60;
        // the param-count read must fail inside the section, not spill into
        // the next one.
        let sections = [(SEC_TYPE, vec![0x01, 0x60]), (SEC_FUNCTION, vec![0x00])];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn simple_function_module() {
        // (func (param i32) (result i32) local.get 0)
        let sections = [
            (SEC_TYPE, vec![0x01, 0x60, 0x01, 0x7F, 0x01, 0x7F]),
            (SEC_FUNCTION, vec![0x01, 0x00]),
            (SEC_EXPORT, vec![0x01, 0x02, b'i', b'd', 0x00, 0x00]),
            (SEC_CODE, vec![0x01, 0x04, 0x00, 0x20, 0x00, 0x0B]),
        ];
        let m = Module::parse(&module_bytes(&sections)).unwrap();
        assert_eq!(m.total_funcs(), 1);
        assert_eq!(m.exports[0].name, "id");
    }

    #[test]
    fn code_without_function_section_rejected() {
        let sections = [(SEC_CODE, vec![0x01, 0x02, 0x00, 0x0B])];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn function_without_code_rejected() {
        let sections = [
            (SEC_TYPE, vec![0x01, 0x60, 0x00, 0x00]),
            (SEC_FUNCTION, vec![0x01, 0x00]),
        ];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn memory_page_bound_enforced() {
        // min = 65537 pages.
        let sections = [(SEC_MEMORY, vec![0x01, 0x00, 0x81, 0x80, 0x04])];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn memory_max_below_min_rejected() {
        let sections = [(SEC_MEMORY, vec![0x01, 0x01, 0x02, 0x01])];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn two_memories_rejected() {
        let sections = [(SEC_MEMORY, vec![0x02, 0x00, 0x01, 0x00, 0x01])];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn import_then_local_memory_rejected() {
        let sections = [
            (
                SEC_IMPORT,
                vec![0x01, 0x01, b'm', 0x01, b'f', 0x02, 0x00, 0x01],
            ),
            (SEC_MEMORY, vec![0x01, 0x00, 0x01]),
        ];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn start_signature_checked() {
        // Function type (param i32) cannot be a start function.
        let sections = [
            (SEC_TYPE, vec![0x01, 0x60, 0x01, 0x7F, 0x00]),
            (SEC_FUNCTION, vec![0x01, 0x00]),
            (SEC_START, vec![0x00]),
            (SEC_CODE, vec![0x01, 0x05, 0x00, 0x20, 0x00, 0x1A, 0x0B]),
        ];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn start_on_nullary_function_accepted() {
        let sections = [
            (SEC_TYPE, vec![0x01, 0x60, 0x00, 0x00]),
            (SEC_FUNCTION, vec![0x01, 0x00]),
            (SEC_START, vec![0x00]),
            (SEC_CODE, vec![0x01, 0x02, 0x00, 0x0B]),
        ];
        let m = Module::parse(&module_bytes(&sections)).unwrap();
        assert_eq!(m.start, Some(0));
    }

    #[test]
    fn global_init_type_checked() {
        // (global i32 (f32.const ...)) must reject.
        let sections = [(
            SEC_GLOBAL,
            vec![0x01, 0x7F, 0x00, 0x43, 0x00, 0x00, 0x80, 0x3F, 0x0B],
        )];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn global_init_from_imported_immutable() {
        let sections = [
            (
                SEC_IMPORT,
                vec![0x01, 0x01, b'm', 0x01, b'g', 0x03, 0x7F, 0x00],
            ),
            (SEC_GLOBAL, vec![0x01, 0x7F, 0x00, 0x23, 0x00, 0x0B]),
        ];
        let m = Module::parse(&module_bytes(&sections)).unwrap();
        assert_eq!(m.globals[0].init, crate::types::ConstExpr::GlobalGet(0));
    }

    #[test]
    fn global_init_from_defined_global_rejected() {
        let sections = [(
            SEC_GLOBAL,
            vec![
                0x01, // one entry... referencing itself
                0x7F, 0x00, 0x23, 0x00, 0x0B,
            ],
        )];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn export_index_bound_checked() {
        let sections = [(SEC_EXPORT, vec![0x01, 0x01, b'f', 0x00, 0x00])];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn duplicate_export_names_rejected() {
        let sections = [
            (SEC_MEMORY, vec![0x01, 0x00, 0x01]),
            (
                SEC_EXPORT,
                vec![0x02, 0x01, b'm', 0x02, 0x00, 0x01, b'm', 0x02, 0x00],
            ),
        ];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn element_requires_table() {
        let sections = [(
            SEC_ELEMENT,
            vec![0x01, 0x00, 0x41, 0x00, 0x0B, 0x00],
        )];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn element_function_indices_checked() {
        let sections = [
            (SEC_TABLE, vec![0x01, 0x70, 0x00, 0x01]),
            (SEC_ELEMENT, vec![0x01, 0x00, 0x41, 0x00, 0x0B, 0x01, 0x05]),
        ];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn data_count_cross_checked() {
        let sections = [
            (SEC_MEMORY, vec![0x01, 0x00, 0x01]),
            (SEC_DATA_COUNT, vec![0x02]),
            (SEC_DATA, vec![0x01, 0x00, 0x41, 0x00, 0x0B, 0x01, 0xAB]),
        ];
        assert!(Module::parse(&module_bytes(&sections)).is_err());
    }

    #[test]
    fn passive_data_accepted_without_memory() {
        let sections = [(SEC_DATA, vec![0x01, 0x01, 0x02, 0xDE, 0xAD])];
        let m = Module::parse(&module_bytes(&sections)).unwrap();
        assert_eq!(m.data[0].data, vec![0xDE, 0xAD]);
    }

    #[test]
    fn custom_sections_skipped() {
        let sections = [
            (SEC_CUSTOM, vec![0x04, b'n', b'a', b'm', b'e', 0xFF, 0xFF]),
            (SEC_TYPE, vec![0x00]),
        ];
        Module::parse(&module_bytes(&sections)).unwrap();
    }
}
