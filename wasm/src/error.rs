// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
use thiserror::Error;

/// Decode result.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// A structural or type error found while decoding a module.
///
/// `WebAssembly.validate` collapses every variant to `false`;
/// `WebAssembly.compile` surfaces the offending section and byte offset to
/// the embedder (scripts only ever see a generic rejection).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Ran off the end of the module, or of a declared section payload.
    #[error("module truncated at byte {0}")]
    UnexpectedEof(usize),

    /// The 8-byte `\0asm` + version prologue is missing or wrong.
    #[error("bad module preamble")]
    BadPreamble,

    /// A malformed or invalid section payload.
    #[error("{reason} (section id {section}, offset {offset})")]
    Section {
        section: u8,
        offset: usize,
        reason: &'static str,
    },

    /// A malformed or ill-typed function body.
    #[error("function {func}: {reason} (offset {offset})")]
    Body {
        func: u32,
        offset: usize,
        reason: &'static str,
    },
}

impl DecodeError {
    /// Byte offset the failure was detected at.
    pub fn offset(&self) -> usize {
        match self {
            DecodeError::UnexpectedEof(offset) => *offset,
            DecodeError::BadPreamble => 0,
            DecodeError::Section { offset, .. } => *offset,
            DecodeError::Body { offset, .. } => *offset,
        }
    }
}
