// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Engine-wide constants.

/// Size of a WebAssembly linear-memory page, in bytes.
pub const WASM_PAGE_SIZE: usize = 65536;

/// Maximum number of pages a linear memory may declare (4 GiB).
pub const WASM_MAX_PAGES: u64 = 65536;

/// Maximum nesting depth of synchronous calls before a RangeError is raised.
pub const MAX_CALL_DEPTH: u32 = 1024;

/// Number of handle registrations between opportunistic sweeps of the
/// handle manager's stale-entry table.
pub const HANDLE_CLEANUP_INTERVAL: u64 = 1024;
