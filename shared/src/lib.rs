// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Types shared between the AeroJS engine core and the WebAssembly loader.
//!
//! This crate is deliberately small: it carries the JS-visible error
//! taxonomy, the handful of state enums that appear on both sides of the
//! engine/loader boundary, and engine-wide constants. Anything that needs
//! the heap lives in the `aerojs` crate instead.

pub mod error;
pub mod options;
pub mod sys;

pub use error::ErrorKind;
pub use options::{GcStrategy, Generation, PromiseState};
