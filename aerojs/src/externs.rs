// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
//! Host-supplied hooks. The parser and interpreter live outside this core;
//! the context calls back through this trait for everything it does not own
//! itself.

use crate::context::Context;
use crate::error::{ExecutionError, Result};
use crate::value::{ObjRef, Value};

/// The embedder's side of the engine.
///
/// Every method has a default: rejections are logged, evaluation reports
/// that no interpreter tier is attached. Hosts override what they provide.
pub trait Externs {
    /// A promise was still rejected with no handler when the microtask
    /// queue ran dry. The default logs and continues; it must not throw.
    fn unhandled_rejection(&mut self, ctx: &mut Context, promise: ObjRef, reason: Value) {
        log::warn!(
            "unhandled promise rejection ({promise}): {}",
            ctx.display_value(reason)
        );
    }

    /// Sink for `console`-style engine debugging output.
    fn debug_log(&mut self, message: &str) {
        log::debug!("{message}");
    }

    /// Resolve an import specifier to module source text.
    fn resolve_module(&mut self, specifier: &str) -> anyhow::Result<String> {
        anyhow::bail!("no module loader attached (specifier {specifier:?})")
    }

    /// Evaluate script source in the context. The engine core ships without
    /// the parser/interpreter tier, so the default refuses.
    fn evaluate_script(
        &mut self,
        _ctx: &mut Context,
        _source: &str,
        filename: &str,
    ) -> Result<Value> {
        Err(ExecutionError::Fatal(anyhow::anyhow!(
            "no evaluator attached (script {filename:?})"
        )))
    }

    /// Evaluate module source in the context. Same default as scripts.
    fn evaluate_module(
        &mut self,
        _ctx: &mut Context,
        _source: &str,
        filename: &str,
    ) -> Result<Value> {
        Err(ExecutionError::Fatal(anyhow::anyhow!(
            "no evaluator attached (module {filename:?})"
        )))
    }
}

/// Hook set that accepts every default. What tests run with.
#[derive(Debug, Default)]
pub struct NoopExterns;

impl Externs for NoopExterns {}
