// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
use crate::value::Value;

/// Execution result.
pub type Result<T> = std::result::Result<T, ExecutionError>;

/// The two error taxonomies of the engine, plus the two resource-limit
/// conditions that sit between them.
///
/// `Thrown` carries a JS-visible error value; it propagates through the
/// promise machinery as a rejection reason and is recoverable by script.
/// `Fatal` is an engine failure (heap corruption, violated invariant); the
/// context that produced it cannot be reused.
#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error("uncaught exception: {0:?}")]
    Thrown(Value),

    /// The memory limit was hit. Converted to a rejection when a promise
    /// job is on the stack, fatal otherwise.
    #[error("out of memory")]
    OutOfMemory,

    /// The execution-time limit expired; the current turn is unwound.
    #[error("execution aborted")]
    Aborted,

    #[error("fatal engine error: {0:?}")]
    Fatal(#[from] anyhow::Error),
}

impl ExecutionError {
    pub fn is_thrown(&self) -> bool {
        matches!(self, ExecutionError::Thrown(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutionError::Fatal(_))
    }

    /// The thrown value, if this is a JS-visible error.
    pub fn thrown_value(&self) -> Option<Value> {
        match self {
            ExecutionError::Thrown(value) => Some(*value),
            _ => None,
        }
    }
}

/// Classify untyped errors as fatal. Mirrors the usual pattern of tacking
/// context onto an `anyhow` chain at the boundary where a failure stops
/// being recoverable.
pub trait ClassifyResult<T> {
    fn or_fatal(self) -> Result<T>;
}

impl<T, E> ClassifyResult<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn or_fatal(self) -> Result<T> {
        self.map_err(|e| ExecutionError::Fatal(e.into()))
    }
}

/// Context chaining for fatal errors; thrown values pass through untouched.
pub trait Context<T> {
    fn context(self, msg: &'static str) -> Result<T>;
}

impl<T> Context<T> for Result<T> {
    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| match e {
            ExecutionError::Fatal(err) => ExecutionError::Fatal(err.context(msg)),
            other => other,
        })
    }
}
