// Copyright 2023-2026 AeroJS Contributors
// SPDX-License-Identifier: Apache-2.0, MIT
use std::fmt;

use thiserror::Error;

/// The subkind of a JS-visible error value.
///
/// These are recoverable by script (`catch`, `Promise.prototype.catch`);
/// they are distinct from engine failures, which abort the context and are
/// represented as fatal errors in the `aerojs` crate.
#[repr(u32)]
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash, Error)]
pub enum ErrorKind {
    /// Operating on a value of an incompatible kind.
    Type = 1,

    /// A name could not be resolved in the scope chain.
    Reference = 2,

    /// Source text rejected by the parser (or re-entered through eval).
    Syntax = 3,

    /// A numeric domain violation (array length, typed-array range, wasm
    /// descriptor limits).
    Range = 4,

    /// Malformed URI component handling.
    Uri = 5,

    /// Reserved legacy kind; never raised by the engine itself.
    Eval = 6,

    /// A composite failure carrying an `errors` array (`Promise.any`).
    Aggregate = 7,
}

impl ErrorKind {
    /// The `name` property of the corresponding error prototype.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Type => "TypeError",
            ErrorKind::Reference => "ReferenceError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Range => "RangeError",
            ErrorKind::Uri => "URIError",
            ErrorKind::Eval => "EvalError",
            ErrorKind::Aggregate => "AggregateError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn names_match_prototypes() {
        assert_eq!(ErrorKind::Type.name(), "TypeError");
        assert_eq!(ErrorKind::Aggregate.name(), "AggregateError");
        assert_eq!(ErrorKind::Uri.to_string(), "URIError");
    }
}
