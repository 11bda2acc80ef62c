//! Error types.
//!
//! Two layers, matching the two halves of the crate:
//!
//! - [`GrammarError`]: problems with grammar *content* (unresolvable or ambiguous
//!   references, undefined imports, cycles, unreadable sources). Raised by linking,
//!   simplification, import loading and, for cycles only, by the matcher.
//! - [`RecognizerError`]: problems with the *lifecycle* (an operation requested in
//!   an incompatible engine state, unknown grammars, snapshot encoding). Grammar
//!   errors surface through it unchanged.
//!
//! A failed match is never an error: it is an empty parse list.

use crate::recognizer::EngineState;
use thiserror::Error;

/// Result type for grammar-level operations.
pub type GrammarResult<T> = Result<T, GrammarError>;

/// Result type for recognizer operations.
pub type RecognizerResult<T> = Result<T, RecognizerError>;

#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("unresolvable rule reference {reference} in grammar {grammar}")]
    Unresolved { grammar: String, reference: String },

    #[error("ambiguous reference {reference} in grammar {grammar} to {}", .candidates.join(" and "))]
    Ambiguous { grammar: String, reference: String, candidates: Vec<String> },

    #[error("undefined grammar {import} imported in {grammar}")]
    UndefinedImport { grammar: String, import: String },

    #[error("badly formed rule name '{name}'")]
    MalformedName { name: String },

    #[error("unknown rule <{rule}> in grammar {grammar}")]
    UnknownRule { grammar: String, rule: String },

    #[error("cyclic rule reference: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("grammar source '{source_name}': {message}")]
    Source { source_name: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GrammarError {
    pub fn unresolved(grammar: impl Into<String>, reference: impl ToString) -> Self {
        Self::Unresolved { grammar: grammar.into(), reference: reference.to_string() }
    }

    pub fn unknown_rule(grammar: impl Into<String>, rule: impl Into<String>) -> Self {
        Self::UnknownRule { grammar: grammar.into(), rule: rule.into() }
    }

    pub fn malformed(name: impl Into<String>) -> Self {
        Self::MalformedName { name: name.into() }
    }

    pub fn source(source_name: impl Into<String>, message: impl ToString) -> Self {
        Self::Source { source_name: source_name.into(), message: message.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("invalid engine state for {operation}: current state {current:?}")]
    IllegalState { operation: &'static str, current: EngineState },

    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error("unknown grammar '{0}'")]
    UnknownGrammar(String),

    #[error("grammar '{0}' already exists")]
    DuplicateGrammar(String),

    #[error("result {id} is already finalized")]
    ResultState { id: u64 },

    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] bincode::Error),
}

impl RecognizerError {
    pub fn illegal_state(operation: &'static str, current: EngineState) -> Self {
        Self::IllegalState { operation, current }
    }
}
