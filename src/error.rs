//! Error types.
//!
//! Per-row and per-filter problems are never errors: they are logged and the
//! row or filter is skipped. What remains here is configuration that makes an
//! engine impossible to build, formula parse/evaluation failures (which the
//! calculated-column stage downgrades to `0`), and data-service failures.

use thiserror::Error;

/// Fatal configuration errors raised while building a [`crate::ViewEngine`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("no record store was supplied")]
    MissingStore,

    #[error("no column registry was supplied")]
    MissingColumns,

    #[error("column '{0}' is registered more than once")]
    DuplicateColumn(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Errors produced by the formula language used by calculated columns.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    #[error("unexpected character '{0}' at {1}")]
    UnexpectedChar(char, usize),

    #[error("unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("formula evaluated to NaN")]
    NotANumber,
}

/// Failures reported by (or while talking to) the data service.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ServiceError {
    /// The service answered with a non-success code.
    #[error("query failed with code {code}: {message}")]
    Failed { code: i64, message: String },

    /// The transport or service implementation failed before answering.
    #[error("query transport error: {0}")]
    Transport(String),

    /// The response could not be understood.
    #[error("malformed service response: {0}")]
    Malformed(String),
}
