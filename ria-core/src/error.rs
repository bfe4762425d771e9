//! Error types for ria-core.
//!
//! Nothing in the core is fatal: callers get a typed error and decide how to
//! degrade (retry prompt, fallback text, empty ledger).

use thiserror::Error;

/// Input rejected before it touches the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Objective missing at save time
    #[error("mission objective is empty")]
    EmptyTitle,

    /// Value could not be interpreted for the field
    #[error("invalid value for '{field}': {value}")]
    InvalidValue { field: String, value: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, value: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Key-value persistence failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error on key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A tool call from the assistant that failed boundary validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolCallError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("unknown form field '{0}'")]
    UnknownField(String),

    #[error("malformed arguments for '{tool}': {message}")]
    BadArguments { tool: String, message: String },

    #[error(transparent)]
    Value(#[from] ValidationError),
}

/// Form state machine guard violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("form is not accepting {attempted} input while {mode}")]
    WrongMode {
        attempted: &'static str,
        mode: &'static str,
    },

    #[error("mission {0} no longer exists")]
    MissingTask(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Assistant session lifecycle errors.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("audio device unavailable: {0}")]
    Device(String),

    #[error("assistant transport failed: {0}")]
    Transport(String),

    #[error("session is not open")]
    NotOpen,

    #[error("session is already open")]
    AlreadyOpen,

    #[error(transparent)]
    Form(#[from] FormError),
}
