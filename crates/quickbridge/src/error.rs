//! Error types for the bridge

use std::fmt;

use rquickjs::{Ctx, Exception};

/// Result type for bridge calls
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Raise a script-visible exception carrying `err`.
///
/// Returns the engine error to propagate out of the native call; the
/// evaluation terminates with the exception unless script code catches it.
pub fn throw<'js>(ctx: &Ctx<'js>, err: impl fmt::Display) -> rquickjs::Error {
    Exception::throw_message(ctx, &err.to_string())
}

/// Bridge error types
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A script threw an exception that was not caught by script code
    #[error("{0}")]
    Exception(String),

    /// The engine failed outside of script-visible exception flow
    #[error("engine error: {0}")]
    Engine(String),

    /// Type mismatch during conversion
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Invalid argument
    #[error("argument error: {0}")]
    Argument(String),

    /// Invalid compatibility mode name at runtime construction
    #[error("invalid compatibility mode \"{value}\". Use: {valid}")]
    InvalidCompatibilityMode {
        /// The rejected mode name
        value: String,
        /// Comma-separated list of accepted names
        valid: String,
    },

    /// A shared-object factory failed
    #[error("shared object \"{name}\": {message}")]
    Shared {
        /// Logical name of the shared entry
        name: String,
        /// Failure description
        message: String,
    },

    /// The carried context was cancelled
    #[error("context cancelled")]
    Cancelled,

    /// Catch-all for module-level failures
    #[error("{0}")]
    Message(String),
}

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::Message(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::Message(s.to_string())
    }
}

impl From<rquickjs::Error> for BridgeError {
    fn from(e: rquickjs::Error) -> Self {
        BridgeError::Engine(e.to_string())
    }
}
