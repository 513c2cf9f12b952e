//! Fragment-level error types.

use thiserror::Error;

/// Errors produced while materializing or invoking fragment functions.
#[derive(Debug, Error, Clone)]
pub enum DslError {
    /// The fragment text failed to parse; nothing from it was loaded.
    #[error("fragment '{fragment}' failed to materialize: {message}")]
    Materialization { fragment: String, message: String },

    /// An invocation (or a `call` step) named a function that is not
    /// registered.
    #[error("function '{0}' is not defined")]
    UnknownFunction(String),

    /// Sibling `call` steps nested past the limit.
    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),

    /// A step referenced a path that does not exist in the current data.
    #[error("path '{0}' not found in data")]
    PathMissing(String),

    /// A path could not be written because an intermediate segment is not
    /// an object.
    #[error("path '{0}' cannot be assigned")]
    PathUnassignable(String),

    /// A `math` operand did not resolve to a number.
    #[error("math operand at '{0}' is not a number")]
    NotANumber(String),

    /// Integer arithmetic overflowed or produced a non-finite float.
    #[error("arithmetic error in '{0}' step")]
    Arithmetic(&'static str),

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// An explicit `fail` step was executed.
    #[error("{0}")]
    Failed(String),
}
