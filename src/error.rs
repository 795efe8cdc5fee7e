//! The error taxonomy surfaced by handle operations and pipelines.
//!
//! Validation errors are raised eagerly at the handle boundary and never
//! mutate the output reference. Execution errors (an empty scalar used as an
//! operator input, a panic inside a pipeline stage) are deferred to the first
//! materializing call — `extract_element`, `extract_tuples`, any reduction, or
//! `wait(Materialize)` — and propagate out of that call.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything a handle operation or a materialization can report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// An object was used before `new` gave it a shape.
    #[error("uninitialized object")]
    UninitializedObject,

    /// A required argument was absent.
    #[error("null pointer")]
    NullPointer,

    /// A value argument is outside its legal domain (e.g. duplicate build
    /// coordinates without a dup operator, a negative dimension).
    #[error("invalid value")]
    InvalidValue,

    /// An index list is malformed (stray negative entry, bad sentinel).
    #[error("invalid index")]
    InvalidIndex,

    /// Operator and operand element domains do not line up.
    #[error("domain mismatch")]
    DomainMismatch,

    /// Operand shapes do not line up.
    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch {
        /// Shape of the left-hand operand, rendered `rows x cols` or `len`.
        left: String,
        /// Shape of the right-hand operand.
        right: String,
    },

    /// `build` was called on a non-empty container.
    #[error("output not empty")]
    OutputNotEmpty,

    /// `extract_element` found no stored entry at the coordinate.
    #[error("no value at coordinate")]
    NoValue,

    /// A coordinate lies outside the container bounds.
    #[error("index {index} out of bounds (bound {bound})")]
    IndexOutOfBounds {
        /// The offending coordinate.
        index: i64,
        /// The exclusive bound it violated.
        bound: i64,
    },

    /// An empty scalar was consumed as an operator input.
    #[error("empty object used as operator input")]
    EmptyObject,

    /// The operation is recognized but not provided by this build.
    #[error("not implemented")]
    NotImplemented,

    /// A user operator or a pipeline stage panicked; the message is the
    /// payload when it was a string.
    #[error("worker panic: {0}")]
    Panic(String),

    /// An allocation failed inside a pipeline.
    #[error("out of memory")]
    OutOfMemory,
}

impl Error {
    pub(crate) fn dims(left: impl std::fmt::Display, right: impl std::fmt::Display) -> Self {
        Error::DimensionMismatch {
            left: left.to_string(),
            right: right.to_string(),
        }
    }
}
