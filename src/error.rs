//! Error taxonomy shared by the whole crate.
//!
//! Shape and precondition violations are detected eagerly at the boundary of
//! each operation; nothing is silently truncated or coerced. Failure to
//! converge is *not* an error: the CG solver reports it through its
//! diagnostics and returns the best-effort iterate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed plan or options: invalid grid shape, frequency points
    /// outside [-π, π], non-positive tolerances, and the like.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Operation invoked before required setup, or setup attempted twice.
    #[error("invalid operation order: {0}")]
    State(String),

    /// Array dimensions do not match what the operation requires.
    #[error("shape mismatch: {0}")]
    Shape(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self { Error::Configuration(msg.into()) }
    pub(crate) fn state (msg: impl Into<String>) -> Self { Error::State        (msg.into()) }
    pub(crate) fn shape (msg: impl Into<String>) -> Self { Error::Shape        (msg.into()) }
}
