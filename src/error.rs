//! Error types for the binding layer
//!
//! Two families, deliberately kept apart:
//! - [`LifetimeError`]: host-side ownership bugs (use-after-dispose, dup of a
//!   non-duplicable value). These indicate the invariant system was violated
//!   and are never swallowed.
//! - [`EngineError`]: failures reported by the engine itself (exceptions,
//!   interruption, memory limits). These are ordinary recoverable results at
//!   the call boundary and never corrupt host state.

use std::fmt;

/// Host-side ownership errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifetimeError {
    /// Accessed the value of a lifetime that was already disposed.
    UsingDisposed,
    /// Called `dup()` on a lifetime constructed without a copier.
    NotDuplicable,
}

impl fmt::Display for LifetimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifetimeError::UsingDisposed => write!(f, "using disposed value"),
            LifetimeError::NotDuplicable => write!(f, "lifetime value is not duplicable"),
        }
    }
}

impl std::error::Error for LifetimeError {}

/// Failures reported by the engine across the FFI boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The evaluated code threw; the exception was dumped to a message and
    /// its handle already released.
    Exception(String),
    /// The host interrupt handler forced early termination of a call.
    Interrupted,
    /// The engine hit its memory limit.
    OutOfMemory,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Exception(msg) => write!(f, "engine exception: {}", msg),
            EngineError::Interrupted => write!(f, "execution interrupted by host"),
            EngineError::OutOfMemory => write!(f, "engine out of memory"),
        }
    }
}

impl std::error::Error for EngineError {}
