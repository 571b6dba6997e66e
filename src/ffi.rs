//! The consumed FFI boundary toward the engine
//!
//! The core does not implement the engine's allocator, evaluator, or leak
//! sanitizer; it consumes a small operation set per context, abstracted here
//! as [`ForeignHeap`]. Implementations sit directly on the engine's exported
//! call surface. The contract the lifetime layer upholds against it: every
//! `duplicate` the host causes is eventually matched by exactly one
//! `release`, and no `release` happens without a prior matching reference.
//!
//! All operations take `&self`: the engine side is a single-threaded opaque
//! context and implementations use interior mutability where they track
//! state on the host side.

use std::time::{Duration, Instant};

use crate::handle::{ContextId, Handle};

/// An evaluation failure reported by the engine, before any host-side
/// translation. Distinguishable from host ownership bugs by construction.
#[derive(Debug)]
pub enum EvalError {
    /// The code threw; the handle references the exception value and must be
    /// released by the caller (the context glue adopts and disposes it).
    Exception(Handle),
    /// The interrupt handler forced early termination.
    Interrupted,
    /// The engine hit its memory limit.
    OutOfMemory,
}

/// Operations the binding layer consumes from one engine context.
pub trait ForeignHeap {
    /// The context all handles from this heap belong to.
    fn context_id(&self) -> ContextId;

    /// Increment the foreign refcount and return a new reference to the same
    /// value. Backs [`Lifetime::dup`](crate::lifetime::Lifetime::dup).
    fn duplicate(&self, handle: Handle) -> Handle;

    /// Decrement the foreign refcount; the engine frees the value when it
    /// reaches zero. Backs lifetime disposal.
    fn release(&self, handle: Handle);

    /// Outstanding host-attributable allocations. Diagnostic: leak tests
    /// assert this returns to zero after a scope or test completes.
    fn alive_count(&self) -> usize;

    /// The well-known `undefined` constant. Never individually owned.
    fn undefined(&self) -> Handle;

    /// The well-known `null` constant. Never individually owned.
    fn null(&self) -> Handle;

    /// Human-readable rendering of a value, used to turn exception handles
    /// into error messages.
    fn describe(&self, handle: Handle) -> String;

    /// Evaluate `code`. A successful result hands ownership of one new
    /// reference to the caller; so does the exception inside
    /// [`EvalError::Exception`].
    fn eval(&self, code: &str, filename: &str) -> Result<Handle, EvalError>;

    /// Structured memory report from the engine, for diagnostics.
    fn memory_usage(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Polled by the engine's execution loop during a synchronous call; returning
/// `true` forces early, defined termination, surfaced as
/// [`EngineError::Interrupted`](crate::error::EngineError::Interrupted).
pub type InterruptHandler = Box<dyn FnMut() -> bool>;

/// An interrupt handler that fires once `max_run` wall time has elapsed.
///
/// The clock starts when the handler is built, immediately before the call it
/// bounds. The core has no timers of its own; timeout semantics layer on the
/// interrupt mechanism like this.
pub fn interrupt_after(max_run: Duration) -> InterruptHandler {
    let deadline = Instant::now() + max_run;
    Box::new(move || Instant::now() >= deadline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_handler_fires_after_elapsing() {
        let mut handler = interrupt_after(Duration::ZERO);
        assert!(handler());
    }

    #[test]
    fn deadline_handler_holds_before_elapsing() {
        let mut handler = interrupt_after(Duration::from_secs(3600));
        assert!(!handler());
    }
}
