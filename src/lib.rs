//! Host-side binding layer for an embedded script engine
//!
//! The engine runs as a sandboxed module with its own manually-managed heap;
//! this crate owns the host half of that relationship:
//!
//! - [`Lifetime`]/[`Scope`]: single-release ownership over engine handles,
//!   with guaranteed cleanup on every exit path and refcount mirroring for
//!   duplicated references.
//! - [`maybe_async`]: one body that calls into the engine runs fully
//!   synchronously when nothing it awaits is pending, and asynchronously
//!   otherwise - the mode is chosen per invocation, at run time.
//! - [`VmContext`]: the glue that turns raw engine operations into owned
//!   lifetimes, translates engine failures into typed errors, and wires host
//!   interrupt handlers into the engine's execution loop.
//!
//! The engine's evaluator, GC, and call-signature marshalling live on the far
//! side of the [`ForeignHeap`] trait; this crate consumes them, it does not
//! implement them. Everything here is single-threaded by contract - the
//! engine heap is not safe for concurrent access, and "async" means deferred
//! continuations on one thread.

pub mod context;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod lifetime;
pub mod maybe_async;
pub mod scope;
pub mod testing;

#[cfg(test)]
mod tests;

pub use context::VmContext;
pub use error::{EngineError, LifetimeError};
pub use ffi::{EvalError, ForeignHeap, InterruptHandler, interrupt_after};
pub use handle::{ContextId, Handle};
pub use lifetime::{Lifetime, LifetimeId};
pub use maybe_async::{MaybeAsync, maybe_async};
pub use scope::{AsyncScope, Scope, with_scope_maybe_async};
