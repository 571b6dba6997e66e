//! Context glue: engine operations in, owned lifetimes out
//!
//! [`VmContext`] is where raw engine handles cross into host ownership. Every
//! operation that returns a new or referenced engine value hands back a
//! [`Lifetime`] wired so that disposal releases the foreign reference and
//! `dup` duplicates it. The context is cheaply cloneable (shared inner,
//! single-threaded) so dual-mode bodies can carry it across suspension
//! points.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::EngineError;
use crate::ffi::{EvalError, ForeignHeap, InterruptHandler};
use crate::handle::{ContextId, Handle};
use crate::lifetime::Lifetime;
use crate::maybe_async::{MaybeAsync, maybe_async};

struct ContextInner<H> {
    heap: H,
    interrupt: RefCell<Option<InterruptHandler>>,
}

/// Host-side view of one engine execution context.
pub struct VmContext<H: ForeignHeap> {
    inner: Rc<ContextInner<H>>,
}

impl<H: ForeignHeap> Clone for VmContext<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: ForeignHeap + 'static> VmContext<H> {
    pub fn new(heap: H) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                heap,
                interrupt: RefCell::new(None),
            }),
        }
    }

    pub fn id(&self) -> ContextId {
        self.inner.heap.context_id()
    }

    /// Direct access to the underlying heap operations.
    pub fn heap(&self) -> &H {
        &self.inner.heap
    }

    /// Take host ownership of one engine reference.
    ///
    /// The returned lifetime releases the reference on disposal and
    /// duplicates it (a foreign refcount increment) on `dup`.
    ///
    /// Panics if the handle belongs to a different context; handles are not
    /// valid across contexts and adopting a foreign one is an ownership bug,
    /// not a recoverable condition.
    pub fn adopt(&self, handle: Handle) -> Lifetime<Handle> {
        assert_eq!(
            handle.context(),
            self.id(),
            "handle adopted into the wrong context"
        );
        let dup_ctx = self.clone();
        let release_ctx = self.clone();
        Lifetime::duplicable(
            handle,
            move |h| dup_ctx.inner.heap.duplicate(*h),
            move |h| release_ctx.inner.heap.release(h),
        )
        .with_owner(self.id())
    }

    /// The engine's `undefined`, as a non-owning lifetime. Disposal is a
    /// no-op: the constant is never individually owned.
    pub fn undefined(&self) -> Lifetime<Handle> {
        Lifetime::constant(self.inner.heap.undefined()).with_owner(self.id())
    }

    /// The engine's `null`, as a non-owning lifetime.
    pub fn null(&self) -> Lifetime<Handle> {
        Lifetime::constant(self.inner.heap.null()).with_owner(self.id())
    }

    /// Evaluate `code`, translating an engine exception into
    /// [`EngineError::Exception`]: the exception handle is adopted, rendered
    /// to a message, and released before the error is returned, so failure
    /// paths leak nothing.
    pub fn eval_code(&self, code: &str, filename: &str) -> Result<Lifetime<Handle>, EngineError> {
        match self.inner.heap.eval(code, filename) {
            Ok(handle) => Ok(self.adopt(handle)),
            Err(EvalError::Exception(exception)) => {
                let message = self
                    .adopt(exception)
                    .consume(|e| self.inner.heap.describe(e.value()));
                Err(EngineError::Exception(message))
            }
            Err(EvalError::Interrupted) => Err(EngineError::Interrupted),
            Err(EvalError::OutOfMemory) => Err(EngineError::OutOfMemory),
        }
    }

    /// Load and compile a module through a host loader that may or may not
    /// be asynchronous.
    ///
    /// With a ready source the whole call completes in the caller's frame;
    /// with a pending one it returns a pending result that compiles once the
    /// source arrives. Either way the compiled module comes back as an owned
    /// lifetime and loader failures propagate unchanged.
    pub fn load_module<L>(
        &self,
        name: &str,
        loader: L,
    ) -> MaybeAsync<Result<Lifetime<Handle>, EngineError>>
    where
        L: FnOnce(&str) -> MaybeAsync<Result<String, EngineError>>,
    {
        let source = loader(name);
        let ctx = self.clone();
        let filename = name.to_string();
        maybe_async(async move {
            let code = source.await?;
            ctx.eval_code(&code, &filename)
        })
    }

    /// Install the handler the engine polls during synchronous execution.
    /// Replaces any previous handler.
    pub fn set_interrupt_handler(&self, handler: InterruptHandler) {
        *self.inner.interrupt.borrow_mut() = Some(handler);
    }

    /// Remove the interrupt handler; execution becomes unbounded again.
    pub fn clear_interrupt_handler(&self) {
        *self.inner.interrupt.borrow_mut() = None;
    }

    /// Engine-facing: poll the host interrupt handler. `false` when none is
    /// installed.
    pub fn should_interrupt(&self) -> bool {
        match self.inner.interrupt.borrow_mut().as_mut() {
            Some(handler) => handler(),
            None => false,
        }
    }

    /// Outstanding host-attributable engine allocations. Zero after every
    /// lifetime from this context has been disposed.
    pub fn alive_count(&self) -> usize {
        self.inner.heap.alive_count()
    }

    /// Structured engine memory report.
    pub fn memory_usage(&self) -> serde_json::Value {
        self.inner.heap.memory_usage()
    }
}
