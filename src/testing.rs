//! Test doubles for the engine boundary
//!
//! Bindings built on this crate need to test ownership discipline without a
//! real engine build. [`CountingHeap`] is an in-process [`ForeignHeap`] that
//! mirrors the engine's refcount/allocation accounting: leak tests assert
//! [`alive_count`](ForeignHeap::alive_count) returns to zero, exactly like
//! the sanitizer checks against the real module.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;

use crate::ffi::{EvalError, ForeignHeap};
use crate::handle::{ContextId, Handle};
use crate::maybe_async::MaybeAsync;

struct Slot {
    refcount: u32,
    description: String,
}

/// An in-memory refcounting heap standing in for one engine context.
///
/// `eval` is deliberately tiny: code starting with `"throw "` produces an
/// engine exception whose message is the remainder, the exact string
/// `"interrupt"` reports interruption, `"oom"` reports memory exhaustion,
/// and anything else allocates a slot described by the code itself.
pub struct CountingHeap {
    ctx: ContextId,
    slots: RefCell<HashMap<usize, Slot>>,
    next_addr: RefCell<usize>,
}

impl CountingHeap {
    pub fn new(ctx: ContextId) -> Self {
        Self {
            ctx,
            slots: RefCell::new(HashMap::new()),
            next_addr: RefCell::new(0x1000),
        }
    }

    /// Allocate a fresh slot with refcount one and hand the caller its
    /// reference, exactly as an engine constructor would.
    pub fn alloc(&self, description: &str) -> Handle {
        let mut next = self.next_addr.borrow_mut();
        let addr = *next;
        *next += 8;
        self.slots.borrow_mut().insert(
            addr,
            Slot {
                refcount: 1,
                description: description.to_string(),
            },
        );
        Handle::new(addr, self.ctx)
    }

    /// The refcount of one slot, for assertions. Zero if freed.
    pub fn refcount(&self, handle: Handle) -> u32 {
        self.slots
            .borrow()
            .get(&handle.addr())
            .map_or(0, |slot| slot.refcount)
    }

    fn check_context(&self, handle: Handle) {
        assert_eq!(
            handle.context(),
            self.ctx,
            "handle used with the wrong heap"
        );
    }
}

impl ForeignHeap for CountingHeap {
    fn context_id(&self) -> ContextId {
        self.ctx
    }

    fn duplicate(&self, handle: Handle) -> Handle {
        self.check_context(handle);
        let mut slots = self.slots.borrow_mut();
        let slot = slots
            .get_mut(&handle.addr())
            .expect("duplicate of a freed slot");
        slot.refcount += 1;
        handle
    }

    fn release(&self, handle: Handle) {
        self.check_context(handle);
        let mut slots = self.slots.borrow_mut();
        let slot = slots
            .get_mut(&handle.addr())
            .expect("release of a freed slot");
        slot.refcount -= 1;
        if slot.refcount == 0 {
            slots.remove(&handle.addr());
        }
    }

    fn alive_count(&self) -> usize {
        self.slots.borrow().len()
    }

    fn undefined(&self) -> Handle {
        // Constants live outside the allocation counter, like the engine's
        // statically allocated singletons.
        Handle::new(0x10, self.ctx)
    }

    fn null(&self) -> Handle {
        Handle::new(0x18, self.ctx)
    }

    fn describe(&self, handle: Handle) -> String {
        self.check_context(handle);
        self.slots
            .borrow()
            .get(&handle.addr())
            .map_or_else(|| String::from("<freed>"), |slot| slot.description.clone())
    }

    fn eval(&self, code: &str, _filename: &str) -> Result<Handle, EvalError> {
        if let Some(message) = code.strip_prefix("throw ") {
            return Err(EvalError::Exception(self.alloc(message)));
        }
        match code {
            "interrupt" => Err(EvalError::Interrupted),
            "oom" => Err(EvalError::OutOfMemory),
            _ => Ok(self.alloc(code)),
        }
    }

    fn memory_usage(&self) -> serde_json::Value {
        serde_json::json!({
            "alive": self.alive_count(),
            "next_addr": *self.next_addr.borrow(),
        })
    }
}

/// A pending [`MaybeAsync`] plus the sender that settles it, for exercising
/// the asynchronous half of dual-mode bodies.
pub fn deferred<T: 'static>() -> (tokio::sync::oneshot::Sender<T>, MaybeAsync<T>) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    (
        tx,
        MaybeAsync::pending(async move { rx.await.expect("deferred value dropped unsent") }),
    )
}

/// Run a pending computation to completion on a fresh single-threaded
/// runtime. Sync-mode assertions should use
/// [`MaybeAsync::into_ready`] instead.
pub fn block_on<T>(future: impl Future<Output = T>) -> T {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("build test runtime")
        .block_on(future)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_dup_release_mirror_refcounts() {
        let heap = CountingHeap::new(ContextId(9));
        let handle = heap.alloc("value");
        assert_eq!(heap.refcount(handle), 1);

        heap.duplicate(handle);
        assert_eq!(heap.refcount(handle), 2);

        heap.release(handle);
        assert_eq!(heap.refcount(handle), 1);
        heap.release(handle);
        assert_eq!(heap.refcount(handle), 0);
        assert_eq!(heap.alive_count(), 0);
    }

    #[test]
    fn deferred_settles_through_the_sender() {
        let (tx, value) = deferred();
        assert!(value.is_pending());
        tx.send(5).unwrap();
        assert_eq!(block_on(value), 5);
    }
}
