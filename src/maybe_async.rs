//! Dual-mode execution: one body, sync or async, chosen at run time
//!
//! Engine operations whose bodies call back into host code that *might* be
//! asynchronous (module loading, host functions doing I/O) are written once
//! against [`MaybeAsync`] values and driven by [`maybe_async`]. The driver
//! polls the body a single time in the caller's frame:
//!
//! - If no awaited value was pending, the body runs to completion right there
//!   and the caller gets a plain value - a fully synchronous call stack with
//!   no scheduling overhead.
//! - The moment an awaited value turns out to be pending, the invocation
//!   switches to asynchronous for good: the caller gets back the suspended
//!   remainder as a future and drives it under whatever executor it likes.
//!
//! The selected mode is an artifact of scheduling, never of semantics: given
//! the same inputs with the same pending/ready status, both modes produce the
//! same output and the same disposal side effects. Effects sequenced before a
//! suspension point are committed before control yields; effects after it run
//! only once the awaited value has settled.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// A value that is either already available or still pending.
///
/// Bodies request "maybe pending" inputs by awaiting a `MaybeAsync` directly:
/// a ready value resolves in the same call frame without suspending, a
/// pending one suspends the body (and thereby flips the whole invocation to
/// asynchronous). This is also the type [`maybe_async`] returns, since the
/// overall call is itself a maybe-pending value to *its* caller.
pub struct MaybeAsync<T> {
    state: State<T>,
}

enum State<T> {
    /// Consumed exactly once, on poll.
    Ready(Option<T>),
    /// The engine heap is single-threaded; computations never cross threads,
    /// so the suspended remainder is a local (non-`Send`) future.
    Pending(Pin<Box<dyn Future<Output = T>>>),
}

impl<T> MaybeAsync<T> {
    /// An already-available value. Awaiting it never suspends.
    pub fn ready(value: T) -> Self {
        Self {
            state: State::Ready(Some(value)),
        }
    }

    /// A value that must be produced by `future`. Awaiting it suspends until
    /// the future settles.
    pub fn pending(future: impl Future<Output = T> + 'static) -> Self {
        Self {
            state: State::Pending(Box::pin(future)),
        }
    }

    /// Whether obtaining the value requires suspension.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, State::Pending(_))
    }

    /// The value, if it is already available. Pending computations are
    /// returned untouched in the error position.
    pub fn into_ready(self) -> Option<T> {
        match self.state {
            State::Ready(value) => value,
            State::Pending(_) => None,
        }
    }
}

impl<T> Future for MaybeAsync<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        // No field is structurally pinned: ready values are moved out and the
        // pending remainder is pinned behind its own box.
        let this = unsafe { self.get_unchecked_mut() };
        match &mut this.state {
            State::Ready(slot) => match slot.take() {
                Some(value) => Poll::Ready(value),
                None => panic!("MaybeAsync polled after completion"),
            },
            State::Pending(future) => future.as_mut().poll(cx),
        }
    }
}

impl<T> fmt::Debug for MaybeAsync<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Ready(_) => f.write_str("MaybeAsync::Ready"),
            State::Pending(_) => f.write_str("MaybeAsync::Pending"),
        }
    }
}

/// Drive `body` as far as it can go without suspending.
///
/// Returns [`MaybeAsync::ready`] with the final value when every awaited
/// input was already available, otherwise the suspended remainder as
/// [`MaybeAsync::pending`]. Failures follow the same split with `Result`
/// bodies: a synchronous failure comes back as `ready(Err(..))` - a plain
/// error in the caller's frame - and an asynchronous one settles the pending
/// computation with the identical error value.
pub fn maybe_async<T>(body: impl Future<Output = T> + 'static) -> MaybeAsync<T> {
    let mut future = Box::pin(body);
    let mut cx = Context::from_waker(Waker::noop());
    match future.as_mut().poll(&mut cx) {
        Poll::Ready(value) => MaybeAsync::ready(value),
        // A pending source saw only the no-op waker; that wakeup may be lost,
        // but executors poll a freshly awaited future at least once, and
        // sources re-register the real waker on that poll.
        Poll::Pending => MaybeAsync {
            state: State::Pending(future),
        },
    }
}
