//! Disposal manifests: scoped acquisition, guaranteed release
//!
//! A [`Scope`] never owns resources; it holds disposal *obligations* for the
//! lifetimes registered with [`manage`](Scope::manage) and guarantees that
//! every still-alive one is disposed when the controlling block exits, by any
//! path. Sweep order is reverse registration order, so resources built on top
//! of earlier ones are released before their dependencies.
//!
//! Sweep failure policy: every remaining entry gets a disposal attempt even
//! if an earlier disposer panics; the first panic payload is re-raised once
//! the sweep has finished. A sweep that runs while the thread is already
//! unwinding attempts everything and raises nothing.

use std::any::Any;
use std::cell::RefCell;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::Rc;

use crate::lifetime::{DisposeHook, Lifetime, LifetimeId};
use crate::maybe_async::{MaybeAsync, maybe_async};

struct Entry {
    id: LifetimeId,
    hook: Rc<dyn DisposeHook>,
}

/// A collection of lifetimes guaranteed to be released when the scope's
/// controlling block exits.
#[derive(Default)]
pub struct Scope {
    entries: Vec<Entry>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `lifetime` for disposal at scope end and hand it back
    /// unchanged, so registration composes with construction:
    ///
    /// ```ignore
    /// let handle = scope.manage(ctx.adopt(raw));
    /// ```
    pub fn manage<T: 'static>(&mut self, lifetime: Lifetime<T>) -> Lifetime<T> {
        self.entries.push(Entry {
            id: lifetime.id(),
            hook: lifetime.hook(),
        });
        lifetime
    }

    /// Number of obligations currently registered.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run `body` with a fresh scope, then dispose every managed lifetime
    /// that is still alive, in reverse registration order. Cleanup runs on
    /// the panic path too, before the panic continues to the caller.
    pub fn with_scope<R>(body: impl FnOnce(&mut Scope) -> R) -> R {
        let mut scope = Scope::new();
        let result = body(&mut scope);
        scope.sweep(None);
        result
    }

    /// Like [`with_scope`](Self::with_scope), but the lifetime `body`
    /// returns escapes the sweep: its disposal obligation is dropped and
    /// ownership transfers to the caller. The returned lifetime is matched
    /// by identity, so returning an unmanaged lifetime simply sweeps
    /// everything that was managed.
    pub fn with_scope_keep<T: 'static>(
        body: impl FnOnce(&mut Scope) -> Lifetime<T>,
    ) -> Lifetime<T> {
        let mut scope = Scope::new();
        let kept = body(&mut scope);
        scope.sweep(Some(kept.id()));
        kept
    }

    /// Dispose all remaining obligations, newest first, skipping `keep`.
    fn sweep(&mut self, keep: Option<LifetimeId>) {
        if let Some(payload) = self.sweep_collecting(keep) {
            resume_unwind(payload);
        }
    }

    fn sweep_collecting(&mut self, keep: Option<LifetimeId>) -> Option<Box<dyn Any + Send>> {
        let mut first_panic = None;
        while let Some(entry) = self.entries.pop() {
            if Some(entry.id) == keep {
                continue;
            }
            if !entry.hook.is_alive() {
                continue;
            }
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| entry.hook.dispose())) {
                first_panic.get_or_insert(payload);
            }
        }
        first_panic
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        // Reached with entries only when the body panicked before the
        // explicit sweep; attempt everything, raise nothing new.
        let payload = self.sweep_collecting(None);
        if let Some(payload) = payload {
            if !std::thread::panicking() {
                resume_unwind(payload);
            }
        }
    }
}

/// A scope that can be carried across suspension points of a dual-mode
/// computation. Cloning shares the same manifest.
#[derive(Clone, Default)]
pub struct AsyncScope {
    inner: Rc<RefCell<Scope>>,
}

impl AsyncScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// See [`Scope::manage`].
    pub fn manage<T: 'static>(&self, lifetime: Lifetime<T>) -> Lifetime<T> {
        self.inner.borrow_mut().manage(lifetime)
    }

    fn sweep(&self) {
        self.inner.borrow_mut().sweep(None);
    }
}

/// Dual-mode [`Scope::with_scope`]: runs a body that may await pending
/// values, sweeping the scope once the body settles - in the caller's frame
/// when nothing was pending, otherwise when the returned computation
/// completes. A body that is dropped mid-flight is still swept, through the
/// scope's drop.
pub fn with_scope_maybe_async<T, Fut, F>(body: F) -> MaybeAsync<T>
where
    T: 'static,
    Fut: Future<Output = T> + 'static,
    F: FnOnce(AsyncScope) -> Fut,
{
    let scope = AsyncScope::new();
    let guard = scope.clone();
    let fut = body(scope);
    maybe_async(async move {
        let out = fut.await;
        guard.sweep();
        out
    })
}
