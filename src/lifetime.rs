//! Single-release ownership wrappers for engine resources
//!
//! A [`Lifetime`] pairs a value (usually a [`Handle`](crate::handle::Handle),
//! but generically anything disposable) with the obligation to release it
//! exactly once. The engine heap has no visibility into host liveness, so
//! release is never left to garbage collection: it happens on explicit
//! `dispose`, on `consume`, at scope sweep, or - as a last resort - when the
//! final holder of the lifetime is dropped.
//!
//! Invariants:
//! - The value is accessible only while alive; access after disposal fails
//!   fast, never returns a stale value.
//! - `dispose()` is idempotent. The disposer runs at most once.
//! - `dup()` creates an independent sibling over the same refcounted resource
//!   by invoking the copier (a refcount increment on the engine side). The
//!   siblings dispose independently; the resource is freed when the last one
//!   goes.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::LifetimeError;
use crate::handle::ContextId;

/// Identity of one lifetime, unique for the life of the process.
///
/// Scopes use this to recognize a lifetime returned out of a scope body by
/// identity rather than by type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LifetimeId(u64);

fn next_id() -> LifetimeId {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    LifetimeId(NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Duplication hook: performs the engine-side refcount increment and returns
/// the new reference. Shared by all siblings produced through `dup()`.
pub type Copier<T> = Rc<dyn Fn(&T) -> T>;

/// Release hook: performs the engine-side refcount decrement. Shared by all
/// siblings; each sibling invokes it exactly once, with its own reference.
pub type Disposer<T> = Rc<dyn Fn(T)>;

struct Inner<T> {
    /// Present iff the lifetime is alive. Taken exactly once on disposal.
    value: Option<T>,
    copier: Option<Copier<T>>,
    disposer: Option<Disposer<T>>,
    /// Diagnostic back-reference; never used for ownership transfer.
    owner: Option<ContextId>,
    /// Static lifetimes wrap well-known constants and never release anything;
    /// dispose is a no-op and they stay alive forever.
    is_static: bool,
}

impl<T> Inner<T> {
    fn alive(&self) -> bool {
        self.value.is_some()
    }
}

/// Disposes the cell's value if still alive. The disposer is invoked after
/// the borrow is released so it may touch other lifetimes reentrantly.
fn dispose_cell<T>(cell: &RefCell<Inner<T>>) {
    let taken = {
        let mut inner = cell.borrow_mut();
        if inner.is_static {
            return;
        }
        match inner.value.take() {
            Some(value) => Some((value, inner.disposer.clone())),
            None => None,
        }
    };
    if let Some((value, Some(disposer))) = taken {
        disposer(value);
    }
}

/// Type-erased view of a lifetime's disposal state, held by [`Scope`]
/// (crate::scope::Scope) as a disposal obligation.
pub(crate) trait DisposeHook {
    fn dispose(&self);
    fn is_alive(&self) -> bool;
}

impl<T> DisposeHook for RefCell<Inner<T>> {
    fn dispose(&self) {
        dispose_cell(self);
    }

    fn is_alive(&self) -> bool {
        self.borrow().alive()
    }
}

/// Host-side ownership wrapper enforcing single-release semantics over a
/// disposable resource.
pub struct Lifetime<T> {
    id: LifetimeId,
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T: 'static> Lifetime<T> {
    /// A lifetime with no release obligation (the value needs no cleanup).
    pub fn new(value: T) -> Self {
        Self::build(value, None, None, false)
    }

    /// A lifetime that releases its value through `disposer` exactly once.
    pub fn owned(value: T, disposer: impl Fn(T) + 'static) -> Self {
        Self::build(value, None, Some(Rc::new(disposer)), false)
    }

    /// A lifetime over a refcounted resource: `copier` increments the
    /// engine-side refcount for [`dup`](Self::dup), `disposer` decrements it.
    pub fn duplicable(
        value: T,
        copier: impl Fn(&T) -> T + 'static,
        disposer: impl Fn(T) + 'static,
    ) -> Self {
        Self::build(value, Some(Rc::new(copier)), Some(Rc::new(disposer)), false)
    }

    /// A non-owning lifetime for a well-known constant value (an engine
    /// `undefined`/`null`). Never individually owned: `dispose()` is a
    /// deliberate no-op and the lifetime stays alive.
    pub fn constant(value: T) -> Self {
        Self::build(value, None, None, true)
    }

    fn build(
        value: T,
        copier: Option<Copier<T>>,
        disposer: Option<Disposer<T>>,
        is_static: bool,
    ) -> Self {
        Self {
            id: next_id(),
            inner: Rc::new(RefCell::new(Inner {
                value: Some(value),
                copier,
                disposer,
                owner: None,
                is_static,
            })),
        }
    }

    /// Tag this lifetime with the context that produced it, for diagnostics.
    pub fn with_owner(self, owner: ContextId) -> Self {
        self.inner.borrow_mut().owner = Some(owner);
        self
    }

    /// Stable identity for scope bookkeeping.
    #[inline]
    pub fn id(&self) -> LifetimeId {
        self.id
    }

    /// Whether the wrapped value is still accessible.
    pub fn alive(&self) -> bool {
        self.inner.borrow().alive()
    }

    /// The context that produced this lifetime, if tagged.
    pub fn owner(&self) -> Option<ContextId> {
        self.inner.borrow().owner
    }

    /// The wrapped value.
    ///
    /// Panics with `"using disposed value"` if the lifetime was disposed;
    /// use-after-dispose is a programming error and fails fast rather than
    /// handing back a stale reference. See [`try_value`](Self::try_value)
    /// for the recoverable form.
    pub fn value(&self) -> T
    where
        T: Copy,
    {
        match self.try_value() {
            Ok(value) => value,
            Err(err) => panic!("{}", err),
        }
    }

    /// The wrapped value, or [`LifetimeError::UsingDisposed`].
    pub fn try_value(&self) -> Result<T, LifetimeError>
    where
        T: Copy,
    {
        self.inner
            .borrow()
            .value
            .ok_or(LifetimeError::UsingDisposed)
    }

    /// Borrow the wrapped value without copying it. The borrow must be
    /// released before `dispose` is called.
    pub fn peek(&self) -> Result<Ref<'_, T>, LifetimeError> {
        Ref::filter_map(self.inner.borrow(), |inner| inner.value.as_ref())
            .map_err(|_| LifetimeError::UsingDisposed)
    }

    /// Release the wrapped value.
    ///
    /// Idempotent: a second call is a silent no-op, and the disposer (hence
    /// the engine-side refcount decrement) runs at most once. Disposing a
    /// constant lifetime does nothing at all; it remains alive.
    pub fn dispose(&self) {
        dispose_cell(&self.inner);
    }

    /// Run `f` with this lifetime, then unconditionally dispose it.
    ///
    /// This is the borrow-and-release idiom for "operate on a handle and
    /// discard it". Disposal happens before the result - including an `Err` -
    /// is returned; if `f` panics, the drop backstop still releases the value
    /// during unwinding.
    pub fn consume<R>(self, f: impl FnOnce(&Lifetime<T>) -> R) -> R {
        let result = f(&self);
        self.dispose();
        result
    }

    /// Create an independent sibling lifetime over the same underlying
    /// resource, incrementing its refcount via the copier.
    ///
    /// Both siblings dispose independently; disposing one never invalidates
    /// the other. Duplicating a constant lifetime yields another view of the
    /// same constant. Fails with [`LifetimeError::NotDuplicable`] when no
    /// copier was attached, and [`LifetimeError::UsingDisposed`] when dead.
    pub fn dup(&self) -> Result<Lifetime<T>, LifetimeError> {
        let inner = self.inner.borrow();
        let value = inner.value.as_ref().ok_or(LifetimeError::UsingDisposed)?;
        if inner.is_static {
            // Constants are never individually owned; share the same cell.
            return Ok(Lifetime {
                id: next_id(),
                inner: Rc::clone(&self.inner),
            });
        }
        let copier = inner.copier.clone().ok_or(LifetimeError::NotDuplicable)?;
        let copy = copier(value);
        Ok(Self::build(
            copy,
            Some(copier),
            inner.disposer.clone(),
            false,
        ))
    }

    /// Shared hook handed to a scope when this lifetime is managed.
    pub(crate) fn hook(&self) -> Rc<dyn DisposeHook> {
        Rc::clone(&self.inner) as Rc<dyn DisposeHook>
    }
}

impl<T> Drop for Lifetime<T> {
    fn drop(&mut self) {
        // Disposal falls to the last holder of the shared state: if a scope
        // still holds an obligation for this lifetime, the sweep owns cleanup.
        if Rc::strong_count(&self.inner) == 1 {
            dispose_cell(&self.inner);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lifetime<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Lifetime")
            .field("id", &self.id.0)
            .field("value", &inner.value)
            .field("alive", &inner.alive())
            .field("owner", &inner.owner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn value_accessible_while_alive() {
        let lifetime = Lifetime::new(42);
        assert!(lifetime.alive());
        assert_eq!(lifetime.value(), 42);
    }

    #[test]
    fn dispose_is_idempotent() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let lifetime = Lifetime::owned(7, move |_| counter.set(counter.get() + 1));
        lifetime.dispose();
        lifetime.dispose();
        assert!(!lifetime.alive());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    #[should_panic(expected = "using disposed value")]
    fn value_after_dispose_fails_fast() {
        let lifetime = Lifetime::new(1);
        lifetime.dispose();
        lifetime.value();
    }

    #[test]
    fn try_value_after_dispose_reports_error() {
        let lifetime = Lifetime::new(1);
        lifetime.dispose();
        assert_eq!(lifetime.try_value(), Err(LifetimeError::UsingDisposed));
    }

    #[test]
    fn consume_yields_the_value() {
        let lifetime = Lifetime::new(1);
        let result = lifetime.consume(|l| l.value() + 1);
        assert_eq!(result, 2);
    }

    #[test]
    fn consume_disposes_the_lifetime() {
        let disposed = Rc::new(Cell::new(false));
        let flag = disposed.clone();
        let lifetime = Lifetime::owned(2, move |_| flag.set(true));
        let doubled = lifetime.consume(|l| l.value() * 2);
        assert_eq!(doubled, 4);
        assert!(disposed.get());
    }

    #[test]
    fn consume_disposes_before_propagating_err() {
        let disposed = Rc::new(Cell::new(false));
        let flag = disposed.clone();
        let lifetime = Lifetime::owned(3, move |_| flag.set(true));
        let result: Result<i32, &str> = lifetime.consume(|_| Err("nope"));
        assert_eq!(result, Err("nope"));
        assert!(disposed.get());
    }

    #[test]
    fn dup_siblings_dispose_independently() {
        let refcount = Rc::new(Cell::new(1));
        let up = refcount.clone();
        let down = refcount.clone();
        let base = Lifetime::duplicable(
            10,
            move |v| {
                up.set(up.get() + 1);
                *v
            },
            move |_| down.set(down.get() - 1),
        );

        let sibling = base.dup().unwrap();
        assert_eq!(refcount.get(), 2);

        base.dispose();
        assert!(!base.alive());
        assert_eq!(sibling.value(), 10, "sibling survives base disposal");
        assert_eq!(refcount.get(), 1);

        sibling.dispose();
        assert_eq!(refcount.get(), 0, "fully released after last sibling");
    }

    #[test]
    fn dup_without_copier_is_rejected() {
        let lifetime = Lifetime::new(5);
        assert_eq!(lifetime.dup().unwrap_err(), LifetimeError::NotDuplicable);
    }

    #[test]
    fn constant_lifetime_ignores_dispose() {
        let undefined = Lifetime::constant(0usize);
        undefined.dispose();
        assert!(undefined.alive());
        assert_eq!(undefined.value(), 0);

        let view = undefined.dup().unwrap();
        assert_eq!(view.value(), 0);
    }

    #[test]
    fn drop_releases_unmanaged_lifetimes() {
        let disposed = Rc::new(Cell::new(false));
        let flag = disposed.clone();
        {
            let _lifetime = Lifetime::owned(9, move |_| flag.set(true));
        }
        assert!(disposed.get());
    }

    #[test]
    fn drop_after_explicit_dispose_is_a_noop() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        {
            let lifetime = Lifetime::owned(9, move |_| counter.set(counter.get() + 1));
            lifetime.dispose();
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn peek_borrows_non_copy_values() {
        let lifetime = Lifetime::new(String::from("handle"));
        assert_eq!(&*lifetime.peek().unwrap(), "handle");
        lifetime.dispose();
        assert!(lifetime.peek().is_err());
    }
}
