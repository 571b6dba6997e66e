//! Opaque references into the engine's heap
//!
//! The engine manages its own heap on the far side of the FFI boundary. The
//! host never sees engine values directly; it sees *handles*: small Copy
//! structs carrying the raw slot address plus the execution context the slot
//! belongs to. Handles are meaningless outside their owning context, so the
//! context id travels with the address and is checked at adoption time.

use std::fmt;

/// Identifies one engine execution context.
///
/// Handles created in one context must never be used with another; every
/// layer that accepts a [`Handle`] checks this id against its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// An opaque reference to a value in the engine heap.
///
/// Each live handle the host holds corresponds to exactly one refcount
/// increment on the engine side attributable to the host. Duplicating a
/// handle increments that refcount; disposing the owning
/// [`Lifetime`](crate::lifetime::Lifetime) decrements it exactly once.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    addr: usize,
    ctx: ContextId,
}

impl Handle {
    /// Wrap a raw engine heap address.
    #[inline]
    pub fn new(addr: usize, ctx: ContextId) -> Self {
        Self { addr, ctx }
    }

    /// The raw slot address, as handed across the FFI boundary.
    #[inline]
    pub fn addr(self) -> usize {
        self.addr
    }

    /// The context this handle belongs to.
    #[inline]
    pub fn context(self) -> ContextId {
        self.ctx
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x} @ {})", self.addr, self.ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_roundtrips_address_and_context() {
        let h = Handle::new(0x1234, ContextId(7));
        assert_eq!(h.addr(), 0x1234);
        assert_eq!(h.context(), ContextId(7));
    }

    #[test]
    fn handles_compare_by_slot_and_context() {
        let a = Handle::new(8, ContextId(1));
        let b = Handle::new(8, ContextId(1));
        let c = Handle::new(8, ContextId(2));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
