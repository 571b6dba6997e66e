//! End-to-end scenarios across the lifetime, scope, and dual-mode layers,
//! exercised against the counting heap the way the real bindings run against
//! the engine's leak-checked builds.

use crate::context::VmContext;
use crate::error::EngineError;
use crate::ffi::ForeignHeap;
use crate::handle::ContextId;
use crate::lifetime::Lifetime;
use crate::maybe_async::{MaybeAsync, maybe_async};
use crate::scope::Scope;
use crate::testing::{CountingHeap, block_on, deferred};

use std::cell::Cell;
use std::rc::Rc;

fn context() -> VmContext<CountingHeap> {
    VmContext::new(CountingHeap::new(ContextId(1)))
}

#[test]
fn scope_disposes_plain_lifetimes_and_returns_the_body_value() {
    let calls = Rc::new(Cell::new(0));
    let a = calls.clone();
    let b = calls.clone();
    let returned = Scope::with_scope(|scope| {
        scope.manage(Lifetime::owned(1, move |_| a.set(a.get() + 1)));
        scope.manage(Lifetime::owned(2, move |_| b.set(b.get() + 1)));
        42
    });
    assert_eq!(returned, 42);
    assert_eq!(calls.get(), 2);
}

#[test]
fn dual_mode_sum_is_sync_for_sync_inputs() {
    let sum = |a: MaybeAsync<i32>, b: MaybeAsync<i32>| maybe_async(async move { a.await + b.await });
    let result = sum(MaybeAsync::ready(5), MaybeAsync::ready(6));
    assert_eq!(result.into_ready(), Some(11));
}

#[test]
fn dual_mode_sum_is_async_for_async_inputs() {
    let sum = |a: MaybeAsync<i32>, b: MaybeAsync<i32>| maybe_async(async move { a.await + b.await });
    let (tx, pending) = deferred();
    let result = sum(pending, MaybeAsync::ready(2));
    assert!(result.is_pending());
    tx.send(1).unwrap();
    assert_eq!(block_on(result), 3);
}

#[test]
fn failure_after_a_settled_pending_await_rejects_the_pending_result() {
    let (tx, pending) = deferred::<i32>();
    let run: MaybeAsync<Result<i32, EngineError>> = maybe_async(async move {
        let _ = pending.await;
        Err(EngineError::Exception(String::from("late failure")))
    });
    assert!(run.is_pending(), "the failure must not surface synchronously");
    tx.send(1).unwrap();
    assert_eq!(
        block_on(run),
        Err(EngineError::Exception(String::from("late failure")))
    );
}

#[test]
fn scoped_engine_work_leaves_no_allocations_behind() {
    let ctx = context();
    Scope::with_scope(|scope| {
        let object = scope.manage(ctx.adopt(ctx.heap().alloc("object")));
        let property = scope.manage(ctx.adopt(ctx.heap().alloc("property")));
        assert!(object.alive() && property.alive());
        assert_eq!(ctx.alive_count(), 2);
    });
    assert_eq!(ctx.alive_count(), 0, "scope sweep released everything");
}

#[test]
fn lifetime_kept_out_of_a_scope_transfers_ownership() {
    let ctx = context();
    let kept = Scope::with_scope_keep(|scope| {
        scope.manage(ctx.adopt(ctx.heap().alloc("discarded")));
        scope.manage(ctx.adopt(ctx.heap().alloc("kept")))
    });
    assert!(kept.alive());
    assert_eq!(ctx.alive_count(), 1, "only the kept slot survives");
    kept.dispose();
    assert_eq!(ctx.alive_count(), 0);
}

#[test]
fn repeated_eval_cycles_do_not_leak() {
    // The shape of the engine leak checks: run an acquire/release cycle many
    // times, then assert the allocation counter is back to zero.
    let ctx = context();
    for _ in 0..1000 {
        let result = ctx.eval_code("[1, 2, 3]", "leak.js").unwrap();
        let dup = result.dup().unwrap();
        result.dispose();
        dup.consume(|handle| ctx.heap().describe(handle.value()));
    }
    assert_eq!(ctx.alive_count(), 0, "no leaks");
}

#[test]
fn dual_mode_determinism_same_values_and_disposals_either_mode() {
    // One routine, two runs: all inputs ready vs. the same inputs pending.
    // Output and disposal side effects must be identical.
    let run = |ctx: VmContext<CountingHeap>,
               source: MaybeAsync<Result<String, EngineError>>|
     -> MaybeAsync<Result<String, EngineError>> {
        maybe_async(async move {
            let code = source.await?;
            let handle = ctx.eval_code(&code, "mod.js")?;
            Ok(handle.consume(|h| ctx.heap().describe(h.value())))
        })
    };

    let sync_ctx = context();
    let sync_out = run(sync_ctx.clone(), MaybeAsync::ready(Ok(String::from("m"))))
        .into_ready()
        .expect("sync mode");

    let async_ctx = context();
    let (tx, pending) = deferred();
    let pending_run = run(async_ctx.clone(), pending);
    tx.send(Ok(String::from("m"))).unwrap();
    let async_out = block_on(pending_run);

    assert_eq!(sync_out, async_out);
    assert_eq!(sync_ctx.alive_count(), 0);
    assert_eq!(async_ctx.alive_count(), 0);
}

#[test]
fn engine_failures_come_back_as_values_not_crashes() {
    let ctx = context();
    assert_eq!(
        ctx.eval_code("throw bad input", "err.js").unwrap_err(),
        EngineError::Exception(String::from("bad input"))
    );
    assert_eq!(
        ctx.eval_code("oom", "err.js").unwrap_err(),
        EngineError::OutOfMemory
    );
    assert_eq!(ctx.alive_count(), 0);
}
