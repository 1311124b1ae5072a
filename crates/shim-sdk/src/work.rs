//! Async work bridge
//!
//! The only sanctioned way to leave the engine thread. `work` runs on a pool
//! thread with exclusive access to the request data and nothing else; the
//! data then travels back to the engine thread, where `after` receives it
//! together with a fresh [`Context`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::Context;
use crate::engine::Engine;
use crate::sys::{AfterWorkFn, WorkFn, WorkStatus};

/// Request data shared by the two halves of a work request.
type WorkSlot<D> = Arc<Mutex<Option<D>>>;

/// Queue `work` on a background thread and `after` on the engine thread.
///
/// There is no cancellation: once queued, `work` runs to completion.
/// Completions are delivered in the order the work finishes. A panic in
/// `work` is caught and reported as [`WorkStatus::Panicked`]; `after` still
/// receives the data.
pub fn queue_work<D, W, A>(ctx: &Context<'_>, data: D, work: W, after: A)
where
    D: Send + 'static,
    W: FnOnce(&mut D) + Send + 'static,
    A: FnOnce(&Context<'_>, D, WorkStatus) + 'static,
{
    let slot: WorkSlot<D> = Arc::new(Mutex::new(Some(data)));

    let worker_slot = Arc::clone(&slot);
    let work_fn: WorkFn = Box::new(move || {
        let mut guard = worker_slot.lock();
        let Some(data) = guard.as_mut() else {
            return WorkStatus::Completed;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| work(data))) {
            Ok(()) => WorkStatus::Completed,
            Err(_) => {
                log::warn!("work callback panicked");
                WorkStatus::Panicked
            }
        }
    });

    let after_fn: AfterWorkFn = Box::new(move |engine: &dyn Engine, status: WorkStatus| {
        let Some(data) = slot.lock().take() else {
            log::warn!("work completion delivered twice");
            return;
        };
        let ctx = Context::enter(engine);
        after(&ctx, data, status);
        if let Err(exception) = ctx.leave(None) {
            log::warn!("work completion raised {:?}; dropped", exception);
        }
    });

    log::trace!("work queued");
    ctx.engine().queue_work(work_fn, after_fn);
}
