//! Persistent and weak handles
//!
//! A [`Persistent`] roots a value in an engine slot that survives the
//! context that created it. It can be demoted to weak with a finalization
//! callback, promoted back, and must be disposed explicitly.

use crate::context::Context;
use crate::engine::Engine;
use crate::error::{ShimError, ShimResult};
use crate::sys::{PersistentId, RawHandle, WeakFinalizer};
use crate::value::Value;

/// Callback run when a weak referent is about to be reclaimed.
///
/// Receives a fresh wrapper for the referent and the data given to
/// [`Persistent::make_weak`].
pub type WeakCallback<T> = fn(&Context<'_>, Value, T);

/// Finalization record: the user callback and its data, consumed once.
struct WeakBaton<T> {
    callback: WeakCallback<T>,
    data: T,
}

impl<T> WeakBaton<T> {
    fn fire(self, engine: &dyn Engine, referent: RawHandle) {
        let ctx = Context::enter(engine);
        (self.callback)(&ctx, Value::new(referent), self.data);
        if let Err(exception) = ctx.leave(None) {
            log::warn!("weak callback raised {:?}; dropped", exception);
        }
    }
}

/// Long-lived reference to an engine value.
#[must_use = "a persistent must be disposed explicitly"]
#[derive(Debug)]
pub struct Persistent {
    id: PersistentId,
}

impl Persistent {
    /// Root `value` beyond the current context
    pub fn new(ctx: &Context<'_>, value: &Value) -> Self {
        let engine = ctx.engine();
        let id = engine.persistent_new(value.raw(engine));
        log::trace!("persistent {:?} created", id);
        Self { id }
    }

    /// Engine slot id
    pub fn id(&self) -> PersistentId {
        self.id
    }

    /// Fresh wrapper for the referent, valid in `ctx`
    ///
    /// `None` once a weak referent has been reclaimed.
    pub fn value(&self, ctx: &Context<'_>) -> Option<Value> {
        ctx.engine().persistent_get(self.id).map(Value::new)
    }

    /// Like [`Persistent::value`], with an error for a reclaimed referent
    pub fn try_value(&self, ctx: &Context<'_>) -> ShimResult<Value> {
        self.value(ctx).ok_or(ShimError::EmptyPersistent(self.id.0))
    }

    /// Release the slot, cancelling any pending weak callback
    pub fn dispose(self, ctx: &Context<'_>) {
        log::trace!("persistent {:?} disposed", self.id);
        ctx.engine().persistent_dispose(self.id);
    }

    /// Let the collector reclaim the referent, calling `callback` first.
    ///
    /// Replaces any earlier registration, whose data is dropped uncalled.
    pub fn make_weak<T: 'static>(&self, ctx: &Context<'_>, data: T, callback: WeakCallback<T>) {
        let baton = WeakBaton { callback, data };
        let finalizer: WeakFinalizer =
            Box::new(move |engine: &dyn Engine, referent: RawHandle| baton.fire(engine, referent));
        ctx.engine().make_weak(self.id, finalizer);
    }

    /// Make the slot strong again.
    ///
    /// Returns whether a weak callback was pending; it will never run.
    pub fn clear_weak(&self, ctx: &Context<'_>) -> bool {
        ctx.engine().clear_weak(self.id)
    }
}
