//! Call context - one per entry from the engine into native code
//!
//! A [`Context`] bundles the engine instance, the handle scope opened for the
//! call and the exception trap. It lives exactly as long as the call: it is
//! neither `Clone` nor `Send`, and its lifetime is tied to the engine borrow.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

use crate::engine::Engine;
use crate::sys::{EngineResult, RawHandle, ScopeId};

/// Per-invocation bundle of engine, handle scope and exception trap.
pub struct Context<'e> {
    engine: &'e dyn Engine,
    scope: ScopeId,
    closed: Cell<bool>,
    trap: RefCell<Option<RawHandle>>,
    _not_send: PhantomData<*const ()>,
}

impl<'e> Context<'e> {
    /// Enter native code: open a handle scope and an empty exception trap.
    pub fn enter(engine: &'e dyn Engine) -> Self {
        let scope = engine.open_scope();
        Self {
            engine,
            scope,
            closed: Cell::new(false),
            trap: RefCell::new(None),
            _not_send: PhantomData,
        }
    }

    /// The engine instance
    pub fn engine(&self) -> &'e dyn Engine {
        self.engine
    }

    /// Handle scope owned by this context
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Leave native code, escaping at most one handle into the caller's scope.
    ///
    /// A pending exception takes precedence over `escape`: it is escaped
    /// instead and returned as `Err`.
    pub fn leave(self, escape: Option<RawHandle>) -> EngineResult<Option<RawHandle>> {
        let exception = self.trap.borrow_mut().take();
        self.closed.set(true);
        match exception {
            Some(exc) => Err(self.engine.close_scope(self.scope, Some(exc)).unwrap_or(exc)),
            None => Ok(self.engine.close_scope(self.scope, escape)),
        }
    }

    // ========================================================================
    // Exception trap
    // ========================================================================

    /// Whether an exception is pending in this context
    pub fn exception_pending(&self) -> bool {
        self.trap.borrow().is_some()
    }

    /// The pending exception, if any
    pub fn pending_exception(&self) -> Option<RawHandle> {
        *self.trap.borrow()
    }

    /// Drop the pending exception
    pub fn exception_clear(&self) {
        self.trap.borrow_mut().take();
    }

    /// Place `exception` in the trap, replacing any previous one
    pub(crate) fn raise(&self, exception: RawHandle) {
        log::debug!("exception raised: {:?}", exception);
        *self.trap.borrow_mut() = Some(exception);
    }

    /// Move a thrown exception into the trap
    pub(crate) fn catch<T>(&self, result: EngineResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(exception) => {
                self.raise(exception);
                None
            }
        }
    }
}

impl Drop for Context<'_> {
    fn drop(&mut self) {
        if !self.closed.get() {
            self.engine.close_scope(self.scope, None);
        }
    }
}
