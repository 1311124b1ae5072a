//! Calling-convention adapters
//!
//! Each engine revision gets one thin entry point that translates its native
//! ABI into an [`Invocation`] and applies the resulting [`Completion`] in the
//! ABI's own terms. Everything in between lives in [`dispatch`], which is
//! written once against the internal shape.
//!
//! ```text
//! Legacy:  Arguments ──┐                      ┌── return handle / throw + return exc
//!                      ├── Invocation ─ dispatch ─ Completion
//! Modern:  CallbackInfo┘                      └── ReturnValue::set / throw
//! ```

use std::any::Any;
use std::rc::Rc;

use crate::context::Context;
use crate::engine::Engine;
use crate::function::{CallArgs, FunctionHolder, NativeFn};
use crate::sys::{
    Arguments, FunctionCallbackInfo, NativeCallback, RawHandle, ReturnValue, Revision,
};
use crate::value::Value;

/// One call from the engine into native code, convention-independent.
pub(crate) struct Invocation<'a> {
    pub engine: &'a dyn Engine,
    pub this: RawHandle,
    pub callee: RawHandle,
    pub data: RawHandle,
    pub args: &'a [RawHandle],
}

/// How a native call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Normal return with this value
    Return(RawHandle),
    /// The trap held an exception at exit
    Throw(RawHandle),
}

/// The native entry point matching `revision`
pub fn callback_for(revision: Revision) -> NativeCallback {
    match revision {
        Revision::Legacy => NativeCallback::Legacy(legacy_entry),
        Revision::Modern => NativeCallback::Modern(modern_entry),
    }
}

/// Entry point for engines using the mutable-arguments convention
pub fn legacy_entry(args: &mut Arguments<'_>) -> RawHandle {
    let engine = args.engine();
    let values: Vec<RawHandle> = (0..args.len()).map(|i| args.get(i)).collect();
    let invocation = Invocation {
        engine,
        this: args.this(),
        callee: args.callee(),
        data: args.data(),
        args: &values,
    };

    match dispatch(invocation) {
        Completion::Return(value) => value,
        Completion::Throw(exception) => {
            engine.throw(exception);
            exception
        }
    }
}

/// Entry point for engines using the call-info/out-parameter convention
pub fn modern_entry(info: &FunctionCallbackInfo<'_>, ret: &mut ReturnValue) {
    let engine = info.isolate();
    let values: Vec<RawHandle> = (0..info.length()).map(|i| info.arg(i)).collect();
    let invocation = Invocation {
        engine,
        this: info.this(),
        callee: info.callee(),
        data: info.data(),
        args: &values,
    };

    match dispatch(invocation) {
        Completion::Return(value) => ret.set(value),
        Completion::Throw(exception) => engine.throw(exception),
    }
}

/// Run the registered native function for one call.
pub(crate) fn dispatch(invocation: Invocation<'_>) -> Completion {
    let Invocation {
        engine,
        this,
        callee,
        data,
        args,
    } = invocation;

    log::debug!("native enter {:?} argc={}", callee, args.len());
    let ctx = Context::enter(engine);

    let Some((callback, user_data, flags)) = holder_of(engine, data) else {
        crate::shim_throw!(ctx, Error, "Native function {:?} has no callback data", callee);
        return finish(ctx, engine, callee, None);
    };

    let mut call = CallArgs {
        argv: args.iter().copied().map(Value::borrowed).collect(),
        this: Value::borrowed(this),
        data: user_data,
        flags,
        ret: Value::UNDEFINED,
    };

    if !callback(&ctx, &mut call) {
        log::debug!("native failure {:?}", callee);
        if !ctx.exception_pending() {
            log::warn!(
                "native function {:?} reported failure without raising an exception",
                callee
            );
        }
    }

    // Argument and receiver wrappers die here; the return value is handed on.
    let ret = call.ret.raw(engine);
    drop(call);

    finish(ctx, engine, callee, Some(ret))
}

fn finish(
    ctx: Context<'_>,
    engine: &dyn Engine,
    callee: RawHandle,
    ret: Option<RawHandle>,
) -> Completion {
    match ctx.leave(ret) {
        Ok(value) => {
            log::debug!("native exit {:?}", callee);
            Completion::Return(value.unwrap_or_else(|| engine.undefined()))
        }
        Err(exception) => {
            log::debug!("native threw {:?}", callee);
            Completion::Throw(exception)
        }
    }
}

fn holder_of(
    engine: &dyn Engine,
    data: RawHandle,
) -> Option<(NativeFn, Option<Rc<dyn Any>>, u32)> {
    if !engine.is_external(data) {
        return None;
    }
    let ptr = engine.external_value(data)?.cast::<FunctionHolder>();
    if ptr.is_null() {
        return None;
    }
    // SAFETY: externals carried as function data are only ever created by
    // `func_new`, which boxes a `FunctionHolder`; the callee keeps the
    // external, and so the holder, alive for the duration of the call.
    let holder = unsafe { &*ptr };
    Some((holder.callback, holder.data.clone(), holder.flags))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_for_matches_revision() {
        assert_eq!(callback_for(Revision::Legacy).revision(), Revision::Legacy);
        assert_eq!(callback_for(Revision::Modern).revision(), Revision::Modern);
    }
}
