//! Module entry point

use crate::context::Context;
use crate::engine::Engine;
use crate::sys::{EngineResult, RawHandle};
use crate::value::Value;

/// Client initializer: populate `exports` (and optionally `module`).
pub type ModuleInit = fn(&Context<'_>, &Value, &Value) -> bool;

/// Run `init` for a freshly loaded native module.
///
/// A `false` return with nothing raised becomes
/// `Error("Failed to initialize module")`. The error is returned, not thrown;
/// the host decides how to report a failed load.
pub fn module_initialize(
    engine: &dyn Engine,
    exports: RawHandle,
    module: RawHandle,
    init: ModuleInit,
) -> EngineResult<()> {
    let ctx = Context::enter(engine);
    let exports = Value::borrowed(exports);
    let module = Value::borrowed(module);

    if !init(&ctx, &exports, &module) && !ctx.exception_pending() {
        crate::shim_throw!(ctx, Error, "Failed to initialize module");
    }

    ctx.leave(None).map(|_| ())
}
