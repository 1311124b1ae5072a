//! Module initialization tests

mod common;

use common::{for_each_revision, message_of};
use shim_sdk::{
    module_initialize, shim_throw, CallArgs, Context, FunctionSpec, TypeTag, Value,
};

fn hello(ctx: &Context<'_>, args: &mut CallArgs) -> bool {
    args.set_return(ctx.string_new_copy("hello from native"));
    true
}

fn init_ok(ctx: &Context<'_>, exports: &Value, module: &Value) -> bool {
    let version = ctx.integer_new(3);
    ctx.obj_set_prop_name(module, "version", &version)
        && ctx.obj_set_funcs(exports, &[FunctionSpec::new("hello", hello, 0)])
}

fn init_silent_failure(_ctx: &Context<'_>, _exports: &Value, _module: &Value) -> bool {
    false
}

fn init_raises(ctx: &Context<'_>, _exports: &Value, _module: &Value) -> bool {
    shim_throw!(ctx, RangeError, "unsupported platform {}", "plan9");
    false
}

#[test]
fn test_module_init_populates_exports() {
    for_each_revision(|isolate| {
        let ctx = Context::enter(isolate);
        let exports = ctx.obj_new(None);
        let module = ctx.obj_new(None);

        module_initialize(isolate, exports.raw(isolate), module.raw(isolate), init_ok).unwrap();

        let ret = ctx.func_call_name(&exports, "hello", &[]).unwrap();
        assert_eq!(ctx.string_value(&ret).as_deref(), Some("hello from native"));
        let version = ctx.obj_get_prop_name(&module, "version").unwrap();
        assert!(ctx.is(&version, TypeTag::Int32));
        assert_eq!(ctx.int32_value(&version), 3);
    });
}

#[test]
fn test_module_init_default_error() {
    for_each_revision(|isolate| {
        let ctx = Context::enter(isolate);
        let exports = ctx.obj_new(None);
        let module = ctx.obj_new(None);

        let err = module_initialize(
            isolate,
            exports.raw(isolate),
            module.raw(isolate),
            init_silent_failure,
        )
        .unwrap_err();
        let err = Value::new(err);
        assert_eq!(
            ctx.string_value(&err).as_deref(),
            Some("Error: Failed to initialize module")
        );
    });
}

#[test]
fn test_module_init_keeps_raised_error() {
    for_each_revision(|isolate| {
        let ctx = Context::enter(isolate);
        let exports = ctx.obj_new(None);
        let module = ctx.obj_new(None);

        let err = module_initialize(
            isolate,
            exports.raw(isolate),
            module.raw(isolate),
            init_raises,
        )
        .unwrap_err();
        let err = Value::new(err);
        assert_eq!(message_of(&ctx, &err), "unsupported platform plan9");
    });
}
