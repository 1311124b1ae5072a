//! Argument unpacking through real native calls

mod common;

use std::cell::RefCell;
use std::ffi::c_void;

use common::{for_each_revision, message_of};
use shim_sdk::{unpack_one, CallArgs, Context, Slot, Unpack, Value};

thread_local! {
    static LAST: RefCell<Option<(i64, i64, bool)>> = const { RefCell::new(None) };
}

fn integer_string_bool(ctx: &Context<'_>, args: &mut CallArgs) -> bool {
    let (mut n, mut s, mut b) = (0i64, None, false);
    if !Unpack::new()
        .integer(&mut n)
        .string(&mut s)
        .boolean(&mut b)
        .apply(ctx, args)
    {
        return false;
    }
    let s = s.and_then(|v| ctx.string_value(&v)).unwrap_or_default();
    args.set_return(ctx.string_new_copy(&format!("{}|{}|{}", n, s, b)));
    true
}

fn integer_integer_bool(ctx: &Context<'_>, args: &mut CallArgs) -> bool {
    let (mut a, mut b, mut c) = (-1i64, -1i64, false);
    let ok = Unpack::new()
        .integer(&mut a)
        .integer(&mut b)
        .boolean(&mut c)
        .apply(ctx, args);
    LAST.with(|last| *last.borrow_mut() = Some((a, b, c)));
    ok
}

fn numeric_widths(ctx: &Context<'_>, args: &mut CallArgs) -> bool {
    let (mut i, mut u, mut d) = (0i32, 0u32, 0.0f64);
    if !Unpack::new()
        .int32(&mut i)
        .uint32(&mut u)
        .number(&mut d)
        .apply(ctx, args)
    {
        return false;
    }
    args.set_return(ctx.string_new_copy(&format!("{} {} {}", i, u, d)));
    true
}

fn poke_buffer(ctx: &Context<'_>, args: &mut CallArgs) -> bool {
    let mut ptr = std::ptr::null_mut::<u8>();
    if !Unpack::new().buffer(&mut ptr).apply(ctx, args) {
        return false;
    }
    // SAFETY: the argument is a rooted buffer of at least one byte.
    unsafe { *ptr = 0xab };
    true
}

fn read_external(ctx: &Context<'_>, args: &mut CallArgs) -> bool {
    let mut ptr = std::ptr::null_mut::<c_void>();
    if !Unpack::new().external(&mut ptr).apply(ctx, args) {
        return false;
    }
    // SAFETY: the test passes a pointer to a live u32.
    let value = unsafe { *ptr.cast::<u32>() };
    args.set_return(ctx.integer_uint(value));
    true
}

fn single_slots(ctx: &Context<'_>, args: &mut CallArgs) -> bool {
    let mut n = -1.0;
    let first = unpack_one(ctx, args, 0, Slot::Number(&mut n));
    let mut untouched = 123.0;
    let missing = unpack_one(ctx, args, 5, Slot::Number(&mut untouched));
    let mut flag = true;
    let wrong = unpack_one(ctx, args, 1, Slot::Bool(&mut flag));
    args.set_return(ctx.boolean_new(
        first && n == 2.5 && !missing && untouched == 123.0 && !wrong && flag,
    ));
    // unpack_one never raises.
    !ctx.exception_pending()
}

fn call(ctx: &Context<'_>, f: &Value, argv: &[&Value]) -> Result<Value, String> {
    match ctx.func_call_val(None, f, argv) {
        Some(v) => Ok(v),
        None => {
            let exception = ctx.exception_get().unwrap();
            let message = message_of(ctx, &exception);
            ctx.exception_clear();
            Err(message)
        }
    }
}

// ============================================================================
// Sequences
// ============================================================================

#[test]
fn test_unpack_all_slots_filled() {
    for_each_revision(|isolate| {
        let ctx = Context::enter(isolate);
        let f = ctx.func_new(integer_string_bool, 3, 0, "f", None).unwrap();
        let ten = ctx.number_new(10.0);
        let x = ctx.string_new_copy("x");
        let yes = ctx.boolean_new(true);

        let ret = call(&ctx, &f, &[&ten, &x, &yes]).unwrap();
        assert_eq!(ctx.string_value(&ret).as_deref(), Some("10|x|true"));
    });
}

#[test]
fn test_unpack_stops_at_first_mismatch() {
    for_each_revision(|isolate| {
        let ctx = Context::enter(isolate);
        let f = ctx.func_new(integer_integer_bool, 3, 0, "f", None).unwrap();
        let ten = ctx.number_new(10.0);
        let x = ctx.string_new_copy("x");
        let yes = ctx.boolean_new(true);

        let err = call(&ctx, &f, &[&ten, &x, &yes]).unwrap_err();
        assert_eq!(err, "Argument 1 not of type SHIM_TYPE_INTEGER");
        // Slot 0 was filled, slot 1 and 2 were not touched.
        assert_eq!(LAST.with(|last| *last.borrow()), Some((10, -1, false)));
    });
}

#[test]
fn test_unpack_error_is_type_error() {
    for_each_revision(|isolate| {
        let ctx = Context::enter(isolate);
        let f = ctx.func_new(integer_integer_bool, 3, 0, "f", None).unwrap();
        let half = ctx.number_new(0.5);
        assert!(ctx.func_call_val(None, &f, &[&half]).is_none());
        let exception = ctx.exception_get().unwrap();
        assert_eq!(
            ctx.string_value(&exception).as_deref(),
            Some("TypeError: Argument 0 not of type SHIM_TYPE_INTEGER")
        );
    });
}

#[test]
fn test_unpack_skips_slots_beyond_argc() {
    for_each_revision(|isolate| {
        let ctx = Context::enter(isolate);
        let f = ctx.func_new(integer_string_bool, 3, 0, "f", None).unwrap();
        let ten = ctx.number_new(10.0);
        let ret = call(&ctx, &f, &[&ten]).unwrap();
        assert_eq!(ctx.string_value(&ret).as_deref(), Some("10||false"));
    });
}

#[test]
fn test_unpack_numeric_widths() {
    for_each_revision(|isolate| {
        let ctx = Context::enter(isolate);
        let f = ctx.func_new(numeric_widths, 3, 0, "f", None).unwrap();
        let neg = ctx.number_new(-5.0);
        let big = ctx.number_new(4_000_000_000.0);
        let frac = ctx.number_new(0.25);
        let ret = call(&ctx, &f, &[&neg, &big, &frac]).unwrap();
        assert_eq!(ctx.string_value(&ret).as_deref(), Some("-5 4000000000 0.25"));

        // -5 is not a u32.
        let err = call(&ctx, &f, &[&neg, &neg, &frac]).unwrap_err();
        assert_eq!(err, "Argument 1 not of type SHIM_TYPE_UINT32");
    });
}

// ============================================================================
// Pointer slots
// ============================================================================

#[test]
fn test_unpack_buffer_pointer() {
    for_each_revision(|isolate| {
        let ctx = Context::enter(isolate);
        let f = ctx.func_new(poke_buffer, 1, 0, "poke", None).unwrap();
        let buf = ctx.buffer_new(4);
        call(&ctx, &f, &[&buf]).unwrap();
        assert_eq!(ctx.buffer_to_vec(&buf).unwrap(), vec![0xab, 0, 0, 0]);

        let not_buffer = ctx.string_new_copy("nope");
        let err = call(&ctx, &f, &[&not_buffer]).unwrap_err();
        assert_eq!(err, "Argument 0 not of type SHIM_TYPE_BUFFER");
    });
}

#[test]
fn test_unpack_external_pointer() {
    for_each_revision(|isolate| {
        let ctx = Context::enter(isolate);
        let f = ctx.func_new(read_external, 1, 0, "read", None).unwrap();
        let mut secret = 31337u32;
        let ext = ctx.external_new((&mut secret as *mut u32).cast::<c_void>());
        let ret = call(&ctx, &f, &[&ext]).unwrap();
        assert_eq!(ctx.uint32_value(&ret), 31337);
    });
}

#[test]
fn test_unpack_one_leaves_destination_untouched() {
    for_each_revision(|isolate| {
        let ctx = Context::enter(isolate);
        let f = ctx.func_new(single_slots, 2, 0, "single", None).unwrap();
        let n = ctx.number_new(2.5);
        let s = ctx.string_new_copy("not a bool");
        let ret = call(&ctx, &f, &[&n, &s]).unwrap();
        assert!(ctx.boolean_value(&ret));
    });
}
