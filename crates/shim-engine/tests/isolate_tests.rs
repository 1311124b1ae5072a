//! Reference engine tests: scopes, collection, options

mod common;

use common::isolate;
use shim_engine::{EngineError, EngineOptions, Isolate, DEFAULT_THREADPOOL_SIZE, THREADPOOL_VAR};
use shim_sdk::{Context, Engine, ErrorKind, PropertyKey, Revision};

// ============================================================================
// Scopes
// ============================================================================

#[test]
fn test_scope_escape() {
    let isolate = isolate(Revision::Modern);
    let outer = isolate.open_scope();
    let inner = isolate.open_scope();
    let kept = isolate.new_string("kept");
    let dropped = isolate.new_string("dropped");
    assert_eq!(isolate.close_scope(inner, Some(kept)), Some(kept));

    isolate.collect();
    assert_eq!(isolate.string_utf8(kept).as_deref(), Some("kept"));
    assert_eq!(isolate.string_utf8(dropped), None);

    isolate.close_scope(outer, None);
    isolate.collect();
    assert_eq!(isolate.string_utf8(kept), None);
    assert_eq!(isolate.scope_depth(), 1);
}

#[test]
fn test_context_leave_escapes_one_handle() {
    let isolate = isolate(Revision::Legacy);
    let scope = isolate.open_scope();
    let escaped = {
        let ctx = Context::enter(&isolate);
        let v = ctx.string_new_copy("out");
        ctx.string_new_copy("garbage");
        ctx.leave(v.handle()).unwrap().unwrap()
    };
    let stats = isolate.collect();
    assert_eq!(stats.freed, 1);
    assert_eq!(isolate.string_utf8(escaped).as_deref(), Some("out"));
    isolate.close_scope(scope, None);
}

#[test]
fn test_stale_handle_after_collect() {
    let isolate = isolate(Revision::Modern);
    let scope = isolate.open_scope();
    let obj = isolate.new_object();
    isolate.close_scope(scope, None);
    isolate.collect();
    assert!(!isolate.is_object(obj));
    let fresh = isolate.new_object();
    assert_ne!(fresh, obj);
    assert!(isolate.is_object(fresh));
}

// ============================================================================
// Collection
// ============================================================================

#[test]
fn test_collect_follows_object_graph() {
    let isolate = isolate(Revision::Modern);
    let root = isolate.new_object();
    let scope = isolate.open_scope();
    let child = isolate.new_array(2);
    let leaf = isolate.new_string("leaf");
    isolate.set(child, PropertyKey::Index(1), leaf).unwrap();
    isolate.set(root, PropertyKey::Name("child"), child).unwrap();
    isolate.close_scope(scope, None);

    let live_before = isolate.live_objects();
    let stats = isolate.collect();
    assert_eq!(stats.freed, 0);
    assert_eq!(stats.live, live_before);
    let got = isolate.get(root, PropertyKey::Name("child")).unwrap();
    let got = isolate.get(got, PropertyKey::Index(1)).unwrap();
    assert_eq!(isolate.string_utf8(got).as_deref(), Some("leaf"));
}

#[test]
fn test_cycles_are_collected() {
    let isolate = isolate(Revision::Modern);
    let before = isolate.live_objects();
    let scope = isolate.open_scope();
    let a = isolate.new_object();
    let b = isolate.new_object();
    isolate.set(a, PropertyKey::Name("b"), b).unwrap();
    isolate.set(b, PropertyKey::Name("a"), a).unwrap();
    isolate.close_scope(scope, None);

    let stats = isolate.collect();
    assert_eq!(stats.freed, 2);
    assert_eq!(isolate.live_objects(), before);
}

#[test]
fn test_symbols_are_interned() {
    let isolate = isolate(Revision::Legacy);
    let a = isolate.symbol("s");
    let b = isolate.symbol("s");
    let c = isolate.symbol("t");
    assert_eq!(a, b);
    assert_ne!(a, c);
    isolate.collect();
    assert_eq!(isolate.symbol("s"), a);
    assert_eq!(isolate.symbol_description(c).as_deref(), Some("t"));
    let not_symbol = isolate.new_string("t");
    assert_eq!(isolate.symbol_description(not_symbol), None);
}

// ============================================================================
// Engine semantics used by the shim
// ============================================================================

#[test]
fn test_error_objects() {
    let isolate = isolate(Revision::Modern);
    let err = isolate.new_error(ErrorKind::TypeError, "bad");
    assert!(isolate.is_object(err));
    let name = isolate.get(err, PropertyKey::Name("name")).unwrap();
    assert_eq!(isolate.string_utf8(name).as_deref(), Some("TypeError"));
    let text = isolate.to_string(err).unwrap();
    assert_eq!(isolate.string_utf8(text).as_deref(), Some("TypeError: bad"));
}

#[test]
fn test_array_length_property() {
    let isolate = isolate(Revision::Modern);
    let arr = isolate.new_array(3);
    let len = isolate.get(arr, PropertyKey::Name("length")).unwrap();
    assert_eq!(isolate.number_value(len), 3.0);

    let one = isolate.new_number(1.0);
    isolate.set(arr, PropertyKey::Name("length"), one).unwrap();
    assert_eq!(isolate.array_length(arr), 1);
}

#[test]
fn test_script_error_does_not_linger() {
    let isolate = isolate(Revision::Modern);
    let f = isolate.script_function("fails", 0, |iso, _this, _args| {
        Err(iso.new_error(ErrorKind::Error, "nope"))
    });
    let undefined = isolate.undefined();
    assert!(isolate.call(f, undefined, &[]).is_err());
    let ok = isolate.script_function("ok", 0, |iso, _this, _args| Ok(iso.new_number(1.0)));
    assert!(isolate.call(ok, undefined, &[]).is_ok());
}

#[test]
fn test_construct_uses_prototype() {
    let isolate = isolate(Revision::Modern);
    let ctor = isolate.script_function("Thing", 0, |iso, _this, _args| Ok(iso.undefined()));
    let proto = isolate.new_object();
    let marker = isolate.new_string("from proto");
    isolate.set(proto, PropertyKey::Name("marker"), marker).unwrap();
    isolate.set(ctor, PropertyKey::Name("prototype"), proto).unwrap();

    let instance = isolate.construct(ctor, &[]).unwrap();
    let got = isolate.get(instance, PropertyKey::Name("marker")).unwrap();
    assert_eq!(isolate.string_utf8(got).as_deref(), Some("from proto"));

    let not_ctor = isolate.new_number(1.0);
    assert!(isolate.construct(not_ctor, &[]).is_err());
}

// ============================================================================
// Options
// ============================================================================

#[test]
fn test_isolate_reports_options() {
    let isolate = Isolate::new(EngineOptions::with_revision(Revision::Legacy)).unwrap();
    assert_eq!(isolate.api_revision(), Revision::Legacy);
    assert_eq!(isolate.revision(), Revision::Legacy);
    assert_eq!(isolate.options().threadpool_size, DEFAULT_THREADPOOL_SIZE);
}

#[test]
fn test_isolate_from_env_uses_cached_options() {
    let isolate = Isolate::from_env().unwrap();
    assert_eq!(*isolate.options(), EngineOptions::from_env_cached());
    assert!(isolate.options().threadpool_size >= 1);
}

#[test]
fn test_isolate_rejects_empty_work_pool() {
    let options = EngineOptions {
        revision: Revision::Modern,
        threadpool_size: 0,
    };
    match Isolate::new(options) {
        Err(EngineError::InvalidOption { name, value }) => {
            assert_eq!(name, THREADPOOL_VAR);
            assert_eq!(value, "0");
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("an isolate without workers would drop queued work"),
    }
}
