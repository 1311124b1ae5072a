//! Persistent and weak handle tests

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::for_each_revision;
use shim_sdk::{Context, Persistent, ShimError, TypeTag, Value};

fn count_weak(ctx: &Context<'_>, referent: Value, counter: Rc<Cell<u32>>) {
    // The referent is still alive while the callback runs.
    assert!(ctx.is(&referent, TypeTag::Object));
    counter.set(counter.get() + 1);
}

fn tagged_object(ctx: &Context<'_>, tag: &str) -> Value {
    let obj = ctx.obj_new(None);
    let v = ctx.string_new_copy(tag);
    ctx.obj_set_prop_name(&obj, "tag", &v);
    obj
}

// ============================================================================
// Strong persistents
// ============================================================================

#[test]
fn test_persistent_outlives_context() {
    for_each_revision(|isolate| {
        let persistent = {
            let ctx = Context::enter(isolate);
            let obj = tagged_object(&ctx, "kept");
            let p = Persistent::new(&ctx, &obj);
            ctx.leave(None).unwrap();
            p
        };

        isolate.collect();

        let ctx = Context::enter(isolate);
        let obj = persistent.try_value(&ctx).unwrap();
        let tag = ctx.obj_get_prop_name(&obj, "tag").unwrap();
        assert_eq!(ctx.string_value(&tag).as_deref(), Some("kept"));
        persistent.dispose(&ctx);
    });
}

#[test]
fn test_dispose_releases_referent() {
    for_each_revision(|isolate| {
        let before = isolate.live_objects();
        {
            let ctx = Context::enter(isolate);
            let obj = tagged_object(&ctx, "gone");
            let p = Persistent::new(&ctx, &obj);
            p.dispose(&ctx);
            ctx.leave(None).unwrap();
        }
        isolate.collect();
        assert_eq!(isolate.live_objects(), before);
    });
}

// ============================================================================
// Weak persistents
// ============================================================================

#[test]
fn test_weak_callback_fires_once_with_data() {
    for_each_revision(|isolate| {
        let counter = Rc::new(Cell::new(0u32));
        let persistent = {
            let ctx = Context::enter(isolate);
            let obj = tagged_object(&ctx, "weak");
            let p = Persistent::new(&ctx, &obj);
            p.make_weak(&ctx, counter.clone(), count_weak);
            ctx.leave(None).unwrap();
            p
        };

        let stats = isolate.collect();
        assert_eq!(stats.weak_callbacks, 1);
        assert_eq!(counter.get(), 1);
        // The baton and its data are gone.
        assert_eq!(Rc::strong_count(&counter), 1);

        isolate.collect();
        assert_eq!(counter.get(), 1);

        let ctx = Context::enter(isolate);
        assert!(persistent.value(&ctx).is_none());
        assert!(matches!(
            persistent.try_value(&ctx),
            Err(ShimError::EmptyPersistent(_))
        ));
        persistent.dispose(&ctx);
    });
}

#[test]
fn test_weak_referent_kept_while_rooted() {
    for_each_revision(|isolate| {
        let counter = Rc::new(Cell::new(0u32));
        let ctx = Context::enter(isolate);
        let obj = tagged_object(&ctx, "rooted");
        let p = Persistent::new(&ctx, &obj);
        p.make_weak(&ctx, counter.clone(), count_weak);

        isolate.collect();
        assert_eq!(counter.get(), 0);
        assert!(p.value(&ctx).is_some());
        p.dispose(&ctx);
    });
}

#[test]
fn test_clear_weak_prevents_callback() {
    for_each_revision(|isolate| {
        let counter = Rc::new(Cell::new(0u32));
        let persistent = {
            let ctx = Context::enter(isolate);
            let obj = tagged_object(&ctx, "strong again");
            let p = Persistent::new(&ctx, &obj);
            p.make_weak(&ctx, counter.clone(), count_weak);
            assert!(p.clear_weak(&ctx));
            assert!(!p.clear_weak(&ctx));
            ctx.leave(None).unwrap();
            p
        };
        assert_eq!(Rc::strong_count(&counter), 1);

        isolate.collect();
        assert_eq!(counter.get(), 0);

        let ctx = Context::enter(isolate);
        let obj = persistent.value(&ctx).unwrap();
        let tag = ctx.obj_get_prop_name(&obj, "tag").unwrap();
        assert_eq!(ctx.string_value(&tag).as_deref(), Some("strong again"));
        persistent.dispose(&ctx);
    });
}

#[test]
fn test_dispose_cancels_weak_callback() {
    for_each_revision(|isolate| {
        let counter = Rc::new(Cell::new(0u32));
        {
            let ctx = Context::enter(isolate);
            let obj = tagged_object(&ctx, "disposed");
            let p = Persistent::new(&ctx, &obj);
            p.make_weak(&ctx, counter.clone(), count_weak);
            p.dispose(&ctx);
            ctx.leave(None).unwrap();
        }
        isolate.collect();
        assert_eq!(counter.get(), 0);
        assert_eq!(Rc::strong_count(&counter), 1);
    });
}

#[test]
fn test_make_weak_replaces_registration() {
    fn add_ten(_ctx: &Context<'_>, _referent: Value, counter: Rc<Cell<u32>>) {
        counter.set(counter.get() + 10);
    }

    for_each_revision(|isolate| {
        let first = Rc::new(Cell::new(0u32));
        let second = Rc::new(Cell::new(0u32));
        let persistent = {
            let ctx = Context::enter(isolate);
            let obj = tagged_object(&ctx, "twice");
            let p = Persistent::new(&ctx, &obj);
            p.make_weak(&ctx, first.clone(), count_weak);
            p.make_weak(&ctx, second.clone(), add_ten);
            ctx.leave(None).unwrap();
            p
        };

        isolate.collect();
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 10);

        let ctx = Context::enter(isolate);
        persistent.dispose(&ctx);
    });
}

#[test]
fn test_weak_callback_can_use_context() {
    fn store_tag(ctx: &Context<'_>, referent: Value, out: Rc<Cell<Option<usize>>>) {
        let tag = ctx.obj_get_prop_name(&referent, "tag").unwrap();
        out.set(Some(ctx.string_length(&tag)));
    }

    for_each_revision(|isolate| {
        let out = Rc::new(Cell::new(None));
        let persistent = {
            let ctx = Context::enter(isolate);
            let obj = tagged_object(&ctx, "four");
            let p = Persistent::new(&ctx, &obj);
            p.make_weak(&ctx, out.clone(), store_tag);
            ctx.leave(None).unwrap();
            p
        };
        isolate.collect();
        assert_eq!(out.get(), Some(4));

        let ctx = Context::enter(isolate);
        persistent.dispose(&ctx);
    });
}
