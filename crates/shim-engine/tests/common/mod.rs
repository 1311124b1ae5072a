//! Shared helpers for the integration tests

#![allow(dead_code)]

use shim_engine::{EngineOptions, Isolate};
use shim_sdk::{Context, Revision, Value};

/// Both native API revisions; bridge tests run once per entry
pub const REVISIONS: [Revision; 2] = [Revision::Legacy, Revision::Modern];

/// Small isolate for one test
pub fn isolate(revision: Revision) -> Isolate {
    Isolate::new(EngineOptions {
        revision,
        threadpool_size: 2,
    })
    .unwrap()
}

/// Run `test` against a fresh isolate of each revision
pub fn for_each_revision(test: impl Fn(&Isolate)) {
    for revision in REVISIONS {
        let isolate = isolate(revision);
        test(&isolate);
        assert_eq!(isolate.scope_depth(), 1, "scope leaked under {}", revision.name());
    }
}

/// `message` property of an error value
pub fn message_of(ctx: &Context<'_>, error: &Value) -> String {
    let message = ctx.obj_get_prop_name(error, "message").unwrap();
    ctx.string_value(&message).unwrap()
}
