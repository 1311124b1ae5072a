//! Engine trait - the embedding API the shim is written against
//!
//! An engine build provides one implementation of this trait. The shim only
//! ever talks to `&dyn Engine`, so client extensions compile once and run on
//! every revision the engine family has shipped.
//!
//! Every method takes `&self`: native callbacks re-enter the engine while it
//! is in the middle of a call, so implementations rely on interior
//! mutability and must never hold a borrow across a callback.

use std::ffi::c_void;

use crate::sys::{
    AfterWorkFn, BufferFinalizer, EngineResult, ErrorKind, ExternalFinalizer, NativeCallback,
    PersistentId, PropertyKey, RawHandle, Revision, ScopeId, WeakFinalizer, WorkFn,
};

/// Abstract engine instance.
pub trait Engine {
    /// Native API revision this engine accepts callbacks for
    fn revision(&self) -> Revision;

    // ========================================================================
    // Handle scopes
    // ========================================================================

    /// Open a handle scope; handles created from now on belong to it
    fn open_scope(&self) -> ScopeId;

    /// Close a scope, optionally escaping one handle into the parent scope
    fn close_scope(&self, scope: ScopeId, escape: Option<RawHandle>) -> Option<RawHandle>;

    // ========================================================================
    // Exceptions
    // ========================================================================

    /// Schedule `exception` to be thrown when control returns to the engine
    fn throw(&self, exception: RawHandle);

    // ========================================================================
    // Oddballs and predicates
    // ========================================================================

    /// The `undefined` value
    fn undefined(&self) -> RawHandle;

    /// The `null` value
    fn null(&self) -> RawHandle;

    /// Is `undefined`
    fn is_undefined(&self, value: RawHandle) -> bool;

    /// Is `null`
    fn is_null(&self, value: RawHandle) -> bool;

    /// Is a boolean primitive
    fn is_boolean(&self, value: RawHandle) -> bool;

    /// Is a number primitive
    fn is_number(&self, value: RawHandle) -> bool;

    /// Is a number representable as a signed 32-bit integer
    fn is_int32(&self, value: RawHandle) -> bool;

    /// Is a number representable as an unsigned 32-bit integer
    fn is_uint32(&self, value: RawHandle) -> bool;

    /// Is a string primitive
    fn is_string(&self, value: RawHandle) -> bool;

    /// Is an object (includes arrays, functions, dates, buffers)
    fn is_object(&self, value: RawHandle) -> bool;

    /// Is an array
    fn is_array(&self, value: RawHandle) -> bool;

    /// Is callable
    fn is_function(&self, value: RawHandle) -> bool;

    /// Is an external pointer wrapper
    fn is_external(&self, value: RawHandle) -> bool;

    /// Is a date
    fn is_date(&self, value: RawHandle) -> bool;

    /// Is a host buffer
    fn is_buffer(&self, value: RawHandle) -> bool;

    // ========================================================================
    // Coercions
    // ========================================================================

    /// ToBoolean (never throws)
    fn to_boolean(&self, value: RawHandle) -> RawHandle;

    /// ToNumber
    fn to_number(&self, value: RawHandle) -> EngineResult<RawHandle>;

    /// ToInt32
    fn to_int32(&self, value: RawHandle) -> EngineResult<RawHandle>;

    /// ToUint32
    fn to_uint32(&self, value: RawHandle) -> EngineResult<RawHandle>;

    /// ToObject (throws on `undefined`/`null`)
    fn to_object(&self, value: RawHandle) -> EngineResult<RawHandle>;

    /// ToString
    fn to_string(&self, value: RawHandle) -> EngineResult<RawHandle>;

    // ========================================================================
    // Readers
    // ========================================================================

    /// Truthiness of any value
    fn boolean_value(&self, value: RawHandle) -> bool;

    /// Numeric value (NaN where ToNumber would fail)
    fn number_value(&self, value: RawHandle) -> f64;

    /// UTF-8 contents of a string value
    fn string_utf8(&self, value: RawHandle) -> Option<String>;

    /// Length of a string value in UTF-16 code units
    fn string_length(&self, value: RawHandle) -> usize;

    /// Milliseconds since the epoch of a date value
    fn date_value(&self, value: RawHandle) -> f64;

    /// Length of an array value
    fn array_length(&self, value: RawHandle) -> usize;

    /// Backing storage of a buffer value
    ///
    /// The pointer stays valid while the buffer is reachable.
    fn buffer_data(&self, value: RawHandle) -> Option<(*mut u8, usize)>;

    /// Pointer wrapped by an external value
    fn external_value(&self, value: RawHandle) -> Option<*mut c_void>;

    // ========================================================================
    // Constructors
    // ========================================================================

    /// New boolean
    fn new_boolean(&self, value: bool) -> RawHandle;

    /// New number
    fn new_number(&self, value: f64) -> RawHandle;

    /// New string
    fn new_string(&self, value: &str) -> RawHandle;

    /// Interned symbol; the same description yields the same handle
    fn symbol(&self, description: &str) -> RawHandle;

    /// New plain object
    fn new_object(&self) -> RawHandle;

    /// New array with `len` holes
    fn new_array(&self, len: usize) -> RawHandle;

    /// New date
    fn new_date(&self, millis: f64) -> RawHandle;

    /// New error object of the given kind
    fn new_error(&self, kind: ErrorKind, message: &str) -> RawHandle;

    /// New buffer taking ownership of `data`
    ///
    /// `on_free` receives the storage back when the buffer is collected.
    fn new_buffer(&self, data: Box<[u8]>, on_free: Option<BufferFinalizer>) -> RawHandle;

    /// New external wrapping `ptr`
    ///
    /// `finalizer` runs once when the external is collected.
    fn new_external(&self, ptr: *mut c_void, finalizer: Option<ExternalFinalizer>) -> RawHandle;

    /// New native function
    ///
    /// Fails with a thrown `TypeError` when `callback` is not in this
    /// engine's revision shape.
    fn new_function(
        &self,
        name: &str,
        arity: usize,
        callback: NativeCallback,
        data: RawHandle,
    ) -> EngineResult<RawHandle>;

    // ========================================================================
    // Object operations
    // ========================================================================

    /// `obj[key]`
    fn get(&self, object: RawHandle, key: PropertyKey<'_>) -> EngineResult<RawHandle>;

    /// `obj[key] = value`
    fn set(&self, object: RawHandle, key: PropertyKey<'_>, value: RawHandle) -> EngineResult<bool>;

    /// `key in obj`
    fn has(&self, object: RawHandle, key: PropertyKey<'_>) -> EngineResult<bool>;

    /// Replace the prototype of `object`
    fn set_prototype(&self, object: RawHandle, prototype: RawHandle) -> bool;

    /// Read a hidden (script-invisible) value
    fn get_hidden(&self, object: RawHandle, key: RawHandle) -> Option<RawHandle>;

    /// Store a hidden (script-invisible) value
    fn set_hidden(&self, object: RawHandle, key: RawHandle, value: RawHandle) -> bool;

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Call `function` with `receiver` bound to `this`
    fn call(
        &self,
        function: RawHandle,
        receiver: RawHandle,
        args: &[RawHandle],
    ) -> EngineResult<RawHandle>;

    /// Call from native code into the host, running the host's post-call hooks
    fn make_callback(
        &self,
        function: RawHandle,
        receiver: RawHandle,
        args: &[RawHandle],
    ) -> EngineResult<RawHandle> {
        self.call(function, receiver, args)
    }

    /// `new constructor(...args)`
    fn construct(&self, constructor: RawHandle, args: &[RawHandle]) -> EngineResult<RawHandle>;

    // ========================================================================
    // Persistent slots
    // ========================================================================

    /// Root `value` in a slot that outlives every handle scope
    fn persistent_new(&self, value: RawHandle) -> PersistentId;

    /// Current referent of a slot, as a handle in the current scope
    ///
    /// `None` once the slot was disposed or its weak referent reclaimed.
    fn persistent_get(&self, id: PersistentId) -> Option<RawHandle>;

    /// Release a slot; cancels any pending weak finalizer
    fn persistent_dispose(&self, id: PersistentId);

    /// Demote a slot to weak and attach its finalization record
    fn make_weak(&self, id: PersistentId, finalizer: WeakFinalizer);

    /// Promote a slot back to strong, dropping any finalization record
    ///
    /// Returns whether a record was pending.
    fn clear_weak(&self, id: PersistentId) -> bool;

    // ========================================================================
    // Work submission
    // ========================================================================

    /// Run `work` on a pool thread, then `after` on the engine thread
    fn queue_work(&self, work: WorkFn, after: AfterWorkFn);
}
