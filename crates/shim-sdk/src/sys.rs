//! Engine ABI surface for both supported API revisions
//!
//! Everything in here mirrors what the engine exposes to native code. The
//! shim never dereferences a [`RawHandle`]; it only carries it between the
//! engine and client code.
//!
//! # Revisions
//!
//! ```text
//! Legacy:  fn(&mut Arguments) -> RawHandle
//!          mutable argument list, value returned directly,
//!          callee opens (and escapes out of) its own handle scope
//!
//! Modern:  fn(&FunctionCallbackInfo, &mut ReturnValue)
//!          immutable call info, result written through an out-parameter,
//!          engine opens the handle scope around the call
//! ```

use std::ffi::c_void;
use std::fmt;

use crate::engine::Engine;

/// Opaque reference to an engine value.
///
/// Bit-identical to the engine's own handle representation. Copying a
/// `RawHandle` never copies the referenced data.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawHandle(u64);

impl RawHandle {
    /// Create from raw bits (same encoding as the engine's handle)
    #[inline(always)]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Get the raw bits
    #[inline(always)]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:#x})", self.0)
    }
}

/// Identifies an open handle scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Identifies a long-lived (persistent) engine slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PersistentId(pub u64);

/// Native API revision implemented by an engine build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Revision {
    /// Mutable argument list, direct return, callee-managed scope
    Legacy,
    /// Immutable call info, out-parameter return, engine-managed scope
    Modern,
}

impl Revision {
    /// Lowercase name, as accepted in configuration
    pub const fn name(self) -> &'static str {
        match self {
            Revision::Legacy => "legacy",
            Revision::Modern => "modern",
        }
    }
}

/// Result of an engine operation that may throw.
///
/// The `Err` arm carries the thrown exception value.
pub type EngineResult<T> = Result<T, RawHandle>;

/// Built-in error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Generic `Error`
    Error,
    /// `TypeError` (argument/type mismatch)
    TypeError,
    /// `RangeError` (out-of-bounds numeric/index)
    RangeError,
}

impl ErrorKind {
    /// Constructor name as seen by scripts
    pub const fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
        }
    }
}

/// Key used for property access.
#[derive(Debug, Clone, Copy)]
pub enum PropertyKey<'k> {
    /// Named (string) property
    Name(&'k str),
    /// Indexed property
    Index(u32),
    /// Property keyed by an engine value (string or symbol)
    Value(RawHandle),
}

// ============================================================================
// Finalizers and work closures
// ============================================================================

/// Called once when an external value is collected, with the wrapped pointer.
pub type ExternalFinalizer = Box<dyn FnOnce(*mut c_void)>;

/// Called once when an externally-backed buffer is collected, with its storage.
pub type BufferFinalizer = Box<dyn FnOnce(Box<[u8]>)>;

/// Finalization record attached to a weak persistent slot.
///
/// The engine invokes it at most once, with the referent still alive, when
/// the collector finds the referent otherwise unreachable. Dropping the
/// record without invoking it (for example on `clear_weak`) cancels it.
pub type WeakFinalizer = Box<dyn FnOnce(&dyn Engine, RawHandle)>;

/// Blocking computation submitted to a pool thread.
pub type WorkFn = Box<dyn FnOnce() -> WorkStatus + Send>;

/// Completion delivered on the engine thread after the work ran.
pub type AfterWorkFn = Box<dyn FnOnce(&dyn Engine, WorkStatus)>;

/// Outcome of a queued work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// The work callback returned normally
    Completed,
    /// The work callback panicked; the request's data is still delivered
    Panicked,
}

// ============================================================================
// Legacy calling convention
// ============================================================================

/// Mutable argument list passed to a [`LegacyCallback`].
pub struct Arguments<'a> {
    engine: &'a dyn Engine,
    this: RawHandle,
    callee: RawHandle,
    data: RawHandle,
    values: Vec<RawHandle>,
}

impl<'a> Arguments<'a> {
    /// Assemble an argument list (engine side)
    pub fn new(
        engine: &'a dyn Engine,
        this: RawHandle,
        callee: RawHandle,
        data: RawHandle,
        values: Vec<RawHandle>,
    ) -> Self {
        Self {
            engine,
            this,
            callee,
            data,
            values,
        }
    }

    /// The engine making the call
    pub fn engine(&self) -> &'a dyn Engine {
        self.engine
    }

    /// Number of arguments passed
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no arguments were passed
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument at `index`, or `undefined` past the end
    pub fn get(&self, index: usize) -> RawHandle {
        self.values
            .get(index)
            .copied()
            .unwrap_or_else(|| self.engine.undefined())
    }

    /// Replace an argument in place
    pub fn set(&mut self, index: usize, value: RawHandle) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
    }

    /// Receiver of the call
    pub fn this(&self) -> RawHandle {
        self.this
    }

    /// Function being called
    pub fn callee(&self) -> RawHandle {
        self.callee
    }

    /// Closure data registered with the function
    pub fn data(&self) -> RawHandle {
        self.data
    }
}

/// Native entry point shape for [`Revision::Legacy`].
pub type LegacyCallback = fn(&mut Arguments<'_>) -> RawHandle;

// ============================================================================
// Modern calling convention
// ============================================================================

/// Immutable call information passed to a [`ModernCallback`].
pub struct FunctionCallbackInfo<'a> {
    engine: &'a dyn Engine,
    this: RawHandle,
    callee: RawHandle,
    data: RawHandle,
    values: &'a [RawHandle],
}

impl<'a> FunctionCallbackInfo<'a> {
    /// Assemble call info (engine side)
    pub fn new(
        engine: &'a dyn Engine,
        this: RawHandle,
        callee: RawHandle,
        data: RawHandle,
        values: &'a [RawHandle],
    ) -> Self {
        Self {
            engine,
            this,
            callee,
            data,
            values,
        }
    }

    /// The engine making the call
    pub fn isolate(&self) -> &'a dyn Engine {
        self.engine
    }

    /// Number of arguments passed
    pub fn length(&self) -> usize {
        self.values.len()
    }

    /// Argument at `index`, or `undefined` past the end
    pub fn arg(&self, index: usize) -> RawHandle {
        self.values
            .get(index)
            .copied()
            .unwrap_or_else(|| self.engine.undefined())
    }

    /// Receiver of the call
    pub fn this(&self) -> RawHandle {
        self.this
    }

    /// Function being called
    pub fn callee(&self) -> RawHandle {
        self.callee
    }

    /// Closure data registered with the function
    pub fn data(&self) -> RawHandle {
        self.data
    }
}

/// Out-parameter receiving the result of a [`ModernCallback`].
#[derive(Debug, Default)]
pub struct ReturnValue {
    value: Option<RawHandle>,
}

impl ReturnValue {
    /// Empty return slot (reads as `undefined`)
    pub fn new() -> Self {
        Self { value: None }
    }

    /// Store the result
    pub fn set(&mut self, value: RawHandle) {
        self.value = Some(value);
    }

    /// Stored result, if any
    pub fn get(&self) -> Option<RawHandle> {
        self.value
    }
}

/// Native entry point shape for [`Revision::Modern`].
pub type ModernCallback = fn(&FunctionCallbackInfo<'_>, &mut ReturnValue);

/// A native entry point in either revision's shape.
#[derive(Clone, Copy)]
pub enum NativeCallback {
    /// Legacy shape
    Legacy(LegacyCallback),
    /// Modern shape
    Modern(ModernCallback),
}

impl NativeCallback {
    /// Revision this callback was written for
    pub fn revision(&self) -> Revision {
        match self {
            NativeCallback::Legacy(_) => Revision::Legacy,
            NativeCallback::Modern(_) => Revision::Modern,
        }
    }
}

impl fmt::Debug for NativeCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeCallback::Legacy(_) => write!(f, "NativeCallback::Legacy"),
            NativeCallback::Modern(_) => write!(f, "NativeCallback::Modern"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_handle_bits_roundtrip() {
        let h = RawHandle::from_bits(0x2a);
        assert_eq!(h.to_bits(), 0x2a);
        assert_eq!(format!("{:?}", h), "RawHandle(0x2a)");
    }

    #[test]
    fn test_return_value_defaults_empty() {
        let mut ret = ReturnValue::new();
        assert!(ret.get().is_none());
        ret.set(RawHandle::from_bits(7));
        assert_eq!(ret.get(), Some(RawHandle::from_bits(7)));
    }

    #[test]
    fn test_error_kind_names() {
        assert_eq!(ErrorKind::Error.name(), "Error");
        assert_eq!(ErrorKind::TypeError.name(), "TypeError");
        assert_eq!(ErrorKind::RangeError.name(), "RangeError");
    }
}
