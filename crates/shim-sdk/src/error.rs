//! Error and exception bridge
//!
//! Engine-visible errors (`Error`, `TypeError`, `RangeError`) share one
//! formatting path, a bounded buffer of [`ERROR_LENGTH`] bytes, and one raise
//! path, the context's exception trap. Failures that never reach script code
//! use [`ShimError`].

use std::fmt::{self, Write};

use crate::context::Context;
use crate::sys::{ErrorKind, RawHandle};
use crate::value::{TypeTag, Value};

/// Size of the message buffer, terminator included.
pub const ERROR_LENGTH: usize = 512;

/// Result type for shim-side operations
pub type ShimResult<T> = Result<T, ShimError>;

/// Errors reported to native code rather than to scripts.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ShimError {
    /// A type name string did not match any tag
    #[error("Unknown type tag: {0}")]
    UnknownTypeTag(String),

    /// The engine rejected a callback written for another revision
    #[error("Calling convention mismatch: engine expects {expected}, got {got}")]
    ConventionMismatch {
        /// Revision the engine accepts
        expected: &'static str,
        /// Revision of the offered callback
        got: &'static str,
    },

    /// A persistent handle no longer has a referent
    #[error("Persistent handle {0} is empty")]
    EmptyPersistent(u64),
}

// ============================================================================
// Bounded formatting
// ============================================================================

/// `fmt::Write` sink over a fixed buffer that silently truncates.
struct BoundedWriter {
    buf: [u8; ERROR_LENGTH],
    len: usize,
}

impl BoundedWriter {
    fn new() -> Self {
        Self {
            buf: [0; ERROR_LENGTH],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        // Only whole chars are ever copied in.
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or_default()
    }
}

impl Write for BoundedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // Keep one byte for the terminator, like the engine's C string APIs.
        let room = ERROR_LENGTH - 1 - self.len;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// Render `args` into at most `ERROR_LENGTH - 1` bytes.
pub fn format_message(args: fmt::Arguments<'_>) -> String {
    let mut writer = BoundedWriter::new();
    // Truncation is reported as success, so this cannot fail.
    let _ = writer.write_fmt(args);
    writer.as_str().to_owned()
}

// ============================================================================
// Construct and raise
// ============================================================================

impl<'e> Context<'e> {
    fn format_error(&self, kind: ErrorKind, args: fmt::Arguments<'_>) -> RawHandle {
        let message = format_message(args);
        self.engine().new_error(kind, &message)
    }

    /// Build an error of `kind` without raising it
    pub fn error_of(&self, kind: ErrorKind, args: fmt::Arguments<'_>) -> Value {
        Value::with_tag(self.format_error(kind, args), TypeTag::Object)
    }

    /// Build an `Error` without raising it
    pub fn error_new(&self, args: fmt::Arguments<'_>) -> Value {
        self.error_of(ErrorKind::Error, args)
    }

    /// Build a `TypeError` without raising it
    pub fn type_error_new(&self, args: fmt::Arguments<'_>) -> Value {
        self.error_of(ErrorKind::TypeError, args)
    }

    /// Build a `RangeError` without raising it
    pub fn range_error_new(&self, args: fmt::Arguments<'_>) -> Value {
        self.error_of(ErrorKind::RangeError, args)
    }

    /// Build an error of `kind` and raise it in this context
    pub fn throw_of(&self, kind: ErrorKind, args: fmt::Arguments<'_>) {
        let error = self.format_error(kind, args);
        self.raise(error);
    }

    /// Raise an `Error`
    pub fn throw_error(&self, args: fmt::Arguments<'_>) {
        self.throw_of(ErrorKind::Error, args);
    }

    /// Raise a `TypeError`
    pub fn throw_type_error(&self, args: fmt::Arguments<'_>) {
        self.throw_of(ErrorKind::TypeError, args);
    }

    /// Raise a `RangeError`
    pub fn throw_range_error(&self, args: fmt::Arguments<'_>) {
        self.throw_of(ErrorKind::RangeError, args);
    }

    /// Raise an arbitrary value as the pending exception
    pub fn exception_set(&self, value: &Value) {
        self.raise(value.raw(self.engine()));
    }

    /// The pending exception as a value
    pub fn exception_get(&self) -> Option<Value> {
        self.pending_exception().map(Value::new)
    }
}

/// Build an error value without raising it.
///
/// ```ignore
/// let err = shim_error!(ctx, RangeError, "index {} out of bounds", idx);
/// ```
#[macro_export]
macro_rules! shim_error {
    ($ctx:expr, $kind:ident, $($arg:tt)+) => {
        $ctx.error_of($crate::ErrorKind::$kind, format_args!($($arg)+))
    };
}

/// Build an error and raise it in the context.
///
/// ```ignore
/// shim_throw!(ctx, TypeError, "expected {} arguments", 2);
/// return false;
/// ```
#[macro_export]
macro_rules! shim_throw {
    ($ctx:expr, $kind:ident, $($arg:tt)+) => {
        $ctx.throw_of($crate::ErrorKind::$kind, format_args!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_short_message() {
        let msg = format_message(format_args!("Argument {} not of type {}", 1, TypeTag::Integer));
        assert_eq!(msg, "Argument 1 not of type SHIM_TYPE_INTEGER");
    }

    #[test]
    fn test_format_truncates() {
        let long = "x".repeat(2000);
        let msg = format_message(format_args!("{}", long));
        assert_eq!(msg.len(), ERROR_LENGTH - 1);
    }

    #[test]
    fn test_format_truncates_on_char_boundary() {
        let long = "é".repeat(600);
        let msg = format_message(format_args!("{}", long));
        assert!(msg.len() <= ERROR_LENGTH - 1);
        assert_eq!(msg.chars().count(), 255);
    }

    #[test]
    fn test_shim_error_display() {
        let err = ShimError::EmptyPersistent(3);
        assert_eq!(err.to_string(), "Persistent handle 3 is empty");
        let err: ShimError = "SHIM_TYPE_SYMBOL".parse::<TypeTag>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown type tag: SHIM_TYPE_SYMBOL");
    }
}
