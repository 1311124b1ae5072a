//! Tagged values - the currency of the shim API
//!
//! A [`Value`] pairs an engine handle with an advisory [`TypeTag`]. The tag
//! is a cache, never a promise: `Unknown` is always valid, and every
//! tag-specific operation goes through [`Context::is`], which performs the
//! live engine check and memoizes a positive answer.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::context::Context;
use crate::engine::Engine;
use crate::error::ShimError;
use crate::sys::RawHandle;

// ============================================================================
// Type tags
// ============================================================================

/// Semantic type of a value, as far as the shim knows it.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Not yet checked
    Unknown = 0,
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean primitive
    Bool,
    /// Number with an integral value
    Integer,
    /// Number representable as `i32`
    Int32,
    /// Number representable as `u32`
    Uint32,
    /// Any number
    Number,
    /// String primitive
    String,
    /// Array object
    Array,
    /// Any object
    Object,
    /// Callable object
    Function,
    /// Wrapped native pointer
    External,
    /// Date object
    Date,
    /// Host byte buffer
    Buffer,
}

impl TypeTag {
    /// Every tag, in declaration order
    pub const ALL: [TypeTag; 15] = [
        TypeTag::Unknown,
        TypeTag::Undefined,
        TypeTag::Null,
        TypeTag::Bool,
        TypeTag::Integer,
        TypeTag::Int32,
        TypeTag::Uint32,
        TypeTag::Number,
        TypeTag::String,
        TypeTag::Array,
        TypeTag::Object,
        TypeTag::Function,
        TypeTag::External,
        TypeTag::Date,
        TypeTag::Buffer,
    ];

    /// Stable identifier used in diagnostics
    pub const fn as_str(self) -> &'static str {
        match self {
            TypeTag::Unknown => "SHIM_TYPE_UNKNOWN",
            TypeTag::Undefined => "SHIM_TYPE_UNDEFINED",
            TypeTag::Null => "SHIM_TYPE_NULL",
            TypeTag::Bool => "SHIM_TYPE_BOOL",
            TypeTag::Integer => "SHIM_TYPE_INTEGER",
            TypeTag::Int32 => "SHIM_TYPE_INT32",
            TypeTag::Uint32 => "SHIM_TYPE_UINT32",
            TypeTag::Number => "SHIM_TYPE_NUMBER",
            TypeTag::String => "SHIM_TYPE_STRING",
            TypeTag::Array => "SHIM_TYPE_ARRAY",
            TypeTag::Object => "SHIM_TYPE_OBJECT",
            TypeTag::Function => "SHIM_TYPE_FUNCTION",
            TypeTag::External => "SHIM_TYPE_EXTERNAL",
            TypeTag::Date => "SHIM_TYPE_DATE",
            TypeTag::Buffer => "SHIM_TYPE_BUFFER",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = ShimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeTag::ALL
            .iter()
            .copied()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| ShimError::UnknownTypeTag(s.to_string()))
    }
}

// ============================================================================
// Value
// ============================================================================

/// Who is responsible for releasing a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Allocated for the holder; released exactly once by the holder
    Owned,
    /// Lent by the shim (call slots, module arguments); released by the shim
    Borrowed,
    /// One of the handle-less `undefined`/`null` singletons; never released
    Singleton,
}

/// An engine handle with an advisory type tag.
///
/// Not `Sync`, and tied to the engine thread by convention: values must never
/// be handed to a work callback.
pub struct Value {
    handle: Option<RawHandle>,
    tag: Cell<TypeTag>,
    ownership: Ownership,
    _not_sync: PhantomData<*const ()>,
}

impl Value {
    /// The `undefined` singleton
    pub const UNDEFINED: Value = Value {
        handle: None,
        tag: Cell::new(TypeTag::Undefined),
        ownership: Ownership::Singleton,
        _not_sync: PhantomData,
    };

    /// The `null` singleton
    pub const NULL: Value = Value {
        handle: None,
        tag: Cell::new(TypeTag::Null),
        ownership: Ownership::Singleton,
        _not_sync: PhantomData,
    };

    /// Wrap a raw handle the caller will own, with an unchecked tag
    pub fn new(handle: RawHandle) -> Self {
        Self::with_tag(handle, TypeTag::Unknown)
    }

    /// Wrap a raw handle the caller will own, with a known tag
    pub fn with_tag(handle: RawHandle, tag: TypeTag) -> Self {
        Self {
            handle: Some(handle),
            tag: Cell::new(tag),
            ownership: Ownership::Owned,
            _not_sync: PhantomData,
        }
    }

    /// Wrap a raw handle that stays owned by the shim
    pub(crate) fn borrowed(handle: RawHandle) -> Self {
        Self {
            handle: Some(handle),
            tag: Cell::new(TypeTag::Unknown),
            ownership: Ownership::Borrowed,
            _not_sync: PhantomData,
        }
    }

    /// The `undefined` singleton
    pub const fn undefined() -> Self {
        Self::UNDEFINED
    }

    /// The `null` singleton
    pub const fn null() -> Self {
        Self::NULL
    }

    /// Underlying handle; `None` for the singletons
    pub fn handle(&self) -> Option<RawHandle> {
        self.handle
    }

    /// Handle to pass to the engine, resolving the singletons
    pub fn raw(&self, engine: &dyn Engine) -> RawHandle {
        match self.handle {
            Some(handle) => handle,
            None if self.tag.get() == TypeTag::Null => engine.null(),
            None => engine.undefined(),
        }
    }

    /// Currently cached tag
    pub fn tag(&self) -> TypeTag {
        self.tag.get()
    }

    /// Ownership of this wrapper
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Whether this is one of the `undefined`/`null` singletons
    pub fn is_singleton(&self) -> bool {
        self.ownership == Ownership::Singleton
    }

    /// Another owned wrapper around the same handle and tag
    ///
    /// Singletons alias to themselves.
    pub fn alias(&self) -> Self {
        match self.handle {
            Some(handle) => Self::with_tag(handle, self.tag.get()),
            None => Self {
                handle: None,
                tag: Cell::new(self.tag.get()),
                ownership: Ownership::Singleton,
                _not_sync: PhantomData,
            },
        }
    }

    /// Record a positive live check
    pub(crate) fn memoize(&self, tag: TypeTag) {
        if self.ownership != Ownership::Singleton && tag != TypeTag::Unknown {
            self.tag.set(tag);
        }
    }

    /// Release an owned wrapper.
    ///
    /// Returns `true` when the wrapper was owned by the caller. Releasing a
    /// singleton or a borrowed slot value is a logged no-op.
    pub fn release(self) -> bool {
        match self.ownership {
            Ownership::Owned => true,
            Ownership::Borrowed => {
                log::warn!("release of a borrowed {} value ignored", self.tag.get());
                false
            }
            Ownership::Singleton => {
                log::warn!("release of the {} singleton ignored", self.tag.get());
                false
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("handle", &self.handle)
            .field("tag", &self.tag.get())
            .field("ownership", &self.ownership)
            .finish()
    }
}

// ============================================================================
// Type checks and coercion
// ============================================================================

impl<'e> Context<'e> {
    /// Check, without coercing, whether `value` is of type `tag`.
    ///
    /// A matching cached tag answers immediately. Otherwise the engine is
    /// asked, and a positive answer is memoized onto `value`.
    pub fn is(&self, value: &Value, tag: TypeTag) -> bool {
        if value.tag() == tag {
            return true;
        }

        let engine = self.engine();
        let raw = value.raw(engine);
        let matches = match tag {
            TypeTag::Object => engine.is_object(raw),
            TypeTag::String => engine.is_string(raw),
            TypeTag::Number => engine.is_number(raw),
            TypeTag::Integer => engine.is_number(raw) && is_integral(engine.number_value(raw)),
            TypeTag::Int32 => engine.is_int32(raw),
            TypeTag::Uint32 => engine.is_uint32(raw),
            TypeTag::Array => engine.is_array(raw),
            TypeTag::Bool => engine.is_boolean(raw),
            TypeTag::Undefined => engine.is_undefined(raw),
            TypeTag::Null => engine.is_null(raw),
            TypeTag::External => engine.is_external(raw),
            TypeTag::Date => engine.is_date(raw),
            TypeTag::Function => engine.is_function(raw),
            TypeTag::Buffer => engine.is_buffer(raw),
            TypeTag::Unknown => false,
        };

        if matches {
            value.memoize(tag);
        }
        matches
    }

    /// Convert `value` to `tag` using the engine's coercion rules.
    ///
    /// Returns the same handle when the cached tag already matches. Fails
    /// for `Unknown`, `Date` and `Buffer` targets. An exception thrown by the
    /// engine during coercion is left in this context's trap.
    pub fn coerce_to(&self, value: &Value, tag: TypeTag) -> Option<Value> {
        if value.tag() == tag {
            return Some(value.alias());
        }

        let raw = value.raw(self.engine());
        let handle = match tag {
            TypeTag::Undefined => return Some(Value::UNDEFINED),
            TypeTag::Null => return Some(Value::NULL),
            TypeTag::Bool => self.engine().to_boolean(raw),
            TypeTag::Array => self.to_array(raw)?,
            TypeTag::Object => self.to_object(raw)?,
            TypeTag::Integer => self.to_integer(raw)?,
            TypeTag::Int32 => self.to_int32(raw)?,
            TypeTag::Uint32 => self.to_uint32(raw)?,
            TypeTag::Number => self.to_number(raw)?,
            TypeTag::External => self.to_external(raw)?,
            TypeTag::Function => self.to_function(raw)?,
            TypeTag::String => self.to_string_handle(raw)?,
            TypeTag::Date | TypeTag::Buffer | TypeTag::Unknown => return None,
        };

        Some(Value::with_tag(handle, tag))
    }
}

/// Finite with no fractional part
pub(crate) fn is_integral(n: f64) -> bool {
    n.is_finite() && n.trunc() == n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_are_stable() {
        assert_eq!(TypeTag::Number.as_str(), "SHIM_TYPE_NUMBER");
        assert_eq!(TypeTag::Integer.to_string(), "SHIM_TYPE_INTEGER");
        assert_eq!(TypeTag::Unknown.as_str(), "SHIM_TYPE_UNKNOWN");
        assert_eq!(TypeTag::Buffer.as_str(), "SHIM_TYPE_BUFFER");
    }

    #[test]
    fn test_type_name_parse_roundtrip() {
        for tag in TypeTag::ALL {
            assert_eq!(tag.as_str().parse::<TypeTag>().unwrap(), tag);
        }
        assert!("SHIM_TYPE_SYMBOL".parse::<TypeTag>().is_err());
    }

    #[test]
    fn test_singletons_never_released() {
        assert!(Value::UNDEFINED.handle().is_none());
        assert!(Value::NULL.handle().is_none());
        assert!(!Value::undefined().release());
        assert!(!Value::null().release());
        assert_eq!(Value::NULL.ownership(), Ownership::Singleton);
    }

    #[test]
    fn test_owned_release() {
        let v = Value::new(RawHandle::from_bits(9));
        assert_eq!(v.tag(), TypeTag::Unknown);
        assert_eq!(v.ownership(), Ownership::Owned);
        assert!(v.release());
    }

    #[test]
    fn test_singleton_tag_not_memoized() {
        let v = Value::null();
        v.memoize(TypeTag::Object);
        assert_eq!(v.tag(), TypeTag::Null);
    }

    #[test]
    fn test_alias_keeps_handle_and_tag() {
        let v = Value::with_tag(RawHandle::from_bits(3), TypeTag::String);
        let a = v.alias();
        assert_eq!(a.handle(), v.handle());
        assert_eq!(a.tag(), TypeTag::String);
        assert_eq!(Value::UNDEFINED.alias().ownership(), Ownership::Singleton);
    }

    #[test]
    fn test_is_integral() {
        assert!(is_integral(10.0));
        assert!(is_integral(-3.0));
        assert!(!is_integral(1.5));
        assert!(!is_integral(f64::NAN));
        assert!(!is_integral(f64::INFINITY));
    }
}
