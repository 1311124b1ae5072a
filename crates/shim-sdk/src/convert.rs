//! Value constructors, readers and the conversion helpers behind them
//!
//! Every accessor funnels through one of the `to_*` helpers at the bottom of
//! this file, so a given target type is always produced the same way.

use std::ffi::c_void;

use crate::context::Context;
use crate::sys::{BufferFinalizer, PropertyKey, RawHandle};
use crate::value::{TypeTag, Value};

impl<'e> Context<'e> {
    // ========================================================================
    // Numbers
    // ========================================================================

    /// New number
    pub fn number_new(&self, n: f64) -> Value {
        Value::with_tag(self.engine().new_number(n), TypeTag::Number)
    }

    /// Numeric value (NaN when not convertible)
    pub fn number_value(&self, value: &Value) -> f64 {
        self.engine().number_value(value.raw(self.engine()))
    }

    /// New integer from an `i32`
    pub fn integer_new(&self, i: i32) -> Value {
        Value::with_tag(self.engine().new_number(f64::from(i)), TypeTag::Int32)
    }

    /// New integer from a `u32`
    pub fn integer_uint(&self, i: u32) -> Value {
        Value::with_tag(self.engine().new_number(f64::from(i)), TypeTag::Uint32)
    }

    /// Value as `i64`, truncated toward zero (0 for NaN, saturating)
    pub fn integer_value(&self, value: &Value) -> i64 {
        integer_of(self.number_value(value))
    }

    /// Value as `i32` with ToInt32 wrapping
    pub fn int32_value(&self, value: &Value) -> i32 {
        int32_of(self.number_value(value))
    }

    /// Value as `u32` with ToUint32 wrapping
    pub fn uint32_value(&self, value: &Value) -> u32 {
        uint32_of(self.number_value(value))
    }

    // ========================================================================
    // Booleans
    // ========================================================================

    /// New boolean
    pub fn boolean_new(&self, b: bool) -> Value {
        Value::with_tag(self.engine().new_boolean(b), TypeTag::Bool)
    }

    /// Truthiness of `value`
    pub fn boolean_value(&self, value: &Value) -> bool {
        self.engine().boolean_value(value.raw(self.engine()))
    }

    // ========================================================================
    // Strings
    // ========================================================================

    /// New empty string
    pub fn string_new(&self) -> Value {
        self.string_new_copy("")
    }

    /// New string copied from `data`
    pub fn string_new_copy(&self, data: &str) -> Value {
        Value::with_tag(self.engine().new_string(data), TypeTag::String)
    }

    /// New string from the first `len` bytes of `data` (lossy UTF-8)
    pub fn string_new_copyn(&self, data: &[u8], len: usize) -> Value {
        let bytes = &data[..len.min(data.len())];
        self.string_new_copy(&String::from_utf8_lossy(bytes))
    }

    /// Length in UTF-16 code units
    pub fn string_length(&self, value: &Value) -> usize {
        match self.to_string_handle(value.raw(self.engine())) {
            Some(s) => self.engine().string_length(s),
            None => 0,
        }
    }

    /// Length of the UTF-8 encoding
    pub fn string_length_utf8(&self, value: &Value) -> usize {
        self.string_value(value).map_or(0, |s| s.len())
    }

    /// UTF-8 contents; `None` if string conversion threw
    pub fn string_value(&self, value: &Value) -> Option<String> {
        let s = self.to_string_handle(value.raw(self.engine()))?;
        self.engine().string_utf8(s)
    }

    /// Write up to `len` characters starting at character `start` into
    /// `buf` as 7-bit ASCII. Returns the number of bytes written.
    pub fn string_write_ascii(&self, value: &Value, buf: &mut [u8], start: usize, len: usize) -> usize {
        let Some(s) = self.string_value(value) else {
            return 0;
        };
        let mut written = 0;
        for (slot, ch) in buf.iter_mut().zip(s.chars().skip(start).take(len)) {
            *slot = (u32::from(ch) & 0x7f) as u8;
            written += 1;
        }
        written
    }

    // ========================================================================
    // Arrays
    // ========================================================================

    /// New array with `len` holes
    pub fn array_new(&self, len: usize) -> Value {
        Value::with_tag(self.engine().new_array(len), TypeTag::Array)
    }

    /// Array length (0 for non-arrays)
    pub fn array_length(&self, array: &Value) -> usize {
        self.to_array(array.raw(self.engine()))
            .map_or(0, |a| self.engine().array_length(a))
    }

    /// Element at `index`
    pub fn array_get(&self, array: &Value, index: u32) -> Option<Value> {
        let a = self.to_array(array.raw(self.engine()))?;
        let element = self.catch(self.engine().get(a, PropertyKey::Index(index)))?;
        Some(Value::new(element))
    }

    /// Store `value` at `index`
    pub fn array_set(&self, array: &Value, index: u32, value: &Value) -> bool {
        let Some(a) = self.to_array(array.raw(self.engine())) else {
            return false;
        };
        let v = value.raw(self.engine());
        self.catch(self.engine().set(a, PropertyKey::Index(index), v))
            .unwrap_or(false)
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    /// New zero-filled buffer of `len` bytes
    pub fn buffer_new(&self, len: usize) -> Value {
        let data = vec![0u8; len].into_boxed_slice();
        Value::with_tag(self.engine().new_buffer(data, None), TypeTag::Buffer)
    }

    /// New buffer holding a copy of `data`
    pub fn buffer_new_copy(&self, data: &[u8]) -> Value {
        let data: Box<[u8]> = data.into();
        Value::with_tag(self.engine().new_buffer(data, None), TypeTag::Buffer)
    }

    /// New buffer using `data` in place
    ///
    /// `on_free` gets the storage back once the engine collects the buffer.
    pub fn buffer_new_external<F>(&self, data: Box<[u8]>, on_free: F) -> Value
    where
        F: FnOnce(Box<[u8]>) + 'static,
    {
        let on_free: BufferFinalizer = Box::new(on_free);
        Value::with_tag(self.engine().new_buffer(data, Some(on_free)), TypeTag::Buffer)
    }

    /// Pointer to the buffer's storage; valid while the buffer is reachable
    pub fn buffer_value(&self, value: &Value) -> Option<*mut u8> {
        if !self.is(value, TypeTag::Buffer) {
            return None;
        }
        self.engine()
            .buffer_data(value.raw(self.engine()))
            .map(|(ptr, _)| ptr)
    }

    /// Buffer size in bytes (0 for non-buffers)
    pub fn buffer_length(&self, value: &Value) -> usize {
        if !self.is(value, TypeTag::Buffer) {
            return 0;
        }
        self.engine()
            .buffer_data(value.raw(self.engine()))
            .map_or(0, |(_, len)| len)
    }

    /// Copy of the buffer's contents
    pub fn buffer_to_vec(&self, value: &Value) -> Option<Vec<u8>> {
        if !self.is(value, TypeTag::Buffer) {
            return None;
        }
        let (ptr, len) = self.engine().buffer_data(value.raw(self.engine()))?;
        // SAFETY: the engine guarantees `len` readable bytes at `ptr` while
        // the buffer is reachable, and `value` keeps it reachable.
        let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
        Some(bytes.to_vec())
    }

    // ========================================================================
    // Externals and dates
    // ========================================================================

    /// Wrap a native pointer
    pub fn external_new(&self, data: *mut c_void) -> Value {
        Value::with_tag(self.engine().new_external(data, None), TypeTag::External)
    }

    /// Pointer wrapped by an external
    pub fn external_value(&self, value: &Value) -> Option<*mut c_void> {
        let e = self.to_external(value.raw(self.engine()))?;
        self.engine().external_value(e)
    }

    /// New date from milliseconds since the epoch
    pub fn date_new(&self, millis: f64) -> Value {
        Value::with_tag(self.engine().new_date(millis), TypeTag::Date)
    }

    /// Milliseconds since the epoch (NaN for non-dates)
    pub fn date_value(&self, value: &Value) -> f64 {
        if !self.is(value, TypeTag::Date) {
            return f64::NAN;
        }
        self.engine().date_value(value.raw(self.engine()))
    }

    // ========================================================================
    // Conversion helpers
    // ========================================================================

    pub(crate) fn to_array(&self, raw: RawHandle) -> Option<RawHandle> {
        self.engine().is_array(raw).then_some(raw)
    }

    pub(crate) fn to_object(&self, raw: RawHandle) -> Option<RawHandle> {
        if self.engine().is_object(raw) {
            return Some(raw);
        }
        self.catch(self.engine().to_object(raw))
    }

    pub(crate) fn to_function(&self, raw: RawHandle) -> Option<RawHandle> {
        self.engine().is_function(raw).then_some(raw)
    }

    pub(crate) fn to_external(&self, raw: RawHandle) -> Option<RawHandle> {
        self.engine().is_external(raw).then_some(raw)
    }

    pub(crate) fn to_number(&self, raw: RawHandle) -> Option<RawHandle> {
        if self.engine().is_number(raw) {
            return Some(raw);
        }
        self.catch(self.engine().to_number(raw))
    }

    pub(crate) fn to_integer(&self, raw: RawHandle) -> Option<RawHandle> {
        let n = self.to_number(raw)?;
        let value = self.engine().number_value(n);
        if crate::value::is_integral(value) {
            return Some(n);
        }
        Some(self.engine().new_number(integer_of(value) as f64))
    }

    pub(crate) fn to_int32(&self, raw: RawHandle) -> Option<RawHandle> {
        if self.engine().is_int32(raw) {
            return Some(raw);
        }
        self.catch(self.engine().to_int32(raw))
    }

    pub(crate) fn to_uint32(&self, raw: RawHandle) -> Option<RawHandle> {
        if self.engine().is_uint32(raw) {
            return Some(raw);
        }
        self.catch(self.engine().to_uint32(raw))
    }

    pub(crate) fn to_string_handle(&self, raw: RawHandle) -> Option<RawHandle> {
        if self.engine().is_string(raw) {
            return Some(raw);
        }
        self.catch(self.engine().to_string(raw))
    }
}

// ============================================================================
// Numeric conversions
// ============================================================================

/// Truncate toward zero; NaN becomes 0, infinities saturate
pub(crate) fn integer_of(n: f64) -> i64 {
    if n.is_nan() {
        0
    } else {
        // `as` saturates out-of-range floats.
        n.trunc() as i64
    }
}

/// ECMAScript ToUint32 on an already-numeric value
pub fn uint32_of(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    let m = n.trunc().rem_euclid(4_294_967_296.0);
    m as u32
}

/// ECMAScript ToInt32 on an already-numeric value
pub fn int32_of(n: f64) -> i32 {
    uint32_of(n) as i32
}
