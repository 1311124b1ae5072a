//! Declarative argument unpacking
//!
//! ```ignore
//! let (mut count, mut name, mut verbose) = (0i64, None, false);
//! if !Unpack::new()
//!     .integer(&mut count)
//!     .string(&mut name)
//!     .boolean(&mut verbose)
//!     .apply(ctx, args)
//! {
//!     return false; // TypeError already raised
//! }
//! ```

use std::ffi::c_void;

use crate::context::Context;
use crate::function::CallArgs;
use crate::value::{TypeTag, Value};

/// Typed destination for one argument.
pub enum Slot<'a> {
    /// Truthiness of a boolean
    Bool(&'a mut bool),
    /// Number with a finite integral value; fractions are rejected
    Integer(&'a mut i64),
    /// Number in `i32` range
    Int32(&'a mut i32),
    /// Number in `u32` range
    Uint32(&'a mut u32),
    /// Any number
    Number(&'a mut f64),
    /// Pointer wrapped by an external
    External(&'a mut *mut c_void),
    /// Storage of a buffer
    Buffer(&'a mut *mut u8),
    /// String value, as an owned wrapper
    String(&'a mut Option<Value>),
}

impl Slot<'_> {
    /// Type an argument must have to fill this slot
    pub fn tag(&self) -> TypeTag {
        match self {
            Slot::Bool(_) => TypeTag::Bool,
            Slot::Integer(_) => TypeTag::Integer,
            Slot::Int32(_) => TypeTag::Int32,
            Slot::Uint32(_) => TypeTag::Uint32,
            Slot::Number(_) => TypeTag::Number,
            Slot::External(_) => TypeTag::External,
            Slot::Buffer(_) => TypeTag::Buffer,
            Slot::String(_) => TypeTag::String,
        }
    }
}

/// Store argument `index` into `slot` if it has the slot's type.
///
/// On failure the destination is left untouched and nothing is raised.
pub fn unpack_one(ctx: &Context<'_>, args: &CallArgs, index: usize, slot: Slot<'_>) -> bool {
    let Some(arg) = args.get(index) else {
        return false;
    };
    if !ctx.is(arg, slot.tag()) {
        return false;
    }

    match slot {
        Slot::Bool(out) => *out = ctx.boolean_value(arg),
        Slot::Integer(out) => *out = ctx.integer_value(arg),
        Slot::Int32(out) => *out = ctx.int32_value(arg),
        Slot::Uint32(out) => *out = ctx.uint32_value(arg),
        Slot::Number(out) => *out = ctx.number_value(arg),
        Slot::External(out) => match ctx.external_value(arg) {
            Some(ptr) => *out = ptr,
            None => return false,
        },
        Slot::Buffer(out) => match ctx.buffer_value(arg) {
            Some(ptr) => *out = ptr,
            None => return false,
        },
        Slot::String(out) => *out = Some(arg.alias()),
    }
    true
}

/// Builder for a left-to-right list of argument destinations.
#[derive(Default)]
pub struct Unpack<'a> {
    slots: Vec<Slot<'a>>,
}

impl<'a> Unpack<'a> {
    /// Empty list
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Append an arbitrary slot
    pub fn slot(mut self, slot: Slot<'a>) -> Self {
        self.slots.push(slot);
        self
    }

    /// Next argument is a boolean
    pub fn boolean(self, out: &'a mut bool) -> Self {
        self.slot(Slot::Bool(out))
    }

    /// Next argument is an integral number
    pub fn integer(self, out: &'a mut i64) -> Self {
        self.slot(Slot::Integer(out))
    }

    /// Next argument is an `i32`
    pub fn int32(self, out: &'a mut i32) -> Self {
        self.slot(Slot::Int32(out))
    }

    /// Next argument is a `u32`
    pub fn uint32(self, out: &'a mut u32) -> Self {
        self.slot(Slot::Uint32(out))
    }

    /// Next argument is a number
    pub fn number(self, out: &'a mut f64) -> Self {
        self.slot(Slot::Number(out))
    }

    /// Next argument is an external
    pub fn external(self, out: &'a mut *mut c_void) -> Self {
        self.slot(Slot::External(out))
    }

    /// Next argument is a buffer
    pub fn buffer(self, out: &'a mut *mut u8) -> Self {
        self.slot(Slot::Buffer(out))
    }

    /// Next argument is a string
    pub fn string(self, out: &'a mut Option<Value>) -> Self {
        self.slot(Slot::String(out))
    }

    /// Number of destinations
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no destinations were added
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fill the destinations from `args`, in order.
    ///
    /// Destinations past the number of passed arguments are skipped. The
    /// first argument of the wrong type raises a `TypeError` naming its
    /// index and the expected type, and stops the walk.
    pub fn apply(self, ctx: &Context<'_>, args: &CallArgs) -> bool {
        for (index, slot) in self.slots.into_iter().enumerate().take(args.len()) {
            let tag = slot.tag();
            if !unpack_one(ctx, args, index, slot) {
                crate::shim_throw!(ctx, TypeError, "Argument {} not of type {}", index, tag);
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_order() {
        let (mut a, mut b, mut c) = (0i64, None, false);
        let unpack = Unpack::new().integer(&mut a).string(&mut b).boolean(&mut c);
        let tags: Vec<TypeTag> = unpack.slots.iter().map(Slot::tag).collect();
        assert_eq!(tags, vec![TypeTag::Integer, TypeTag::String, TypeTag::Bool]);
        assert_eq!(unpack.len(), 3);
    }

    #[test]
    fn test_slot_tags() {
        let mut ptr = std::ptr::null_mut::<c_void>();
        let mut buf = std::ptr::null_mut::<u8>();
        let mut n = 0.0;
        assert_eq!(Slot::External(&mut ptr).tag(), TypeTag::External);
        assert_eq!(Slot::Buffer(&mut buf).tag(), TypeTag::Buffer);
        assert_eq!(Slot::Number(&mut n).tag(), TypeTag::Number);
        assert!(Unpack::new().is_empty());
    }
}
