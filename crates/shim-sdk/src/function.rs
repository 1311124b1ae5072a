//! Function bridge: registering native functions and calling back into the engine
//!
//! A native function is a plain `fn(&Context, &mut CallArgs) -> bool`. The
//! bridge boxes it in a [`FunctionHolder`] together with the caller's data
//! and hands the engine one of the two revision-specific entry points from
//! [`crate::adapter`]. The holder is owned by an engine external whose
//! finalizer frees it when the function value is collected.

use std::any::Any;
use std::ffi::c_void;
use std::rc::Rc;

use crate::adapter::callback_for;
use crate::context::Context;
use crate::sys::{ExternalFinalizer, PropertyKey, RawHandle};
use crate::value::{TypeTag, Value};

/// Signature of a native function callable from scripts.
///
/// Return `true` on success, with [`CallArgs::set_return`] holding the
/// result (default `undefined`). Return `false` after raising an error
/// through the context to make the call throw.
pub type NativeFn = fn(&Context<'_>, &mut CallArgs) -> bool;

/// Arguments, receiver, closure data and return slot of one native call.
///
/// Every wrapper in here is borrowed from the bridge and dies when the call
/// returns; clone a value with [`Context::obj_clone`] or promote it to a
/// [`crate::Persistent`] to keep it.
pub struct CallArgs {
    pub(crate) argv: Vec<Value>,
    pub(crate) this: Value,
    pub(crate) data: Option<Rc<dyn Any>>,
    pub(crate) flags: u32,
    pub(crate) ret: Value,
}

impl CallArgs {
    /// Number of arguments passed
    pub fn len(&self) -> usize {
        self.argv.len()
    }

    /// Whether no arguments were passed
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// Argument at `index`
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.argv.get(index)
    }

    /// All arguments
    pub fn argv(&self) -> &[Value] {
        &self.argv
    }

    /// Receiver (`this`) of the call
    pub fn this(&self) -> &Value {
        &self.this
    }

    /// Data registered with the function, if it is a `T`
    pub fn data<T: 'static>(&self) -> Option<&T> {
        self.data.as_deref()?.downcast_ref::<T>()
    }

    /// Flags registered with the function
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Set the value the call returns
    pub fn set_return(&mut self, value: Value) {
        self.ret = value;
    }

    /// Value the call will return
    pub fn return_value(&self) -> &Value {
        &self.ret
    }
}

/// What the engine's closure data points at.
pub struct FunctionHolder {
    pub(crate) callback: NativeFn,
    pub(crate) data: Option<Rc<dyn Any>>,
    pub(crate) flags: u32,
}

/// One entry of a function table for [`Context::obj_set_funcs`].
#[derive(Clone)]
pub struct FunctionSpec {
    /// Property name and function name
    pub name: &'static str,
    /// Native implementation
    pub callback: NativeFn,
    /// Declared number of arguments (`length`)
    pub arity: usize,
    /// Opaque flags, readable through [`CallArgs::flags`]
    pub flags: u32,
    /// Data readable through [`CallArgs::data`]
    pub data: Option<Rc<dyn Any>>,
}

impl FunctionSpec {
    /// Entry without flags or data
    pub fn new(name: &'static str, callback: NativeFn, arity: usize) -> Self {
        Self {
            name,
            callback,
            arity,
            flags: 0,
            data: None,
        }
    }

    /// Attach flags
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Attach closure data
    pub fn with_data(mut self, data: Rc<dyn Any>) -> Self {
        self.data = Some(data);
        self
    }
}

impl<'e> Context<'e> {
    // ========================================================================
    // Registration
    // ========================================================================

    /// Wrap `callback` as a callable engine value.
    ///
    /// Fails, with the engine's exception in the trap, if the engine refuses
    /// the entry point.
    pub fn func_new(
        &self,
        callback: NativeFn,
        arity: usize,
        flags: u32,
        name: &str,
        data: Option<Rc<dyn Any>>,
    ) -> Option<Value> {
        let engine = self.engine();
        let holder = Box::new(FunctionHolder {
            callback,
            data,
            flags,
        });
        let ptr = Box::into_raw(holder).cast::<c_void>();
        let free: ExternalFinalizer = Box::new(|ptr: *mut c_void| {
            // SAFETY: `ptr` came from `Box::into_raw` above and the engine
            // runs each external finalizer exactly once.
            drop(unsafe { Box::from_raw(ptr.cast::<FunctionHolder>()) });
        });
        let external = engine.new_external(ptr, Some(free));

        let entry = callback_for(engine.revision());
        log::debug!("register {} ({:?}, arity {})", name, entry, arity);
        let function = self.catch(engine.new_function(name, arity, entry, external))?;
        Some(Value::with_tag(function, TypeTag::Function))
    }

    /// Install every entry of `funcs` as a named property of `recv`.
    ///
    /// Stops at the first entry that cannot be created or stored.
    pub fn obj_set_funcs(&self, recv: &Value, funcs: &[FunctionSpec]) -> bool {
        for spec in funcs {
            let Some(func) = self.func_new(
                spec.callback,
                spec.arity,
                spec.flags,
                spec.name,
                spec.data.clone(),
            ) else {
                return false;
            };
            if !self.obj_set_prop_name(recv, spec.name, &func) {
                return false;
            }
            func.release();
        }
        true
    }

    // ========================================================================
    // Calling into the engine
    // ========================================================================

    /// Call `func` with `this` bound to `recv` (a fresh object when `None`).
    ///
    /// `None` means the call threw; the exception is in the trap.
    pub fn func_call_val(&self, recv: Option<&Value>, func: &Value, argv: &[&Value]) -> Option<Value> {
        let recv = self.receiver(recv)?;
        let f = self.callable(func.raw(self.engine()))?;
        let args = self.raw_args(argv);
        let ret = self.catch(self.engine().call(f, recv, &args))?;
        Some(Value::new(ret))
    }

    /// Call the method `recv[name]`
    pub fn func_call_name(&self, recv: &Value, name: &str, argv: &[&Value]) -> Option<Value> {
        let r = self.to_object(recv.raw(self.engine()))?;
        let f = self.method(r, PropertyKey::Name(name))?;
        let args = self.raw_args(argv);
        let ret = self.catch(self.engine().call(f, r, &args))?;
        Some(Value::new(ret))
    }

    /// Call the method `recv[sym]`
    pub fn func_call_sym(&self, recv: &Value, sym: &Value, argv: &[&Value]) -> Option<Value> {
        let r = self.to_object(recv.raw(self.engine()))?;
        let key = self.key_of(sym)?;
        let f = self.method(r, PropertyKey::Value(key))?;
        let args = self.raw_args(argv);
        let ret = self.catch(self.engine().call(f, r, &args))?;
        Some(Value::new(ret))
    }

    /// Like [`Context::func_call_val`], through the host's callback hooks
    pub fn make_callback_val(&self, recv: Option<&Value>, func: &Value, argv: &[&Value]) -> Option<Value> {
        let recv = self.receiver(recv)?;
        let f = self.callable(func.raw(self.engine()))?;
        let args = self.raw_args(argv);
        let ret = self.catch(self.engine().make_callback(f, recv, &args))?;
        Some(Value::new(ret))
    }

    /// Like [`Context::func_call_name`], through the host's callback hooks
    pub fn make_callback_name(&self, recv: &Value, name: &str, argv: &[&Value]) -> Option<Value> {
        let r = self.to_object(recv.raw(self.engine()))?;
        let f = self.method(r, PropertyKey::Name(name))?;
        let args = self.raw_args(argv);
        let ret = self.catch(self.engine().make_callback(f, r, &args))?;
        Some(Value::new(ret))
    }

    /// Like [`Context::func_call_sym`], through the host's callback hooks
    pub fn make_callback_sym(&self, recv: &Value, sym: &Value, argv: &[&Value]) -> Option<Value> {
        let r = self.to_object(recv.raw(self.engine()))?;
        let key = self.key_of(sym)?;
        let f = self.method(r, PropertyKey::Value(key))?;
        let args = self.raw_args(argv);
        let ret = self.catch(self.engine().make_callback(f, r, &args))?;
        Some(Value::new(ret))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn receiver(&self, recv: Option<&Value>) -> Option<RawHandle> {
        match recv {
            Some(recv) => self.to_object(recv.raw(self.engine())),
            None => Some(self.engine().new_object()),
        }
    }

    fn callable(&self, raw: RawHandle) -> Option<RawHandle> {
        if let Some(f) = self.to_function(raw) {
            return Some(f);
        }
        crate::shim_throw!(self, TypeError, "Value is not a function");
        None
    }

    fn method(&self, recv: RawHandle, key: PropertyKey<'_>) -> Option<RawHandle> {
        let f = self.catch(self.engine().get(recv, key))?;
        if let Some(f) = self.to_function(f) {
            return Some(f);
        }
        match key {
            PropertyKey::Name(name) => {
                crate::shim_throw!(self, TypeError, "Property '{}' is not a function", name)
            }
            _ => crate::shim_throw!(self, TypeError, "Property is not a function"),
        }
        None
    }
}
