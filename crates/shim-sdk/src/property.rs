//! Object creation and property access
//!
//! Receivers are coerced with ToObject first, so primitives can be used
//! wherever an object is expected; a receiver that cannot be coerced leaves
//! a `TypeError` in the trap and the operation reports failure.

use std::ffi::c_void;

use crate::context::Context;
use crate::sys::{PropertyKey, RawHandle};
use crate::value::{TypeTag, Value};

/// Description of the interned symbol keying native private data.
pub const PRIVATE_KEY: &str = "shim_private";

impl<'e> Context<'e> {
    // ========================================================================
    // Construction
    // ========================================================================

    /// New plain object, optionally with `proto` as its prototype
    pub fn obj_new(&self, proto: Option<&Value>) -> Value {
        let engine = self.engine();
        let object = engine.new_object();
        if let Some(proto) = proto {
            if let Some(p) = self.to_object(proto.raw(engine)) {
                engine.set_prototype(object, p);
            }
        }
        Value::with_tag(object, TypeTag::Object)
    }

    /// `new klass(...argv)`
    pub fn obj_new_instance(&self, klass: &Value, argv: &[&Value]) -> Option<Value> {
        let ctor = self.to_function(klass.raw(self.engine()))?;
        let args = self.raw_args(argv);
        let instance = self.catch(self.engine().construct(ctor, &args))?;
        Some(Value::with_tag(instance, TypeTag::Object))
    }

    /// New wrapper for the same engine value, owned by the caller
    pub fn obj_clone(&self, src: &Value) -> Value {
        src.alias()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// `name in obj`
    pub fn obj_has_name(&self, obj: &Value, name: &str) -> bool {
        self.has_key(obj, PropertyKey::Name(name))
    }

    /// `id in obj`
    pub fn obj_has_id(&self, obj: &Value, id: u32) -> bool {
        self.has_key(obj, PropertyKey::Index(id))
    }

    /// `sym in obj`
    pub fn obj_has_sym(&self, obj: &Value, sym: &Value) -> bool {
        match self.key_of(sym) {
            Some(key) => self.has_key(obj, PropertyKey::Value(key)),
            None => false,
        }
    }

    // ========================================================================
    // Setters
    // ========================================================================

    /// `obj[name] = val`
    pub fn obj_set_prop_name(&self, obj: &Value, name: &str, val: &Value) -> bool {
        self.set_key(obj, PropertyKey::Name(name), val)
    }

    /// `obj[id] = val`
    pub fn obj_set_prop_id(&self, obj: &Value, id: u32, val: &Value) -> bool {
        self.set_key(obj, PropertyKey::Index(id), val)
    }

    /// `obj[sym] = val`
    pub fn obj_set_prop_sym(&self, obj: &Value, sym: &Value, val: &Value) -> bool {
        match self.key_of(sym) {
            Some(key) => self.set_key(obj, PropertyKey::Value(key), val),
            None => false,
        }
    }

    /// Attach native data to `obj`, invisible to scripts
    pub fn obj_set_private(&self, obj: &Value, data: *mut c_void) -> bool {
        let engine = self.engine();
        let Some(o) = self.to_object(obj.raw(engine)) else {
            return false;
        };
        let external = engine.new_external(data, None);
        engine.set_hidden(o, engine.symbol(PRIVATE_KEY), external)
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// `obj[name]`
    pub fn obj_get_prop_name(&self, obj: &Value, name: &str) -> Option<Value> {
        self.get_key(obj, PropertyKey::Name(name))
    }

    /// `obj[id]`
    pub fn obj_get_prop_id(&self, obj: &Value, id: u32) -> Option<Value> {
        self.get_key(obj, PropertyKey::Index(id))
    }

    /// `obj[sym]`
    pub fn obj_get_prop_sym(&self, obj: &Value, sym: &Value) -> Option<Value> {
        let key = self.key_of(sym)?;
        self.get_key(obj, PropertyKey::Value(key))
    }

    /// Native data previously attached with [`Context::obj_set_private`]
    pub fn obj_get_private(&self, obj: &Value) -> Option<*mut c_void> {
        let engine = self.engine();
        let o = self.to_object(obj.raw(engine))?;
        let external = engine.get_hidden(o, engine.symbol(PRIVATE_KEY))?;
        engine.external_value(external)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn has_key(&self, obj: &Value, key: PropertyKey<'_>) -> bool {
        let Some(o) = self.to_object(obj.raw(self.engine())) else {
            return false;
        };
        self.catch(self.engine().has(o, key)).unwrap_or(false)
    }

    fn set_key(&self, obj: &Value, key: PropertyKey<'_>, val: &Value) -> bool {
        let engine = self.engine();
        let Some(o) = self.to_object(obj.raw(engine)) else {
            return false;
        };
        self.catch(engine.set(o, key, val.raw(engine))).unwrap_or(false)
    }

    fn get_key(&self, obj: &Value, key: PropertyKey<'_>) -> Option<Value> {
        let o = self.to_object(obj.raw(self.engine()))?;
        let value = self.catch(self.engine().get(o, key))?;
        Some(Value::new(value))
    }

    /// Strings and symbols key directly; objects go through ToString first
    pub(crate) fn key_of(&self, sym: &Value) -> Option<RawHandle> {
        let raw = sym.raw(self.engine());
        if self.engine().is_object(raw) {
            return self.to_string_handle(raw);
        }
        Some(raw)
    }

    /// Resolve a slice of values to engine handles
    pub(crate) fn raw_args(&self, argv: &[&Value]) -> Vec<RawHandle> {
        argv.iter().map(|v| v.raw(self.engine())).collect()
    }
}
