//! The embedding API: [`Engine`] for [`Isolate`]

use std::ffi::c_void;

use shim_sdk::sys::{AfterWorkFn, BufferFinalizer, ExternalFinalizer, WeakFinalizer, WorkFn};
use shim_sdk::{
    int32_of, uint32_of, Engine, EngineResult, ErrorKind, NativeCallback, PersistentId,
    PropertyKey, RawHandle, Revision, ScopeId, ShimError,
};

use crate::heap::{FunctionBody, HeapValue, Object, ObjectKind, PropKey};
use crate::isolate::{Found, Isolate, Key};
use crate::ops::{array_index, number_index, number_to_string, string_to_number};

/// Largest length an array may grow to; elements are stored densely.
const MAX_ARRAY_LENGTH: usize = 1 << 24;

// ============================================================================
// Coercion internals
// ============================================================================

/// First step of ToString, taken while the heap is borrowed
enum StringStep {
    Done(String),
    Symbol,
    Join(Vec<RawHandle>),
    Unwrap(RawHandle),
}

impl Isolate {
    fn truthy(&self, value: RawHandle) -> bool {
        match self.heap.borrow().get(value) {
            Some(HeapValue::Boolean(b)) => *b,
            Some(HeapValue::Number(n)) => *n != 0.0 && !n.is_nan(),
            Some(HeapValue::String(s)) => !s.is_empty(),
            Some(HeapValue::Symbol(_)) | Some(HeapValue::Object(_)) => true,
            Some(HeapValue::Undefined) | Some(HeapValue::Null) | None => false,
        }
    }

    fn number_of(&self, value: RawHandle) -> Option<f64> {
        match self.heap.borrow().get(value) {
            Some(HeapValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    fn kind_matches(&self, value: RawHandle, f: impl FnOnce(&ObjectKind) -> bool) -> bool {
        self.with_object(value, |obj| f(&obj.kind)).unwrap_or(false)
    }

    /// ToString, as a Rust string
    pub(crate) fn string_value(&self, value: RawHandle) -> EngineResult<String> {
        let step = {
            let heap = self.heap.borrow();
            match heap.get(value) {
                None | Some(HeapValue::Undefined) => StringStep::Done("undefined".into()),
                Some(HeapValue::Null) => StringStep::Done("null".into()),
                Some(HeapValue::Boolean(b)) => StringStep::Done(b.to_string()),
                Some(HeapValue::Number(n)) => StringStep::Done(number_to_string(*n)),
                Some(HeapValue::String(s)) => StringStep::Done(s.clone()),
                Some(HeapValue::Symbol(_)) => StringStep::Symbol,
                Some(HeapValue::Object(obj)) => match &obj.kind {
                    ObjectKind::Array(elements) => StringStep::Join(elements.clone()),
                    ObjectKind::Wrapper(primitive) => StringStep::Unwrap(*primitive),
                    ObjectKind::Error(kind) => {
                        let message = obj
                            .own(&PropKey::String("message".into()))
                            .and_then(|m| match heap.get(m) {
                                Some(HeapValue::String(s)) => Some(s.clone()),
                                _ => None,
                            })
                            .unwrap_or_default();
                        if message.is_empty() {
                            StringStep::Done(kind.name().to_string())
                        } else {
                            StringStep::Done(format!("{}: {}", kind.name(), message))
                        }
                    }
                    ObjectKind::Function { name, .. } => {
                        StringStep::Done(format!("function {}() {{ [native code] }}", name))
                    }
                    ObjectKind::Date(ms) => StringStep::Done(number_to_string(*ms)),
                    ObjectKind::Buffer { data, .. } => {
                        StringStep::Done(String::from_utf8_lossy(data).into_owned())
                    }
                    ObjectKind::External { .. } => StringStep::Done("[object External]".into()),
                    ObjectKind::Plain => StringStep::Done("[object Object]".into()),
                },
            }
        };

        match step {
            StringStep::Done(s) => Ok(s),
            StringStep::Symbol => Err(self.type_error("Cannot convert a Symbol value to a string")),
            StringStep::Unwrap(primitive) => self.string_value(primitive),
            StringStep::Join(elements) => {
                let mut parts = Vec::with_capacity(elements.len());
                for element in elements {
                    if self.is_undefined(element) || self.is_null(element) {
                        parts.push(String::new());
                    } else {
                        parts.push(self.string_value(element)?);
                    }
                }
                Ok(parts.join(","))
            }
        }
    }

    /// ToNumber, as an `f64`
    pub(crate) fn numeric_value(&self, value: RawHandle) -> EngineResult<f64> {
        enum Step {
            Done(f64),
            Symbol,
            Unwrap(RawHandle),
            ViaString,
        }

        let step = match self.heap.borrow().get(value) {
            None | Some(HeapValue::Undefined) => Step::Done(f64::NAN),
            Some(HeapValue::Null) => Step::Done(0.0),
            Some(HeapValue::Boolean(b)) => Step::Done(if *b { 1.0 } else { 0.0 }),
            Some(HeapValue::Number(n)) => Step::Done(*n),
            Some(HeapValue::String(s)) => Step::Done(string_to_number(s)),
            Some(HeapValue::Symbol(_)) => Step::Symbol,
            Some(HeapValue::Object(obj)) => match &obj.kind {
                ObjectKind::Date(ms) => Step::Done(*ms),
                ObjectKind::Wrapper(primitive) => Step::Unwrap(*primitive),
                _ => Step::ViaString,
            },
        };

        match step {
            Step::Done(n) => Ok(n),
            Step::Symbol => Err(self.type_error("Cannot convert a Symbol value to a number")),
            Step::Unwrap(primitive) => self.numeric_value(primitive),
            Step::ViaString => Ok(string_to_number(&self.string_value(value)?)),
        }
    }

    fn ensure_object(&self, value: RawHandle) -> EngineResult<RawHandle> {
        if self.is_object(value) {
            Ok(value)
        } else {
            Engine::to_object(self, value)
        }
    }

    fn resolve_key(&self, key: PropertyKey<'_>) -> EngineResult<Key> {
        Ok(match key {
            PropertyKey::Name(name) => name_key(name),
            PropertyKey::Index(index) => Key::Index(index),
            PropertyKey::Value(value) => {
                if matches!(self.heap.borrow().get(value), Some(HeapValue::Symbol(_))) {
                    Key::Prop(PropKey::Symbol(value))
                } else if let Some(index) = self.number_of(value).and_then(number_index) {
                    Key::Index(index)
                } else {
                    name_key(&self.string_value(value)?)
                }
            }
        })
    }
}

fn name_key(name: &str) -> Key {
    match array_index(name) {
        Some(index) => Key::Index(index),
        None => Key::Prop(PropKey::String(name.to_string())),
    }
}

// ============================================================================
// Engine
// ============================================================================

impl Engine for Isolate {
    fn revision(&self) -> Revision {
        self.options.revision
    }

    fn open_scope(&self) -> ScopeId {
        self.open()
    }

    fn close_scope(&self, scope: ScopeId, escape: Option<RawHandle>) -> Option<RawHandle> {
        self.close(scope, escape)
    }

    fn throw(&self, exception: RawHandle) {
        log::trace!("throw {:?}", exception);
        self.pending.set(Some(self.root(exception)));
    }

    fn undefined(&self) -> RawHandle {
        self.oddballs.undefined
    }

    fn null(&self) -> RawHandle {
        self.oddballs.null
    }

    // ------------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------------

    fn is_undefined(&self, value: RawHandle) -> bool {
        matches!(self.heap.borrow().get(value), Some(HeapValue::Undefined))
    }

    fn is_null(&self, value: RawHandle) -> bool {
        matches!(self.heap.borrow().get(value), Some(HeapValue::Null))
    }

    fn is_boolean(&self, value: RawHandle) -> bool {
        matches!(self.heap.borrow().get(value), Some(HeapValue::Boolean(_)))
    }

    fn is_number(&self, value: RawHandle) -> bool {
        self.number_of(value).is_some()
    }

    fn is_int32(&self, value: RawHandle) -> bool {
        self.number_of(value).is_some_and(|n| {
            n.fract() == 0.0
                && n >= f64::from(i32::MIN)
                && n <= f64::from(i32::MAX)
                && !(n == 0.0 && n.is_sign_negative())
        })
    }

    fn is_uint32(&self, value: RawHandle) -> bool {
        self.number_of(value).is_some_and(|n| {
            n.fract() == 0.0 && n >= 0.0 && n <= f64::from(u32::MAX) && !n.is_sign_negative()
        })
    }

    fn is_string(&self, value: RawHandle) -> bool {
        matches!(self.heap.borrow().get(value), Some(HeapValue::String(_)))
    }

    fn is_object(&self, value: RawHandle) -> bool {
        matches!(self.heap.borrow().get(value), Some(HeapValue::Object(_)))
    }

    fn is_array(&self, value: RawHandle) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Array(_)))
    }

    fn is_function(&self, value: RawHandle) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Function { .. }))
    }

    fn is_external(&self, value: RawHandle) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::External { .. }))
    }

    fn is_date(&self, value: RawHandle) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Date(_)))
    }

    fn is_buffer(&self, value: RawHandle) -> bool {
        self.kind_matches(value, |k| matches!(k, ObjectKind::Buffer { .. }))
    }

    // ------------------------------------------------------------------------
    // Coercions
    // ------------------------------------------------------------------------

    fn to_boolean(&self, value: RawHandle) -> RawHandle {
        self.boolean(self.truthy(value))
    }

    fn to_number(&self, value: RawHandle) -> EngineResult<RawHandle> {
        if self.is_number(value) {
            return Ok(value);
        }
        let n = self.numeric_value(value)?;
        Ok(self.alloc_number(n))
    }

    fn to_int32(&self, value: RawHandle) -> EngineResult<RawHandle> {
        let n = self.numeric_value(value)?;
        Ok(self.alloc_number(f64::from(int32_of(n))))
    }

    fn to_uint32(&self, value: RawHandle) -> EngineResult<RawHandle> {
        let n = self.numeric_value(value)?;
        Ok(self.alloc_number(f64::from(uint32_of(n))))
    }

    fn to_object(&self, value: RawHandle) -> EngineResult<RawHandle> {
        let wrap = match self.heap.borrow().get(value) {
            Some(HeapValue::Object(_)) => return Ok(value),
            None | Some(HeapValue::Undefined) | Some(HeapValue::Null) => false,
            Some(_) => true,
        };
        if wrap {
            Ok(self.alloc_object(ObjectKind::Wrapper(value)))
        } else {
            Err(self.type_error("Cannot convert undefined or null to object"))
        }
    }

    fn to_string(&self, value: RawHandle) -> EngineResult<RawHandle> {
        if self.is_string(value) {
            return Ok(value);
        }
        let s = self.string_value(value)?;
        Ok(self.alloc_string(s))
    }

    // ------------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------------

    fn boolean_value(&self, value: RawHandle) -> bool {
        self.truthy(value)
    }

    fn number_value(&self, value: RawHandle) -> f64 {
        if let Some(n) = self.number_of(value) {
            return n;
        }
        self.numeric_value(value).unwrap_or(f64::NAN)
    }

    fn string_utf8(&self, value: RawHandle) -> Option<String> {
        match self.heap.borrow().get(value) {
            Some(HeapValue::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn string_length(&self, value: RawHandle) -> usize {
        match self.heap.borrow().get(value) {
            Some(HeapValue::String(s)) => s.encode_utf16().count(),
            _ => 0,
        }
    }

    fn date_value(&self, value: RawHandle) -> f64 {
        self.with_object(value, |obj| match obj.kind {
            ObjectKind::Date(ms) => ms,
            _ => f64::NAN,
        })
        .unwrap_or(f64::NAN)
    }

    fn array_length(&self, value: RawHandle) -> usize {
        self.with_object(value, |obj| match &obj.kind {
            ObjectKind::Array(elements) => elements.len(),
            _ => 0,
        })
        .unwrap_or(0)
    }

    fn buffer_data(&self, value: RawHandle) -> Option<(*mut u8, usize)> {
        self.with_object_mut(value, |obj| match &mut obj.kind {
            ObjectKind::Buffer { data, .. } => Some((data.as_mut_ptr(), data.len())),
            _ => None,
        })
        .flatten()
    }

    fn external_value(&self, value: RawHandle) -> Option<*mut c_void> {
        self.with_object(value, |obj| match obj.kind {
            ObjectKind::External { ptr, .. } => Some(ptr),
            _ => None,
        })
        .flatten()
    }

    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    fn new_boolean(&self, value: bool) -> RawHandle {
        self.boolean(value)
    }

    fn new_number(&self, value: f64) -> RawHandle {
        self.alloc_number(value)
    }

    fn new_string(&self, value: &str) -> RawHandle {
        self.alloc_string(value)
    }

    fn symbol(&self, description: &str) -> RawHandle {
        if let Some(symbol) = self.symbols.borrow().get(description) {
            return *symbol;
        }
        let symbol = self
            .heap
            .borrow_mut()
            .alloc_pinned(HeapValue::Symbol(description.to_string()));
        self.symbols
            .borrow_mut()
            .insert(description.to_string(), symbol);
        symbol
    }

    fn new_object(&self) -> RawHandle {
        self.alloc_object(ObjectKind::Plain)
    }

    fn new_array(&self, len: usize) -> RawHandle {
        self.alloc_object(ObjectKind::Array(vec![self.oddballs.undefined; len]))
    }

    fn new_date(&self, millis: f64) -> RawHandle {
        self.alloc_object(ObjectKind::Date(millis))
    }

    fn new_error(&self, kind: ErrorKind, message: &str) -> RawHandle {
        self.make_error(kind, message)
    }

    fn new_buffer(&self, data: Box<[u8]>, on_free: Option<BufferFinalizer>) -> RawHandle {
        self.alloc_object(ObjectKind::Buffer { data, on_free })
    }

    fn new_external(&self, ptr: *mut c_void, finalizer: Option<ExternalFinalizer>) -> RawHandle {
        self.alloc_object(ObjectKind::External { ptr, finalizer })
    }

    fn new_function(
        &self,
        name: &str,
        arity: usize,
        callback: NativeCallback,
        data: RawHandle,
    ) -> EngineResult<RawHandle> {
        if callback.revision() != self.options.revision {
            let err = ShimError::ConventionMismatch {
                expected: self.options.revision.name(),
                got: callback.revision().name(),
            };
            return Err(self.type_error(&err.to_string()));
        }
        Ok(self.alloc_object(ObjectKind::Function {
            name: name.to_string(),
            arity,
            body: FunctionBody::Native { callback, data },
        }))
    }

    // ------------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------------

    fn get(&self, object: RawHandle, key: PropertyKey<'_>) -> EngineResult<RawHandle> {
        let object = self.ensure_object(object)?;
        let key = self.resolve_key(key)?;
        let found = self.lookup(object, &key);
        Ok(self.materialize(found))
    }

    fn set(&self, object: RawHandle, key: PropertyKey<'_>, value: RawHandle) -> EngineResult<bool> {
        let object = self.ensure_object(object)?;
        let key = self.resolve_key(key)?;
        let undefined = self.oddballs.undefined;

        // Numeric conversions need the heap, so do them before borrowing it mutably.
        let byte = if self.is_buffer(object) {
            Some(uint32_of(self.number_value(value)) as u8)
        } else {
            None
        };
        let new_len = match &key {
            Key::Prop(PropKey::String(name)) if name == "length" && self.is_array(object) => {
                Some(uint32_of(self.number_value(value)) as usize)
            }
            _ => None,
        };
        let grow_to = match &key {
            Key::Index(index) if self.is_array(object) => Some(*index as usize + 1),
            _ => new_len,
        };
        if let Some(len) = grow_to {
            if len > MAX_ARRAY_LENGTH && len > self.array_length(object) {
                return Err(self.make_error(ErrorKind::RangeError, "Invalid array length"));
            }
        }

        let stored = self.with_object_mut(object, |obj| {
            match &mut obj.kind {
                ObjectKind::Array(elements) => {
                    if let Key::Index(index) = key {
                        let index = index as usize;
                        if index >= elements.len() {
                            elements.resize(index + 1, undefined);
                        }
                        elements[index] = value;
                        return;
                    }
                    if let Some(len) = new_len {
                        elements.resize(len, undefined);
                        return;
                    }
                }
                ObjectKind::Buffer { data, .. } => {
                    if let Key::Index(index) = key {
                        if let (Some(slot), Some(byte)) = (data.get_mut(index as usize), byte) {
                            *slot = byte;
                        }
                        return;
                    }
                }
                _ => {}
            }
            let prop = match key {
                Key::Index(index) => PropKey::String(index.to_string()),
                Key::Prop(prop) => prop,
            };
            obj.define(prop, value);
        });
        Ok(stored.is_some())
    }

    fn has(&self, object: RawHandle, key: PropertyKey<'_>) -> EngineResult<bool> {
        let object = self.ensure_object(object)?;
        let key = self.resolve_key(key)?;
        Ok(!matches!(self.lookup(object, &key), Found::Missing))
    }

    fn set_prototype(&self, object: RawHandle, prototype: RawHandle) -> bool {
        let prototype = if self.is_null(prototype) {
            None
        } else if self.is_object(prototype) {
            Some(prototype)
        } else {
            return false;
        };
        self.with_object_mut(object, |obj| obj.prototype = prototype)
            .is_some()
    }

    fn get_hidden(&self, object: RawHandle, key: RawHandle) -> Option<RawHandle> {
        let value = self
            .with_object(object, |obj| {
                obj.hidden.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
            })
            .flatten()?;
        Some(self.root(value))
    }

    fn set_hidden(&self, object: RawHandle, key: RawHandle, value: RawHandle) -> bool {
        self.with_object_mut(object, |obj| {
            match obj.hidden.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => obj.hidden.push((key, value)),
            }
        })
        .is_some()
    }

    // ------------------------------------------------------------------------
    // Invocation
    // ------------------------------------------------------------------------

    fn call(&self, function: RawHandle, receiver: RawHandle, args: &[RawHandle]) -> EngineResult<RawHandle> {
        self.invoke(function, receiver, args)
    }

    fn construct(&self, constructor: RawHandle, args: &[RawHandle]) -> EngineResult<RawHandle> {
        if !self.is_function(constructor) {
            return Err(self.type_error("Value is not a constructor"));
        }
        let prototype = self.lookup(constructor, &Key::Prop(PropKey::String("prototype".into())));
        let mut object = Object::new(ObjectKind::Plain);
        if let Found::Handle(proto) = prototype {
            if self.is_object(proto) {
                object.prototype = Some(proto);
            }
        }
        let instance = self.alloc(HeapValue::Object(Box::new(object)));
        let result = self.invoke(constructor, instance, args)?;
        Ok(if self.is_object(result) { result } else { instance })
    }

    // ------------------------------------------------------------------------
    // Persistents
    // ------------------------------------------------------------------------

    fn persistent_new(&self, value: RawHandle) -> PersistentId {
        self.new_persistent(value)
    }

    fn persistent_get(&self, id: PersistentId) -> Option<RawHandle> {
        let referent = self.persistents.borrow().get(&id)?.referent?;
        Some(self.root(referent))
    }

    fn persistent_dispose(&self, id: PersistentId) {
        if self.persistents.borrow_mut().remove(&id).is_none() {
            log::warn!("dispose of unknown persistent {:?}", id);
        }
    }

    fn make_weak(&self, id: PersistentId, finalizer: WeakFinalizer) {
        match self.persistents.borrow_mut().get_mut(&id) {
            Some(slot) => {
                slot.weak = true;
                slot.finalizer = Some(finalizer);
            }
            None => log::warn!("make_weak on unknown persistent {:?}", id),
        }
    }

    fn clear_weak(&self, id: PersistentId) -> bool {
        match self.persistents.borrow_mut().get_mut(&id) {
            Some(slot) => {
                slot.weak = false;
                slot.finalizer.take().is_some()
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Work
    // ------------------------------------------------------------------------

    fn queue_work(&self, work: WorkFn, after: AfterWorkFn) {
        self.submit_work(work, after);
    }
}
