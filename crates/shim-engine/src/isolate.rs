//! Isolate: one engine instance with its heap, scopes and event loop
//!
//! The isolate is single-threaded. All state sits behind `RefCell`/`Cell`
//! so native callbacks can re-enter it through `&dyn Engine`; no borrow is
//! ever held across a call out to native or host code.

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use shim_sdk::sys::{AfterWorkFn, Arguments, FunctionCallbackInfo, ReturnValue, WeakFinalizer, WorkFn};
use shim_sdk::{
    EngineResult, ErrorKind, NativeCallback, PersistentId, RawHandle, Revision, ScopeId,
};

use crate::error::EngineSetupResult;
use crate::heap::{FunctionBody, Heap, HeapValue, Object, ObjectKind, PropKey, ScriptFn};
use crate::options::EngineOptions;
use crate::pool::{Completion, JobId, WorkPool};

/// Longest prototype chain walked before giving up.
const MAX_PROTO_DEPTH: usize = 1024;

// ============================================================================
// Bookkeeping types
// ============================================================================

struct Scope {
    id: ScopeId,
    handles: Vec<RawHandle>,
}

pub(crate) struct Oddballs {
    pub undefined: RawHandle,
    pub null: RawHandle,
    pub true_: RawHandle,
    pub false_: RawHandle,
}

pub(crate) struct PersistentSlot {
    pub referent: Option<RawHandle>,
    pub weak: bool,
    pub finalizer: Option<WeakFinalizer>,
}

/// Collector statistics for one collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Cells reached from the roots
    pub marked: usize,
    /// Cells freed
    pub freed: usize,
    /// Weak callbacks invoked
    pub weak_callbacks: usize,
    /// External and buffer finalizers invoked
    pub finalizers: usize,
    /// Live cells after the collection
    pub live: usize,
    /// Time spent
    pub pause: Duration,
}

/// Property key after resolution against the engine's key rules
pub(crate) enum Key {
    Index(u32),
    Prop(PropKey),
}

/// Property read result, materialized once the heap borrow is released
pub(crate) enum Found {
    Handle(RawHandle),
    Number(f64),
    Str(String),
    Missing,
}

// ============================================================================
// Isolate
// ============================================================================

/// A reference engine instance implementing [`shim_sdk::Engine`].
pub struct Isolate {
    pub(crate) options: EngineOptions,
    pub(crate) heap: RefCell<Heap>,
    scopes: RefCell<Vec<Scope>>,
    next_scope: Cell<u32>,
    pub(crate) oddballs: Oddballs,
    pub(crate) symbols: RefCell<FxHashMap<String, RawHandle>>,
    pub(crate) persistents: RefCell<FxHashMap<PersistentId, PersistentSlot>>,
    next_persistent: Cell<u64>,
    pub(crate) pending: Cell<Option<RawHandle>>,
    pool: WorkPool,
    after: RefCell<FxHashMap<JobId, AfterWorkFn>>,
    next_job: Cell<JobId>,
    depth: Cell<usize>,
}

impl Isolate {
    /// Create an isolate and start its work pool
    ///
    /// Fails when `threadpool_size` is outside `1..=MAX_THREADPOOL_SIZE`.
    pub fn new(options: EngineOptions) -> EngineSetupResult<Self> {
        options.validate()?;
        let mut heap = Heap::new();
        let oddballs = Oddballs {
            undefined: heap.alloc_pinned(HeapValue::Undefined),
            null: heap.alloc_pinned(HeapValue::Null),
            true_: heap.alloc_pinned(HeapValue::Boolean(true)),
            false_: heap.alloc_pinned(HeapValue::Boolean(false)),
        };
        let pool = WorkPool::new(options.threadpool_size)?;
        log::debug!(
            "isolate created: revision={}, threads={}",
            options.revision.name(),
            options.threadpool_size
        );

        Ok(Self {
            options,
            heap: RefCell::new(heap),
            scopes: RefCell::new(vec![Scope {
                id: ScopeId(0),
                handles: Vec::new(),
            }]),
            next_scope: Cell::new(1),
            oddballs,
            symbols: RefCell::new(FxHashMap::default()),
            persistents: RefCell::new(FxHashMap::default()),
            next_persistent: Cell::new(1),
            pending: Cell::new(None),
            pool,
            after: RefCell::new(FxHashMap::default()),
            next_job: Cell::new(1),
            depth: Cell::new(0),
        })
    }

    /// Isolate configured from the environment
    pub fn from_env() -> EngineSetupResult<Self> {
        Self::new(EngineOptions::from_env_cached())
    }

    /// Options this isolate was created with
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Native API revision
    pub fn api_revision(&self) -> Revision {
        self.options.revision
    }

    /// Number of live heap cells
    pub fn live_objects(&self) -> usize {
        self.heap.borrow().live()
    }

    /// Number of open handle scopes, the base scope included
    pub fn scope_depth(&self) -> usize {
        self.scopes.borrow().len()
    }

    /// Description a symbol was created with
    pub fn symbol_description(&self, symbol: RawHandle) -> Option<String> {
        match self.heap.borrow().get(symbol) {
            Some(HeapValue::Symbol(description)) => Some(description.clone()),
            _ => None,
        }
    }

    /// Number of queued work requests whose completion has not run
    pub fn pending_work(&self) -> usize {
        self.after.borrow().len()
    }

    // ========================================================================
    // Scopes and allocation
    // ========================================================================

    pub(crate) fn open(&self) -> ScopeId {
        let id = ScopeId(self.next_scope.get());
        self.next_scope.set(id.0.wrapping_add(1));
        self.scopes.borrow_mut().push(Scope {
            id,
            handles: Vec::new(),
        });
        id
    }

    pub(crate) fn close(&self, id: ScopeId, escape: Option<RawHandle>) -> Option<RawHandle> {
        let mut scopes = self.scopes.borrow_mut();
        let Some(position) = scopes.iter().rposition(|s| s.id == id) else {
            log::warn!("close of unknown scope {:?}", id);
            return escape;
        };
        if position == 0 {
            log::warn!("the base scope cannot be closed");
            return escape;
        }
        if position + 1 != scopes.len() {
            log::warn!("scope {:?} closed with {} inner scopes open", id, scopes.len() - position - 1);
        }
        scopes.truncate(position);
        if let (Some(handle), Some(parent)) = (escape, scopes.last_mut()) {
            parent.handles.push(handle);
        }
        escape
    }

    /// Root `handle` in the innermost scope
    pub(crate) fn root(&self, handle: RawHandle) -> RawHandle {
        if let Some(scope) = self.scopes.borrow_mut().last_mut() {
            scope.handles.push(handle);
        }
        handle
    }

    pub(crate) fn alloc(&self, value: HeapValue) -> RawHandle {
        let handle = self.heap.borrow_mut().alloc(value);
        self.root(handle)
    }

    pub(crate) fn alloc_object(&self, kind: ObjectKind) -> RawHandle {
        self.alloc(HeapValue::Object(Box::new(Object::new(kind))))
    }

    pub(crate) fn alloc_string(&self, s: impl Into<String>) -> RawHandle {
        self.alloc(HeapValue::String(s.into()))
    }

    pub(crate) fn alloc_number(&self, n: f64) -> RawHandle {
        self.alloc(HeapValue::Number(n))
    }

    pub(crate) fn boolean(&self, b: bool) -> RawHandle {
        if b {
            self.oddballs.true_
        } else {
            self.oddballs.false_
        }
    }

    /// Read access to an object cell
    pub(crate) fn with_object<R>(&self, handle: RawHandle, f: impl FnOnce(&Object) -> R) -> Option<R> {
        self.heap.borrow().object(handle).map(f)
    }

    /// Write access to an object cell
    pub(crate) fn with_object_mut<R>(
        &self,
        handle: RawHandle,
        f: impl FnOnce(&mut Object) -> R,
    ) -> Option<R> {
        self.heap.borrow_mut().object_mut(handle).map(f)
    }

    /// New error object of `kind` with `message`, not thrown
    pub(crate) fn make_error(&self, kind: ErrorKind, message: &str) -> RawHandle {
        let name = self.alloc_string(kind.name());
        let text = self.alloc_string(message);
        let mut object = Object::new(ObjectKind::Error(kind));
        object.define(PropKey::String("name".into()), name);
        object.define(PropKey::String("message".into()), text);
        self.alloc(HeapValue::Object(Box::new(object)))
    }

    pub(crate) fn type_error(&self, message: &str) -> RawHandle {
        self.make_error(ErrorKind::TypeError, message)
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Walk `object` and its prototype chain for `key`
    pub(crate) fn lookup(&self, object: RawHandle, key: &Key) -> Found {
        let heap = self.heap.borrow();
        let mut current = Some(object);
        for _ in 0..MAX_PROTO_DEPTH {
            let Some(handle) = current else {
                break;
            };
            let Some(obj) = heap.object(handle) else {
                break;
            };
            let found = match key {
                Key::Index(index) => own_index(obj, *index),
                Key::Prop(prop) => own_prop(obj, prop),
            };
            if !matches!(found, Found::Missing) {
                return found;
            }
            current = obj.prototype;
        }
        Found::Missing
    }

    pub(crate) fn materialize(&self, found: Found) -> RawHandle {
        match found {
            Found::Handle(handle) => self.root(handle),
            Found::Number(n) => self.alloc_number(n),
            Found::Str(s) => self.alloc_string(s),
            Found::Missing => self.oddballs.undefined,
        }
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Call any function value
    pub(crate) fn invoke(
        &self,
        function: RawHandle,
        receiver: RawHandle,
        args: &[RawHandle],
    ) -> EngineResult<RawHandle> {
        enum Target {
            Native(NativeCallback, RawHandle),
            Script(ScriptFn),
        }

        let target = self.with_object(function, |obj| match &obj.kind {
            ObjectKind::Function { body, .. } => Some(match body {
                FunctionBody::Native { callback, data } => Target::Native(*callback, *data),
                FunctionBody::Script(f) => Target::Script(f.clone()),
            }),
            _ => None,
        });
        let Some(Some(target)) = target else {
            return Err(self.type_error("Value is not a function"));
        };

        self.depth.set(self.depth.get() + 1);
        let result = match target {
            Target::Native(callback, data) => self.call_native(callback, function, receiver, data, args),
            Target::Script(body) => self.call_script(&body, receiver, args),
        };
        self.depth.set(self.depth.get() - 1);
        result
    }

    fn call_native(
        &self,
        callback: NativeCallback,
        callee: RawHandle,
        this: RawHandle,
        data: RawHandle,
        args: &[RawHandle],
    ) -> EngineResult<RawHandle> {
        log::trace!("call native {:?} depth={}", callee, self.depth.get());
        match callback {
            NativeCallback::Legacy(entry) => {
                // The callee manages its own scope under this convention.
                let mut arguments = Arguments::new(self, this, callee, data, args.to_vec());
                let ret = entry(&mut arguments);
                match self.pending.take() {
                    Some(exception) => Err(self.root(exception)),
                    None => Ok(self.root(ret)),
                }
            }
            NativeCallback::Modern(entry) => {
                let scope = self.open();
                let info = FunctionCallbackInfo::new(self, this, callee, data, args);
                let mut ret = ReturnValue::new();
                entry(&info, &mut ret);
                let value = ret.get().unwrap_or(self.oddballs.undefined);
                match self.pending.take() {
                    Some(exception) => Err(self.close(scope, Some(exception)).unwrap_or(exception)),
                    None => Ok(self.close(scope, Some(value)).unwrap_or(value)),
                }
            }
        }
    }

    fn call_script(&self, body: &ScriptFn, this: RawHandle, args: &[RawHandle]) -> EngineResult<RawHandle> {
        let scope = self.open();
        match body(self, this, args) {
            Ok(value) => Ok(self.close(scope, Some(value)).unwrap_or(value)),
            Err(exception) => Err(self.close(scope, Some(exception)).unwrap_or(exception)),
        }
    }

    /// Define a host-implemented function.
    ///
    /// The closure receives the isolate, `this` and the arguments, and stands
    /// in for code written in the engine's own language.
    pub fn script_function<F>(&self, name: &str, arity: usize, body: F) -> RawHandle
    where
        F: Fn(&Isolate, RawHandle, &[RawHandle]) -> EngineResult<RawHandle> + 'static,
    {
        let body: ScriptFn = std::rc::Rc::new(body);
        self.alloc_object(ObjectKind::Function {
            name: name.to_string(),
            arity,
            body: FunctionBody::Script(body),
        })
    }

    // ========================================================================
    // Persistents
    // ========================================================================

    pub(crate) fn new_persistent(&self, value: RawHandle) -> PersistentId {
        let id = PersistentId(self.next_persistent.get());
        self.next_persistent.set(id.0 + 1);
        self.persistents.borrow_mut().insert(
            id,
            PersistentSlot {
                referent: Some(value),
                weak: false,
                finalizer: None,
            },
        );
        id
    }

    // ========================================================================
    // Garbage collection
    // ========================================================================

    fn roots(&self) -> Vec<RawHandle> {
        let mut roots: Vec<RawHandle> = self
            .scopes
            .borrow()
            .iter()
            .flat_map(|s| s.handles.iter().copied())
            .collect();
        roots.extend(
            self.persistents
                .borrow()
                .values()
                .filter(|slot| !slot.weak)
                .filter_map(|slot| slot.referent),
        );
        roots.extend(self.pending.get());
        roots
    }

    fn mark_from_roots(&self) -> usize {
        let roots = self.roots();
        let mut heap = self.heap.borrow_mut();
        heap.clear_marks();
        heap.mark(roots)
    }

    /// Run a full mark/sweep collection.
    ///
    /// Weak persistents whose referent is otherwise unreachable get their
    /// callback first, with the referent still alive; the heap is then
    /// re-marked so anything the callbacks rooted survives.
    pub fn collect(&self) -> GcStats {
        let start = Instant::now();
        let mut marked = self.mark_from_roots();

        let mut doomed: Vec<(PersistentId, RawHandle, WeakFinalizer)> = Vec::new();
        {
            let heap = self.heap.borrow();
            let mut persistents = self.persistents.borrow_mut();
            for (id, slot) in persistents.iter_mut() {
                if !slot.weak {
                    continue;
                }
                let Some(referent) = slot.referent else {
                    continue;
                };
                if heap.is_marked(referent) {
                    continue;
                }
                match slot.finalizer.take() {
                    Some(finalizer) => doomed.push((*id, referent, finalizer)),
                    None => slot.referent = None,
                }
            }
        }

        let weak_callbacks = doomed.len();
        for (id, referent, finalizer) in doomed {
            log::trace!("weak callback for {:?}", id);
            let scope = self.open();
            self.root(referent);
            finalizer(self, referent);
            self.close(scope, None);
            if let Some(slot) = self.persistents.borrow_mut().get_mut(&id) {
                if slot.weak {
                    slot.referent = None;
                }
            }
        }
        if weak_callbacks > 0 {
            marked = self.mark_from_roots();
        }

        let freed = self.heap.borrow_mut().sweep();
        let freed_count = freed.len();
        let finalizers = run_finalizers(freed);

        let stats = GcStats {
            marked,
            freed: freed_count,
            weak_callbacks,
            finalizers,
            live: self.live_objects(),
            pause: start.elapsed(),
        };
        log::trace!("gc: {:?}", stats);
        stats
    }

    // ========================================================================
    // Work completions
    // ========================================================================

    pub(crate) fn submit_work(&self, work: WorkFn, after: AfterWorkFn) {
        let id = self.next_job.get();
        self.next_job.set(id + 1);
        self.after.borrow_mut().insert(id, after);
        if !self.pool.submit(id, work) {
            log::error!("work pool is shut down; request {} dropped", id);
            self.after.borrow_mut().remove(&id);
        }
    }

    fn complete(&self, completion: Completion) {
        let Some(after) = self.after.borrow_mut().remove(&completion.id) else {
            log::warn!("completion for unknown request {}", completion.id);
            return;
        };
        let scope = self.open();
        after(self, completion.status);
        self.close(scope, None);
        if let Some(exception) = self.pending.take() {
            log::warn!("exception {:?} escaped a work completion", exception);
        }
    }

    /// Run completions until no queued work remains; returns how many ran
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.pending_work() > 0 {
            let Some(completion) = self.pool.recv() else {
                break;
            };
            self.complete(completion);
            ran += 1;
        }
        ran
    }

    /// Run the completions that are ready now; returns how many ran
    pub fn poll(&self) -> usize {
        let mut ran = 0;
        while let Some(completion) = self.pool.try_recv() {
            self.complete(completion);
            ran += 1;
        }
        ran
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        // Release every root and sweep, so externals and buffers still get
        // their finalizers. Weak callbacks do not run at teardown.
        self.persistents.borrow_mut().clear();
        self.after.borrow_mut().clear();
        self.pending.set(None);
        for scope in self.scopes.borrow_mut().iter_mut() {
            scope.handles.clear();
        }
        let freed = {
            let mut heap = self.heap.borrow_mut();
            heap.clear_marks();
            heap.sweep()
        };
        let finalizers = run_finalizers(freed);
        log::debug!("isolate dropped; {} finalizers run", finalizers);
    }
}

fn run_finalizers(freed: Vec<HeapValue>) -> usize {
    let mut ran = 0;
    for value in freed {
        let HeapValue::Object(object) = value else {
            continue;
        };
        match object.kind {
            ObjectKind::External {
                ptr,
                finalizer: Some(finalizer),
            } => {
                finalizer(ptr);
                ran += 1;
            }
            ObjectKind::Buffer {
                data,
                on_free: Some(on_free),
            } => {
                on_free(data);
                ran += 1;
            }
            _ => {}
        }
    }
    ran
}

fn own_index(obj: &Object, index: u32) -> Found {
    match &obj.kind {
        ObjectKind::Array(elements) => match elements.get(index as usize) {
            Some(handle) => Found::Handle(*handle),
            None => Found::Missing,
        },
        ObjectKind::Buffer { data, .. } => match data.get(index as usize) {
            Some(byte) => Found::Number(f64::from(*byte)),
            None => Found::Missing,
        },
        _ => own_prop(obj, &PropKey::String(index.to_string())),
    }
}

fn own_prop(obj: &Object, key: &PropKey) -> Found {
    if let Some(handle) = obj.own(key) {
        return Found::Handle(handle);
    }
    let PropKey::String(name) = key else {
        return Found::Missing;
    };
    match (&obj.kind, name.as_str()) {
        (ObjectKind::Array(elements), "length") => Found::Number(elements.len() as f64),
        (ObjectKind::Buffer { data, .. }, "length") => Found::Number(data.len() as f64),
        (ObjectKind::Function { arity, .. }, "length") => Found::Number(*arity as f64),
        (ObjectKind::Function { name, .. }, "name") => Found::Str(name.clone()),
        _ => Found::Missing,
    }
}
