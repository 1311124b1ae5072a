//! Handle heap
//!
//! Every engine value lives in a cell of one slot vector. A [`RawHandle`]
//! encodes the cell index in its low 32 bits and the cell's generation in
//! the high 32 bits, so a handle to a freed and reused cell never resolves.
//!
//! ```text
//! bits:  [ generation: u32 | index: u32 ]
//! index 0 is never allocated, so RawHandle(0) is always invalid
//! ```

use std::ffi::c_void;
use std::rc::Rc;

use shim_sdk::sys::{BufferFinalizer, ExternalFinalizer};
use shim_sdk::{EngineResult, ErrorKind, NativeCallback, RawHandle};

use crate::isolate::Isolate;

/// Body of a function implemented by the host rather than a native extension.
pub type ScriptFn = Rc<dyn Fn(&Isolate, RawHandle, &[RawHandle]) -> EngineResult<RawHandle>>;

/// Own-property key
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PropKey {
    String(String),
    Symbol(RawHandle),
}

pub(crate) enum FunctionBody {
    Native {
        callback: NativeCallback,
        data: RawHandle,
    },
    Script(ScriptFn),
}

pub(crate) enum ObjectKind {
    Plain,
    Array(Vec<RawHandle>),
    Function {
        name: String,
        arity: usize,
        body: FunctionBody,
    },
    External {
        ptr: *mut c_void,
        finalizer: Option<ExternalFinalizer>,
    },
    Date(f64),
    Buffer {
        data: Box<[u8]>,
        on_free: Option<BufferFinalizer>,
    },
    Error(ErrorKind),
    /// Result of ToObject on a primitive
    Wrapper(RawHandle),
}

pub(crate) struct Object {
    pub kind: ObjectKind,
    pub prototype: Option<RawHandle>,
    pub properties: Vec<(PropKey, RawHandle)>,
    pub hidden: Vec<(RawHandle, RawHandle)>,
}

impl Object {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            prototype: None,
            properties: Vec::new(),
            hidden: Vec::new(),
        }
    }

    pub fn own(&self, key: &PropKey) -> Option<RawHandle> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
    }

    pub fn define(&mut self, key: PropKey, value: RawHandle) {
        match self.properties.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((key, value)),
        }
    }

    fn children(&self, out: &mut Vec<RawHandle>) {
        out.extend(self.prototype);
        for (key, value) in &self.properties {
            if let PropKey::Symbol(sym) = key {
                out.push(*sym);
            }
            out.push(*value);
        }
        for (key, value) in &self.hidden {
            out.push(*key);
            out.push(*value);
        }
        match &self.kind {
            ObjectKind::Array(elements) => out.extend(elements.iter().copied()),
            ObjectKind::Function {
                body: FunctionBody::Native { data, .. },
                ..
            } => out.push(*data),
            ObjectKind::Wrapper(primitive) => out.push(*primitive),
            _ => {}
        }
    }
}

pub(crate) enum HeapValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Symbol(String),
    Object(Box<Object>),
}

struct Cell {
    generation: u32,
    value: Option<HeapValue>,
    marked: bool,
    pinned: bool,
}

/// Slot vector with a free list and mark bits.
pub(crate) struct Heap {
    cells: Vec<Cell>,
    free: Vec<u32>,
    live: usize,
}

impl Heap {
    pub fn new() -> Self {
        // Index 0 stays empty forever.
        let sentinel = Cell {
            generation: 0,
            value: None,
            marked: false,
            pinned: true,
        };
        Self {
            cells: vec![sentinel],
            free: Vec::new(),
            live: 0,
        }
    }

    /// Number of live cells
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn alloc(&mut self, value: HeapValue) -> RawHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let cell = &mut self.cells[index as usize];
            cell.generation = cell.generation.wrapping_add(1).max(1);
            cell.value = Some(value);
            cell.marked = false;
            return encode(index, cell.generation);
        }
        let index = self.cells.len() as u32;
        self.cells.push(Cell {
            generation: 1,
            value: Some(value),
            marked: false,
            pinned: false,
        });
        encode(index, 1)
    }

    /// Allocate a cell that is never swept
    pub fn alloc_pinned(&mut self, value: HeapValue) -> RawHandle {
        let handle = self.alloc(value);
        if let Some(cell) = self.cell_mut(handle) {
            cell.pinned = true;
        }
        handle
    }

    fn cell(&self, handle: RawHandle) -> Option<&Cell> {
        let (index, generation) = decode(handle);
        self.cells
            .get(index as usize)
            .filter(|c| c.generation == generation && c.value.is_some())
    }

    fn cell_mut(&mut self, handle: RawHandle) -> Option<&mut Cell> {
        let (index, generation) = decode(handle);
        self.cells
            .get_mut(index as usize)
            .filter(|c| c.generation == generation && c.value.is_some())
    }

    pub fn get(&self, handle: RawHandle) -> Option<&HeapValue> {
        self.cell(handle)?.value.as_ref()
    }

    pub fn object(&self, handle: RawHandle) -> Option<&Object> {
        match self.get(handle)? {
            HeapValue::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn object_mut(&mut self, handle: RawHandle) -> Option<&mut Object> {
        match self.cell_mut(handle)?.value.as_mut()? {
            HeapValue::Object(object) => Some(object),
            _ => None,
        }
    }

    // ========================================================================
    // Collection
    // ========================================================================

    pub fn clear_marks(&mut self) {
        for cell in &mut self.cells {
            cell.marked = false;
        }
    }

    pub fn is_marked(&self, handle: RawHandle) -> bool {
        self.cell(handle).is_some_and(|c| c.marked || c.pinned)
    }

    /// Mark everything reachable from `roots`; returns newly marked cells
    pub fn mark<I>(&mut self, roots: I) -> usize
    where
        I: IntoIterator<Item = RawHandle>,
    {
        let mut worklist: Vec<RawHandle> = roots.into_iter().collect();
        let mut marked = 0;
        while let Some(handle) = worklist.pop() {
            let Some(cell) = self.cell_mut(handle) else {
                continue;
            };
            if cell.marked {
                continue;
            }
            cell.marked = true;
            marked += 1;
            if let Some(HeapValue::Object(object)) = &cell.value {
                object.children(&mut worklist);
            }
        }
        marked
    }

    /// Free every unmarked, unpinned cell and hand back the freed values
    pub fn sweep(&mut self) -> Vec<HeapValue> {
        let mut freed = Vec::new();
        for (index, cell) in self.cells.iter_mut().enumerate() {
            if cell.pinned || cell.marked || cell.value.is_none() {
                continue;
            }
            if let Some(value) = cell.value.take() {
                freed.push(value);
            }
            self.free.push(index as u32);
        }
        self.live -= freed.len();
        freed
    }
}

fn encode(index: u32, generation: u32) -> RawHandle {
    RawHandle::from_bits((u64::from(generation) << 32) | u64::from(index))
}

fn decode(handle: RawHandle) -> (u32, u32) {
    let bits = handle.to_bits();
    (bits as u32, (bits >> 32) as u32)
}
