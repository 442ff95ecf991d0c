//! Heap-allocated object kinds beyond the plain containers in `crate::types`:
//! functions, classes, instances, generators, tracebacks, exceptions, bound
//! methods and cells. See spec.md §3 "Function", "Cell", "Generator",
//! "Traceback".

use std::rc::Rc;

use ahash::AHashMap;

use crate::code::CodeObject;
use crate::exceptions::ExcType;
use crate::frame::Frame;
use crate::heap::ObjectId;
use crate::intern::StringId;
use crate::value::Value;

/// An interpreted function: a code object plus everything needed to bind
/// arguments and resolve free variables at call time (spec.md §3 "Function").
#[derive(Debug, Clone)]
pub struct Function {
    pub name: StringId,
    pub qualname: StringId,
    pub code: Rc<CodeObject>,
    pub globals: ObjectId,
    pub defaults: Vec<Value>,
    pub kwdefaults: AHashMap<StringId, Value>,
    /// One cell per `co_freevars` entry, in order, captured from the defining
    /// scope at `MAKE_FUNCTION`/`MAKE_CLOSURE` time.
    pub closure: Vec<ObjectId>,
    pub annotations: AHashMap<StringId, Value>,
}

impl Function {
    #[must_use]
    pub fn has_dot_zero(&self) -> bool {
        self.code.has_dot_zero
    }
}

/// A native (host-implemented) callable, used both for true builtins and for
/// the engine's own intercepted names (`exec`, `eval`, `super`, ...) when they
/// need to appear as ordinary values (e.g. assigned to a variable).
pub type NativeFn = fn(&mut crate::interp::Interpreter, Vec<Value>, Vec<(StringId, Value)>) -> crate::exceptions::RunResult<Value>;

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub func: NativeFn,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction").field("name", &self.name).finish()
    }
}

/// A function bound to a receiver (`instance.method`), produced by attribute
/// lookup on an `Instance` when the attribute resolves to a `Function` on the
/// class. Spec.md §4.3 call protocol step 2.
#[derive(Debug, Clone, Copy)]
pub struct BoundMethod {
    pub receiver: Value,
    pub func: ObjectId,
}

/// A user-defined class produced by `__build_class__` (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct Class {
    pub name: StringId,
    /// Method resolution order, base-to-derived... actually stored
    /// derived-first (the class itself is not included) for linear MRO walks
    /// consistent with `super()`'s expectations.
    pub bases: Vec<ObjectId>,
    pub namespace: AHashMap<StringId, Value>,
    pub metaclass: Option<ObjectId>,
}

impl Class {
    /// Depth-first, left-to-right MRO walk (a simplification of C3
    /// linearization — see DESIGN.md Open Question). Used by attribute lookup
    /// and by `super()`.
    pub fn mro<'a>(&'a self, heap: &'a crate::heap::Heap) -> Vec<ObjectId> {
        let mut order = Vec::new();
        let mut stack: Vec<ObjectId> = self.bases.clone();
        stack.reverse();
        while let Some(id) = stack.pop() {
            if order.contains(&id) {
                continue;
            }
            order.push(id);
            if let crate::heap::HeapData::Class(base) = heap.get(id) {
                let mut rest: Vec<ObjectId> = base.bases.clone();
                rest.reverse();
                stack.extend(rest);
            }
        }
        order
    }

    pub fn lookup_method(&self, name: StringId, heap: &crate::heap::Heap) -> Option<Value> {
        if let Some(v) = self.namespace.get(&name) {
            return Some(*v);
        }
        for base_id in &self.bases {
            if let crate::heap::HeapData::Class(base) = heap.get(*base_id) {
                if let Some(v) = base.lookup_method(name, heap) {
                    return Some(v);
                }
            }
        }
        None
    }
}

/// An instance of a user-defined class.
#[derive(Debug, Clone, Default)]
pub struct Instance {
    pub class: Option<ObjectId>,
    pub attrs: AHashMap<StringId, Value>,
}

/// State of a suspended generator frame (spec.md §3 "Generator", §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Created,
    Running,
    Suspended,
    Finished,
}

/// `frame` is `None` only once a generator has finished: there is then
/// nothing left to resume, and no placeholder `Frame` value would be
/// meaningful (see DESIGN.md Open Question).
#[derive(Debug, Clone)]
pub struct Generator {
    pub frame: Option<Frame>,
    pub state: GeneratorState,
}

/// One frame's worth of traceback information. Immutable once captured;
/// chained tracebacks are represented by the linked `next` pointer, matching
/// CPython's `tb_next` ordering (outermost first).
#[derive(Debug, Clone)]
pub struct TracebackEntry {
    pub filename: StringId,
    pub function_name: StringId,
    pub line: Option<u32>,
    pub last_instruction: u32,
    pub next: Option<ObjectId>,
}

/// A raised-and-caught (or propagating) exception instance.
#[derive(Debug, Clone)]
pub struct ExceptionValue {
    pub exc_type: ExcType,
    pub message: Option<String>,
    pub traceback: Option<ObjectId>,
    pub cause: Option<Box<ExceptionValue>>,
    pub context: Option<Box<ExceptionValue>>,
}

