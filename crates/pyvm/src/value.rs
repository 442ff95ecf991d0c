//! Runtime value representation (spec.md §3 "Value").
//!
//! Like the teacher's `Value`, this uses a hybrid design: small immediate values
//! are stored inline on the Rust stack/in registers, while every heap-allocated
//! kind is a single `Ref(ObjectId)` indirection into the [`crate::heap::Heap`]
//! arena. `NULL` is modeled as an explicit variant (never a nullable reference to
//! `None`) per spec.md §9 "Sentinel NULL".

use crate::heap::ObjectId;
use crate::intern::StringId;

/// Tagged union of every runtime Python value the engine can hold on its
/// evaluation stack, in a namespace slot, or inside a container.
///
/// `Clone` is intentionally derived (unlike the teacher, which forbids it to
/// enforce manual refcounting): this engine's heap uses `Rc`-free arena
/// ref-counting internal to `HeapData` itself (see [`crate::heap::Heap::inc_ref`]),
/// so a bare `Value::clone()` of a `Ref` is a dangling-id risk exactly as in the
/// teacher. Call sites that duplicate a `Ref` onto the stack MUST go through
/// [`Value::clone_with_heap`] rather than `.clone()`; `.clone()` remains safe
/// for immediates and is used pervasively for them (e.g. copying constants).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// The `NULL` sentinel (spec.md §9), distinct from `None`. Pushed by
    /// `PUSH_NULL`, `LOAD_METHOD`, and some 3.11+ `LOAD_GLOBAL`/`LOAD_ATTR` forms
    /// to mark "no receiver" slots in the call sequence.
    Null,
    None,
    Bool(bool),
    Int(i64),
    Float(f64),

    /// Everything heap-allocated: Str, Bytes, Tuple, List, Dict, Set, FrozenSet,
    /// Function, NativeFunction, BoundMethod, Class, Instance, Cell, Generator,
    /// Traceback, ExceptionValue. See [`crate::heap::HeapData`].
    Ref(ObjectId),
}

impl Value {
    #[must_use]
    pub fn type_name(self, heap: &crate::heap::Heap) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Ref(id) => heap.get(id).type_name(),
        }
    }

    /// Python truthiness (`bool(x)`), needed by every conditional jump opcode.
    #[must_use]
    pub fn truthy(self, heap: &crate::heap::Heap) -> bool {
        match self {
            Value::Null => false,
            Value::None => false,
            Value::Bool(b) => b,
            Value::Int(i) => i != 0,
            Value::Float(f) => f != 0.0,
            Value::Ref(id) => heap.get(id).truthy(heap),
        }
    }

    /// `is` identity comparison. Immediates compare by value (the engine does
    /// not attempt CPython's small-int/singleton caching identity quirks —
    /// bit-exact object identity is an explicit Non-goal, spec.md §1).
    #[must_use]
    pub fn is_identical(self, other: Value) -> bool {
        match (self, other) {
            (Value::Ref(a), Value::Ref(b)) => a == b,
            _ => self == other,
        }
    }

    #[must_use]
    pub fn as_ref_id(self) -> Option<ObjectId> {
        match self {
            Value::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// `repr(x)`, used by `print`/`str`/`repr` and by error-message
    /// formatting throughout the builtins. Best-effort: containers recurse,
    /// user instances fall back to `<ClassName object>` since the engine
    /// does not dispatch to a user-defined `__repr__` here (callers that
    /// need that dispatch go through the call protocol instead).
    #[must_use]
    pub fn py_repr(self, heap: &crate::heap::Heap, interns: &crate::intern::Interns) -> String {
        use crate::heap::HeapData;
        match self {
            Value::Null => "NULL".to_string(),
            Value::None => "None".to_string(),
            Value::Bool(b) => if b { "True" } else { "False" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Value::Ref(id) => match heap.get(id) {
                HeapData::Str(s) => format!("'{s}'"),
                HeapData::Bytes(b) => format!("b{:?}", String::from_utf8_lossy(b)),
                HeapData::Tuple(items) => {
                    let inner = items.iter().map(|v| v.py_repr(heap, interns)).collect::<Vec<_>>().join(", ");
                    if items.len() == 1 {
                        format!("({inner},)")
                    } else {
                        format!("({inner})")
                    }
                }
                HeapData::List(l) => {
                    let inner = l.0.iter().map(|v| v.py_repr(heap, interns)).collect::<Vec<_>>().join(", ");
                    format!("[{inner}]")
                }
                HeapData::Dict(d) | HeapData::Namespace(d) => {
                    let inner = d
                        .iter()
                        .map(|(k, v)| format!("{}: {}", k.py_repr(heap, interns), v.py_repr(heap, interns)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{{{inner}}}")
                }
                HeapData::Set(s) => {
                    let inner = s.0.iter().map(|v| v.py_repr(heap, interns)).collect::<Vec<_>>().join(", ");
                    format!("{{{inner}}}")
                }
                HeapData::FrozenSet(s) => {
                    let inner = s.0.iter().map(|v| v.py_repr(heap, interns)).collect::<Vec<_>>().join(", ");
                    format!("frozenset({{{inner}}})")
                }
                HeapData::Function(f) => format!("<function {} at {:#x}>", interns.get(f.qualname), id),
                HeapData::Class(c) => format!("<class '{}'>", interns.get(c.name)),
                HeapData::Instance(inst) => match inst.class.and_then(|cid| match heap.get(cid) {
                    HeapData::Class(c) => Some(interns.get(c.name)),
                    _ => None,
                }) {
                    Some(name) => format!("<{name} object at {id:#x}>"),
                    None => format!("<object at {id:#x}>"),
                },
                _ => format!("<{} object at {:#x}>", heap.get(id).type_name(), id),
            },
        }
    }

    /// `str(x)`: identical to [`Value::py_repr`] except a bare `Str` prints
    /// without surrounding quotes, matching CPython's `str`/`repr` split.
    #[must_use]
    pub fn py_str(self, heap: &crate::heap::Heap, interns: &crate::intern::Interns) -> String {
        if let Value::Ref(id) = self {
            if let crate::heap::HeapData::Str(s) = heap.get(id) {
                return s.clone();
            }
        }
        self.py_repr(heap, interns)
    }
}

/// A one-slot mutable container shared between a defining frame and its
/// closures (spec.md "Cell"). Lives in the heap arena like everything else
/// heap-allocated, so that two `Value::Ref` copies referring to the same cell
/// observe each other's writes.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub slot: Option<Value>,
}

impl Cell {
    #[must_use]
    pub fn empty() -> Self {
        Self { slot: None }
    }

    #[must_use]
    pub fn filled(value: Value) -> Self {
        Self { slot: Some(value) }
    }
}

/// Attribute names frequently compared by the call/attribute machinery.
/// Interned once at engine startup to avoid repeated string interning for
/// dunder lookups (`__enter__`, `__exit__`, `__init__`, ...).
#[derive(Debug, Clone, Copy)]
pub struct WellKnownNames {
    pub init: StringId,
    pub new: StringId,
    pub enter: StringId,
    pub exit: StringId,
    pub classcell: StringId,
    pub class_attr: StringId,
    pub metaclass: StringId,
    pub prepare: StringId,
    pub build_class: StringId,
    pub dot_zero: StringId,
}

impl WellKnownNames {
    pub fn intern(interns: &mut crate::intern::Interns) -> Self {
        Self {
            init: interns.intern("__init__"),
            new: interns.intern("__new__"),
            enter: interns.intern("__enter__"),
            exit: interns.intern("__exit__"),
            classcell: interns.intern("__classcell__"),
            class_attr: interns.intern("__class__"),
            metaclass: interns.intern("metaclass"),
            prepare: interns.intern("__prepare__"),
            build_class: interns.intern("__build_class__"),
            dot_zero: interns.intern(".0"),
        }
    }
}
