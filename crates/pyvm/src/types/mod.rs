//! Built-in container types: str, bytes, tuple, list, dict, set, frozenset.
//!
//! Each is a thin wrapper so `HeapData` (crate::heap) can dispatch on a
//! closed set of variants without boxing every container behind a trait
//! object, matching the teacher's `types/` module split.

pub mod dict;
pub mod list;

pub use dict::PyDict;
pub use list::PyList;

use crate::value::Value;

/// Immutable UTF-8 string. Heap-allocated (unlike the teacher's interned-string
/// fast path) because runtime string values are usually produced by
/// concatenation/formatting rather than baked into `co_consts`; literal string
/// *constants* are still deduplicated once in the constant pool (spec.md §3
/// `co_consts`) and only re-enter the heap as an owned `PyStr` on
/// `LOAD_CONST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyStr(pub String);

/// Immutable byte string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyBytes(pub Vec<u8>);

/// Immutable ordered sequence, as produced by `BUILD_TUPLE` or tuple literals.
#[derive(Debug, Clone, PartialEq)]
pub struct PyTuple(pub Vec<Value>);

/// Unordered collection of hashable values with set semantics.
#[derive(Debug, Clone, Default)]
pub struct PySet(pub Vec<Value>);

/// Like [`PySet`] but immutable once constructed (`frozenset(...)`).
#[derive(Debug, Clone, Default)]
pub struct PyFrozenSet(pub Vec<Value>);
