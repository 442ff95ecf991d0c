//! Insertion-ordered mapping (`BUILD_MAP`, `STORE_SUBSCR` on a dict, ...).
//!
//! Python dicts must preserve insertion order (guaranteed since 3.7, and
//! observed as an implementation detail in 3.6). Key equality for heap-backed
//! keys (e.g. two distinct `PyStr` objects with equal contents) needs heap
//! access to resolve, so lookups take a `&Heap` rather than relying on `Eq`.
//! This trades O(1) hashing for straightforward heap-aware equality; see
//! DESIGN.md for why this is an acceptable simplification for this port.

use crate::heap::Heap;
use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct PyDict {
    entries: Vec<(Value, Value)>,
}

impl PyDict {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: Value, heap: &Heap) -> Option<Value> {
        self.entries
            .iter()
            .find(|(k, _)| heap.values_equal(*k, key))
            .map(|(_, v)| *v)
    }

    /// Inserts or updates `key`. Preserves the position of an existing key
    /// (Python dict semantics: re-assigning a key does not move it to the end).
    pub fn set(&mut self, key: Value, value: Value, heap: &Heap) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| heap.values_equal(*k, key)) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn remove(&mut self, key: Value, heap: &Heap) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| heap.values_equal(*k, key))?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, key: Value, heap: &Heap) -> bool {
        self.entries.iter().any(|(k, _)| heap.values_equal(*k, key))
    }

    /// Exact `Value` equality, bypassing `heap.values_equal`. Safe for
    /// namespace dicts: `crate::heap::namespace_set`/`namespace_remove`
    /// resolve a name to its one canonical key `ObjectId` before calling
    /// these, so plain tag/id equality already decides key identity and no
    /// `&Heap` borrow (which would alias a dict already borrowed out of the
    /// heap arena) is needed.
    #[must_use]
    pub fn get_raw(&self, key: Value) -> Option<Value> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn set_raw(&mut self, key: Value, value: Value) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn remove_raw(&mut self, key: Value) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = Value> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }
}
