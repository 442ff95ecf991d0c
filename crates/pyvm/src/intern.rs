//! String interning for names, identifiers, and literal string/bytes constants.
//!
//! Mirrors the teacher's interner design: unique strings live in a vector and are
//! referenced everywhere else by a small `Copy` index, avoiding repeated
//! allocation/cloning of `co_names`/`co_varnames` entries and giving O(1)
//! equality for interned identifiers.

use ahash::AHashMap;

/// Index into the string interner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct StringId(u32);

impl StringId {
    #[must_use]
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// String interner shared by every `CodeObject` and `Frame` produced from a
/// single compiled program. Not used to intern runtime-constructed strings
/// (those live on the heap as `HeapData::Str`); this is purely for the fixed
/// vocabulary of names baked into bytecode (`co_names`, `co_varnames`, etc.)
/// and small literal string constants.
#[derive(Debug, Default, Clone)]
pub struct Interns {
    strings: Vec<Box<str>>,
    lookup: AHashMap<Box<str>, StringId>,
}

impl Interns {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `s`, returning its existing id if already present.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.lookup.get(s) {
            return id;
        }
        let id = StringId::from_index(self.strings.len() as u32);
        let boxed: Box<str> = s.into();
        self.lookup.insert(boxed.clone(), id);
        self.strings.push(boxed);
        id
    }

    /// # Panics
    /// Panics if `id` was not produced by this interner. Bytecode operands
    /// referencing name-table indices are trusted to be in range by
    /// [`crate::code::CodeObject`]'s construction invariant.
    #[must_use]
    pub fn get(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedupes() {
        let mut interns = Interns::new();
        let a = interns.intern("x");
        let b = interns.intern("y");
        let c = interns.intern("x");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(interns.get(a), "x");
        assert_eq!(interns.get(b), "y");
    }
}
