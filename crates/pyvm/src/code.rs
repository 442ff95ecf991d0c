//! `CodeObject`: the portable, immutable representation of a compiled unit
//! (spec.md §3 "CodeObject"). Produced by an external loader or compiler
//! (spec.md §1 Out of scope / §6 "Input artifacts") and consumed as-is by the
//! engine — this module never parses source or a marshalled container.

use crate::intern::StringId;
use crate::value::Value;
use crate::version::PyVersion;

/// Minimal hand-rolled bitflags, since the `bitflags` crate appears nowhere in
/// the teacher's or pack's Python-VM dependency trees (they hand-roll small
/// bitsets with plain `const` bit values instead, e.g. `vmtrace.py`'s
/// `PyVMEVENT_*` constants).
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub $repr);

        impl $name {
            $(pub const $variant: Self = Self($value);)*

            #[must_use]
            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            #[must_use]
            pub fn union(self, other: Self) -> Self {
                Self(self.0 | other.0)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                self.union(rhs)
            }
        }
    };
}

bitflags_like! {
    /// Mirrors a subset of CPython's `co_flags` bits that the engine consults.
    pub struct CodeFlags: u32 {
        const OPTIMIZED = 0x0001;
        const NEWLOCALS = 0x0002;
        const VARARGS = 0x0004;
        const VARKEYWORDS = 0x0008;
        const NESTED = 0x0010;
        const GENERATOR = 0x0020;
        const NOFREE = 0x0040;
        const COROUTINE = 0x0080;
        const ITERABLE_COROUTINE = 0x0100;
        const ASYNC_GENERATOR = 0x0200;
    }
}

/// One entry of the source line table: bytecode offset -> source line.
/// Entries are sorted by `offset`; a `line` of `None` marks bytecode with no
/// associated source line (e.g. padding `CACHE` slots in 3.11+).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct LineEntry {
    pub offset: u32,
    pub line: Option<u32>,
}

/// One entry of the 3.11+ exception table (spec.md §4.5, §9 "3.11 exception
/// tables"). Pre-3.11 code instead relies on `SETUP_FINALLY`/`SETUP_EXCEPT`
/// block records built at runtime by the block stack (see `crate::frame::Block`);
/// this table is simply empty for those versions.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ExceptionTableEntry {
    /// Start of the protected bytecode range (inclusive).
    pub start: u32,
    /// End of the protected bytecode range (exclusive).
    pub end: u32,
    /// Offset of the handler to jump to.
    pub handler: u32,
    /// Value stack depth to restore before entering the handler.
    pub stack_depth: u16,
    /// Whether the handler expects `push_lasti` semantics (push the last
    /// instruction offset before the exception value, used for `with` blocks).
    pub push_lasti: bool,
}

impl ExceptionTableEntry {
    #[must_use]
    pub fn covers(&self, offset: u32) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// Immutable, portable representation of a compiled code unit. See spec.md §3.
///
/// Invariant: every index referenced by a bytecode operand (into `consts`,
/// `names`, `varnames`, `freevars`, `cellvars`) must be in range for its array.
/// The engine trusts this invariant and will panic (an `EngineError`, not a UB
/// panic — see [`crate::interp`]) rather than silently index out of bounds.
/// Not `Serialize`/`Deserialize`: `co_consts` can hold `Value::Ref` pointing
/// into a live `Heap`, and an `ObjectId` has no meaning outside the arena
/// that allocated it. A loader that wants a wire format serializes its own
/// representation (constants spelled out structurally) and materializes the
/// string/bytes/tuple constants into the target `Heap` while building this
/// type — see `pyvm-cli`'s loader.
#[derive(Debug, Clone)]
pub struct CodeObject {
    pub version: PyVersion,
    pub co_code: Vec<u8>,
    pub co_consts: Vec<Value>,
    pub co_names: Vec<StringId>,
    pub co_varnames: Vec<StringId>,
    pub co_freevars: Vec<StringId>,
    pub co_cellvars: Vec<StringId>,
    pub co_argcount: u32,
    pub co_posonlyargcount: u32,
    pub co_kwonlyargcount: u32,
    pub co_flags: CodeFlags,
    pub co_name: StringId,
    pub co_qualname: StringId,
    pub co_filename: StringId,
    pub co_firstlineno: u32,
    pub line_table: Vec<LineEntry>,
    pub exception_table: Vec<ExceptionTableEntry>,
    /// `true` for a comprehension code object taking the implicit `.0`
    /// parameter (spec.md §4.3 "has_dot_zero", §4.4).
    pub has_dot_zero: bool,
}

impl CodeObject {
    #[must_use]
    pub fn is_generator(&self) -> bool {
        self.co_flags.contains(CodeFlags::GENERATOR)
    }

    #[must_use]
    pub fn is_varargs(&self) -> bool {
        self.co_flags.contains(CodeFlags::VARARGS)
    }

    #[must_use]
    pub fn is_varkeywords(&self) -> bool {
        self.co_flags.contains(CodeFlags::VARKEYWORDS)
    }

    /// Total number of named parameter slots (positional-only + positional-or-
    /// keyword + keyword-only), excluding `*args`/`**kwargs`.
    #[must_use]
    pub fn named_param_count(&self) -> u32 {
        self.co_argcount + self.co_kwonlyargcount
    }

    /// Looks up the source line active at `offset`, walking the (sorted)
    /// line table with a monotonic scan — the pattern used by the original
    /// `vmtrace.py`'s `findlinestarts`-based line tracking (see SPEC_FULL.md).
    #[must_use]
    pub fn line_for_offset(&self, offset: u32) -> Option<u32> {
        let mut current = None;
        for entry in &self.line_table {
            if entry.offset > offset {
                break;
            }
            if entry.line.is_some() {
                current = entry.line;
            }
        }
        current
    }

    #[must_use]
    pub fn exception_handler_for(&self, offset: u32) -> Option<&ExceptionTableEntry> {
        self.exception_table.iter().find(|e| e.covers(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CodeObject {
        CodeObject {
            version: PyVersion::V3_11,
            co_code: vec![],
            co_consts: vec![],
            co_names: vec![],
            co_varnames: vec![],
            co_freevars: vec![],
            co_cellvars: vec![],
            co_argcount: 0,
            co_posonlyargcount: 0,
            co_kwonlyargcount: 0,
            co_flags: CodeFlags::default(),
            co_name: StringId::from_index(0),
            co_qualname: StringId::from_index(0),
            co_filename: StringId::from_index(0),
            co_firstlineno: 1,
            line_table: vec![
                LineEntry { offset: 0, line: Some(1) },
                LineEntry { offset: 4, line: Some(2) },
                LineEntry { offset: 10, line: None },
            ],
            exception_table: vec![ExceptionTableEntry {
                start: 2,
                end: 8,
                handler: 20,
                stack_depth: 0,
                push_lasti: false,
            }],
            has_dot_zero: false,
        }
    }

    #[test]
    fn line_lookup_walks_monotonically() {
        let code = sample();
        assert_eq!(code.line_for_offset(0), Some(1));
        assert_eq!(code.line_for_offset(3), Some(1));
        assert_eq!(code.line_for_offset(4), Some(2));
        assert_eq!(code.line_for_offset(10), Some(2));
    }

    #[test]
    fn exception_table_lookup() {
        let code = sample();
        assert!(code.exception_handler_for(5).is_some());
        assert!(code.exception_handler_for(9).is_none());
    }
}
