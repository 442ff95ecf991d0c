//! Target Python language version and the per-version calling convention it implies.

use std::fmt;

/// A `(major, minor)` Python version tag, as carried by `CodeObject`.
///
/// This is the engine's unit of "which opcode table / call protocol applies",
/// not a claim about full language-feature parity with that CPython release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PyVersion {
    pub major: u8,
    pub minor: u8,
}

impl PyVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub const V2_7: Self = Self::new(2, 7);
    pub const V3_1: Self = Self::new(3, 1);
    pub const V3_2: Self = Self::new(3, 2);
    pub const V3_3: Self = Self::new(3, 3);
    pub const V3_4: Self = Self::new(3, 4);
    pub const V3_5: Self = Self::new(3, 5);
    pub const V3_6: Self = Self::new(3, 6);
    pub const V3_7: Self = Self::new(3, 7);
    pub const V3_8: Self = Self::new(3, 8);
    pub const V3_9: Self = Self::new(3, 9);
    pub const V3_10: Self = Self::new(3, 10);
    pub const V3_11: Self = Self::new(3, 11);
    pub const V3_12: Self = Self::new(3, 12);

    /// The set of versions the engine ships an opcode table for.
    pub const SUPPORTED: &'static [PyVersion] = &[
        Self::V2_7,
        Self::V3_1,
        Self::V3_2,
        Self::V3_3,
        Self::V3_4,
        Self::V3_5,
        Self::V3_6,
        Self::V3_7,
        Self::V3_8,
        Self::V3_9,
        Self::V3_10,
        Self::V3_11,
        Self::V3_12,
    ];

    #[must_use]
    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }

    /// Which calling convention era (§4.3 of the spec) this version uses.
    #[must_use]
    pub fn call_era(self) -> CallEra {
        if self.major == 2 || self < Self::V3_6 {
            CallEra::Classic
        } else if self < Self::V3_11 {
            CallEra::Call36
        } else {
            CallEra::Call311
        }
    }

    /// Whether exception handling is driven by a per-code exception table
    /// (3.11+) rather than `SETUP_FINALLY`/`SETUP_EXCEPT` block records.
    #[must_use]
    pub fn uses_exception_table(self) -> bool {
        self >= Self::V3_11
    }

    /// Whether `EXTENDED_ARG`-based variable-width decoding (one opcode +
    /// one-byte operand, every instruction occupying exactly 2 bytes) applies.
    /// Pre-3.6 bytecode instead has a fixed 1-or-3 byte encoding per opcode.
    #[must_use]
    pub fn uses_wordcode(self) -> bool {
        self.major == 3 && self >= Self::V3_6
    }

    /// Whether `END_FINALLY` exists as a real opcode (removed in 3.8, whose
    /// compiler instead duplicates the finally-block bytecode at each exit).
    #[must_use]
    pub fn has_end_finally(self) -> bool {
        self < Self::V3_8
    }
}

impl fmt::Display for PyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Which family of `CALL_*` opcodes a version emits. See spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallEra {
    /// `CALL_FUNCTION{,_VAR,_KW,_VAR_KW}`, arity split across immediate bytes.
    Classic,
    /// `CALL_FUNCTION` / `CALL_FUNCTION_KW` / `CALL_FUNCTION_EX` / `CALL_METHOD`+`LOAD_METHOD`.
    Call36,
    /// `PUSH_NULL` / `PRECALL` / `KW_NAMES` / `CALL`.
    Call311,
}
