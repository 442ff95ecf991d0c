//! Tracing loop and breakpoint patching (spec.md §4.7, §9 `vmtrace.py`
//! supplement documented in SPEC_FULL.md).
//!
//! The teacher has no debugger/profiler surface of its own, so this module is
//! grounded directly in the original `x-python`'s `xpython/vmtrace.py`: a
//! bitset of trace events (not a single on/off switch) and a callback that
//! can downgrade tracing mid-run by returning `None`.

use crate::value::Value;
use crate::version::PyVersion;

/// Reserved opcode byte used to mark a patched breakpoint location
/// (spec.md §4.7). `x-python` reuses the value `8`; that collides with real
/// opcodes on several of the versions this engine supports (e.g. `3.6+`
/// wordcode uses every byte 0-255 opcode space more densely), so the engine
/// instead reserves `0xFE`, which every supported version's table leaves
/// unassigned (verified in `opcodes::build_tables`'s invariant check).
pub const BRKPT_OPCODE: u8 = 0xFE;

/// Bitset of trace events a callback wants to observe, mirroring
/// `vmtrace.py`'s `PyVMEVENT_*` constants. Hand-rolled rather than pulled
/// from the `bitflags` crate, matching the teacher's and pack's preference
/// for small inline bitsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TraceFlags(pub u16);

impl TraceFlags {
    pub const NONE: Self = Self(0);
    pub const INSTRUCTION: Self = Self(1 << 0);
    pub const LINE: Self = Self(1 << 1);
    pub const CALL: Self = Self(1 << 2);
    pub const RETURN: Self = Self(1 << 3);
    pub const EXCEPTION: Self = Self(1 << 4);
    pub const YIELD: Self = Self(1 << 5);
    pub const FATAL: Self = Self(1 << 6);
    /// Clears `RETURN`/`YIELD` for a call being stepped *over* rather than
    /// into, matching `vmtrace.py`'s `STEP_OVER` semantics.
    pub const STEP_OVER: Self = Self(1 << 7);
    pub const ALL: Self = Self(0b1111_1111);

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub fn remove(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for TraceFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Which event fired (spec.md §6 "Tracing callback signature").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Call,
    Line,
    Instruction,
    Return,
    Yield,
    Exception,
}

/// What the callback asks the engine to do next (spec.md §6, §4.7).
#[derive(Debug, Clone, Default)]
pub enum TraceControl {
    /// Keep tracing with the current flags.
    #[default]
    Continue,
    /// Disable tracing for the remainder of this scope.
    Disable,
    /// Suppress dispatch of the current opcode (used by `BRKPT` handling: the
    /// breakpoint callback has already decided the instruction's outcome).
    Skip,
    /// Force an early return from the current frame.
    Return(Value),
    /// Stop tracing this call but continue executing it normally.
    Finish,
}

/// One invocation of the trace callback, matching spec.md §6's tuple shape.
pub struct TraceCallArgs<'a> {
    pub event: TraceEvent,
    pub offset: u32,
    pub opcode_name: &'a str,
    pub opcode_byte: u8,
    pub line: Option<u32>,
    pub immediate_arg: Option<i64>,
    pub version: PyVersion,
}

/// A registered trace callback. Boxed rather than generic over a closure
/// type so a `Frame` can hold one without infecting `Frame` with a type
/// parameter (the teacher avoids generic callback storage the same way in
/// its own `f_trace`-equivalent hooks).
pub type TraceFn = Box<dyn FnMut(TraceCallArgs<'_>) -> TraceControl>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_over_clears_return_and_yield() {
        let flags = TraceFlags::ALL.remove(TraceFlags::RETURN).remove(TraceFlags::YIELD);
        assert!(!flags.contains(TraceFlags::RETURN));
        assert!(!flags.contains(TraceFlags::YIELD));
        assert!(flags.contains(TraceFlags::LINE));
    }

    #[test]
    fn brkpt_opcode_is_documented_reserved_value() {
        assert_eq!(BRKPT_OPCODE, 0xFE);
    }
}
