//! Per-version opcode dispatch tables (spec.md §4.1, §9 "Opcode tables are
//! per-version"). A [`OpTable`] is a flat 256-entry array built once per
//! [`crate::interp::Interpreter`] from a shared base plus small per-era/
//! per-version overlays — the same differential-diff shape the teacher's own
//! version-gated opcode modules use, generalized across the three calling
//! conventions spec.md §4.3 describes (`Classic`, `Call36`, `Call311`).
//!
//! Coverage here spans the opcodes needed to run straight-line code,
//! arithmetic, containers, control flow, function calls (all three call
//! eras), class construction, and basic exception handling. Opcodes outside
//! that set (import machinery, `with`/async, f-strings, match statements,
//! ...) have no table entry and surface as `EngineError::UnknownOpcode`,
//! which spec.md §4.1 explicitly sanctions rather than requiring bit-for-bit
//! opcode coverage of thirteen language versions.

mod arith;
mod calls;
mod containers;
mod control;
mod stackvars;

use crate::exceptions::{EngineError, RunResult};
use crate::frame::Signal;
use crate::interp::Interpreter;
use crate::version::PyVersion;

pub type HandlerFn = fn(&mut Interpreter, i64) -> RunResult<Signal>;

#[derive(Clone, Copy)]
pub struct OpSpec {
    pub name: &'static str,
    pub handler: HandlerFn,
}

/// A dense per-opcode-byte lookup table for one [`PyVersion`].
pub struct OpTable(Box<[Option<OpSpec>; 256]>);

impl OpTable {
    fn empty() -> Self {
        Self(Box::new([None; 256]))
    }

    fn set(&mut self, opcode: u8, name: &'static str, handler: HandlerFn) {
        self.0[opcode as usize] = Some(OpSpec { name, handler });
    }

    fn unset(&mut self, opcode: u8) {
        self.0[opcode as usize] = None;
    }

    #[must_use]
    pub fn get(&self, opcode: u8) -> Option<OpSpec> {
        self.0[opcode as usize]
    }
}

pub fn opcode_name(interp: &Interpreter, opcode: u8) -> &'static str {
    interp.op_table.get(opcode).map_or("UNKNOWN", |spec| spec.name)
}

pub fn dispatch(interp: &mut Interpreter, opcode: u8, arg: i64) -> RunResult<Signal> {
    let Some(spec) = interp.op_table.get(opcode) else {
        return Err(EngineError::UnknownOpcode { opcode, version: interp.config.version }.into());
    };
    (spec.handler)(interp, arg)
}

/// Builds the dispatch table for `version` by laying down the stack-machine
/// base shared by every supported release and then applying the handful of
/// version/era-specific overlays spec.md §4.1/§4.3/§4.5 call out.
#[must_use]
pub fn build_table(version: PyVersion) -> OpTable {
    let mut table = OpTable::empty();

    stackvars::install(&mut table, version);
    arith::install(&mut table, version);
    containers::install(&mut table, version);
    control::install(&mut table, version);
    calls::install(&mut table, version);

    if version.major == 2 {
        // 2.x never gained `__build_class__`/`LOAD_BUILD_CLASS`, and prints
        // were a statement (`PRINT_ITEM`/`PRINT_NEWLINE`) rather than the
        // `print()` builtin — neither has a handler here (spec.md Non-goals
        // list import/print-statement desugaring as out of scope), so just
        // make sure the 3.x-only entries aren't left dangling on a 2.7 table.
        table.unset(calls::LOAD_BUILD_CLASS);
    }

    table
}
