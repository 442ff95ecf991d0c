//! Execution context for one call (spec.md §3 "Frame", "Block").
//!
//! Structurally this is the teacher's `Frame` (compare
//! `examples/other_examples/.../vm-src-frame.rs.rs`: code + value stack +
//! block stack + locals + `lasti`) generalized with the extra bookkeeping a
//! cross-version engine needs: a cell table for closures, a breakpoint shadow
//! map, and the 3.11+ `call_shape_kwnames` staging slot.

use ahash::AHashMap;

use crate::code::CodeObject;
use crate::heap::ObjectId;
use crate::intern::StringId;
use crate::trace::TraceFlags;
use crate::value::Value;
use std::rc::Rc;

/// What kind of structured construct a [`Block`] guards (spec.md §3 "Block").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Loop { start: u32 },
    Except,
    Finally,
    With,
    /// Post-3.11 equivalent pushed while a handler runs, so a nested
    /// exception can still find "the exception currently being handled"
    /// (spec.md §4.5 "except-handler").
    ExceptHandler,
}

/// One entry of the frame's block stack. `handler` is the bytecode offset to
/// jump to; `stack_depth` is the value-stack depth to restore before
/// entering it (spec.md §8 property 2 "Block invariant").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub handler: u32,
    pub stack_depth: usize,
}

/// Control signal a handler or the unwinder returns to the interpreter loop
/// (spec.md §4.1, §4.2 step 4).
#[derive(Debug, Clone)]
pub enum Signal {
    Normal,
    Return(Value),
    Yield(Value),
    Exception,
    Reraise,
}

/// Execution activation record for one call (spec.md §3 "Frame").
#[derive(Clone)]
pub struct Frame {
    pub code: Rc<CodeObject>,
    pub f_globals: ObjectId,
    pub f_builtins: ObjectId,
    /// Function-local namespace. At module scope this aliases `f_globals`
    /// (spec.md §3 "f_locals ... may alias globals at module scope").
    pub f_locals: ObjectId,
    /// Free + cell variable name -> cell, resolved once at frame creation.
    pub cells: AHashMap<StringId, ObjectId>,
    pub stack: Vec<Value>,
    pub blocks: Vec<Block>,
    pub f_lasti: u32,
    /// Whether to advance `f_lasti` before the next fetch (spec.md §4.2 step 1).
    pub fallthrough: bool,
    pub current_line: Option<u32>,
    pub back: Option<Box<Frame>>,
    /// Keyword-argument names staged by `KW_NAMES`, consumed by the `CALL`
    /// that immediately follows it in the 3.11+ calling convention. The
    /// values themselves stay on the value stack until `CALL` pops them.
    pub call_shape_kwnames: Vec<StringId>,
    /// Offset -> original opcode byte, for breakpoints patched over the
    /// code's `co_code` (spec.md §4.7). The code object itself is never
    /// mutated; patching happens on a private copy held by the frame.
    pub patched_code: Option<Vec<u8>>,
    pub brkpt_shadow: AHashMap<u32, u8>,
    pub trace_flags: TraceFlags,
    /// Currently-handled exception, pushed by `PUSH_EXC_INFO`/`SETUP_EXCEPT`
    /// handlers so a bare `raise` can re-raise it (spec.md §4.5).
    pub exc_info: Option<Value>,
    pub depth: usize,
}

impl Frame {
    #[must_use]
    pub fn new(code: Rc<CodeObject>, f_globals: ObjectId, f_builtins: ObjectId, f_locals: ObjectId, depth: usize) -> Self {
        let line = code.line_for_offset(0);
        Self {
            code,
            f_globals,
            f_builtins,
            f_locals,
            cells: AHashMap::new(),
            stack: Vec::new(),
            blocks: Vec::new(),
            f_lasti: 0,
            fallthrough: false,
            current_line: line,
            back: None,
            call_shape_kwnames: Vec::new(),
            patched_code: None,
            brkpt_shadow: AHashMap::new(),
            trace_flags: TraceFlags::NONE,
            exc_info: None,
            depth,
        }
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// # Panics
    /// Panics on stack underflow, which is always an [`crate::exceptions::EngineError::InvariantViolation`]
    /// surfaced by the interpreter loop rather than a silent wrong answer
    /// (spec.md §8 property 1 "Stack balance").
    pub fn pop(&mut self) -> Value {
        self.stack.pop().expect("Frame::pop: value stack underflow")
    }

    pub fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let at = self.stack.len() - n;
        self.stack.split_off(at)
    }

    #[must_use]
    pub fn peek(&self) -> Value {
        *self.stack.last().expect("Frame::peek: empty value stack")
    }

    #[must_use]
    pub fn peek_at(&self, depth_from_top: usize) -> Value {
        self.stack[self.stack.len() - 1 - depth_from_top]
    }

    #[must_use]
    pub fn depth_here(&self) -> usize {
        self.stack.len()
    }

    pub fn truncate_to(&mut self, depth: usize) {
        self.stack.truncate(depth);
    }

    pub fn push_block(&mut self, kind: BlockKind, handler: u32) {
        self.blocks.push(Block { kind, handler, stack_depth: self.stack.len() });
    }

    pub fn pop_block(&mut self) -> Option<Block> {
        self.blocks.pop()
    }

    #[must_use]
    pub fn top_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Byte at the current instruction pointer, honoring any active
    /// breakpoint patch (spec.md §4.7).
    #[must_use]
    pub fn code_byte(&self, offset: u32) -> u8 {
        match &self.patched_code {
            Some(bytes) => bytes[offset as usize],
            None => self.code.co_code[offset as usize],
        }
    }

    /// Installs a `BRKPT` opcode at `offset`, stashing the original byte so
    /// it can be restored (spec.md §4.7 "Breakpoints and tracing").
    pub fn set_breakpoint(&mut self, offset: u32, brkpt_opcode: u8) {
        let bytes = self.patched_code.get_or_insert_with(|| self.code.co_code.clone());
        let original = bytes[offset as usize];
        bytes[offset as usize] = brkpt_opcode;
        self.brkpt_shadow.insert(offset, original);
    }

    pub fn clear_breakpoint(&mut self, offset: u32) {
        if let Some(original) = self.brkpt_shadow.remove(&offset) {
            if let Some(bytes) = &mut self.patched_code {
                bytes[offset as usize] = original;
            }
        }
    }

    /// Looks up (and removes, since a restored instruction executes once and
    /// then behaves normally) the original byte under `offset`.
    pub fn take_original_byte(&mut self, offset: u32) -> Option<u8> {
        self.brkpt_shadow.get(&offset).copied()
    }

    pub fn update_line(&mut self) {
        self.current_line = self.code.line_for_offset(self.f_lasti);
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("qualname", &self.code.co_qualname)
            .field("lasti", &self.f_lasti)
            .field("stack_depth", &self.stack.len())
            .field("blocks", &self.blocks.len())
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::CodeFlags;
    use crate::intern::StringId;
    use crate::version::PyVersion;

    fn empty_code() -> Rc<CodeObject> {
        Rc::new(CodeObject {
            version: PyVersion::V3_10,
            co_code: vec![0; 16],
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
            line_table: vec![],
            exception_table: vec![],
            has_dot_zero: false,
        })
    }

    #[test]
    fn block_pop_restores_recorded_depth() {
        let mut frame = Frame::new(empty_code(), 0, 0, 0, 0);
        frame.push(Value::Int(1));
        frame.push(Value::Int(2));
        frame.push_block(BlockKind::Loop { start: 0 }, 10);
        frame.push(Value::Int(3));
        assert_eq!(frame.depth_here(), 3);
        let block = frame.pop_block().unwrap();
        frame.truncate_to(block.stack_depth);
        assert_eq!(frame.depth_here(), 2);
    }

    #[test]
    fn breakpoint_round_trip_restores_byte() {
        let mut frame = Frame::new(empty_code(), 0, 0, 0, 0);
        let original = frame.code_byte(4);
        frame.set_breakpoint(4, 8);
        assert_eq!(frame.code_byte(4), 8);
        frame.clear_breakpoint(4);
        assert_eq!(frame.code_byte(4), original);
    }
}
