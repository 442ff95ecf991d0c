//! The engine's top-level state and its fetch/decode/dispatch loop
//! (spec.md §4.2). Everything else in this crate — the call protocol,
//! class construction, the opcode tables — operates on an `&mut Interpreter`
//! rather than threading its pieces as loose arguments, the same shape as
//! the teacher's own `VM`/`Interpreter` driver.

use std::io::Write;

use ahash::AHashSet;

use crate::config::RunConfig;
use crate::exceptions::{EngineError, ExcType, RunError, RunResult};
use crate::frame::{Block, BlockKind, Frame, Signal};
use crate::heap::{Heap, HeapData, ObjectId};
use crate::intern::{Interns, StringId};
use crate::object::ExceptionValue;
use crate::trace::{TraceCallArgs, TraceControl, TraceEvent, TraceFn};
use crate::value::{Value, WellKnownNames};
use crate::version::PyVersion;

/// Everything the engine needs to run one or more top-level programs:
/// the object heap, the name interner, the well-known dunder names, the
/// run configuration, the builtins namespace, and the currently executing
/// frame chain (spec.md §3 "Frame chains").
pub struct Interpreter {
    pub heap: Heap,
    pub interns: Interns,
    pub well_known: WellKnownNames,
    pub config: RunConfig,
    pub builtins_id: ObjectId,
    /// The innermost active frame; `Frame::back` chains outward to the
    /// caller, so the engine needs no separate frame stack (spec.md §3
    /// "Frame chains ... back").
    pub frame: Option<Frame>,
    pub stdout: Box<dyn Write>,
    pub tracer: Option<TraceFn>,
    /// The dispatch table for `config.version`, built once at construction
    /// (spec.md §4.1 "per-version opcode dispatch tables").
    pub op_table: crate::opcodes::OpTable,
    /// Per-(feature, version) warning dedup: the engine emits a
    /// `log::warn!` for a cross-version quirk (e.g. a 3.12-only opcode
    /// seen on a 3.8 code object) only the first time, matching the
    /// original x-python's one-shot compatibility warnings (SPEC_FULL.md
    /// "Supplemented features").
    warned: AHashSet<(&'static str, (u8, u8))>,
    /// Line last reported by a `line` trace event, so [`Interpreter::trace_instruction`]
    /// fires one `line` event per line-table crossing rather than per instruction
    /// (spec.md §8 property 7 "Tracing determinism").
    last_traced_line: Option<u32>,
}

impl Interpreter {
    #[must_use]
    pub fn new(config: RunConfig) -> Self {
        Self::with_stdout(config, Box::new(std::io::stdout()))
    }

    #[must_use]
    pub fn with_stdout(config: RunConfig, stdout: Box<dyn Write>) -> Self {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let well_known = WellKnownNames::intern(&mut interns);
        let builtins_id = crate::builtins::populate(&mut heap, &mut interns, config.version);
        let op_table = crate::opcodes::build_table(config.version);
        Self { heap, interns, well_known, config, builtins_id, frame: None, stdout, tracer: None, op_table, warned: AHashSet::new(), last_traced_line: None }
    }

    /// Depth of the current frame chain, 0 when no frame is active. Used by
    /// the call protocol's recursion-limit check (spec.md §9 "Frame chains").
    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.frame.as_ref().map_or(0, |f| f.depth)
    }

    #[must_use]
    pub fn current_frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn current_frame_mut(&mut self) -> Option<&mut Frame> {
        self.frame.as_mut()
    }

    /// Every frame shares one builtins namespace for the run; full per-module
    /// `__builtins__` overriding is out of scope (spec.md Non-goals: import
    /// system). `globals_id` is accepted so call sites read naturally even
    /// though the lookup is currently version-global rather than per-module.
    #[must_use]
    pub fn builtins_for(&self, _globals_id: ObjectId) -> ObjectId {
        self.builtins_id
    }

    /// Pushes `frame` as the new current frame, chaining the previous one
    /// onto `Frame::back` (spec.md §3 "Frame chains").
    pub fn push_frame(&mut self, mut frame: Frame) {
        let previous = self.frame.take();
        frame.back = previous.map(Box::new);
        self.last_traced_line = None;
        let flags = frame.trace_flags;
        let line = frame.current_line;
        self.frame = Some(frame);
        if flags.contains(crate::trace::TraceFlags::CALL) && self.tracer.is_some() {
            let control = self.fire_trace(TraceCallArgs { event: TraceEvent::Call, offset: 0, opcode_name: "CALL", opcode_byte: 0, line, immediate_arg: None, version: self.config.version });
            let _ = self.apply_trace_control(control);
        }
    }

    /// Pops the current frame, restoring its caller (if any) as current.
    /// Returns the popped frame so its final value stack can be inspected.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        let current = self.frame.take()?;
        self.frame = current.back.as_deref().cloned();
        Some(current)
    }

    /// Resolves a dict/namespace key back to the [`StringId`] the engine
    /// uses internally, for attribute names stored as heap `Str` keys (e.g.
    /// a class body's namespace, spec.md §4.6). Re-interns rather than
    /// requiring the key to already be interned, so it's a no-op for names
    /// the interner has already seen.
    #[must_use]
    pub fn key_to_name(&mut self, key: Value) -> Option<StringId> {
        match key {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(s) => Some(self.interns.intern(&s.clone())),
                _ => None,
            },
            _ => None,
        }
    }

    /// Logs a cross-version compatibility warning exactly once per
    /// `(feature, version)` pair (SPEC_FULL.md "per-(feature,version)
    /// warning dedup").
    pub fn warn_once(&mut self, feature: &'static str) {
        let key = (feature, (self.config.version.major, self.config.version.minor));
        if self.warned.insert(key) {
            log::warn!("{feature} is not fully modeled for Python {}", self.config.version);
        }
    }

    /// Runs frames until the one active when this was called (and every
    /// frame it pushes beneath it) has returned. Used by the call protocol
    /// when it must run a nested call to completion before continuing its
    /// own work (`__init__`, a class body, spec.md §4.3, §4.6) rather than
    /// yielding control back to an outer dispatch loop.
    pub fn run_until_current_frame_returns(&mut self) -> RunResult<()> {
        let target_depth = self.frame_depth();
        if target_depth == 0 {
            return Ok(());
        }
        while self.frame.is_some() && self.frame_depth() >= target_depth {
            self.step()?;
        }
        Ok(())
    }

    /// Runs a freshly pushed top-level module frame to completion, returning
    /// its last pushed value (or `None` for a normal module that ends by
    /// falling off the end rather than executing `RETURN_VALUE`).
    pub fn run(&mut self, frame: Frame) -> RunResult<Value> {
        self.push_frame(frame);
        let mut result = Value::None;
        while self.frame.is_some() {
            if let Some(v) = self.step()? {
                result = v;
            }
        }
        Ok(result)
    }

    /// Executes exactly one bytecode instruction of the current frame,
    /// handling `EXTENDED_ARG` accumulation, tracing, and the dispatch
    /// result (spec.md §4.1, §4.2). Returns `Some(value)` only when this
    /// step popped the outermost frame of the whole run via `RETURN_VALUE`.
    fn step(&mut self) -> RunResult<Option<Value>> {
        let (opcode, arg, start_offset, version) = self.fetch()?;

        if opcode == crate::trace::BRKPT_OPCODE {
            return self.handle_breakpoint(start_offset);
        }

        let signal = self.dispatch_after_fetch(opcode, arg, start_offset, version)?;
        self.handle_signal(signal, start_offset)
    }

    /// Fetches and dispatches exactly one instruction, returning the raw
    /// [`Signal`] rather than applying it to the frame chain. Used by
    /// [`crate::generator`] to drive a suspended frame directly: a generator's
    /// `Yield` must suspend the frame in place rather than unwind it the way
    /// `handle_signal` treats a bare top-level yield (spec.md §3 "Generator").
    pub(crate) fn step_signal(&mut self) -> RunResult<Signal> {
        let (opcode, arg, start_offset, version) = self.fetch()?;
        if opcode == crate::trace::BRKPT_OPCODE {
            return Err(EngineError::InvariantViolation {
                detail: "breakpoints inside a generator body are not supported by the generator driver".into(),
            }
            .into());
        }
        self.dispatch_after_fetch(opcode, arg, start_offset, version)
    }

    fn dispatch_after_fetch(&mut self, opcode: u8, arg: i64, start_offset: u32, version: PyVersion) -> RunResult<Signal> {
        let name = crate::opcodes::opcode_name(self, opcode);
        self.trace_instruction(name, opcode, arg, start_offset, version)?;
        self.dispatch_catching_exception(opcode, arg)
    }

    /// Runs one handler and converts a raised `InterpretedException` into the
    /// `Exception` control signal rather than letting it unwind through Rust's
    /// `?` past the frame that should catch it (spec.md §4.2 step 4, §4.5).
    /// Handlers are free to use `?` on [`crate::exceptions::RunError::raise`]
    /// internally (and on any call into another fallible helper that does the
    /// same) exactly like ordinary Rust error propagation; this is the single
    /// point where that propagation is intercepted and redirected into the
    /// block-stack/exception-table unwinder instead of aborting the run.
    fn dispatch_catching_exception(&mut self, opcode: u8, arg: i64) -> RunResult<Signal> {
        match crate::opcodes::dispatch(self, opcode, arg) {
            Ok(signal) => Ok(signal),
            Err(RunError::Exception(ie)) => {
                self.set_pending_exception(ie.0);
                Ok(Signal::Exception)
            }
            Err(e @ RunError::Engine(_)) => Err(e),
        }
    }

    /// Boxes `exc` onto the heap and records it as the current frame's
    /// pending exception, the same bookkeeping [`Interpreter::raise`] does,
    /// factored out so [`Interpreter::dispatch_catching_exception`] and
    /// [`Interpreter::handle_breakpoint`] can share it.
    fn set_pending_exception(&mut self, exc: ExceptionValue) {
        let id = self.heap.allocate(HeapData::Exception(exc));
        if let Some(frame) = self.frame.as_mut() {
            frame.exc_info = Some(Value::Ref(id));
        }
    }

    /// Reads the opcode (and its combined `EXTENDED_ARG` operand) at the
    /// current frame's `f_lasti`, advancing `f_lasti` past it (spec.md §4.2
    /// step 1 "advance lasti if fallthrough").
    fn fetch(&mut self) -> RunResult<(u8, i64, u32, PyVersion)> {
        let version = self.config.version;
        let wordcode = version.uses_wordcode();
        let frame = self.frame.as_mut().expect("Interpreter::fetch: no active frame");

        if frame.fallthrough {
            frame.f_lasti += if wordcode { 2 } else { instruction_width(frame.code_byte(frame.f_lasti)) };
        }
        frame.fallthrough = true;
        frame.update_line();

        let mut extended: i64 = 0;
        loop {
            let offset = frame.f_lasti;
            if offset as usize >= frame.code.co_code.len() {
                return Err(EngineError::MalformedBytecode { detail: format!("lasti {offset} past end of code") }.into());
            }
            let opcode = frame.code_byte(offset);
            if opcode == EXTENDED_ARG {
                let byte_arg = if wordcode { frame.code_byte(offset + 1) as i64 } else { read_u16(frame, offset + 1) as i64 };
                extended = (extended | byte_arg) << 8;
                frame.f_lasti += if wordcode { 2 } else { 3 };
                continue;
            }
            let raw_arg = if wordcode { frame.code_byte(offset + 1) as i64 } else { read_u16(frame, offset + 1) as i64 };
            let start = offset;
            return Ok((opcode, extended | raw_arg, start, version));
        }
    }

    fn trace_instruction(&mut self, opcode_name: &'static str, opcode_byte: u8, arg: i64, offset: u32, version: PyVersion) -> RunResult<()> {
        let flags = self.frame.as_ref().map_or(crate::trace::TraceFlags::NONE, |f| f.trace_flags);
        if flags.is_none() || self.tracer.is_none() {
            return Ok(());
        }
        let line = self.frame.as_ref().and_then(|f| f.current_line);
        if flags.contains(crate::trace::TraceFlags::LINE) && line != self.last_traced_line {
            self.last_traced_line = line;
            let control = self.fire_trace(TraceCallArgs { event: TraceEvent::Line, offset, opcode_name, opcode_byte, line, immediate_arg: None, version });
            self.apply_trace_control(control)?;
        }
        if flags.contains(crate::trace::TraceFlags::INSTRUCTION) {
            let control = self.fire_trace(TraceCallArgs { event: TraceEvent::Instruction, offset, opcode_name, opcode_byte, line, immediate_arg: Some(arg), version });
            self.apply_trace_control(control)?;
        }
        Ok(())
    }

    fn fire_trace(&mut self, args: TraceCallArgs<'_>) -> TraceControl {
        match self.tracer.as_mut() {
            Some(tracer) => tracer(args),
            None => TraceControl::Continue,
        }
    }

    fn apply_trace_control(&mut self, control: TraceControl) -> RunResult<()> {
        match control {
            TraceControl::Continue | TraceControl::Skip => Ok(()),
            TraceControl::Disable => {
                if let Some(frame) = self.frame.as_mut() {
                    frame.trace_flags = crate::trace::TraceFlags::NONE;
                }
                Ok(())
            }
            TraceControl::Finish => {
                if let Some(frame) = self.frame.as_mut() {
                    frame.trace_flags = frame.trace_flags.remove(crate::trace::TraceFlags::RETURN).remove(crate::trace::TraceFlags::YIELD);
                }
                Ok(())
            }
            TraceControl::Return(value) => {
                self.handle_signal(Signal::Return(value), 0)?;
                Ok(())
            }
        }
    }

    /// Executes the instruction currently parked under a breakpoint patch
    /// (spec.md §4.7): restores the original byte, re-dispatches it once,
    /// and re-installs the patch so the breakpoint remains armed for the
    /// next time control reaches this offset.
    fn handle_breakpoint(&mut self, offset: u32) -> RunResult<Option<Value>> {
        let version = self.config.version;
        let Some(frame) = self.frame.as_mut() else {
            return Err(EngineError::InvariantViolation { detail: "breakpoint hit with no active frame".into() }.into());
        };
        let Some(original) = frame.take_original_byte(offset) else {
            return Err(EngineError::InvariantViolation { detail: format!("no original byte recorded for breakpoint at {offset}") }.into());
        };

        let name = crate::opcodes::opcode_name(self, original);
        if let Some(tracer) = self.tracer.as_mut() {
            let control = tracer(TraceCallArgs { event: TraceEvent::Instruction, offset, opcode_name: name, opcode_byte: original, line: self.frame.as_ref().and_then(|f| f.current_line), immediate_arg: None, version });
            if matches!(control, TraceControl::Skip) {
                return Ok(None);
            }
        }

        let arg = {
            let frame = self.frame.as_mut().expect("breakpoint frame disappeared");
            if version.uses_wordcode() {
                frame.code.co_code.get(offset as usize + 1).copied().unwrap_or(0) as i64
            } else {
                read_u16(frame, offset + 1) as i64
            }
        };
        let signal = self.dispatch_catching_exception(original, arg)?;
        self.handle_signal(signal, offset)
    }

    /// Applies the outcome of one opcode handler to the frame chain
    /// (spec.md §4.2 step 4): a plain value falls through to the next
    /// instruction, `Return`/`Exception`/`Reraise` may pop the current
    /// frame, `Yield` suspends it in place.
    pub(crate) fn handle_signal(&mut self, signal: Signal, offset: u32) -> RunResult<Option<Value>> {
        match signal {
            Signal::Normal => Ok(None),
            Signal::Return(value) => {
                self.fire_frame_event(crate::trace::TraceFlags::RETURN, TraceEvent::Return, offset);
                self.unwind_return(value)
            }
            Signal::Yield(value) => {
                if let Some(frame) = self.frame.as_mut() {
                    frame.fallthrough = false; // resumed at the same offset past the YIELD_VALUE
                }
                self.fire_frame_event(crate::trace::TraceFlags::YIELD, TraceEvent::Yield, offset);
                // A bare top-level `run` treats a yield like a return of the
                // yielded value; true generator resumption is driven through
                // `crate::generator`, which calls `step_signal` directly rather
                // than `run`/`run_until_current_frame_returns`.
                self.unwind_return(value)
            }
            Signal::Exception => {
                self.fire_frame_event(crate::trace::TraceFlags::EXCEPTION, TraceEvent::Exception, offset);
                self.unwind_exception(None)
            }
            Signal::Reraise => {
                self.fire_frame_event(crate::trace::TraceFlags::EXCEPTION, TraceEvent::Exception, offset);
                self.unwind_exception(self.frame.as_ref().and_then(|f| f.exc_info))
            }
        }
    }

    fn fire_frame_event(&mut self, gate: crate::trace::TraceFlags, event: TraceEvent, offset: u32) {
        let Some(frame) = self.frame.as_ref() else { return };
        if !frame.trace_flags.contains(gate) || self.tracer.is_none() {
            return;
        }
        let line = frame.current_line;
        let version = self.config.version;
        let control = self.fire_trace(TraceCallArgs { event, offset, opcode_name: "", opcode_byte: 0, line, immediate_arg: None, version });
        let _ = self.apply_trace_control(control);
    }

    fn unwind_return(&mut self, value: Value) -> RunResult<Option<Value>> {
        let popped = self.pop_frame();
        match &self.frame {
            Some(_) => {
                self.push_value_to_current(value);
                Ok(None)
            }
            None => {
                let _ = popped;
                Ok(Some(value))
            }
        }
    }

    fn push_value_to_current(&mut self, value: Value) {
        if let Some(frame) = self.frame.as_mut() {
            frame.push(value);
        }
    }

    /// Block-stack-driven unwinding for pre-3.11 code, and exception-table
    /// driven unwinding for 3.11+ (spec.md §4.5). `carried` is `Some` only
    /// for `RERAISE`, which re-propagates the frame's currently-handled
    /// exception rather than reading a freshly raised one off a side channel.
    fn unwind_exception(&mut self, carried: Option<Value>) -> RunResult<Option<Value>> {
        let exc = match carried {
            Some(v) => v,
            None => self.take_pending_exception()?,
        };

        loop {
            let Some(frame) = self.frame.as_mut() else {
                return Err(self.uncaught(exc));
            };

            if frame.code.version.uses_exception_table() {
                if let Some(entry) = frame.code.exception_handler_for(frame.f_lasti).cloned() {
                    frame.truncate_to(entry.stack_depth as usize);
                    if entry.push_lasti {
                        frame.push(Value::Int(frame.f_lasti as i64));
                    }
                    frame.push(exc);
                    frame.exc_info = Some(exc);
                    frame.f_lasti = entry.handler;
                    frame.fallthrough = false;
                    return Ok(None);
                }
            } else if let Some(block) = frame.pop_block() {
                match block.kind {
                    BlockKind::Loop { .. } => continue,
                    BlockKind::Except | BlockKind::Finally | BlockKind::With | BlockKind::ExceptHandler => {
                        frame.truncate_to(block.stack_depth);
                        frame.push(exc);
                        frame.exc_info = Some(exc);
                        frame.f_lasti = block.handler;
                        frame.fallthrough = false;
                        return Ok(None);
                    }
                }
            }

            // No handler in this frame: pop it and propagate to the caller,
            // matching spec.md §4.5 "pop the frame... propagate to caller".
            self.pop_frame();
        }
    }

    fn take_pending_exception(&mut self) -> RunResult<Value> {
        self.frame
            .as_ref()
            .and_then(|f| f.exc_info)
            .ok_or_else(|| EngineError::InvariantViolation { detail: "Exception signal with no pending exception recorded".into() }.into())
    }

    fn uncaught(&mut self, exc: Value) -> RunError {
        let exc_value = self.exception_value_of(exc);
        EngineError::Uncaught(Box::new(exc_value)).into()
    }

    /// Reconstructs an owned [`ExceptionValue`] from a heap-boxed exception
    /// `Value` for reporting once it has drained every frame's block stack.
    fn exception_value_of(&self, exc: Value) -> ExceptionValue {
        if let Value::Ref(id) = exc {
            if let HeapData::Exception(ev) = self.heap.get(id) {
                return ev.clone();
            }
        }
        ExceptionValue { exc_type: ExcType::RuntimeError, message: Some(exc.py_repr(&self.heap, &self.interns)), traceback: None, cause: None, context: None }
    }

    /// Raises an interpreted exception from within an opcode handler: builds
    /// the `ExceptionValue`, records it as the current frame's pending
    /// exception, and returns the `Exception` signal (spec.md §4.5).
    pub fn raise(&mut self, exc_type: ExcType, message: impl Into<String>) -> RunResult<Signal> {
        let ev = ExceptionValue { exc_type, message: Some(message.into()), traceback: None, cause: None, context: None };
        let id = self.heap.allocate(HeapData::Exception(ev));
        if let Some(frame) = self.frame.as_mut() {
            frame.exc_info = Some(Value::Ref(id));
        }
        Ok(Signal::Exception)
    }

    /// Whether `raised` (an `except`-clause target's exact `ExcType`)
    /// matches `pending`'s recorded exception type (spec.md §8 property
    /// "Exception routing").
    #[must_use]
    pub fn exception_matches(&self, pending: Value, target: ExcType) -> bool {
        if let Value::Ref(id) = pending {
            if let HeapData::Exception(ev) = self.heap.get(id) {
                return ev.exc_type.is_subclass_of(target);
            }
        }
        false
    }

    pub fn push_loop_block(&mut self, start: u32, handler: u32) {
        if let Some(frame) = self.frame.as_mut() {
            frame.push_block(BlockKind::Loop { start }, handler);
        }
    }

    pub fn push_except_block(&mut self, handler: u32) {
        if let Some(frame) = self.frame.as_mut() {
            frame.push_block(BlockKind::Except, handler);
        }
    }

    pub fn push_finally_block(&mut self, handler: u32) {
        if let Some(frame) = self.frame.as_mut() {
            frame.push_block(BlockKind::Finally, handler);
        }
    }

    #[must_use]
    pub fn top_block(&self) -> Option<Block> {
        self.frame.as_ref().and_then(|f| f.top_block()).copied()
    }
}

const EXTENDED_ARG: u8 = 0x90;

/// Pre-3.6 instructions are 1 byte with no operand, or 3 bytes
/// (opcode + 2-byte little-endian operand), signaled by the opcode
/// value itself (CPython's `HAVE_ARGUMENT = 90`).
fn instruction_width(opcode: u8) -> u32 {
    if opcode >= HAVE_ARGUMENT {
        3
    } else {
        1
    }
}

const HAVE_ARGUMENT: u8 = 90;

fn read_u16(frame: &Frame, offset: u32) -> u16 {
    let lo = frame.code_byte(offset) as u16;
    let hi = frame.code_byte(offset + 1) as u16;
    lo | (hi << 8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{CodeFlags, CodeObject};
    use std::rc::Rc;

    fn config() -> RunConfig {
        RunConfig::new(PyVersion::V3_10)
    }

    fn code_returning_const(interp: &mut Interpreter, value: Value) -> Rc<CodeObject> {
        // LOAD_CONST 0; RETURN_VALUE — using the 3.10 wordcode encoding.
        let name = interp.interns.intern("<module>");
        Rc::new(CodeObject {
            version: PyVersion::V3_10,
            co_code: vec![100, 0, 83, 0], // LOAD_CONST 0; RETURN_VALUE
            co_consts: vec![value],
            co_names: vec![],
            co_varnames: vec![],
            co_freevars: vec![],
            co_cellvars: vec![],
            co_argcount: 0,
            co_posonlyargcount: 0,
            co_kwonlyargcount: 0,
            co_flags: CodeFlags::default(),
            co_name: name,
            co_qualname: name,
            co_filename: name,
            co_firstlineno: 1,
            line_table: vec![],
            exception_table: vec![],
            has_dot_zero: false,
        })
    }

    #[test]
    fn running_a_module_frame_returns_its_last_value() {
        let mut interp = Interpreter::with_stdout(config(), Box::new(Vec::new()));
        let globals = interp.heap.allocate(HeapData::Namespace(crate::types::PyDict::new()));
        let code = code_returning_const(&mut interp, Value::Int(42));
        let builtins = interp.builtins_for(globals);
        let frame = Frame::new(code, globals, builtins, globals, 1);
        let result = interp.run(frame).expect("run succeeds");
        assert_eq!(result, Value::Int(42));
        assert!(interp.frame.is_none());
    }
}
