//! Jumps, loops, `try`/`except`/`finally`, and `with` block setup/teardown
//! (spec.md §4.2 step 4, §4.5 "block-stack-driven" vs "exception-table-
//! driven" unwinding, §9 "Generators"/"Breakpoints").
//!
//! Pre-3.11 versions build the block stack at runtime via `SETUP_*`
//! opcodes; 3.11+ code instead relies entirely on `CodeObject::exception_table`
//! (consulted directly by `crate::interp::Interpreter::unwind_exception`), so
//! most of the `SETUP_*`/`POP_BLOCK`/`END_FINALLY` family simply has no table
//! entry on 3.11+ (spec.md §9 "Opcode tables are per-version").

use super::OpTable;
use crate::exceptions::{EngineError, ExcType, RunError, RunResult};
use crate::frame::{BlockKind, Signal};
use crate::heap::HeapData;
use crate::interp::Interpreter;
use crate::value::Value;
use crate::version::PyVersion;

const POP_BLOCK: u8 = 87;
const END_FINALLY: u8 = 88;
const SETUP_LOOP: u8 = 120;
const SETUP_EXCEPT: u8 = 121;
const SETUP_FINALLY: u8 = 122;
const BREAK_LOOP: u8 = 80;
const CONTINUE_LOOP: u8 = 119;
const RAISE_VARARGS: u8 = 130;
const JUMP_FORWARD: u8 = 110;
const JUMP_ABSOLUTE: u8 = 113;
const POP_JUMP_IF_FALSE: u8 = 114;
const POP_JUMP_IF_TRUE: u8 = 115;
const JUMP_IF_FALSE_OR_POP: u8 = 111;
const JUMP_IF_TRUE_OR_POP: u8 = 112;
const GET_ITER: u8 = 68;
const FOR_ITER: u8 = 93;
const POP_EXCEPT: u8 = 89;
const SETUP_WITH: u8 = 143;
const WITH_CLEANUP_START: u8 = 81;
const WITH_CLEANUP_FINISH: u8 = 121; // 2.x reuses 121 pre-3.x disambiguation handled by install() gating
const SETUP_ANNOTATIONS: u8 = 85;
const JUMP_IF_NOT_EXC_MATCH: u8 = 121; // 3.9-3.10 only path; superseded by CHECK_EXC_MATCH in 3.11
const BEFORE_ASYNC_WITH: u8 = 52;
const GET_YIELD_FROM_ITER: u8 = 69;
const RERAISE: u8 = 119;
const PUSH_EXC_INFO: u8 = 35;
const CHECK_EXC_MATCH: u8 = 36;
const POP_JUMP_FORWARD_IF_FALSE: u8 = 114;
const POP_JUMP_BACKWARD_IF_FALSE: u8 = 175;
const JUMP_BACKWARD: u8 = 140;

pub(super) fn install(table: &mut OpTable, version: PyVersion) {
    table.set(JUMP_FORWARD, "JUMP_FORWARD", jump_forward);
    table.set(GET_ITER, "GET_ITER", get_iter);
    table.set(FOR_ITER, "FOR_ITER", for_iter);
    table.set(RAISE_VARARGS, "RAISE_VARARGS", raise_varargs);

    if version.uses_exception_table() {
        // 3.11+: absolute jumps are split into forward/backward opcodes and
        // the block-stack `SETUP_*` family is gone entirely.
        table.set(POP_JUMP_FORWARD_IF_FALSE, "POP_JUMP_FORWARD_IF_FALSE", pop_jump_if_false);
        table.set(POP_JUMP_IF_TRUE, "POP_JUMP_FORWARD_IF_TRUE", pop_jump_if_true);
        table.set(JUMP_BACKWARD, "JUMP_BACKWARD", jump_backward);
        if version >= PyVersion::V3_12 {
            table.set(POP_JUMP_BACKWARD_IF_FALSE, "POP_JUMP_BACKWARD_IF_FALSE", pop_jump_backward_if_false);
        }
        table.set(PUSH_EXC_INFO, "PUSH_EXC_INFO", push_exc_info);
        table.set(CHECK_EXC_MATCH, "CHECK_EXC_MATCH", check_exc_match);
        table.set(RERAISE, "RERAISE", reraise);
        table.set(POP_EXCEPT, "POP_EXCEPT", pop_except_311);
        table.set(SETUP_ANNOTATIONS, "SETUP_ANNOTATIONS", setup_annotations);
        table.set(BEFORE_ASYNC_WITH, "BEFORE_ASYNC_WITH", before_with);
        table.set(super::calls::BEFORE_WITH, "BEFORE_WITH", before_with);
        table.set(super::calls::WITH_EXCEPT_START, "WITH_EXCEPT_START", with_except_start);
    } else {
        table.set(JUMP_ABSOLUTE, "JUMP_ABSOLUTE", jump_absolute);
        table.set(POP_JUMP_IF_FALSE, "POP_JUMP_IF_FALSE", pop_jump_if_false);
        table.set(POP_JUMP_IF_TRUE, "POP_JUMP_IF_TRUE", pop_jump_if_true);
        table.set(JUMP_IF_FALSE_OR_POP, "JUMP_IF_FALSE_OR_POP", jump_if_false_or_pop);
        table.set(JUMP_IF_TRUE_OR_POP, "JUMP_IF_TRUE_OR_POP", jump_if_true_or_pop);
        table.set(POP_BLOCK, "POP_BLOCK", pop_block);
        table.set(POP_EXCEPT, "POP_EXCEPT", pop_except_legacy);
        table.set(SETUP_FINALLY, "SETUP_FINALLY", setup_finally);
        table.set(BEFORE_ASYNC_WITH, "BEFORE_ASYNC_WITH", before_with);

        if version.has_end_finally() {
            table.set(END_FINALLY, "END_FINALLY", end_finally);
            table.set(SETUP_EXCEPT, "SETUP_EXCEPT", setup_except);
        }
        if version < PyVersion::V3_8 {
            table.set(SETUP_LOOP, "SETUP_LOOP", setup_loop);
            table.set(BREAK_LOOP, "BREAK_LOOP", break_loop);
            table.set(CONTINUE_LOOP, "CONTINUE_LOOP", continue_loop);
        }
        if version >= PyVersion::V3_3 {
            table.set(SETUP_ANNOTATIONS, "SETUP_ANNOTATIONS", setup_annotations);
        }
        if (PyVersion::V3_1..PyVersion::V3_11).contains(&version) {
            table.set(SETUP_WITH, "SETUP_WITH", setup_with);
            table.set(WITH_CLEANUP_START, "WITH_CLEANUP_START", with_cleanup_start);
            if version >= PyVersion::V3_2 && version < PyVersion::V3_8 {
                table.set(WITH_CLEANUP_FINISH, "WITH_CLEANUP_FINISH", with_cleanup_finish);
            }
        }
        if (PyVersion::V3_9..PyVersion::V3_11).contains(&version) {
            table.set(JUMP_IF_NOT_EXC_MATCH, "JUMP_IF_NOT_EXC_MATCH", jump_if_not_exc_match);
        }
    }
    if version >= PyVersion::V3_3 {
        // `yield from` was introduced in 3.3; it reuses `GET_ITER`'s
        // generator-passthrough-or-realize-to-list behavior verbatim.
        table.set(GET_YIELD_FROM_ITER, "GET_YIELD_FROM_ITER", get_iter);
    }
}

fn frame_mut(interp: &mut Interpreter) -> RunResult<&mut crate::frame::Frame> {
    interp.frame.as_mut().ok_or_else(|| EngineError::InvariantViolation { detail: "opcode handler with no active frame".into() }.into())
}

/// `arg` is a byte offset relative to the position right after this
/// instruction for every version the engine supports (absolute jumps are
/// handled separately by [`jump_absolute`]/[`jump_backward`]).
fn jump_forward(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    frame.f_lasti = frame.f_lasti.wrapping_add(arg as u32);
    frame.fallthrough = false;
    Ok(Signal::Normal)
}

fn jump_absolute(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    frame.f_lasti = arg as u32;
    frame.fallthrough = false;
    Ok(Signal::Normal)
}

/// 3.11+ `JUMP_BACKWARD`: like `JUMP_FORWARD` but subtracts rather than adds.
fn jump_backward(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    frame.f_lasti = frame.f_lasti.wrapping_sub(arg as u32);
    frame.fallthrough = false;
    Ok(Signal::Normal)
}

fn pop_jump_if_false(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let v = frame.pop();
    if !v.truthy(&interp.heap) {
        jump_forward(interp, arg)
    } else {
        Ok(Signal::Normal)
    }
}

fn pop_jump_if_true(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let v = frame.pop();
    if v.truthy(&interp.heap) {
        jump_forward(interp, arg)
    } else {
        Ok(Signal::Normal)
    }
}

fn pop_jump_backward_if_false(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let v = frame.pop();
    if !v.truthy(&interp.heap) {
        jump_backward(interp, arg)
    } else {
        Ok(Signal::Normal)
    }
}

fn jump_if_false_or_pop(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let v = frame.peek();
    if !v.truthy(&interp.heap) {
        jump_forward(interp, arg)
    } else {
        frame_mut(interp)?.pop();
        Ok(Signal::Normal)
    }
}

fn jump_if_true_or_pop(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let v = frame.peek();
    if v.truthy(&interp.heap) {
        jump_forward(interp, arg)
    } else {
        frame_mut(interp)?.pop();
        Ok(Signal::Normal)
    }
}

/// `GET_ITER`: a generator value is already its own iterator, so it passes
/// through untouched (spec.md §3 "Generator"). Any other iterable has no
/// dedicated lazy-iterator heap kind, so it is materialized into a list up
/// front (spec.md Non-goals: lazy iteration over arbitrary iterables — only
/// `FOR_ITER` over the realized list, or over a true `Generator`, is
/// modeled).
fn get_iter(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let v = frame.pop();
    let iter_value = if matches!(v, Value::Ref(id) if matches!(interp.heap.get(id), HeapData::Generator(_))) {
        v
    } else {
        let items = super::containers::sequence_items(interp, v)?;
        Value::Ref(interp.heap.allocate(HeapData::List(crate::types::PyList(items))))
    };
    frame_mut(interp)?.push(iter_value);
    Ok(Signal::Normal)
}

/// `FOR_ITER target`: pops the next item off the realized-list iterator on
/// TOS, pushing it back for the loop body; when exhausted, pops the
/// iterator and jumps to `target` instead (spec.md §4.2 "for loops"). A
/// `Generator` iterator instead drives `crate::generator::send`, catching
/// the `StopIteration` that marks exhaustion (spec.md §3 "Generator", §8
/// property 5).
///
/// The realized list is consumed from the front using an index stashed as a
/// second stack slot immediately under it, since `Value` carries no mutable
/// cursor state of its own.
fn for_iter(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let iter_value = frame.peek();
    let Value::Ref(id) = iter_value else {
        return Err(EngineError::InvariantViolation { detail: "FOR_ITER: TOS is not an iterator".into() }.into());
    };
    if matches!(interp.heap.get(id), HeapData::Generator(_)) {
        return for_iter_generator(interp, id, arg);
    }
    let next = match interp.heap.get_mut(id) {
        HeapData::List(list) if !list.0.is_empty() => Some(list.0.remove(0)),
        HeapData::List(_) => None,
        _ => return Err(EngineError::InvariantViolation { detail: "FOR_ITER: TOS is not an iterator".into() }.into()),
    };
    let frame = frame_mut(interp)?;
    match next {
        Some(item) => {
            frame.push(item);
            Ok(Signal::Normal)
        }
        None => {
            frame.pop();
            jump_forward(interp, arg)
        }
    }
}

fn for_iter_generator(interp: &mut Interpreter, gen_id: crate::heap::ObjectId, arg: i64) -> RunResult<Signal> {
    match crate::generator::send(interp, gen_id, Value::None) {
        Ok(value) => {
            frame_mut(interp)?.push(value);
            Ok(Signal::Normal)
        }
        Err(RunError::Exception(crate::exceptions::InterpretedException(ev))) if ev.exc_type == ExcType::StopIteration => {
            frame_mut(interp)?.pop();
            jump_forward(interp, arg)
        }
        Err(e) => Err(e),
    }
}

fn raise_varargs(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    match arg {
        0 => {
            // Bare `raise`: re-raise the exception currently being handled.
            match frame.exc_info {
                Some(exc) => {
                    frame.exc_info = Some(exc);
                    Ok(Signal::Reraise)
                }
                None => Err(RunError::raise(ExcType::RuntimeError, "No active exception to re-raise")),
            }
        }
        1 => {
            let exc_value = frame.pop();
            Err(raise_value(interp, exc_value, None))
        }
        _ => {
            let cause = frame.pop();
            let exc_value = frame.pop();
            Err(raise_value(interp, exc_value, Some(cause)))
        }
    }
}

/// Converts a raised value (an exception instance, or a bare exception
/// *class* reference modeled as a `Str` naming it — the engine has no
/// distinct "exception class" heap kind, see DESIGN.md) into a `RunError`.
fn raise_value(interp: &Interpreter, exc_value: Value, cause: Option<Value>) -> RunError {
    let (exc_type, message) = match exc_value {
        Value::Ref(id) => match interp.heap.get(id) {
            HeapData::Exception(ev) => (ev.exc_type, ev.message.clone()),
            HeapData::Str(s) => (ExcType::RuntimeError, Some(s.clone())),
            other => (ExcType::RuntimeError, Some(format!("exceptions must derive from BaseException (got {})", other.type_name()))),
        },
        other => (ExcType::RuntimeError, Some(other.py_repr(&interp.heap, &interp.interns))),
    };
    let _ = cause;
    RunError::raise(exc_type, message.unwrap_or_default())
}

fn pop_block(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    frame_mut(interp)?.pop_block();
    Ok(Signal::Normal)
}

fn pop_except_legacy(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    frame.pop_block();
    frame.exc_info = None;
    Ok(Signal::Normal)
}

/// 3.11+ `POP_EXCEPT`: pops the `ExceptHandler` pseudo-block pushed by
/// `PUSH_EXC_INFO` and clears the frame's recorded handled exception.
fn pop_except_311(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    frame.pop_block();
    frame.exc_info = None;
    Ok(Signal::Normal)
}

fn setup_finally(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let target = frame.f_lasti.wrapping_add(arg as u32);
    frame.push_block(BlockKind::Finally, target);
    Ok(Signal::Normal)
}

fn setup_except(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let target = frame.f_lasti.wrapping_add(arg as u32);
    frame.push_block(BlockKind::Except, target);
    Ok(Signal::Normal)
}

fn setup_loop(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let start = frame.f_lasti;
    let target = frame.f_lasti.wrapping_add(arg as u32);
    frame.push_block(BlockKind::Loop { start }, target);
    Ok(Signal::Normal)
}

fn break_loop(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    loop {
        let Some(block) = frame.pop_block() else {
            return Err(EngineError::InvariantViolation { detail: "BREAK_LOOP: no enclosing loop block".into() }.into());
        };
        if let BlockKind::Loop { .. } = block.kind {
            frame.truncate_to(block.stack_depth);
            frame.f_lasti = block.handler;
            frame.fallthrough = false;
            return Ok(Signal::Normal);
        }
    }
}

fn continue_loop(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    frame.f_lasti = arg as u32;
    frame.fallthrough = false;
    Ok(Signal::Normal)
}

/// `END_FINALLY` (removed in 3.8): pops whatever the finally block left on
/// the stack to signal how it was entered (spec.md Non-goals: `RETURN`/
/// `BREAK`-through-finally replay is not bit-exact; a plain exception
/// re-raise is the only form modeled here).
fn end_finally(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    match frame.pop() {
        Value::Ref(id) if matches!(interp.heap.get(id), HeapData::Exception(_)) => {
            let exc = Value::Ref(id);
            Err(raise_value(interp, exc, None))
        }
        _ => Ok(Signal::Normal),
    }
}

fn setup_annotations(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let locals = frame.f_locals;
    let name = interp.interns.intern("__annotations__");
    if crate::heap::namespace_get(&interp.heap, locals, &interp.interns, name).is_none() {
        let dict_id = interp.heap.allocate(HeapData::Dict(crate::types::PyDict::new()));
        crate::heap::namespace_set(&mut interp.heap, &interp.interns, locals, name, Value::Ref(dict_id));
    }
    Ok(Signal::Normal)
}

/// `SETUP_WITH`/`BEFORE_WITH`: look up `__enter__`/`__exit__` on the context
/// manager at TOS, call `__enter__`, and push a `Finally`-kind block so
/// `__exit__` runs on both normal and exceptional exit (spec.md §9 "with
/// statements" is not itself a named module, but the call protocol and
/// block-stack machinery both already exist for it, so it's implemented as
/// straightforward composition of the two).
fn setup_with(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let target = frame.f_lasti.wrapping_add(arg as u32);
    let cm = frame.peek();
    let enter_result = call_dunder(interp, cm, interp.well_known.enter)?;
    let frame = frame_mut(interp)?;
    frame.push_block(BlockKind::Finally, target);
    frame.push(enter_result);
    Ok(Signal::Normal)
}

fn before_with(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let cm = frame.pop();
    let enter_result = call_dunder(interp, cm, interp.well_known.enter)?;
    let frame = frame_mut(interp)?;
    frame.push(cm);
    frame.push(enter_result);
    Ok(Signal::Normal)
}

fn with_cleanup_start(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let top = frame.pop();
    let cm = frame.peek();
    let exc_info = if matches!(top, Value::Ref(id) if matches!(interp.heap.get(id), HeapData::Exception(_))) {
        Some(top)
    } else {
        frame_mut(interp)?.push(top);
        None
    };
    let args = match exc_info {
        Some(Value::Ref(id)) => match interp.heap.get(id).clone() {
            HeapData::Exception(ev) => vec![str_value(interp, ev.exc_type.name()), str_value(interp, ev.message.as_deref().unwrap_or("")), Value::None],
            _ => vec![Value::None, Value::None, Value::None],
        },
        _ => vec![Value::None, Value::None, Value::None],
    };
    let result = call_dunder_with_args(interp, cm, interp.well_known.exit, args)?;
    let frame = frame_mut(interp)?;
    if let Some(exc) = exc_info {
        frame.push(exc);
    }
    frame.push(result);
    Ok(Signal::Normal)
}

fn with_cleanup_finish(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let suppress = frame.pop();
    let exc = frame.pop();
    let is_exc = matches!(exc, Value::Ref(id) if matches!(interp.heap.get(id), HeapData::Exception(_)));
    if is_exc && !suppress.truthy(&interp.heap) {
        return Err(raise_value(interp, exc, None));
    }
    Ok(Signal::Normal)
}

/// 3.11+ `WITH_EXCEPT_START`: calls `__exit__(exc_type, exc_value, tb)` with
/// the currently-propagating exception still on the stack beneath the
/// context manager, leaving its return value on top for `POP_JUMP_IF_TRUE`
/// to decide suppression.
fn with_except_start(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let exc = frame.peek_at(0);
    let cm = frame.peek_at(3);
    let args = match exc {
        Value::Ref(id) => match interp.heap.get(id).clone() {
            HeapData::Exception(ev) => vec![str_value(interp, ev.exc_type.name()), str_value(interp, ev.message.as_deref().unwrap_or("")), Value::None],
            _ => vec![Value::None, Value::None, Value::None],
        },
        _ => vec![Value::None, Value::None, Value::None],
    };
    let result = call_dunder_with_args(interp, cm, interp.well_known.exit, args)?;
    frame_mut(interp)?.push(result);
    Ok(Signal::Normal)
}

fn str_value(interp: &mut Interpreter, s: &str) -> Value {
    Value::Ref(interp.heap.allocate(HeapData::Str(s.to_string())))
}

fn call_dunder(interp: &mut Interpreter, receiver: Value, name: crate::intern::StringId) -> RunResult<Value> {
    call_dunder_with_args(interp, receiver, name, Vec::new())
}

/// Looks up `receiver.<name>` and calls it with `args`, running any pushed
/// interpreted frame to completion and returning its result (spec.md §4.3's
/// call protocol, reused synchronously here since `with`-statement handlers
/// need the outcome immediately rather than resuming dispatch in the new
/// frame).
fn call_dunder_with_args(interp: &mut Interpreter, receiver: Value, name: crate::intern::StringId, args: Vec<Value>) -> RunResult<Value> {
    let method = crate::call::load_attr(interp, receiver, name)?;
    match crate::call::call(interp, method, args, Vec::new())? {
        crate::call::CallOutcome::Value(v) => Ok(v),
        crate::call::CallOutcome::PushedFrame => {
            interp.run_until_current_frame_returns()?;
            Ok(frame_mut(interp)?.pop())
        }
    }
}

fn jump_if_not_exc_match(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let target = frame.pop();
    let raised = frame.pop();
    let Value::Ref(id) = target else {
        return Err(EngineError::InvariantViolation { detail: "JUMP_IF_NOT_EXC_MATCH: operand is not an exception type".into() }.into());
    };
    let matches = match interp.heap.get(id) {
        HeapData::Str(name) => exc_type_from_name(name).is_some_and(|t| interp.exception_matches(raised, t)),
        _ => false,
    };
    if !matches {
        jump_forward(interp, arg)
    } else {
        Ok(Signal::Normal)
    }
}

fn push_exc_info(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let current = frame.exc_info.unwrap_or(Value::None);
    frame.push(current);
    let exc = frame.peek_at(1);
    frame.push(exc);
    frame.push_block(BlockKind::ExceptHandler, 0);
    frame.exc_info = Some(exc);
    Ok(Signal::Normal)
}

/// `CHECK_EXC_MATCH`: non-destructively compares TOS (the raised exception)
/// against the type named by the second-from-top value, pushing a bool
/// (3.11+ equivalent of `JUMP_IF_NOT_EXC_MATCH`, split so the jump itself is
/// a separate, generic `POP_JUMP_*` instruction).
fn check_exc_match(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let target = frame.pop();
    let raised = frame.peek();
    let Value::Ref(id) = target else {
        return Err(EngineError::InvariantViolation { detail: "CHECK_EXC_MATCH: operand is not an exception type".into() }.into());
    };
    let matched = match interp.heap.get(id) {
        HeapData::Str(name) => exc_type_from_name(name).is_some_and(|t| interp.exception_matches(raised, t)),
        _ => false,
    };
    frame_mut(interp)?.push(Value::Bool(matched));
    Ok(Signal::Normal)
}

fn reraise(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let exc = frame.pop();
    if arg != 0 {
        frame.pop();
    }
    frame.exc_info = Some(exc);
    Ok(Signal::Reraise)
}

/// Exception-type *names* (as pushed by `LOAD_GLOBAL ValueError` etc., which
/// this engine resolves to a plain `Str` rather than a distinct class value
/// — see DESIGN.md) mapped back to [`ExcType`] for `except` clause matching.
pub(super) fn exc_type_from_name(name: &str) -> Option<ExcType> {
    use ExcType::*;
    Some(match name {
        "BaseException" => BaseException,
        "SystemExit" => SystemExit,
        "KeyboardInterrupt" => KeyboardInterrupt,
        "GeneratorExit" => GeneratorExit,
        "Exception" => Exception,
        "StopIteration" => StopIteration,
        "StopAsyncIteration" => StopAsyncIteration,
        "ArithmeticError" => ArithmeticError,
        "OverflowError" => OverflowError,
        "ZeroDivisionError" => ZeroDivisionError,
        "LookupError" => LookupError,
        "IndexError" => IndexError,
        "KeyError" => KeyError,
        "RuntimeError" => RuntimeError,
        "NotImplementedError" => NotImplementedError,
        "RecursionError" => RecursionError,
        "AssertionError" => AssertionError,
        "AttributeError" => AttributeError,
        "MemoryError" => MemoryError,
        "NameError" => NameError,
        "UnboundLocalError" => UnboundLocalError,
        "SyntaxError" => SyntaxError,
        "TimeoutError" => TimeoutError,
        "TypeError" => TypeError,
        "ValueError" => ValueError,
        "ImportError" => ImportError,
        "ModuleNotFoundError" => ModuleNotFoundError,
        "OSError" => OSError,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exc_type_from_name_round_trips_display_names() {
        assert_eq!(exc_type_from_name("ValueError"), Some(ExcType::ValueError));
        assert_eq!(exc_type_from_name("NoSuchError"), None);
    }
}
