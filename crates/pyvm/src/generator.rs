//! Generator protocol (spec.md §3 "Generator", §9 "Generators", §8 property 5
//! "Generator protocol").
//!
//! A generator owns a suspended [`Frame`] plus a [`GeneratorState`]. Resuming
//! it re-enters the interpreter loop at exactly the instruction after the
//! `YIELD_VALUE`/`YIELD_FROM` that suspended it, rather than restarting the
//! frame — `Interpreter::step_signal` (see `crate::interp`) exists precisely
//! so this module can drive a frame one opcode at a time without the
//! top-level `run`/`run_until_current_frame_returns` helpers, which treat a
//! bare `Yield` as if it were a `Return`.

use crate::exceptions::{EngineError, ExcType, InterpretedException, RunError, RunResult};
use crate::frame::{Frame, Signal};
use crate::heap::{HeapData, ObjectId};
use crate::interp::Interpreter;
use crate::object::{ExceptionValue, Generator, GeneratorState};
use crate::value::Value;

/// Mirrors `opcodes::calls::YIELD_VALUE`: the opcode whose dispatch produces
/// the `Signal::Yield` this module resumes past. `YIELD_FROM` also yields,
/// but rewinds `f_lasti` back onto itself before doing so (see
/// `opcodes::calls::yield_from`), so resuming it must *not* additionally
/// advance past it — only a suspension parked exactly on `YIELD_VALUE` does.
const YIELD_VALUE: u8 = 86;
const HAVE_ARGUMENT: u8 = 90;

/// Sends `sent_value` into the generator at `gen_id`, resuming it until the
/// next `yield`, a `return`, or an uncaught exception (spec.md §8 property 5).
///
/// Returns the next yielded value on success. A `return` (with or without a
/// value) or a generator run to completion surfaces as a `StopIteration`
/// [`InterpretedException`], matching CPython's `next()`/`send()` contract;
/// callers that want the generator's own loop construct (`FOR_ITER`,
/// `YIELD_FROM`) already special-case that variant (see
/// `opcodes::control::for_iter_generator`, `opcodes::calls::yield_from`).
pub fn send(interp: &mut Interpreter, gen_id: ObjectId, sent_value: Value) -> RunResult<Value> {
    let state = read_state(interp, gen_id)?;
    match state {
        GeneratorState::Finished => return Err(RunError::raise(ExcType::StopIteration, "generator already finished")),
        GeneratorState::Running => {
            return Err(EngineError::InvariantViolation { detail: "generator is already running (no re-entrant send)".into() }.into());
        }
        GeneratorState::Created | GeneratorState::Suspended => {}
    }

    let mut frame = take_frame(interp, gen_id)?;
    if state == GeneratorState::Suspended {
        resume_past_suspension(&mut frame, sent_value);
    }
    mark_running(interp, gen_id);

    // Detach the caller's frame chain entirely while the generator's own
    // frame drives: the generator's block stack/exception table must be
    // unwound on its own terms (spec.md §4.5), and an exception that escapes
    // it unhandled should surface to *this* call's caller, not silently walk
    // into the frame that happens to be active when `send` was invoked.
    let caller = interp.frame.take();
    frame.back = None;
    interp.frame = Some(frame);

    let outcome = drive(interp, gen_id);

    interp.frame = caller;
    outcome
}

fn drive(interp: &mut Interpreter, gen_id: ObjectId) -> RunResult<Value> {
    loop {
        let signal = interp.step_signal()?;
        match signal {
            Signal::Normal => continue,
            Signal::Yield(value) => {
                let frame = interp.frame.take().expect("generator frame disappeared across yield");
                store_frame(interp, gen_id, Some(frame), GeneratorState::Suspended);
                return Ok(value);
            }
            other => match interp.handle_signal(other, 0) {
                Ok(Some(value)) => {
                    store_frame(interp, gen_id, None, GeneratorState::Finished);
                    return Err(stop_iteration(value, interp));
                }
                Ok(None) => continue,
                Err(RunError::Engine(EngineError::Uncaught(exc))) => {
                    store_frame(interp, gen_id, None, GeneratorState::Finished);
                    return Err(RunError::Exception(InterpretedException(*exc)));
                }
                Err(e) => {
                    store_frame(interp, gen_id, None, GeneratorState::Finished);
                    return Err(e);
                }
            },
        }
    }
}

/// Advances `frame.f_lasti` past a plain `YIELD_VALUE` and pushes the sent
/// value as that expression's result; for a suspension parked on
/// `YIELD_FROM` (rewound onto itself, see module docs), it leaves `f_lasti`
/// untouched and still pushes `sent_value` — `YIELD_FROM` immediately pops
/// and discards that slot as its "value primed by the compiler" regardless
/// of what it holds (spec.md §9 "yield from... always evaluates to None",
/// DESIGN.md Open Question on threading `.send()` values into a delegated
/// subiterator).
fn resume_past_suspension(frame: &mut Frame, sent_value: Value) {
    let opcode = frame.code_byte(frame.f_lasti);
    if opcode == YIELD_VALUE {
        let wordcode = frame.code.version.uses_wordcode();
        let width = if wordcode { 2 } else if opcode >= HAVE_ARGUMENT { 3 } else { 1 };
        frame.f_lasti += width;
    }
    frame.fallthrough = false;
    frame.push(sent_value);
}

fn stop_iteration(value: Value, interp: &Interpreter) -> RunError {
    let message = if matches!(value, Value::None) { None } else { Some(value.py_repr(&interp.heap, &interp.interns)) };
    RunError::Exception(InterpretedException(ExceptionValue {
        exc_type: ExcType::StopIteration,
        message,
        traceback: None,
        cause: None,
        context: None,
    }))
}

fn read_state(interp: &Interpreter, gen_id: ObjectId) -> RunResult<GeneratorState> {
    match interp.heap.get(gen_id) {
        HeapData::Generator(gen) => Ok(gen.state),
        _ => Err(EngineError::InvariantViolation { detail: "send() target is not a generator".into() }.into()),
    }
}

fn take_frame(interp: &mut Interpreter, gen_id: ObjectId) -> RunResult<Frame> {
    match interp.heap.get_mut(gen_id) {
        HeapData::Generator(gen) => gen.frame.take().ok_or_else(|| EngineError::InvariantViolation { detail: "generator has no suspended frame to resume".into() }.into()),
        _ => Err(EngineError::InvariantViolation { detail: "send() target is not a generator".into() }.into()),
    }
}

fn mark_running(interp: &mut Interpreter, gen_id: ObjectId) {
    if let HeapData::Generator(gen) = interp.heap.get_mut(gen_id) {
        gen.state = GeneratorState::Running;
    }
}

fn store_frame(interp: &mut Interpreter, gen_id: ObjectId, frame: Option<Frame>, state: GeneratorState) {
    if let HeapData::Generator(gen) = interp.heap.get_mut(gen_id) {
        **gen = Generator { frame, state };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{CodeFlags, CodeObject};
    use crate::config::RunConfig;
    use crate::types::PyDict;
    use crate::version::PyVersion;
    use std::rc::Rc;

    fn gen_code(interp: &mut Interpreter) -> Rc<CodeObject> {
        // LOAD_CONST 0 (1); YIELD_VALUE; LOAD_CONST 1 (2); YIELD_VALUE;
        // LOAD_CONST 2 (None); RETURN_VALUE -- 3.10 wordcode encoding.
        let name = interp.interns.intern("gen");
        Rc::new(CodeObject {
            version: PyVersion::V3_10,
            co_code: vec![100, 0, 86, 0, 100, 1, 86, 0, 100, 2, 83, 0],
            co_consts: vec![Value::Int(1), Value::Int(2), Value::None],
            co_names: vec![],
            co_varnames: vec![],
            co_freevars: vec![],
            co_cellvars: vec![],
            co_argcount: 0,
            co_posonlyargcount: 0,
            co_kwonlyargcount: 0,
            co_flags: CodeFlags::GENERATOR,
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
    fn send_none_drives_successive_yields_then_stop_iteration() {
        let mut interp = Interpreter::with_stdout(RunConfig::new(PyVersion::V3_10), Box::new(Vec::new()));
        let globals = interp.heap.allocate(HeapData::Namespace(PyDict::new()));
        let code = gen_code(&mut interp);
        let builtins = interp.builtins_for(globals);
        let frame = Frame::new(code, globals, builtins, globals, 1);
        let gen = Generator { frame: Some(frame), state: GeneratorState::Created };
        let gen_id = interp.heap.allocate(HeapData::Generator(Box::new(gen)));

        assert_eq!(send(&mut interp, gen_id, Value::None).unwrap(), Value::Int(1));
        assert_eq!(send(&mut interp, gen_id, Value::None).unwrap(), Value::Int(2));
        let err = send(&mut interp, gen_id, Value::None).unwrap_err();
        match err {
            RunError::Exception(InterpretedException(ev)) => assert_eq!(ev.exc_type, ExcType::StopIteration),
            other => panic!("expected StopIteration, got {other:?}"),
        }

        // A finished generator raises StopIteration again rather than
        // panicking or resuming a stale frame.
        let err = send(&mut interp, gen_id, Value::None).unwrap_err();
        match err {
            RunError::Exception(InterpretedException(ev)) => assert_eq!(ev.exc_type, ExcType::StopIteration),
            other => panic!("expected StopIteration, got {other:?}"),
        }
    }
}
