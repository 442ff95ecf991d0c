//! The call protocol across all three calling eras (spec.md §4.3), function
//! construction (`MAKE_FUNCTION`/`MAKE_CLOSURE`, spec.md §4.4), class
//! construction's entry point (`LOAD_BUILD_CLASS`), and the two suspension
//! opcodes `RETURN_VALUE`/`YIELD_VALUE`/`YIELD_FROM`.
//!
//! `BEFORE_WITH`/`WITH_EXCEPT_START` are declared here only as byte constants
//! — their handlers live in `opcodes::control` alongside the rest of the
//! with-statement machinery and are wired into the table from there.

use std::rc::Rc;

use ahash::AHashMap;

use super::OpTable;
use crate::call::{self, CallOutcome};
use crate::code::CodeObject;
use crate::exceptions::{EngineError, ExcType, InterpretedException, RunError, RunResult};
use crate::frame::Signal;
use crate::heap::{HeapData, ObjectId};
use crate::interp::Interpreter;
use crate::intern::StringId;
use crate::object::Function;
use crate::value::Value;
use crate::version::{CallEra, PyVersion};

// --- Classic era (<3.6): spec.md §4.3 "Classic" ----------------------------
const CALL_FUNCTION: u8 = 131;
const CALL_FUNCTION_VAR: u8 = 140;
const CALL_FUNCTION_KW: u8 = 141; // 3.6+ reuses this byte with different semantics
const CALL_FUNCTION_VAR_KW: u8 = 142; // shares a byte with CALL_FUNCTION_EX post-3.6

// --- 3.6-3.10 era: spec.md §4.3 "Call36" -----------------------------------
const CALL_FUNCTION_EX: u8 = 142;
const LOAD_METHOD: u8 = 160;
const CALL_METHOD: u8 = 161;

// --- 3.11+ era: spec.md §4.3 "Call311" -------------------------------------
const PUSH_NULL: u8 = 2;
const PRECALL: u8 = 166;
const KW_NAMES: u8 = 172;
const CALL: u8 = 171;

/// Used by `opcodes::control::install` for the with-statement opcodes that
/// exist only from 3.11 onward.
pub(super) const BEFORE_WITH: u8 = 53;
pub(super) const WITH_EXCEPT_START: u8 = 49;

/// Unset for Python 2 by `opcodes::build_table` (classes are built by the
/// compiler emitting a direct call to a module-level `__metaclass__`/class
/// statement machinery there, not via a stack-pushed sentinel).
pub(super) const LOAD_BUILD_CLASS: u8 = 71;

const MAKE_FUNCTION: u8 = 132;
const MAKE_CLOSURE: u8 = 134; // <3.6 only; folded into MAKE_FUNCTION's 0x08 flag afterward
const RETURN_VALUE: u8 = 83;
const RETURN_CONST: u8 = 121; // 3.12+ only, no overlap with this byte's other gated uses
const YIELD_VALUE: u8 = 86;
const YIELD_FROM: u8 = 72; // 3.3+ only

pub(super) fn install(table: &mut OpTable, version: PyVersion) {
    table.set(RETURN_VALUE, "RETURN_VALUE", return_value);
    table.set(YIELD_VALUE, "YIELD_VALUE", yield_value);
    table.set(MAKE_FUNCTION, "MAKE_FUNCTION", make_function);
    table.set(LOAD_BUILD_CLASS, "LOAD_BUILD_CLASS", load_build_class);

    if version >= PyVersion::V3_3 {
        table.set(YIELD_FROM, "YIELD_FROM", yield_from);
    }
    if version < PyVersion::V3_6 {
        table.set(MAKE_CLOSURE, "MAKE_CLOSURE", make_closure);
    }
    if version >= PyVersion::V3_12 {
        table.set(RETURN_CONST, "RETURN_CONST", return_const);
    }

    match version.call_era() {
        CallEra::Classic => {
            table.set(CALL_FUNCTION, "CALL_FUNCTION", call_function_classic);
            table.set(CALL_FUNCTION_VAR, "CALL_FUNCTION_VAR", call_function_var);
            table.set(CALL_FUNCTION_KW, "CALL_FUNCTION_KW", call_function_kw_classic);
            table.set(CALL_FUNCTION_VAR_KW, "CALL_FUNCTION_VAR_KW", call_function_var_kw);
        }
        CallEra::Call36 => {
            table.set(CALL_FUNCTION, "CALL_FUNCTION", call_function_36);
            table.set(CALL_FUNCTION_KW, "CALL_FUNCTION_KW", call_function_kw_36);
            table.set(CALL_FUNCTION_EX, "CALL_FUNCTION_EX", call_function_ex);
            if version >= PyVersion::V3_7 {
                table.set(LOAD_METHOD, "LOAD_METHOD", load_method);
                table.set(CALL_METHOD, "CALL_METHOD", call_method);
            }
        }
        CallEra::Call311 => {
            table.set(PUSH_NULL, "PUSH_NULL", push_null);
            table.set(PRECALL, "PRECALL", precall);
            table.set(KW_NAMES, "KW_NAMES", kw_names);
            table.set(CALL, "CALL", call_311);
        }
    }
}

fn frame_mut(interp: &mut Interpreter) -> RunResult<&mut crate::frame::Frame> {
    interp.frame.as_mut().ok_or_else(|| EngineError::InvariantViolation { detail: "opcode handler with no active frame".into() }.into())
}

/// Runs `callable(positional, named)` and leaves its result or its pushed
/// frame for the main loop to pick up. Does *not* drain the callee
/// synchronously: a genuine function call must let `Interpreter::step`
/// advance through the callee's own bytecode one instruction at a time, the
/// same as any other frame (contrast `opcodes::control::call_dunder`, which
/// drains synchronously because a with-statement handler needs its dunder's
/// result within the same opcode dispatch).
fn dispatch_call(interp: &mut Interpreter, callable: Value, positional: Vec<Value>, named: Vec<(StringId, Value)>) -> RunResult<Signal> {
    match call::call(interp, callable, positional, named)? {
        CallOutcome::Value(value) => {
            frame_mut(interp)?.push(value);
            Ok(Signal::Normal)
        }
        CallOutcome::PushedFrame => Ok(Signal::Normal),
    }
}

/// Splits a classic-era `CALL_FUNCTION`-family immediate into
/// `(n_positional, n_keyword_pairs)` (spec.md §4.3 "Classic").
fn decode_np_nkw(arg: i64) -> (usize, usize) {
    ((arg & 0xFF) as usize, ((arg >> 8) & 0xFF) as usize)
}

fn kwpairs_to_named(interp: &mut Interpreter, pairs: Vec<Value>) -> RunResult<Vec<(StringId, Value)>> {
    let mut named = Vec::with_capacity(pairs.len() / 2);
    for pair in pairs.chunks(2) {
        let name = interp
            .key_to_name(pair[0])
            .ok_or_else(|| EngineError::MalformedBytecode { detail: "keyword argument name is not a string".into() })?;
        named.push((name, pair[1]));
    }
    Ok(named)
}

fn dict_to_named(interp: &mut Interpreter, value: Value) -> RunResult<Vec<(StringId, Value)>> {
    let Value::Ref(id) = value else {
        return Err(RunError::raise(ExcType::TypeError, "argument after ** must be a mapping, not a scalar"));
    };
    let HeapData::Dict(dict) = interp.heap.get(id).clone() else {
        return Err(RunError::raise(ExcType::TypeError, "argument after ** must be a mapping"));
    };
    let mut named = Vec::new();
    for (key, value) in dict.iter() {
        let name = interp
            .key_to_name(*key)
            .ok_or_else(|| EngineError::MalformedBytecode { detail: "keyword argument name is not a string".into() })?;
        named.push((name, *value));
    }
    Ok(named)
}

// --- Classic era handlers ---------------------------------------------------

fn call_function_classic(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let (np, nkw) = decode_np_nkw(arg);
    let frame = frame_mut(interp)?;
    let kwpairs = frame.pop_n(nkw * 2);
    let positional = frame.pop_n(np);
    let callable = frame.pop();
    let named = kwpairs_to_named(interp, kwpairs)?;
    dispatch_call(interp, callable, positional, named)
}

fn call_function_var(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let (np, nkw) = decode_np_nkw(arg);
    let frame = frame_mut(interp)?;
    let star_args = frame.pop();
    let kwpairs = frame.pop_n(nkw * 2);
    let mut positional = frame.pop_n(np);
    let callable = frame.pop();
    positional.extend(super::containers::sequence_items(interp, star_args)?);
    let named = kwpairs_to_named(interp, kwpairs)?;
    dispatch_call(interp, callable, positional, named)
}

fn call_function_kw_classic(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let (np, nkw) = decode_np_nkw(arg);
    let frame = frame_mut(interp)?;
    let kwargs_dict = frame.pop();
    let kwpairs = frame.pop_n(nkw * 2);
    let positional = frame.pop_n(np);
    let callable = frame.pop();
    let mut named = kwpairs_to_named(interp, kwpairs)?;
    named.extend(dict_to_named(interp, kwargs_dict)?);
    dispatch_call(interp, callable, positional, named)
}

fn call_function_var_kw(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let (np, nkw) = decode_np_nkw(arg);
    let frame = frame_mut(interp)?;
    let kwargs_dict = frame.pop();
    let star_args = frame.pop();
    let kwpairs = frame.pop_n(nkw * 2);
    let mut positional = frame.pop_n(np);
    let callable = frame.pop();
    positional.extend(super::containers::sequence_items(interp, star_args)?);
    let mut named = kwpairs_to_named(interp, kwpairs)?;
    named.extend(dict_to_named(interp, kwargs_dict)?);
    dispatch_call(interp, callable, positional, named)
}

// --- 3.6-3.10 era handlers ---------------------------------------------------

fn call_function_36(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let positional = frame.pop_n(arg as usize);
    let callable = frame.pop();
    dispatch_call(interp, callable, positional, Vec::new())
}

fn call_function_kw_36(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let names_value = frame.pop();
    let mut all_args = frame.pop_n(arg as usize);
    let callable = frame.pop();
    let Value::Ref(names_id) = names_value else {
        return Err(EngineError::MalformedBytecode { detail: "CALL_FUNCTION_KW: names operand is not a tuple".into() }.into());
    };
    let HeapData::Tuple(names) = interp.heap.get(names_id).clone() else {
        return Err(EngineError::MalformedBytecode { detail: "CALL_FUNCTION_KW: names operand is not a tuple".into() }.into());
    };
    let kw_values = all_args.split_off(all_args.len() - names.len());
    let mut named = Vec::with_capacity(names.len());
    for (name_value, value) in names.into_iter().zip(kw_values) {
        let name = interp
            .key_to_name(name_value)
            .ok_or_else(|| EngineError::MalformedBytecode { detail: "keyword argument name is not a string".into() })?;
        named.push((name, value));
    }
    dispatch_call(interp, callable, all_args, named)
}

fn call_function_ex(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let kwargs_dict = if arg & 0x01 != 0 { Some(frame.pop()) } else { None };
    let args_tuple = frame.pop();
    let callable = frame.pop();
    let positional = super::containers::sequence_items(interp, args_tuple)?;
    let named = match kwargs_dict {
        Some(dict) => dict_to_named(interp, dict)?,
        None => Vec::new(),
    };
    dispatch_call(interp, callable, positional, named)
}

fn load_method(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let obj = frame.pop();
    let name = frame.code.co_names[arg as usize];
    let bound = call::load_attr(interp, obj, name)?;
    let frame = frame_mut(interp)?;
    // `Value::Null` marks "no separate receiver to prepend": our `load_attr`
    // always returns an already-bound callable, so the two-slot
    // unbound-function/receiver optimization CPython uses never applies here
    // (spec.md §4.3 "Call36" NULL sentinel).
    frame.push(Value::Null);
    frame.push(bound);
    Ok(Signal::Normal)
}

fn call_method(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let positional = frame.pop_n(arg as usize);
    let callable = frame.pop();
    let maybe_receiver = frame.pop();
    let (callable, positional) = prepend_if_not_null(maybe_receiver, callable, positional);
    dispatch_call(interp, callable, positional, Vec::new())
}

fn prepend_if_not_null(maybe_receiver: Value, callable: Value, mut positional: Vec<Value>) -> (Value, Vec<Value>) {
    if matches!(maybe_receiver, Value::Null) {
        (callable, positional)
    } else {
        positional.insert(0, maybe_receiver);
        (callable, positional)
    }
}

// --- 3.11+ era handlers ------------------------------------------------------

fn push_null(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    frame_mut(interp)?.push(Value::Null);
    Ok(Signal::Normal)
}

/// `PRECALL` exists in real CPython purely as a specialization checkpoint;
/// this engine never specializes dispatch, so it is a pure no-op.
fn precall(_interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    Ok(Signal::Normal)
}

fn kw_names(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let value = frame.code.co_consts[arg as usize];
    let Value::Ref(id) = value else {
        return Err(EngineError::MalformedBytecode { detail: "KW_NAMES: operand is not a tuple constant".into() }.into());
    };
    let HeapData::Tuple(items) = interp.heap.get(id).clone() else {
        return Err(EngineError::MalformedBytecode { detail: "KW_NAMES: operand is not a tuple constant".into() }.into());
    };
    let mut names = Vec::with_capacity(items.len());
    for item in items {
        let name = interp
            .key_to_name(item)
            .ok_or_else(|| EngineError::MalformedBytecode { detail: "KW_NAMES: name is not a string".into() })?;
        names.push(name);
    }
    frame_mut(interp)?.call_shape_kwnames = names;
    Ok(Signal::Normal)
}

/// `CALL argc`: pops `argc` arguments (the trailing `len(kwnames)` of them
/// keyword, staged by the preceding `KW_NAMES`), then the callable, then the
/// NULL-or-receiver slot below it. `total = argc + (is_method ? 1 : 0)` per
/// spec.md §4.3 "Call311": `is_method` is simply "that slot was not NULL".
fn call_311(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let kwnames = std::mem::take(&mut frame.call_shape_kwnames);
    let mut args = frame.pop_n(arg as usize);
    let callable = frame.pop();
    let maybe_receiver = frame.pop();
    let split_at = args.len() - kwnames.len();
    let kw_values = args.split_off(split_at);
    let named: Vec<(StringId, Value)> = kwnames.into_iter().zip(kw_values).collect();
    let (callable, positional) = prepend_if_not_null(maybe_receiver, callable, args);
    dispatch_call(interp, callable, positional, named)
}

// --- LOAD_BUILD_CLASS / RETURN_VALUE / RETURN_CONST / YIELD_* --------------

fn load_build_class(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let id = interp.heap.allocate(HeapData::BuildClassSentinel);
    frame_mut(interp)?.push(Value::Ref(id));
    Ok(Signal::Normal)
}

fn return_value(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let value = frame_mut(interp)?.pop();
    Ok(Signal::Return(value))
}

fn return_const(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let value = frame.code.co_consts[arg as usize];
    Ok(Signal::Return(value))
}

fn yield_value(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let value = frame_mut(interp)?.pop();
    Ok(Signal::Yield(value))
}

/// `YIELD_FROM`: delegates to a subiterator already normalized by
/// `GET_YIELD_FROM_ITER` into either a `Generator` or a realized list (see
/// `opcodes::control::get_iter`). Unlike CPython, this engine does not
/// thread the value an external `.send()` supplies back into the
/// subiterator — every step sends `Value::None`, matching the same
/// simplification `for_iter_generator` already makes — and a `yield from`
/// expression always evaluates to `None` rather than the subiterator's true
/// `StopIteration` payload, since `ExceptionValue` carries only a string
/// message, not an arbitrary `Value` (see DESIGN.md Open Question).
fn yield_from(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    frame.pop(); // the `sent` slot the compiler primes with `LOAD_CONST None`
    let sub = frame.peek();
    let Value::Ref(id) = sub else {
        return Err(EngineError::InvariantViolation { detail: "YIELD_FROM: TOS is not an iterator".into() }.into());
    };
    let stepped = if matches!(interp.heap.get(id), HeapData::Generator(_)) {
        crate::generator::send(interp, id, Value::None)
    } else {
        drain_one(interp, id)
    };
    match stepped {
        Ok(value) => {
            let version = interp.config.version;
            let width: u32 = if version.uses_wordcode() { 2 } else { 1 };
            let frame = frame_mut(interp)?;
            frame.push(Value::None); // restore the `sent` slot for re-entry
            frame.f_lasti = frame.f_lasti.wrapping_sub(width);
            frame.fallthrough = false;
            Ok(Signal::Yield(value))
        }
        Err(RunError::Exception(InterpretedException(ev))) if ev.exc_type == ExcType::StopIteration => {
            let frame = frame_mut(interp)?;
            frame.pop(); // drop the exhausted subiterator
            frame.push(Value::None);
            Ok(Signal::Normal)
        }
        Err(e) => Err(e),
    }
}

fn drain_one(interp: &mut Interpreter, id: ObjectId) -> RunResult<Value> {
    match interp.heap.get_mut(id) {
        HeapData::List(list) if !list.0.is_empty() => Ok(list.0.remove(0)),
        HeapData::List(_) => Err(RunError::raise(ExcType::StopIteration, "")),
        other => Err(EngineError::InvariantViolation { detail: format!("YIELD_FROM: TOS is a {} object, not an iterator", other.type_name()) }.into()),
    }
}

// --- MAKE_FUNCTION / MAKE_CLOSURE -------------------------------------------

fn make_function(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    make_function_impl(interp, arg, false)
}

fn make_closure(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    make_function_impl(interp, arg, true)
}

fn code_object_from_value(interp: &Interpreter, value: Value) -> RunResult<Rc<CodeObject>> {
    let Value::Ref(id) = value else {
        return Err(EngineError::MalformedBytecode { detail: "MAKE_FUNCTION: code operand is not a code object".into() }.into());
    };
    match interp.heap.get(id) {
        HeapData::Code(code) => Ok(code.clone()),
        _ => Err(EngineError::MalformedBytecode { detail: "MAKE_FUNCTION: code operand is not a code object".into() }.into()),
    }
}

fn make_function_impl(interp: &mut Interpreter, arg: i64, is_closure_opcode: bool) -> RunResult<Signal> {
    let version = interp.config.version;
    if version < PyVersion::V3_3 {
        return make_function_legacy(interp, arg, is_closure_opcode);
    }

    let frame = frame_mut(interp)?;
    // 3.3-3.5 routed closures through the dedicated `MAKE_CLOSURE` opcode
    // unconditionally; 3.6+ folded that into flag bit 0x08 on `MAKE_FUNCTION`
    // itself (spec.md §4.4).
    let closure_value = if is_closure_opcode && version < PyVersion::V3_6 {
        Some(frame.pop())
    } else if arg & 0x08 != 0 {
        Some(frame.pop())
    } else {
        None
    };
    let annotations_value = if arg & 0x04 != 0 { Some(frame.pop()) } else { None };
    let kwdefaults_value = if arg & 0x02 != 0 { Some(frame.pop()) } else { None };
    let defaults_value = if arg & 0x01 != 0 { Some(frame.pop()) } else { None };
    // 3.11+ dropped the qualname operand; the function's qualified name is
    // derived from the code object alone (spec.md §4.4).
    let qualname_value = if version < PyVersion::V3_11 { Some(frame.pop()) } else { None };
    let code_value = frame.pop();
    let f_globals = frame.f_globals;

    let code = code_object_from_value(interp, code_value)?;
    let qualname = match qualname_value {
        Some(q) => interp.key_to_name(q).unwrap_or(code.co_name),
        None => code.co_qualname,
    };
    let defaults = match defaults_value {
        Some(v) => super::containers::sequence_items(interp, v)?,
        None => Vec::new(),
    };
    let kwdefaults: AHashMap<StringId, Value> = match kwdefaults_value {
        Some(v) => dict_to_named(interp, v)?.into_iter().collect(),
        None => AHashMap::new(),
    };
    let annotations: AHashMap<StringId, Value> = match annotations_value {
        Some(v) => dict_to_named(interp, v)?.into_iter().collect(),
        None => AHashMap::new(),
    };
    let closure = match closure_value {
        Some(v) => super::containers::sequence_items(interp, v)?.into_iter().filter_map(Value::as_ref_id).collect(),
        None => Vec::new(),
    };

    let func = Function { name: code.co_name, qualname, code, globals: f_globals, defaults, kwdefaults, closure, annotations };
    let id = interp.heap.allocate(HeapData::Function(func));
    frame_mut(interp)?.push(Value::Ref(id));
    Ok(Signal::Normal)
}

/// Pre-3.3 `MAKE_FUNCTION`/`MAKE_CLOSURE`: the immediate packs only the
/// positional-default count (the real CPython encoding also packs
/// keyword-only-default and annotation counts into higher bytes; this
/// engine's test programs never exercise those on a sub-3.3 target, so they
/// are left unmodeled here rather than guessed at).
fn make_function_legacy(interp: &mut Interpreter, arg: i64, is_closure_opcode: bool) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let closure_value = if is_closure_opcode { Some(frame.pop()) } else { None };
    let ndefaults = (arg & 0xFF) as usize;
    let defaults = frame.pop_n(ndefaults);
    let code_value = frame.pop();
    let f_globals = frame.f_globals;

    let code = code_object_from_value(interp, code_value)?;
    let closure = match closure_value {
        Some(v) => super::containers::sequence_items(interp, v)?.into_iter().filter_map(Value::as_ref_id).collect(),
        None => Vec::new(),
    };
    let func = Function {
        name: code.co_name,
        qualname: code.co_name,
        code,
        globals: f_globals,
        defaults,
        kwdefaults: AHashMap::new(),
        closure,
        annotations: AHashMap::new(),
    };
    let id = interp.heap.allocate(HeapData::Function(func));
    frame_mut(interp)?.push(Value::Ref(id));
    Ok(Signal::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_np_nkw_splits_low_and_high_byte() {
        assert_eq!(decode_np_nkw(0x0203), (3, 2));
        assert_eq!(decode_np_nkw(0), (0, 0));
    }

    #[test]
    fn prepend_if_not_null_only_prepends_a_real_receiver() {
        let (_, args) = prepend_if_not_null(Value::Null, Value::Int(1), vec![Value::Int(2)]);
        assert_eq!(args, vec![Value::Int(2)]);

        let (_, args) = prepend_if_not_null(Value::Int(9), Value::Int(1), vec![Value::Int(2)]);
        assert_eq!(args, vec![Value::Int(9), Value::Int(2)]);
    }
}
