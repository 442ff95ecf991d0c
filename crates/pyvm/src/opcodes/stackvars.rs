//! Stack manipulation, constant loading, and every variable-storage opcode
//! (fast locals, names, globals, cells, attributes). Spec.md §3 "Frame",
//! §4.1.

use super::OpTable;
use crate::exceptions::{EngineError, ExcType, RunError, RunResult};
use crate::frame::Signal;
use crate::heap::{namespace_get, namespace_remove, namespace_set, HeapData};
use crate::interp::Interpreter;
use crate::intern::StringId;
use crate::value::Value;
use crate::version::PyVersion;

const NOP: u8 = 9;
const POP_TOP: u8 = 1;
const ROT_TWO: u8 = 2;
const ROT_THREE: u8 = 3;
const DUP_TOP: u8 = 4;
const DUP_TOP_TWO: u8 = 5;
const COPY: u8 = 120;
const SWAP: u8 = 99;
const CACHE: u8 = 0;
const RESUME: u8 = 151;

const LOAD_CONST: u8 = 100;
const LOAD_FAST: u8 = 124;
const STORE_FAST: u8 = 125;
const DELETE_FAST: u8 = 126;
const LOAD_NAME: u8 = 101;
const STORE_NAME: u8 = 90;
const DELETE_NAME: u8 = 91;
const LOAD_GLOBAL: u8 = 116;
const STORE_GLOBAL: u8 = 97;
const DELETE_GLOBAL: u8 = 98;
const LOAD_DEREF: u8 = 136;
const STORE_DEREF: u8 = 137;
const DELETE_DEREF: u8 = 138;
const LOAD_CLASSDEREF: u8 = 148;
const LOAD_CLOSURE: u8 = 135;
const LOAD_ATTR: u8 = 106;
const STORE_ATTR: u8 = 95;
const DELETE_ATTR: u8 = 96;

pub(super) fn install(table: &mut OpTable, version: PyVersion) {
    table.set(NOP, "NOP", nop);
    table.set(CACHE, "CACHE", nop);
    table.set(POP_TOP, "POP_TOP", pop_top);

    table.set(LOAD_CONST, "LOAD_CONST", load_const);
    table.set(LOAD_FAST, "LOAD_FAST", load_fast);
    table.set(STORE_FAST, "STORE_FAST", store_fast);
    table.set(DELETE_FAST, "DELETE_FAST", delete_fast);
    table.set(LOAD_NAME, "LOAD_NAME", load_name);
    table.set(STORE_NAME, "STORE_NAME", store_name);
    table.set(DELETE_NAME, "DELETE_NAME", delete_name);
    table.set(LOAD_GLOBAL, "LOAD_GLOBAL", load_global);
    table.set(STORE_GLOBAL, "STORE_GLOBAL", store_global);
    table.set(DELETE_GLOBAL, "DELETE_GLOBAL", delete_global);
    table.set(LOAD_DEREF, "LOAD_DEREF", load_deref);
    table.set(STORE_DEREF, "STORE_DEREF", store_deref);
    table.set(DELETE_DEREF, "DELETE_DEREF", delete_deref);
    table.set(LOAD_CLASSDEREF, "LOAD_CLASSDEREF", load_classderef);
    table.set(LOAD_CLOSURE, "LOAD_CLOSURE", load_closure);
    table.set(LOAD_ATTR, "LOAD_ATTR", load_attr);
    table.set(STORE_ATTR, "STORE_ATTR", store_attr);
    table.set(DELETE_ATTR, "DELETE_ATTR", delete_attr);

    if matches!(version.call_era(), crate::version::CallEra::Call311) {
        // `RESUME` is a no-op marker at the top of every 3.11+ code object
        // and after every call; `COPY`/`SWAP` replace `DUP_TOP`/`ROT_*`
        // entirely (spec.md §9 "3.11 stack-shuffling opcodes"). Byte 2 is
        // freed up for `PUSH_NULL` in `calls.rs` as a result.
        table.set(RESUME, "RESUME", nop);
        table.set(COPY, "COPY", copy);
        table.set(SWAP, "SWAP", swap);
    } else {
        table.set(ROT_TWO, "ROT_TWO", rot_two);
        table.set(ROT_THREE, "ROT_THREE", rot_three);
        table.set(DUP_TOP, "DUP_TOP", dup_top);
        table.set(DUP_TOP_TWO, "DUP_TOP_TWO", dup_top_two);
    }
}

fn frame_mut(interp: &mut Interpreter) -> RunResult<&mut crate::frame::Frame> {
    interp.frame.as_mut().ok_or_else(|| EngineError::InvariantViolation { detail: "opcode handler with no active frame".into() }.into())
}

fn nop(_interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    Ok(Signal::Normal)
}

fn pop_top(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    frame_mut(interp)?.pop();
    Ok(Signal::Normal)
}

fn rot_two(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let a = frame.pop();
    let b = frame.pop();
    frame.push(a);
    frame.push(b);
    Ok(Signal::Normal)
}

fn rot_three(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let a = frame.pop();
    let b = frame.pop();
    let c = frame.pop();
    frame.push(a);
    frame.push(c);
    frame.push(b);
    Ok(Signal::Normal)
}

fn dup_top(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    frame.push(frame.peek());
    Ok(Signal::Normal)
}

fn dup_top_two(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let top = frame.peek_at(0);
    let under = frame.peek_at(1);
    frame.push(under);
    frame.push(top);
    Ok(Signal::Normal)
}

/// `COPY(n)`: duplicates the value `n` deep and pushes it (1-indexed, 3.11+).
fn copy(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let value = frame.peek_at(arg as usize - 1);
    frame.push(value);
    Ok(Signal::Normal)
}

/// `SWAP(n)`: swaps the top of stack with the value `n` deep (1-indexed, 3.11+).
fn swap(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let depth = frame.depth_here();
    frame.stack.swap(depth - 1, depth - arg as usize);
    Ok(Signal::Normal)
}

fn load_const(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let value = frame.code.co_consts[arg as usize];
    frame.push(value);
    Ok(Signal::Normal)
}

fn load_fast(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let name = frame.code.co_varnames[arg as usize];
    let value = read_local(interp, name)?;
    frame_mut(interp)?.push(value);
    Ok(Signal::Normal)
}

fn store_fast(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = frame_mut(interp)?.code.co_varnames[arg as usize];
    let value = frame_mut(interp)?.pop();
    write_local(interp, name, value)?;
    Ok(Signal::Normal)
}

fn delete_fast(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = frame_mut(interp)?.code.co_varnames[arg as usize];
    let locals_id = frame_mut(interp)?.f_locals;
    namespace_remove(&mut interp.heap, &interp.interns, locals_id, name);
    Ok(Signal::Normal)
}

fn read_local(interp: &mut Interpreter, name: StringId) -> RunResult<Value> {
    let frame = frame_mut(interp)?;
    if let Some(&cell_id) = frame.cells.get(&name) {
        if let HeapData::Cell(cell) = interp.heap.get(cell_id) {
            return cell.slot.ok_or_else(|| {
                RunError::raise(ExcType::UnboundLocalError, format!("local variable '{}' referenced before assignment", interp.interns.get(name)))
            });
        }
    }
    let locals_id = frame_mut(interp)?.f_locals;
    namespace_get(&interp.heap, locals_id, &interp.interns, name)
        .ok_or_else(|| RunError::raise(ExcType::UnboundLocalError, format!("local variable '{}' referenced before assignment", interp.interns.get(name))))
}

fn write_local(interp: &mut Interpreter, name: StringId, value: Value) -> RunResult<()> {
    let frame = frame_mut(interp)?;
    let cell_id = frame.cells.get(&name).copied();
    let locals_id = frame.f_locals;
    crate::call::set_local_by_id(interp, cell_id, locals_id, name, value);
    Ok(())
}

fn load_name(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = frame_mut(interp)?.code.co_names[arg as usize];
    let locals_id = frame_mut(interp)?.f_locals;
    let globals_id = frame_mut(interp)?.f_globals;
    let builtins_id = frame_mut(interp)?.f_builtins;
    let value = namespace_get(&interp.heap, locals_id, &interp.interns, name)
        .or_else(|| namespace_get(&interp.heap, globals_id, &interp.interns, name))
        .or_else(|| crate::builtins::lookup(&interp.heap, builtins_id, &interp.interns, name))
        .ok_or_else(|| RunError::raise(ExcType::NameError, format!("name '{}' is not defined", interp.interns.get(name))))?;
    frame_mut(interp)?.push(value);
    Ok(Signal::Normal)
}

fn store_name(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = frame_mut(interp)?.code.co_names[arg as usize];
    let value = frame_mut(interp)?.pop();
    let locals_id = frame_mut(interp)?.f_locals;
    namespace_set(&mut interp.heap, &interp.interns, locals_id, name, value);
    Ok(Signal::Normal)
}

fn delete_name(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = frame_mut(interp)?.code.co_names[arg as usize];
    let locals_id = frame_mut(interp)?.f_locals;
    namespace_remove(&mut interp.heap, &interp.interns, locals_id, name);
    Ok(Signal::Normal)
}

fn load_global(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = frame_mut(interp)?.code.co_names[arg as usize];
    let globals_id = frame_mut(interp)?.f_globals;
    let builtins_id = frame_mut(interp)?.f_builtins;
    let value = namespace_get(&interp.heap, globals_id, &interp.interns, name)
        .or_else(|| crate::builtins::lookup(&interp.heap, builtins_id, &interp.interns, name))
        .ok_or_else(|| RunError::raise(ExcType::NameError, format!("name '{}' is not defined", interp.interns.get(name))))?;
    frame_mut(interp)?.push(value);
    Ok(Signal::Normal)
}

fn store_global(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = frame_mut(interp)?.code.co_names[arg as usize];
    let value = frame_mut(interp)?.pop();
    let globals_id = frame_mut(interp)?.f_globals;
    namespace_set(&mut interp.heap, &interp.interns, globals_id, name, value);
    Ok(Signal::Normal)
}

fn delete_global(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = frame_mut(interp)?.code.co_names[arg as usize];
    let globals_id = frame_mut(interp)?.f_globals;
    namespace_remove(&mut interp.heap, &interp.interns, globals_id, name);
    Ok(Signal::Normal)
}

fn load_deref(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let name = deref_name(frame, arg);
    let cell_id = *frame.cells.get(&name).ok_or_else(|| {
        EngineError::InvariantViolation { detail: format!("no cell bound for '{}'", interp.interns.get(name)) }
    })?;
    let HeapData::Cell(cell) = interp.heap.get(cell_id) else {
        return Err(EngineError::InvariantViolation { detail: "LOAD_DEREF target is not a cell".into() }.into());
    };
    let value = cell.slot.ok_or_else(|| RunError::raise(ExcType::NameError, format!("free variable '{}' referenced before assignment", interp.interns.get(name))))?;
    frame_mut(interp)?.push(value);
    Ok(Signal::Normal)
}

fn store_deref(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = deref_name(frame_mut(interp)?, arg);
    let value = frame_mut(interp)?.pop();
    let cell_id = *frame_mut(interp)?.cells.get(&name).ok_or_else(|| EngineError::InvariantViolation { detail: "STORE_DEREF: no cell bound".into() })?;
    if let HeapData::Cell(cell) = interp.heap.get_mut(cell_id) {
        cell.slot = Some(value);
    }
    Ok(Signal::Normal)
}

fn delete_deref(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = deref_name(frame_mut(interp)?, arg);
    if let Some(&cell_id) = frame_mut(interp)?.cells.get(&name) {
        if let HeapData::Cell(cell) = interp.heap.get_mut(cell_id) {
            cell.slot = None;
        }
    }
    Ok(Signal::Normal)
}

/// `LOAD_CLASSDEREF`: inside a class body, free variables are read from the
/// class namespace first and only fall back to the enclosing cell (spec.md
/// §4.6). Mirrors CPython's own class-body special case.
fn load_classderef(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let name = deref_name(frame, arg);
    let locals_id = frame.f_locals;
    if let Some(value) = namespace_get(&interp.heap, locals_id, &interp.interns, name) {
        frame_mut(interp)?.push(value);
        return Ok(Signal::Normal);
    }
    load_deref(interp, arg)
}

fn load_closure(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let name = deref_name(frame, arg);
    let cell_id = *frame.cells.get(&name).ok_or_else(|| EngineError::InvariantViolation { detail: "LOAD_CLOSURE: no cell bound".into() })?;
    frame_mut(interp)?.push(Value::Ref(cell_id));
    Ok(Signal::Normal)
}

/// `co_cellvars` then `co_freevars` are addressed as one contiguous index
/// space by `LOAD_DEREF`/`STORE_DEREF`/`LOAD_CLOSURE` (spec.md §3 "Cell").
fn deref_name(frame: &crate::frame::Frame, arg: i64) -> StringId {
    let idx = arg as usize;
    if idx < frame.code.co_cellvars.len() {
        frame.code.co_cellvars[idx]
    } else {
        frame.code.co_freevars[idx - frame.code.co_cellvars.len()]
    }
}

fn load_attr(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = frame_mut(interp)?.code.co_names[arg as usize];
    let receiver = frame_mut(interp)?.pop();
    let value = crate::call::load_attr(interp, receiver, name)?;
    frame_mut(interp)?.push(value);
    Ok(Signal::Normal)
}

fn store_attr(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = frame_mut(interp)?.code.co_names[arg as usize];
    let frame = frame_mut(interp)?;
    let receiver = frame.pop();
    let value = frame.pop();
    let Value::Ref(id) = receiver else {
        return Err(RunError::raise(ExcType::AttributeError, format!("'{}' object has no attribute '{}'", receiver.type_name(&interp.heap), interp.interns.get(name))));
    };
    let writable = matches!(interp.heap.get(id), HeapData::Instance(_) | HeapData::Class(_));
    if !writable {
        return Err(RunError::raise(ExcType::AttributeError, format!("'{}' object attribute '{}' is read-only", interp.heap.get(id).type_name(), interp.interns.get(name))));
    }
    match interp.heap.get_mut(id) {
        HeapData::Instance(inst) => inst.attrs.insert(name, value),
        HeapData::Class(class) => class.namespace.insert(name, value),
        _ => unreachable!(),
    };
    Ok(Signal::Normal)
}

fn delete_attr(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let name = frame_mut(interp)?.code.co_names[arg as usize];
    let receiver = frame_mut(interp)?.pop();
    if let Value::Ref(id) = receiver {
        if let HeapData::Instance(inst) = interp.heap.get_mut(id) {
            inst.attrs.remove(&name);
        }
    }
    Ok(Signal::Normal)
}
