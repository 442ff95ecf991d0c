//! Container construction, subscripting, and unpacking opcodes.
//!
//! Covers `BUILD_*`, `*_ADD`/`*_EXTEND`/`*_UPDATE`/`DICT_MERGE`,
//! `BINARY_SUBSCR`/`STORE_SUBSCR`/`DELETE_SUBSCR`, slicing, and
//! `UNPACK_SEQUENCE`/`UNPACK_EX`.

use std::io::Write as _;

use super::OpTable;
use crate::exceptions::{EngineError, ExcType, RunError, RunResult};
use crate::frame::Signal;
use crate::heap::HeapData;
use crate::interp::Interpreter;
use crate::types::{PyDict, PyList, PySet};
use crate::value::Value;
use crate::version::PyVersion;

const BINARY_SUBSCR: u8 = 25;
const STORE_SUBSCR: u8 = 60;
const DELETE_SUBSCR: u8 = 61;
const PRINT_EXPR: u8 = 70;
const BUILD_TUPLE: u8 = 102;
const BUILD_LIST: u8 = 103;
const BUILD_SET: u8 = 104;
const BUILD_MAP: u8 = 105;
const BUILD_SLICE: u8 = 133;
const UNPACK_SEQUENCE: u8 = 92;
const UNPACK_EX: u8 = 94;
const BUILD_STRING: u8 = 157;
const BUILD_CONST_KEY_MAP: u8 = 156;
const LIST_APPEND: u8 = 145;
const SET_ADD: u8 = 146;
const MAP_ADD: u8 = 147;
const LIST_EXTEND: u8 = 162;
const SET_UPDATE: u8 = 163;
const DICT_MERGE: u8 = 164;
const DICT_UPDATE: u8 = 165;
const LIST_TO_TUPLE: u8 = 82;

pub(super) fn install(table: &mut OpTable, version: PyVersion) {
    table.set(BINARY_SUBSCR, "BINARY_SUBSCR", binary_subscr);
    table.set(STORE_SUBSCR, "STORE_SUBSCR", store_subscr);
    table.set(DELETE_SUBSCR, "DELETE_SUBSCR", delete_subscr);
    table.set(PRINT_EXPR, "PRINT_EXPR", print_expr);

    table.set(BUILD_TUPLE, "BUILD_TUPLE", build_tuple);
    table.set(BUILD_LIST, "BUILD_LIST", build_list);
    table.set(BUILD_SET, "BUILD_SET", build_set);
    table.set(BUILD_MAP, "BUILD_MAP", build_map);
    table.set(BUILD_SLICE, "BUILD_SLICE", build_slice);
    table.set(BUILD_STRING, "BUILD_STRING", build_string);
    table.set(BUILD_CONST_KEY_MAP, "BUILD_CONST_KEY_MAP", build_const_key_map);

    table.set(UNPACK_SEQUENCE, "UNPACK_SEQUENCE", unpack_sequence);
    table.set(UNPACK_EX, "UNPACK_EX", unpack_ex);

    table.set(LIST_APPEND, "LIST_APPEND", list_append);
    table.set(SET_ADD, "SET_ADD", set_add);
    table.set(MAP_ADD, "MAP_ADD", map_add);

    if version >= PyVersion::V3_2 {
        table.set(LIST_TO_TUPLE, "LIST_TO_TUPLE", list_to_tuple);
    }

    if version >= PyVersion::V3_9 {
        table.set(LIST_EXTEND, "LIST_EXTEND", list_extend);
        table.set(SET_UPDATE, "SET_UPDATE", set_update);
        table.set(DICT_MERGE, "DICT_MERGE", dict_merge);
        table.set(DICT_UPDATE, "DICT_UPDATE", dict_update);
    }
}

fn frame_mut(interp: &mut Interpreter) -> RunResult<&mut crate::frame::Frame> {
    interp.frame.as_mut().ok_or_else(|| EngineError::InvariantViolation { detail: "opcode handler with no active frame".into() }.into())
}

fn build_tuple(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let items = frame.pop_n(arg as usize);
    let id = interp.heap.allocate(HeapData::Tuple(items));
    frame_mut(interp)?.push(Value::Ref(id));
    Ok(Signal::Normal)
}

fn build_list(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let items = frame.pop_n(arg as usize);
    let id = interp.heap.allocate(HeapData::List(PyList(items)));
    frame_mut(interp)?.push(Value::Ref(id));
    Ok(Signal::Normal)
}

fn build_set(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let items = frame.pop_n(arg as usize);
    let mut set = PySet::default();
    for item in items {
        if !set.0.iter().any(|v| interp.heap.values_equal(*v, item)) {
            set.0.push(item);
        }
    }
    let id = interp.heap.allocate(HeapData::Set(set));
    frame_mut(interp)?.push(Value::Ref(id));
    Ok(Signal::Normal)
}

fn build_map(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let n = arg as usize;
    let pairs = frame.pop_n(n * 2);
    let mut dict = PyDict::new();
    for pair in pairs.chunks(2) {
        dict.set(pair[0], pair[1], &interp.heap);
    }
    let id = interp.heap.allocate(HeapData::Dict(dict));
    frame_mut(interp)?.push(Value::Ref(id));
    Ok(Signal::Normal)
}

/// `BUILD_CONST_KEY_MAP count`: pops a tuple of `count` keys (already on the
/// stack as one constant) followed by `count` values, pairing them up.
fn build_const_key_map(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let keys_value = frame.pop();
    let values = frame.pop_n(arg as usize);
    let HeapData::Tuple(keys) = interp.heap.get(keys_value.as_ref_id().ok_or_else(|| {
        RunError::from(EngineError::MalformedBytecode { detail: "BUILD_CONST_KEY_MAP: keys operand is not a tuple".into() })
    })?) else {
        return Err(EngineError::MalformedBytecode { detail: "BUILD_CONST_KEY_MAP: keys operand is not a tuple".into() }.into());
    };
    let keys = keys.clone();
    let mut dict = PyDict::new();
    for (k, v) in keys.into_iter().zip(values) {
        dict.set(k, v, &interp.heap);
    }
    let id = interp.heap.allocate(HeapData::Dict(dict));
    frame_mut(interp)?.push(Value::Ref(id));
    Ok(Signal::Normal)
}

fn build_string(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let parts = frame.pop_n(arg as usize);
    let mut out = String::new();
    for part in parts {
        out.push_str(&part.py_str(&interp.heap, &interp.interns));
    }
    let id = interp.heap.allocate(HeapData::Str(out));
    frame_mut(interp)?.push(Value::Ref(id));
    Ok(Signal::Normal)
}

fn build_slice(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    // Modeled as a 3-tuple (start, stop, step) rather than a dedicated slice
    // heap kind, since the only consumer is `BINARY_SUBSCR`'s own slice path.
    let frame = frame_mut(interp)?;
    let items = if arg == 3 {
        frame.pop_n(3)
    } else {
        let mut v = frame.pop_n(2);
        v.push(Value::None);
        v
    };
    let id = interp.heap.allocate(HeapData::Tuple(items));
    frame_mut(interp)?.push(Value::Ref(id));
    Ok(Signal::Normal)
}

fn unpack_sequence(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let seq = frame.pop();
    let items = sequence_items(interp, seq)?;
    let want = arg as usize;
    if items.len() != want {
        return Err(RunError::raise(ExcType::ValueError, format!("not enough values to unpack (expected {want}, got {})", items.len())));
    }
    let frame = frame_mut(interp)?;
    for item in items.into_iter().rev() {
        frame.push(item);
    }
    Ok(Signal::Normal)
}

/// `UNPACK_EX low|high<<8`: `a, *b, c = seq`. `low` items come off the front,
/// `high` off the back, everything else collects into the starred list.
fn unpack_ex(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let before = (arg & 0xFF) as usize;
    let after = ((arg >> 8) & 0xFF) as usize;
    let frame = frame_mut(interp)?;
    let seq = frame.pop();
    let items = sequence_items(interp, seq)?;
    if items.len() < before + after {
        return Err(RunError::raise(ExcType::ValueError, "not enough values to unpack"));
    }
    let head = items[..before].to_vec();
    let tail = items[items.len() - after..].to_vec();
    let middle: Vec<Value> = items[before..items.len() - after].to_vec();
    let middle_id = interp.heap.allocate(HeapData::List(PyList(middle)));

    let frame = frame_mut(interp)?;
    for item in tail.into_iter().rev() {
        frame.push(item);
    }
    frame.push(Value::Ref(middle_id));
    for item in head.into_iter().rev() {
        frame.push(item);
    }
    Ok(Signal::Normal)
}

/// Realizes any iterable `Value` into a concrete `Vec<Value>`, used by
/// `UNPACK_SEQUENCE`/`UNPACK_EX`/`LIST_EXTEND`/`SET_UPDATE` and by
/// `GET_ITER` (see `opcodes::control`) to materialize the sequence a `for`
/// loop walks (spec.md Non-goals: no lazy iterator protocol, see
/// `control::get_iter`).
pub(super) fn sequence_items(interp: &mut Interpreter, value: Value) -> RunResult<Vec<Value>> {
    match value {
        Value::Ref(id) => match interp.heap.get(id).clone() {
            HeapData::Tuple(items) => Ok(items),
            HeapData::List(PyList(items)) => Ok(items),
            HeapData::Set(PySet(items)) => Ok(items),
            HeapData::FrozenSet(crate::types::PyFrozenSet(items)) => Ok(items),
            HeapData::Dict(dict) => Ok(dict.keys().collect()),
            HeapData::Str(s) => Ok(s.chars().map(|c| Value::Ref(interp.heap.allocate(HeapData::Str(c.to_string())))).collect()),
            other => Err(RunError::raise(ExcType::TypeError, format!("cannot unpack non-iterable {} object", other.type_name()))),
        },
        other => Err(RunError::raise(ExcType::TypeError, format!("cannot unpack non-iterable {} object", other.type_name(&interp.heap)))),
    }
}

fn list_append(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let value = frame.pop();
    let target = frame.peek_at(arg as usize - 1);
    if let Value::Ref(id) = target {
        if let HeapData::List(list) = interp.heap.get_mut(id) {
            list.append(value);
            return Ok(Signal::Normal);
        }
    }
    Err(EngineError::InvariantViolation { detail: "LIST_APPEND: target is not a list".into() }.into())
}

fn set_add(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let value = frame.pop();
    let target = frame.peek_at(arg as usize - 1);
    if let Value::Ref(id) = target {
        let already = match interp.heap.get(id) {
            HeapData::Set(s) => s.0.iter().any(|v| interp.heap.values_equal(*v, value)),
            _ => return Err(EngineError::InvariantViolation { detail: "SET_ADD: target is not a set".into() }.into()),
        };
        if !already {
            if let HeapData::Set(s) = interp.heap.get_mut(id) {
                s.0.push(value);
            }
        }
        return Ok(Signal::Normal);
    }
    Err(EngineError::InvariantViolation { detail: "SET_ADD: target is not a set".into() }.into())
}

fn map_add(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let value = frame.pop();
    let key = frame.pop();
    let target = frame.peek_at(arg as usize - 1);
    if let Value::Ref(id) = target {
        if let HeapData::Dict(dict) = interp.heap.get(id) {
            let mut dict = dict.clone();
            dict.set(key, value, &interp.heap);
            *interp.heap.get_mut(id) = HeapData::Dict(dict);
            return Ok(Signal::Normal);
        }
    }
    Err(EngineError::InvariantViolation { detail: "MAP_ADD: target is not a dict".into() }.into())
}

fn list_to_tuple(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let v = frame.pop();
    let Value::Ref(id) = v else {
        return Err(EngineError::InvariantViolation { detail: "LIST_TO_TUPLE: operand is not a list".into() }.into());
    };
    let HeapData::List(PyList(items)) = interp.heap.get(id).clone() else {
        return Err(EngineError::InvariantViolation { detail: "LIST_TO_TUPLE: operand is not a list".into() }.into());
    };
    let tuple_id = interp.heap.allocate(HeapData::Tuple(items));
    frame_mut(interp)?.push(Value::Ref(tuple_id));
    Ok(Signal::Normal)
}

fn list_extend(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let iterable = frame.pop();
    let extra = sequence_items(interp, iterable)?;
    let target = frame_mut(interp)?.peek_at(arg as usize - 1);
    if let Value::Ref(id) = target {
        if let HeapData::List(list) = interp.heap.get_mut(id) {
            list.0.extend(extra);
            return Ok(Signal::Normal);
        }
    }
    Err(EngineError::InvariantViolation { detail: "LIST_EXTEND: target is not a list".into() }.into())
}

fn set_update(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let iterable = frame.pop();
    let extra = sequence_items(interp, iterable)?;
    let target = frame_mut(interp)?.peek_at(arg as usize - 1);
    if let Value::Ref(id) = target {
        for item in extra {
            let already = match interp.heap.get(id) {
                HeapData::Set(s) => s.0.iter().any(|v| interp.heap.values_equal(*v, item)),
                _ => return Err(EngineError::InvariantViolation { detail: "SET_UPDATE: target is not a set".into() }.into()),
            };
            if !already {
                if let HeapData::Set(s) = interp.heap.get_mut(id) {
                    s.0.push(item);
                }
            }
        }
        return Ok(Signal::Normal);
    }
    Err(EngineError::InvariantViolation { detail: "SET_UPDATE: target is not a set".into() }.into())
}

fn dict_merge(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    dict_update(interp, arg)
}

fn dict_update(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let other = frame.pop();
    let target = frame_mut(interp)?.peek_at(arg as usize - 1);
    let Value::Ref(other_id) = other else {
        return Err(RunError::raise(ExcType::TypeError, "argument must be a mapping"));
    };
    let HeapData::Dict(other_dict) = interp.heap.get(other_id).clone() else {
        return Err(RunError::raise(ExcType::TypeError, "argument must be a mapping"));
    };
    if let Value::Ref(id) = target {
        if let HeapData::Dict(dict) = interp.heap.get(id) {
            let mut merged = dict.clone();
            for (k, v) in other_dict.iter() {
                merged.set(*k, *v, &interp.heap);
            }
            *interp.heap.get_mut(id) = HeapData::Dict(merged);
            return Ok(Signal::Normal);
        }
    }
    Err(EngineError::InvariantViolation { detail: "DICT_MERGE/DICT_UPDATE: target is not a dict".into() }.into())
}

fn binary_subscr(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let index = frame.pop();
    let container = frame.pop();
    let result = subscript_get(interp, container, index)?;
    frame_mut(interp)?.push(result);
    Ok(Signal::Normal)
}

fn subscript_get(interp: &mut Interpreter, container: Value, index: Value) -> RunResult<Value> {
    match container {
        Value::Ref(id) => match interp.heap.get(id).clone() {
            HeapData::List(list) => match index {
                Value::Int(i) => list.get(i).ok_or_else(|| RunError::raise(ExcType::IndexError, "list index out of range")),
                Value::Ref(slice_id) if matches!(interp.heap.get(slice_id), HeapData::Tuple(t) if t.len() == 3) => {
                    slice_sequence(interp, list.0, slice_id).map(|items| Value::Ref(interp.heap.allocate(HeapData::List(PyList(items)))))
                }
                other => Err(RunError::raise(ExcType::TypeError, format!("list indices must be integers, not {}", other.type_name(&interp.heap)))),
            },
            HeapData::Tuple(items) => match index {
                Value::Int(i) => crate::types::list::normalize_index(i, items.len())
                    .map(|idx| items[idx])
                    .ok_or_else(|| RunError::raise(ExcType::IndexError, "tuple index out of range")),
                Value::Ref(slice_id) if matches!(interp.heap.get(slice_id), HeapData::Tuple(t) if t.len() == 3) => {
                    slice_sequence(interp, items, slice_id).map(|out| Value::Ref(interp.heap.allocate(HeapData::Tuple(out))))
                }
                other => Err(RunError::raise(ExcType::TypeError, format!("tuple indices must be integers, not {}", other.type_name(&interp.heap)))),
            },
            HeapData::Str(s) => match index {
                Value::Int(i) => {
                    let chars: Vec<char> = s.chars().collect();
                    crate::types::list::normalize_index(i, chars.len())
                        .map(|idx| Value::Ref(interp.heap.allocate(HeapData::Str(chars[idx].to_string()))))
                        .ok_or_else(|| RunError::raise(ExcType::IndexError, "string index out of range"))
                }
                other => Err(RunError::raise(ExcType::TypeError, format!("string indices must be integers, not {}", other.type_name(&interp.heap)))),
            },
            HeapData::Dict(dict) | HeapData::Namespace(dict) => {
                dict.get(index, &interp.heap).ok_or_else(|| RunError::raise(ExcType::KeyError, index.py_repr(&interp.heap, &interp.interns)))
            }
            other => Err(RunError::raise(ExcType::TypeError, format!("'{}' object is not subscriptable", other.type_name()))),
        },
        other => Err(RunError::raise(ExcType::TypeError, format!("'{}' object is not subscriptable", other.type_name(&interp.heap)))),
    }
}

fn slice_sequence(interp: &Interpreter, items: Vec<Value>, slice_id: crate::heap::ObjectId) -> RunResult<Vec<Value>> {
    let HeapData::Tuple(parts) = interp.heap.get(slice_id) else {
        return Err(EngineError::InvariantViolation { detail: "slice operand is not a 3-tuple".into() }.into());
    };
    let as_opt_i64 = |v: Value| match v {
        Value::Int(i) => Some(i),
        _ => None,
    };
    let step = as_opt_i64(parts[2]).unwrap_or(1);
    if step == 0 {
        return Err(RunError::raise(ExcType::ValueError, "slice step cannot be zero"));
    }
    let len = items.len() as i64;
    // Mirrors CPython's PySlice_GetIndicesEx: the clamping bounds for a
    // missing or out-of-range start/stop depend on the step's sign.
    let (lower, upper) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let clamp = |i: i64| if i < 0 { (i + len).max(lower) } else { i.min(upper) };
    let start = as_opt_i64(parts[0]).map_or(if step < 0 { upper } else { lower }, clamp);
    let stop = as_opt_i64(parts[1]).map_or(if step < 0 { lower } else { upper }, clamp);
    let mut out = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < stop {
            if let Some(v) = items.get(i as usize) {
                out.push(*v);
            }
            i += step;
        }
    } else {
        while i > stop {
            if i >= 0 {
                if let Some(v) = items.get(i as usize) {
                    out.push(*v);
                }
            }
            i += step;
        }
    }
    Ok(out)
}

fn store_subscr(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let index = frame.pop();
    let container = frame.pop();
    let value = frame.pop();
    match container {
        Value::Ref(id) => match interp.heap.get(id) {
            HeapData::List(_) => {
                let Value::Int(i) = index else {
                    return Err(RunError::raise(ExcType::TypeError, "list indices must be integers"));
                };
                let HeapData::List(list) = interp.heap.get_mut(id) else { unreachable!() };
                if !list.set(i, value) {
                    return Err(RunError::raise(ExcType::IndexError, "list assignment index out of range"));
                }
            }
            HeapData::Dict(_) => {
                let HeapData::Dict(mut dict) = interp.heap.get(id).clone() else { unreachable!() };
                dict.set(index, value, &interp.heap);
                *interp.heap.get_mut(id) = HeapData::Dict(dict);
            }
            other => return Err(RunError::raise(ExcType::TypeError, format!("'{}' object does not support item assignment", other.type_name()))),
        },
        other => return Err(RunError::raise(ExcType::TypeError, format!("'{}' object does not support item assignment", other.type_name(&interp.heap)))),
    }
    Ok(Signal::Normal)
}

fn delete_subscr(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let index = frame.pop();
    let container = frame.pop();
    match container {
        Value::Ref(id) => match interp.heap.get(id).clone() {
            HeapData::Dict(mut dict) => {
                if dict.remove(index, &interp.heap).is_none() {
                    return Err(RunError::raise(ExcType::KeyError, index.py_repr(&interp.heap, &interp.interns)));
                }
                *interp.heap.get_mut(id) = HeapData::Dict(dict);
            }
            HeapData::List(mut list) => {
                let Value::Int(i) = index else {
                    return Err(RunError::raise(ExcType::TypeError, "list indices must be integers"));
                };
                match crate::types::list::normalize_index(i, list.0.len()) {
                    Some(idx) => {
                        list.0.remove(idx);
                        *interp.heap.get_mut(id) = HeapData::List(list);
                    }
                    None => return Err(RunError::raise(ExcType::IndexError, "list assignment index out of range")),
                }
            }
            other => return Err(RunError::raise(ExcType::TypeError, format!("'{}' object doesn't support item deletion", other.type_name()))),
        },
        other => return Err(RunError::raise(ExcType::TypeError, format!("'{}' object doesn't support item deletion", other.type_name(&interp.heap)))),
    }
    Ok(Signal::Normal)
}

fn print_expr(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let value = frame.pop();
    if !matches!(value, Value::None) {
        let text = value.py_repr(&interp.heap, &interp.interns);
        let _ = writeln!(interp.stdout, "{text}");
    }
    Ok(Signal::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;

    fn interp() -> Interpreter {
        Interpreter::with_stdout(RunConfig::new(PyVersion::V3_10), Box::new(Vec::new()))
    }

    #[test]
    fn subscript_get_indexes_a_list_negative_from_end() {
        let mut i = interp();
        let list_id = i.heap.allocate(HeapData::List(PyList(vec![Value::Int(1), Value::Int(2), Value::Int(3)])));
        let result = subscript_get(&mut i, Value::Ref(list_id), Value::Int(-1)).unwrap();
        assert_eq!(result, Value::Int(3));
    }

    #[test]
    fn subscript_get_out_of_range_raises_index_error() {
        let mut i = interp();
        let list_id = i.heap.allocate(HeapData::List(PyList(vec![Value::Int(1)])));
        let err = subscript_get(&mut i, Value::Ref(list_id), Value::Int(5)).unwrap_err();
        assert!(matches!(err, RunError::Exception(e) if e.0.exc_type == ExcType::IndexError));
    }

    #[test]
    fn dict_get_missing_key_raises_key_error() {
        let mut i = interp();
        let dict_id = i.heap.allocate(HeapData::Dict(PyDict::new()));
        let key = Value::Int(1);
        let err = subscript_get(&mut i, Value::Ref(dict_id), key).unwrap_err();
        assert!(matches!(err, RunError::Exception(e) if e.0.exc_type == ExcType::KeyError));
    }

    fn int_list(i: &mut Interpreter, values: &[i64]) -> Value {
        let items = values.iter().map(|v| Value::Int(*v)).collect();
        Value::Ref(i.heap.allocate(HeapData::List(PyList(items))))
    }

    fn slice(i: &mut Interpreter, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Value {
        let to_value = |v: Option<i64>| v.map_or(Value::None, Value::Int);
        let id = i.heap.allocate(HeapData::Tuple(vec![to_value(start), to_value(stop), to_value(step)]));
        Value::Ref(id)
    }

    #[test]
    fn negative_step_slice_reverses_the_whole_sequence() {
        let mut i = interp();
        let list = int_list(&mut i, &[0, 1, 2, 3, 4]);
        let idx = slice(&mut i, None, None, Some(-1));
        let result = subscript_get(&mut i, list, idx).unwrap();
        assert_eq!(list_values(&i, result), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn negative_step_slice_honors_explicit_bounds() {
        let mut i = interp();
        let list = int_list(&mut i, &[0, 1, 2, 3, 4]);
        let idx = slice(&mut i, Some(3), Some(0), Some(-1));
        let result = subscript_get(&mut i, list, idx).unwrap();
        assert_eq!(list_values(&i, result), vec![3, 2, 1]);
    }

    #[test]
    fn zero_step_slice_raises_value_error() {
        let mut i = interp();
        let list = int_list(&mut i, &[0, 1, 2]);
        let idx = slice(&mut i, None, None, Some(0));
        let err = subscript_get(&mut i, list, idx).unwrap_err();
        assert!(matches!(err, RunError::Exception(e) if e.0.exc_type == ExcType::ValueError));
    }

    fn list_values(i: &Interpreter, value: Value) -> Vec<i64> {
        let Value::Ref(id) = value else { panic!("expected a list reference") };
        let HeapData::List(list) = i.heap.get(id) else { panic!("expected a list") };
        list.0.iter().map(|v| match v {
            Value::Int(n) => *n,
            other => panic!("expected an int, got {other:?}"),
        }).collect()
    }
}
