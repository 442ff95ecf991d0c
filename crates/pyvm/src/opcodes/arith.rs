//! Unary/binary arithmetic, bitwise, and comparison opcodes (spec.md §4.2
//! "COMPARE_OP decodes its index from the high four bits... in 3.12").
//!
//! Pre-3.11 bytecode has one opcode per operator (`BINARY_ADD`,
//! `INPLACE_ADD`, ...); 3.11 keeps those names but 3.11 itself still emits
//! them (the unification into a single `BINARY_OP` with an `NB_*` argument is
//! a 3.11 change per the real CPython opcode table) — both forms are wired
//! to the same handler bodies here so either encoding reaches identical
//! semantics.

use super::OpTable;
use crate::exceptions::{EngineError, ExcType, RunError, RunResult};
use crate::frame::Signal;
use crate::heap::HeapData;
use crate::interp::Interpreter;
use crate::types::{PyFrozenSet, PyList, PySet};
use crate::value::Value;
use crate::version::PyVersion;

const UNARY_POSITIVE: u8 = 10;
const UNARY_NEGATIVE: u8 = 11;
const UNARY_NOT: u8 = 12;
const UNARY_INVERT: u8 = 15;

const BINARY_POWER: u8 = 19;
const BINARY_MULTIPLY: u8 = 20;
const BINARY_MODULO: u8 = 22;
const BINARY_ADD: u8 = 23;
const BINARY_SUBTRACT: u8 = 24;
const BINARY_FLOOR_DIVIDE: u8 = 26;
const BINARY_TRUE_DIVIDE: u8 = 27;
const INPLACE_FLOOR_DIVIDE: u8 = 28;
const INPLACE_TRUE_DIVIDE: u8 = 29;
const INPLACE_ADD: u8 = 55;
const INPLACE_SUBTRACT: u8 = 56;
const INPLACE_MULTIPLY: u8 = 57;
const INPLACE_MODULO: u8 = 59;
const BINARY_LSHIFT: u8 = 62;
const BINARY_RSHIFT: u8 = 63;
const BINARY_AND: u8 = 64;
const BINARY_XOR: u8 = 65;
const BINARY_OR: u8 = 66;
const INPLACE_POWER: u8 = 67;
const INPLACE_LSHIFT: u8 = 75;
const INPLACE_RSHIFT: u8 = 76;
const INPLACE_AND: u8 = 77;
const INPLACE_XOR: u8 = 78;
const INPLACE_OR: u8 = 79;

const COMPARE_OP: u8 = 107;
const IS_OP: u8 = 117;
const CONTAINS_OP: u8 = 118;
const BINARY_OP: u8 = 122;

/// NB_* sub-opcode values for the unified 3.11 `BINARY_OP` (a subset:
/// augmented-assignment variants set bit 0x10, matching CPython's
/// `NB_INPLACE_ADD = NB_ADD | 0x10` encoding scheme).
mod nb {
    pub const ADD: i64 = 0;
    pub const AND: i64 = 1;
    pub const FLOOR_DIVIDE: i64 = 2;
    pub const LSHIFT: i64 = 3;
    pub const MULTIPLY: i64 = 5;
    pub const REMAINDER: i64 = 6;
    pub const OR: i64 = 7;
    pub const POWER: i64 = 8;
    pub const RSHIFT: i64 = 9;
    pub const SUBTRACT: i64 = 10;
    pub const TRUE_DIVIDE: i64 = 11;
    pub const XOR: i64 = 12;
}

pub(super) fn install(table: &mut OpTable, version: PyVersion) {
    table.set(UNARY_POSITIVE, "UNARY_POSITIVE", unary_positive);
    table.set(UNARY_NEGATIVE, "UNARY_NEGATIVE", unary_negative);
    table.set(UNARY_NOT, "UNARY_NOT", unary_not);
    table.set(UNARY_INVERT, "UNARY_INVERT", unary_invert);

    table.set(BINARY_ADD, "BINARY_ADD", |i, _| binop(i, Op::Add));
    table.set(BINARY_SUBTRACT, "BINARY_SUBTRACT", |i, _| binop(i, Op::Sub));
    table.set(BINARY_MULTIPLY, "BINARY_MULTIPLY", |i, _| binop(i, Op::Mul));
    table.set(BINARY_MODULO, "BINARY_MODULO", |i, _| binop(i, Op::Mod));
    table.set(BINARY_TRUE_DIVIDE, "BINARY_TRUE_DIVIDE", |i, _| binop(i, Op::TrueDiv));
    table.set(BINARY_FLOOR_DIVIDE, "BINARY_FLOOR_DIVIDE", |i, _| binop(i, Op::FloorDiv));
    table.set(BINARY_POWER, "BINARY_POWER", |i, _| binop(i, Op::Pow));
    table.set(BINARY_LSHIFT, "BINARY_LSHIFT", |i, _| binop(i, Op::LShift));
    table.set(BINARY_RSHIFT, "BINARY_RSHIFT", |i, _| binop(i, Op::RShift));
    table.set(BINARY_AND, "BINARY_AND", |i, _| binop(i, Op::BitAnd));
    table.set(BINARY_OR, "BINARY_OR", |i, _| binop(i, Op::BitOr));
    table.set(BINARY_XOR, "BINARY_XOR", |i, _| binop(i, Op::BitXor));

    table.set(INPLACE_ADD, "INPLACE_ADD", |i, _| binop(i, Op::Add));
    table.set(INPLACE_SUBTRACT, "INPLACE_SUBTRACT", |i, _| binop(i, Op::Sub));
    table.set(INPLACE_MULTIPLY, "INPLACE_MULTIPLY", |i, _| binop(i, Op::Mul));
    table.set(INPLACE_MODULO, "INPLACE_MODULO", |i, _| binop(i, Op::Mod));
    table.set(INPLACE_TRUE_DIVIDE, "INPLACE_TRUE_DIVIDE", |i, _| binop(i, Op::TrueDiv));
    table.set(INPLACE_FLOOR_DIVIDE, "INPLACE_FLOOR_DIVIDE", |i, _| binop(i, Op::FloorDiv));
    table.set(INPLACE_POWER, "INPLACE_POWER", |i, _| binop(i, Op::Pow));
    table.set(INPLACE_LSHIFT, "INPLACE_LSHIFT", |i, _| binop(i, Op::LShift));
    table.set(INPLACE_RSHIFT, "INPLACE_RSHIFT", |i, _| binop(i, Op::RShift));
    table.set(INPLACE_AND, "INPLACE_AND", |i, _| binop(i, Op::BitAnd));
    table.set(INPLACE_OR, "INPLACE_OR", |i, _| binop(i, Op::BitOr));
    table.set(INPLACE_XOR, "INPLACE_XOR", |i, _| binop(i, Op::BitXor));

    table.set(COMPARE_OP, "COMPARE_OP", compare_op);

    if version >= PyVersion::V3_9 {
        table.set(IS_OP, "IS_OP", is_op);
        table.set(CONTAINS_OP, "CONTAINS_OP", contains_op);
    }
    if version >= PyVersion::V3_11 {
        table.set(BINARY_OP, "BINARY_OP", binary_op_unified);
    }
}

#[derive(Clone, Copy)]
enum Op {
    Add,
    Sub,
    Mul,
    Mod,
    TrueDiv,
    FloorDiv,
    Pow,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
}

fn frame_mut(interp: &mut Interpreter) -> RunResult<&mut crate::frame::Frame> {
    interp.frame.as_mut().ok_or_else(|| EngineError::InvariantViolation { detail: "opcode handler with no active frame".into() }.into())
}

fn unary_positive(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let v = frame.pop();
    let out = match v {
        Value::Int(_) | Value::Float(_) => v,
        Value::Bool(b) => Value::Int(b as i64),
        other => return Err(type_err(interp, "unary +", other)),
    };
    frame_mut(interp)?.push(out);
    Ok(Signal::Normal)
}

fn unary_negative(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let v = frame.pop();
    let out = match v {
        Value::Int(i) => Value::Int(-i),
        Value::Float(f) => Value::Float(-f),
        Value::Bool(b) => Value::Int(-(b as i64)),
        other => return Err(type_err(interp, "unary -", other)),
    };
    frame_mut(interp)?.push(out);
    Ok(Signal::Normal)
}

fn unary_not(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let v = frame.pop();
    let truthy = v.truthy(&interp.heap);
    frame_mut(interp)?.push(Value::Bool(!truthy));
    Ok(Signal::Normal)
}

fn unary_invert(interp: &mut Interpreter, _arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let v = frame.pop();
    let out = match v {
        Value::Int(i) => Value::Int(!i),
        Value::Bool(b) => Value::Int(!(b as i64)),
        other => return Err(type_err(interp, "unary ~", other)),
    };
    frame_mut(interp)?.push(out);
    Ok(Signal::Normal)
}

fn type_err(interp: &Interpreter, what: &str, v: Value) -> RunError {
    RunError::raise(ExcType::TypeError, format!("bad operand type for {what}: '{}'", v.type_name(&interp.heap)))
}

/// `BINARY_OP(nb_op)` (3.11+): a single opcode carrying which numeric
/// operator to apply, with bit `0x10` set for the augmented-assignment form
/// (spec.md §9 "Opcode tables via deletion" — unify rather than duplicate).
fn binary_op_unified(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let op = match arg & !0x10 {
        nb::ADD => Op::Add,
        nb::SUBTRACT => Op::Sub,
        nb::MULTIPLY => Op::Mul,
        nb::REMAINDER => Op::Mod,
        nb::TRUE_DIVIDE => Op::TrueDiv,
        nb::FLOOR_DIVIDE => Op::FloorDiv,
        nb::POWER => Op::Pow,
        nb::LSHIFT => Op::LShift,
        nb::RSHIFT => Op::RShift,
        nb::AND => Op::BitAnd,
        nb::OR => Op::BitOr,
        nb::XOR => Op::BitXor,
        _ => return Err(EngineError::NotImplemented { opcode_name: "BINARY_OP (unrecognized nb_op)" }.into()),
    };
    binop(interp, op)
}

fn binop(interp: &mut Interpreter, op: Op) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let rhs = frame.pop();
    let lhs = frame.pop();
    let result = apply_binop(interp, op, lhs, rhs)?;
    frame_mut(interp)?.push(result);
    Ok(Signal::Normal)
}

fn apply_binop(interp: &mut Interpreter, op: Op, lhs: Value, rhs: Value) -> RunResult<Value> {
    if let (Some(a), Some(b)) = (as_number(lhs), as_number(rhs)) {
        return numeric_binop(interp, op, a, b);
    }
    // str/list/tuple concatenation and repetition, the only non-numeric
    // overloads this engine models (spec.md Non-goals: full operator
    // overloading / `__add__` dispatch on user classes).
    match (op, lhs, rhs) {
        (Op::Add, Value::Ref(a), Value::Ref(b)) => match (interp.heap.get(a).clone(), interp.heap.get(b).clone()) {
            (HeapData::Str(x), HeapData::Str(y)) => Ok(Value::Ref(interp.heap.allocate(HeapData::Str(x + &y)))),
            (HeapData::List(PyList(mut x)), HeapData::List(PyList(y))) => {
                x.extend(y);
                Ok(Value::Ref(interp.heap.allocate(HeapData::List(PyList(x)))))
            }
            (HeapData::Tuple(mut x), HeapData::Tuple(y)) => {
                x.extend(y);
                Ok(Value::Ref(interp.heap.allocate(HeapData::Tuple(x))))
            }
            (x, y) => Err(RunError::raise(ExcType::TypeError, format!("unsupported operand type(s) for +: '{}' and '{}'", x.type_name(), y.type_name()))),
        },
        (Op::Mul, Value::Ref(a), Value::Int(n)) | (Op::Mul, Value::Int(n), Value::Ref(a)) => match interp.heap.get(a).clone() {
            HeapData::Str(s) => Ok(Value::Ref(interp.heap.allocate(HeapData::Str(s.repeat(n.max(0) as usize))))),
            HeapData::List(PyList(items)) => {
                let repeated = items.iter().cloned().cycle().take(items.len() * n.max(0) as usize).collect();
                Ok(Value::Ref(interp.heap.allocate(HeapData::List(PyList(repeated)))))
            }
            HeapData::Tuple(items) => {
                let repeated: Vec<Value> = items.iter().cloned().cycle().take(items.len() * n.max(0) as usize).collect();
                Ok(Value::Ref(interp.heap.allocate(HeapData::Tuple(repeated))))
            }
            other => Err(RunError::raise(ExcType::TypeError, format!("can't multiply sequence by non-int of type '{}'", other.type_name()))),
        },
        (_, l, r) => Err(RunError::raise(ExcType::TypeError, format!("unsupported operand type(s): '{}' and '{}'", l.type_name(&interp.heap), r.type_name(&interp.heap)))),
    }
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn as_number(v: Value) -> Option<Num> {
    match v {
        Value::Int(i) => Some(Num::Int(i)),
        Value::Bool(b) => Some(Num::Int(b as i64)),
        Value::Float(f) => Some(Num::Float(f)),
        _ => None,
    }
}

fn numeric_binop(interp: &Interpreter, op: Op, a: Num, b: Num) -> RunResult<Value> {
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        return int_binop(interp, op, x, y);
    }
    let x = match a {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    };
    let y = match b {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    };
    let result = match op {
        Op::Add => x + y,
        Op::Sub => x - y,
        Op::Mul => x * y,
        Op::TrueDiv => {
            if y == 0.0 {
                return Err(RunError::raise(ExcType::ZeroDivisionError, "float division by zero"));
            }
            x / y
        }
        Op::FloorDiv => {
            if y == 0.0 {
                return Err(RunError::raise(ExcType::ZeroDivisionError, "float floor division by zero"));
            }
            (x / y).floor()
        }
        Op::Mod => {
            if y == 0.0 {
                return Err(RunError::raise(ExcType::ZeroDivisionError, "float modulo"));
            }
            x - y * (x / y).floor()
        }
        Op::Pow => x.powf(y),
        Op::LShift | Op::RShift | Op::BitAnd | Op::BitOr | Op::BitXor => {
            let _ = interp;
            return Err(RunError::raise(ExcType::TypeError, "unsupported operand type(s) for bitwise operator: 'float'"));
        }
    };
    Ok(Value::Float(result))
}

/// Python's `//`/`%` round toward negative infinity (floored), not toward
/// zero like `div_euclid`/`rem_euclid` (which are always non-negative
/// remainders). The remainder's sign must match the divisor's, e.g.
/// `7 // -2 == -4` and `7 % -2 == -1`.
fn floored_divmod(x: i64, y: i64) -> (i64, i64) {
    let q = x.div_euclid(y);
    let r = x - q * y;
    if r != 0 && (r < 0) != (y < 0) {
        (q - 1, r + y)
    } else {
        (q, r)
    }
}

fn int_binop(interp: &Interpreter, op: Op, x: i64, y: i64) -> RunResult<Value> {
    let _ = interp;
    Ok(match op {
        Op::Add => Value::Int(x.wrapping_add(y)),
        Op::Sub => Value::Int(x.wrapping_sub(y)),
        Op::Mul => Value::Int(x.wrapping_mul(y)),
        Op::TrueDiv => {
            if y == 0 {
                return Err(RunError::raise(ExcType::ZeroDivisionError, "division by zero"));
            }
            Value::Float(x as f64 / y as f64)
        }
        Op::FloorDiv => {
            if y == 0 {
                return Err(RunError::raise(ExcType::ZeroDivisionError, "integer division or modulo by zero"));
            }
            Value::Int(floored_divmod(x, y).0)
        }
        Op::Mod => {
            if y == 0 {
                return Err(RunError::raise(ExcType::ZeroDivisionError, "integer division or modulo by zero"));
            }
            Value::Int(floored_divmod(x, y).1)
        }
        Op::Pow => {
            if y >= 0 {
                Value::Int(x.wrapping_pow(y as u32))
            } else {
                Value::Float((x as f64).powf(y as f64))
            }
        }
        Op::LShift => {
            if y < 0 {
                return Err(RunError::raise(ExcType::ValueError, "negative shift count"));
            }
            Value::Int(x.wrapping_shl(y as u32))
        }
        Op::RShift => {
            if y < 0 {
                return Err(RunError::raise(ExcType::ValueError, "negative shift count"));
            }
            Value::Int(x.wrapping_shr(y as u32))
        }
        Op::BitAnd => Value::Int(x & y),
        Op::BitOr => Value::Int(x | y),
        Op::BitXor => Value::Int(x ^ y),
    })
}

/// `COMPARE_OP`: the six rich comparisons. 3.12 packs the comparator index
/// into the high four bits of the immediate rather than using it directly
/// (spec.md §4.2 "COMPARE_OP in 3.12 decodes its index from the high four
/// bits of the immediate, in prior versions, the low bits").
fn compare_op(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let version = interp.config.version;
    let idx = if version >= PyVersion::V3_12 { (arg >> 4) & 0xF } else { arg & 0xF };
    let frame = frame_mut(interp)?;
    let rhs = frame.pop();
    let lhs = frame.pop();
    let result = match idx {
        0 => py_lt(interp, lhs, rhs)?,
        1 => !py_gt(interp, lhs, rhs)?,
        2 => interp.heap.values_equal(lhs, rhs),
        3 => !interp.heap.values_equal(lhs, rhs),
        4 => py_gt(interp, lhs, rhs)?,
        5 => !py_lt(interp, lhs, rhs)?,
        6 => py_contains(interp, rhs, lhs)?,
        7 => !py_contains(interp, rhs, lhs)?,
        8 => lhs.is_identical(rhs),
        9 => !lhs.is_identical(rhs),
        _ => return Err(EngineError::NotImplemented { opcode_name: "COMPARE_OP (unrecognized comparator)" }.into()),
    };
    frame_mut(interp)?.push(Value::Bool(result));
    Ok(Signal::Normal)
}

fn is_op(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let rhs = frame.pop();
    let lhs = frame.pop();
    let identical = lhs.is_identical(rhs);
    let result = if arg != 0 { !identical } else { identical };
    frame_mut(interp)?.push(Value::Bool(result));
    Ok(Signal::Normal)
}

fn contains_op(interp: &mut Interpreter, arg: i64) -> RunResult<Signal> {
    let frame = frame_mut(interp)?;
    let rhs = frame.pop();
    let lhs = frame.pop();
    let found = py_contains(interp, rhs, lhs)?;
    let result = if arg != 0 { !found } else { found };
    frame_mut(interp)?.push(Value::Bool(result));
    Ok(Signal::Normal)
}

fn py_contains(interp: &mut Interpreter, container: Value, item: Value) -> RunResult<bool> {
    match container {
        Value::Ref(id) => match interp.heap.get(id).clone() {
            HeapData::Tuple(items) | HeapData::List(PyList(items)) => Ok(items.iter().any(|v| interp.heap.values_equal(*v, item))),
            HeapData::Set(PySet(items)) | HeapData::FrozenSet(PyFrozenSet(items)) => {
                Ok(items.iter().any(|v| interp.heap.values_equal(*v, item)))
            }
            HeapData::Dict(d) | HeapData::Namespace(d) => Ok(d.iter().any(|(k, _)| interp.heap.values_equal(*k, item))),
            HeapData::Str(haystack) => match item {
                Value::Ref(needle_id) => match interp.heap.get(needle_id) {
                    HeapData::Str(needle) => Ok(haystack.contains(needle.as_str())),
                    other => Err(RunError::raise(ExcType::TypeError, format!("'in <string>' requires string as left operand, not {}", other.type_name()))),
                },
                other => Err(RunError::raise(ExcType::TypeError, format!("'in <string>' requires string as left operand, not {}", other.type_name(&interp.heap)))),
            },
            other => Err(RunError::raise(ExcType::TypeError, format!("argument of type '{}' is not iterable", other.type_name()))),
        },
        other => Err(RunError::raise(ExcType::TypeError, format!("argument of type '{}' is not iterable", other.type_name(&interp.heap)))),
    }
}

fn py_lt(interp: &Interpreter, lhs: Value, rhs: Value) -> RunResult<bool> {
    ordering(interp, lhs, rhs).map(|o| o == std::cmp::Ordering::Less)
}

fn py_gt(interp: &Interpreter, lhs: Value, rhs: Value) -> RunResult<bool> {
    ordering(interp, lhs, rhs).map(|o| o == std::cmp::Ordering::Greater)
}

fn ordering(interp: &Interpreter, lhs: Value, rhs: Value) -> RunResult<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (as_number(lhs), as_number(rhs)) {
        let (x, y) = match (a, b) {
            (Num::Int(x), Num::Int(y)) => return Ok(x.cmp(&y)),
            (Num::Int(x), Num::Float(y)) => (x as f64, y),
            (Num::Float(x), Num::Int(y)) => (x, y as f64),
            (Num::Float(x), Num::Float(y)) => (x, y),
        };
        return x.partial_cmp(&y).ok_or_else(|| RunError::raise(ExcType::ValueError, "cannot order NaN"));
    }
    if let (Value::Ref(a), Value::Ref(b)) = (lhs, rhs) {
        match (interp.heap.get(a), interp.heap.get(b)) {
            (HeapData::Str(x), HeapData::Str(y)) => return Ok(x.cmp(y)),
            (HeapData::Tuple(x), HeapData::Tuple(y)) | (HeapData::List(PyList(x)), HeapData::List(PyList(y))) => {
                return compare_sequences(interp, x, y);
            }
            _ => {}
        }
    }
    Err(RunError::raise(
        ExcType::TypeError,
        format!("'<' not supported between instances of '{}' and '{}'", lhs.type_name(&interp.heap), rhs.type_name(&interp.heap)),
    ))
}

fn compare_sequences(interp: &Interpreter, x: &[Value], y: &[Value]) -> RunResult<std::cmp::Ordering> {
    for (a, b) in x.iter().zip(y.iter()) {
        let ord = ordering(interp, *a, *b)?;
        if ord != std::cmp::Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(x.len().cmp(&y.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::version::PyVersion;

    fn interp() -> Interpreter {
        Interpreter::with_stdout(RunConfig::new(PyVersion::V3_10), Box::new(Vec::new()))
    }

    #[test]
    fn floor_division_matches_python_rounding() {
        let mut i = interp();
        let result = apply_binop(&mut i, Op::FloorDiv, Value::Int(-7), Value::Int(2)).unwrap();
        assert_eq!(result, Value::Int(-4));
        let modulo = apply_binop(&mut i, Op::Mod, Value::Int(-7), Value::Int(2)).unwrap();
        assert_eq!(modulo, Value::Int(1));
    }

    #[test]
    fn floor_division_with_negative_divisor_rounds_toward_negative_infinity() {
        let mut i = interp();
        let result = apply_binop(&mut i, Op::FloorDiv, Value::Int(7), Value::Int(-2)).unwrap();
        assert_eq!(result, Value::Int(-4));
        let modulo = apply_binop(&mut i, Op::Mod, Value::Int(7), Value::Int(-2)).unwrap();
        assert_eq!(modulo, Value::Int(-1));
    }

    #[test]
    fn floor_division_with_mixed_signs_matches_python() {
        let mut i = interp();
        let result = apply_binop(&mut i, Op::FloorDiv, Value::Int(-7), Value::Int(-2)).unwrap();
        assert_eq!(result, Value::Int(3));
        let modulo = apply_binop(&mut i, Op::Mod, Value::Int(-7), Value::Int(-2)).unwrap();
        assert_eq!(modulo, Value::Int(-1));
    }

    #[test]
    fn division_by_zero_raises_zero_division_error() {
        let mut i = interp();
        let err = apply_binop(&mut i, Op::TrueDiv, Value::Int(1), Value::Int(0)).unwrap_err();
        assert!(matches!(err, RunError::Exception(e) if e.0.exc_type == ExcType::ZeroDivisionError));
    }

    #[test]
    fn negative_shift_count_raises_value_error() {
        let mut i = interp();
        let lshift_err = apply_binop(&mut i, Op::LShift, Value::Int(1), Value::Int(-1)).unwrap_err();
        assert!(matches!(lshift_err, RunError::Exception(e) if e.0.exc_type == ExcType::ValueError));
        let rshift_err = apply_binop(&mut i, Op::RShift, Value::Int(1), Value::Int(-1)).unwrap_err();
        assert!(matches!(rshift_err, RunError::Exception(e) if e.0.exc_type == ExcType::ValueError));
    }

    #[test]
    fn string_concatenation_allocates_a_new_heap_string() {
        let mut i = interp();
        let a = Value::Ref(i.heap.allocate(HeapData::Str("foo".into())));
        let b = Value::Ref(i.heap.allocate(HeapData::Str("bar".into())));
        let result = apply_binop(&mut i, Op::Add, a, b).unwrap();
        assert_eq!(result.py_str(&i.heap, &i.interns), "foobar");
    }

    #[test]
    fn ordering_compares_sequences_lexicographically() {
        let i = interp();
        assert!(py_lt(&i, Value::Int(1), Value::Float(1.5)).unwrap());
        assert!(!py_lt(&i, Value::Int(2), Value::Int(2)).unwrap());
    }
}
