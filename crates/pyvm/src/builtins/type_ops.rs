//! Small builtins grouped together since each is a handful of lines:
//! `type`, `str`, `repr`, `isinstance`, `abs`, `min`, `max`, `sum`, `int`,
//! `float`, `bool`, `list`, `dict`, `tuple`, `enumerate`.

use crate::exceptions::{ExcType, RunError, RunResult};
use crate::heap::HeapData;
use crate::interp::Interpreter;
use crate::intern::StringId;
use crate::object::Class;
use crate::types::{PyDict, PyList};
use crate::value::Value;

pub fn native_type(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let Some(value) = args.into_iter().next() else {
        return Err(RunError::raise(ExcType::TypeError, "type() takes 1 argument"));
    };
    if let Value::Ref(id) = value {
        if let HeapData::Instance(inst) = interp.heap.get(id) {
            if let Some(class_id) = inst.class {
                return Ok(Value::Ref(class_id));
            }
        }
    }
    let name = value.type_name(&interp.heap);
    let class = Class { name: interp.interns.intern(name), bases: vec![], namespace: Default::default(), metaclass: None };
    Ok(Value::Ref(interp.heap.allocate(HeapData::Class(class))))
}

pub fn native_str(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let value = args.into_iter().next().unwrap_or(Value::None);
    let s = value.py_str(&interp.heap, &interp.interns);
    Ok(Value::Ref(interp.heap.allocate(HeapData::Str(s))))
}

pub fn native_repr(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let value = args.into_iter().next().unwrap_or(Value::None);
    let s = value.py_repr(&interp.heap, &interp.interns);
    Ok(Value::Ref(interp.heap.allocate(HeapData::Str(s))))
}

pub fn native_isinstance(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let mut it = args.into_iter();
    let (Some(value), Some(class_val)) = (it.next(), it.next()) else {
        return Err(RunError::raise(ExcType::TypeError, "isinstance() takes exactly 2 arguments"));
    };
    let Value::Ref(class_id) = class_val else {
        return Err(RunError::raise(ExcType::TypeError, "isinstance() arg 2 must be a type"));
    };
    let HeapData::Class(target) = interp.heap.get(class_id) else {
        return Err(RunError::raise(ExcType::TypeError, "isinstance() arg 2 must be a type"));
    };
    let target_name = interp.interns.get(target.name).to_string();
    let result = match value {
        Value::Ref(id) => match interp.heap.get(id) {
            HeapData::Instance(inst) => inst.class.is_some_and(|cid| class_is_or_subclasses(interp, cid, class_id)),
            other => other.type_name() == target_name,
        },
        other => other.type_name(&interp.heap) == target_name,
    };
    Ok(Value::Bool(result))
}

fn class_is_or_subclasses(interp: &Interpreter, class_id: crate::heap::ObjectId, target_id: crate::heap::ObjectId) -> bool {
    if class_id == target_id {
        return true;
    }
    if let HeapData::Class(class) = interp.heap.get(class_id) {
        return class.mro(&interp.heap).contains(&target_id);
    }
    false
}

pub fn native_abs(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    match args.into_iter().next() {
        Some(Value::Int(i)) => Ok(Value::Int(i.abs())),
        Some(Value::Float(f)) => Ok(Value::Float(f.abs())),
        Some(other) => Err(RunError::raise(ExcType::TypeError, format!("bad operand type for abs(): '{}'", other.type_name(&interp.heap)))),
        None => Err(RunError::raise(ExcType::TypeError, "abs() takes exactly one argument (0 given)")),
    }
}

pub fn native_min(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    extremum(interp, args, true)
}

pub fn native_max(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    extremum(interp, args, false)
}

fn extremum(interp: &mut Interpreter, args: Vec<Value>, want_min: bool) -> RunResult<Value> {
    let items = iterable_items(interp, args)?;
    let mut best = items.into_iter();
    let Some(mut acc) = best.next() else {
        return Err(RunError::raise(ExcType::ValueError, "min()/max() arg is an empty sequence"));
    };
    for v in best {
        let replace = numeric_lt(acc, v) == want_min;
        if replace {
            acc = v;
        }
    }
    Ok(acc)
}

fn numeric_lt(a: Value, b: Value) -> bool {
    to_f64(a) < to_f64(b)
}

fn to_f64(v: Value) -> f64 {
    match v {
        Value::Int(i) => i as f64,
        Value::Float(f) => f,
        Value::Bool(b) => b as i64 as f64,
        _ => f64::NAN,
    }
}

pub fn native_sum(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let items = iterable_items(interp, args)?;
    let mut total_i: i64 = 0;
    let mut total_f: f64 = 0.0;
    let mut is_float = false;
    for v in items {
        match v {
            Value::Int(i) => total_i += i,
            Value::Float(f) => {
                is_float = true;
                total_f += f;
            }
            Value::Bool(b) => total_i += b as i64,
            other => return Err(RunError::raise(ExcType::TypeError, format!("unsupported operand type(s) for +: 'int' and '{}'", other.type_name(&interp.heap)))),
        }
    }
    Ok(if is_float { Value::Float(total_f + total_i as f64) } else { Value::Int(total_i) })
}

/// Takes the sole positional argument and returns its element `Value`s,
/// covering the list/tuple/set cases the other small builtins need — full
/// general iterator-protocol dispatch lives in `crate::call`'s `FOR_ITER`
/// support, not duplicated here.
fn iterable_items(interp: &mut Interpreter, args: Vec<Value>) -> RunResult<Vec<Value>> {
    let Some(value) = args.into_iter().next() else {
        return Err(RunError::raise(ExcType::TypeError, "expected exactly one iterable argument"));
    };
    match value {
        Value::Ref(id) => match interp.heap.get(id) {
            HeapData::List(l) => Ok(l.0.clone()),
            HeapData::Tuple(t) => Ok(t.clone()),
            HeapData::Set(s) => Ok(s.0.clone()),
            other => Err(RunError::raise(ExcType::TypeError, format!("'{}' object is not iterable", other.type_name()))),
        },
        other => Err(RunError::raise(ExcType::TypeError, format!("'{}' object is not iterable", other.type_name(&interp.heap)))),
    }
}

pub fn native_int(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    match args.into_iter().next() {
        Some(Value::Int(i)) => Ok(Value::Int(i)),
        Some(Value::Float(f)) => Ok(Value::Int(f as i64)),
        Some(Value::Bool(b)) => Ok(Value::Int(b as i64)),
        Some(Value::Ref(id)) => match interp.heap.get(id) {
            HeapData::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| RunError::raise(ExcType::ValueError, format!("invalid literal for int() with base 10: {s:?}"))),
            _ => Err(RunError::raise(ExcType::TypeError, "int() argument must be a string or a number")),
        },
        None => Ok(Value::Int(0)),
    }
}

pub fn native_float(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    match args.into_iter().next() {
        Some(Value::Int(i)) => Ok(Value::Float(i as f64)),
        Some(Value::Float(f)) => Ok(Value::Float(f)),
        Some(Value::Ref(id)) => match interp.heap.get(id) {
            HeapData::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| RunError::raise(ExcType::ValueError, format!("could not convert string to float: {s:?}"))),
            _ => Err(RunError::raise(ExcType::TypeError, "float() argument must be a string or a number")),
        },
        None => Ok(Value::Float(0.0)),
    }
}

pub fn native_bool(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let value = args.into_iter().next().unwrap_or(Value::Bool(false));
    Ok(Value::Bool(value.truthy(&interp.heap)))
}

pub fn native_list(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let items = if args.is_empty() { Vec::new() } else { iterable_items(interp, args)? };
    Ok(Value::Ref(interp.heap.allocate(HeapData::List(PyList(items)))))
}

pub fn native_tuple(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let items = if args.is_empty() { Vec::new() } else { iterable_items(interp, args)? };
    Ok(Value::Ref(interp.heap.allocate(HeapData::Tuple(items))))
}

pub fn native_dict(interp: &mut Interpreter, _args: Vec<Value>, kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let mut dict = PyDict::new();
    for (k, v) in kwargs {
        let key = Value::Ref(interp.heap.allocate(HeapData::Str(interp.interns.get(k).to_owned())));
        dict.set(key, v, &interp.heap);
    }
    Ok(Value::Ref(interp.heap.allocate(HeapData::Dict(dict))))
}

pub fn native_enumerate(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let items = iterable_items(interp, args)?;
    let pairs = items
        .into_iter()
        .enumerate()
        .map(|(i, v)| Value::Ref(interp.heap.allocate(HeapData::Tuple(vec![Value::Int(i as i64), v]))))
        .collect();
    Ok(Value::Ref(interp.heap.allocate(HeapData::List(PyList(pairs)))))
}
