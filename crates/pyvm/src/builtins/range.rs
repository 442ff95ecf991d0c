//! Implementation of the `range()` builtin function.
//!
//! Ranges are realized eagerly into a `List` rather than kept as a lazy
//! iterator type: the engine has no dedicated `Range` value kind (spec.md §3
//! does not list one), and eager realization is observationally identical
//! for every finite range a test program constructs.

use crate::exceptions::{ExcType, RunResult, RunError};
use crate::heap::HeapData;
use crate::interp::Interpreter;
use crate::intern::StringId;
use crate::types::PyList;
use crate::value::Value;

pub fn native_range(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let ints: RunResult<Vec<i64>> = args.iter().map(|v| as_int(*v, interp)).collect();
    let (start, stop, step) = match ints?.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(RunError::raise(ExcType::TypeError, "range expected 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(RunError::raise(ExcType::ValueError, "range() arg 3 must not be zero"));
    }
    let mut items = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        items.push(Value::Int(i));
        i += step;
    }
    let id = interp.heap.allocate(HeapData::List(PyList(items)));
    Ok(Value::Ref(id))
}

fn as_int(value: Value, interp: &Interpreter) -> RunResult<i64> {
    match value {
        Value::Int(i) => Ok(i),
        Value::Bool(b) => Ok(b as i64),
        other => Err(RunError::raise(
            ExcType::TypeError,
            format!("'{}' object cannot be interpreted as an integer", other.type_name(&interp.heap)),
        )),
    }
}
