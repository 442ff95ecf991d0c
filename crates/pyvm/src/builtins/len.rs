//! Implementation of the `len()` builtin function.

use crate::exceptions::{ExcType, RunResult, RunError};
use crate::heap::HeapData;
use crate::interp::Interpreter;
use crate::intern::StringId;
use crate::value::Value;

pub fn native_len(interp: &mut Interpreter, args: Vec<Value>, _kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let Some(value) = args.into_iter().next() else {
        return Err(RunError::raise(ExcType::TypeError, "len() takes exactly one argument (0 given)"));
    };
    let length = match value {
        Value::Ref(id) => match interp.heap.get(id) {
            HeapData::Str(s) => s.chars().count(),
            HeapData::Bytes(b) => b.len(),
            HeapData::Tuple(t) => t.len(),
            HeapData::List(l) => l.len(),
            HeapData::Dict(d) | HeapData::Namespace(d) => d.len(),
            HeapData::Set(s) => s.0.len(),
            HeapData::FrozenSet(s) => s.0.len(),
            other => return Err(RunError::raise(ExcType::TypeError, format!("object of type '{}' has no len()", other.type_name()))),
        },
        other => return Err(RunError::raise(ExcType::TypeError, format!("object of type '{}' has no len()", other.type_name(&interp.heap)))),
    };
    Ok(Value::Int(length as i64))
}
