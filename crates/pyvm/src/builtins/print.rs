//! Implementation of the `print()` builtin function.

use log::trace;

use crate::exceptions::RunResult;
use crate::interp::Interpreter;
use crate::intern::StringId;
use crate::value::Value;

pub fn native_print(interp: &mut Interpreter, args: Vec<Value>, kwargs: Vec<(StringId, Value)>) -> RunResult<Value> {
    let sep = kwarg_str(interp, &kwargs, "sep").unwrap_or_else(|| " ".to_string());
    let end = kwarg_str(interp, &kwargs, "end").unwrap_or_else(|| "\n".to_string());

    let rendered = args.iter().map(|v| v.py_str(&interp.heap, &interp.interns)).collect::<Vec<_>>().join(&sep);
    trace!("print: {rendered:?}{end:?}");
    use std::io::Write;
    let _ = write!(interp.stdout, "{rendered}{end}");
    Ok(Value::None)
}

fn kwarg_str(interp: &Interpreter, kwargs: &[(StringId, Value)], name: &str) -> Option<String> {
    kwargs.iter().find(|(k, _)| interp.interns.get(*k) == name).map(|(_, v)| v.py_str(&interp.heap, &interp.interns))
}
