//! Call protocol (spec.md §4.3). Resolves a callable value plus its
//! positional/named arguments to either a freshly pushed interpreted
//! `Frame` or a direct native-function invocation.

use std::rc::Rc;

use ahash::AHashMap;

use crate::exceptions::{ExcType, RunError, RunResult};
use crate::frame::Frame;
use crate::heap::HeapData;
use crate::intern::StringId;
use crate::interp::Interpreter;
use crate::object::{BoundMethod, Function};
use crate::value::Value;

/// Outcome of resolving a call: either the value is already available (a
/// native call already ran) or a new frame was pushed and the interpreter
/// loop should resume dispatch there (spec.md §4.3 resolution step 1).
pub enum CallOutcome {
    Value(Value),
    PushedFrame,
}

/// Given `(callable, positional, named)`, performs spec.md §4.3's seven-step
/// resolution. `callable` must already have been popped off the value
/// stack by the `CALL_*`/`CALL`/`PRECALL` handler that calls this.
pub fn call(interp: &mut Interpreter, callable: Value, positional: Vec<Value>, named: Vec<(StringId, Value)>) -> RunResult<CallOutcome> {
    let Value::Ref(id) = callable else {
        return Err(RunError::raise(ExcType::TypeError, format!("'{}' object is not callable", callable.type_name(&interp.heap))));
    };

    // Step 5: zero-argument `super()` — intercepted before we even look at
    // the heap kind dispatch below, since `super` is represented as a
    // sentinel rather than a regular NativeFunction (spec.md §4.6).
    if matches!(interp.heap.get(id), HeapData::SuperSentinel) {
        let value = crate::classbuild::zero_arg_super(interp, &positional)?;
        return Ok(CallOutcome::Value(value));
    }
    if matches!(interp.heap.get(id), HeapData::BuildClassSentinel) {
        let value = crate::classbuild::build_class(interp, positional)?;
        return Ok(CallOutcome::Value(value));
    }

    match interp.heap.get(id).clone() {
        HeapData::Function(func) => {
            let code = Rc::new(func.code.as_ref().clone());
            call_function_value(interp, code, &func, positional, named)
        }
        HeapData::BoundMethod(BoundMethod { receiver, func }) => {
            let mut full_positional = Vec::with_capacity(positional.len() + 1);
            full_positional.push(receiver);
            full_positional.extend(positional);
            let HeapData::Function(func) = interp.heap.get(func).clone() else {
                return Err(RunError::raise(ExcType::TypeError, "bound method target is not a function"));
            };
            let code = func.code.clone();
            call_function_value(interp, code, &func, full_positional, named)
        }
        HeapData::Class(_) => {
            let value = construct_instance(interp, id, positional, named)?;
            Ok(CallOutcome::Value(value))
        }
        HeapData::NativeFunction(native) => {
            let value = (native.func)(interp, positional, named)?;
            Ok(CallOutcome::Value(value))
        }
        other => Err(RunError::raise(ExcType::TypeError, format!("'{}' object is not callable", other.type_name()))),
    }
}

/// Dispatches a resolved `Function` value: a plain function body pushes and
/// runs as a frame, but a generator function (`code.is_generator()`) instead
/// produces a suspended [`crate::object::Generator`] without executing a
/// single instruction of its body (spec.md §3 "Generator", §4.3 step 2).
fn call_function_value(interp: &mut Interpreter, code: Rc<crate::code::CodeObject>, func: &Function, positional: Vec<Value>, named: Vec<(StringId, Value)>) -> RunResult<CallOutcome> {
    if code.is_generator() {
        let frame = build_bound_frame(interp, code, func, positional, named)?;
        let generator = crate::object::Generator { frame: Some(frame), state: crate::object::GeneratorState::Created };
        let id = interp.heap.allocate(HeapData::Generator(Box::new(generator)));
        Ok(CallOutcome::Value(Value::Ref(id)))
    } else {
        push_function_frame(interp, code, func, positional, named)?;
        Ok(CallOutcome::PushedFrame)
    }
}

fn build_bound_frame(interp: &mut Interpreter, code: Rc<crate::code::CodeObject>, func: &Function, positional: Vec<Value>, named: Vec<(StringId, Value)>) -> RunResult<Frame> {
    if interp.frame_depth() >= interp.config.recursion_limit {
        return Err(RunError::Engine(crate::exceptions::EngineError::RecursionLimitExceeded { limit: interp.config.recursion_limit }));
    }

    let locals_id = interp.heap.allocate(HeapData::Namespace(crate::types::PyDict::new()));
    let depth = interp.frame_depth() + 1;
    let mut frame = Frame::new(code.clone(), func.globals, interp.builtins_for(func.globals), locals_id, depth);

    bind_arguments(interp, &code, func, positional, named, &mut frame)?;
    bind_closure(interp, &code, func, &mut frame);
    Ok(frame)
}

fn push_function_frame(
    interp: &mut Interpreter,
    code: Rc<crate::code::CodeObject>,
    func: &Function,
    positional: Vec<Value>,
    named: Vec<(StringId, Value)>,
) -> RunResult<()> {
    let frame = build_bound_frame(interp, code, func, positional, named)?;
    interp.push_frame(frame);
    Ok(())
}

/// Argument binding (spec.md §4.3 "Argument binding (interpreted function)").
fn bind_arguments(
    interp: &mut Interpreter,
    code: &crate::code::CodeObject,
    func: &Function,
    mut positional: Vec<Value>,
    mut named: Vec<(StringId, Value)>,
    frame: &mut Frame,
) -> RunResult<()> {
    if code.has_dot_zero {
        let dot_zero = interp.well_known.dot_zero;
        let iterable = positional.first().copied().ok_or_else(|| {
            RunError::raise(ExcType::TypeError, "comprehension function missing implicit '.0' argument")
        })?;
        set_local(interp, frame, dot_zero, iterable);
        return Ok(());
    }

    let total_named_params = code.named_param_count() as usize;
    let n_positional_params = code.co_argcount as usize;

    // Positional-or-keyword and positional-only slots.
    for (i, varname) in code.co_varnames.iter().take(n_positional_params).enumerate() {
        let value = if i < positional.len() {
            Some(positional[i])
        } else {
            named_remove(&mut named, *varname, interp)
        };
        match value {
            Some(v) => set_local(interp, frame, *varname, v),
            None => {
                if let Some(default) = default_for(func, i, n_positional_params) {
                    set_local(interp, frame, *varname, default);
                } else {
                    return Err(RunError::raise(
                        ExcType::TypeError,
                        format!("{}() missing required positional argument: '{}'", interp.interns.get(func.name), interp.interns.get(*varname)),
                    ));
                }
            }
        }
    }

    let extra_positional: Vec<Value> = if positional.len() > n_positional_params {
        positional.split_off(n_positional_params)
    } else {
        Vec::new()
    };

    if code.is_varargs() {
        let varname = code.co_varnames[total_named_params];
        let tuple_id = interp.heap.allocate(HeapData::Tuple(extra_positional));
        set_local(interp, frame, varname, Value::Ref(tuple_id));
    } else if !extra_positional.is_empty() {
        return Err(RunError::raise(
            ExcType::TypeError,
            format!("{}() takes {} positional arguments but {} were given", interp.interns.get(func.name), n_positional_params, n_positional_params + extra_positional.len()),
        ));
    }

    // Keyword-only slots.
    for (i, varname) in code.co_varnames.iter().skip(n_positional_params).take(code.co_kwonlyargcount as usize).enumerate() {
        match named_remove(&mut named, *varname, interp) {
            Some(v) => set_local(interp, frame, *varname, v),
            None => match func.kwdefaults.get(varname).copied() {
                Some(v) => set_local(interp, frame, *varname, v),
                None => {
                    return Err(RunError::raise(
                        ExcType::TypeError,
                        format!("{}() missing required keyword-only argument: '{}'", interp.interns.get(func.name), interp.interns.get(*varname)),
                    ));
                }
            },
        }
        let _ = i;
    }

    if code.is_varkeywords() {
        let varname_index = total_named_params + if code.is_varargs() { 1 } else { 0 };
        let varname = code.co_varnames[varname_index];
        let mut dict = crate::types::PyDict::new();
        for (k, v) in named {
            let key = Value::Ref(interp.heap.allocate(HeapData::Str(interp.interns.get(k).to_owned())));
            dict.set(key, v, &interp.heap);
        }
        let dict_id = interp.heap.allocate(HeapData::Dict(dict));
        set_local(interp, frame, varname, Value::Ref(dict_id));
    } else if !named.is_empty() {
        let (k, _) = named[0];
        return Err(RunError::raise(
            ExcType::TypeError,
            format!("{}() got an unexpected keyword argument '{}'", interp.interns.get(func.name), interp.interns.get(k)),
        ));
    }

    Ok(())
}

fn default_for(func: &Function, param_index: usize, n_positional_params: usize) -> Option<Value> {
    let defaults_start = n_positional_params - func.defaults.len();
    if param_index >= defaults_start {
        func.defaults.get(param_index - defaults_start).copied()
    } else {
        None
    }
}

fn named_remove(named: &mut Vec<(StringId, Value)>, name: StringId, _interp: &Interpreter) -> Option<Value> {
    let pos = named.iter().position(|(k, _)| *k == name)?;
    Some(named.remove(pos).1)
}

fn set_local(interp: &mut Interpreter, frame: &mut Frame, name: StringId, value: Value) {
    let cell_id = frame.cells.get(&name).copied();
    set_local_by_id(interp, cell_id, frame.f_locals, name, value);
}

/// Writes a local by precomputed identity: `cell_id` (if the name is closed
/// over) takes priority over the locals namespace, mirroring [`set_local`]
/// but usable from opcode handlers that only hold `&mut Interpreter`, not a
/// borrowed `&mut Frame`.
pub(crate) fn set_local_by_id(interp: &mut Interpreter, cell_id: Option<crate::heap::ObjectId>, locals_id: crate::heap::ObjectId, name: StringId, value: Value) {
    if let Some(cell_id) = cell_id {
        if let HeapData::Cell(cell) = interp.heap.get_mut(cell_id) {
            cell.slot = Some(value);
            return;
        }
    }
    crate::heap::namespace_set(&mut interp.heap, &interp.interns, locals_id, name, value);
}

/// Allocates a cell per `co_cellvars` entry and resolves each `co_freevars`
/// entry from the defining function's closure tuple (spec.md §4.3 "Cell
/// variables referenced by inner closures are allocated").
fn bind_closure(interp: &mut Interpreter, code: &crate::code::CodeObject, func: &Function, frame: &mut Frame) {
    for name in &code.co_cellvars {
        let cell_id = interp.heap.allocate(HeapData::Cell(crate::value::Cell::empty()));
        frame.cells.insert(*name, cell_id);
    }
    for (name, cell_id) in code.co_freevars.iter().zip(&func.closure) {
        frame.cells.insert(*name, *cell_id);
    }
}

/// Class constructor protocol: metaclass resolution is out of scope for a
/// bare `Class` callable (that happens in `__build_class__`, spec.md §4.6);
/// calling an already-built class allocates an `Instance` and, if present,
/// runs `__init__` (spec.md §4.3 resolution step 3).
fn construct_instance(interp: &mut Interpreter, class_id: crate::heap::ObjectId, positional: Vec<Value>, named: Vec<(StringId, Value)>) -> RunResult<Value> {
    let instance = crate::object::Instance { class: Some(class_id), attrs: AHashMap::new() };
    let instance_id = interp.heap.allocate(HeapData::Instance(instance));
    let instance_value = Value::Ref(instance_id);

    let init_name = interp.well_known.init;
    let HeapData::Class(class) = interp.heap.get(class_id) else {
        return Err(RunError::raise(ExcType::TypeError, "not a class"));
    };
    if let Some(init) = class.lookup_method(init_name, &interp.heap) {
        if let Value::Ref(func_id) = init {
            if matches!(interp.heap.get(func_id), HeapData::Function(_)) {
                let HeapData::Function(func) = interp.heap.get(func_id).clone() else { unreachable!() };
                let mut full_positional = Vec::with_capacity(positional.len() + 1);
                full_positional.push(instance_value);
                full_positional.extend(positional);
                push_function_frame(interp, func.code.clone(), &func, full_positional, named)?;
                interp.run_until_current_frame_returns()?;
            }
        }
    }
    Ok(instance_value)
}

/// Attribute lookup used by `LOAD_ATTR`/`LOAD_METHOD`: instance dict first,
/// then the class's MRO (spec.md §4.6 class construction is what populates
/// the namespace this walks).
pub fn load_attr(interp: &mut Interpreter, receiver: Value, name: StringId) -> RunResult<Value> {
    let Value::Ref(id) = receiver else {
        return Err(RunError::raise(ExcType::AttributeError, format!("'{}' object has no attribute", receiver.type_name(&interp.heap))));
    };
    match interp.heap.get(id).clone() {
        HeapData::Instance(inst) => {
            if let Some(v) = inst.attrs.get(&name) {
                return Ok(*v);
            }
            if let Some(class_id) = inst.class {
                if let HeapData::Class(class) = interp.heap.get(class_id) {
                    if let Some(v) = class.lookup_method(name, &interp.heap) {
                        return bind_if_function(interp, v, receiver);
                    }
                }
            }
            Err(RunError::raise(ExcType::AttributeError, format!("object has no attribute '{}'", interp.interns.get(name))))
        }
        HeapData::Class(class) => {
            class.lookup_method(name, &interp.heap).ok_or_else(|| RunError::raise(ExcType::AttributeError, format!("type object has no attribute '{}'", interp.interns.get(name))))
        }
        other => Err(RunError::raise(ExcType::AttributeError, format!("'{}' object has no attribute '{}'", other.type_name(), interp.interns.get(name)))),
    }
}

fn bind_if_function(interp: &mut Interpreter, value: Value, receiver: Value) -> RunResult<Value> {
    if let Value::Ref(id) = value {
        if matches!(interp.heap.get(id), HeapData::Function(_)) {
            let bm = BoundMethod { receiver, func: id };
            return Ok(Value::Ref(interp.heap.allocate(HeapData::BoundMethod(bm))));
        }
    }
    Ok(value)
}

/// Allocates the heap value backing one of the names the call protocol
/// intercepts rather than resolving as an ordinary builtin (spec.md §4.3,
/// §4.6): `super` is a sentinel the call dispatcher special-cases, and
/// `exec`/`eval`/`compile`/`globals`/`locals` are native functions whose
/// implementation depends on the current frame rather than their arguments
/// alone. Returns `None` for any other name.
pub fn intercepted_name(heap: &mut crate::heap::Heap, name: &str) -> Option<Value> {
    let data = match name {
        "super" => HeapData::SuperSentinel,
        "exec" => HeapData::NativeFunction(crate::object::NativeFunction { name: "exec", func: native_exec }),
        "eval" => HeapData::NativeFunction(crate::object::NativeFunction { name: "eval", func: native_eval }),
        "compile" => HeapData::NativeFunction(crate::object::NativeFunction { name: "compile", func: native_compile }),
        "globals" => HeapData::NativeFunction(crate::object::NativeFunction { name: "globals", func: native_globals }),
        "locals" => HeapData::NativeFunction(crate::object::NativeFunction { name: "locals", func: native_locals }),
        _ => return None,
    };
    Some(Value::Ref(heap.allocate(data)))
}

/// `exec`/`eval`/`compile` all assume source text, which this engine never
/// parses (it only ever runs already-compiled code objects) — see
/// SPEC_FULL.md "Cross-version exec/eval" and the `allow_cross_version_fallback`
/// config knob, which governs whether a *version mismatch* on an already
/// compiled code object falls back rather than whether source text is
/// accepted at all.
fn native_exec(_interp: &mut Interpreter, _positional: Vec<Value>, _named: Vec<(StringId, Value)>) -> RunResult<Value> {
    Err(RunError::raise(ExcType::NotImplementedError, "exec() is not supported: this engine runs compiled code objects, not source text"))
}

fn native_eval(interp: &mut Interpreter, positional: Vec<Value>, named: Vec<(StringId, Value)>) -> RunResult<Value> {
    native_exec(interp, positional, named)
}

fn native_compile(interp: &mut Interpreter, positional: Vec<Value>, named: Vec<(StringId, Value)>) -> RunResult<Value> {
    native_exec(interp, positional, named)
}

fn native_globals(interp: &mut Interpreter, _positional: Vec<Value>, _named: Vec<(StringId, Value)>) -> RunResult<Value> {
    let id = interp.current_frame().map(|f| f.f_globals).ok_or_else(|| RunError::raise(ExcType::RuntimeError, "globals(): no current frame"))?;
    Ok(Value::Ref(id))
}

fn native_locals(interp: &mut Interpreter, _positional: Vec<Value>, _named: Vec<(StringId, Value)>) -> RunResult<Value> {
    let id = interp.current_frame().map(|f| f.f_locals).ok_or_else(|| RunError::raise(ExcType::RuntimeError, "locals(): no current frame"))?;
    Ok(Value::Ref(id))
}
