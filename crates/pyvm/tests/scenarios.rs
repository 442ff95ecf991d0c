//! End-to-end scenarios driving the engine through its public API only:
//! build a `CodeObject` by hand (the way a loader would after materializing
//! a container, see `pyvm-cli`'s loader), push a `Frame`, and run it to
//! completion. Mirrors the harness in `interp.rs`'s own `mod tests`
//! (`code_returning_const` / `running_a_module_frame_returns_its_last_value`),
//! scaled up to the concrete walkthroughs of comprehensions, exception
//! handling, global rebinding, `*args`/`**kwargs`, context managers, and
//! zero-argument `super()`.

use std::rc::Rc;

use pyvm::{Class, CodeFlags, CodeObject, Frame, Function, Heap, HeapData, Interpreter, PyDict, RunConfig, Value};

fn interp_for(version: pyvm::PyVersion) -> Interpreter {
    Interpreter::with_stdout(RunConfig::new(version), Box::new(Vec::new()))
}

fn bare_code(version: pyvm::PyVersion, name: pyvm::StringId, co_code: Vec<u8>, co_consts: Vec<Value>) -> CodeObject {
    CodeObject {
        version,
        co_code,
        co_consts,
        co_names: vec![],
        co_varnames: vec![],
        co_freevars: vec![],
        co_cellvars: vec![],
        co_argcount: 0,
        co_posonlyargcount: 0,
        co_kwonlyargcount: 0,
        co_flags: CodeFlags::default(),
        co_name: name,
        co_qualname: name,
        co_filename: name,
        co_firstlineno: 1,
        line_table: vec![],
        exception_table: vec![],
        has_dot_zero: false,
    }
}

fn module_frame(interp: &mut Interpreter, code: Rc<CodeObject>) -> Frame {
    let globals = interp.heap.allocate(HeapData::Namespace(PyDict::new()));
    let builtins = interp.builtins_for(globals);
    Frame::new(code, globals, builtins, globals, 1)
}

fn str_const(heap: &mut Heap, s: &str) -> Value {
    Value::Ref(heap.allocate(HeapData::Str(s.to_string())))
}

fn tuple_const(heap: &mut Heap, items: Vec<Value>) -> Value {
    Value::Ref(heap.allocate(HeapData::Tuple(items)))
}

fn list_values(heap: &Heap, value: Value) -> Vec<Value> {
    match value {
        Value::Ref(id) => match heap.get(id) {
            HeapData::List(list) => list.0.clone(),
            other => panic!("expected a list, got {other:?}"),
        },
        other => panic!("expected a list, got {other:?}"),
    }
}

fn as_int(value: Value) -> i64 {
    match value {
        Value::Int(i) => i,
        other => panic!("expected an int, got {other:?}"),
    }
}

fn as_str<'a>(heap: &'a Heap, value: Value) -> &'a str {
    match value {
        Value::Ref(id) => match heap.get(id) {
            HeapData::Str(s) => s,
            other => panic!("expected a str, got {other:?}"),
        },
        other => panic!("expected a str, got {other:?}"),
    }
}

/// Reads an attribute off a `HeapData::Instance` without ever naming the
/// (private) `Instance` type — its fields are `pub`, so matching on the
/// public `HeapData` variant is enough to reach `attrs` directly.
fn instance_attr(heap: &Heap, instance_id: pyvm::ObjectId, name: pyvm::StringId) -> Option<Value> {
    match heap.get(instance_id) {
        HeapData::Instance(inst) => inst.attrs.get(&name).copied(),
        _ => None,
    }
}

// S1: `[i * i for i in (0, 1, 2, 3, 4)]`, built as a single top-level loop
// rather than a nested comprehension code object (spec.md §8 S1) — the
// `LIST_APPEND`/`FOR_ITER`/`JUMP_ABSOLUTE` mechanics under test are the same
// either way, and this keeps the scenario to one frame.
#[test]
fn s1_list_comprehension_squares_a_tuple() {
    let mut interp = interp_for(pyvm::PyVersion::V3_8);
    let name = interp.interns.intern("<module>");
    let result_name = interp.interns.intern("result");
    let i_name = interp.interns.intern("i");

    let tuple = tuple_const(&mut interp.heap, vec![Value::Int(0), Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);

    let co_code = vec![
        103, 0, // 0  BUILD_LIST 0
        90, 0, // 2  STORE_NAME 0 (result)
        100, 0, // 4  LOAD_CONST 0 (tuple)
        68, 0, // 6  GET_ITER
        93, 16, // 8  FOR_ITER -> 24
        90, 1, // 10 STORE_NAME 1 (i)
        101, 0, // 12 LOAD_NAME 0 (result)
        101, 1, // 14 LOAD_NAME 1 (i)
        101, 1, // 16 LOAD_NAME 1 (i)
        20, 0, // 18 BINARY_MULTIPLY
        145, 2, // 20 LIST_APPEND 2
        113, 8, // 22 JUMP_ABSOLUTE 8
        101, 0, // 24 LOAD_NAME 0 (result)
        83, 0, // 26 RETURN_VALUE
    ];

    let mut code = bare_code(pyvm::PyVersion::V3_8, name, co_code, vec![tuple]);
    code.co_names = vec![result_name, i_name];
    let frame = module_frame(&mut interp, Rc::new(code));

    let result = interp.run(frame).expect("run succeeds");
    let squares: Vec<i64> = list_values(&interp.heap, result).into_iter().map(as_int).collect();
    assert_eq!(squares, vec![0, 1, 4, 9, 16]);
}

// S2: indexing past the end of an empty list raises IndexError, caught by a
// `try`/`except IndexError` compiled the 3.9/3.10 way (`SETUP_FINALLY` +
// `JUMP_IF_NOT_EXC_MATCH`, no `END_FINALLY`; spec.md §8 S2, §9 "3.9-3.10
// exception matching").
#[test]
fn s2_index_error_is_caught_by_matching_except_clause() {
    let mut interp = interp_for(pyvm::PyVersion::V3_10);
    let name = interp.interns.intern("<module>");
    let x_name = interp.interns.intern("x");
    let result_name = interp.interns.intern("result");

    let index_error = str_const(&mut interp.heap, "IndexError");
    let caught = str_const(&mut interp.heap, "caught");

    let co_code = vec![
        103, 0, // 0  BUILD_LIST 0
        90, 0, // 2  STORE_NAME 0 (x)
        122, 14, // 4  SETUP_FINALLY -> 18
        101, 0, // 6  LOAD_NAME 0 (x)
        100, 0, // 8  LOAD_CONST 0 (10)
        25, 0, // 10 BINARY_SUBSCR
        1, 0, // 12 POP_TOP
        87, 0, // 14 POP_BLOCK
        110, 16, // 16 JUMP_FORWARD -> 32
        4, 0, // 18 [handler] DUP_TOP
        100, 1, // 20 LOAD_CONST 1 ("IndexError")
        121, 0, // 22 JUMP_IF_NOT_EXC_MATCH (always matches here)
        1, 0, // 24 POP_TOP
        100, 2, // 26 LOAD_CONST 2 ("caught")
        90, 1, // 28 STORE_NAME 1 (result)
        89, 0, // 30 POP_EXCEPT
        101, 1, // 32 [end] LOAD_NAME 1 (result)
        83, 0, // 34 RETURN_VALUE
    ];

    let mut code = bare_code(pyvm::PyVersion::V3_10, name, co_code, vec![Value::Int(10), index_error, caught]);
    code.co_names = vec![x_name, result_name];
    let frame = module_frame(&mut interp, Rc::new(code));

    let result = interp.run(frame).expect("the IndexError is caught, not propagated");
    assert_eq!(as_str(&interp.heap, result), "caught");
}

// S3: a module global rebound across two separate calls to the same
// function observes the mutation each time, not a snapshot taken at
// `MAKE_FUNCTION` time (spec.md §8 S3, `LOAD_GLOBAL`/`STORE_GLOBAL` against
// the shared module namespace).
#[test]
fn s3_global_rebinding_is_visible_across_calls() {
    let mut interp = interp_for(pyvm::PyVersion::V3_8);
    let module_name = interp.interns.intern("<module>");
    let counter_name = interp.interns.intern("counter");
    let bump_name = interp.interns.intern("bump");

    let bump_co_code = vec![
        116, 0, // 0 LOAD_GLOBAL 0 (counter)
        100, 0, // 2 LOAD_CONST 0 (1)
        23, 0, // 4 BINARY_ADD
        97, 0, // 6 STORE_GLOBAL 0 (counter)
        116, 0, // 8 LOAD_GLOBAL 0 (counter)
        83, 0, // 10 RETURN_VALUE
    ];
    let mut bump_code = bare_code(pyvm::PyVersion::V3_8, bump_name, bump_co_code, vec![Value::Int(1)]);
    bump_code.co_names = vec![counter_name];
    let bump_code_value = Value::Ref(interp.heap.allocate(HeapData::Code(Rc::new(bump_code))));
    let bump_qualname = str_const(&mut interp.heap, "bump");

    let module_co_code = vec![
        100, 0, // 0  LOAD_CONST 0 (Int 0)
        90, 0, // 2  STORE_NAME 0 (counter)
        100, 1, // 4  LOAD_CONST 1 (bump code)
        100, 2, // 6  LOAD_CONST 2 (bump qualname)
        132, 0, // 8  MAKE_FUNCTION 0
        90, 1, // 10 STORE_NAME 1 (bump)
        101, 1, // 12 LOAD_NAME 1 (bump)
        131, 0, // 14 CALL_FUNCTION 0
        101, 1, // 16 LOAD_NAME 1 (bump)
        131, 0, // 18 CALL_FUNCTION 0
        102, 2, // 20 BUILD_TUPLE 2
        83, 0, // 22 RETURN_VALUE
    ];
    let mut module_code = bare_code(pyvm::PyVersion::V3_8, module_name, module_co_code, vec![Value::Int(0), bump_code_value, bump_qualname]);
    module_code.co_names = vec![counter_name, bump_name];
    let frame = module_frame(&mut interp, Rc::new(module_code));

    let result = interp.run(frame).expect("run succeeds");
    match result {
        Value::Ref(id) => match interp.heap.get(id) {
            HeapData::Tuple(items) => assert_eq!(items.iter().copied().map(as_int).collect::<Vec<_>>(), vec![1, 2]),
            other => panic!("expected a tuple, got {other:?}"),
        },
        other => panic!("expected a tuple, got {other:?}"),
    }
}

// S4a: `*args` collects the full positional tail into a tuple that ordinary
// `FOR_ITER` can walk (spec.md §8 S4, varargs binding).
#[test]
fn s4a_varargs_collects_and_sums_extra_positionals() {
    let mut interp = interp_for(pyvm::PyVersion::V3_8);
    let module_name = interp.interns.intern("<module>");
    let fn_name = interp.interns.intern("sum_args");
    let args_name = interp.interns.intern("args");
    let acc_name = interp.interns.intern("acc");
    let item_name = interp.interns.intern("item");

    let body = vec![
        100, 0, // 0  LOAD_CONST 0 (0)
        125, 1, // 2  STORE_FAST 1 (acc)
        124, 0, // 4  LOAD_FAST 0 (args)
        68, 0, // 6  GET_ITER
        93, 14, // 8  FOR_ITER -> 22
        125, 2, // 10 STORE_FAST 2 (item)
        124, 1, // 12 LOAD_FAST 1 (acc)
        124, 2, // 14 LOAD_FAST 2 (item)
        23, 0, // 16 BINARY_ADD
        125, 1, // 18 STORE_FAST 1 (acc)
        113, 8, // 20 JUMP_ABSOLUTE 8
        124, 1, // 22 [end] LOAD_FAST 1 (acc)
        83, 0, // 24 RETURN_VALUE
    ];
    let mut fn_code = bare_code(pyvm::PyVersion::V3_8, fn_name, body, vec![Value::Int(0)]);
    fn_code.co_varnames = vec![args_name, acc_name, item_name];
    fn_code.co_flags = CodeFlags::VARARGS | CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS;
    let fn_code_value = Value::Ref(interp.heap.allocate(HeapData::Code(Rc::new(fn_code))));
    let fn_qualname = str_const(&mut interp.heap, "sum_args");

    let module_co_code = vec![
        100, 0, // 0  LOAD_CONST 0 (code)
        100, 1, // 2  LOAD_CONST 1 (qualname)
        132, 0, // 4  MAKE_FUNCTION 0
        90, 0, // 6  STORE_NAME 0 (sum_args)
        101, 0, // 8  LOAD_NAME 0 (sum_args)
        100, 2, // 10 LOAD_CONST 2 (3)
        100, 3, // 12 LOAD_CONST 3 (4)
        100, 4, // 14 LOAD_CONST 4 (5)
        131, 3, // 16 CALL_FUNCTION 3
        83, 0, // 18 RETURN_VALUE
    ];
    let mut module_code = bare_code(
        pyvm::PyVersion::V3_8,
        module_name,
        module_co_code,
        vec![fn_code_value, fn_qualname, Value::Int(3), Value::Int(4), Value::Int(5)],
    );
    module_code.co_names = vec![fn_name];
    let frame = module_frame(&mut interp, Rc::new(module_code));

    let result = interp.run(frame).expect("run succeeds");
    assert_eq!(result, Value::Int(12));
}

// S4b: `**kwargs` collects the keyword tail into a dict, called through
// `CALL_FUNCTION_KW` with a names tuple (spec.md §8 S4, varkeywords binding).
#[test]
fn s4b_varkeywords_collects_named_arguments_into_a_dict() {
    let mut interp = interp_for(pyvm::PyVersion::V3_8);
    let module_name = interp.interns.intern("<module>");
    let fn_name = interp.interns.intern("kwargs_fn");
    let kwargs_name = interp.interns.intern("kwargs");

    let body = vec![
        124, 0, // 0 LOAD_FAST 0 (kwargs)
        83, 0, // 2 RETURN_VALUE
    ];
    let mut fn_code = bare_code(pyvm::PyVersion::V3_8, fn_name, body, vec![]);
    fn_code.co_varnames = vec![kwargs_name];
    fn_code.co_flags = CodeFlags::VARKEYWORDS | CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS;
    let fn_code_value = Value::Ref(interp.heap.allocate(HeapData::Code(Rc::new(fn_code))));
    let fn_qualname = str_const(&mut interp.heap, "kwargs_fn");

    let red = str_const(&mut interp.heap, "red");
    let blue = str_const(&mut interp.heap, "blue");
    let names_tuple = tuple_const(&mut interp.heap, vec![red, blue]);

    let module_co_code = vec![
        100, 0, // 0  LOAD_CONST 0 (code)
        100, 1, // 2  LOAD_CONST 1 (qualname)
        132, 0, // 4  MAKE_FUNCTION 0
        90, 0, // 6  STORE_NAME 0 (kwargs_fn)
        101, 0, // 8  LOAD_NAME 0 (kwargs_fn)
        100, 2, // 10 LOAD_CONST 2 (True)
        100, 3, // 12 LOAD_CONST 3 (False)
        100, 4, // 14 LOAD_CONST 4 (names tuple)
        141, 2, // 16 CALL_FUNCTION_KW 2
        83, 0, // 18 RETURN_VALUE
    ];
    let mut module_code = bare_code(
        pyvm::PyVersion::V3_8,
        module_name,
        module_co_code,
        vec![fn_code_value, fn_qualname, Value::Bool(true), Value::Bool(false), names_tuple],
    );
    module_code.co_names = vec![fn_name];
    let frame = module_frame(&mut interp, Rc::new(module_code));

    let result = interp.run(frame).expect("run succeeds");
    match result {
        Value::Ref(id) => match interp.heap.get(id).clone() {
            HeapData::Dict(dict) => {
                let red_key = str_const(&mut interp.heap, "red");
                let blue_key = str_const(&mut interp.heap, "blue");
                assert_eq!(dict.get(red_key, &interp.heap), Some(Value::Bool(true)));
                assert_eq!(dict.get(blue_key, &interp.heap), Some(Value::Bool(false)));
            }
            other => panic!("expected a dict, got {other:?}"),
        },
        other => panic!("expected a dict, got {other:?}"),
    }
}

// S5: a `with` block's `__exit__` runs exactly once on the normal-exit path,
// compiled the pre-3.11 way (`SETUP_WITH` / `WITH_CLEANUP_START` /
// `WITH_CLEANUP_FINISH` / `END_FINALLY`; spec.md §8 S5, §9 "with statements").
#[test]
fn s5_context_manager_exit_runs_exactly_once() {
    let mut interp = interp_for(pyvm::PyVersion::V3_7);
    let module_name = interp.interns.intern("<module>");
    let cm_name = interp.interns.intern("cm");
    let exit_calls_name = interp.interns.intern("exit_calls");
    let enter_name = interp.well_known.enter;
    let exit_name = interp.well_known.exit;

    // CM.__enter__(self): return None
    let self_name = interp.interns.intern("self");
    let mut enter_code = bare_code(pyvm::PyVersion::V3_7, enter_name, vec![100, 0, 83, 0], vec![Value::None]);
    enter_code.co_varnames = vec![self_name];
    enter_code.co_argcount = 1;
    enter_code.co_flags = CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS;

    // CM.__exit__(self, exc_type, exc_value, tb): exit_calls += 1; return None
    let exit_co_code = vec![
        116, 0, // 0 LOAD_GLOBAL 0 (exit_calls)
        100, 0, // 2 LOAD_CONST 0 (1)
        23, 0, // 4 BINARY_ADD
        97, 0, // 6 STORE_GLOBAL 0 (exit_calls)
        100, 1, // 8 LOAD_CONST 1 (None)
        83, 0, // 10 RETURN_VALUE
    ];
    let exc_type_name = interp.interns.intern("exc_type");
    let exc_value_name = interp.interns.intern("exc_value");
    let tb_name = interp.interns.intern("tb");
    let mut exit_code = bare_code(pyvm::PyVersion::V3_7, exit_name, exit_co_code, vec![Value::Int(1), Value::None]);
    exit_code.co_names = vec![exit_calls_name];
    exit_code.co_varnames = vec![self_name, exc_type_name, exc_value_name, tb_name];
    exit_code.co_argcount = 4;
    exit_code.co_flags = CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS;

    // Both methods close over the module's globals namespace. `PyDict::set`
    // only needs `&Heap` for key-equality (there's nothing to compare
    // against yet), so the dict is seeded with `exit_calls = 0` before the
    // single allocation that becomes the shared `f_globals` (spec.md §3
    // "f_globals (shared)").
    let exit_calls_key = Value::Ref(interp.heap.allocate(HeapData::Str("exit_calls".to_string())));
    let mut seeded = PyDict::new();
    seeded.set(exit_calls_key, Value::Int(0), &interp.heap);
    let globals = interp.heap.allocate(HeapData::Namespace(seeded));

    let enter_fn = Function {
        name: enter_name,
        qualname: enter_name,
        code: Rc::new(enter_code),
        globals,
        defaults: vec![],
        kwdefaults: Default::default(),
        closure: vec![],
        annotations: Default::default(),
    };
    let exit_fn = Function {
        name: exit_name,
        qualname: exit_name,
        code: Rc::new(exit_code),
        globals,
        defaults: vec![],
        kwdefaults: Default::default(),
        closure: vec![],
        annotations: Default::default(),
    };
    let enter_id = interp.heap.allocate(HeapData::Function(enter_fn));
    let exit_id = interp.heap.allocate(HeapData::Function(exit_fn));

    let mut cm_namespace = ahash::AHashMap::default();
    cm_namespace.insert(enter_name, Value::Ref(enter_id));
    cm_namespace.insert(exit_name, Value::Ref(exit_id));
    let cm_class = Class { name: cm_name, bases: vec![], namespace: cm_namespace, metaclass: None };
    let cm_class_id = interp.heap.allocate(HeapData::Class(cm_class));

    let module_co_code = vec![
        100, 0, // 0  LOAD_CONST 0 (CM class)
        131, 0, // 2  CALL_FUNCTION 0
        90, 0, // 4  STORE_NAME 0 (cm)
        101, 0, // 6  LOAD_NAME 0 (cm)
        143, 10, // 8  SETUP_WITH -> 18
        1, 0, // 10 POP_TOP
        87, 0, // 12 POP_BLOCK
        100, 1, // 14 LOAD_CONST 1 (None)
        110, 8, // 16 JUMP_FORWARD -> 24
        81, 0, // 18 [handler] WITH_CLEANUP_START
        121, 0, // 20 WITH_CLEANUP_FINISH
        88, 0, // 22 END_FINALLY
        116, 1, // 24 [end] LOAD_GLOBAL 1 (exit_calls)
        83, 0, // 26 RETURN_VALUE
    ];
    let mut module_code = bare_code(pyvm::PyVersion::V3_7, module_name, module_co_code, vec![Value::Ref(cm_class_id), Value::None]);
    module_code.co_names = vec![cm_name, exit_calls_name];
    let builtins = interp.builtins_for(globals);
    let frame = Frame::new(Rc::new(module_code), globals, builtins, globals, 1);

    let result = interp.run(frame).expect("run succeeds");
    assert_eq!(result, Value::Int(1), "__exit__ must run exactly once");
}

// S6: zero-argument `super()` inside single-inheritance `Derived.__init__`
// resolves `Base.__init__` through the `__class__` freevar cell, not a
// literal reference to `Base` (spec.md §8 S6, §4.6 "super()").
#[test]
fn s6_zero_arg_super_calls_the_base_initializer() {
    let mut interp = interp_for(pyvm::PyVersion::V3_8);
    let module_name = interp.interns.intern("<module>");
    let base_name = interp.interns.intern("Base");
    let derived_name = interp.interns.intern("Derived");
    let init_name = interp.well_known.init;
    let self_name = interp.interns.intern("self");
    let tag_name = interp.interns.intern("tag");
    let extra_name = interp.interns.intern("extra");
    let super_name = interp.interns.intern("super");
    let class_attr_name = interp.well_known.class_attr;

    // Base.__init__(self): self.tag = "base"
    let base_tag = str_const(&mut interp.heap, "base");
    let base_init_code = vec![
        100, 0, // 0 LOAD_CONST 0 ("base")
        124, 0, // 2 LOAD_FAST 0 (self)
        95, 0, // 4 STORE_ATTR 0 (tag)
        100, 1, // 6 LOAD_CONST 1 (None)
        83, 0, // 8 RETURN_VALUE
    ];
    let mut base_init_code = bare_code(pyvm::PyVersion::V3_8, init_name, base_init_code, vec![base_tag, Value::None]);
    base_init_code.co_names = vec![tag_name];
    base_init_code.co_varnames = vec![self_name];
    base_init_code.co_argcount = 1;
    base_init_code.co_flags = CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS;

    let globals = interp.heap.allocate(HeapData::Namespace(PyDict::new()));
    let base_init_fn = Function {
        name: init_name,
        qualname: init_name,
        code: Rc::new(base_init_code),
        globals,
        defaults: vec![],
        kwdefaults: Default::default(),
        closure: vec![],
        annotations: Default::default(),
    };
    let base_init_id = interp.heap.allocate(HeapData::Function(base_init_fn));

    let mut base_namespace = ahash::AHashMap::default();
    base_namespace.insert(init_name, Value::Ref(base_init_id));
    let base_class = Class { name: base_name, bases: vec![], namespace: base_namespace, metaclass: None };
    let base_class_id = interp.heap.allocate(HeapData::Class(base_class));

    // Derived.__init__(self): super().__init__(); self.extra = "derived"
    // `__class__` is a freevar whose cell is pre-filled with the Derived
    // class object, exactly the slot `bind_closure` would wire up for a
    // real `class Derived(Base):` body (spec.md §4.6).
    let derived_extra = str_const(&mut interp.heap, "derived");
    let derived_init_co_code = vec![
        116, 0, // 0  LOAD_GLOBAL 0 (super)
        131, 0, // 2  CALL_FUNCTION 0 (zero-arg super() -> BoundMethod to Base.__init__)
        131, 0, // 4  CALL_FUNCTION 0 (call it)
        1, 0, // 6  POP_TOP
        100, 0, // 8  LOAD_CONST 0 ("derived")
        124, 0, // 10 LOAD_FAST 0 (self)
        95, 1, // 12 STORE_ATTR 1 (extra)
        100, 1, // 14 LOAD_CONST 1 (None)
        83, 0, // 16 RETURN_VALUE
    ];
    let mut derived_init_code = bare_code(pyvm::PyVersion::V3_8, init_name, derived_init_co_code, vec![derived_extra, Value::None]);
    derived_init_code.co_names = vec![super_name, extra_name];
    derived_init_code.co_varnames = vec![self_name];
    derived_init_code.co_freevars = vec![class_attr_name];
    derived_init_code.co_argcount = 1;
    derived_init_code.co_flags = CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS;

    let class_cell_id = interp.heap.allocate(HeapData::Cell(pyvm::Cell::empty()));

    let derived_init_fn = Function {
        name: init_name,
        qualname: init_name,
        code: Rc::new(derived_init_code),
        globals,
        defaults: vec![],
        kwdefaults: Default::default(),
        closure: vec![class_cell_id],
        annotations: Default::default(),
    };
    let derived_init_id = interp.heap.allocate(HeapData::Function(derived_init_fn));

    let mut derived_namespace = ahash::AHashMap::default();
    derived_namespace.insert(init_name, Value::Ref(derived_init_id));
    let derived_class = Class { name: derived_name, bases: vec![base_class_id], namespace: derived_namespace, metaclass: None };
    let derived_class_id = interp.heap.allocate(HeapData::Class(derived_class));

    // Fill the `__class__` cell now that `Derived`'s own id is known.
    if let HeapData::Cell(cell) = interp.heap.get_mut(class_cell_id) {
        cell.slot = Some(Value::Ref(derived_class_id));
    }

    let module_co_code = vec![
        100, 0, // 0 LOAD_CONST 0 (Derived class)
        131, 0, // 2 CALL_FUNCTION 0
        83, 0, // 4 RETURN_VALUE
    ];
    let module_code = bare_code(pyvm::PyVersion::V3_8, module_name, module_co_code, vec![Value::Ref(derived_class_id)]);
    let builtins = interp.builtins_for(globals);
    let frame = Frame::new(Rc::new(module_code), globals, builtins, globals, 1);

    let result = interp.run(frame).expect("constructing Derived() runs to completion");
    let instance_id = match result {
        Value::Ref(id) => id,
        other => panic!("expected an instance, got {other:?}"),
    };
    match interp.heap.get(instance_id) {
        HeapData::Instance(_) => {}
        other => panic!("expected an instance, got {other:?}"),
    }

    let tag_value = instance_attr(&interp.heap, instance_id, tag_name);
    let extra_value = instance_attr(&interp.heap, instance_id, extra_name);
    assert_eq!(as_str(&interp.heap, tag_value.expect("tag set by Base.__init__ via super()")), "base");
    assert_eq!(as_str(&interp.heap, extra_value.expect("extra set directly by Derived.__init__")), "derived");
}
