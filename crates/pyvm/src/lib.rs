//! A cross-version interpreter for Python stack-machine bytecode (spec.md
//! §1 "Purpose & Scope"). Given a [`CodeObject`] targeting one of the
//! supported `(2.7, 3.1-3.12)` language versions, [`Interpreter::run`] builds
//! a [`Frame`] and executes its opcode stream against a version-specific
//! dispatch table, with its own evaluation stack, block stack, and call
//! protocol — no host Python C evaluator is involved.
//!
//! This crate does not parse source text or a marshalled bytecode container;
//! it consumes an already-assembled [`CodeObject`] (spec.md §6 "Input
//! artifacts", §1 "Out of scope"). See `pyvm-cli` for a front end that wires
//! a loader up to this engine.

mod builtins;
mod call;
mod classbuild;
mod code;
mod config;
mod exceptions;
mod frame;
mod generator;
mod heap;
mod intern;
mod interp;
mod object;
mod opcodes;
mod trace;
mod types;
mod value;
mod version;

pub use crate::{
    code::{CodeFlags, CodeObject, ExceptionTableEntry, LineEntry},
    config::{RunConfig, DEFAULT_RECURSION_LIMIT},
    exceptions::{EngineError, ExcType, InterpretedException, RunError, RunResult},
    frame::{Block, BlockKind, Frame, Signal},
    generator::send as send_generator,
    heap::{Heap, HeapData, ObjectId},
    intern::{Interns, StringId},
    interp::Interpreter,
    object::{
        BoundMethod, Class, ExceptionValue, Function, Generator, GeneratorState, NativeFn, NativeFunction, TracebackEntry,
    },
    trace::{TraceCallArgs, TraceControl, TraceEvent, TraceFlags, BRKPT_OPCODE},
    value::{Cell, Value, WellKnownNames},
    version::{CallEra, PyVersion},
};

pub use crate::types::{PyBytes, PyDict, PyFrozenSet, PyList, PySet, PyStr, PyTuple};
