//! Wire format for a serialized bytecode container (spec.md §6 "Input
//! artifacts": "magic number, timestamp, source size, flags, marshalled
//! code object"). This is this project's own portable encoding, not
//! CPython's `.pyc` marshal format — parsing that format is explicitly out
//! of scope for the engine (spec.md §1 Out of scope), and disassembling a
//! real `.pyc` is a job for a dedicated loader this pack does not ship.
//!
//! `pyvm::CodeObject` is deliberately not `Serialize`: its `co_consts` can
//! hold a `Value::Ref` into a live `Heap`, and an `ObjectId` has no meaning
//! outside the arena that produced it. So the wire format spells constants
//! out structurally (`ConstWire`) and names as plain `String`s, and
//! [`CodeWire::materialize`] does the allocation into the target `Heap`/
//! `Interns` that turns it into a real `CodeObject`.

use pyvm::{CodeFlags, CodeObject, ExceptionTableEntry, Heap, HeapData, Interns, LineEntry, PyVersion, StringId, Value};
use serde::{Deserialize, Serialize};

/// Magic bytes identifying this project's own container format, mirroring
/// the role of CPython's `.pyc` magic number (spec.md §6) without trying to
/// match its value or meaning.
pub const MAGIC: &[u8; 8] = b"PYVMBC01";

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgramContainer {
    pub version: (u8, u8),
    pub is_pypy: bool,
    pub source_size: u32,
    pub sip_hash: u64,
    pub code: CodeWire,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum ConstWire {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<ConstWire>),
    Code(Box<CodeWire>),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CodeWire {
    pub version: (u8, u8),
    pub co_code: Vec<u8>,
    pub co_consts: Vec<ConstWire>,
    pub co_names: Vec<String>,
    pub co_varnames: Vec<String>,
    pub co_freevars: Vec<String>,
    pub co_cellvars: Vec<String>,
    pub co_argcount: u32,
    pub co_posonlyargcount: u32,
    pub co_kwonlyargcount: u32,
    pub co_flags: u32,
    pub co_name: String,
    pub co_qualname: String,
    pub co_filename: String,
    pub co_firstlineno: u32,
    pub line_table: Vec<(u32, Option<u32>)>,
    pub exception_table: Vec<(u32, u32, u32, u16, bool)>,
    pub has_dot_zero: bool,
}

impl ConstWire {
    fn materialize(self, heap: &mut Heap, interns: &mut Interns) -> Value {
        match self {
            ConstWire::None => Value::None,
            ConstWire::Bool(b) => Value::Bool(b),
            ConstWire::Int(i) => Value::Int(i),
            ConstWire::Float(f) => Value::Float(f),
            ConstWire::Str(s) => Value::Ref(heap.allocate(HeapData::Str(s))),
            ConstWire::Bytes(b) => Value::Ref(heap.allocate(HeapData::Bytes(b))),
            ConstWire::Tuple(items) => {
                let items = items.into_iter().map(|c| c.materialize(heap, interns)).collect();
                Value::Ref(heap.allocate(HeapData::Tuple(items)))
            }
            ConstWire::Code(code) => {
                let code = code.materialize(heap, interns);
                Value::Ref(heap.allocate(HeapData::Code(std::rc::Rc::new(code))))
            }
        }
    }
}

impl CodeWire {
    pub fn materialize(self, heap: &mut Heap, interns: &mut Interns) -> CodeObject {
        let intern_all = |names: Vec<String>, interns: &mut Interns| -> Vec<StringId> {
            names.iter().map(|n| interns.intern(n)).collect()
        };
        CodeObject {
            version: PyVersion::new(self.version.0, self.version.1),
            co_code: self.co_code,
            co_consts: self.co_consts.into_iter().map(|c| c.materialize(heap, interns)).collect(),
            co_names: intern_all(self.co_names, interns),
            co_varnames: intern_all(self.co_varnames, interns),
            co_freevars: intern_all(self.co_freevars, interns),
            co_cellvars: intern_all(self.co_cellvars, interns),
            co_argcount: self.co_argcount,
            co_posonlyargcount: self.co_posonlyargcount,
            co_kwonlyargcount: self.co_kwonlyargcount,
            co_flags: CodeFlags(self.co_flags),
            co_name: interns.intern(&self.co_name),
            co_qualname: interns.intern(&self.co_qualname),
            co_filename: interns.intern(&self.co_filename),
            co_firstlineno: self.co_firstlineno,
            line_table: self.line_table.into_iter().map(|(offset, line)| LineEntry { offset, line }).collect(),
            exception_table: self
                .exception_table
                .into_iter()
                .map(|(start, end, handler, stack_depth, push_lasti)| ExceptionTableEntry { start, end, handler, stack_depth, push_lasti })
                .collect(),
            has_dot_zero: self.has_dot_zero,
        }
    }
}
