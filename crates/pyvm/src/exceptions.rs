//! Error taxonomy (spec.md §7 "Error handling design").
//!
//! Two public error enums, grounded in the teacher's `ExcType`/`MontyException`
//! split (`crates/monty-python/src/exceptions.rs` enumerates the Python
//! exception hierarchy the teacher maps to host exceptions; we reuse that same
//! variant set as the engine's own `ExcType`, since it is exactly the set a
//! cross-version interpreter needs to raise/catch `except ValueError:` style
//! clauses against). Neither `thiserror` nor `anyhow` appears anywhere in the
//! teacher's or the wider pack's Python-VM-shaped dependency trees, so both
//! enums hand-write `Display` + `std::error::Error` the way the teacher does.

use std::fmt;

use crate::object::ExceptionValue;

/// The Python exception type hierarchy the engine recognizes, mirroring
/// `ExcType` in the teacher's `monty-python::exceptions` module. Ordered so
/// that more specific variants are listed near their parent for readability;
/// the actual "is-a" relationships used for `except` matching live in
/// [`ExcType::is_subclass_of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcType {
    BaseException,
    SystemExit,
    KeyboardInterrupt,
    GeneratorExit,
    Exception,
    StopIteration,
    StopAsyncIteration,
    ArithmeticError,
    OverflowError,
    ZeroDivisionError,
    LookupError,
    IndexError,
    KeyError,
    RuntimeError,
    NotImplementedError,
    RecursionError,
    AssertionError,
    AttributeError,
    MemoryError,
    NameError,
    UnboundLocalError,
    SyntaxError,
    TimeoutError,
    TypeError,
    ValueError,
    ImportError,
    ModuleNotFoundError,
    OSError,
}

impl ExcType {
    /// `except` clause matching: is `self` (the raised type) an instance of
    /// `target` (the clause's named type)? Mirrors CPython's exception MRO,
    /// flattened since the engine does not model user-subclassed builtin
    /// exception types (spec.md Non-goals: bit-exact object identity).
    #[must_use]
    pub fn is_subclass_of(self, target: ExcType) -> bool {
        if self == target || target == ExcType::BaseException {
            return true;
        }
        use ExcType::*;
        match self {
            StopIteration | StopAsyncIteration => target == Exception,
            OverflowError | ZeroDivisionError => matches!(target, ArithmeticError | Exception),
            ArithmeticError => target == Exception,
            IndexError | KeyError => matches!(target, LookupError | Exception),
            LookupError => target == Exception,
            NotImplementedError | RecursionError => matches!(target, RuntimeError | Exception),
            RuntimeError => target == Exception,
            UnboundLocalError => matches!(target, NameError | Exception),
            NameError => target == Exception,
            ModuleNotFoundError => matches!(target, ImportError | Exception),
            ImportError | AttributeError | MemoryError | SyntaxError | TimeoutError | TypeError | ValueError | OSError
            | AssertionError | GeneratorExit | Exception => target == Exception,
            SystemExit | KeyboardInterrupt => false,
            BaseException => false,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        use ExcType::*;
        match self {
            BaseException => "BaseException",
            SystemExit => "SystemExit",
            KeyboardInterrupt => "KeyboardInterrupt",
            GeneratorExit => "GeneratorExit",
            Exception => "Exception",
            StopIteration => "StopIteration",
            StopAsyncIteration => "StopAsyncIteration",
            ArithmeticError => "ArithmeticError",
            OverflowError => "OverflowError",
            ZeroDivisionError => "ZeroDivisionError",
            LookupError => "LookupError",
            IndexError => "IndexError",
            KeyError => "KeyError",
            RuntimeError => "RuntimeError",
            NotImplementedError => "NotImplementedError",
            RecursionError => "RecursionError",
            AssertionError => "AssertionError",
            AttributeError => "AttributeError",
            MemoryError => "MemoryError",
            NameError => "NameError",
            UnboundLocalError => "UnboundLocalError",
            SyntaxError => "SyntaxError",
            TimeoutError => "TimeoutError",
            TypeError => "TypeError",
            ValueError => "ValueError",
            ImportError => "ImportError",
            ModuleNotFoundError => "ModuleNotFoundError",
            OSError => "OSError",
        }
    }
}

impl fmt::Display for ExcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Engine-internal failures: malformed bytecode, an opcode not implemented
/// for the target version, or a corrupted internal invariant (spec.md §7
/// "EngineError", "Fatal: internal invariant violations").
#[derive(Debug, Clone)]
pub enum EngineError {
    /// An operand indexes out of range into `co_consts`/`co_names`/etc.
    MalformedBytecode { detail: String },
    /// An opcode byte has no table entry for the target version.
    UnknownOpcode { opcode: u8, version: crate::version::PyVersion },
    /// An opcode is recognized but intentionally unimplemented (spec.md §4.1
    /// "to be continued" handlers: `INTERPRETER_EXIT`, `CLEANUP_THROW`,
    /// `LOAD_LOCALS`, some 3.12 `POP_JUMP_IF_*` variants).
    NotImplemented { opcode_name: &'static str },
    /// Value-stack depth mismatch, corrupted block stack, or another
    /// assertion the interpreter loop itself is responsible for upholding.
    InvariantViolation { detail: String },
    /// Recursion/call-depth limit exceeded (spec.md §9 "Frame chains").
    RecursionLimitExceeded { limit: usize },
    /// An uncaught `InterpretedException` drained the outermost frame's
    /// block stack (spec.md §4.5 "pop the frame... engine raises
    /// UncaughtException").
    Uncaught(Box<ExceptionValue>),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedBytecode { detail } => write!(f, "malformed bytecode: {detail}"),
            Self::UnknownOpcode { opcode, version } => {
                write!(f, "opcode 0x{opcode:02x} has no handler for Python {version}")
            }
            Self::NotImplemented { opcode_name } => write!(f, "{opcode_name} is not implemented"),
            Self::InvariantViolation { detail } => write!(f, "internal invariant violation: {detail}"),
            Self::RecursionLimitExceeded { limit } => write!(f, "maximum call depth {limit} exceeded"),
            Self::Uncaught(exc) => write!(f, "uncaught {}: {}", exc.exc_type, exc.message.as_deref().unwrap_or("")),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// Control-flow carrier for an interpreted-level Python exception while it
/// propagates through the block stack (spec.md §4.5). Not a Rust error in the
/// usual sense — an `InterpretedException` is expected control flow inside
/// the engine and only becomes an [`EngineError::Uncaught`] once it drains
/// the outermost frame.
#[derive(Debug, Clone)]
pub struct InterpretedException(pub ExceptionValue);

impl fmt::Display for InterpretedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.0.exc_type, self.0.message.as_deref().unwrap_or(""))
    }
}

impl std::error::Error for InterpretedException {}

/// Result carrier threaded through every opcode handler and call-protocol
/// function. `Exception` keeps the interpreted exception separate from
/// `Engine` so the interpreter loop (spec.md §4.2 step 4 "exception") can
/// route the former into block unwinding and let the latter abort the run.
pub type RunResult<T> = Result<T, RunError>;

#[derive(Debug, Clone)]
pub enum RunError {
    Exception(InterpretedException),
    Engine(EngineError),
}

impl From<EngineError> for RunError {
    fn from(e: EngineError) -> Self {
        RunError::Engine(e)
    }
}

impl From<InterpretedException> for RunError {
    fn from(e: InterpretedException) -> Self {
        RunError::Exception(e)
    }
}

impl RunError {
    #[must_use]
    pub fn raise(exc_type: ExcType, message: impl Into<String>) -> Self {
        RunError::Exception(InterpretedException(ExceptionValue {
            exc_type,
            message: Some(message.into()),
            traceback: None,
            cause: None,
            context: None,
        }))
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Exception(e) => write!(f, "{e}"),
            RunError::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Exception(e) => Some(e),
            RunError::Engine(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subclass_hierarchy_matches_except_clauses() {
        assert!(ExcType::IndexError.is_subclass_of(ExcType::LookupError));
        assert!(ExcType::IndexError.is_subclass_of(ExcType::Exception));
        assert!(!ExcType::KeyError.is_subclass_of(ExcType::IndexError));
        assert!(ExcType::ZeroDivisionError.is_subclass_of(ExcType::ArithmeticError));
        assert!(!ExcType::SystemExit.is_subclass_of(ExcType::Exception));
    }
}
