//! External loader (spec.md §6 "Input artifacts": `load(path) → (version,
//! timestamp, magic, code, is_pypy, source_size, sip_hash)"). The engine
//! itself never parses a container or compiles source (spec.md §1 Out of
//! scope); this module is the "external collaborator" the engine expects.
//!
//! Two input shapes:
//! - A bytecode container in this project's own `PROGRAM_MAGIC`-prefixed
//!   postcard encoding (see `crate::container`).
//! - Python source text, for which compiling to bytecode is delegated to
//!   the host toolchain when available (spec.md §1) — absent one here, this
//!   surfaces as [`LoaderError::CannotCompile`] rather than silently failing.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use pyvm::{CodeObject, Heap, Interns, PyVersion};

use crate::container::{ProgramContainer, MAGIC};

pub struct Loaded {
    pub meta: LoadedMeta,
    container: ProgramContainer,
}

impl Loaded {
    /// Materializes the container's code object into `heap`/`interns`.
    /// Deferred from [`read`] so the caller can first decide the target
    /// `PyVersion` (falling back to `meta.version`) and construct an
    /// `Interpreter` for it before any heap allocation happens — the
    /// interpreter's own builtins namespace must live in the same heap the
    /// loaded constants do.
    #[must_use]
    pub fn materialize(self, heap: &mut Heap, interns: &mut Interns) -> CodeObject {
        self.container.code.materialize(heap, interns)
    }
}

#[derive(Debug)]
pub enum LoaderError {
    SourceUnavailable { path: PathBuf, detail: String },
    WrongBytecode { path: PathBuf, detail: String },
    CannotCompile { path: PathBuf },
    ModuleNotFound { dotted_name: String, searched: Vec<PathBuf> },
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceUnavailable { path, detail } => write!(f, "cannot read {}: {detail}", path.display()),
            Self::WrongBytecode { path, detail } => write!(f, "{}: malformed bytecode container: {detail}", path.display()),
            Self::CannotCompile { path } => {
                write!(f, "{} looks like Python source text; this build has no host compiler wired in, only bytecode containers ({} magic)", path.display(), String::from_utf8_lossy(MAGIC))
            }
            Self::ModuleNotFound { dotted_name, searched } => {
                write!(f, "no module named '{dotted_name}' (searched {})", searched.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))
            }
        }
    }
}

impl std::error::Error for LoaderError {}

/// What `load` reports about the artifact, mirroring spec.md §6's
/// `(version, timestamp, magic, is_pypy, source_size, sip_hash)` tuple
/// (the `code` component is returned separately since building it needs
/// `&mut Heap`/`&mut Interns`).
#[derive(Debug, Clone)]
pub struct LoadedMeta {
    pub version: PyVersion,
    pub is_pypy: bool,
    pub source_size: u32,
    pub sip_hash: u64,
}

/// Reads a single file, which must be one of this project's own bytecode
/// containers (see module docs for why bare source text is rejected), and
/// reports its metadata without yet materializing the code object onto any
/// heap (see [`Loaded::materialize`]).
pub fn read(path: &Path) -> Result<Loaded, LoaderError> {
    let bytes = fs::read(path).map_err(|e| LoaderError::SourceUnavailable { path: path.to_owned(), detail: e.to_string() })?;

    if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
        return Err(LoaderError::CannotCompile { path: path.to_owned() });
    }

    let container: ProgramContainer = postcard::from_bytes(&bytes[MAGIC.len()..])
        .map_err(|e| LoaderError::WrongBytecode { path: path.to_owned(), detail: e.to_string() })?;

    let meta = LoadedMeta {
        version: PyVersion::new(container.version.0, container.version.1),
        is_pypy: container.is_pypy,
        source_size: container.source_size,
        sip_hash: container.sip_hash,
    };
    Ok(Loaded { meta, container })
}

/// Resolves a dotted module name (`pkg.sub.mod`) to a container file by
/// walking `search_path` the way `sys.path` does, trying
/// `<root>/pkg/sub/mod.pyvmc` under each root in turn (spec.md §6 "CLI...
/// run a module by dotted name"; the module *search* itself is explicitly
/// out of scope for the engine, so this lives entirely in the CLI).
pub fn resolve_module(dotted_name: &str, search_path: &[PathBuf]) -> Result<PathBuf, LoaderError> {
    let relative: PathBuf = dotted_name.split('.').collect();
    for root in search_path {
        let candidate = root.join(&relative).with_extension("pyvmc");
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(LoaderError::ModuleNotFound { dotted_name: dotted_name.to_owned(), searched: search_path.to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_container_file_reports_cannot_compile() {
        let dir = std::env::temp_dir();
        let path = dir.join("pyvm_loader_test_source.py");
        fs::write(&path, b"print('hello')\n").unwrap();

        let err = read(&path).unwrap_err();
        assert!(matches!(err, LoaderError::CannotCompile { .. }));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_module_lists_searched_roots() {
        let err = resolve_module("nope.submod", &[PathBuf::from("/nonexistent/root")]).unwrap_err();
        match err {
            LoaderError::ModuleNotFound { dotted_name, searched } => {
                assert_eq!(dotted_name, "nope.submod");
                assert_eq!(searched, vec![PathBuf::from("/nonexistent/root")]);
            }
            other => panic!("expected ModuleNotFound, got {other:?}"),
        }
    }
}
