//! Run configuration (SPEC_FULL.md "Ambient stack additions").
//!
//! A builder-pattern struct mirroring the teacher's `ResourceLimits`: a
//! handful of knobs that change engine behavior without touching code, all
//! collected in one place rather than threaded as loose function arguments.

use crate::trace::TraceFlags;
use crate::version::PyVersion;

/// Default maximum call depth, matching CPython's conservative default
/// `sys.getrecursionlimit()` ballpark (spec.md §9 "Frame chains").
pub const DEFAULT_RECURSION_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub version: PyVersion,
    pub recursion_limit: usize,
    pub stack_size_hint: usize,
    /// Whether `exec`/`eval`/`compile` may fall back to the host toolchain
    /// when the interpreted version differs from the host (spec.md §9
    /// "Cross-version exec/eval"). When `false`, a version mismatch raises
    /// an `EngineError` instead of silently delegating.
    pub allow_cross_version_fallback: bool,
    pub trace_flags: TraceFlags,
}

impl RunConfig {
    #[must_use]
    pub fn new(version: PyVersion) -> Self {
        Self {
            version,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            stack_size_hint: 64,
            allow_cross_version_fallback: true,
            trace_flags: TraceFlags::NONE,
        }
    }

    #[must_use]
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    #[must_use]
    pub fn with_stack_size_hint(mut self, hint: usize) -> Self {
        self.stack_size_hint = hint;
        self
    }

    #[must_use]
    pub fn with_cross_version_fallback(mut self, allow: bool) -> Self {
        self.allow_cross_version_fallback = allow;
        self
    }

    #[must_use]
    pub fn with_trace_flags(mut self, flags: TraceFlags) -> Self {
        self.trace_flags = flags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let cfg = RunConfig::new(PyVersion::V3_11).with_recursion_limit(10).with_trace_flags(TraceFlags::LINE);
        assert_eq!(cfg.recursion_limit, 10);
        assert!(cfg.trace_flags.contains(TraceFlags::LINE));
        assert!(cfg.allow_cross_version_fallback);
    }
}
