//! Host-stack headroom for recursive dispatch.
//!
//! Interpreted calls re-enter `Vm::execute` natively, so deeply recursive
//! programs consume host stack. The explicit call-depth limit converts
//! runaway recursion into a reported error; this module keeps deep-but-legal
//! recursion from hitting the host stack first.

/// Ensure sufficient host stack is available before executing `f`,
/// growing the stack in segments when the red zone is reached.
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    /// Remaining stack below which a new segment is allocated (64KB).
    const RED_ZONE: usize = 64 * 1024;

    /// Size of each allocated segment (2MB).
    const STACK_PER_RECURSION: usize = 2 * 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
