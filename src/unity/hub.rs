//! Recently-used-projects watcher boundary
//!
//! Unity Hub records every project the editor opens, including our
//! ephemeral working copies, in a platform-specific "recently used
//! projects" store, at some unspecified point after the build starts. The
//! build invoker therefore gives an injected observer one callback per
//! output line; a real implementation watches for the working copy to
//! appear in the store and removes it. The store manipulation itself
//! lives with the caller, not in this crate.

/// Observer ticked once per build-tool output line, regardless of the
/// line's content.
pub trait RecentProjectsObserver: Send {
    fn tick(&mut self);
}

/// Observer that does nothing; the default when no caller hook is set.
pub struct NoopObserver;

impl RecentProjectsObserver for NoopObserver {
    fn tick(&mut self) {}
}

/// Adapter for callers that only have a callback to hand in.
pub struct FnObserver<F: FnMut() + Send>(pub F);

impl<F: FnMut() + Send> RecentProjectsObserver for FnObserver<F> {
    fn tick(&mut self) {
        (self.0)()
    }
}
