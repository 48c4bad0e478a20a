//! Scope-owned workspaces.

use std::ops::{Deref, DerefMut};

use log::warn;

use crate::error::{BackendError, CleanupWarning, Scope, StageContext};

/// Function that releases a workspace of type `W`.
pub(crate) type Release<P, W> = fn(&P, W) -> Result<(), BackendError>;

/// A workspace that is released when its scope ends.
///
/// [`Scoped::finish`] releases it on the success path and hands back any
/// failure as a [`CleanupWarning`]. If the guard is dropped instead, as on an
/// early return with an error, the workspace is still released and a failure
/// is only logged, so the original error stands.
pub(crate) struct Scoped<'p, P: ?Sized, W> {
    physics: &'p P,
    release: Release<P, W>,
    scope: Scope,
    context: StageContext,
    workspace: Option<W>,
}

impl<'p, P: ?Sized, W> Scoped<'p, P, W> {
    pub fn new(
        physics: &'p P,
        release: Release<P, W>,
        scope: Scope,
        context: &StageContext,
        workspace: W,
    ) -> Self {
        Self {
            physics,
            release,
            scope,
            context: context.clone(),
            workspace: Some(workspace),
        }
    }

    /// Release the workspace, returning a warning if that failed.
    pub fn finish(mut self) -> Option<CleanupWarning> {
        let workspace = self.workspace.take()?;
        (self.release)(self.physics, workspace)
            .err()
            .map(|e| CleanupWarning {
                scope: self.scope,
                context: self.context.clone(),
                message: e.to_string(),
            })
    }
}

impl<P: ?Sized, W> Deref for Scoped<'_, P, W> {
    type Target = W;

    fn deref(&self) -> &W {
        // Only `finish` and `drop` take the workspace, and both end the guard
        self.workspace
            .as_ref()
            .expect("workspace is present until the guard ends")
    }
}

impl<P: ?Sized, W> DerefMut for Scoped<'_, P, W> {
    fn deref_mut(&mut self) -> &mut W {
        self.workspace
            .as_mut()
            .expect("workspace is present until the guard ends")
    }
}

impl<P: ?Sized, W> Drop for Scoped<'_, P, W> {
    fn drop(&mut self) {
        if let Some(workspace) = self.workspace.take() {
            if let Err(e) = (self.release)(self.physics, workspace) {
                warn!(
                    "releasing {} workspace failed for {} while unwinding an error: {e}",
                    self.scope, self.context
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        released: Cell<usize>,
        fail: bool,
    }

    fn release(counter: &Counter, _workspace: Vec<f64>) -> Result<(), BackendError> {
        counter.released.set(counter.released.get() + 1);
        if counter.fail {
            Err(BackendError::new("double free"))
        } else {
            Ok(())
        }
    }

    fn counter(fail: bool) -> Counter {
        Counter {
            released: Cell::new(0),
            fail,
        }
    }

    #[test]
    fn finish_releases_once() {
        let counter = counter(false);
        let context = StageContext::profile(0);
        let mut scoped = Scoped::new(&counter, release, Scope::Profile, &context, vec![1.0]);
        scoped.push(2.0);
        assert_eq!(scoped.len(), 2);
        assert!(scoped.finish().is_none());
        assert_eq!(counter.released.get(), 1);
    }

    #[test]
    fn drop_releases_on_early_exit() {
        let counter = counter(true);
        let run = || -> Result<(), BackendError> {
            let context = StageContext::profile(1);
            let _scoped = Scoped::new(&counter, release, Scope::Sensor, &context, Vec::new());
            Err(BackendError::new("stage failed"))
        };
        assert_eq!(run(), Err(BackendError::new("stage failed")));
        assert_eq!(counter.released.get(), 1);
    }

    #[test]
    fn failed_release_is_a_warning() {
        let counter = counter(true);
        let context = StageContext::profile(2);
        let scoped = Scoped::new(&counter, release, Scope::Predictor, &context, Vec::new());
        let warning = scoped.finish().unwrap();
        assert_eq!(warning.scope, Scope::Predictor);
        assert_eq!(warning.context.profile, 2);
        assert_eq!(warning.message, "double free");
        assert_eq!(counter.released.get(), 1);
    }
}
