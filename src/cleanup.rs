//! Ordered, idempotent release of everything bootstrap acquired.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::BoxError;

type ReleaseStep = (String, Box<dyn FnOnce() -> Result<(), BoxError> + Send>);

/// A stack of release steps run in reverse acquisition order.
///
/// Cloning shares the stack. [`run`](Self::run) releases everything once;
/// later calls do nothing. Step errors and panics are logged and never
/// stop the remaining steps.
#[derive(Clone)]
pub struct Cleanup {
    steps: Arc<Mutex<Option<Vec<ReleaseStep>>>>,
}

impl Cleanup {
    /// An empty stack.
    pub fn new() -> Self {
        Self {
            steps: Arc::new(Mutex::new(Some(Vec::new()))),
        }
    }

    /// Record a release step for a resource just acquired.
    ///
    /// Steps pushed after [`run`](Self::run) are executed immediately.
    pub fn push<F>(&self, name: impl Into<String>, release: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        let name = name.into();
        let release: Box<dyn FnOnce() -> Result<(), BoxError> + Send> = Box::new(release);
        let late = match self.steps.lock().as_mut() {
            Some(steps) => {
                steps.push((name, release));
                None
            }
            None => Some((name, release)),
        };
        if let Some((name, release)) = late {
            debug!(step = %name, "cleanup already ran; releasing immediately");
            release_one(name, release);
        }
    }

    /// Names of the pending steps in the order they will be released.
    pub fn pending(&self) -> Vec<String> {
        self.steps
            .lock()
            .as_ref()
            .map(|steps| steps.iter().rev().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }

    /// True once [`run`](Self::run) has been called.
    pub fn is_done(&self) -> bool {
        self.steps.lock().is_none()
    }

    /// Release everything, last acquired first.
    pub fn run(&self) {
        let steps = match self.steps.lock().take() {
            Some(steps) => steps,
            None => return,
        };
        debug!(steps = steps.len(), "running cleanup");
        for (name, release) in steps.into_iter().rev() {
            release_one(name, release);
        }
    }
}

fn release_one(name: String, release: Box<dyn FnOnce() -> Result<(), BoxError> + Send>) {
    match catch_unwind(AssertUnwindSafe(release)) {
        Ok(Ok(())) => debug!(step = %name, "released"),
        Ok(Err(err)) => warn!(step = %name, error = %err, "release failed"),
        Err(_) => warn!(step = %name, "release panicked"),
    }
}

impl Default for Cleanup {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanup")
            .field("pending", &self.pending())
            .field("done", &self.is_done())
            .finish()
    }
}
