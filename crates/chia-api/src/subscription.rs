//! Push-subscription callbacks and release handles.

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Callback invoked with the payload of every matching push event.
pub type EventCallback = Arc<dyn Fn(Value) + Send + Sync + 'static>;

type ReleaseFn = Box<dyn FnOnce() + Send + 'static>;

/// Capability to stop push delivery for one subscription.
///
/// Releasing is idempotent: the underlying release runs at most once no matter
/// how many times [`Unsubscribe::unsubscribe`] is called. Dropping the handle
/// without calling it leaves the subscription active.
pub struct Unsubscribe {
    release: Mutex<Option<ReleaseFn>>,
}

impl Unsubscribe {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// A handle with nothing to release.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Release the subscription.
    ///
    /// Returns `true` if this call performed the release, `false` if it had
    /// already been released.
    pub fn unsubscribe(&self) -> bool {
        let release = self
            .release
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match release {
            Some(release) => {
                release();
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.release
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("released", &self.is_released())
            .finish()
    }
}
