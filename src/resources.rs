//! Request-scoped resources released when the response completes.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Something that owns an external resource and can give it back early.
///
/// `dispose` may be called more than once; only the first call does work.
pub trait Dispose: Send + Sync {
    /// Releases the underlying resource.
    fn dispose(&self);
}

/// Disposal list owned by a request.
///
/// Cloning yields another handle to the same list, so the platform handler
/// keeps access after the request moves into the inner service. Everything
/// registered is disposed once, in registration order, by
/// [`release`](Self::release).
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use platform_handler::{Dispose, ResponseResources};
///
/// struct Counter(AtomicUsize);
/// impl Dispose for Counter {
///     fn dispose(&self) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
/// }
///
/// let counter = Arc::new(Counter(AtomicUsize::new(0)));
/// let resources = ResponseResources::new();
/// resources.register(counter.clone());
///
/// assert_eq!(resources.release(), 1);
/// assert_eq!(resources.release(), 0);
/// assert_eq!(counter.0.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone, Default)]
pub struct ResponseResources {
    inner: Arc<Mutex<Vec<Arc<dyn Dispose>>>>,
}

impl ResponseResources {
    /// Creates an empty disposal list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource for disposal at end of response.
    pub fn register(&self, resource: Arc<dyn Dispose>) {
        self.lock().push(resource);
    }

    /// Returns the number of resources waiting for release.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is waiting for release.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disposes every registered resource and empties the list.
    ///
    /// Returns how many resources were disposed.
    pub fn release(&self) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        let count = drained.len();
        for resource in drained {
            resource.dispose();
        }
        if count > 0 {
            tracing::debug!(count, "released response resources");
        }
        count
    }

    /// Returns a guard that releases the list when dropped.
    pub(crate) fn release_on_drop(&self) -> ReleaseGuard {
        ReleaseGuard {
            resources: self.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn Dispose>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ResponseResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseResources")
            .field("pending", &self.len())
            .finish()
    }
}

/// Releases a [`ResponseResources`] list on drop.
#[must_use = "resources are released as soon as the guard is dropped"]
pub(crate) struct ReleaseGuard {
    resources: ResponseResources,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.resources.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counted(AtomicUsize);

    impl Dispose for Counted {
        fn dispose(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn clones_share_the_list() {
        let resources = ResponseResources::new();
        let other = resources.clone();
        other.register(Arc::new(Counted::default()));
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn release_disposes_each_resource_once() {
        let first = Arc::new(Counted::default());
        let second = Arc::new(Counted::default());
        let resources = ResponseResources::new();
        resources.register(first.clone());
        resources.register(second.clone());

        assert_eq!(resources.release(), 2);
        assert_eq!(resources.release(), 0);
        assert!(resources.is_empty());
        assert_eq!(first.0.load(Ordering::SeqCst), 1);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_releases_on_drop() {
        let counted = Arc::new(Counted::default());
        let resources = ResponseResources::new();
        resources.register(counted.clone());

        {
            let _guard = resources.release_on_drop();
            assert_eq!(counted.0.load(Ordering::SeqCst), 0);
        }

        assert_eq!(counted.0.load(Ordering::SeqCst), 1);
    }
}
