//! Lock-free cache of the rendered axum router.
//!
//! The router is rebuilt only after a registration invalidates it, while
//! `load` is hit whenever a host asks for the current router.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

pub struct RouterCache<T> {
    inner: ArcSwapOption<T>,
}

impl<T> RouterCache<T> {
    pub fn empty() -> Self {
        Self {
            inner: ArcSwapOption::empty(),
        }
    }

    /// Current value, if one has been stored since the last invalidation.
    pub fn load(&self) -> Option<Arc<T>> {
        self.inner.load_full()
    }

    pub fn store(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.inner.store(Some(value.clone()));
        value
    }

    pub fn invalidate(&self) {
        self.inner.store(None);
    }

    /// Return the cached value or build, cache and return a fresh one.
    ///
    /// Load, build and store are separate steps: callers that invalidate
    /// concurrently must hold a lock that excludes invalidation while
    /// building, or a stale value can be stored.
    pub fn get_or_build(&self, build: impl FnOnce() -> T) -> Arc<T> {
        match self.load() {
            Some(cached) => cached,
            None => self.store(build()),
        }
    }
}

impl<T> Default for RouterCache<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> std::fmt::Debug for RouterCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterCache")
            .field("cached", &self.inner.load().is_some())
            .finish()
    }
}
