use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::BoxFuture;

use crate::schedule::{Schedule, ScheduleStatus};
use crate::store::{MemoryScheduleStore, ScheduleStore, StoreError, StoreResult};

/// Store that fails on demand.
///
/// Wraps a [`MemoryScheduleStore`]; while failing, every call returns
/// [`StoreError::Unavailable`] without touching the inner store.
pub struct FailingStore {
    inner: MemoryScheduleStore,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FailingStore {
    /// A store that fails every call.
    pub fn new() -> Self {
        Self::wrapping(MemoryScheduleStore::new(), true)
    }

    /// Wrap an existing store, initially failing or not.
    pub fn wrapping(inner: MemoryScheduleStore, failing: bool) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(failing),
            calls: AtomicUsize::new(0),
        }
    }

    /// Toggle failure injection.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The wrapped store, bypassing failure injection.
    pub fn inner(&self) -> &MemoryScheduleStore {
        &self.inner
    }

    /// Number of calls received, failed or not.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleStore for FailingStore {
    fn find_all(&self) -> BoxFuture<'_, StoreResult<Vec<Schedule>>> {
        Box::pin(async move {
            self.check()?;
            self.inner.find_all().await
        })
    }

    fn find_all_by_enabled(&self, enabled: bool) -> BoxFuture<'_, StoreResult<Vec<Schedule>>> {
        Box::pin(async move {
            self.check()?;
            self.inner.find_all_by_enabled(enabled).await
        })
    }

    fn find_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<Option<Schedule>>> {
        Box::pin(async move {
            self.check()?;
            self.inner.find_by_name(name).await
        })
    }

    fn find_by_status<'a>(
        &'a self,
        status: &'a ScheduleStatus,
    ) -> BoxFuture<'a, StoreResult<Vec<Schedule>>> {
        Box::pin(async move {
            self.check()?;
            self.inner.find_by_status(status).await
        })
    }

    fn update_status<'a>(
        &'a self,
        name: &'a str,
        status: &'a ScheduleStatus,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.check()?;
            self.inner.update_status(name, status).await
        })
    }

    fn update_status_and_workflow_context<'a>(
        &'a self,
        schedule: &'a Schedule,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.check()?;
            self.inner.update_status_and_workflow_context(schedule).await
        })
    }

    fn insert<'a>(&'a self, schedule: &'a Schedule) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.check()?;
            self.inner.insert(schedule).await
        })
    }

    fn update<'a>(&'a self, schedule: &'a Schedule) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.check()?;
            self.inner.update(schedule).await
        })
    }

    fn remove_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.check()?;
            self.inner.remove_by_name(name).await
        })
    }
}
