use std::collections::BTreeMap;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use super::{ScheduleStore, StoreError, StoreResult};
use crate::schedule::{Schedule, ScheduleStatus};

/// In-process schedule store.
///
/// Backs the `memory` storage backend and the scheduler tests. Records are
/// kept ordered by name so listings are stable.
#[derive(Default)]
pub struct MemoryScheduleStore {
    schedules: RwLock<BTreeMap<String, Schedule>>,
}

impl MemoryScheduleStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with schedules.
    pub fn with_schedules(schedules: impl IntoIterator<Item = Schedule>) -> Self {
        let map = schedules
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();
        Self {
            schedules: RwLock::new(map),
        }
    }

    /// Number of stored schedules.
    pub async fn len(&self) -> usize {
        self.schedules.read().await.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.schedules.read().await.is_empty()
    }

    async fn filtered(&self, predicate: impl Fn(&Schedule) -> bool) -> Vec<Schedule> {
        self.schedules
            .read()
            .await
            .values()
            .filter(|s| predicate(s))
            .cloned()
            .collect()
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn find_all(&self) -> BoxFuture<'_, StoreResult<Vec<Schedule>>> {
        Box::pin(async move { Ok(self.filtered(|_| true).await) })
    }

    fn find_all_by_enabled(&self, enabled: bool) -> BoxFuture<'_, StoreResult<Vec<Schedule>>> {
        Box::pin(async move { Ok(self.filtered(|s| s.enabled == enabled).await) })
    }

    fn find_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<Option<Schedule>>> {
        Box::pin(async move { Ok(self.schedules.read().await.get(name).cloned()) })
    }

    fn find_by_status<'a>(
        &'a self,
        status: &'a ScheduleStatus,
    ) -> BoxFuture<'a, StoreResult<Vec<Schedule>>> {
        Box::pin(async move { Ok(self.filtered(|s| &s.status == status).await) })
    }

    fn update_status<'a>(
        &'a self,
        name: &'a str,
        status: &'a ScheduleStatus,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            if let Some(existing) = self.schedules.write().await.get_mut(name) {
                existing.status = status.clone();
                existing.last_update = Utc::now();
            }
            Ok(())
        })
    }

    fn update_status_and_workflow_context<'a>(
        &'a self,
        schedule: &'a Schedule,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            if let Some(existing) = self.schedules.write().await.get_mut(&schedule.name) {
                existing.status = schedule.status.clone();
                existing.workflow_context = schedule.workflow_context.clone();
                existing.last_update = Utc::now();
            }
            Ok(())
        })
    }

    fn insert<'a>(&'a self, schedule: &'a Schedule) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut schedules = self.schedules.write().await;
            if schedules.contains_key(&schedule.name) {
                return Err(StoreError::Conflict(format!(
                    "schedule '{}' already exists",
                    schedule.name
                )));
            }
            schedules.insert(schedule.name.clone(), schedule.clone());
            Ok(())
        })
    }

    fn update<'a>(&'a self, schedule: &'a Schedule) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            if let Some(existing) = self.schedules.write().await.get_mut(&schedule.name) {
                *existing = schedule.clone();
            }
            Ok(())
        })
    }

    fn remove_by_name<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.schedules.write().await.remove(name);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    #[tokio::test]
    async fn test_insert_then_find_round_trip() {
        let store = MemoryScheduleStore::new();
        let schedule = Schedule::new("nightly", "0 0 * * *", "wf1", "1");

        store.insert(&schedule).await.unwrap();
        let found = store.find_by_name("nightly").await.unwrap().unwrap();

        assert_eq!(found, schedule);
        assert_eq!(found.workflow_context, Map::new());
    }

    #[tokio::test]
    async fn test_find_missing_is_none() {
        let store = MemoryScheduleStore::new();
        assert!(store.find_by_name("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let store = MemoryScheduleStore::new();
        let schedule = Schedule::new("nightly", "0 0 * * *", "wf1", "1");
        store.insert(&schedule).await.unwrap();

        let err = store.insert(&schedule).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_queries_filter() {
        let mut running = Schedule::new("a", "* * * * *", "wf", "1");
        running.status = ScheduleStatus::Running;
        let disabled = Schedule::new("b", "* * * * *", "wf", "1").with_enabled(false);
        let store = MemoryScheduleStore::with_schedules([running, disabled]);

        assert_eq!(store.find_all().await.unwrap().len(), 2);
        assert_eq!(store.find_all_by_enabled(true).await.unwrap()[0].name, "a");
        assert_eq!(store.find_all_by_enabled(false).await.unwrap()[0].name, "b");
        let found = store.find_by_status(&ScheduleStatus::Running).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "a");
    }

    #[tokio::test]
    async fn test_status_updates_bump_last_update() {
        let mut schedule = Schedule::new("nightly", "0 0 * * *", "wf1", "1");
        schedule.last_update = Utc::now() - chrono::Duration::hours(1);
        let before = schedule.last_update;
        let store = MemoryScheduleStore::with_schedules([schedule.clone()]);

        store
            .update_status("nightly", &ScheduleStatus::Running)
            .await
            .unwrap();
        let found = store.find_by_name("nightly").await.unwrap().unwrap();
        assert!(found.status.is_running());
        assert!(found.last_update > before);

        schedule.status = ScheduleStatus::Completed;
        schedule
            .workflow_context
            .insert("lastExecution".into(), json!({"x": 1}));
        store
            .update_status_and_workflow_context(&schedule)
            .await
            .unwrap();
        let found = store.find_by_name("nightly").await.unwrap().unwrap();
        assert_eq!(found.status, ScheduleStatus::Completed);
        assert_eq!(found.workflow_context["lastExecution"], json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_remove() {
        let store =
            MemoryScheduleStore::with_schedules([Schedule::new("a", "* * * * *", "wf", "1")]);
        store.remove_by_name("a").await.unwrap();
        store.remove_by_name("a").await.unwrap();
        assert!(store.is_empty().await);
    }
}
