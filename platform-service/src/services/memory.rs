use super::repository::{ApplicationStore, ReplaceOutcome};
use crate::models::{Application, ApplicationFilter};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Process-local store, used in development and tests.
#[derive(Clone, Default)]
pub struct InMemoryApplicationStore {
    applications: Arc<DashMap<String, Application>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, application: Application) -> Result<()> {
        if self.applications.contains_key(&application.id) {
            anyhow::bail!("application {} already exists", application.id);
        }
        self.applications
            .insert(application.id.clone(), application);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Application>> {
        Ok(self.applications.get(id).map(|entry| entry.value().clone()))
    }

    async fn list(
        &self,
        filter: &ApplicationFilter,
        limit: u64,
        skip: u64,
    ) -> Result<(Vec<Application>, u64)> {
        let mut matching: Vec<Application> = self
            .applications
            .iter()
            .filter(|entry| filter.status.map_or(true, |s| entry.status == s))
            .map(|entry| entry.value().clone())
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        if skip >= total {
            return Ok((Vec::new(), total));
        }
        let page = matching
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect();

        Ok((page, total))
    }

    async fn replace(
        &self,
        current: &Application,
        updated: &Application,
    ) -> Result<ReplaceOutcome> {
        // The entry guard holds the shard lock across compare and swap
        match self.applications.get_mut(&current.id) {
            Some(mut entry) => {
                if entry.status != current.status || entry.updated_at != current.updated_at {
                    return Ok(ReplaceOutcome::Stale);
                }
                *entry = updated.clone();
                Ok(ReplaceOutcome::Replaced)
            }
            None => Ok(ReplaceOutcome::Missing),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.applications.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationStatus;
    use chrono::{Duration, Utc};

    fn application(name: &str, minutes_ago: i64) -> Application {
        let mut app = Application::new(
            name.to_string(),
            format!("{}@example.com", name),
            None,
            None,
            None,
        );
        app.created_at = app.created_at - Duration::minutes(minutes_ago);
        app
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let store = InMemoryApplicationStore::new();
        let app = application("ada", 0);
        let id = app.id.clone();

        store.insert(app.clone()).await.unwrap();
        assert!(store.insert(app).await.is_err());
        assert_eq!(store.get(&id).await.unwrap().unwrap().full_name, "ada");

        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paginated() {
        let store = InMemoryApplicationStore::new();
        for (name, age) in [("old", 30), ("new", 1), ("mid", 10)] {
            store.insert(application(name, age)).await.unwrap();
        }

        let (page, total) = store
            .list(&ApplicationFilter::default(), 2, 0)
            .await
            .unwrap();
        assert_eq!(total, 3);
        let names: Vec<_> = page.iter().map(|a| a.full_name.as_str()).collect();
        assert_eq!(names, ["new", "mid"]);

        let (page, _) = store
            .list(&ApplicationFilter::default(), 2, 2)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].full_name, "old");
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let store = InMemoryApplicationStore::new();
        let mut reviewed = application("reviewed", 0);
        reviewed.status = ApplicationStatus::UnderReview;
        store.insert(reviewed).await.unwrap();
        store.insert(application("fresh", 0)).await.unwrap();

        let filter = ApplicationFilter {
            status: Some(ApplicationStatus::UnderReview),
        };
        let (page, total) = store.list(&filter, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].full_name, "reviewed");
    }

    #[tokio::test]
    async fn test_replace_missing() {
        let store = InMemoryApplicationStore::new();
        let ghost = application("ghost", 0);
        assert_eq!(
            store.replace(&ghost, &ghost).await.unwrap(),
            ReplaceOutcome::Missing
        );
    }

    #[tokio::test]
    async fn test_replace_rejects_stale_snapshot() {
        let store = InMemoryApplicationStore::new();
        let app = application("racer", 5);
        let id = app.id.clone();
        store.insert(app).await.unwrap();

        let first = store.get(&id).await.unwrap().unwrap();
        let second = store.get(&id).await.unwrap().unwrap();

        let mut accepted = first.clone();
        accepted.status = ApplicationStatus::Accepted;
        accepted.updated_at = Utc::now();
        let mut rejected = second.clone();
        rejected.status = ApplicationStatus::Rejected;
        rejected.updated_at = Utc::now();

        assert_eq!(
            store.replace(&first, &accepted).await.unwrap(),
            ReplaceOutcome::Replaced
        );
        assert_eq!(
            store.replace(&second, &rejected).await.unwrap(),
            ReplaceOutcome::Stale
        );

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, ApplicationStatus::Accepted);
    }

    #[tokio::test]
    async fn test_replace_rejects_detail_edit_after_status_change() {
        let store = InMemoryApplicationStore::new();
        let app = application("frozen", 5);
        let id = app.id.clone();
        store.insert(app).await.unwrap();

        let snapshot = store.get(&id).await.unwrap().unwrap();

        let mut withdrawn = snapshot.clone();
        withdrawn.status = ApplicationStatus::Withdrawn;
        withdrawn.updated_at = Utc::now();
        store.replace(&snapshot, &withdrawn).await.unwrap();

        let mut renamed = snapshot.clone();
        renamed.full_name = "renamed".to_string();
        renamed.updated_at = Utc::now();
        assert_eq!(
            store.replace(&snapshot, &renamed).await.unwrap(),
            ReplaceOutcome::Stale
        );
        assert_eq!(store.get(&id).await.unwrap().unwrap().full_name, "frozen");
    }

    #[tokio::test]
    async fn test_list_skip_past_end_is_empty() {
        let store = InMemoryApplicationStore::new();
        store.insert(application("only", 0)).await.unwrap();

        let (page, total) = store
            .list(&ApplicationFilter::default(), 10, u64::MAX)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert!(page.is_empty());
    }
}
