use super::{AnalysisJob, JobOutcome, JobStore, JobSubscription, NewAnalysisJob};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{RwLock, watch};
use tracing::debug;
use uuid::Uuid;

/// Process-local job store with a live change feed per record.
///
/// Each record lives inside a `watch` channel, so a terminal write and the
/// notification to every subscriber happen under one lock.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, watch::Sender<AnalysisJob>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, new_job: NewAnalysisJob) -> Result<AnalysisJob, StoreError> {
        let job = AnalysisJob::new(new_job);
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id));
        }
        let (tx, _) = watch::channel(job.clone());
        jobs.insert(job.id, tx);
        debug!("Created analysis job {}", job.id);
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<AnalysisJob, StoreError> {
        let jobs = self.jobs.read().await;
        let tx = jobs.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(tx.borrow().clone())
    }

    async fn finish(&self, id: Uuid, outcome: JobOutcome) -> Result<AnalysisJob, StoreError> {
        let jobs = self.jobs.read().await;
        let tx = jobs.get(&id).ok_or(StoreError::NotFound(id))?;

        let mut rejection = None;
        tx.send_if_modified(|job| match job.finish(outcome) {
            Ok(()) => true,
            Err(e) => {
                rejection = Some(e);
                false
            }
        });

        match rejection {
            Some(e) => Err(e),
            None => Ok(tx.borrow().clone()),
        }
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<AnalysisJob>, StoreError> {
        let jobs = self.jobs.read().await;
        let mut owned: Vec<AnalysisJob> = jobs
            .values()
            .map(|tx| tx.borrow().clone())
            .filter(|job| job.user_id == user_id)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn subscribe(&self, id: Uuid) -> Result<JobSubscription, StoreError> {
        let jobs = self.jobs.read().await;
        let tx = jobs.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(JobSubscription::Live(tx.subscribe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JobStatus;
    use crate::store::job::tests::{new_job, report};

    #[tokio::test]
    async fn create_then_get() {
        let store = InMemoryJobStore::new();
        let job = store.create(new_job("athlete-1")).await.unwrap();
        let fetched = store.get(job.id).await.unwrap();
        assert_eq!(fetched, job);
        assert_eq!(fetched.status(), JobStatus::Processing);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.get(id).await.unwrap_err(), StoreError::NotFound(id));
        assert!(store.subscribe(id).await.is_err());
    }

    #[tokio::test]
    async fn finish_is_applied_once() {
        let store = InMemoryJobStore::new();
        let job = store.create(new_job("athlete-1")).await.unwrap();

        let done = store
            .finish(job.id, JobOutcome::Completed(report(88)))
            .await
            .unwrap();
        assert_eq!(done.status(), JobStatus::Completed);

        let late = store
            .finish(job.id, JobOutcome::Failed("late".to_string()))
            .await;
        assert!(matches!(late, Err(StoreError::AlreadyTerminal { .. })));
        assert_eq!(store.get(job.id).await.unwrap().result().unwrap().score, 88);
    }

    #[tokio::test]
    async fn subscribers_see_terminal_write() {
        let store = InMemoryJobStore::new();
        let job = store.create(new_job("athlete-1")).await.unwrap();
        let JobSubscription::Live(mut rx) = store.subscribe(job.id).await.unwrap() else {
            panic!("in-memory store should offer a live feed");
        };
        assert_eq!(rx.borrow_and_update().status(), JobStatus::Processing);

        store
            .finish(job.id, JobOutcome::Failed("decoder crashed".to_string()))
            .await
            .unwrap();

        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.failure_cause(), Some("decoder crashed"));
    }

    #[tokio::test]
    async fn rejected_write_does_not_notify() {
        let store = InMemoryJobStore::new();
        let job = store.create(new_job("athlete-1")).await.unwrap();
        store
            .finish(job.id, JobOutcome::Completed(report(70)))
            .await
            .unwrap();

        let JobSubscription::Live(rx) = store.subscribe(job.id).await.unwrap() else {
            panic!("in-memory store should offer a live feed");
        };
        let _ = store
            .finish(job.id, JobOutcome::Failed("late".to_string()))
            .await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn lists_user_jobs_newest_first() {
        let store = InMemoryJobStore::new();
        let first = store.create(new_job("athlete-1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create(new_job("athlete-1")).await.unwrap();
        store.create(new_job("athlete-2")).await.unwrap();

        let listed = store.list_for_user("athlete-1").await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|job| job.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(store.len().await, 3);
    }
}
