use crate::config::WatcherSettings;
use crate::error::StoreError;
use crate::pipeline::types::AnalysisReport;
use crate::store::{AnalysisJob, JobState, JobStatus, JobStore, JobSubscription};
use futures::stream::{BoxStream, StreamExt};
use std::cell::Cell;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{IntervalStream, WatchStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Something the watcher reports to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// The authoritative status changed.
    Status(JobStatus),
    Completed(AnalysisReport),
    Failed(String),
    /// The local wait expired before the job finished. The job itself is untouched.
    StillProcessing,
    /// The record can no longer be read. Says nothing about how the job ended.
    Lost(String),
}

/// How a watch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    Completed(AnalysisReport),
    Failed(String),
    StillProcessing,
    /// Reading the record failed for good; the job's own state is unknown.
    Lost(String),
    Cancelled,
}

type Callback = Box<dyn FnMut(WatchEvent) + Send>;
type SharedCallback = Arc<Mutex<Option<Callback>>>;
type JobFeed = BoxStream<'static, Result<AnalysisJob, StoreError>>;

thread_local! {
    static DELIVERING: Cell<bool> = const { Cell::new(false) };
}

/// Follows job records until they reach a terminal state.
#[derive(Clone)]
pub struct JobStatusWatcher {
    store: Arc<dyn JobStore>,
    timeout: Duration,
    poll_interval: Duration,
}

impl JobStatusWatcher {
    pub fn new(store: Arc<dyn JobStore>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            store,
            timeout,
            poll_interval,
        }
    }

    pub fn from_settings(store: Arc<dyn JobStore>, settings: &WatcherSettings) -> Self {
        Self::new(store, settings.timeout(), settings.poll_interval())
    }

    /// Starts watching `job_id`, delivering every event to `on_event`.
    ///
    /// Uses the store's change feed when it has one and polls `get`
    /// otherwise. Fails only if the job cannot be found.
    pub async fn subscribe<F>(&self, job_id: Uuid, on_event: F) -> Result<Subscription, StoreError>
    where
        F: FnMut(WatchEvent) + Send + 'static,
    {
        let feed: JobFeed = match self.store.subscribe(job_id).await? {
            JobSubscription::Live(rx) => {
                debug!("Watching job {} through its change feed", job_id);
                WatchStream::new(rx).map(Ok).boxed()
            }
            JobSubscription::Unsupported => {
                // Fail fast on unknown ids before the first tick.
                self.store.get(job_id).await?;
                debug!(
                    "Polling job {} every {}ms",
                    job_id,
                    self.poll_interval.as_millis()
                );
                self.poll(job_id)
            }
        };

        let token = CancellationToken::new();
        let on_event: Callback = Box::new(on_event);
        let callback: SharedCallback = Arc::new(Mutex::new(Some(on_event)));
        let task = tokio::spawn(watch(
            job_id,
            feed,
            self.timeout,
            token.clone(),
            callback.clone(),
        ));

        Ok(Subscription {
            job_id,
            token,
            callback,
            task: Some(task),
        })
    }

    /// Waits for the job without a callback.
    pub async fn wait(&self, job_id: Uuid) -> Result<WatchOutcome, StoreError> {
        Ok(self.subscribe(job_id, |_| {}).await?.outcome().await)
    }

    fn poll(&self, job_id: Uuid) -> JobFeed {
        let store = self.store.clone();
        let mut interval = tokio::time::interval(self.poll_interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        IntervalStream::new(interval)
            .then(move |_| {
                let store = store.clone();
                async move { store.get(job_id).await }
            })
            .boxed()
    }
}

async fn watch(
    job_id: Uuid,
    mut feed: JobFeed,
    timeout: Duration,
    token: CancellationToken,
    callback: SharedCallback,
) -> WatchOutcome {
    let emit = |event: WatchEvent| deliver(&token, &callback, event);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut last_status: Option<JobStatus> = None;

    let outcome = loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Watch of job {} cancelled", job_id);
                break WatchOutcome::Cancelled;
            }
            _ = &mut deadline => {
                info!("Job {} still processing after {}s", job_id, timeout.as_secs());
                emit(WatchEvent::StillProcessing);
                break WatchOutcome::StillProcessing;
            }
            next = feed.next() => {
                let job = match next {
                    Some(Ok(job)) => job,
                    Some(Err(e)) if e.is_retryable() => {
                        warn!("Failed to read job {}: {}", job_id, e);
                        continue;
                    }
                    Some(Err(e)) => {
                        error!("Lost job {}: {}", job_id, e);
                        emit(WatchEvent::Lost(e.to_string()));
                        break WatchOutcome::Lost(e.to_string());
                    }
                    None => {
                        warn!("Change feed for job {} closed", job_id);
                        emit(WatchEvent::StillProcessing);
                        break WatchOutcome::StillProcessing;
                    }
                };

                let status = job.status();
                if last_status != Some(status) {
                    last_status = Some(status);
                    emit(WatchEvent::Status(status));
                }

                match job.state() {
                    JobState::Processing => {}
                    JobState::Completed { report } => {
                        emit(WatchEvent::Completed(report.clone()));
                        break WatchOutcome::Completed(report.clone());
                    }
                    JobState::Failed { cause } => {
                        emit(WatchEvent::Failed(cause.clone()));
                        break WatchOutcome::Failed(cause.clone());
                    }
                }
            }
        }
    };

    callback
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    outcome
}

/// Invokes the callback unless the watch was cancelled.
///
/// The check and the call happen under the callback lock, so nothing is
/// delivered once `Subscription::cancel` has returned.
fn deliver(token: &CancellationToken, callback: &SharedCallback, event: WatchEvent) {
    let mut slot = callback.lock().unwrap_or_else(PoisonError::into_inner);
    if token.is_cancelled() {
        return;
    }
    if let Some(on_event) = slot.as_mut() {
        DELIVERING.with(|flag| flag.set(true));
        on_event(event);
        DELIVERING.with(|flag| flag.set(false));
    }
}

/// A running watch. Dropping it cancels the watch.
pub struct Subscription {
    job_id: Uuid,
    token: CancellationToken,
    callback: SharedCallback,
    task: Option<JoinHandle<WatchOutcome>>,
}

impl Subscription {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Stops delivery and releases the callback.
    ///
    /// Safe to call more than once, from inside the callback, or after the
    /// job already finished.
    pub fn cancel(&self) {
        self.token.cancel();
        if DELIVERING.with(Cell::get) {
            // Called from inside the callback; the watch task drops it on exit.
            return;
        }
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the watch to end.
    pub async fn outcome(mut self) -> WatchOutcome {
        let Some(task) = self.task.take() else {
            return WatchOutcome::Cancelled;
        };
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Watch of job {} aborted: {}", self.job_id, e);
                WatchOutcome::Cancelled
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::job::tests::{new_job, report};
    use crate::store::{InMemoryJobStore, JobOutcome, NewAnalysisJob};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::mpsc;

    /// Store without a change feed, forcing the polling path.
    struct PollingStore(InMemoryJobStore);

    #[async_trait]
    impl JobStore for PollingStore {
        async fn create(&self, new_job: NewAnalysisJob) -> Result<AnalysisJob, StoreError> {
            self.0.create(new_job).await
        }

        async fn get(&self, id: Uuid) -> Result<AnalysisJob, StoreError> {
            self.0.get(id).await
        }

        async fn finish(&self, id: Uuid, outcome: JobOutcome) -> Result<AnalysisJob, StoreError> {
            self.0.finish(id, outcome).await
        }

        async fn list_for_user(&self, user_id: &str) -> Result<Vec<AnalysisJob>, StoreError> {
            self.0.list_for_user(user_id).await
        }
    }

    /// Polling store whose reads fail as scripted, one entry per `get`.
    struct ScriptedReads {
        inner: InMemoryJobStore,
        script: Mutex<VecDeque<Option<StoreError>>>,
    }

    impl ScriptedReads {
        fn new(script: impl IntoIterator<Item = Option<StoreError>>) -> Self {
            Self {
                inner: InMemoryJobStore::new(),
                script: Mutex::new(script.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl JobStore for ScriptedReads {
        async fn create(&self, new_job: NewAnalysisJob) -> Result<AnalysisJob, StoreError> {
            self.inner.create(new_job).await
        }

        async fn get(&self, id: Uuid) -> Result<AnalysisJob, StoreError> {
            let scripted = self.script.lock().unwrap().pop_front().flatten();
            match scripted {
                Some(e) => Err(e),
                None => self.inner.get(id).await,
            }
        }

        async fn finish(&self, id: Uuid, outcome: JobOutcome) -> Result<AnalysisJob, StoreError> {
            self.inner.finish(id, outcome).await
        }

        async fn list_for_user(&self, user_id: &str) -> Result<Vec<AnalysisJob>, StoreError> {
            self.inner.list_for_user(user_id).await
        }
    }

    fn watcher(store: Arc<dyn JobStore>) -> JobStatusWatcher {
        JobStatusWatcher::new(store, Duration::from_secs(180), Duration::from_secs(1))
    }

    fn collect_events() -> (
        impl FnMut(WatchEvent) + Send + 'static,
        mpsc::UnboundedReceiver<WatchEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |event| {
                let _ = tx.send(event);
            },
            rx,
        )
    }

    #[tokio::test]
    async fn live_feed_delivers_completion() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store.create(new_job("athlete-1")).await.unwrap();
        let (on_event, mut events) = collect_events();

        let subscription = watcher(store.clone()).subscribe(job.id, on_event).await.unwrap();
        assert_eq!(events.recv().await, Some(WatchEvent::Status(JobStatus::Processing)));

        store
            .finish(job.id, JobOutcome::Completed(report(92)))
            .await
            .unwrap();

        assert_eq!(subscription.outcome().await, WatchOutcome::Completed(report(92)));
        assert_eq!(events.recv().await, Some(WatchEvent::Status(JobStatus::Completed)));
        assert_eq!(events.recv().await, Some(WatchEvent::Completed(report(92))));
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_delivers_failure_cause() {
        let store = Arc::new(PollingStore(InMemoryJobStore::new()));
        let job = store.create(new_job("athlete-1")).await.unwrap();

        let subscription = watcher(store.clone()).subscribe(job.id, |_| {}).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!subscription.is_finished());

        store
            .finish(job.id, JobOutcome::Failed("video could not be decoded".to_string()))
            .await
            .unwrap();

        assert_eq!(
            subscription.outcome().await,
            WatchOutcome::Failed("video could not be decoded".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn polling_rides_out_backend_read_errors() {
        let outage = || Some(StoreError::Backend("connection reset".to_string()));
        let store = Arc::new(ScriptedReads::new([None, outage(), outage()]));
        let job = store.create(new_job("athlete-1")).await.unwrap();
        store
            .finish(job.id, JobOutcome::Completed(report(64)))
            .await
            .unwrap();
        let (on_event, mut events) = collect_events();

        let subscription = watcher(store.clone()).subscribe(job.id, on_event).await.unwrap();

        assert_eq!(subscription.outcome().await, WatchOutcome::Completed(report(64)));
        assert_eq!(events.recv().await, Some(WatchEvent::Status(JobStatus::Completed)));
        assert_eq!(events.recv().await, Some(WatchEvent::Completed(report(64))));
        assert!(store.script.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn record_vanishing_mid_poll_is_not_a_job_failure() {
        let store = Arc::new(ScriptedReads::new([None]));
        let job = store.create(new_job("athlete-1")).await.unwrap();
        store
            .script
            .lock()
            .unwrap()
            .push_back(Some(StoreError::NotFound(job.id)));
        let (on_event, mut events) = collect_events();

        let subscription = watcher(store.clone()).subscribe(job.id, on_event).await.unwrap();

        let lost = StoreError::NotFound(job.id).to_string();
        assert_eq!(subscription.outcome().await, WatchOutcome::Lost(lost.clone()));
        assert_eq!(events.recv().await, Some(WatchEvent::Lost(lost)));
        assert_eq!(events.recv().await, None);
        assert_eq!(store.get(job.id).await.unwrap().status(), JobStatus::Processing);
    }

    #[tokio::test]
    async fn dropping_the_subscription_stops_delivery() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store.create(new_job("athlete-1")).await.unwrap();
        let (on_event, mut events) = collect_events();

        let subscription = watcher(store.clone()).subscribe(job.id, on_event).await.unwrap();
        assert_eq!(events.recv().await, Some(WatchEvent::Status(JobStatus::Processing)));

        drop(subscription);
        store
            .finish(job.id, JobOutcome::Completed(report(80)))
            .await
            .unwrap();

        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn unknown_job_is_reported_up_front() {
        let store = Arc::new(PollingStore(InMemoryJobStore::new()));
        let missing = Uuid::new_v4();
        let err = watcher(store).wait(missing).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound(missing));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_locally_without_touching_the_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store.create(new_job("athlete-1")).await.unwrap();
        let (on_event, mut events) = collect_events();

        let subscription = watcher(store.clone()).subscribe(job.id, on_event).await.unwrap();
        assert_eq!(subscription.outcome().await, WatchOutcome::StillProcessing);

        assert_eq!(events.recv().await, Some(WatchEvent::Status(JobStatus::Processing)));
        assert_eq!(events.recv().await, Some(WatchEvent::StillProcessing));
        assert_eq!(store.get(job.id).await.unwrap().status(), JobStatus::Processing);
    }

    #[tokio::test]
    async fn no_events_after_cancel() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store.create(new_job("athlete-1")).await.unwrap();
        let (on_event, mut events) = collect_events();

        let subscription = watcher(store.clone()).subscribe(job.id, on_event).await.unwrap();
        assert_eq!(events.recv().await, Some(WatchEvent::Status(JobStatus::Processing)));

        subscription.cancel();
        store
            .finish(job.id, JobOutcome::Completed(report(80)))
            .await
            .unwrap();

        assert_eq!(subscription.outcome().await, WatchOutcome::Cancelled);
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn cancel_after_completion_is_harmless() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store.create(new_job("athlete-1")).await.unwrap();
        store
            .finish(job.id, JobOutcome::Completed(report(70)))
            .await
            .unwrap();

        let subscription = watcher(store).subscribe(job.id, |_| {}).await.unwrap();
        while !subscription.is_finished() {
            tokio::task::yield_now().await;
        }
        subscription.cancel();
        subscription.cancel();
        assert_eq!(subscription.outcome().await, WatchOutcome::Completed(report(70)));
    }

    #[tokio::test]
    async fn cancel_from_inside_the_callback() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = store.create(new_job("athlete-1")).await.unwrap();

        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner = slot.clone();
        let (tx, mut events) = mpsc::unbounded_channel();

        let subscription = watcher(store.clone())
            .subscribe(job.id, move |event| {
                let finished = event == WatchEvent::Status(JobStatus::Completed);
                let _ = tx.send(event);
                if finished && let Some(subscription) = inner.lock().unwrap().as_ref() {
                    subscription.cancel();
                }
            })
            .await
            .unwrap();
        assert_eq!(events.recv().await, Some(WatchEvent::Status(JobStatus::Processing)));
        *slot.lock().unwrap() = Some(subscription);

        store
            .finish(job.id, JobOutcome::Completed(report(88)))
            .await
            .unwrap();

        assert_eq!(events.recv().await, Some(WatchEvent::Status(JobStatus::Completed)));
        assert_eq!(events.recv().await, None);

        let subscription = slot.lock().unwrap().take().unwrap();
        assert!(subscription.is_cancelled());
        assert_eq!(subscription.outcome().await, WatchOutcome::Completed(report(88)));
    }
}
