//! Periodic background sweep over tracked applications.
//!
//! One sweep tick runs the automatic transition rules and the staleness
//! check. A failing tick backs off on a shorter interval instead of killing
//! the loop.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info};

use crate::tracker::StatusTracker;

pub struct BackgroundScheduler {
    tracker: Arc<StatusTracker>,
    interval: Duration,
    error_backoff: Duration,
}

impl BackgroundScheduler {
    pub fn new(tracker: Arc<StatusTracker>, interval: Duration, error_backoff: Duration) -> Self {
        Self {
            tracker,
            interval,
            error_backoff,
        }
    }

    /// Run the sweep loop until the task is aborted or the runtime shuts
    /// down.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "status sweep started");
            loop {
                match self.tick().await {
                    Ok((advanced, flagged)) => {
                        debug!(advanced, flagged, "status sweep completed");
                        sleep(self.interval).await;
                    }
                    Err(e) => {
                        error!(error = %e, "status sweep failed");
                        sleep(self.error_backoff).await;
                    }
                }
            }
        })
    }

    /// One sweep pass. Returns how many applications were auto-advanced and
    /// how many were newly flagged stale.
    pub async fn tick(&self) -> Result<(usize, usize)> {
        let now = Utc::now();
        let advanced = self.tracker.run_auto_transitions(now).await?;
        let flagged = self.tracker.run_staleness_check(now).await?;
        Ok((advanced, flagged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opportunity::Opportunity;
    use crate::store::{ApplicationStore, MemoryApplicationStore};
    use crate::tracker::model::{
        ApplicationPriority, ApplicationStage, EventKind, TrackedApplication,
    };
    use crate::tracker::rules::TransitionRules;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn opportunity() -> Opportunity {
        Opportunity {
            id: "opp-1".into(),
            title: "Engineer".into(),
            organization: "Acme".into(),
            description: String::new(),
            apply_url: None,
            url: None,
        }
    }

    async fn seed(store: &MemoryApplicationStore, tracker: &StatusTracker, id: &str, idle_days: i64) {
        tracker
            .create_application_tracking(id, "u1", &opportunity(), ApplicationPriority::Medium)
            .await
            .unwrap();
        let mut app = store.load_application(id).await.unwrap().unwrap();
        app.last_updated = app.last_updated - ChronoDuration::days(idle_days);
        app.submitted_at = app.submitted_at - ChronoDuration::days(idle_days);
        store.save_application(&app).await.unwrap();
    }

    #[tokio::test]
    async fn tick_advances_and_flags() {
        let store = Arc::new(MemoryApplicationStore::default());
        let tracker = Arc::new(StatusTracker::new(store.clone(), TransitionRules, 30));
        // One application a week idle, one far beyond the staleness window
        // in a stage with no transition rule.
        seed(&store, &tracker, "app-due", 8).await;
        tracker
            .create_application_tracking(
                "app-stale",
                "u1",
                &opportunity(),
                ApplicationPriority::Medium,
            )
            .await
            .unwrap();
        tracker
            .update_application_stage(
                "app-stale",
                ApplicationStage::Screening,
                None,
                serde_json::Value::Null,
                crate::tracker::model::EventSource::User,
            )
            .await
            .unwrap();
        let mut app = store.load_application("app-stale").await.unwrap().unwrap();
        app.last_updated = app.last_updated - ChronoDuration::days(40);
        store.save_application(&app).await.unwrap();

        let scheduler = BackgroundScheduler::new(
            tracker.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(300),
        );
        let (advanced, flagged) = scheduler.tick().await.unwrap();
        assert_eq!(advanced, 1);
        assert_eq!(flagged, 1);

        let due = store.load_application("app-due").await.unwrap().unwrap();
        assert_eq!(due.current_stage, ApplicationStage::UnderReview);
        let stale = store.load_application("app-stale").await.unwrap().unwrap();
        assert_eq!(
            stale.events.last().unwrap().kind,
            EventKind::StaleApplicationDetected
        );
    }

    #[tokio::test]
    async fn tick_is_idempotent_when_nothing_is_due() {
        let store = Arc::new(MemoryApplicationStore::default());
        let tracker = Arc::new(StatusTracker::new(store.clone(), TransitionRules, 30));
        tracker
            .create_application_tracking("app-1", "u1", &opportunity(), ApplicationPriority::Low)
            .await
            .unwrap();

        let scheduler = BackgroundScheduler::new(
            tracker,
            Duration::from_secs(3600),
            Duration::from_secs(300),
        );
        assert_eq!(scheduler.tick().await.unwrap(), (0, 0));
        assert_eq!(scheduler.tick().await.unwrap(), (0, 0));
    }

    /// Store double whose listing can be taken down to fail a whole tick.
    #[derive(Default)]
    struct FlakyListing {
        inner: MemoryApplicationStore,
        listing_down: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ApplicationStore for FlakyListing {
        async fn save_application(&self, application: &TrackedApplication) -> Result<()> {
            self.inner.save_application(application).await
        }

        async fn load_application(
            &self,
            application_id: &str,
        ) -> Result<Option<TrackedApplication>> {
            self.inner.load_application(application_id).await
        }

        async fn list_applications(&self) -> Result<Vec<TrackedApplication>> {
            if self.listing_down.load(Ordering::SeqCst) {
                anyhow::bail!("listing unavailable");
            }
            self.inner.list_applications().await
        }

        async fn list_for_user(&self, user_id: &str) -> Result<Vec<TrackedApplication>> {
            self.inner.list_for_user(user_id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_retries_on_the_backoff_interval() {
        let store = Arc::new(FlakyListing::default());
        let tracker = Arc::new(StatusTracker::new(store.clone(), TransitionRules, 30));
        seed(&store.inner, &tracker, "app-due", 8).await;
        store.listing_down.store(true, Ordering::SeqCst);

        let scheduler = BackgroundScheduler::new(
            tracker.clone(),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        );
        let worker = scheduler.spawn();

        // First tick fails while listing is down.
        sleep(Duration::from_millis(10)).await;
        store.listing_down.store(false, Ordering::SeqCst);

        // The retry lands after the backoff, well before the next regular
        // tick, and picks up the overdue transition.
        sleep(Duration::from_secs(6)).await;
        let app = store.inner.load_application("app-due").await.unwrap().unwrap();
        assert_eq!(app.current_stage, ApplicationStage::UnderReview);
        worker.abort();
    }
}
