use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use privlease_application::{RevocationScheduler, ScheduledRevocationHandler};
use privlease_core::AppResult;
use privlease_domain::logical_grant_key;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledJob {
    principal: String,
    resource: String,
    fire_at: DateTime<Utc>,
}

/// In-process revocation scheduler driven by a periodic due-job scan.
///
/// Jobs are indexed by logical key, so cancellation never involves pattern
/// matching on job names. Firing is at-least-once: a job is removed only
/// after its handler returned success, and a failed handler invocation
/// leaves the job in place for the next scan. Minute-scale scan granularity
/// is acceptable for this domain; the cleanup sweep covers scan-interval
/// gaps and process restarts.
#[derive(Debug, Default)]
pub struct InProcessRevocationScheduler {
    jobs: RwLock<HashMap<String, ScheduledJob>>,
}

impl InProcessRevocationScheduler {
    /// Creates a scheduler with no pending jobs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Fires every job due at `now` and returns the number fired.
    ///
    /// Jobs whose handler fails stay registered and are retried on the next
    /// scan. A job rescheduled while firing (its `fire_at` changed) is kept.
    pub async fn fire_due(
        &self,
        now: DateTime<Utc>,
        handler: &dyn ScheduledRevocationHandler,
    ) -> usize {
        let due: Vec<(String, ScheduledJob)> = self
            .jobs
            .read()
            .await
            .iter()
            .filter(|(_, job)| job.fire_at <= now)
            .map(|(key, job)| (key.clone(), job.clone()))
            .collect();

        let mut fired = 0_usize;
        for (key, job) in due {
            match handler.revoke_due(&job.principal, &job.resource).await {
                Ok(()) => {
                    fired += 1;
                    let mut jobs = self.jobs.write().await;
                    if jobs.get(&key).is_some_and(|current| current == &job) {
                        jobs.remove(&key);
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        job_key = %key,
                        error = %error,
                        "scheduled revocation failed; job stays registered for retry"
                    );
                }
            }
        }

        fired
    }

    /// Runs the scan loop until the surrounding task is dropped.
    pub async fn run(
        self: Arc<Self>,
        handler: Arc<dyn ScheduledRevocationHandler>,
        scan_interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let fired = self.fire_due(Utc::now(), handler.as_ref()).await;
            if fired > 0 {
                tracing::info!(fired, "revocation scan fired due jobs");
            }
        }
    }
}

#[async_trait]
impl RevocationScheduler for InProcessRevocationScheduler {
    async fn schedule(
        &self,
        principal: &str,
        resource: &str,
        fire_at: DateTime<Utc>,
    ) -> AppResult<String> {
        let job_key = logical_grant_key(principal, resource);
        self.jobs.write().await.insert(
            job_key.clone(),
            ScheduledJob {
                principal: principal.to_owned(),
                resource: resource.to_owned(),
                fire_at,
            },
        );
        Ok(job_key)
    }

    async fn unschedule(&self, job_key: &str) -> AppResult<()> {
        self.jobs.write().await.remove(job_key);
        Ok(())
    }

    async fn unschedule_matching(&self, resource: Option<&str>) -> AppResult<usize> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| resource.is_some_and(|resource| job.resource != resource));
        Ok(before - jobs.len())
    }

    async fn scheduled_job_count(&self) -> AppResult<usize> {
        Ok(self.jobs.read().await.len())
    }
}
