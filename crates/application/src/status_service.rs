//! Aggregate health and statistics derived from store and scheduler state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use privlease_core::AppResult;

use crate::grant_ports::{GrantStatusCounts, GrantStore, RevocationScheduler};

/// Expiry window summary over the currently active grants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveGrantSummary {
    /// Number of active grants.
    pub count: usize,
    /// Earliest upcoming expiry among active grants.
    pub next_expiry: Option<DateTime<Utc>>,
    /// Latest upcoming expiry among active grants.
    pub last_expiry: Option<DateTime<Utc>>,
}

/// Health flag derived from scheduler and cleanup lag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceHealth {
    /// Every active grant still has a future revocation deadline.
    Healthy,
    /// Active grants exist whose deadline has already passed.
    Warning {
        /// Number of active grants past their deadline.
        overdue_active_grants: usize,
    },
}

/// Point-in-time snapshot of the grant system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// When the snapshot was taken.
    pub current_time: DateTime<Utc>,
    /// Number of grants ever created.
    pub total_grants: u64,
    /// Per-status totals over the full history.
    pub status_breakdown: GrantStatusCounts,
    /// Expiry window summary over active grants.
    pub active_grants: ActiveGrantSummary,
    /// Number of revocation jobs currently pending.
    pub scheduled_job_count: usize,
    /// Derived health flag.
    pub health: ServiceHealth,
}

/// Read-only service deriving status reports from store and scheduler.
#[derive(Clone)]
pub struct StatusService {
    store: Arc<dyn GrantStore>,
    scheduler: Arc<dyn RevocationScheduler>,
}

impl StatusService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(store: Arc<dyn GrantStore>, scheduler: Arc<dyn RevocationScheduler>) -> Self {
        Self { store, scheduler }
    }

    /// Produces a point-in-time status report.
    pub async fn report(&self) -> AppResult<StatusReport> {
        let current_time = Utc::now();
        let status_breakdown = self.store.count_grants_by_status().await?;
        let active = self.store.list_active_grants(None).await?;
        let scheduled_job_count = self.scheduler.scheduled_job_count().await?;

        let active_grants = ActiveGrantSummary {
            count: active.len(),
            next_expiry: active.iter().map(|grant| grant.scheduled_revoke_at).min(),
            last_expiry: active.iter().map(|grant| grant.scheduled_revoke_at).max(),
        };

        let overdue_active_grants = active
            .iter()
            .filter(|grant| grant.is_overdue(current_time))
            .count();
        let health = if overdue_active_grants == 0 {
            ServiceHealth::Healthy
        } else {
            ServiceHealth::Warning {
                overdue_active_grants,
            }
        };

        Ok(StatusReport {
            current_time,
            total_grants: status_breakdown.total(),
            status_breakdown,
            active_grants,
            scheduled_job_count,
            health,
        })
    }
}
