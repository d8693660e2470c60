use privlease_core::{AppError, AppResult, NonEmptyString};
use privlease_domain::{GrantId, GrantStatus};

use super::GrantService;

/// Per-grant outcome of an emergency revocation sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyRevocationOutcome {
    /// Identifier of the processed grant.
    pub grant_id: GrantId,
    /// Account the grant belonged to.
    pub principal: String,
    /// Schema the grant applied to.
    pub resource: String,
    /// Whether the record transitioned to `EmergencyRevoked`.
    pub revoked: bool,
    /// Error detail when any step of the item failed.
    pub error: Option<String>,
}

/// Aggregate result of an emergency revocation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmergencyRevocationReport {
    /// Number of records transitioned to `EmergencyRevoked`.
    pub revoked_count: usize,
    /// Per-grant outcomes, including failed items.
    pub outcomes: Vec<EmergencyRevocationOutcome>,
    /// Pending jobs removed by the independent safety sweep.
    pub unscheduled_job_count: usize,
}

impl GrantService {
    /// Revokes every active grant at once, optionally scoped to a resource.
    ///
    /// Items are processed with failure isolation: a backend failure on one
    /// grant is recorded in its outcome and never stops the rest, and the
    /// record still transitions so no stale elevation stays reported as
    /// active. An independent sweep then drops every pending job matching
    /// the filter.
    pub async fn emergency_revoke_all(
        &self,
        actor: &str,
        resource_filter: Option<&str>,
        reason: &str,
    ) -> AppResult<EmergencyRevocationReport> {
        let reason: String = NonEmptyString::new(reason)?.into();

        let active = self.store.list_active_grants(resource_filter).await?;

        let mut report = EmergencyRevocationReport::default();
        for grant in active {
            let key_lock = self.key_lock(&grant.principal, &grant.resource)?;
            let _guard = key_lock.lock().await;

            let outcome = match self
                .finish_active_grant(
                    &grant.principal,
                    &grant.resource,
                    GrantStatus::EmergencyRevoked,
                    actor,
                    Some(reason.clone()),
                )
                .await
            {
                Ok(completed) => {
                    report.revoked_count += 1;
                    EmergencyRevocationOutcome {
                        grant_id: grant.id,
                        principal: grant.principal,
                        resource: grant.resource,
                        revoked: true,
                        error: completed.backend_error,
                    }
                }
                Err(AppError::NotFound(_)) => EmergencyRevocationOutcome {
                    grant_id: grant.id,
                    principal: grant.principal,
                    resource: grant.resource,
                    revoked: false,
                    error: Some("grant already terminal".to_owned()),
                },
                Err(error) => {
                    tracing::warn!(
                        grant_id = %grant.id,
                        error = %error,
                        "emergency revocation failed for one grant; continuing"
                    );
                    EmergencyRevocationOutcome {
                        grant_id: grant.id,
                        principal: grant.principal,
                        resource: grant.resource,
                        revoked: false,
                        error: Some(error.to_string()),
                    }
                }
            };

            report.outcomes.push(outcome);
        }

        // Safety sweep, independent of per-record processing: no pending
        // job matching the filter may survive an emergency revocation.
        report.unscheduled_job_count = self.scheduler.unschedule_matching(resource_filter).await?;

        Ok(report)
    }
}
