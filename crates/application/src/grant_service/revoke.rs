use async_trait::async_trait;
use chrono::Utc;

use privlease_core::{AppError, AppResult};
use privlease_domain::{AuditAction, Grant, GrantStatus, SYSTEM_ACTOR};

use crate::grant_ports::{AuditEvent, GrantCompletion, ScheduledRevocationHandler};

use super::{GRANT_RESOURCE_TYPE, GrantService};

/// Aggregate result of one expired-grant cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Number of overdue grants transitioned to `Expired`.
    pub processed_count: usize,
}

/// A finished terminal transition plus any tolerated backend failure.
pub(super) struct CompletedGrant {
    pub(super) grant: Grant,
    pub(super) backend_error: Option<String>,
}

impl GrantService {
    /// Revokes a key's active grant on behalf of an operator.
    pub async fn revoke(&self, actor: &str, principal: &str, resource: &str) -> AppResult<Grant> {
        let key_lock = self.key_lock(principal, resource)?;
        let _guard = key_lock.lock().await;

        self.finish_active_grant(principal, resource, GrantStatus::Revoked, actor, None)
            .await
            .map(|completed| completed.grant)
    }

    /// Expires a key's active grant on behalf of the scheduler or cleanup.
    ///
    /// Returns not-found when the record is already terminal or when its
    /// deadline has been extended past now; for callers on the automatic
    /// path both are the normal "a newer action already ran" outcome, not
    /// an error condition.
    pub async fn revoke_expired(&self, principal: &str, resource: &str) -> AppResult<Grant> {
        let key_lock = self.key_lock(principal, resource)?;
        let _guard = key_lock.lock().await;

        self.finish_active_grant(principal, resource, GrantStatus::Expired, SYSTEM_ACTOR, None)
            .await
            .map(|completed| completed.grant)
    }

    /// Safety net for missed scheduler firings.
    ///
    /// Scans active grants whose deadline has passed and expires each one.
    /// Idempotent: with nothing overdue the sweep reports zero processed.
    pub async fn cleanup_expired(&self) -> AppResult<CleanupReport> {
        let overdue = self.store.list_overdue_grants(Utc::now()).await?;

        let mut processed_count = 0_usize;
        for grant in overdue {
            match self.revoke_expired(&grant.principal, &grant.resource).await {
                Ok(expired) => {
                    processed_count += 1;

                    // The job that should have fired may still be pending in
                    // a lagging scheduler; drop it so it cannot fire against
                    // the now-terminal record.
                    if let Some(job_key) = expired.scheduled_job_key.as_deref() {
                        if let Err(error) = self.scheduler.unschedule(job_key).await {
                            tracing::warn!(
                                job_key = %job_key,
                                error = %error,
                                "failed to unschedule stale revocation job during cleanup"
                            );
                        }
                    }
                }
                Err(AppError::NotFound(_)) => {
                    // Lost the race against the scheduler or an operator.
                }
                Err(error) => {
                    tracing::warn!(
                        principal = %grant.principal,
                        resource = %grant.resource,
                        error = %error,
                        "failed to expire overdue grant during cleanup"
                    );
                }
            }
        }

        Ok(CleanupReport { processed_count })
    }

    /// Transitions a key's active record to a terminal status.
    ///
    /// The permission removal is best effort: per-permission backend
    /// failures are logged and the record still transitions, so the store
    /// never reports an active elevation with no pending job behind it.
    pub(super) async fn finish_active_grant(
        &self,
        principal: &str,
        resource: &str,
        status: GrantStatus,
        actor: &str,
        reason_override: Option<String>,
    ) -> AppResult<CompletedGrant> {
        if !status.is_terminal() {
            return Err(AppError::Internal(
                "grant completion requires a terminal status".to_owned(),
            ));
        }

        let Some(active) = self.store.find_active_grant(principal, resource).await? else {
            return Err(AppError::NotFound(format!(
                "no active grant for '{principal}' on '{resource}'"
            )));
        };

        // An expiry firing can lag behind an extension that already moved
        // the deadline; the replacement job owns the expiry in that case.
        if status == GrantStatus::Expired && active.scheduled_revoke_at > Utc::now() {
            return Err(AppError::NotFound(format!(
                "no overdue grant for '{principal}' on '{resource}'"
            )));
        }

        let backend_error = match self
            .backend
            .remove_permissions(principal, resource, &active.permissions)
            .await
        {
            Ok(()) => None,
            Err(error) => {
                tracing::warn!(
                    principal = %principal,
                    resource = %resource,
                    error = %error,
                    "permission removal failed; grant record transitions regardless"
                );
                Some(error.to_string())
            }
        };

        let completed = self
            .store
            .complete_active_grant(
                principal,
                resource,
                GrantCompletion {
                    status,
                    revoked_at: Utc::now(),
                    revoked_by: actor.to_owned(),
                    reason_override,
                },
            )
            .await?;

        // A fired job consumed itself; only a manual revocation leaves a
        // pending job to cancel. Unscheduling an absent key is a no-op.
        if status == GrantStatus::Revoked {
            if let Some(job_key) = completed.scheduled_job_key.as_deref() {
                if let Err(error) = self.scheduler.unschedule(job_key).await {
                    tracing::warn!(
                        job_key = %job_key,
                        error = %error,
                        "failed to unschedule revocation job after revoke; record already transitioned"
                    );
                }
            }
        }

        self.audit_repository
            .append_event(AuditEvent {
                actor: actor.to_owned(),
                action: audit_action_for(status),
                resource_type: GRANT_RESOURCE_TYPE.to_owned(),
                resource_id: completed.id.to_string(),
                detail: Some(format!(
                    "grant for '{}' on '{}' transitioned to {}",
                    completed.principal,
                    completed.resource,
                    status.as_str(),
                )),
            })
            .await?;

        Ok(CompletedGrant {
            grant: completed,
            backend_error,
        })
    }
}

fn audit_action_for(status: GrantStatus) -> AuditAction {
    match status {
        GrantStatus::Revoked => AuditAction::GrantRevoked,
        GrantStatus::Expired => AuditAction::GrantExpired,
        GrantStatus::EmergencyRevoked => AuditAction::GrantEmergencyRevoked,
        GrantStatus::Active => AuditAction::GrantCreated,
    }
}

#[async_trait]
impl ScheduledRevocationHandler for GrantService {
    async fn revoke_due(&self, principal: &str, resource: &str) -> AppResult<()> {
        match self.revoke_expired(principal, resource).await {
            Ok(_) => Ok(()),
            // Already terminal: a manual revocation won the race.
            Err(AppError::NotFound(_)) => Ok(()),
            Err(error) => Err(error),
        }
    }
}
