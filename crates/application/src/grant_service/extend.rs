use chrono::{Duration, Utc};

use privlease_core::{AppError, AppResult};
use privlease_domain::{AuditAction, Grant, validate_extension_hours};

use crate::grant_ports::{AuditEvent, GrantListQuery};

use super::{GRANT_RESOURCE_TYPE, GrantService};

impl GrantService {
    /// Pushes an active grant's scheduled revocation forward.
    ///
    /// The new deadline is the current `scheduled_revoke_at` plus
    /// `extra_hours`; the pending job is replaced under the same logical
    /// key and the record is updated in place with status unchanged.
    pub async fn extend(
        &self,
        actor: &str,
        principal: &str,
        resource: &str,
        extra_hours: i64,
    ) -> AppResult<Grant> {
        validate_extension_hours(extra_hours)?;

        let key_lock = self.key_lock(principal, resource)?;
        let _guard = key_lock.lock().await;

        let Some(active) = self.store.find_active_grant(principal, resource).await? else {
            // A grant that already reached a terminal state is not
            // extendable; only a key with no history at all is missing.
            let history = self
                .store
                .list_grants(GrantListQuery {
                    principal: Some(principal.to_owned()),
                    resource: Some(resource.to_owned()),
                    include_terminal: true,
                })
                .await?;

            if history.is_empty() {
                return Err(AppError::NotFound(format!(
                    "no grant for '{principal}' on '{resource}'"
                )));
            }

            return Err(AppError::Conflict(format!(
                "grant for '{principal}' on '{resource}' is not extendable: it is already \
                 terminal"
            )));
        };

        let now = Utc::now();
        if active.scheduled_revoke_at <= now {
            return Err(AppError::Conflict(format!(
                "grant {} for '{principal}' on '{resource}' is not extendable: its expiry is \
                 already pending",
                active.id,
            )));
        }

        let new_revoke_at = active.scheduled_revoke_at + Duration::hours(extra_hours);

        if let Some(job_key) = active.scheduled_job_key.as_deref() {
            self.scheduler.unschedule(job_key).await?;
        }

        let job_key = match self.scheduler.schedule(principal, resource, new_revoke_at).await {
            Ok(job_key) => job_key,
            Err(error) => {
                // Restore the original deadline so the grant keeps a pending
                // job; the cleanup sweep covers the case where even the
                // restore fails.
                if let Err(restore_error) = self
                    .scheduler
                    .schedule(principal, resource, active.scheduled_revoke_at)
                    .await
                {
                    tracing::warn!(
                        principal = %principal,
                        resource = %resource,
                        error = %restore_error,
                        "failed to restore original revocation job after extension failure"
                    );
                }

                return Err(AppError::Scheduling(format!(
                    "failed to reschedule revocation job for '{principal}' on '{resource}': \
                     {error}"
                )));
            }
        };

        let extended = self
            .store
            .update_active_schedule(principal, resource, new_revoke_at, job_key)
            .await?;

        self.audit_repository
            .append_event(AuditEvent {
                actor: actor.to_owned(),
                action: AuditAction::GrantExtended,
                resource_type: GRANT_RESOURCE_TYPE.to_owned(),
                resource_id: extended.id.to_string(),
                detail: Some(format!(
                    "extended grant for '{}' on '{}' by {extra_hours}h until '{}'",
                    extended.principal,
                    extended.resource,
                    extended.scheduled_revoke_at.to_rfc3339(),
                )),
            })
            .await?;

        Ok(extended)
    }
}
