use chrono::{Duration, Utc};

use privlease_core::{AppError, AppResult, NonEmptyString};
use privlease_domain::{AuditAction, Grant, SchemaPermission, validate_grant_duration_hours};

use crate::grant_ports::{AuditEvent, NewGrant};

use super::{GRANT_RESOURCE_TYPE, GrantService};

/// Input payload for issuing a time-bounded grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    /// Account receiving the elevated permissions.
    pub principal: String,
    /// Protected schema the permissions apply to.
    pub resource: String,
    /// Grant duration in whole hours.
    pub duration_hours: i64,
    /// Permissions to elevate; must not be empty.
    pub permissions: Vec<SchemaPermission>,
    /// Free-text justification kept for audit purposes.
    pub reason: Option<String>,
    /// Contact to reach while the elevation is live.
    pub emergency_contact: Option<String>,
}

impl GrantService {
    /// Issues a time-bounded grant and schedules its automatic revocation.
    ///
    /// The permission change is applied first; the revocation job second;
    /// the record is persisted only after both side effects succeeded. A
    /// scheduling failure compensates by removing the just-applied
    /// permissions so nothing is left elevated without an expiry.
    pub async fn grant(&self, actor: &str, request: GrantRequest) -> AppResult<Grant> {
        let principal: String = NonEmptyString::new(request.principal)?.into();
        let resource: String = NonEmptyString::new(request.resource)?.into();

        validate_grant_duration_hours(request.duration_hours)?;

        if request.permissions.is_empty() {
            return Err(AppError::Validation(
                "at least one permission must be requested".to_owned(),
            ));
        }

        let mut permissions = request.permissions;
        permissions.sort_unstable();
        permissions.dedup();

        let key_lock = self.key_lock(&principal, &resource)?;
        let _guard = key_lock.lock().await;

        let now = Utc::now();
        if let Some(existing) = self.store.find_active_grant(&principal, &resource).await? {
            return Err(AppError::Conflict(format!(
                "grant {} for '{principal}' on '{resource}' is already active with {} minutes \
                 remaining",
                existing.id,
                existing.remaining_minutes(now),
            )));
        }

        if !self.backend.validate_entities(&principal, &resource).await? {
            return Err(AppError::Validation(format!(
                "principal '{principal}' or resource '{resource}' does not exist"
            )));
        }

        let scheduled_revoke_at = now + Duration::hours(request.duration_hours);

        self.backend
            .apply_permissions(&principal, &resource, &permissions)
            .await?;

        let job_key = match self
            .scheduler
            .schedule(&principal, &resource, scheduled_revoke_at)
            .await
        {
            Ok(job_key) => job_key,
            Err(error) => {
                // Undo the applied permissions before reporting the failure;
                // an unscheduled elevation must never survive this call.
                if let Err(compensation_error) = self
                    .backend
                    .remove_permissions(&principal, &resource, &permissions)
                    .await
                {
                    tracing::warn!(
                        principal = %principal,
                        resource = %resource,
                        error = %compensation_error,
                        "failed to compensate applied permissions after scheduling failure"
                    );
                }

                return Err(AppError::Scheduling(format!(
                    "failed to register revocation job for '{principal}' on '{resource}': {error}"
                )));
            }
        };

        let grant = match self
            .store
            .insert_grant(NewGrant {
                principal: principal.clone(),
                resource: resource.clone(),
                permissions: permissions.clone(),
                granted_at: now,
                scheduled_revoke_at,
                granted_by: actor.to_owned(),
                reason: request.reason,
                emergency_contact: request.emergency_contact,
                scheduled_job_key: job_key.clone(),
            })
            .await
        {
            Ok(grant) => grant,
            Err(error) => {
                // The record could not be persisted, so both side effects
                // are rolled back before the error surfaces.
                if let Err(unschedule_error) = self.scheduler.unschedule(&job_key).await {
                    tracing::warn!(
                        job_key = %job_key,
                        error = %unschedule_error,
                        "failed to unschedule revocation job after persist failure"
                    );
                }
                if let Err(compensation_error) = self
                    .backend
                    .remove_permissions(&principal, &resource, &permissions)
                    .await
                {
                    tracing::warn!(
                        principal = %principal,
                        resource = %resource,
                        error = %compensation_error,
                        "failed to compensate applied permissions after persist failure"
                    );
                }

                return Err(error);
            }
        };

        self.audit_repository
            .append_event(AuditEvent {
                actor: actor.to_owned(),
                action: AuditAction::GrantCreated,
                resource_type: GRANT_RESOURCE_TYPE.to_owned(),
                resource_id: grant.id.to_string(),
                detail: Some(format!(
                    "granted {:?} to '{}' on '{}' until '{}'",
                    permission_names(&grant.permissions),
                    grant.principal,
                    grant.resource,
                    grant.scheduled_revoke_at.to_rfc3339(),
                )),
            })
            .await?;

        Ok(grant)
    }
}

pub(super) fn permission_names(permissions: &[SchemaPermission]) -> Vec<&'static str> {
    permissions
        .iter()
        .map(SchemaPermission::as_str)
        .collect()
}
