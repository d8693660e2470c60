use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use privlease_application::{GrantCompletion, GrantListQuery, GrantStatusCounts, GrantStore, NewGrant};
use privlease_core::{AppError, AppResult};
use privlease_domain::{Grant, GrantId, GrantStatus, SchemaPermission};

/// PostgreSQL-backed grant store.
///
/// A partial unique index on (principal, resource) over active rows
/// enforces the single-active invariant at the database; terminal
/// transitions are single `UPDATE ... WHERE status = 'active'` statements,
/// so the first transition wins and the loser observes not-found.
#[derive(Clone)]
pub struct PostgresGrantStore {
    pool: PgPool,
}

impl PostgresGrantStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct GrantRow {
    id: i64,
    principal: String,
    resource: String,
    permissions: Vec<String>,
    granted_at: DateTime<Utc>,
    scheduled_revoke_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    granted_by: String,
    revoked_by: Option<String>,
    status: String,
    reason: Option<String>,
    emergency_contact: Option<String>,
    scheduled_job_key: Option<String>,
}

impl GrantRow {
    fn into_grant(self) -> AppResult<Grant> {
        let status = GrantStatus::from_str(self.status.as_str()).map_err(|_| {
            AppError::Internal(format!(
                "grant {} carries unknown status '{}'",
                self.id, self.status
            ))
        })?;

        let permissions = self
            .permissions
            .iter()
            .map(|value| {
                SchemaPermission::from_str(value).map_err(|_| {
                    AppError::Internal(format!(
                        "grant {} carries unknown permission '{value}'",
                        self.id
                    ))
                })
            })
            .collect::<AppResult<Vec<SchemaPermission>>>()?;

        Ok(Grant {
            id: GrantId::new(self.id),
            principal: self.principal,
            resource: self.resource,
            permissions,
            granted_at: self.granted_at,
            scheduled_revoke_at: self.scheduled_revoke_at,
            revoked_at: self.revoked_at,
            granted_by: self.granted_by,
            revoked_by: self.revoked_by,
            status,
            reason: self.reason,
            emergency_contact: self.emergency_contact,
            scheduled_job_key: self.scheduled_job_key,
        })
    }
}

const GRANT_COLUMNS: &str = r#"
    id,
    principal,
    resource,
    permissions,
    granted_at,
    scheduled_revoke_at,
    revoked_at,
    granted_by,
    revoked_by,
    status,
    reason,
    emergency_contact,
    scheduled_job_key
"#;

fn permission_values(permissions: &[SchemaPermission]) -> Vec<String> {
    permissions
        .iter()
        .map(|permission| permission.as_str().to_owned())
        .collect()
}

#[async_trait]
impl GrantStore for PostgresGrantStore {
    async fn insert_grant(&self, grant: NewGrant) -> AppResult<Grant> {
        let row = sqlx::query_as::<_, GrantRow>(&format!(
            r#"
            INSERT INTO privilege_grants (
                principal,
                resource,
                permissions,
                granted_at,
                scheduled_revoke_at,
                granted_by,
                status,
                reason,
                emergency_contact,
                scheduled_job_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'active', $7, $8, $9)
            RETURNING {GRANT_COLUMNS}
            "#
        ))
        .bind(grant.principal.as_str())
        .bind(grant.resource.as_str())
        .bind(permission_values(&grant.permissions))
        .bind(grant.granted_at)
        .bind(grant.scheduled_revoke_at)
        .bind(grant.granted_by.as_str())
        .bind(grant.reason.as_deref())
        .bind(grant.emergency_contact.as_deref())
        .bind(grant.scheduled_job_key.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            if error
                .as_database_error()
                .is_some_and(|database_error| database_error.is_unique_violation())
            {
                AppError::Conflict(format!(
                    "active grant already exists for '{}' on '{}'",
                    grant.principal, grant.resource
                ))
            } else {
                AppError::Internal(format!(
                    "failed to insert grant for '{}' on '{}': {error}",
                    grant.principal, grant.resource
                ))
            }
        })?;

        row.into_grant()
    }

    async fn find_active_grant(
        &self,
        principal: &str,
        resource: &str,
    ) -> AppResult<Option<Grant>> {
        let row = sqlx::query_as::<_, GrantRow>(&format!(
            r#"
            SELECT {GRANT_COLUMNS}
            FROM privilege_grants
            WHERE principal = $1
              AND resource = $2
              AND status = 'active'
            "#
        ))
        .bind(principal)
        .bind(resource)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to look up active grant for '{principal}' on '{resource}': {error}"
            ))
        })?;

        row.map(GrantRow::into_grant).transpose()
    }

    async fn update_active_schedule(
        &self,
        principal: &str,
        resource: &str,
        scheduled_revoke_at: DateTime<Utc>,
        scheduled_job_key: String,
    ) -> AppResult<Grant> {
        let row = sqlx::query_as::<_, GrantRow>(&format!(
            r#"
            UPDATE privilege_grants
            SET scheduled_revoke_at = $3,
                scheduled_job_key = $4
            WHERE principal = $1
              AND resource = $2
              AND status = 'active'
            RETURNING {GRANT_COLUMNS}
            "#
        ))
        .bind(principal)
        .bind(resource)
        .bind(scheduled_revoke_at)
        .bind(scheduled_job_key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to update schedule for '{principal}' on '{resource}': {error}"
            ))
        })?;

        let Some(row) = row else {
            return Err(AppError::NotFound(format!(
                "no active grant for '{principal}' on '{resource}'"
            )));
        };

        row.into_grant()
    }

    async fn complete_active_grant(
        &self,
        principal: &str,
        resource: &str,
        completion: GrantCompletion,
    ) -> AppResult<Grant> {
        if !completion.status.is_terminal() {
            return Err(AppError::Validation(
                "grant completion requires a terminal status".to_owned(),
            ));
        }

        let row = sqlx::query_as::<_, GrantRow>(&format!(
            r#"
            UPDATE privilege_grants
            SET status = $3,
                revoked_at = $4,
                revoked_by = $5,
                reason = COALESCE($6, reason)
            WHERE principal = $1
              AND resource = $2
              AND status = 'active'
            RETURNING {GRANT_COLUMNS}
            "#
        ))
        .bind(principal)
        .bind(resource)
        .bind(completion.status.as_str())
        .bind(completion.revoked_at)
        .bind(completion.revoked_by.as_str())
        .bind(completion.reason_override.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to complete grant for '{principal}' on '{resource}': {error}"
            ))
        })?;

        let Some(row) = row else {
            return Err(AppError::NotFound(format!(
                "no active grant for '{principal}' on '{resource}'"
            )));
        };

        row.into_grant()
    }

    async fn list_grants(&self, query: GrantListQuery) -> AppResult<Vec<Grant>> {
        let rows = sqlx::query_as::<_, GrantRow>(&format!(
            r#"
            SELECT {GRANT_COLUMNS}
            FROM privilege_grants
            WHERE ($1::TEXT IS NULL OR principal = $1)
              AND ($2::TEXT IS NULL OR resource = $2)
              AND ($3 OR status = 'active')
            ORDER BY (status = 'active') DESC, granted_at DESC
            "#
        ))
        .bind(query.principal.as_deref())
        .bind(query.resource.as_deref())
        .bind(query.include_terminal)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list grants: {error}")))?;

        rows.into_iter().map(GrantRow::into_grant).collect()
    }

    async fn list_active_grants(&self, resource: Option<&str>) -> AppResult<Vec<Grant>> {
        let rows = sqlx::query_as::<_, GrantRow>(&format!(
            r#"
            SELECT {GRANT_COLUMNS}
            FROM privilege_grants
            WHERE status = 'active'
              AND ($1::TEXT IS NULL OR resource = $1)
            ORDER BY scheduled_revoke_at ASC
            "#
        ))
        .bind(resource)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list active grants: {error}")))?;

        rows.into_iter().map(GrantRow::into_grant).collect()
    }

    async fn list_overdue_grants(&self, now: DateTime<Utc>) -> AppResult<Vec<Grant>> {
        let rows = sqlx::query_as::<_, GrantRow>(&format!(
            r#"
            SELECT {GRANT_COLUMNS}
            FROM privilege_grants
            WHERE status = 'active'
              AND scheduled_revoke_at <= $1
            ORDER BY scheduled_revoke_at ASC
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list overdue grants: {error}")))?;

        rows.into_iter().map(GrantRow::into_grant).collect()
    }

    async fn count_grants_by_status(&self) -> AppResult<GrantStatusCounts> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT status, COUNT(*)
            FROM privilege_grants
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count grants: {error}")))?;

        let mut counts = GrantStatusCounts::default();
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            match GrantStatus::from_str(status.as_str()) {
                Ok(GrantStatus::Active) => counts.active = count,
                Ok(GrantStatus::Revoked) => counts.revoked = count,
                Ok(GrantStatus::Expired) => counts.expired = count,
                Ok(GrantStatus::EmergencyRevoked) => counts.emergency_revoked = count,
                Err(_) => {
                    return Err(AppError::Internal(format!(
                        "grant history carries unknown status '{status}'"
                    )));
                }
            }
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests;
