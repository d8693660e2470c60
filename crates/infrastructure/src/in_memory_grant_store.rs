use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use privlease_application::{GrantCompletion, GrantListQuery, GrantStatusCounts, GrantStore, NewGrant};
use privlease_core::{AppError, AppResult};
use privlease_domain::{Grant, GrantId, GrantStatus};

/// In-memory grant store implementation.
///
/// Keeps the full history in process memory, which makes it suitable for
/// tests and embedded setups; the check-and-insert and the Active-only
/// transition both happen under one write lock, so the single-active
/// invariant holds under concurrency.
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    grants: RwLock<Vec<Grant>>,
    next_id: AtomicI64,
}

impl InMemoryGrantStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            grants: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(0),
        }
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn insert_grant(&self, grant: NewGrant) -> AppResult<Grant> {
        if grant.scheduled_revoke_at <= grant.granted_at {
            return Err(AppError::Validation(
                "scheduled_revoke_at must be after granted_at".to_owned(),
            ));
        }

        let mut grants = self.grants.write().await;

        if grants.iter().any(|existing| {
            existing.is_active()
                && existing.principal == grant.principal
                && existing.resource == grant.resource
        }) {
            return Err(AppError::Conflict(format!(
                "active grant already exists for '{}' on '{}'",
                grant.principal, grant.resource
            )));
        }

        let record = Grant {
            id: GrantId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            principal: grant.principal,
            resource: grant.resource,
            permissions: grant.permissions,
            granted_at: grant.granted_at,
            scheduled_revoke_at: grant.scheduled_revoke_at,
            revoked_at: None,
            granted_by: grant.granted_by,
            revoked_by: None,
            status: GrantStatus::Active,
            reason: grant.reason,
            emergency_contact: grant.emergency_contact,
            scheduled_job_key: Some(grant.scheduled_job_key),
        };
        grants.push(record.clone());
        Ok(record)
    }

    async fn find_active_grant(
        &self,
        principal: &str,
        resource: &str,
    ) -> AppResult<Option<Grant>> {
        Ok(self
            .grants
            .read()
            .await
            .iter()
            .find(|grant| {
                grant.is_active() && grant.principal == principal && grant.resource == resource
            })
            .cloned())
    }

    async fn update_active_schedule(
        &self,
        principal: &str,
        resource: &str,
        scheduled_revoke_at: DateTime<Utc>,
        scheduled_job_key: String,
    ) -> AppResult<Grant> {
        let mut grants = self.grants.write().await;
        let Some(grant) = grants.iter_mut().find(|grant| {
            grant.is_active() && grant.principal == principal && grant.resource == resource
        }) else {
            return Err(AppError::NotFound(format!(
                "no active grant for '{principal}' on '{resource}'"
            )));
        };

        grant.scheduled_revoke_at = scheduled_revoke_at;
        grant.scheduled_job_key = Some(scheduled_job_key);
        Ok(grant.clone())
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

        let mut grants = self.grants.write().await;
        let Some(grant) = grants.iter_mut().find(|grant| {
            grant.is_active() && grant.principal == principal && grant.resource == resource
        }) else {
            return Err(AppError::NotFound(format!(
                "no active grant for '{principal}' on '{resource}'"
            )));
        };

        grant.status = completion.status;
        grant.revoked_at = Some(completion.revoked_at);
        grant.revoked_by = Some(completion.revoked_by);
        if completion.reason_override.is_some() {
            grant.reason = completion.reason_override;
        }
        Ok(grant.clone())
    }

    async fn list_grants(&self, query: GrantListQuery) -> AppResult<Vec<Grant>> {
        let grants = self.grants.read().await;

        let mut values: Vec<Grant> = grants
            .iter()
            .filter(|grant| {
                query
                    .principal
                    .as_deref()
                    .is_none_or(|principal| grant.principal == principal)
                    && query
                        .resource
                        .as_deref()
                        .is_none_or(|resource| grant.resource == resource)
                    && (query.include_terminal || grant.is_active())
            })
            .cloned()
            .collect();
        values.sort_by_key(|grant| {
            (
                grant.status.is_terminal(),
                std::cmp::Reverse(grant.granted_at),
            )
        });

        Ok(values)
    }

    async fn list_active_grants(&self, resource: Option<&str>) -> AppResult<Vec<Grant>> {
        Ok(self
            .grants
            .read()
            .await
            .iter()
            .filter(|grant| {
                grant.is_active() && resource.is_none_or(|resource| grant.resource == resource)
            })
            .cloned()
            .collect())
    }

    async fn list_overdue_grants(&self, now: DateTime<Utc>) -> AppResult<Vec<Grant>> {
        Ok(self
            .grants
            .read()
            .await
            .iter()
            .filter(|grant| grant.is_overdue(now))
            .cloned()
            .collect())
    }

    async fn count_grants_by_status(&self) -> AppResult<GrantStatusCounts> {
        let grants = self.grants.read().await;

        let mut counts = GrantStatusCounts::default();
        for grant in grants.iter() {
            match grant.status {
                GrantStatus::Active => counts.active += 1,
                GrantStatus::Revoked => counts.revoked += 1,
                GrantStatus::Expired => counts.expired += 1,
                GrantStatus::EmergencyRevoked => counts.emergency_revoked += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use privlease_application::{GrantCompletion, GrantListQuery, GrantStore, NewGrant};
    use privlease_core::AppError;
    use privlease_domain::{GrantStatus, SchemaPermission};

    use super::InMemoryGrantStore;

    fn new_grant(principal: &str, resource: &str) -> NewGrant {
        let now = Utc::now();
        NewGrant {
            principal: principal.to_owned(),
            resource: resource.to_owned(),
            permissions: vec![SchemaPermission::Insert],
            granted_at: now,
            scheduled_revoke_at: now + Duration::hours(2),
            granted_by: "alice".to_owned(),
            reason: None,
            emergency_contact: None,
            scheduled_job_key: format!("{principal}/{resource}"),
        }
    }

    #[tokio::test]
    async fn ids_are_assigned_monotonically() {
        let store = InMemoryGrantStore::new();

        let first = store.insert_grant(new_grant("u1", "s1")).await;
        let second = store.insert_grant(new_grant("u2", "s1")).await;

        let (Ok(first), Ok(second)) = (first, second) else {
            panic!("insert failed");
        };
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn rejects_second_active_record_per_key() {
        let store = InMemoryGrantStore::new();

        let first = store.insert_grant(new_grant("u1", "s1")).await;
        assert!(first.is_ok());

        let second = store.insert_grant(new_grant("u1", "s1")).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn completion_is_first_transition_wins() {
        let store = InMemoryGrantStore::new();

        let inserted = store.insert_grant(new_grant("u1", "s1")).await;
        assert!(inserted.is_ok());

        let completion = GrantCompletion {
            status: GrantStatus::Revoked,
            revoked_at: Utc::now(),
            revoked_by: "bob".to_owned(),
            reason_override: None,
        };

        let first = store
            .complete_active_grant("u1", "s1", completion.clone())
            .await;
        assert!(first.is_ok());

        let second = store.complete_active_grant("u1", "s1", completion).await;
        assert!(matches!(second, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn a_new_grant_may_follow_a_terminal_one() {
        let store = InMemoryGrantStore::new();

        let inserted = store.insert_grant(new_grant("u1", "s1")).await;
        assert!(inserted.is_ok());

        let completed = store
            .complete_active_grant(
                "u1",
                "s1",
                GrantCompletion {
                    status: GrantStatus::Expired,
                    revoked_at: Utc::now(),
                    revoked_by: "system".to_owned(),
                    reason_override: None,
                },
            )
            .await;
        assert!(completed.is_ok());

        let again = store.insert_grant(new_grant("u1", "s1")).await;
        assert!(again.is_ok());

        let history = store
            .list_grants(GrantListQuery {
                principal: Some("u1".to_owned()),
                resource: Some("s1".to_owned()),
                include_terminal: true,
            })
            .await;
        assert!(history.is_ok_and(|history| history.len() == 2));
    }

    #[tokio::test]
    async fn overdue_listing_ignores_terminal_records() {
        let store = InMemoryGrantStore::new();

        let mut overdue = new_grant("u1", "s1");
        overdue.granted_at = Utc::now() - Duration::hours(3);
        overdue.scheduled_revoke_at = Utc::now() - Duration::minutes(5);
        assert!(store.insert_grant(overdue).await.is_ok());
        assert!(store.insert_grant(new_grant("u2", "s1")).await.is_ok());

        let listed = store.list_overdue_grants(Utc::now()).await;
        let Ok(listed) = listed else {
            panic!("listing failed");
        };
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].principal, "u1");
    }
}
