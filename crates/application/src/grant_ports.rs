//! Ports consumed by the grant lifecycle services.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use privlease_core::AppResult;
use privlease_domain::{AuditAction, Grant, GrantStatus, SchemaPermission};

/// Payload for a new grant record persisted after both side effects succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGrant {
    /// Account receiving the elevated permissions.
    pub principal: String,
    /// Protected schema the permissions apply to.
    pub resource: String,
    /// Elevated permissions; never empty.
    pub permissions: Vec<SchemaPermission>,
    /// Issue timestamp.
    pub granted_at: DateTime<Utc>,
    /// Scheduled revocation timestamp; must be after `granted_at`.
    pub scheduled_revoke_at: DateTime<Utc>,
    /// Actor that issued the grant.
    pub granted_by: String,
    /// Free-text justification.
    pub reason: Option<String>,
    /// Contact to reach while the elevation is live.
    pub emergency_contact: Option<String>,
    /// Registered scheduler job reference.
    pub scheduled_job_key: String,
}

/// Terminal transition applied to the single active record of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantCompletion {
    /// Terminal status to record; never `Active`.
    pub status: GrantStatus,
    /// Transition timestamp.
    pub revoked_at: DateTime<Utc>,
    /// Actor performing the transition (`"system"` for automatic expiry).
    pub revoked_by: String,
    /// Replacement reason, used by emergency revocation sweeps.
    pub reason_override: Option<String>,
}

/// Filters for audit/reporting oriented grant listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantListQuery {
    /// Optional principal filter.
    pub principal: Option<String>,
    /// Optional resource filter.
    pub resource: Option<String>,
    /// Whether terminal records are included alongside active ones.
    pub include_terminal: bool,
}

/// Per-status grant totals derived from the full history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrantStatusCounts {
    /// Records currently active.
    pub active: u64,
    /// Records revoked by an operator.
    pub revoked: u64,
    /// Records expired by the scheduler or cleanup sweep.
    pub expired: u64,
    /// Records swept by an emergency revocation.
    pub emergency_revoked: u64,
}

impl GrantStatusCounts {
    /// Returns the number of grants ever created.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.active + self.revoked + self.expired + self.emergency_revoked
    }
}

/// Persistent, append-mostly record of every grant and its transitions.
///
/// Stores enforce the single-active invariant per (principal, resource) and
/// never delete records.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Persists a new active record, assigning a monotonic identifier.
    ///
    /// Fails with a conflict when an active record already exists for the
    /// (principal, resource) key; this is the atomic check-and-insert
    /// backstop behind the service's per-key serialization.
    async fn insert_grant(&self, grant: NewGrant) -> AppResult<Grant>;

    /// Returns the single active record for a key, when one exists.
    async fn find_active_grant(&self, principal: &str, resource: &str)
    -> AppResult<Option<Grant>>;

    /// Moves an active record's revocation schedule forward in place.
    ///
    /// Fails with not-found when the key has no active record.
    async fn update_active_schedule(
        &self,
        principal: &str,
        resource: &str,
        scheduled_revoke_at: DateTime<Utc>,
        scheduled_job_key: String,
    ) -> AppResult<Grant>;

    /// Atomically transitions a key's active record to a terminal status.
    ///
    /// Fails with not-found when no active record exists; a caller that
    /// loses the race between manual revocation and a firing auto-revoke
    /// observes exactly this outcome (first transition wins).
    async fn complete_active_grant(
        &self,
        principal: &str,
        resource: &str,
        completion: GrantCompletion,
    ) -> AppResult<Grant>;

    /// Lists records for audit views, active first then grant time descending.
    async fn list_grants(&self, query: GrantListQuery) -> AppResult<Vec<Grant>>;

    /// Lists active records, optionally filtered by resource.
    async fn list_active_grants(&self, resource: Option<&str>) -> AppResult<Vec<Grant>>;

    /// Lists active records whose scheduled revocation time has passed.
    async fn list_overdue_grants(&self, now: DateTime<Utc>) -> AppResult<Vec<Grant>>;

    /// Returns per-status totals over the full history.
    async fn count_grants_by_status(&self) -> AppResult<GrantStatusCounts>;
}

/// Outcome of probing one permission for a principal on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionProbe {
    /// Probed permission.
    pub permission: SchemaPermission,
    /// Whether the backend reports the permission as currently held.
    pub allowed: bool,
    /// Backend-specific detail for operators.
    pub detail: String,
}

/// External system that physically applies and removes permissions.
#[async_trait]
pub trait PrivilegeBackend: Send + Sync {
    /// Returns whether both the principal and the resource exist.
    async fn validate_entities(&self, principal: &str, resource: &str) -> AppResult<bool>;

    /// Applies a permission set for a principal on a resource.
    async fn apply_permissions(
        &self,
        principal: &str,
        resource: &str,
        permissions: &[SchemaPermission],
    ) -> AppResult<()>;

    /// Removes a permission set for a principal on a resource.
    async fn remove_permissions(
        &self,
        principal: &str,
        resource: &str,
        permissions: &[SchemaPermission],
    ) -> AppResult<()>;

    /// Reports which known permissions the principal currently holds.
    async fn probe_permissions(
        &self,
        principal: &str,
        resource: &str,
    ) -> AppResult<Vec<PermissionProbe>>;
}

/// Durable registry of one-shot revocation jobs with at-least-once firing.
///
/// Jobs are addressed by the logical key `principal/resource`; cancellation
/// never requires inferring identifiers from job names.
#[async_trait]
pub trait RevocationScheduler: Send + Sync {
    /// Registers a revocation to fire no earlier than `fire_at`.
    ///
    /// Replaces any pending job under the same logical key and returns the
    /// job key.
    async fn schedule(
        &self,
        principal: &str,
        resource: &str,
        fire_at: DateTime<Utc>,
    ) -> AppResult<String>;

    /// Removes a pending job; absent or already-fired keys are a no-op.
    async fn unschedule(&self, job_key: &str) -> AppResult<()>;

    /// Removes every pending job, optionally restricted to one resource.
    ///
    /// Returns the number of jobs removed.
    async fn unschedule_matching(&self, resource: Option<&str>) -> AppResult<usize>;

    /// Returns the number of jobs currently pending.
    async fn scheduled_job_count(&self) -> AppResult<usize>;
}

/// Callback invoked by a scheduler backend when a revocation job fires.
#[async_trait]
pub trait ScheduledRevocationHandler: Send + Sync {
    /// Revokes the active grant for a key because its deadline passed.
    ///
    /// Implementations must be idempotent: firing for an already-terminal
    /// record is a safe no-op.
    async fn revoke_due(&self, principal: &str, resource: &str) -> AppResult<()>;
}

/// Immutable audit event payload emitted by grant lifecycle use-cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Actor that performed the action.
    pub actor: String,
    /// Stable audit action identifier.
    pub action: AuditAction,
    /// Resource type label.
    pub resource_type: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Optional audit detail payload.
    pub detail: Option<String>,
}

/// Port for persisting append-only audit events.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Persists one audit event.
    async fn append_event(&self, event: AuditEvent) -> AppResult<()>;
}
