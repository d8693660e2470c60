use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use privlease_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::SchemaPermission;

/// Shortest duration a grant may be issued for, in hours.
pub const MIN_GRANT_DURATION_HOURS: i64 = 1;

/// Longest duration a grant may be issued for, in hours (one week).
pub const MAX_GRANT_DURATION_HOURS: i64 = 168;

/// Shortest extension of an active grant, in hours.
pub const MIN_EXTENSION_HOURS: i64 = 1;

/// Longest extension of an active grant, in hours.
pub const MAX_EXTENSION_HOURS: i64 = 24;

/// Actor name recorded when the system itself revokes a grant at expiry.
pub const SYSTEM_ACTOR: &str = "system";

/// Validates a requested grant duration against the allowed window.
pub fn validate_grant_duration_hours(duration_hours: i64) -> AppResult<()> {
    if !(MIN_GRANT_DURATION_HOURS..=MAX_GRANT_DURATION_HOURS).contains(&duration_hours) {
        return Err(AppError::Validation(format!(
            "grant duration must be between {MIN_GRANT_DURATION_HOURS} and \
             {MAX_GRANT_DURATION_HOURS} hours, got {duration_hours}"
        )));
    }

    Ok(())
}

/// Validates a requested extension against the allowed window.
pub fn validate_extension_hours(extra_hours: i64) -> AppResult<()> {
    if !(MIN_EXTENSION_HOURS..=MAX_EXTENSION_HOURS).contains(&extra_hours) {
        return Err(AppError::Validation(format!(
            "grant extension must be between {MIN_EXTENSION_HOURS} and \
             {MAX_EXTENSION_HOURS} hours, got {extra_hours}"
        )));
    }

    Ok(())
}

/// Unique, monotonically increasing grant identifier assigned by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GrantId(i64);

impl GrantId {
    /// Creates a grant identifier from a store-assigned value.
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self(value)
    }
}

impl Display for GrantId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Lifecycle state of a grant.
///
/// `Active` is the only non-terminal state; every transition leaves it and
/// none re-enters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    /// Permissions are currently applied and a revocation is scheduled.
    Active,
    /// An operator revoked the grant before expiry.
    Revoked,
    /// The scheduled revocation (or the cleanup safety net) fired.
    Expired,
    /// The grant was swept by an emergency revocation.
    EmergencyRevoked,
}

impl GrantStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::EmergencyRevoked => "emergency_revoked",
        }
    }

    /// Returns whether this status is a terminal sink.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Returns all known statuses.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[GrantStatus] = &[
            GrantStatus::Active,
            GrantStatus::Revoked,
            GrantStatus::Expired,
            GrantStatus::EmergencyRevoked,
        ];

        ALL
    }
}

impl FromStr for GrantStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            "expired" => Ok(Self::Expired),
            "emergency_revoked" => Ok(Self::EmergencyRevoked),
            _ => Err(AppError::Validation(format!(
                "unknown grant status value '{value}'"
            ))),
        }
    }
}

/// One record of a time-bounded permission elevation and its lifecycle.
///
/// Records are append-mostly: `Grant` rows are created `Active`, mutated in
/// place by extension and terminal transitions, and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Store-assigned monotonic identifier.
    pub id: GrantId,
    /// Account receiving the elevated permissions.
    pub principal: String,
    /// Protected schema the permissions apply to.
    pub resource: String,
    /// Elevated permissions; never empty.
    pub permissions: Vec<SchemaPermission>,
    /// When the grant was issued.
    pub granted_at: DateTime<Utc>,
    /// When the pending revocation is scheduled to fire.
    pub scheduled_revoke_at: DateTime<Utc>,
    /// When a terminal transition happened, if one has.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Actor that issued the grant.
    pub granted_by: String,
    /// Actor that performed the terminal transition (`"system"` for expiry).
    pub revoked_by: Option<String>,
    /// Current lifecycle state.
    pub status: GrantStatus,
    /// Free-text justification for the elevation.
    pub reason: Option<String>,
    /// Contact to reach while the elevation is live.
    pub emergency_contact: Option<String>,
    /// Scheduler job reference; meaningful only while `Active`.
    pub scheduled_job_key: Option<String>,
}

impl Grant {
    /// Returns whether the grant is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == GrantStatus::Active
    }

    /// Returns whether an active grant's revocation time has already passed.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.scheduled_revoke_at <= now
    }

    /// Returns whole minutes until the scheduled revocation, floored at zero.
    #[must_use]
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        (self.scheduled_revoke_at - now).num_minutes().max(0)
    }
}

/// Builds the logical key identifying one (principal, resource) elevation.
#[must_use]
pub fn logical_grant_key(principal: &str, resource: &str) -> String {
    format!("{principal}/{resource}")
}
