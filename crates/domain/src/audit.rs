use serde::{Deserialize, Serialize};

/// Stable audit actions emitted by grant lifecycle use-cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when a grant is issued.
    GrantCreated,
    /// Emitted when an operator revokes a grant before expiry.
    GrantRevoked,
    /// Emitted when an active grant's expiry is pushed forward.
    GrantExtended,
    /// Emitted when the scheduler or cleanup sweep expires a grant.
    GrantExpired,
    /// Emitted when an emergency revocation sweeps a grant.
    GrantEmergencyRevoked,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GrantCreated => "grant.created",
            Self::GrantRevoked => "grant.revoked",
            Self::GrantExtended => "grant.extended",
            Self::GrantExpired => "grant.expired",
            Self::GrantEmergencyRevoked => "grant.emergency_revoked",
        }
    }
}
