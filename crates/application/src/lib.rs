//! Application services and ports for the grant lifecycle.

#![forbid(unsafe_code)]

mod grant_ports;
mod grant_service;
mod status_service;

pub use grant_ports::{
    AuditEvent, AuditRepository, GrantCompletion, GrantListQuery, GrantStatusCounts, GrantStore,
    NewGrant, PermissionProbe, PrivilegeBackend, RevocationScheduler, ScheduledRevocationHandler,
};
pub use grant_service::{
    CleanupReport, EmergencyRevocationOutcome, EmergencyRevocationReport, GrantRequest,
    GrantService,
};
pub use status_service::{ActiveGrantSummary, ServiceHealth, StatusReport, StatusService};
