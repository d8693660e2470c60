//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod audit;
mod grant;
mod permission;

pub use audit::AuditAction;
pub use grant::{
    Grant, GrantId, GrantStatus, MAX_EXTENSION_HOURS, MAX_GRANT_DURATION_HOURS,
    MIN_EXTENSION_HOURS, MIN_GRANT_DURATION_HOURS, SYSTEM_ACTOR, logical_grant_key,
    validate_extension_hours, validate_grant_duration_hours,
};
pub use permission::SchemaPermission;
