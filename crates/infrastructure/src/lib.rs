//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_audit_repository;
mod in_memory_grant_store;
mod in_process_scheduler;
mod postgres_audit_repository;
mod postgres_grant_store;
mod postgres_privilege_backend;

pub use in_memory_audit_repository::InMemoryAuditRepository;
pub use in_memory_grant_store::InMemoryGrantStore;
pub use in_process_scheduler::InProcessRevocationScheduler;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_grant_store::PostgresGrantStore;
pub use postgres_privilege_backend::PostgresPrivilegeBackend;
