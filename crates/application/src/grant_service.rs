//! Grant lifecycle orchestration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use privlease_core::{AppError, AppResult};
use privlease_domain::logical_grant_key;

use crate::grant_ports::{
    AuditRepository, GrantStore, PrivilegeBackend, RevocationScheduler,
};

mod create;
mod emergency;
mod extend;
mod queries;
mod revoke;

pub use create::GrantRequest;
pub use emergency::{EmergencyRevocationOutcome, EmergencyRevocationReport};
pub use revoke::CleanupReport;

/// Resource type label used for grant audit events.
const GRANT_RESOURCE_TYPE: &str = "privilege_grant";

/// Application service orchestrating the grant lifecycle.
///
/// Owns the single-active invariant: mutations for one (principal, resource)
/// key are serialized through a per-key lock, with the store's atomic
/// check-and-insert as the backstop.
#[derive(Clone)]
pub struct GrantService {
    store: Arc<dyn GrantStore>,
    backend: Arc<dyn PrivilegeBackend>,
    scheduler: Arc<dyn RevocationScheduler>,
    audit_repository: Arc<dyn AuditRepository>,
    key_locks: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl GrantService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        store: Arc<dyn GrantStore>,
        backend: Arc<dyn PrivilegeBackend>,
        scheduler: Arc<dyn RevocationScheduler>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            store,
            backend,
            scheduler,
            audit_repository,
            key_locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Returns the serialization lock for one (principal, resource) key.
    ///
    /// The map mutex is held only long enough to clone the entry; the
    /// returned lock is awaited outside of it.
    fn key_lock(&self, principal: &str, resource: &str) -> AppResult<Arc<Mutex<()>>> {
        let key = logical_grant_key(principal, resource);
        let mut locks = self
            .key_locks
            .lock()
            .map_err(|_| AppError::Internal("grant key lock map is poisoned".to_owned()))?;

        // An entry with no outstanding clone has no holder or waiter;
        // dropping it keeps the map bounded by in-flight keys.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        Ok(Arc::clone(locks.entry(key).or_default()))
    }
}
