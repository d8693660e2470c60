use privlease_core::AppResult;
use privlease_domain::Grant;

use crate::grant_ports::{GrantListQuery, PermissionProbe};

use super::GrantService;

impl GrantService {
    /// Lists grant records for audit views.
    ///
    /// Active records come first, then records ordered by grant time
    /// descending; terminal records appear only when the query asks for
    /// them.
    pub async fn list_grants(&self, query: GrantListQuery) -> AppResult<Vec<Grant>> {
        self.store.list_grants(query).await
    }

    /// Probes which known permissions a principal currently holds.
    ///
    /// Pure introspection, delegated to the privilege backend; no record is
    /// consulted or written.
    pub async fn test_permissions(
        &self,
        principal: &str,
        resource: &str,
    ) -> AppResult<Vec<PermissionProbe>> {
        self.backend.probe_permissions(principal, resource).await
    }
}
