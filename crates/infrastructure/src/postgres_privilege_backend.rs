use async_trait::async_trait;
use sqlx::PgPool;

use privlease_application::{PermissionProbe, PrivilegeBackend};
use privlease_core::{AppError, AppResult};
use privlease_domain::SchemaPermission;

/// Privilege backend applying real `GRANT`/`REVOKE` statements.
///
/// Principals map to database roles and resources to schemas. Identifiers
/// cannot be bound as statement parameters, so both pass a strict charset
/// check before being quoted into the statement text; existence is also
/// validated against the catalog before anything is applied.
#[derive(Clone)]
pub struct PostgresPrivilegeBackend {
    pool: PgPool,
}

impl PostgresPrivilegeBackend {
    /// Creates a backend with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn execute_statement(&self, statement: &str) -> AppResult<()> {
        sqlx::query(statement)
            .execute(&self.pool)
            .await
            .map_err(|error| AppError::Backend(format!("'{statement}' failed: {error}")))?;

        Ok(())
    }
}

/// Validates and quotes an identifier for interpolation into DDL.
fn quoted_identifier(value: &str) -> AppResult<String> {
    let valid = !value.is_empty()
        && value
            .chars()
            .next()
            .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$');

    if !valid {
        return Err(AppError::Validation(format!(
            "identifier '{value}' contains characters outside [A-Za-z0-9_$]"
        )));
    }

    Ok(format!("\"{value}\""))
}

#[async_trait]
impl PrivilegeBackend for PostgresPrivilegeBackend {
    async fn validate_entities(&self, principal: &str, resource: &str) -> AppResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)
               AND EXISTS (
                   SELECT 1 FROM information_schema.schemata WHERE schema_name = $2
               )
            "#,
        )
        .bind(principal)
        .bind(resource)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Backend(format!(
                "failed to validate principal '{principal}' and resource '{resource}': {error}"
            ))
        })?;

        Ok(exists)
    }

    async fn apply_permissions(
        &self,
        principal: &str,
        resource: &str,
        permissions: &[SchemaPermission],
    ) -> AppResult<()> {
        let role = quoted_identifier(principal)?;
        let schema = quoted_identifier(resource)?;

        self.execute_statement(&format!("GRANT USAGE ON SCHEMA {schema} TO {role}"))
            .await?;

        for permission in permissions {
            self.execute_statement(&format!(
                "GRANT {} ON ALL TABLES IN SCHEMA {schema} TO {role}",
                permission.as_sql_keyword(),
            ))
            .await?;
        }

        Ok(())
    }

    async fn remove_permissions(
        &self,
        principal: &str,
        resource: &str,
        permissions: &[SchemaPermission],
    ) -> AppResult<()> {
        let role = quoted_identifier(principal)?;
        let schema = quoted_identifier(resource)?;

        // Best effort per permission: every revoke is attempted and the
        // first failure is reported after the loop.
        let mut first_error: Option<AppError> = None;
        for permission in permissions {
            let result = self
                .execute_statement(&format!(
                    "REVOKE {} ON ALL TABLES IN SCHEMA {schema} FROM {role}",
                    permission.as_sql_keyword(),
                ))
                .await;

            if let Err(error) = result {
                tracing::warn!(
                    principal = %principal,
                    resource = %resource,
                    permission = permission.as_str(),
                    error = %error,
                    "failed to revoke one permission"
                );
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn probe_permissions(
        &self,
        principal: &str,
        resource: &str,
    ) -> AppResult<Vec<PermissionProbe>> {
        let mut probes = Vec::with_capacity(SchemaPermission::all().len());
        for permission in SchemaPermission::all() {
            let (table_count,): (i64,) = sqlx::query_as(
                r#"
                SELECT COUNT(*)
                FROM information_schema.role_table_grants
                WHERE grantee = $1
                  AND table_schema = $2
                  AND privilege_type = $3
                "#,
            )
            .bind(principal)
            .bind(resource)
            .bind(permission.as_sql_keyword())
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                AppError::Backend(format!(
                    "failed to probe '{}' for '{principal}' on '{resource}': {error}",
                    permission.as_str()
                ))
            })?;

            probes.push(PermissionProbe {
                permission: *permission,
                allowed: table_count > 0,
                detail: format!("granted on {table_count} tables"),
            });
        }

        Ok(probes)
    }
}

#[cfg(test)]
mod tests {
    use super::quoted_identifier;

    #[test]
    fn accepts_plain_identifiers() {
        let quoted = quoted_identifier("reporting_user");
        assert!(quoted.is_ok_and(|quoted| quoted == "\"reporting_user\""));
    }

    #[test]
    fn rejects_quote_and_whitespace_injection() {
        for value in ["", "bad name", "role\"; DROP SCHEMA x; --", "1starts_with_digit"] {
            assert!(quoted_identifier(value).is_err());
        }
    }
}
