//! privlease revocation worker runtime.
//!
//! Long-running daemon owning the scheduled side of the grant lifecycle:
//! it rehydrates revocation jobs from the store at startup, runs the
//! due-job scan, sweeps overdue grants as a safety net, and periodically
//! logs a status report.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use privlease_application::{
    GrantService, GrantStore, RevocationScheduler, ScheduledRevocationHandler, StatusService,
};
use privlease_core::{AppError, AppResult};
use privlease_infrastructure::{
    InProcessRevocationScheduler, PostgresAuditRepository, PostgresGrantStore,
    PostgresPrivilegeBackend,
};

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

static MIGRATOR: Migrator = sqlx::migrate!("../../crates/infrastructure/migrations");

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    scan_interval_secs: u64,
    cleanup_interval_secs: u64,
    status_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    MIGRATOR
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    let store = Arc::new(PostgresGrantStore::new(pool.clone()));
    let backend = Arc::new(PostgresPrivilegeBackend::new(pool.clone()));
    let audit_repository = Arc::new(PostgresAuditRepository::new(pool));
    let scheduler = Arc::new(InProcessRevocationScheduler::new());

    let grant_service = GrantService::new(
        store.clone(),
        backend,
        scheduler.clone(),
        audit_repository,
    );
    let status_service = StatusService::new(store.clone(), scheduler.clone());

    // The in-process scheduler is empty after a restart; every active
    // grant re-registers its pending revocation before the scan starts.
    let active = store.list_active_grants(None).await?;
    for grant in &active {
        scheduler
            .schedule(&grant.principal, &grant.resource, grant.scheduled_revoke_at)
            .await?;
    }

    info!(
        rehydrated_jobs = active.len(),
        scan_interval_secs = config.scan_interval_secs,
        cleanup_interval_secs = config.cleanup_interval_secs,
        "privlease-worker started"
    );

    let handler: Arc<dyn ScheduledRevocationHandler> = Arc::new(grant_service.clone());
    tokio::spawn(
        scheduler
            .clone()
            .run(handler, Duration::from_secs(config.scan_interval_secs)),
    );

    let mut cleanup_ticker =
        tokio::time::interval(Duration::from_secs(config.cleanup_interval_secs));
    let mut status_ticker = tokio::time::interval(Duration::from_secs(config.status_interval_secs));

    loop {
        tokio::select! {
            _ = cleanup_ticker.tick() => {
                match grant_service.cleanup_expired().await {
                    Ok(report) => {
                        if report.processed_count > 0 {
                            info!(
                                processed = report.processed_count,
                                "cleanup sweep expired overdue grants"
                            );
                        }
                    }
                    Err(error) => {
                        warn!(error = %error, "cleanup sweep failed");
                    }
                }
            }
            _ = status_ticker.tick() => {
                match status_service.report().await {
                    Ok(report) => {
                        info!(
                            total_grants = report.total_grants,
                            active = report.active_grants.count,
                            scheduled_jobs = report.scheduled_job_count,
                            health = ?report.health,
                            "status report"
                        );
                    }
                    Err(error) => {
                        warn!(error = %error, "status report failed");
                    }
                }
            }
        }
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let scan_interval_secs = parse_env_u64("SCHEDULER_SCAN_INTERVAL_SECS", 60)?;
        let cleanup_interval_secs = parse_env_u64("CLEANUP_INTERVAL_SECS", 300)?;
        let status_interval_secs = parse_env_u64("STATUS_REPORT_INTERVAL_SECS", 600)?;

        for (name, value) in [
            ("SCHEDULER_SCAN_INTERVAL_SECS", scan_interval_secs),
            ("CLEANUP_INTERVAL_SECS", cleanup_interval_secs),
            ("STATUS_REPORT_INTERVAL_SECS", status_interval_secs),
        ] {
            if value == 0 {
                return Err(AppError::Validation(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        Ok(Self {
            database_url,
            scan_interval_secs,
            cleanup_interval_secs,
            status_interval_secs,
        })
    }
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
