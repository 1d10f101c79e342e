pub mod transaction;

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use migrations::Migrator;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend};
use sea_orm_migration::MigratorTrait;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::errors::AppError;

pub use transaction::{lock_tenant, with_transaction};

/// Pool options derived from the application config. Statement logging only
/// at `trace`.
fn connect_options(cfg: &AppConfig) -> ConnectOptions {
    let mut opt = ConnectOptions::new(cfg.database_url.clone());
    opt.max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_connections)
        .connect_timeout(Duration::from_secs(cfg.db_connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(cfg.db_acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(cfg.db_idle_timeout_secs))
        .sqlx_logging(cfg.log_level.eq_ignore_ascii_case("trace"));
    opt
}

/// Opens the pool the engine shares between HTTP handlers and workers.
pub async fn establish_connection_from_app_config(
    cfg: &AppConfig,
) -> Result<DatabaseConnection, AppError> {
    let db = Database::connect(connect_options(cfg)).await.map_err(|e| {
        error!(error = %e, "could not open database pool");
        counter!("posting_engine.db.connection_failures", 1);
        AppError::DatabaseError(e)
    })?;

    if db.get_database_backend() != DbBackend::Postgres {
        // Row locks and advisory locks are Postgres-only; the in-process
        // tenant mutex is the only serialization left.
        warn!(backend = ?db.get_database_backend(), "non-Postgres backend, tenant locks are process-local");
    }
    gauge!("posting_engine.db.max_connections", cfg.db_max_connections as f64);
    info!(max = cfg.db_max_connections, "database pool ready");
    Ok(db)
}

/// Applies every pending migration.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), AppError> {
    let pending = Migrator::get_pending_migrations(db).await?.len();
    if pending == 0 {
        info!("schema up to date");
        return Ok(());
    }

    let started = Instant::now();
    Migrator::up(db, None).await.map_err(|e| {
        error!(error = %e, pending, "migration failed");
        AppError::DatabaseError(e)
    })?;
    info!(applied = pending, elapsed = ?started.elapsed(), "migrations applied");
    Ok(())
}

/// Round-trips the pool once, recording latency.
pub async fn check_connection(db: &DatabaseConnection) -> Result<(), AppError> {
    let started = Instant::now();
    match db.ping().await {
        Ok(()) => {
            histogram!(
                "posting_engine.db.ping_ms",
                started.elapsed().as_secs_f64() * 1000.0
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "database ping failed");
            counter!("posting_engine.db.connection_failures", 1);
            Err(AppError::DatabaseError(e))
        }
    }
}
