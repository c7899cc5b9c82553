//! Database layer for coterie.

pub mod entities;
pub mod migrations;
pub mod repositories;

use coterie_common::{AppError, BackendErrorKind, Config};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use std::time::Duration;
use tracing::log::LevelFilter;

/// Initialize database connection.
pub async fn init(config: &Config) -> Result<DatabaseConnection, AppError> {
    let mut opt = ConnectOptions::new(&config.database.url);

    opt.max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(LevelFilter::Debug);

    Database::connect(opt).await.map_err(db_err)
}

/// Run pending migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), AppError> {
    use sea_orm_migration::MigratorTrait;
    migrations::Migrator::up(db, None).await.map_err(db_err)
}

/// Map a sea-orm error onto the application error taxonomy.
///
/// Connection-level failures become retryable backend errors; everything
/// else is a plain database error.
#[must_use]
pub fn db_err(err: DbErr) -> AppError {
    match err {
        DbErr::ConnectionAcquire(e) => {
            AppError::backend(BackendErrorKind::Unavailable, e.to_string())
        }
        DbErr::Conn(e) => AppError::backend(BackendErrorKind::Network, e.to_string()),
        DbErr::RecordNotFound(what) => AppError::NotFound(what),
        other => AppError::Database(other.to_string()),
    }
}
