//! # Postgres Migration Driver
//!
//! Keeps the applied version in a single-row `schema_migrations` table
//! compatible with golang-migrate. Every step marks its version dirty,
//! runs the script and then clears the flag, so a failed script leaves the
//! database dirty.

use super::source::{plan, Direction, MigrationSet, MigrationSource, MigrationStep};
use super::{DriverError, MigrationConnection, MigrationDriver, MigrationVersion};
use crate::constants::MIGRATIONS_TABLE;
use async_trait::async_trait;
use sqlx::Executor;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Version stored while the database is dirty with nothing else applied
const NIL_VERSION: i64 = -1;

/// Key for `pg_advisory_lock`, held for the duration of a migration run
const MIGRATION_LOCK_ID: i64 = 0x7363_6865_6d61;

/// Map a sqlx error to a driver error, detecting dead connections
fn classify(context: &str, error: &sqlx::Error) -> DriverError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => DriverError::ConnectionBroken(format!("{context}: {error}")),
        _ => DriverError::from_message(format!("{context}: {error}")),
    }
}

fn to_db_version(version: u64) -> Result<i64, DriverError> {
    i64::try_from(version)
        .map_err(|e| DriverError::Query(format!("version {version} out of range: {e}")))
}

#[derive(Debug, Clone)]
pub struct PostgresDriver {
    max_connections: u32,
    acquire_timeout: Duration,
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self {
            max_connections: 2,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl PostgresDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MigrationDriver for PostgresDriver {
    async fn open(&self, dsn: &str) -> Result<Arc<dyn MigrationConnection>, DriverError> {
        let options = PgConnectOptions::from_str(dsn)
            .map_err(|e| DriverError::Open(format!("invalid connection string: {e}")))?;
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| DriverError::Open(e.to_string()))?;

        let connection = PostgresConnection { pool };
        connection.ensure_version_table().await?;
        Ok(Arc::new(connection))
    }
}

#[derive(Debug)]
pub struct PostgresConnection {
    pool: PgPool,
}

impl PostgresConnection {
    async fn ensure_version_table(&self) -> Result<(), DriverError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (version bigint NOT NULL PRIMARY KEY, dirty boolean NOT NULL)"
        );
        sqlx::raw_sql(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| classify("failed to create version table", &e))?;
        Ok(())
    }
}

async fn read_version(conn: &mut PgConnection) -> Result<Option<MigrationVersion>, DriverError> {
    let query = format!("SELECT version, dirty FROM {MIGRATIONS_TABLE} LIMIT 1");
    let row = sqlx::query_as::<_, (i64, bool)>(&query)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| classify("failed to read migration version", &e))?;

    Ok(row.and_then(|(version, dirty)| match u64::try_from(version) {
        Ok(version) => Some(MigrationVersion { version, dirty }),
        // nil version row only exists while a rollback to nothing is in flight
        Err(_) => dirty.then_some(MigrationVersion { version: 0, dirty }),
    }))
}

/// Replace the version row; `None` and clean leaves the table empty
async fn set_version(
    conn: &mut PgConnection,
    version: Option<u64>,
    dirty: bool,
) -> Result<(), DriverError> {
    let stored = match version {
        Some(version) => Some(to_db_version(version)?),
        None if dirty => Some(NIL_VERSION),
        None => None,
    };

    // A multi-statement simple query runs as one implicit transaction
    let mut statement = format!("TRUNCATE {MIGRATIONS_TABLE};");
    if let Some(stored) = stored {
        statement.push_str(&format!(
            " INSERT INTO {MIGRATIONS_TABLE} (version, dirty) VALUES ({stored}, {dirty});"
        ));
    }
    (&mut *conn)
        .execute(sqlx::raw_sql(&statement))
        .await
        .map_err(|e| classify("failed to record migration version", &e))?;
    Ok(())
}

async fn run_step(conn: &mut PgConnection, step: &MigrationStep) -> Result<(), DriverError> {
    let script = tokio::fs::read_to_string(&step.path).await.map_err(|e| {
        DriverError::Source(format!("failed to read {}: {e}", step.path.display()))
    })?;

    let dirty_version = match step.direction {
        Direction::Up => Some(step.version),
        Direction::Down => step.resulting_version,
    };
    set_version(conn, dirty_version, true).await?;

    debug!(
        "Running {} migration {} from {}",
        step.direction,
        step.version,
        step.path.display()
    );
    if let Err(e) = (&mut *conn).execute(sqlx::raw_sql(&script)).await {
        return Err(match classify("migration script failed", &e) {
            broken @ DriverError::ConnectionBroken(_) => broken,
            _ => DriverError::Migration {
                version: step.version,
                message: e.to_string(),
            },
        });
    }

    set_version(conn, step.resulting_version, false).await
}

async fn apply_locked(
    conn: &mut PgConnection,
    source: &MigrationSource,
    target: u64,
) -> Result<(), DriverError> {
    let current = read_version(conn).await?;
    if let Some(MigrationVersion {
        version,
        dirty: true,
    }) = current
    {
        return Err(DriverError::Query(format!(
            "database is dirty at version {version}"
        )));
    }

    let set = MigrationSet::load(source).await?;
    let steps = plan(&set, current.map(|v| v.version), target)?;
    for step in &steps {
        run_step(conn, step).await?;
    }
    info!(
        "Applied {} migration step(s) from {} to reach version {}",
        steps.len(),
        source,
        target
    );
    Ok(())
}

#[async_trait]
impl MigrationConnection for PostgresConnection {
    async fn current_version(&self) -> Result<Option<MigrationVersion>, DriverError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| classify("failed to acquire connection", &e))?;
        read_version(&mut *conn).await
    }

    async fn apply_to(&self, source: &MigrationSource, target: u64) -> Result<(), DriverError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| classify("failed to acquire connection", &e))?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&mut *conn)
            .await
            .map_err(|e| classify("failed to take migration lock", &e))?;

        let result = apply_locked(&mut *conn, source, target).await;

        let unlocked = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&mut *conn)
            .await;
        if let Err(e) = unlocked {
            // The session still holds the lock; it must not go back to the pool
            warn!("Failed to release migration lock, discarding connection: {e}");
            conn.close_on_drop();
        }
        result
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_broken_connections() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert!(classify("query", &io).is_connection_broken());
        assert!(classify("query", &sqlx::Error::PoolClosed).is_connection_broken());
        assert!(classify("query", &sqlx::Error::PoolTimedOut).is_connection_broken());
    }

    #[test]
    fn test_row_not_found_is_query_error() {
        assert!(matches!(
            classify("query", &sqlx::Error::RowNotFound),
            DriverError::Query(_)
        ));
    }

    #[test]
    fn test_version_range() {
        assert_eq!(to_db_version(3).ok(), Some(3));
        assert!(to_db_version(u64::MAX).is_err());
    }

    #[tokio::test]
    async fn test_open_rejects_malformed_dsn() {
        let driver = PostgresDriver::new();
        let result = driver.open("not a connection string").await;
        assert!(matches!(result, Err(DriverError::Open(_))));
    }

    fn scratch_tables() -> String {
        format!("DROP TABLE IF EXISTS smc_broken, smc_orders, smc_accounts, {MIGRATIONS_TABLE}")
    }

    /// Needs a scratch database in `SCHEMA_MIGRATION_TEST_DSN`; skipped when unset
    #[tokio::test]
    async fn test_steps_leave_failed_version_dirty() {
        let Ok(dsn) = std::env::var("SCHEMA_MIGRATION_TEST_DSN") else {
            eprintln!("SCHEMA_MIGRATION_TEST_DSN not set, skipping");
            return;
        };

        let dir = tempfile::tempdir().unwrap();
        for (name, sql) in [
            ("1_accounts.up.sql", "CREATE TABLE smc_accounts (id bigint PRIMARY KEY);"),
            ("1_accounts.down.sql", "DROP TABLE smc_accounts;"),
            ("2_orders.up.sql", "CREATE TABLE smc_orders (id bigint PRIMARY KEY);"),
            ("2_orders.down.sql", "DROP TABLE smc_orders;"),
            ("3_broken.up.sql", "CREAT TABLE smc_broken (id bigint);"),
            ("3_broken.down.sql", "SELECT 1;"),
        ] {
            std::fs::write(dir.path().join(name), sql).unwrap();
        }
        let source = MigrationSource::parse(&format!("file://{}", dir.path().display())).unwrap();

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&dsn)
            .await
            .unwrap();
        sqlx::raw_sql(&scratch_tables()).execute(&pool).await.unwrap();
        let connection = PostgresConnection { pool };
        connection.ensure_version_table().await.unwrap();

        connection.apply_to(&source, 2).await.unwrap();
        assert_eq!(
            connection.current_version().await.unwrap(),
            Some(MigrationVersion::clean(2))
        );

        connection.apply_to(&source, 0).await.unwrap();
        assert_eq!(connection.current_version().await.unwrap(), None);

        let result = connection.apply_to(&source, 3).await;
        assert!(matches!(
            result,
            Err(DriverError::Migration { version: 3, .. })
        ));
        assert_eq!(
            connection.current_version().await.unwrap(),
            Some(MigrationVersion {
                version: 3,
                dirty: true
            })
        );

        // Dirty databases are refused before any script runs
        assert!(connection.apply_to(&source, 2).await.is_err());

        sqlx::raw_sql(&scratch_tables())
            .execute(&connection.pool)
            .await
            .unwrap();
        connection.close().await;
    }
}
