//! Database migrations.

use crate::error::{Result, SonkenError};
use sqlx::SqlitePool;
use tracing::{info, instrument};

const SCHEMA_VERSION: i64 = 2;

/// Column default: insertion time in Unix milliseconds.
const NOW_MILLIS: &str = "(CAST(ROUND((julianday('now') - 2440587.5) * 86400000) AS INTEGER))";

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| SonkenError::MigrationFailed { reason: e.to_string() })?;

    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(pool)
            .await
            .map_err(|e| SonkenError::MigrationFailed { reason: e.to_string() })?;

    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    if current_version < 2 {
        migrate_to_v2(pool).await?;
    }

    Ok(())
}

async fn execute(pool: &SqlitePool, sql: &str) -> Result<()> {
    sqlx::query(sql)
        .execute(pool)
        .await
        .map_err(|e| SonkenError::MigrationFailed { reason: e.to_string() })?;
    Ok(())
}

async fn set_version(pool: &SqlitePool, version: i64) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| SonkenError::MigrationFailed { reason: e.to_string() })?;
    Ok(())
}

/// Projects plus the metric and log tables keyed by project.
#[instrument(skip(pool))]
async fn migrate_to_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 1");

    execute(
        pool,
        &format!(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                domain TEXT UNIQUE,
                path TEXT NOT NULL,
                php_version TEXT NOT NULL DEFAULT '8.2',
                database_name TEXT,
                database_user TEXT,
                database_password TEXT,
                status TEXT NOT NULL DEFAULT 'stopped',
                created_at INTEGER NOT NULL DEFAULT {now},
                updated_at INTEGER NOT NULL DEFAULT {now}
            )
            "#,
            now = NOW_MILLIS
        ),
    )
    .await?;

    execute(
        pool,
        &format!(
            r#"
            CREATE TABLE IF NOT EXISTS resource_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                cpu_usage REAL NOT NULL,
                memory_usage REAL NOT NULL,
                disk_usage REAL NOT NULL,
                timestamp INTEGER NOT NULL DEFAULT {now},
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            )
            "#,
            now = NOW_MILLIS
        ),
    )
    .await?;

    execute(
        pool,
        &format!(
            r#"
            CREATE TABLE IF NOT EXISTS database_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                db_size REAL NOT NULL,
                connection_count INTEGER NOT NULL,
                slow_queries INTEGER NOT NULL,
                timestamp INTEGER NOT NULL DEFAULT {now},
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            )
            "#,
            now = NOW_MILLIS
        ),
    )
    .await?;

    execute(
        pool,
        &format!(
            r#"
            CREATE TABLE IF NOT EXISTS slow_queries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                query TEXT NOT NULL,
                execution_time REAL NOT NULL,
                timestamp INTEGER NOT NULL DEFAULT {now},
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            )
            "#,
            now = NOW_MILLIS
        ),
    )
    .await?;

    execute(
        pool,
        &format!(
            r#"
            CREATE TABLE IF NOT EXISTS http_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                method TEXT NOT NULL,
                path TEXT NOT NULL,
                status_code INTEGER NOT NULL,
                response_time REAL,
                timestamp INTEGER NOT NULL DEFAULT {now},
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            )
            "#,
            now = NOW_MILLIS
        ),
    )
    .await?;

    execute(
        pool,
        &format!(
            r#"
            CREATE TABLE IF NOT EXISTS error_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                error_type TEXT NOT NULL,
                error_message TEXT,
                stack_trace TEXT,
                timestamp INTEGER NOT NULL DEFAULT {now},
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            )
            "#,
            now = NOW_MILLIS
        ),
    )
    .await?;

    set_version(pool, 1).await?;

    info!("Migration to version 1 complete");
    Ok(())
}

/// Indexes for the per-project time-range reads and retention deletes.
#[instrument(skip(pool))]
async fn migrate_to_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration to schema version 2");

    for table in ["resource_metrics", "database_metrics", "slow_queries", "http_requests", "error_logs"]
    {
        execute(
            pool,
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_project_ts ON {table}(project_id, timestamp)"
            ),
        )
        .await?;
    }

    execute(pool, "CREATE INDEX IF NOT EXISTS idx_projects_status ON projects(status)").await?;

    set_version(pool, 2).await?;

    info!("Migration to version 2 complete");
    Ok(())
}
