//! State management with SQLite persistence.
//!
//! The StateManager owns the daemon's database:
//! - Projects and their database credentials
//! - Metric tables written by the samplers (see [`crate::store`])
//! - Request and error logs

use crate::error::{Result, SonkenError};
use crate::types::samples::{from_millis, to_millis};
use crate::types::{Project, ProjectStatus};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{ConnectOptions, Row};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, instrument};

pub mod migrations;

#[cfg(test)]
mod tests;

/// State manager for persistent storage.
#[derive(Clone)]
pub struct StateManager {
    pool: SqlitePool,
}

impl StateManager {
    /// Create a new StateManager with an in-memory database (for tests).
    pub async fn new_in_memory() -> Result<Self> {
        Self::new(":memory:").await
    }

    /// Get a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a new StateManager with a database at the specified path.
    #[instrument(skip(db_path))]
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        info!("Initializing state manager at {:?}", db_path);

        if db_path != Path::new(":memory:") {
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SonkenError::IoError { path: parent.to_path_buf(), source: e })?;
            }
        }

        let mut options = SqliteConnectOptions::from_str(db_path.to_str().ok_or_else(|| {
            SonkenError::InvalidConfig { reason: "Invalid database path".to_string() }
        })?)
        .map_err(|e| SonkenError::DatabaseError(e.to_string()))?;

        options = options
            .create_if_missing(true)
            .foreign_keys(true)
            .log_statements(tracing::log::LevelFilter::Debug);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| SonkenError::DatabaseError(e.to_string()))?;

        let manager = Self { pool };

        info!("Running database migrations");
        migrations::run(&manager.pool).await?;

        info!("State manager initialized successfully");
        Ok(manager)
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================
    // Project Operations
    // ========================

    /// Insert a new project.
    #[instrument(skip(self, project), fields(project_id = %project.id))]
    pub async fn insert_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, domain, path, php_version, database_name,
                                  database_user, database_password, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.domain)
        .bind(&project.path)
        .bind(&project.php_version)
        .bind(&project.database_name)
        .bind(&project.database_user)
        .bind(&project.database_password)
        .bind(project.status.as_str())
        .bind(to_millis(project.created_at))
        .bind(to_millis(project.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| SonkenError::database("insert_project", e))?;

        Ok(())
    }

    /// Get a project by ID.
    #[instrument(skip(self))]
    pub async fn get_project(&self, project_id: &str) -> Result<Project> {
        self.find_project(project_id)
            .await?
            .ok_or_else(|| SonkenError::ProjectNotFound { project_id: project_id.to_string() })
    }

    /// Get a project by ID, `None` if it doesn't exist.
    #[instrument(skip(self))]
    pub async fn find_project(&self, project_id: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SonkenError::database("get_project", e))?;

        Ok(row.map(|row| row_to_project(&row)))
    }

    /// List all projects, newest first.
    #[instrument(skip(self))]
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SonkenError::database("list_projects", e))?;

        Ok(rows.iter().map(row_to_project).collect())
    }

    /// List projects with the given status.
    #[instrument(skip(self))]
    pub async fn list_projects_by_status(&self, status: ProjectStatus) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects WHERE status = ? ORDER BY created_at")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SonkenError::database("list_projects", e))?;

        Ok(rows.iter().map(row_to_project).collect())
    }

    /// Update project status.
    #[instrument(skip(self))]
    pub async fn update_project_status(&self, project_id: &str, status: ProjectStatus) -> Result<()> {
        let result = sqlx::query("UPDATE projects SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(to_millis(Utc::now()))
            .bind(project_id)
            .execute(&self.pool)
            .await
            .map_err(|e| SonkenError::database("update_project_status", e))?;

        if result.rows_affected() == 0 {
            return Err(SonkenError::ProjectNotFound { project_id: project_id.to_string() });
        }
        Ok(())
    }

    /// Delete a project. Its metric and log rows cascade.
    #[instrument(skip(self))]
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await
            .map_err(|e| SonkenError::database("delete_project", e))?;

        if result.rows_affected() == 0 {
            return Err(SonkenError::ProjectNotFound { project_id: project_id.to_string() });
        }
        Ok(())
    }
}

fn row_to_project(row: &SqliteRow) -> Project {
    Project {
        id: row.get("id"),
        name: row.get("name"),
        domain: row.get("domain"),
        path: row.get("path"),
        php_version: row.get("php_version"),
        database_name: row.get("database_name"),
        database_user: row.get("database_user"),
        database_password: row.get("database_password"),
        status: ProjectStatus::parse(row.get::<&str, _>("status")),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    }
}
