//! Connections to a project's own database.

use crate::error::{Result, SonkenError};
use crate::types::DatabaseCredentials;
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::{debug, instrument};

/// An open connection able to answer the database sampler's questions.
#[async_trait]
pub trait DatabaseProbe: Send {
    /// Combined data and index size of the connected schema, in megabytes.
    async fn size_mb(&mut self) -> Result<f64>;

    /// Sessions currently attached to the connected schema.
    async fn connection_count(&mut self) -> Result<i64>;

    /// Close the connection. Errors are logged, not returned.
    async fn close(self: Box<Self>);
}

/// Opens [`DatabaseProbe`]s for projects.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    async fn connect(
        &self,
        project_id: &str,
        credentials: &DatabaseCredentials,
    ) -> Result<Box<dyn DatabaseProbe>>;
}

/// Connector for MySQL-compatible servers.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    host: String,
    port: u16,
}

impl MySqlConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

#[async_trait]
impl DatabaseConnector for MySqlConnector {
    #[instrument(skip(self, credentials), fields(host = %self.host, port = self.port))]
    async fn connect(
        &self,
        project_id: &str,
        credentials: &DatabaseCredentials,
    ) -> Result<Box<dyn DatabaseProbe>> {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&credentials.user)
            .password(&credentials.password)
            .database(&credentials.database);

        let conn = options.connect().await.map_err(|e| SonkenError::TargetConnect {
            project_id: project_id.to_string(),
            reason: e.to_string(),
        })?;

        debug!(database = %credentials.database, "Connected to project database");
        Ok(Box::new(MySqlProbe { project_id: project_id.to_string(), conn }))
    }
}

struct MySqlProbe {
    project_id: String,
    conn: MySqlConnection,
}

impl MySqlProbe {
    fn query_error(&self, err: sqlx::Error) -> SonkenError {
        SonkenError::TargetQuery { project_id: self.project_id.clone(), reason: err.to_string() }
    }
}

#[async_trait]
impl DatabaseProbe for MySqlProbe {
    async fn size_mb(&mut self) -> Result<f64> {
        // The float divisor keeps the result a DOUBLE rather than DECIMAL.
        let size: f64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(data_length + index_length), 0) / 1048576E0
            FROM information_schema.tables
            WHERE table_schema = DATABASE()
            "#,
        )
        .fetch_one(&mut self.conn)
        .await
        .map_err(|e| self.query_error(e))?;

        Ok(size)
    }

    async fn connection_count(&mut self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM information_schema.processlist WHERE db = DATABASE()")
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| self.query_error(e))
    }

    async fn close(self: Box<Self>) {
        let MySqlProbe { project_id, conn } = *self;
        if let Err(e) = conn.close().await {
            debug!(project_id = %project_id, error = %e, "Error closing project database connection");
        }
    }
}
