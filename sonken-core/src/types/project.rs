//! Project domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default MySQL user when a project doesn't name one.
pub const DEFAULT_DATABASE_USER: &str = "root";

/// Default PHP version for new projects.
pub const DEFAULT_PHP_VERSION: &str = "8.2";

/// A managed PHP project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique project identifier (opaque, usually a UUID)
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Local domain the project is served on
    pub domain: Option<String>,

    /// Project working copy on disk
    pub path: String,

    pub php_version: String,

    /// Database the project uses, if any
    pub database_name: Option<String>,

    pub database_user: Option<String>,

    pub database_password: Option<String>,

    /// Current project status
    pub status: ProjectStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a stopped project with no database.
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            domain: None,
            path: path.into(),
            php_version: DEFAULT_PHP_VERSION.to_string(),
            database_name: None,
            database_user: None,
            database_password: None,
            status: ProjectStatus::Stopped,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a database to the project.
    pub fn with_database(
        mut self,
        name: impl Into<String>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Self {
        self.database_name = Some(name.into());
        self.database_user = user.map(str::to_string);
        self.database_password = password.map(str::to_string);
        self
    }

    pub fn with_status(mut self, status: ProjectStatus) -> Self {
        self.status = status;
        self
    }

    /// Credentials for the project's database, or `None` if it has none configured.
    pub fn database_credentials(&self) -> Option<DatabaseCredentials> {
        let database = self.database_name.as_deref().filter(|name| !name.is_empty())?;
        Some(DatabaseCredentials {
            database: database.to_string(),
            user: self
                .database_user
                .clone()
                .filter(|user| !user.is_empty())
                .unwrap_or_else(|| DEFAULT_DATABASE_USER.to_string()),
            password: self.database_password.clone().unwrap_or_default(),
        })
    }
}

/// Project status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    /// PHP server is running and the project is monitored
    Running,

    /// Project is idle
    Stopped,
}

impl ProjectStatus {
    /// Parse status from its stored form. Unknown values read as stopped.
    pub fn parse(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }

    /// The status a toggle switches to.
    pub fn toggled(&self) -> Self {
        match self {
            Self::Running => Self::Stopped,
            Self::Stopped => Self::Running,
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login details for a project's database.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub database: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_database_means_no_credentials() {
        let project = Project::new("p1", "blog", "/srv/blog");
        assert!(project.database_credentials().is_none());

        let mut empty = project.clone();
        empty.database_name = Some(String::new());
        assert!(empty.database_credentials().is_none());
    }

    #[test]
    fn test_credentials_defaults() {
        let project = Project::new("p1", "blog", "/srv/blog").with_database("blog_db", None, None);
        let creds = project.database_credentials().unwrap();
        assert_eq!(creds.database, "blog_db");
        assert_eq!(creds.user, DEFAULT_DATABASE_USER);
        assert_eq!(creds.password, "");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let project = Project::new("p1", "blog", "/srv/blog").with_database(
            "blog_db",
            Some("app"),
            Some("hunter2"),
        );
        let rendered = format!("{:?}", project.database_credentials().unwrap());
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(ProjectStatus::parse("running"), ProjectStatus::Running);
        assert_eq!(ProjectStatus::parse("stopped"), ProjectStatus::Stopped);
        assert_eq!(ProjectStatus::parse("bogus"), ProjectStatus::Stopped);
        assert_eq!(ProjectStatus::Running.toggled(), ProjectStatus::Stopped);
        assert_eq!(ProjectStatus::Running.to_string(), "running");
    }
}
