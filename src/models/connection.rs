//! Connection-related data models.
//!
//! This module defines the supported backends and the construction parameters
//! each adapter variant accepts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// Any MySQL-protocol-compatible server (MySQL, MariaDB, GoldenDB)
    MySql,
    Oracle,
    Sqlite,
    Redis,
}

impl DatabaseType {
    /// Parse database type from a connection URL scheme.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("mysql://")
            || lower.starts_with("mariadb://")
            || lower.starts_with("goldendb://")
        {
            Some(Self::MySql)
        } else if lower.starts_with("oracle://") {
            Some(Self::Oracle)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else if lower.starts_with("redis://") {
            Some(Self::Redis)
        } else {
            None
        }
    }

    /// Parse a database type name as given on the command line.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" | "goldendb" => Some(Self::MySql),
            "oracle" => Some(Self::Oracle),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            "redis" => Some(Self::Redis),
            _ => None,
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::Oracle => "Oracle",
            Self::Sqlite => "SQLite",
            Self::Redis => "Redis",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::MySql => Some(3306),
            Self::Oracle => Some(1521),
            Self::Sqlite => None,
            Self::Redis => Some(6379),
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Network endpoint and credentials shared by the server-based backends.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    /// Never logged
    pub password: Option<String>,
    pub database: Option<String>,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("database", &self.database)
            .finish()
    }
}

/// Oracle construction parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleConfig {
    pub server: ServerConfig,
    pub service_name: Option<String>,
    pub sid: Option<String>,
    /// Full connect string (easy connect, TNS alias or descriptor)
    pub connect_string: Option<String>,
    /// Native client library directory; enables thick mode for older servers
    pub client_lib_dir: Option<PathBuf>,
}

impl OracleConfig {
    pub fn new(server: ServerConfig) -> Self {
        Self {
            server,
            ..Self::default()
        }
    }

    /// Resolve the connect string.
    ///
    /// Priority: connect string > service name > SID > database. Returns `None`
    /// when none of them is set.
    pub fn resolve_connect_string(&self) -> Option<String> {
        if let Some(cs) = self.connect_string.as_deref().filter(|s| !s.is_empty()) {
            return Some(cs.to_string());
        }
        let service = [
            self.service_name.as_deref(),
            self.sid.as_deref(),
            self.server.database.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())?;

        let port = if self.server.port == 0 {
            DatabaseType::Oracle.default_port().unwrap_or(1521)
        } else {
            self.server.port
        };
        Some(format!("{}:{}/{}", self.server.host, port, service))
    }
}

/// Embedded-file (SQLite) construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    pub file_path: PathBuf,
    /// Open read-only; the file must then already exist
    pub readonly: bool,
}

impl SqliteConfig {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            readonly: false,
        }
    }

    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// File name used as the schema's database name.
    pub fn database_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Construction parameters for one adapter, tagged by backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterConfig {
    MySql(ServerConfig),
    Oracle(OracleConfig),
    Sqlite(SqliteConfig),
    Redis(ServerConfig),
}

impl AdapterConfig {
    pub fn database_type(&self) -> DatabaseType {
        match self {
            Self::MySql(_) => DatabaseType::MySql,
            Self::Oracle(_) => DatabaseType::Oracle,
            Self::Sqlite(_) => DatabaseType::Sqlite,
            Self::Redis(_) => DatabaseType::Redis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_from_connection_string() {
        assert_eq!(
            DatabaseType::from_connection_string("mysql://localhost/db"),
            Some(DatabaseType::MySql)
        );
        assert_eq!(
            DatabaseType::from_connection_string("goldendb://localhost/db"),
            Some(DatabaseType::MySql)
        );
        assert_eq!(
            DatabaseType::from_connection_string("oracle://scott@db:1521/ORCL"),
            Some(DatabaseType::Oracle)
        );
        assert_eq!(
            DatabaseType::from_connection_string("sqlite:test.db"),
            Some(DatabaseType::Sqlite)
        );
        assert_eq!(
            DatabaseType::from_connection_string("redis://localhost:6379/0"),
            Some(DatabaseType::Redis)
        );
        assert_eq!(
            DatabaseType::from_connection_string("unknown://localhost"),
            None
        );
    }

    #[test]
    fn test_database_type_parse() {
        assert_eq!(DatabaseType::parse("GoldenDB"), Some(DatabaseType::MySql));
        assert_eq!(DatabaseType::parse("sqlite3"), Some(DatabaseType::Sqlite));
        assert_eq!(DatabaseType::parse("mongo"), None);
    }

    #[test]
    fn test_server_config_debug_masks_password() {
        let config = ServerConfig::new("localhost", 3306)
            .with_user("root")
            .with_password("secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_oracle_connect_string_priority() {
        let mut config = OracleConfig::new(ServerConfig::new("db", 1521).with_database("DBNAME"));
        assert_eq!(
            config.resolve_connect_string().as_deref(),
            Some("db:1521/DBNAME")
        );

        config.sid = Some("ORCLSID".to_string());
        assert_eq!(
            config.resolve_connect_string().as_deref(),
            Some("db:1521/ORCLSID")
        );

        config.service_name = Some("ORCLPDB1".to_string());
        assert_eq!(
            config.resolve_connect_string().as_deref(),
            Some("db:1521/ORCLPDB1")
        );

        config.connect_string = Some("PRODTNS".to_string());
        assert_eq!(config.resolve_connect_string().as_deref(), Some("PRODTNS"));
    }

    #[test]
    fn test_oracle_connect_string_defaults_port_and_requires_service() {
        let config = OracleConfig::new(ServerConfig::new("db", 0).with_database("XE"));
        assert_eq!(config.resolve_connect_string().as_deref(), Some("db:1521/XE"));

        let config = OracleConfig::new(ServerConfig::new("db", 1521));
        assert_eq!(config.resolve_connect_string(), None);
    }

    #[test]
    fn test_sqlite_database_name() {
        let config = SqliteConfig::new("/var/data/app.db");
        assert_eq!(config.database_name(), "app.db");
        assert!(!config.readonly);
    }
}
