//! Database connection module for the Rafeeq monitor
//!
//! The escalation log lives in a SQLite file. When the file cannot be created
//! or opened the pool falls back to an in-memory SQLite database so that
//! monitoring never depends on the disk being writable.

use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use super::migrations::run_sqlite_migrations;

type SqlitePool = r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>;

/// Shared SQLite connection pool
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: Arc<SqlitePool>,
    in_memory: bool,
}

impl DatabasePool {
    /// Borrow a connection from the pool
    pub fn get(&self) -> Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, r2d2::Error> {
        self.pool.get()
    }

    /// Whether this pool is the in-memory fallback
    pub fn is_in_memory(&self) -> bool {
        self.in_memory
    }
}

/// Database error
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// SQLite connection pool error
    #[error("SQLite connection pool error: {0}")]
    SqlitePoolError(#[from] r2d2::Error),

    /// Invalid configuration value
    #[error("Database configuration error: {0}")]
    ConfigError(String),

    /// Migration error
    #[error("Database migration error: {0}")]
    MigrationError(String),
}

/// Database configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file; `None` selects an in-memory database
    pub sqlite_path: Option<String>,
    /// Maximum number of pooled connections
    pub pool_size: u32,
    /// Connection timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: Some("data/rafeeq.db".to_string()),
            pool_size: 5,
            timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    /// In-memory configuration, mostly useful for tests
    pub fn in_memory() -> Self {
        Self {
            sqlite_path: None,
            ..Self::default()
        }
    }

    /// Create a new database configuration from environment variables
    pub fn from_env() -> Result<Self, DatabaseError> {
        let defaults = Self::default();

        let sqlite_path = match env::var("DB_SQLITE_PATH") {
            Ok(path) if path == ":memory:" => None,
            Ok(path) => Some(path),
            Err(_) => defaults.sqlite_path,
        };

        let pool_size = match env::var("DB_POOL_SIZE") {
            Ok(raw) => raw.parse::<u32>().map_err(|_| {
                DatabaseError::ConfigError(format!("DB_POOL_SIZE must be a positive integer, got {}", raw))
            })?,
            Err(_) => defaults.pool_size,
        };

        if pool_size == 0 {
            return Err(DatabaseError::ConfigError("DB_POOL_SIZE must be at least 1".to_string()));
        }

        let timeout_seconds = env::var("DB_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.timeout_seconds);

        info!(
            "Database configuration: path={:?}, pool_size={}, timeout={}s",
            sqlite_path, pool_size, timeout_seconds
        );

        Ok(DatabaseConfig {
            sqlite_path,
            pool_size,
            timeout_seconds,
        })
    }
}

/// Initialize the database connection pool and run migrations
pub fn initialize_database_pool(config: &DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    let pool = match config.sqlite_path.as_deref() {
        Some(path) => initialize_sqlite_pool(path, config)?,
        None => initialize_in_memory_sqlite_pool(config)?,
    };

    let conn = pool.get()?;
    run_sqlite_migrations(&conn).map_err(DatabaseError::MigrationError)?;

    Ok(pool)
}

/// Initialize SQLite connection pool backed by a file
fn initialize_sqlite_pool(sqlite_path: &str, config: &DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    use rusqlite::OpenFlags;
    use std::fs;
    use std::path::Path;

    info!("Initializing SQLite database at: {}", sqlite_path);

    if let Some(parent) = Path::new(sqlite_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create directory {:?}: {}, falling back to in-memory database", parent, e);
                return initialize_in_memory_sqlite_pool(config);
            }
        }
    }

    let manager = r2d2_sqlite::SqliteConnectionManager::file(sqlite_path)
        .with_flags(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE);

    match r2d2::Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(Duration::from_secs(config.timeout_seconds))
        .build(manager)
    {
        Ok(pool) => {
            info!("SQLite connection pool created successfully");
            Ok(DatabasePool {
                pool: Arc::new(pool),
                in_memory: false,
            })
        }
        Err(e) => {
            error!("Failed to create SQLite connection pool: {}", e);
            warn!("Falling back to in-memory SQLite database");
            initialize_in_memory_sqlite_pool(config)
        }
    }
}

/// Initialize an in-memory SQLite database
///
/// Every in-memory connection is a separate database, so the pool holds a
/// single connection.
fn initialize_in_memory_sqlite_pool(config: &DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    info!("Initializing in-memory SQLite database");

    let manager = r2d2_sqlite::SqliteConnectionManager::memory();
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .connection_timeout(Duration::from_secs(config.timeout_seconds))
        .build(manager)?;

    Ok(DatabasePool {
        pool: Arc::new(pool),
        in_memory: true,
    })
}

/// Get information about the current database connection
pub fn get_connection_info(pool: &DatabasePool) -> Result<String, DatabaseError> {
    let conn = pool.get()?;
    let path = conn
        .query_row("PRAGMA database_list", [], |row| row.get::<_, String>(2))
        .unwrap_or_default();

    let location = if pool.is_in_memory() || path.is_empty() {
        "SQLite in-memory database".to_string()
    } else {
        format!("SQLite database at {}", path)
    };

    let state = pool.pool.state();
    Ok(format!(
        "{} (connections: active={}, idle={})",
        location, state.connections, state.idle_connections
    ))
}
