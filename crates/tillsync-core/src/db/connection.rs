//! Database connection management

use crate::error::{Error, Result};
use crate::util::{is_remote_url, normalize_text_option};
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::fmt;
use std::path::Path;

use super::migrations;

/// Connection parameters for the remote (canonical) store
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Remote database URL (e.g., `libsql://pos.turso.io`) or a shared file path
    pub url: Option<String>,
    /// Authentication token for a network remote
    pub auth_token: Option<String>,
}

impl RemoteConfig {
    /// Create a new remote configuration
    pub fn new(url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            url: normalize_text_option(Some(url.into())),
            auth_token: normalize_text_option(Some(auth_token.into())),
        }
    }

    /// Remote configuration pointing at a database file (shared volume or development).
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            url: normalize_text_option(Some(path.into())),
            auth_token: None,
        }
    }

    /// Check if the remote is configured
    pub fn is_configured(&self) -> bool {
        match self.url.as_deref() {
            Some(url) if is_remote_url(url) => self.auth_token.is_some(),
            Some(_) => true,
            None => false,
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Database wrapper for libSQL connections
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        let conn = db.connect()?;

        let database = Self {
            _db: db,
            conn,
        };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;

        let database = Self {
            _db: db,
            conn,
        };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Open the remote store described by `config`.
    ///
    /// Network URLs connect over the libSQL remote protocol; anything else is
    /// opened as a database file so a shared volume can act as the remote.
    pub async fn open_remote(config: &RemoteConfig) -> Result<Self> {
        let url = config
            .url
            .as_ref()
            .ok_or_else(|| Error::InvalidInput("Remote URL is required".into()))?;

        if !is_remote_url(url) {
            tracing::debug!("Opening file-backed remote store at {}", url);
            return Self::open(url).await;
        }

        let token = config
            .auth_token
            .as_ref()
            .ok_or_else(|| Error::InvalidInput("Remote auth token is required".into()))?;

        let db = Builder::new_remote(url.clone(), token.clone())
            .build()
            .await?;
        let conn = db.connect()?;

        let database = Self {
            _db: db,
            conn,
        };

        // Migrations create the tracked tables on a fresh remote
        database.migrate().await?;
        tracing::debug!("Connected to remote store {}", url);
        Ok(database)
    }

    /// Configure `SQLite` for optimal performance
    async fn configure(&self) -> Result<()> {
        // WAL is unavailable for in-memory databases; ignore failures
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA busy_timeout = 5000;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA cache_size = 10000;", ())
            .await
            .ok();
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
