//! SQLite implementation of MetadataStorage trait

use crate::error::UploadError;
use crate::metadata::config::MetadataConfig;
use crate::metadata::{metadata_version, MetadataStorage};
use crate::session::UploadFile;
use chrono::Utc;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS upload_sessions (
    version TEXT NOT NULL,
    id TEXT NOT NULL,
    record TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (version, id)
)";

/// SQLite implementation of MetadataStorage
pub struct SQLiteMetadataStore {
    conn: Mutex<Connection>,
    version: String,
}

impl SQLiteMetadataStore {
    /// Open the database named by the configuration, creating it if needed
    pub fn new(config: &MetadataConfig) -> Result<Self, UploadError> {
        let path = Path::new(&config.db_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening SQLite metadata store at {}", path.display());
        let conn = Connection::open(path)?;
        if config.wal_mode {
            // journal_mode returns the resulting mode as a row
            let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
            debug!("SQLite journal mode: {}", mode);
        }
        Self::with_connection(conn, metadata_version())
    }

    /// A private in-memory database, mostly useful in tests
    pub fn in_memory() -> Result<Self, UploadError> {
        Self::with_connection(Connection::open_in_memory()?, metadata_version())
    }

    /// Wrap an open connection, scoping all records to `version`
    pub fn with_connection(conn: Connection, version: String) -> Result<Self, UploadError> {
        conn.execute(CREATE_TABLE, [])?;
        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM upload_sessions WHERE version = ?1",
            params![version],
            |row| row.get(0),
        )?;
        info!("Loaded {} upload session records for {}", existing, version);
        Ok(Self {
            conn: Mutex::new(conn),
            version,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MetadataStorage for SQLiteMetadataStore {
    fn version(&self) -> &str {
        &self.version
    }

    fn get(&self, id: &str) -> Result<Option<UploadFile>, UploadError> {
        let conn = self.conn();
        let record: Option<String> = conn
            .query_row(
                "SELECT record FROM upload_sessions WHERE version = ?1 AND id = ?2",
                params![self.version, id],
                |row| row.get(0),
            )
            .optional()?;

        match record {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn set(&self, file: &UploadFile) -> Result<(), UploadError> {
        let record = serde_json::to_string(file)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO upload_sessions (version, id, record, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(version, id) DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at",
            params![self.version, file.id, record, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, UploadError> {
        let conn = self.conn();
        let removed = conn.execute(
            "DELETE FROM upload_sessions WHERE version = ?1 AND id = ?2",
            params![self.version, id],
        )?;
        Ok(removed > 0)
    }

    fn all(&self) -> Result<Vec<UploadFile>, UploadError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT record FROM upload_sessions WHERE version = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![self.version], |row| row.get::<_, String>(0))?;

        let mut files = Vec::new();
        for row in rows {
            files.push(serde_json::from_str(&row?)?);
        }
        Ok(files)
    }
}
