// SPDX-FileCopyrightText: 2026 Bday Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;

use bday_core::BdayError;
use tracing::{debug, info};

use crate::migrations::run_migrations;

/// Map a tokio-rusqlite error onto the store error variant.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> BdayError {
    BdayError::StoreUnavailable {
        source: Box::new(e),
    }
}

/// Same as [`map_tr_err`] but for the queue tables.
pub(crate) fn map_queue_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> BdayError {
    BdayError::Queue {
        source: Box::new(e),
    }
}

/// Handle to one SQLite file with migrations applied.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode and run migrations.
    pub async fn open(path: &str) -> Result<Self, BdayError> {
        Self::open_with(path, true).await
    }

    /// Open with explicit journal mode. `:memory:` is accepted for tests.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, BdayError> {
        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| BdayError::StoreUnavailable {
                        source: Box::new(e),
                    })?;
                }
            }
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| BdayError::StoreUnavailable {
                source: Box::new(e),
            })?;

        conn.call(move |conn| {
            if wal_mode {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| run_migrations(conn).map_err(rusqlite_from_migration))
            .await
            .map_err(map_tr_err)?;

        info!(path, wal_mode, "database opened");
        Ok(Self {
            conn,
            path: path.to_string(),
        })
    }

    /// The single writer connection. Query modules go through `call()`.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Checkpoint the WAL so the main file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), BdayError> {
        self.conn
            .call(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);"))
            .await
            .map_err(map_tr_err)?;
        debug!(path = %self.path, "wal checkpointed");
        Ok(())
    }

    /// Checkpoint and close the background connection.
    pub async fn close(self) -> Result<(), BdayError> {
        self.checkpoint().await?;
        self.conn
            .close()
            .await
            .map_err(|e| BdayError::StoreUnavailable {
                source: Box::new(e),
            })
    }
}

fn rusqlite_from_migration(e: refinery::Error) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(e))
}
