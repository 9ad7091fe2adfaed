//! Database layer for the clinic inventory store.

mod schema;
mod medications;
mod movements;
mod suppliers;
mod purchase_orders;
mod quotations;
mod settings;

pub use schema::*;
#[allow(unused_imports)]
pub use medications::*;
#[allow(unused_imports)]
pub use movements::*;
#[allow(unused_imports)]
pub use purchase_orders::*;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction.
    pub fn transaction(&mut self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Run `f` inside a transaction on this connection.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. Must not be nested.
    pub fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<DbError>,
        F: FnOnce(&Database) -> Result<T, E>,
    {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| E::from(DbError::from(e)))?;
        let value = f(self)?;
        tx.commit().map_err(|e| E::from(DbError::from(e)))?;
        Ok(value)
    }

    /// Increment and return the named counter.
    pub fn next_sequence(&self, name: &str) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO sequences (name, value) VALUES (?1, 1)
            ON CONFLICT(name) DO UPDATE SET value = value + 1
            "#,
            [name],
        )?;
        let value = self
            .conn
            .query_row("SELECT value FROM sequences WHERE name = ?", [name], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("sequence {}", name)))?;
        Ok(value)
    }
}

/// Format a date column value.
pub(crate) fn date_to_sql(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Parse a date column value.
pub(crate) fn date_from_sql(value: Option<String>) -> DbResult<Option<NaiveDate>> {
    value
        .filter(|s| !s.is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| DbError::Constraint(format!("Invalid date '{}': {}", s, e)))
        })
        .transpose()
}
