use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::Path;

use log::trace;

use crate::error::RunupError;
use crate::schema::{CREATE_SCHEMA_SQL, SCHEMA_VERSION};

/// One open connection to the job ledger.
///
/// Connections are short-lived: open, run one transaction, drop. Nothing
/// coordinates two processes working on the same root at the same time.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Creates the ledger file and its schema.
    pub fn create(db_path: &Path) -> Result<(), RunupError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(CREATE_SCHEMA_SQL)?;
        trace!("Created ledger at '{}'", db_path.display());
        Ok(())
    }

    pub fn connect(db_path: &Path) -> Result<Self, RunupError> {
        if !db_path.is_file() {
            return Err(RunupError::NotFound(format!(
                "Ledger '{}' does not exist",
                db_path.display()
            )));
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Database { conn };
        db.ensure_schema()?;

        Ok(db)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Runs `func` in an IMMEDIATE transaction and commits it when `func`
    /// succeeds. Any error rolls the transaction back.
    pub fn immediate_transaction<T, F>(&mut self, func: F) -> Result<T, RunupError>
    where
        F: FnOnce(&Transaction) -> Result<T, RunupError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = func(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    fn ensure_schema(&self) -> Result<(), RunupError> {
        let stored_version: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored_version.as_deref() {
            Some(SCHEMA_VERSION) => Ok(()),
            Some(other) => Err(RunupError::Error(format!(
                "Ledger schema version mismatch: expected {SCHEMA_VERSION}, found {other}"
            ))),
            None => Err(RunupError::Error("Ledger schema version missing".to_string())),
        }
    }
}
