use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::RunupError;

/// A project as the ledger knows it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Backup {
    name: String,
    running: bool,
    schedule: Option<String>,
}

impl Backup {
    /// Registers a project and returns its row. Existing rows are left alone
    /// apart from the schedule, which follows the configuration file.
    pub fn upsert(
        db: &mut Database,
        name: &str,
        schedule: Option<&str>,
    ) -> Result<Self, RunupError> {
        db.immediate_transaction(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO backups (name, running, schedule) VALUES (?, 0, ?)",
                params![name, schedule],
            )?;
            let backup = tx.query_row(
                "UPDATE backups SET schedule = ? WHERE name = ?
                 RETURNING name, running, schedule",
                params![schedule, name],
                Self::from_row,
            )?;
            Ok(backup)
        })
    }

    /// Registered project `name`, if any.
    pub fn get_by_name(db: &Database, name: &str) -> Result<Option<Self>, RunupError> {
        db.conn()
            .query_row(
                "SELECT name, running, schedule FROM backups WHERE name = ?",
                [name],
                Self::from_row,
            )
            .optional()
            .map_err(RunupError::DatabaseError)
    }

    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Backup {
            name: row.get(0)?,
            running: row.get(1)?,
            schedule: row.get(2)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn schedule(&self) -> Option<&str> {
        self.schedule.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use tempfile::TempDir;

    #[test]
    fn test_upsert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let env = Environment::new(dir.path());
        env.setup("1").unwrap();

        let mut db = env.connect().unwrap();
        Backup::upsert(&mut db, "site", None).unwrap();
        Backup::upsert(&mut db, "site", None).unwrap();

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM backups", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let backup = Backup::get_by_name(&db, "site").unwrap().unwrap();
        assert_eq!(backup.name(), "site");
        assert!(!backup.running());
        assert_eq!(backup.schedule(), None);
    }

    #[test]
    fn test_upsert_refreshes_schedule() {
        let dir = TempDir::new().unwrap();
        let env = Environment::new(dir.path());
        env.setup("1").unwrap();

        let mut db = env.connect().unwrap();
        let first = Backup::upsert(&mut db, "site", Some("0 3 * * *")).unwrap();
        assert_eq!(first.schedule(), Some("0 3 * * *"));
        Backup::upsert(&mut db, "site", Some("0 4 * * *")).unwrap();

        let backup = Backup::get_by_name(&db, "site").unwrap().unwrap();
        assert_eq!(backup.schedule(), Some("0 4 * * *"));
        assert_eq!(Backup::get_by_name(&db, "missing").unwrap(), None);
    }
}
