use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::RunupError;

/// What a job covers: one named project, or every project declared in the
/// configuration file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobScope {
    Project(String),
    AllProjects,
}

impl JobScope {
    pub fn backup_name(&self) -> Option<&str> {
        match self {
            JobScope::Project(name) => Some(name),
            JobScope::AllProjects => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Job {
    job_id: i64,
    backup_name: Option<String>,
    start_time: i64,
    finish_time: Option<i64>,
    file_count: i64,
}

impl Job {
    /// Inserts a job row stamped with the current time and returns its id.
    pub fn create(db: &mut Database, scope: &JobScope) -> Result<i64, RunupError> {
        let start_time = Utc::now().timestamp();

        db.immediate_transaction(|tx| {
            let job_id: i64 = tx.query_row(
                "INSERT INTO jobs (backup_name, start_time, finish_time, file_count)
                 VALUES (?, ?, NULL, 0)
                 RETURNING job_id",
                params![scope.backup_name(), start_time],
                |row| row.get(0),
            )?;
            Ok(job_id)
        })
    }

    /// Finish-time bookkeeping once the job's archive has been finalized.
    pub fn finish(db: &mut Database, job_id: i64, file_count: i64) -> Result<(), RunupError> {
        let finish_time = Utc::now().timestamp();

        db.immediate_transaction(|tx| {
            let updated = tx.execute(
                "UPDATE jobs SET finish_time = ?, file_count = ? WHERE job_id = ?",
                params![finish_time, file_count, job_id],
            )?;
            if updated == 0 {
                return Err(RunupError::NotFound(format!("Job {job_id} does not exist")));
            }
            Ok(())
        })
    }

    pub fn get_by_id(db: &Database, job_id: i64) -> Result<Option<Self>, RunupError> {
        db.conn()
            .query_row(
                "SELECT job_id, backup_name, start_time, finish_time, file_count
                 FROM jobs
                 WHERE job_id = ?",
                [job_id],
                |row| {
                    Ok(Job {
                        job_id: row.get(0)?,
                        backup_name: row.get(1)?,
                        start_time: row.get(2)?,
                        finish_time: row.get(3)?,
                        file_count: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(RunupError::DatabaseError)
    }

    /// Highest job id holding at least one file record for `backup_name`.
    pub fn latest_for_backup(db: &Database, backup_name: &str) -> Result<i64, RunupError> {
        let job_id: Option<i64> = db.conn().query_row(
            "SELECT MAX(job_id) FROM files WHERE backup_name = ?",
            [backup_name],
            |row| row.get(0),
        )?;

        job_id.ok_or_else(|| {
            RunupError::NotFound(format!("No job with files found for backup '{backup_name}'"))
        })
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn backup_name(&self) -> Option<&str> {
        self.backup_name.as_deref()
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn finish_time(&self) -> Option<i64> {
        self.finish_time
    }

    pub fn file_count(&self) -> i64 {
        self.file_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backups::Backup;
    use crate::environment::Environment;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Environment) {
        let dir = TempDir::new().unwrap();
        let env = Environment::new(dir.path());
        env.setup("1").unwrap();
        (dir, env)
    }

    #[test]
    fn test_job_ids_are_monotonic() {
        let (_dir, env) = setup();
        let mut db = env.connect().unwrap();
        Backup::upsert(&mut db, "site", None).unwrap();

        let scope = JobScope::Project("site".to_string());
        let first = Job::create(&mut db, &scope).unwrap();
        let second = Job::create(&mut db, &scope).unwrap();
        assert!(second > first);

        let job = Job::get_by_id(&db, first).unwrap().unwrap();
        assert_eq!(job.backup_name(), Some("site"));
        assert_eq!(job.finish_time(), None);
        assert_eq!(job.file_count(), 0);
        assert!(job.start_time() > 0);
    }

    #[test]
    fn test_all_projects_job_has_no_backup_name() {
        let (_dir, env) = setup();
        let mut db = env.connect().unwrap();

        let job_id = Job::create(&mut db, &JobScope::AllProjects).unwrap();
        let job = Job::get_by_id(&db, job_id).unwrap().unwrap();
        assert_eq!(job.backup_name(), None);
    }

    #[test]
    fn test_finish_records_count() {
        let (_dir, env) = setup();
        let mut db = env.connect().unwrap();

        let job_id = Job::create(&mut db, &JobScope::AllProjects).unwrap();
        Job::finish(&mut db, job_id, 5).unwrap();

        let job = Job::get_by_id(&db, job_id).unwrap().unwrap();
        assert_eq!(job.file_count(), 5);
        assert!(job.finish_time().is_some());

        assert!(matches!(Job::finish(&mut db, 999, 1), Err(RunupError::NotFound(_))));
    }

    #[test]
    fn test_latest_without_files_is_not_found() {
        let (_dir, env) = setup();
        let mut db = env.connect().unwrap();
        Backup::upsert(&mut db, "site", None).unwrap();
        Job::create(&mut db, &JobScope::Project("site".to_string())).unwrap();

        let err = Job::latest_for_backup(&db, "site").unwrap_err();
        assert!(matches!(err, RunupError::NotFound(_)));
    }
}
