use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::RunupError;
use crate::hash::ContentDigest;
use crate::utils::Utils;

/// Outcome of recording one file in the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordedFile {
    pub file_id: i64,
    /// The canonical record this one borrows its bytes from. `None` means
    /// the new record is itself canonical and its bytes must be archived.
    pub origin: Option<i64>,
}

impl RecordedFile {
    #[cfg(test)]
    pub fn is_canonical(&self) -> bool {
        self.origin.is_none()
    }
}

/// One file record of a job, pre-joined with the record that physically
/// holds its bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobFile {
    pub file_id: i64,
    pub backup_name: String,
    pub path: String,
    pub canonical_ref: Option<i64>,
    pub canonical_job_id: Option<i64>,
    pub canonical_path: Option<String>,
}

impl JobFile {
    /// Job whose archive holds this file's bytes.
    pub fn source_job_id(&self, own_job_id: i64) -> i64 {
        self.canonical_job_id.unwrap_or(own_job_id)
    }

    /// Entry name inside the source archive, without any leading `./`.
    pub fn source_path(&self) -> &str {
        Utils::normalize_archive_path(self.canonical_path.as_deref().unwrap_or(&self.path))
    }

    /// Restore location relative to the destination root.
    pub fn destination_path(&self) -> &str {
        Utils::normalize_archive_path(&self.path)
    }
}

pub struct FileRecord;

impl FileRecord {
    /// Records `path` with content `digest` under `job_id`.
    ///
    /// The first record ever seen for a digest pair is canonical. Every later
    /// record points straight at that canonical holder, so references never
    /// chain.
    pub fn record(
        db: &mut Database,
        job_id: i64,
        backup_name: &str,
        path: &str,
        digest: &ContentDigest,
    ) -> Result<RecordedFile, RunupError> {
        db.immediate_transaction(|tx| {
            let existing: Option<(i64, Option<i64>)> = tx
                .query_row(
                    "SELECT file_id, canonical_ref
                     FROM files
                     WHERE sha256 = ? AND sha512 = ?
                     ORDER BY file_id ASC
                     LIMIT 1",
                    params![digest.sha256(), digest.sha512()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            // Resolve to the true holder at insert time
            let origin = existing.map(|(file_id, canonical_ref)| canonical_ref.unwrap_or(file_id));

            let file_id: i64 = tx.query_row(
                "INSERT INTO files (job_id, backup_name, path, sha256, sha512, canonical_ref)
                 VALUES (?, ?, ?, ?, ?, ?)
                 RETURNING file_id",
                params![
                    job_id,
                    backup_name,
                    path,
                    digest.sha256(),
                    digest.sha512(),
                    origin
                ],
                |row| row.get(0),
            )?;

            Ok(RecordedFile { file_id, origin })
        })
    }

    pub fn list_job_files(db: &Database, job_id: i64) -> Result<Vec<JobFile>, RunupError> {
        let mut stmt = db.conn().prepare(
            "SELECT f.file_id, f.backup_name, f.path, f.canonical_ref, c.job_id, c.path
             FROM files f
             LEFT JOIN files c ON c.file_id = f.canonical_ref
             WHERE f.job_id = ?
             ORDER BY f.file_id ASC",
        )?;

        let rows = stmt.query_map([job_id], |row| {
            Ok(JobFile {
                file_id: row.get(0)?,
                backup_name: row.get(1)?,
                path: row.get(2)?,
                canonical_ref: row.get(3)?,
                canonical_job_id: row.get(4)?,
                canonical_path: row.get(5)?,
            })
        })?;

        let mut job_files = Vec::new();
        for row in rows {
            job_files.push(row?);
        }

        Ok(job_files)
    }

    #[cfg(test)]
    pub fn count_for_job(db: &Database, job_id: i64) -> Result<i64, RunupError> {
        let count: i64 = db.conn().query_row(
            "SELECT COUNT(*) FROM files WHERE job_id = ?",
            [job_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
