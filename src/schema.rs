pub const SCHEMA_VERSION: &str = "1";

pub const CREATE_SCHEMA_SQL: &str = r#"
BEGIN TRANSACTION;

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', '1');

CREATE TABLE IF NOT EXISTS backups (
    name TEXT PRIMARY KEY,
    running INTEGER NOT NULL DEFAULT 0,
    schedule TEXT NULL               -- The project's cron string, stored but never executed
);

CREATE TABLE IF NOT EXISTS jobs (
    job_id INTEGER PRIMARY KEY AUTOINCREMENT,
    backup_name TEXT NULL,           -- NULL for a job spanning every declared project
    start_time INTEGER NOT NULL,
    finish_time INTEGER NULL,
    file_count INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (backup_name) REFERENCES backups(name)
);

CREATE TABLE IF NOT EXISTS files (
    file_id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL,         -- Job in which this record was created
    backup_name TEXT NOT NULL,       -- Project whose manifest produced the record
    path TEXT NOT NULL,              -- Archive-relative, POSIX separators
    sha256 TEXT NOT NULL,
    sha512 TEXT NOT NULL,
    canonical_ref INTEGER NULL,      -- NULL: this record's job archive holds the bytes
    FOREIGN KEY (job_id) REFERENCES jobs(job_id),
    FOREIGN KEY (backup_name) REFERENCES backups(name),
    FOREIGN KEY (canonical_ref) REFERENCES files(file_id)
);

CREATE INDEX IF NOT EXISTS idx_files_digest ON files (sha256, sha512);
CREATE INDEX IF NOT EXISTS idx_files_job ON files (job_id);
CREATE INDEX IF NOT EXISTS idx_files_backup_job ON files (backup_name, job_id);

COMMIT;
"#;
