use rusqlite::Error as RusqliteError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use zip::result::ZipError;

#[derive(Error, Debug)]
pub enum RunupError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error), // Converts io::Error into RunupError automatically

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError), // Converts rusqlite::Error automatically

    #[error("Archive error: {0}")]
    ArchiveError(#[from] ZipError),

    #[error("Directory walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    /// The configuration file is missing, malformed or violates the schema.
    /// `key` is the dotted location of the problem (or the file path when the
    /// file itself can't be read).
    #[error("Configuration error at `{key}`: {message}")]
    ConfigError { key: String, message: String },

    #[error("RunUp has not been initialized in '{}'", .0.display())]
    NotInitialized(PathBuf),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Archive for job {job_id} is missing or unreadable ('{}'): {reason}", .archive.display())]
    MissingArchive {
        job_id: i64,
        archive: PathBuf,
        reason: String,
    },

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}

impl RunupError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        RunupError::ConfigError {
            key: key.into(),
            message: message.into(),
        }
    }
}
