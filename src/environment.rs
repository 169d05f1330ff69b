use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::database::Database;
use crate::error::RunupError;

pub const RUNUP_DIR: &str = ".runup";
const VERSION_FILE: &str = ".version";
const DB_FILENAME: &str = "runup.db";
const JOBS_DIR: &str = "jobs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    Created,
    /// The root already had a `.runup` directory. Nothing was touched.
    AlreadyInitialized,
}

/// On-disk layout of a backup root:
///
/// ```text
/// <root>/.runup/.version     interpreter version that created the environment
/// <root>/.runup/runup.db     job ledger
/// <root>/.runup/jobs/<id>    one archive per job
/// ```
#[derive(Clone, Debug)]
pub struct Environment {
    root: PathBuf,
}

impl Environment {
    pub fn new(root: &Path) -> Self {
        Environment {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runup_dir(&self) -> PathBuf {
        self.root.join(RUNUP_DIR)
    }

    pub fn version_path(&self) -> PathBuf {
        self.runup_dir().join(VERSION_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.runup_dir().join(DB_FILENAME)
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.runup_dir().join(JOBS_DIR)
    }

    pub fn archive_path(&self, job_id: i64) -> PathBuf {
        self.jobs_dir().join(job_id.to_string())
    }

    pub fn is_initialized(&self) -> bool {
        self.runup_dir().is_dir()
    }

    pub fn ensure_initialized(&self) -> Result<(), RunupError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(RunupError::NotInitialized(self.root.clone()))
        }
    }

    /// Opens a fresh ledger connection. Every ledger operation gets its own.
    pub fn connect(&self) -> Result<Database, RunupError> {
        self.ensure_initialized()?;
        Database::connect(&self.db_path())
    }

    pub fn stored_version(&self) -> Result<String, RunupError> {
        self.ensure_initialized()?;
        Ok(fs::read_to_string(self.version_path())?.trim().to_owned())
    }

    /// Creates the `.runup` directory, version marker, jobs directory and
    /// ledger.
    pub fn setup(&self, version: &str) -> Result<SetupOutcome, RunupError> {
        let runup_dir = self.runup_dir();

        if runup_dir.exists() {
            info!("The directory '{}' already exists", runup_dir.display());
            return Ok(SetupOutcome::AlreadyInitialized);
        }

        fs::create_dir(&runup_dir)?;
        debug!("Created directory '{}'", runup_dir.display());

        fs::write(self.version_path(), version)?;
        debug!("Created file '{}'", self.version_path().display());

        fs::create_dir(self.jobs_dir())?;
        debug!("Created directory '{}'", self.jobs_dir().display());

        Database::create(&self.db_path())?;
        info!("Initialized RunUp environment in '{}'", self.root.display());

        Ok(SetupOutcome::Created)
    }
}
