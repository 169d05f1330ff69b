use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, trace, warn, Level};
use logging_timer::timer;

use crate::archive::ArchiveReader;
use crate::backups::Backup;
use crate::environment::Environment;
use crate::error::RunupError;
use crate::events::{Event, EventSink};
use crate::files::{FileRecord, JobFile};
use crate::jobs::Job;
use crate::utils::Utils;

/// A file that could not be restored. The rest of the run carries on.
#[derive(Debug)]
pub struct RestoreFailure {
    pub path: String,
    pub error: RunupError,
}

#[derive(Debug, Default)]
pub struct RestoreReport {
    pub job_id: i64,
    pub restored: Vec<String>,
    pub directories: Vec<String>,
    pub failures: Vec<RestoreFailure>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, path: &str, error: RunupError, sink: &dyn EventSink) {
        error!("Failed to restore '{}': {}", path, error);
        sink.emit(Event::RestoreFailed {
            path: path.to_owned(),
            error: error.to_string(),
        });
        self.failures.push(RestoreFailure {
            path: path.to_owned(),
            error,
        });
    }
}

/// Job to restore from: `None` or `0` means the newest job holding records
/// of `backup_name`.
pub fn resolve_job(
    env: &Environment,
    backup_name: &str,
    job: Option<i64>,
) -> Result<Job, RunupError> {
    let db = env.connect()?;

    if Backup::get_by_name(&db, backup_name)?.is_none() {
        return Err(RunupError::NotFound(format!(
            "Backup '{}' is not registered",
            backup_name
        )));
    }

    let job_id = match job {
        None | Some(0) => Job::latest_for_backup(&db, backup_name)?,
        Some(job_id) => job_id,
    };

    Job::get_by_id(&db, job_id)?
        .ok_or_else(|| RunupError::NotFound(format!("Job {} does not exist", job_id)))
}

/// Rebuilds the files of `backup_name` as captured by a job under
/// `destination`.
///
/// Files deduplicated against older jobs are read from the archive of the
/// job that holds their bytes. Each source archive is opened once.
pub fn restore_backup(
    env: &Environment,
    backup_name: &str,
    job: Option<i64>,
    destination: &Path,
    sink: &dyn EventSink,
) -> Result<RestoreReport, RunupError> {
    env.ensure_initialized()?;
    let _tmr = timer!(Level::Debug; "restore_backup", "{}", backup_name);

    let target = resolve_job(env, backup_name, job)?;
    let job_id = target.job_id();
    match target.finish_time() {
        Some(_) => debug!(
            "Job {} started at {} and recorded {} files",
            job_id,
            target.start_time(),
            target.file_count()
        ),
        None => warn!(
            "Job {} never finished; restoring the files it recorded",
            job_id
        ),
    }
    sink.emit(Event::RestoreJobResolved {
        backup_name: backup_name.to_owned(),
        job_id,
    });

    let files: Vec<JobFile> = {
        let db = env.connect()?;
        FileRecord::list_job_files(&db, job_id)?
            .into_iter()
            .filter(|f| f.backup_name == backup_name)
            .collect()
    };
    if files.is_empty() {
        return Err(RunupError::NotFound(format!(
            "Job {} holds no files of '{}'",
            job_id, backup_name
        )));
    }

    let scoped = target.backup_name() == Some(backup_name);

    let mut by_source: BTreeMap<i64, Vec<JobFile>> = BTreeMap::new();
    if scoped {
        // Directory entries live only in the target job's archive
        by_source.entry(job_id).or_default();
    }
    for file in files {
        by_source
            .entry(file.source_job_id(job_id))
            .or_default()
            .push(file);
    }

    let mut report = RestoreReport {
        job_id,
        ..Default::default()
    };

    for (source_job_id, files) in by_source {
        let archive_path = env.archive_path(source_job_id);
        let mut reader = match ArchiveReader::open(&archive_path) {
            Ok(reader) => reader,
            Err(e) => {
                let reason = e.to_string();
                if scoped && source_job_id == job_id {
                    warn!(
                        "Directory entries of job {} are lost: archive '{}' is unreadable: {}",
                        job_id,
                        archive_path.display(),
                        reason
                    );
                }
                for file in &files {
                    report.fail(
                        file.destination_path(),
                        missing_archive(source_job_id, &archive_path, &reason),
                        sink,
                    );
                }
                continue;
            }
        };
        sink.emit(Event::SourceArchiveOpened {
            job_id: source_job_id,
            entries: files.len(),
        });

        if scoped && source_job_id == job_id {
            restore_directories(&reader, destination, &mut report);
        }

        for file in &files {
            let dest_path = file.destination_path();
            let Some(target_path) = Utils::safe_join(destination, dest_path) else {
                report.fail(
                    dest_path,
                    RunupError::Error(format!("Refusing to restore unsafe path '{}'", file.path)),
                    sink,
                );
                continue;
            };

            trace!(
                "File {} '{}' reads '{}' from job {} (ref {:?})",
                file.file_id,
                dest_path,
                file.source_path(),
                source_job_id,
                file.canonical_ref
            );
            match reader.extract_to(file.source_path(), &target_path) {
                Ok(_) => {
                    report.restored.push(dest_path.to_owned());
                    sink.emit(Event::FileRestored {
                        path: dest_path.to_owned(),
                        source_job_id,
                    });
                }
                Err(RunupError::NotFound(reason)) => {
                    report.fail(dest_path, missing_archive(source_job_id, &archive_path, &reason), sink);
                }
                Err(e) => report.fail(dest_path, e, sink),
            }
        }
    }

    info!(
        "Restored {} files of '{}' from job {} into '{}' ({} failed)",
        report.restored.len(),
        backup_name,
        job_id,
        destination.display(),
        report.failures.len()
    );

    Ok(report)
}

fn missing_archive(job_id: i64, archive: &Path, reason: &str) -> RunupError {
    RunupError::MissingArchive {
        job_id,
        archive: archive.to_path_buf(),
        reason: reason.to_owned(),
    }
}

fn restore_directories(reader: &ArchiveReader, destination: &Path, report: &mut RestoreReport) {
    let mut names = reader.directory_names();
    names.sort();

    for name in names {
        let Some(dir) = Utils::safe_join(destination, &name) else {
            warn!("Skipping unsafe directory entry '{}'", name);
            continue;
        };
        match fs::create_dir_all(&dir) {
            Ok(()) => report.directories.push(Utils::normalize_archive_path(&name).to_owned()),
            Err(e) => warn!("Could not create directory '{}': {}", dir.display(), e),
        }
    }
}

/// Where a restore writes when no location is given.
pub fn default_destination(env: &Environment) -> PathBuf {
    env.root().to_path_buf()
}
