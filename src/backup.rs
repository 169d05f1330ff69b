use std::fs;

use log::{debug, info, warn, Level};
use logging_timer::timer;

use crate::archive::ArchiveWriter;
use crate::backups::Backup;
use crate::config::Compression;
use crate::dedup::{Admission, DedupStore};
use crate::environment::Environment;
use crate::error::RunupError;
use crate::events::{Event, EventSink};
use crate::jobs::{Job, JobScope};
use crate::manifest::{Manifest, Project};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackupSummary {
    pub job_id: i64,
    pub directories: usize,
    /// Files whose bytes went into this job's archive.
    pub stored: usize,
    /// Files recorded as references to content archived earlier.
    pub deduplicated: usize,
}

impl BackupSummary {
    pub fn file_count(&self) -> usize {
        self.stored + self.deduplicated
    }
}

/// Registers every declared project in the ledger.
pub fn register_projects(
    env: &Environment,
    projects: &[Project],
    sink: &dyn EventSink,
) -> Result<(), RunupError> {
    env.ensure_initialized()?;

    for project in projects {
        let mut db = env.connect()?;
        let backup = Backup::upsert(&mut db, &project.name, project.schedule.as_deref())?;
        debug!(
            "Registered backup '{}' (schedule: {}, running: {})",
            backup.name(),
            backup.schedule().unwrap_or("none"),
            backup.running()
        );
        sink.emit(Event::BackupRegistered {
            name: project.name.clone(),
        });
    }

    Ok(())
}

/// Runs one backup job over `projects`.
///
/// With a single project the job is scoped to it; with several, one job
/// spans all of them and their manifests are concatenated in the given
/// order before any hashing starts.
///
/// If anything fails after the job row exists, the job and the file records
/// already inserted stay in the ledger and the error is returned.
pub fn create_backup(
    env: &Environment,
    scope: JobScope,
    projects: &[Project],
    compression: Compression,
    sink: &dyn EventSink,
) -> Result<BackupSummary, RunupError> {
    env.ensure_initialized()?;
    let _tmr = timer!(Level::Debug; "create_backup", "{:?}", scope);

    let mut manifest = Manifest::default();
    for project in projects {
        let resolved = Manifest::resolve(env.root(), project)?;
        sink.emit(Event::ManifestResolved {
            project: project.name.clone(),
            entries: resolved.len(),
        });
        manifest.concat(resolved);
    }

    if manifest.is_empty() {
        warn!("Nothing to back up for {:?}: every include resolved to no entries", scope);
    }

    let job_id = {
        let mut db = env.connect()?;
        Job::create(&mut db, &scope)?
    };
    info!(
        "Created job {} ({} manifest entries, {} files)",
        job_id,
        manifest.len(),
        manifest.file_count()
    );
    sink.emit(Event::JobCreated {
        job_id,
        backup_name: scope.backup_name().map(str::to_owned),
    });

    fs::create_dir_all(env.jobs_dir())?;
    let mut writer = ArchiveWriter::create(&env.archive_path(job_id), compression)?;
    let store = DedupStore::new(env);
    let mut summary = BackupSummary {
        job_id,
        ..Default::default()
    };

    for entry in manifest.entries() {
        match store.admit(job_id, entry)? {
            Admission::Directory => {
                writer.add_directory(&entry.archive_path)?;
                summary.directories += 1;
                sink.emit(Event::DirectoryArchived {
                    path: entry.archive_path.clone(),
                });
            }
            Admission::Write { file_id } => {
                writer.add_file(&entry.archive_path, &entry.source)?;
                summary.stored += 1;
                sink.emit(Event::FileStored {
                    path: entry.archive_path.clone(),
                    file_id,
                });
            }
            Admission::Skip { file_id, origin } => {
                summary.deduplicated += 1;
                sink.emit(Event::FileDeduplicated {
                    path: entry.archive_path.clone(),
                    file_id,
                    origin_file_id: origin,
                });
            }
        }
    }

    // The archive must be complete before the job is marked finished
    let archive = writer.finish()?;
    let file_count = summary.file_count() as i64;
    {
        let mut db = env.connect()?;
        Job::finish(&mut db, job_id, file_count)?;
    }

    info!(
        "Job {} finished: {} stored, {} deduplicated, {} directories -> '{}'",
        job_id,
        summary.stored,
        summary.deduplicated,
        summary.directories,
        archive.display()
    );
    sink.emit(Event::ArchiveFinalized { job_id, file_count });

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveReader;
    use crate::events::test_sink::RecordingSink;
    use crate::files::FileRecord;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    fn project(name: &str, include: &[&str]) -> Project {
        Project {
            name: name.to_string(),
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: Vec::new(),
            schedule: None,
        }
    }

    fn setup() -> (TempDir, Environment) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("site/assets")).unwrap();
        fs::create_dir_all(root.join("notes")).unwrap();
        fs::write(root.join("site/index.html"), "<html></html>").unwrap();
        fs::write(root.join("site/assets/logo.svg"), "<svg/>").unwrap();
        fs::write(root.join("notes/todo.txt"), "buy milk").unwrap();

        let env = Environment::new(root);
        env.setup("1").unwrap();
        (dir, env)
    }

    fn run(env: &Environment, projects: &[Project], scope: JobScope) -> BackupSummary {
        register_projects(env, projects, &RecordingSink::default()).unwrap();
        create_backup(env, scope, projects, Compression::Deflated, &RecordingSink::default()).unwrap()
    }

    fn archive_names(env: &Environment, job_id: i64) -> Vec<String> {
        let reader = ArchiveReader::open(&env.archive_path(job_id)).unwrap();
        let mut names: Vec<String> = ["site/", "site/assets/", "site/assets/logo.svg", "site/index.html", "notes/", "notes/todo.txt"]
            .iter()
            .filter(|n| reader.contains(n))
            .map(|n| n.to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_first_backup_stores_everything() {
        let (_dir, env) = setup();
        let site = project("site", &["site"]);

        let summary = run(&env, &[site], JobScope::Project("site".to_string()));
        assert_eq!(summary.stored, 2);
        assert_eq!(summary.deduplicated, 0);
        assert_eq!(summary.directories, 2);

        assert_eq!(
            archive_names(&env, summary.job_id),
            vec!["site/", "site/assets/", "site/assets/logo.svg", "site/index.html"]
        );

        let db = env.connect().unwrap();
        let job = Job::get_by_id(&db, summary.job_id).unwrap().unwrap();
        assert_eq!(job.file_count(), 2);
        assert!(job.finish_time().is_some());
    }

    #[test]
    fn test_second_backup_skips_unchanged_bytes() {
        let (dir, env) = setup();
        let site = project("site", &["site"]);
        let scope = JobScope::Project("site".to_string());

        let first = run(&env, &[site.clone()], scope.clone());
        fs::write(dir.path().join("site/index.html"), "<html>v2</html>").unwrap();
        let second = run(&env, &[site], scope);

        assert_eq!(second.stored, 1);
        assert_eq!(second.deduplicated, 1);

        let names = archive_names(&env, second.job_id);
        assert!(names.contains(&"site/index.html".to_string()));
        assert!(!names.contains(&"site/assets/logo.svg".to_string()));
        assert!(names.contains(&"site/assets/".to_string()));

        let db = env.connect().unwrap();
        let files = FileRecord::list_job_files(&db, second.job_id).unwrap();
        let logo = files.iter().find(|f| f.path == "site/assets/logo.svg").unwrap();
        assert_eq!(logo.canonical_job_id, Some(first.job_id));
    }

    #[test]
    fn test_all_projects_share_one_job() {
        let (_dir, env) = setup();
        let projects = [project("notes", &["notes"]), project("site", &["site"])];

        let summary = run(&env, &projects, JobScope::AllProjects);
        assert_eq!(summary.file_count(), 3);

        let db = env.connect().unwrap();
        let job = Job::get_by_id(&db, summary.job_id).unwrap().unwrap();
        assert_eq!(job.backup_name(), None);
        assert_eq!(Job::latest_for_backup(&db, "notes").unwrap(), summary.job_id);
        assert_eq!(Job::latest_for_backup(&db, "site").unwrap(), summary.job_id);
    }

    #[test]
    fn test_same_file_in_two_projects() {
        let (_dir, env) = setup();
        let projects = [project("a", &["notes"]), project("b", &["notes/todo.txt"])];

        let summary = run(&env, &projects, JobScope::AllProjects);
        assert_eq!(summary.stored, 1);
        assert_eq!(summary.deduplicated, 1);
    }

    #[test]
    fn test_events_follow_the_run() {
        let (_dir, env) = setup();
        let notes = project("notes", &["notes"]);
        register_projects(&env, &[notes.clone()], &RecordingSink::default()).unwrap();

        let sink = RecordingSink::default();
        create_backup(&env, JobScope::Project("notes".to_string()), &[notes], Compression::Stored, &sink)
            .unwrap();

        assert_eq!(
            sink.names(),
            vec![
                "manifest_resolved",
                "job_created",
                "directory_archived",
                "file_stored",
                "archive_finalized"
            ]
        );
    }

    #[test]
    fn test_requires_initialized_environment() {
        let dir = TempDir::new().unwrap();
        let env = Environment::new(dir.path());
        let err = create_backup(
            &env,
            JobScope::AllProjects,
            &[],
            Compression::Deflated,
            &RecordingSink::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RunupError::NotInitialized(_)));
    }

    #[test]
    fn test_failure_leaves_job_in_ledger() {
        let (dir, env) = setup();
        let site = project("site", &["site"]);
        register_projects(&env, &[site.clone()], &RecordingSink::default()).unwrap();

        // A directory where the archive should go makes the archive unwritable
        let db = env.connect().unwrap();
        let next_job: i64 = db
            .conn()
            .query_row("SELECT COALESCE(MAX(job_id), 0) + 1 FROM jobs", [], |row| row.get(0))
            .unwrap();
        drop(db);
        fs::create_dir_all(env.archive_path(next_job)).unwrap();

        let result = create_backup(
            &env,
            JobScope::Project("site".to_string()),
            &[site],
            Compression::Deflated,
            &RecordingSink::default(),
        );
        assert!(result.is_err());

        let db = env.connect().unwrap();
        let job = Job::get_by_id(&db, next_job).unwrap().unwrap();
        assert_eq!(job.finish_time(), None);
        assert!(Path::new(dir.path()).exists());
    }
}
