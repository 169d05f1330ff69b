use log::trace;

use crate::environment::Environment;
use crate::error::RunupError;
use crate::files::FileRecord;
use crate::hash::Hash;
use crate::manifest::{EntryKind, ManifestEntry};

/// What the archive writer should do with one manifest entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Directory entry, written unconditionally and never recorded.
    Directory,
    /// New content. The bytes go into this job's archive.
    Write { file_id: i64 },
    /// Known content, already retrievable from the archive of `origin`.
    Skip { file_id: i64, origin: i64 },
}

/// Content-addressed dedup decisions backed by the job ledger.
pub struct DedupStore<'a> {
    env: &'a Environment,
}

impl<'a> DedupStore<'a> {
    pub fn new(env: &'a Environment) -> Self {
        DedupStore { env }
    }

    /// Hashes the entry and records it under `job_id`.
    pub fn admit(&self, job_id: i64, entry: &ManifestEntry) -> Result<Admission, RunupError> {
        if entry.kind == EntryKind::Directory {
            return Ok(Admission::Directory);
        }

        let digest = Hash::compute_content_digest(&entry.source)?;

        let mut db = self.env.connect()?;
        let recorded = FileRecord::record(
            &mut db,
            job_id,
            &entry.project,
            &entry.archive_path,
            &digest,
        )?;

        trace!(
            "'{}' digest {} -> file {} (origin {:?})",
            entry.archive_path,
            digest.short(),
            recorded.file_id,
            recorded.origin
        );

        Ok(match recorded.origin {
            None => Admission::Write {
                file_id: recorded.file_id,
            },
            Some(origin) => Admission::Skip {
                file_id: recorded.file_id,
                origin,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backups::Backup;
    use crate::jobs::{Job, JobScope};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn entry(root: &Path, archive_path: &str, kind: EntryKind) -> ManifestEntry {
        ManifestEntry {
            source: root.join(archive_path),
            archive_path: archive_path.to_string(),
            kind,
            project: "site".to_string(),
        }
    }

    #[test]
    fn test_admissions() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let env = Environment::new(root);
        env.setup("1").unwrap();

        fs::create_dir(root.join("docs")).unwrap();
        fs::write(root.join("docs/a.txt"), "same").unwrap();
        fs::write(root.join("docs/b.txt"), "same").unwrap();
        fs::write(root.join("docs/c.txt"), "different").unwrap();

        let mut db = env.connect().unwrap();
        Backup::upsert(&mut db, "site", None).unwrap();
        let job_id = Job::create(&mut db, &JobScope::Project("site".to_string())).unwrap();
        drop(db);

        let store = DedupStore::new(&env);

        assert_eq!(
            store.admit(job_id, &entry(root, "docs", EntryKind::Directory)).unwrap(),
            Admission::Directory
        );

        let a = store.admit(job_id, &entry(root, "docs/a.txt", EntryKind::File)).unwrap();
        let Admission::Write { file_id: a_id } = a else {
            panic!("expected a write, got {a:?}");
        };

        let b = store.admit(job_id, &entry(root, "docs/b.txt", EntryKind::File)).unwrap();
        assert!(matches!(b, Admission::Skip { origin, .. } if origin == a_id));

        let c = store.admit(job_id, &entry(root, "docs/c.txt", EntryKind::File)).unwrap();
        assert!(matches!(c, Admission::Write { .. }));
    }

    #[test]
    fn test_unreadable_file_is_error() {
        let dir = TempDir::new().unwrap();
        let env = Environment::new(dir.path());
        env.setup("1").unwrap();

        let store = DedupStore::new(&env);
        let result = store.admit(1, &entry(dir.path(), "gone.txt", EntryKind::File));
        assert!(matches!(result, Err(RunupError::IoError(_))));
    }
}
