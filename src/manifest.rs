use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};
use walkdir::WalkDir;

use crate::environment::RUNUP_DIR;
use crate::error::RunupError;
use crate::runup_yaml::CONFIG_FILE_NAMES;
use crate::utils::Utils;

/// The include/exclude rules of one declared project.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub schedule: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    pub source: PathBuf,
    /// POSIX-separated path relative to the root, no leading `./`.
    pub archive_path: String,
    pub kind: EntryKind,
    /// Project whose include rules produced the entry.
    pub project: String,
}

/// The resolved set of files and directories one job backs up, ordered by
/// archive path.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn resolve(root: &Path, project: &Project) -> Result<Self, RunupError> {
        let root = Utils::lexical_clean(root);
        let excluded = Exclusions::new(&root, &project.exclude);
        let include_key = format!("project.{}.include", project.name);

        let mut by_archive_path: BTreeMap<String, ManifestEntry> = BTreeMap::new();

        for include in &project.include {
            let include_path = Utils::lexical_clean(&root.join(include));

            if Utils::archive_path_for(&root, &include_path)?.is_none() {
                return Err(RunupError::config(
                    include_key,
                    format!("'{include}' is outside of '{}'", root.display()),
                ));
            }

            if !include_path.exists() {
                return Err(RunupError::config(
                    include_key,
                    format!("'{include}' does not exist"),
                ));
            }

            let walker = WalkDir::new(&include_path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| !excluded.matches(entry.path()));

            for entry in walker {
                let entry = entry?;
                let file_type = entry.file_type();

                let kind = if file_type.is_dir() {
                    EntryKind::Directory
                } else if file_type.is_file() {
                    EntryKind::File
                } else {
                    warn!("Skipping '{}': not a regular file or directory", entry.path().display());
                    continue;
                };

                let archive_path = match Utils::archive_path_for(&root, entry.path())? {
                    // The root itself has no archive name
                    Some(p) if p.is_empty() => continue,
                    Some(p) => p,
                    None => continue,
                };

                if let Some(existing) = by_archive_path.get(&archive_path) {
                    // Overlapping includes reach the same file twice
                    if existing.source != entry.path() {
                        return Err(RunupError::Error(format!(
                            "'{}' and '{}' both map to archive path '{}'",
                            existing.source.display(),
                            entry.path().display(),
                            archive_path
                        )));
                    }
                    continue;
                }

                trace!("Including '{}' as '{}'", entry.path().display(), archive_path);
                by_archive_path.insert(
                    archive_path.clone(),
                    ManifestEntry {
                        source: entry.path().to_path_buf(),
                        archive_path,
                        kind,
                        project: project.name.clone(),
                    },
                );
            }
        }

        debug!(
            "Resolved {} entries for project '{}'",
            by_archive_path.len(),
            project.name
        );

        Ok(Manifest {
            entries: by_archive_path.into_values().collect(),
        })
    }

    /// Appends `other` after this manifest's entries.
    pub fn concat(&mut self, other: Manifest) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .count()
    }
}

struct Exclusions {
    paths: Vec<PathBuf>,
}

impl Exclusions {
    fn new(root: &Path, exclude: &[String]) -> Self {
        let mut paths: Vec<PathBuf> = exclude
            .iter()
            .map(|e| Utils::lexical_clean(&root.join(e)))
            .collect();
        paths.push(root.join(RUNUP_DIR));

        Exclusions { paths }
    }

    /// Exact match, or the path lies beneath an excluded directory.
    /// `Path::starts_with` compares whole components, so `docs` never
    /// excludes `docs-old`.
    fn matches(&self, path: &Path) -> bool {
        let is_config_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| CONFIG_FILE_NAMES.contains(&n))
            .unwrap_or(false);

        is_config_file || self.paths.iter().any(|excluded| path.starts_with(excluded))
    }
}
