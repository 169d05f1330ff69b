use std::path::{Component, Path, PathBuf};

use crate::error::RunupError;

pub struct Utils {}

impl Utils {
    /// Archive paths are compared without a leading `./`. Older records may
    /// still carry it, so every reader goes through here.
    pub fn normalize_archive_path(path: &str) -> &str {
        let mut trimmed = path;
        while let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        }
        trimmed
    }

    /// POSIX-separated form of a path relative to `root`, or `None` when the
    /// path is not beneath it. Names that are not valid UTF-8 have no archive
    /// name and are an error.
    pub fn archive_path_for(root: &Path, path: &Path) -> Result<Option<String>, RunupError> {
        let Ok(relative) = path.strip_prefix(root) else {
            return Ok(None);
        };

        let mut parts: Vec<&str> = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => match part.to_str() {
                    Some(part) => parts.push(part),
                    None => {
                        return Err(RunupError::Error(format!(
                            "'{}' is not valid UTF-8 and cannot be archived",
                            path.display()
                        )))
                    }
                },
                Component::CurDir => {}
                _ => return Ok(None),
            }
        }

        Ok(Some(parts.join("/")))
    }

    /// Joins an archive path onto `root`, refusing anything that would land
    /// outside of it.
    pub fn safe_join(root: &Path, archive_path: &str) -> Option<PathBuf> {
        let normalized = Self::normalize_archive_path(archive_path);
        if normalized.is_empty() {
            return None;
        }

        let mut joined = root.to_path_buf();
        for component in Path::new(normalized).components() {
            match component {
                Component::Normal(part) => joined.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }

        Some(joined)
    }

    /// Lexical cleanup of `.` and `..` so include/exclude rules compare
    /// against the same spelling the directory walk produces.
    pub fn lexical_clean(path: &Path) -> PathBuf {
        let mut cleaned = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !cleaned.pop() {
                        cleaned.push("..");
                    }
                }
                other => cleaned.push(other.as_os_str()),
            }
        }
        cleaned
    }
}
