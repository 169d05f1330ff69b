use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::{trace, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::Compression;
use crate::error::RunupError;

/// Builds the archive of one job. Only entries explicitly added end up in it.
pub struct ArchiveWriter {
    path: PathBuf,
    zip: ZipWriter<BufWriter<File>>,
    options: SimpleFileOptions,
    written: HashSet<String>,
}

impl ArchiveWriter {
    pub fn create(path: &Path, compression: Compression) -> Result<Self, RunupError> {
        let file = File::create(path)?;
        let method = match compression {
            Compression::Deflated => CompressionMethod::Deflated,
            Compression::Stored => CompressionMethod::Stored,
        };

        Ok(ArchiveWriter {
            path: path.to_path_buf(),
            zip: ZipWriter::new(BufWriter::new(file)),
            options: SimpleFileOptions::default().compression_method(method),
            written: HashSet::new(),
        })
    }

    /// Returns false when the name was already written to this archive.
    fn claim(&mut self, name: &str) -> bool {
        if self.written.insert(name.to_owned()) {
            true
        } else {
            warn!("'{}' is already in archive '{}'", name, self.path.display());
            false
        }
    }

    /// Adds an empty directory entry (`name/`).
    pub fn add_directory(&mut self, archive_path: &str) -> Result<(), RunupError> {
        let name = format!("{}/", archive_path.trim_end_matches('/'));
        if !self.claim(&name) {
            return Ok(());
        }

        self.zip.add_directory(name, self.options)?;
        Ok(())
    }

    pub fn add_file(&mut self, archive_path: &str, source: &Path) -> Result<(), RunupError> {
        if !self.claim(archive_path) {
            return Ok(());
        }

        let mut reader = BufReader::new(File::open(source)?);
        let large_file = fs::metadata(source)?.len() >= u32::MAX as u64;

        trace!("Archiving '{}' as '{}'", source.display(), archive_path);
        self.zip
            .start_file(archive_path, self.options.large_file(large_file))?;
        io::copy(&mut reader, &mut self.zip)?;
        Ok(())
    }

    /// Writes the central directory and closes the file.
    pub fn finish(self) -> Result<PathBuf, RunupError> {
        let mut writer = self.zip.finish()?;
        io::Write::flush(&mut writer)?;
        Ok(self.path)
    }
}

/// Read side of one job archive.
pub struct ArchiveReader {
    path: PathBuf,
    zip: ZipArchive<BufReader<File>>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self, RunupError> {
        let file = File::open(path)?;
        let zip = ZipArchive::new(BufReader::new(file))?;

        Ok(ArchiveReader {
            path: path.to_path_buf(),
            zip,
        })
    }

    /// Names of the directory entries, without the trailing `/`.
    pub fn directory_names(&self) -> Vec<String> {
        self.zip
            .file_names()
            .filter(|name| name.ends_with('/'))
            .map(|name| name.trim_end_matches('/').to_owned())
            .collect()
    }

    #[cfg(test)]
    pub fn contains(&self, name: &str) -> bool {
        self.zip.index_for_name(name).is_some()
    }

    /// Copies entry `name` to `destination`, replacing whatever is there.
    pub fn extract_to(&mut self, name: &str, destination: &Path) -> Result<u64, RunupError> {
        let mut entry = match self.zip.by_name(name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(RunupError::NotFound(format!(
                    "Entry '{}' is not in archive '{}'",
                    name,
                    self.path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = BufWriter::new(File::create(destination)?);
        let bytes = io::copy(&mut entry, &mut out)?;
        io::Write::flush(&mut out)?;

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_sample(dir: &Path, compression: Compression) -> PathBuf {
        let source = dir.join("source.txt");
        fs::write(&source, "archived bytes").unwrap();

        let mut writer = ArchiveWriter::create(&dir.join("1"), compression).unwrap();
        writer.add_directory("docs").unwrap();
        writer.add_directory("docs/empty/").unwrap();
        writer.add_file("docs/source.txt", &source).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let archive = write_sample(dir.path(), Compression::Deflated);

        let mut reader = ArchiveReader::open(&archive).unwrap();
        assert!(reader.contains("docs/source.txt"));
        assert!(reader.contains("docs/"));

        let mut dirs = reader.directory_names();
        dirs.sort();
        assert_eq!(dirs, vec!["docs".to_string(), "docs/empty".to_string()]);

        let out = dir.path().join("restore/deep/copy.txt");
        let bytes = reader.extract_to("docs/source.txt", &out).unwrap();
        assert_eq!(bytes, 14);
        assert_eq!(fs::read_to_string(&out).unwrap(), "archived bytes");
    }

    #[test]
    fn test_stored_compression() {
        let dir = TempDir::new().unwrap();
        let archive = write_sample(dir.path(), Compression::Stored);
        let reader = ArchiveReader::open(&archive).unwrap();
        assert!(reader.contains("docs/source.txt"));
    }

    #[test]
    fn test_duplicate_names_written_once() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "a").unwrap();

        let mut writer = ArchiveWriter::create(&dir.path().join("2"), Compression::Deflated).unwrap();
        writer.add_file("a.txt", &source).unwrap();
        writer.add_file("a.txt", &source).unwrap();
        let archive = writer.finish().unwrap();

        let reader = ArchiveReader::open(&archive).unwrap();
        assert_eq!(reader.zip.len(), 1);
    }

    #[test]
    fn test_missing_entry_is_not_found() {
        let dir = TempDir::new().unwrap();
        let archive = write_sample(dir.path(), Compression::Deflated);

        let mut reader = ArchiveReader::open(&archive).unwrap();
        let err = reader
            .extract_to("nope.txt", &dir.path().join("nope.txt"))
            .unwrap_err();
        assert!(matches!(err, RunupError::NotFound(_)));
    }

    #[test]
    fn test_open_missing_archive() {
        let dir = TempDir::new().unwrap();
        assert!(ArchiveReader::open(&dir.path().join("404")).is_err());
    }
}
