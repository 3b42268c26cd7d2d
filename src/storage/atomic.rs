//! Temp-file-then-rename writes.

use crate::{Error, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static STAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A file staged next to its final path.
///
/// Writes go to `<target>.<pid>.<n>.tmp` in the same directory, unique per
/// guard, so concurrent writers to one target never share a staging file. [`StagedFile::commit`]
/// syncs and renames it over the target; dropping an uncommitted guard
/// removes the temporary file, so a failed write never leaves a partial file
/// at either path.
#[derive(Debug)]
pub struct StagedFile {
    file: Option<File>,
    temp_path: PathBuf,
    target: PathBuf,
}

impl StagedFile {
    /// Creates the temporary file, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn create(target: &Path) -> Result<Self> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::op("create_dir", e))?;
        }

        let mut name = target.file_name().unwrap_or_default().to_os_string();
        let n = STAGE_COUNTER.fetch_add(1, Ordering::Relaxed);
        name.push(format!(".{}.{n}.tmp", std::process::id()));
        let temp_path = target.with_file_name(name);

        let file = File::options()
            .write(true)
            .create_new(true)
            .open(&temp_path).map_err(|e| Error::op("create_temp_file", e))?;
        Ok(Self {
            file: Some(file),
            temp_path,
            target: target.to_path_buf(),
        })
    }

    /// Mutable handle to the temporary file.
    ///
    /// # Errors
    ///
    /// Returns an error if the guard was already committed.
    pub fn file_mut(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| Error::op("staged_write", "file already committed"))
    }

    /// Path of the temporary file.
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Flushes the temporary file and renames it onto the target.
    ///
    /// # Errors
    ///
    /// Returns an error if syncing or renaming fails; the temporary file is
    /// removed in that case.
    pub fn commit(mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all().map_err(|e| Error::op("sync_temp_file", e))?;
        }
        fs::rename(&self.temp_path, &self.target).map_err(|e| Error::op("rename_temp_file", e))?;
        self.temp_path = PathBuf::new();
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        self.file.take();
        if self.temp_path.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = fs::remove_file(&self.temp_path) {
            tracing::debug!(path = %self.temp_path.display(), error = %e, "Temp file cleanup skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_commit_replaces_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.json");
        fs::write(&target, "old").unwrap();

        let mut staged = StagedFile::create(&target).unwrap();
        staged.file_mut().unwrap().write_all(b"new").unwrap();
        let temp = staged.temp_path().to_path_buf();
        staged.commit().unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        assert!(!temp.exists());
    }

    #[test]
    fn test_drop_without_commit_cleans_up() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.json");
        fs::write(&target, "old").unwrap();

        let temp = {
            let mut staged = StagedFile::create(&target).unwrap();
            staged.file_mut().unwrap().write_all(b"partial").unwrap();
            staged.temp_path().to_path_buf()
        };

        assert!(!temp.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
    }

    #[test]
    fn test_concurrent_guards_use_distinct_paths() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("tweets.parquet");

        let mut first = StagedFile::create(&target).unwrap();
        let mut second = StagedFile::create(&target).unwrap();
        assert_ne!(first.temp_path(), second.temp_path());

        first.file_mut().unwrap().write_all(b"first").unwrap();
        second.file_mut().unwrap().write_all(b"second").unwrap();
        first.commit().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "first");
        second.commit().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "second");

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_creates_missing_parent() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/deeper/out.csv");
        let staged = StagedFile::create(&target).unwrap();
        staged.commit().unwrap();
        assert!(target.exists());
    }
}
