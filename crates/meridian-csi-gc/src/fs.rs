//! Filesystem access for the garbage collector

use std::io;
use std::path::Path;

/// Directory operations the collector needs
pub trait Filesystem: Send + Sync {
    /// Names of the entries in a directory
    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Remove a file or directory tree; a missing path is not an error
    fn remove_all(&self, path: &Path) -> io::Result<()>;

    /// Create a directory and its parents
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// [`Filesystem`] on the host's disk
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect()
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let result = match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
            Ok(_) => std::fs::remove_file(path),
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}
