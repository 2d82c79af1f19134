//! Removal goes through a trash directory: renaming within the storage root
//! is atomic and cheap, and the actual deletes happen off the caller's path.
//! Stale trash left by a previous process is purged when the store opens.

use log::warn;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub const TRASH_DIR: &str = ".trash";

static TRASH_SEQ: AtomicU64 = AtomicU64::new(0);

pub fn trash_dir(root: &Path) -> PathBuf {
    root.join(TRASH_DIR)
}

/// Move the data file at `path` into the trash. Falls back to a direct
/// delete when the rename fails.
///
/// # Errors
/// Returns an error when neither the rename nor the fallback delete worked;
/// `NotFound` means the file was already gone.
pub fn trash_file(root: &Path, path: &Path) -> io::Result<()> {
    let dir = trash_dir(root);
    fs::create_dir_all(&dir)?;
    let seq = TRASH_SEQ.fetch_add(1, Ordering::Relaxed);
    let name = path.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    let dest = dir.join(format!("{seq}_{name}"));
    match fs::rename(path, &dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
        Err(_) => fs::remove_file(path),
    }
}

/// Delete everything currently in the trash. Failures are logged and the
/// leftovers retried on the next purge.
pub fn purge(root: &Path) {
    let dir = trash_dir(root);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        if let Err(e) = fs::remove_file(entry.path()) {
            warn!("trash purge failed for {}: {e}", entry.path().display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trash_then_purge_removes_file() {
        let root = tempfile::tempdir().expect("tempdir");
        let file = root.path().join("victim.bin");
        fs::write(&file, b"bytes").expect("write");

        trash_file(root.path(), &file).expect("trash");
        assert!(!file.exists());
        assert_eq!(fs::read_dir(trash_dir(root.path())).expect("dir").count(), 1);

        purge(root.path());
        assert_eq!(fs::read_dir(trash_dir(root.path())).expect("dir").count(), 0);
    }

    #[test]
    fn trashing_a_missing_file_reports_not_found() {
        let root = tempfile::tempdir().expect("tempdir");
        let err = trash_file(root.path(), &root.path().join("absent.bin")).expect_err("missing");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn purge_tolerates_a_missing_trash_dir() {
        let root = tempfile::tempdir().expect("tempdir");
        purge(root.path());
    }
}
