//! Backup management for rebuilt archives.
//!
//! Before a repack overwrites an archive, the existing file is moved aside to
//! `<name>.bak`. The first backup is the pristine original, so it is never
//! replaced by later repacks.

use std::fs;
use std::path::{Path, PathBuf};

use crate::Result;

/// Get the backup path for an archive
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Determine if an existing file should be moved to its backup path
///
/// Returns true only if the file exists and no backup exists yet.
pub fn should_create_backup(path: &Path, backup: &Path) -> bool {
    path.is_file() && !backup.exists()
}

/// Move the file to its backup path
pub fn create_backup(path: &Path, backup: &Path) -> Result<()> {
    fs::rename(path, backup)?;
    tracing::info!(from = %path.display(), to = %backup.display(), "Created backup");
    Ok(())
}

/// Back up `path` if needed before it is overwritten
///
/// Returns the backup path if a new backup was created.
pub fn backup_before_write(path: &Path) -> Result<Option<PathBuf>> {
    let backup = backup_path(path);
    if should_create_backup(path, &backup) {
        create_backup(path, &backup)?;
        Ok(Some(backup))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/tmp/c0000.anibnd.dcx")),
            PathBuf::from("/tmp/c0000.anibnd.dcx.bak")
        );
    }

    #[test]
    fn test_no_file_no_backup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a.bnd");

        assert_eq!(backup_before_write(&path).unwrap(), None);
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_first_backup_is_kept() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a.bnd");

        fs::write(&path, b"original").unwrap();
        let created = backup_before_write(&path).unwrap();
        assert_eq!(created, Some(backup_path(&path)));
        assert!(!path.exists());

        // A later repack must not replace the pristine backup
        fs::write(&path, b"first repack").unwrap();
        assert_eq!(backup_before_write(&path).unwrap(), None);
        assert_eq!(fs::read(backup_path(&path)).unwrap(), b"original");
        assert_eq!(fs::read(&path).unwrap(), b"first repack");
    }
}
