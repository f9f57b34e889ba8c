//! Permission checks on trusted files.
//!
//! Private keys, agent configuration and the local authorization file are
//! only read after asserting that nobody but the owner could have tampered
//! with them. The check operates on an already-open descriptor plus its
//! path, so open-by-absolute-path precedes the check.

use {
    std::{
        fs::{self, File},
        io,
        os::unix::fs::MetadataExt as _,
        path::Path,
    },
    thiserror::Error,
};

/// Errors raised by [`permission_check`]. The variants are distinct so
/// misconfigurations are diagnosable from the message alone.
#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("other than user can write")]
    Writeable,
    #[error("not a regular file")]
    Irregular,
    #[error("not owned by root or process")]
    Owner,
    #[error(transparent)]
    Io(#[from] io::Error),
}

const GROUP_OTHER_WRITE: u32 = 0o022;

/// Verify that an open file is a regular file, not writeable by group or
/// other, owned by root or the effective uid, and not reached through a
/// symlink.
pub fn permission_check(file: &File, path: &Path) -> Result<(), PermissionError> {
    let meta = file.metadata()?;
    if meta.mode() & GROUP_OTHER_WRITE != 0 {
        return Err(PermissionError::Writeable);
    }
    if !meta.is_file() {
        return Err(PermissionError::Irregular);
    }
    let euid = unsafe { libc::geteuid() };
    if meta.uid() != 0 && meta.uid() != euid {
        return Err(PermissionError::Owner);
    }
    if fs::symlink_metadata(path)?.file_type().is_symlink() {
        return Err(PermissionError::Irregular);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        assert_matches::assert_matches,
        std::os::unix::fs::{symlink, PermissionsExt as _},
        tempfile::TempDir,
    };

    fn create(dir: &TempDir, name: &str, mode: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, b"payload").expect("write test file");
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod");
        path
    }

    #[test]
    fn accepts_own_private_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = create(&dir, "key", 0o600);
        let file = File::open(&path).expect("open");
        assert_matches!(permission_check(&file, &path), Ok(()));
    }

    #[test]
    fn rejects_group_writeable() {
        let dir = TempDir::new().expect("tempdir");
        let path = create(&dir, "key", 0o620);
        let file = File::open(&path).expect("open");
        assert_matches!(
            permission_check(&file, &path),
            Err(PermissionError::Writeable)
        );
    }

    #[test]
    fn rejects_other_writeable() {
        let dir = TempDir::new().expect("tempdir");
        let path = create(&dir, "key", 0o602);
        let file = File::open(&path).expect("open");
        assert_matches!(
            permission_check(&file, &path),
            Err(PermissionError::Writeable)
        );
    }

    #[test]
    fn rejects_directory() {
        let dir = TempDir::new().expect("tempdir");
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).expect("chmod");
        let file = File::open(dir.path()).expect("open dir");
        assert_matches!(
            permission_check(&file, dir.path()),
            Err(PermissionError::Irregular)
        );
    }

    #[test]
    fn rejects_symlink() {
        let dir = TempDir::new().expect("tempdir");
        let target = create(&dir, "target", 0o600);
        let link = dir.path().join("link");
        symlink(&target, &link).expect("symlink");
        let file = File::open(&link).expect("open through link");
        assert_matches!(
            permission_check(&file, &link),
            Err(PermissionError::Irregular)
        );
    }
}
