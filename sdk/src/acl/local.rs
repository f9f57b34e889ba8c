//! Resolution against a trusted local authorization file.

use {
    super::{normalize_fingerprint, verify_line, AclError},
    crate::fileperm,
    std::{
        fs::File,
        io::{BufRead as _, BufReader, Write},
        path::{Path, PathBuf},
    },
};

/// Tried when the primary authorization file cannot be opened, so lookups
/// keep working while a bundle download is mid-rotation.
pub const ROLLOVER_EXTENSION: &str = ".rollover";

/// A local file of signed authorization records.
#[derive(Debug)]
pub struct AuthorizedFile {
    file: File,
    master: [u8; 32],
}

impl AuthorizedFile {
    /// Open `path` (or its rollover sibling) and permission-check it.
    /// Records will be verified against `master` when searched.
    pub fn open(path: &Path, master: [u8; 32]) -> Result<Self, AclError> {
        let (file, opened_path) = match File::open(path) {
            Ok(file) => (file, path.to_path_buf()),
            Err(_) => {
                let mut rollover = path.as_os_str().to_os_string();
                rollover.push(ROLLOVER_EXTENSION);
                let rollover = PathBuf::from(rollover);
                (File::open(&rollover)?, rollover)
            }
        };
        fileperm::permission_check(&file, &opened_path)?;
        Ok(Self { file, master })
    }

    /// Print the authorized-keys field of every valid record matching
    /// `(host, user, fingerprint)`. Records failing signature verification
    /// or any match rule are skipped silently; zero matches is `NotFound`.
    pub fn find_entry(
        &mut self,
        out: &mut dyn Write,
        host: &str,
        user: &str,
        fingerprint: &str,
    ) -> Result<(), AclError> {
        let fingerprint = normalize_fingerprint(fingerprint);
        let reader = BufReader::new(&self.file);
        let mut found = false;
        for line in reader.lines() {
            let line = line?;
            let Some(entry) = verify_line(&line, &self.master) else {
                continue;
            };
            if !entry.matches(host, user, fingerprint) {
                continue;
            }
            writeln!(out, "{}", entry.authorized_key)?;
            found = true;
        }
        if found {
            Ok(())
        } else {
            Err(AclError::NotFound)
        }
    }
}

/// Open `path` and search it for records matching `(host, user,
/// fingerprint)` in one step.
pub fn find_entry_in_file(
    path: &Path,
    master: [u8; 32],
    out: &mut dyn Write,
    host: &str,
    user: &str,
    fingerprint: &str,
) -> Result<(), AclError> {
    AuthorizedFile::open(path, master)?.find_entry(out, host, user, fingerprint)
}
