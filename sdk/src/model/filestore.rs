//! Writing the generated record files.

use {
    super::{cleaner, persist::PersistError},
    std::{
        collections::{BTreeMap, BTreeSet},
        fs::{DirBuilder, OpenOptions},
        io::Write as _,
        os::unix::fs::{DirBuilderExt as _, OpenOptionsExt as _},
        path::{Path, PathBuf},
    },
};

/// Target files and the record lines they will hold.
pub(super) type FileData = BTreeMap<PathBuf, Vec<String>>;

/// Write every target file (parents 0700, file 0600, truncating). All writes
/// are attempted; the first error is reported after the pass so a single bad
/// path cannot hold back the rest of the tree.
pub(super) fn store(data: &FileData) -> (BTreeSet<PathBuf>, Result<(), PersistError>) {
    let mut written = BTreeSet::new();
    let mut result = Ok(());
    for (path, lines) in data {
        if let Err(e) = write_record_file(path, lines) {
            if result.is_ok() {
                result = Err(PersistError::Io(e));
            }
            continue;
        }
        written.insert(path.clone());
    }
    (written, result)
}

fn write_record_file(path: &Path, lines: &[String]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.is_dir() {
            DirBuilder::new().recursive(true).mode(0o700).create(parent)?;
        }
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(lines.join("\n").as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Remove everything under the sub-roots that this run did not write, then
/// prune emptied directories.
pub(super) fn cleanup(
    base: &Path,
    written: &BTreeSet<PathBuf>,
    sub_roots: &[PathBuf],
) -> Result<(), PersistError> {
    cleaner::clean_fs_tree(base, |path| !written.contains(path), sub_roots)
}
