//! Removal of stale record files.
//!
//! After a compile run, any file under the managed sub-roots that was not
//! written by that run is removed, followed by its now-empty ancestor
//! directories. A producer thread walks the tree and feeds entries to the
//! consumer over a bounded channel; the walk always runs to completion.

use {
    super::persist::PersistError,
    std::{
        fs,
        io,
        path::{Component, Path, PathBuf},
        sync::mpsc::{sync_channel, SyncSender},
        thread,
    },
};

// Never clean a base this close to the filesystem root.
const MINIMUM_PATH_DEPTH: usize = 2;
const CHANNEL_CAPACITY: usize = 10;

struct FsEntry {
    path: PathBuf,
}

/// Walk `sub_roots` and remove every file for which `remove` returns true,
/// pruning emptied directories up to (but never including) `base`.
pub(super) fn clean_fs_tree(
    base: &Path,
    remove: impl Fn(&Path) -> bool,
    sub_roots: &[PathBuf],
) -> Result<(), PersistError> {
    let depth = base
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    if depth < MINIMUM_PATH_DEPTH {
        return Err(PersistError::ShortPath);
    }

    let (tx, rx) = sync_channel(CHANNEL_CAPACITY);
    thread::scope(|scope| {
        scope.spawn(move || {
            for root in sub_roots {
                walk(&tx, root);
            }
        });

        let mut result = Ok(());
        for entry in rx {
            // After the first failure keep draining, but stop removing.
            if result.is_err() || !remove(&entry.path) {
                continue;
            }
            if let Err(e) = recursive_remove(base, &entry.path) {
                result = Err(PersistError::Io(e));
            }
        }
        result
    })
}

/// Send all files below `dir`; directories with no entries at all are sent
/// themselves so they get pruned.
fn walk(tx: &SyncSender<FsEntry>, dir: &Path) {
    let Ok(meta) = fs::metadata(dir) else {
        return;
    };
    if !meta.is_dir() {
        let _ = tx.send(FsEntry {
            path: dir.to_path_buf(),
        });
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut has_entries = false;
    for entry in entries.flatten() {
        has_entries = true;
        let path = entry.path();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            walk(tx, &path);
        } else {
            let _ = tx.send(FsEntry { path });
        }
    }
    if !has_entries {
        let _ = tx.send(FsEntry {
            path: dir.to_path_buf(),
        });
    }
}

/// Remove `target`, then walk upward removing each ancestor that is now
/// empty, stopping at `base` or the first non-empty directory.
fn recursive_remove(base: &Path, target: &Path) -> io::Result<()> {
    let mut target = target.to_path_buf();
    loop {
        if target == base || !target.starts_with(base) {
            return Ok(());
        }
        let meta = match fs::symlink_metadata(&target) {
            Ok(meta) => meta,
            // A sibling's ancestor walk may have gotten here first.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        if meta.is_dir() {
            if fs::read_dir(&target)?.next().is_some() {
                return Ok(());
            }
            fs::remove_dir(&target)?;
        } else {
            fs::remove_file(&target)?;
        }
        let Some(parent) = target.parent() else {
            return Ok(());
        };
        target = parent.to_path_buf();
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        assert_matches::assert_matches,
        std::collections::BTreeSet,
        tempfile::TempDir,
    };

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, b"x").expect("write");
    }

    #[test]
    fn removes_unkept_files_and_empty_dirs() {
        let dir = TempDir::new().expect("tempdir");
        let base = dir.path();
        let keep_path = base.join("key/fp1/alpha/root");
        let stale_path = base.join("key/fp2/beta/admin");
        let host_path = base.join("host/alpha.node.com");
        touch(&keep_path);
        touch(&stale_path);
        touch(&host_path);

        let keep: BTreeSet<PathBuf> = [keep_path.clone(), host_path.clone()].into();
        clean_fs_tree(
            base,
            |p| !keep.contains(p),
            &[base.join("key"), base.join("host")],
        )
        .expect("clean");

        assert!(keep_path.exists());
        assert!(host_path.exists());
        assert!(!stale_path.exists());
        // The emptied fp2 branch is pruned entirely.
        assert!(!base.join("key/fp2").exists());
        // Shared ancestors of kept files survive.
        assert!(base.join("key/fp1/alpha").exists());
        assert!(base.exists());
    }

    #[test]
    fn prunes_preexisting_empty_directories() {
        let dir = TempDir::new().expect("tempdir");
        let base = dir.path();
        fs::create_dir_all(base.join("key/fp1/gone")).expect("mkdir");
        clean_fs_tree(base, |_| true, &[base.join("key")]).expect("clean");
        assert!(!base.join("key").exists());
        assert!(base.exists());
    }

    #[test]
    fn refuses_short_base_path() {
        assert_matches!(
            clean_fs_tree(Path::new("/tmp"), |_| true, &[PathBuf::from("/tmp/key")]),
            Err(PersistError::ShortPath)
        );
    }

    #[test]
    fn missing_roots_are_fine() {
        let dir = TempDir::new().expect("tempdir");
        let base = dir.path();
        clean_fs_tree(base, |_| true, &[base.join("key"), base.join("host")])
            .expect("clean");
    }
}
