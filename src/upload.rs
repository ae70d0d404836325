// Tree uploader: replicates a local directory tree under a remote folder.
//
// The walk is a depth-first, parent-first `walkdir` traversal. Within one
// directory the files come first, then the subdirectories, each group in
// name order. A directory's remote folder is created when the walker yields
// the directory, which is before any of its contents, so the parent's id is
// always in the `FolderMap` when a child is handled. The first failure
// aborts the walk; nothing is rolled back.
//
// Runs are not idempotent: existing remote content is never inspected, so
// uploading the same root twice produces two independent copies.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::Path;

use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::UploadError;
use crate::folder_map::FolderMap;
use crate::store::{ContainerId, RemoteStore};

const TRACING_TARGET: &str = "gdrive_upload_helper::upload";

/// Counters for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub folders_created: usize,
    pub files_uploaded: usize,
    pub bytes_uploaded: u64,
}

/// Upload everything below `local_root` into the existing remote folder
/// `remote_root`. The root itself is not created remotely; its contents are.
pub fn upload_tree<S>(
    local_root: &Path,
    remote_root: &ContainerId,
    store: &S,
) -> Result<UploadSummary, UploadError>
where
    S: RemoteStore + ?Sized,
{
    let meta = fs::metadata(local_root).map_err(|source| UploadError::Traversal {
        path: local_root.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(UploadError::NotADirectory {
            path: local_root.to_path_buf(),
        });
    }

    info!(
        target: TRACING_TARGET,
        root = %local_root.display(),
        folder_id = %remote_root,
        "starting tree upload"
    );

    let mut folders = FolderMap::new(local_root, remote_root.clone());
    let mut summary = UploadSummary::default();

    let walker = WalkDir::new(local_root)
        .min_depth(1)
        .follow_links(true)
        .sort_by(files_first);

    for entry in walker {
        let entry = entry.map_err(|err| walk_error(err, local_root))?;
        let path = entry.path();
        let parent_id = bound_parent(&folders, path)?.clone();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            let name = entry.file_name().to_string_lossy();
            let id = store
                .create_container(&name, &parent_id)
                .map_err(|source| UploadError::Remote {
                    path: path.to_path_buf(),
                    source,
                })?;
            info!(target: TRACING_TARGET, dir = %path.display(), folder_id = %id, "created folder");

            folders
                .bind(path.to_path_buf(), id)
                .map_err(|existing| UploadError::Traversal {
                    path: path.to_path_buf(),
                    source: io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("directory already bound to folder {existing}"),
                    ),
                })?;
            summary.folders_created += 1;
        } else if file_type.is_file() {
            let len = entry
                .metadata()
                .map_err(|err| walk_error(err, local_root))?
                .len();
            store
                .upload_file(path, &parent_id)
                .map_err(|source| UploadError::Remote {
                    path: path.to_path_buf(),
                    source,
                })?;
            info!(target: TRACING_TARGET, file = %path.display(), bytes = len, "uploaded file");
            summary.files_uploaded += 1;
            summary.bytes_uploaded += len;
        } else {
            warn!(target: TRACING_TARGET, path = %path.display(), "skipping special file");
        }
    }

    info!(
        target: TRACING_TARGET,
        folders = summary.folders_created,
        files = summary.files_uploaded,
        bytes = summary.bytes_uploaded,
        "tree upload finished"
    );
    Ok(summary)
}

/// Files before directories, then by name. Symlinks sort by their own
/// type, not their target's.
fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

/// The folder id of the directory holding `path`.
fn bound_parent<'a>(folders: &'a FolderMap, path: &Path) -> Result<&'a ContainerId, UploadError> {
    path.parent()
        .and_then(|parent| folders.get(parent))
        .ok_or_else(|| UploadError::Traversal {
            path: path.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::NotFound,
                "parent directory has no remote folder",
            ),
        })
}

fn walk_error(err: walkdir::Error, root: &Path) -> UploadError {
    let path = err.path().unwrap_or(root).to_path_buf();
    if err.loop_ancestor().is_some() {
        return UploadError::SymlinkLoop { path };
    }
    let message = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message));
    UploadError::Traversal { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_sort_before_directories() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("alpha")).unwrap();
        fs::create_dir(tmp.path().join("zeta")).unwrap();
        fs::write(tmp.path().join("b.txt"), b"bb").unwrap();
        fs::write(tmp.path().join("z.txt"), b"z").unwrap();

        let names: Vec<String> = WalkDir::new(tmp.path())
            .min_depth(1)
            .max_depth(1)
            .sort_by(files_first)
            .into_iter()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["b.txt", "z.txt", "alpha", "zeta"]);
    }

    #[test]
    fn unbound_parent_is_an_error_not_a_panic() {
        let folders = FolderMap::new("/data", ContainerId::new("root"));
        assert_eq!(
            bound_parent(&folders, Path::new("/data/a.txt")).unwrap(),
            &ContainerId::new("root")
        );

        let err = bound_parent(&folders, Path::new("/elsewhere/b.txt")).unwrap_err();
        assert!(err.is_traversal());
    }

    #[test]
    fn missing_entries_become_traversal_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let err = WalkDir::new(tmp.path().join("nope"))
            .into_iter()
            .next()
            .unwrap()
            .unwrap_err();
        match walk_error(err, tmp.path()) {
            UploadError::Traversal { path, source } => {
                assert_eq!(path, tmp.path().join("nope"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
