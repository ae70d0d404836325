// Progress reporting for uploads: a `RemoteStore` decorator that drives an
// indicatif bar, plus a pre-scan that sizes the bar.

use std::cell::Cell;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use walkdir::WalkDir;

use crate::error::RemoteError;
use crate::store::{ContainerId, RemoteStore};

/// Count the folders and files below `root` (the root itself excluded).
/// Unreadable entries are ignored here; the upload walk reports them.
pub fn count_entries(root: &Path) -> u64 {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() || e.file_type().is_file())
        .count() as u64
}

/// A bar sized to `total` entries, or a spinner when the total is unknown.
pub fn new_bar(total: Option<u64>) -> ProgressBar {
    match total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}") {
                bar.set_style(style.progress_chars("=> "));
            }
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
                bar.set_style(style);
            }
            bar
        }
    }
}

/// Wraps a store and advances `bar` once per completed operation.
pub struct ProgressStore<S> {
    inner: S,
    bar: ProgressBar,
    completed: Cell<u64>,
}

impl<S: RemoteStore> ProgressStore<S> {
    pub fn new(inner: S, bar: ProgressBar) -> Self {
        ProgressStore {
            inner,
            bar,
            completed: Cell::new(0),
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.get()
    }

    pub fn progress_bar(&self) -> &ProgressBar {
        &self.bar
    }

    fn done(&self) {
        self.completed.set(self.completed.get() + 1);
        self.bar.inc(1);
    }
}

impl<S: RemoteStore> RemoteStore for ProgressStore<S> {
    fn create_container(&self, name: &str, parent: &ContainerId) -> Result<ContainerId, RemoteError> {
        self.bar.set_message(format!("creating folder {name}"));
        let id = self.inner.create_container(name, parent)?;
        self.done();
        Ok(id)
    }

    fn upload_file(&self, path: &Path, parent: &ContainerId) -> Result<(), RemoteError> {
        self.bar.set_message(format!("uploading {}", path.display()));
        self.inner.upload_file(path, parent)?;
        self.done();
        Ok(())
    }
}
