// Remote store capability consumed by the tree uploader. The Drive client in
// `api` is the production implementation; tests plug in an in-memory one.

use std::fmt;
use std::path::Path;

use crate::error::RemoteError;

/// Opaque identifier of a remote folder, as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        ContainerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A hierarchical remote store. Both calls block until the remote side has
/// answered.
pub trait RemoteStore {
    /// Create a new folder named `name` under `parent` and return its id.
    /// Must never reuse an existing folder of the same name.
    fn create_container(&self, name: &str, parent: &ContainerId) -> Result<ContainerId, RemoteError>;

    /// Copy the whole content of `path` into a new object under `parent`,
    /// named after the file's base name.
    fn upload_file(&self, path: &Path, parent: &ContainerId) -> Result<(), RemoteError>;
}

impl<S: RemoteStore + ?Sized> RemoteStore for &S {
    fn create_container(&self, name: &str, parent: &ContainerId) -> Result<ContainerId, RemoteError> {
        (**self).create_container(name, parent)
    }

    fn upload_file(&self, path: &Path, parent: &ContainerId) -> Result<(), RemoteError> {
        (**self).upload_file(path, parent)
    }
}
