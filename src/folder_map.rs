use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::store::ContainerId;

/// Local directory -> remote folder id bindings for a single upload run.
///
/// The root is bound at construction to the caller's destination folder.
/// Every other directory is bound exactly once, right after its folder was
/// created, and the map is dropped when the run ends.
#[derive(Debug)]
pub struct FolderMap {
    bindings: HashMap<PathBuf, ContainerId>,
}

impl FolderMap {
    pub fn new(root: impl Into<PathBuf>, root_id: ContainerId) -> Self {
        let mut bindings = HashMap::new();
        bindings.insert(root.into(), root_id);
        FolderMap { bindings }
    }

    /// Bind `dir` to `id`. A directory that is already bound keeps its
    /// first id and the existing binding is returned as the error.
    pub fn bind(&mut self, dir: impl Into<PathBuf>, id: ContainerId) -> Result<(), ContainerId> {
        use std::collections::hash_map::Entry;

        match self.bindings.entry(dir.into()) {
            Entry::Occupied(existing) => Err(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    pub fn get(&self, dir: &Path) -> Option<&ContainerId> {
        self.bindings.get(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_pre_bound() {
        let map = FolderMap::new("/data", ContainerId::new("root"));
        assert_eq!(map.get(Path::new("/data")), Some(&ContainerId::new("root")));
    }

    #[test]
    fn second_binding_is_rejected() {
        let mut map = FolderMap::new("/data", ContainerId::new("root"));
        map.bind("/data/sub", ContainerId::new("a")).unwrap();

        let err = map.bind("/data/sub", ContainerId::new("b")).unwrap_err();
        assert_eq!(err, ContainerId::new("a"));
        assert_eq!(map.get(Path::new("/data/sub")), Some(&ContainerId::new("a")));
    }

    #[test]
    fn unknown_directory_is_unbound() {
        let map = FolderMap::new("/data", ContainerId::new("root"));
        assert!(map.get(Path::new("/data/other")).is_none());
    }
}
