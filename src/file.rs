//! LH5 file handles.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use zarrs::filesystem::FilesystemStore;
use zarrs::storage::ReadableWritableListableStorage;
use zarrs::storage::store::MemoryStore;

use crate::metadata::{GroupMetadata, LH5_VERSION, NodeMetadata};
use crate::storage::Lh5Backend;

/// How to open an LH5 file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    /// Existing file, no writes.
    #[default]
    Read,
    /// Existing file, created if absent.
    ReadWrite,
    /// New file; fails with [`crate::Error::PathExists`] if it exists.
    Create,
    /// New file, replacing any existing one.
    Overwrite,
}

impl FileMode {
    pub fn is_writable(self) -> bool {
        !matches!(self, FileMode::Read)
    }
}

/// An open LH5 file.
///
/// Reads take `&self` and may run concurrently; writes take `&mut self`.
#[derive(Clone)]
pub struct Lh5File {
    backend: Lh5Backend,
    mode: FileMode,
}

impl std::fmt::Debug for Lh5File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lh5File").field("mode", &self.mode).finish()
    }
}

impl Lh5File {
    /// Open the file stored in directory `path`.
    pub fn open(path: impl AsRef<Path>, mode: FileMode) -> crate::Result<Self> {
        let path = path.as_ref();
        let exists = path.exists();
        match mode {
            FileMode::Read if !exists => {
                return Err(crate::Error::NotFound(path.display().to_string()));
            }
            FileMode::Create if exists => {
                return Err(crate::Error::PathExists(path.display().to_string()));
            }
            FileMode::Overwrite if exists => {
                info!("removing existing file {}", path.display());
                std::fs::remove_dir_all(path).map_err(crate::Error::wrap)?;
            }
            _ => {}
        }
        info!("opening {} in {mode:?} mode", path.display());
        let store = FilesystemStore::new(path).map_err(crate::Error::wrap)?;
        Self::from_storage(Arc::new(store), mode)
    }

    /// Use an existing store as an LH5 file.
    ///
    /// [`FileMode::Overwrite`] erases everything in the store;
    /// [`FileMode::Create`] requires it to be empty.
    pub fn from_storage(
        storage: ReadableWritableListableStorage,
        mode: FileMode,
    ) -> crate::Result<Self> {
        let backend = Lh5Backend::new(storage);
        if mode == FileMode::Overwrite {
            backend.erase("")?;
        }
        match backend.get_metadata("")? {
            Some(NodeMetadata::Group(GroupMetadata {
                lh5_version: Some(version),
                ..
            })) => {
                if mode == FileMode::Create {
                    return Err(crate::Error::PathExists("/".into()));
                }
                debug!("found LH5 layout version {version}");
            }
            Some(_) => {
                return Err(crate::Error::general(
                    "store root is not an LH5 file (missing layout version)",
                ));
            }
            None if mode.is_writable() => {
                let root = GroupMetadata {
                    lh5_version: Some(LH5_VERSION.to_owned()),
                    ..Default::default()
                };
                backend.set_metadata("", &root.into())?;
            }
            None => return Err(crate::Error::NotFound("/".into())),
        }
        Ok(Self { backend, mode })
    }

    /// A new, empty, writable file held in memory.
    pub fn in_memory() -> crate::Result<Self> {
        Self::from_storage(Arc::new(MemoryStore::new()), FileMode::Create)
    }

    pub fn backend(&self) -> &Lh5Backend {
        &self.backend
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// Layout version recorded at the root.
    pub fn version(&self) -> crate::Result<String> {
        match self.backend.node_metadata("")? {
            NodeMetadata::Group(GroupMetadata {
                lh5_version: Some(v),
                ..
            }) => Ok(v),
            _ => Err(crate::Error::general("missing layout version")),
        }
    }

    pub(crate) fn check_writable(&self) -> crate::Result<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(crate::Error::general("file is opened read-only"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_root() {
        let f = Lh5File::in_memory().unwrap();
        assert_eq!(f.version().unwrap(), LH5_VERSION);
        assert!(f.mode().is_writable());
    }

    #[test]
    fn test_modes_on_shared_store() {
        let store: ReadableWritableListableStorage = Arc::new(MemoryStore::new());
        assert!(matches!(
            Lh5File::from_storage(store.clone(), FileMode::Read),
            Err(crate::Error::NotFound(_))
        ));
        Lh5File::from_storage(store.clone(), FileMode::Create).unwrap();
        assert!(matches!(
            Lh5File::from_storage(store.clone(), FileMode::Create),
            Err(crate::Error::PathExists(_))
        ));
        let ro = Lh5File::from_storage(store.clone(), FileMode::Read).unwrap();
        assert!(ro.check_writable().is_err());
        Lh5File::from_storage(store, FileMode::Overwrite).unwrap();
    }
}
