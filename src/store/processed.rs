//! File-backed set of message ids that have already been handled.
//!
//! The on-disk format is a single JSON array of id strings, rewritten
//! wholesale on every flush. A missing file means "nothing processed yet".

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::StorageError;

/// Persisted set of processed message ids.
///
/// Owned by the pipeline task, which is its only writer.
#[derive(Debug, Clone)]
pub struct ProcessedStore {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl ProcessedStore {
    /// Load the store from `path`.
    ///
    /// Never fails: an absent file yields an empty set, and an unreadable or
    /// corrupt file is logged and also yields an empty set.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match read_ids(&path) {
            Ok(ids) => {
                debug!(path = %path.display(), count = ids.len(), "Loaded processed ids");
                ids
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not load processed ids, starting empty");
                BTreeSet::new()
            }
        };
        Self { path, ids }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Insert an id. Returns `false` if it was already present.
    pub fn add(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Persist the full set, replacing whatever the file held before.
    ///
    /// Writes to a sibling temp file and renames it over the target so a
    /// crash mid-write never leaves a truncated array behind.
    pub fn flush(&self) -> Result<(), StorageError> {
        let json = serde_json::to_vec(&self.ids)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), count = self.ids.len(), "Flushed processed ids");
        Ok(())
    }
}

fn read_ids(path: &Path) -> Result<BTreeSet<String>, StorageError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(source) => {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let ids: Vec<String> = serde_json::from_slice(&bytes)?;
    Ok(ids.into_iter().collect())
}
