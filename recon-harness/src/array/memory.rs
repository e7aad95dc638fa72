//! In-memory array reader.

use super::{ArrayReader, LabeledArray, ReadMode};
use crate::errors::HarnessError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// An array reader backed by a path-to-array map.
///
/// Stands in for the file-format reader when the external pipeline is
/// faked, so suites can be exercised without the real tool.
#[derive(Debug, Default)]
pub struct MemoryArrayReader {
    arrays: RwLock<HashMap<PathBuf, LabeledArray>>,
}

impl MemoryArrayReader {
    /// Creates an empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an array under a path, replacing any previous one.
    pub fn insert(&self, path: impl Into<PathBuf>, array: LabeledArray) {
        self.arrays.write().insert(path.into(), array);
    }

    /// Removes the array stored under a path.
    pub fn remove(&self, path: &Path) -> Option<LabeledArray> {
        self.arrays.write().remove(path)
    }

    /// Returns true if an array is stored under the path.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.arrays.read().contains_key(path)
    }

    /// Returns the number of stored arrays.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arrays.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arrays.read().is_empty()
    }
}

impl ArrayReader for MemoryArrayReader {
    fn read(&self, path: &Path, mode: ReadMode) -> Result<LabeledArray, HarnessError> {
        let array = self
            .arrays
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| HarnessError::missing_file("", path))?;

        Ok(match mode {
            ReadMode::Header => array.without_values(),
            ReadMode::WithValues => array,
        })
    }
}
