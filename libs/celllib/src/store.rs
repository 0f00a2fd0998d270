//! Document store seam.

use std::collections::HashMap;
use std::sync::RwLock;

use arcstr::ArcStr;
use indexmap::IndexMap;
use schir::Cell;

use crate::error::StoreError;
use crate::Version;

/// A source of versioned cell documents.
///
/// Implementations decode documents into [`Cell`]s. They are called with
/// the resolver's cache lock held and must not call back into the resolver.
pub trait DocumentStore: Send + Sync {
    /// The versions available for a symbol.
    fn versions(&self, namespace: &str, name: &str) -> Result<Vec<Version>, StoreError>;

    /// Fetches one version of a symbol, or [`None`] if it does not exist.
    fn fetch(
        &self,
        namespace: &str,
        name: &str,
        version: &Version,
    ) -> Result<Option<Cell>, StoreError>;
}

/// An in-memory document store.
#[derive(Debug, Default)]
pub struct MemStore {
    documents: RwLock<HashMap<(ArcStr, ArcStr), IndexMap<Version, Cell>>>,
}

impl MemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a document.
    pub fn insert(&self, namespace: impl Into<ArcStr>, version: impl Into<Version>, cell: Cell) {
        let key = (namespace.into(), cell.name().clone());
        self.documents
            .write()
            .unwrap()
            .entry(key)
            .or_default()
            .insert(version.into(), cell);
    }

    /// Removes one version of a document.
    pub fn remove(&self, namespace: &str, name: &str, version: &Version) -> Option<Cell> {
        self.documents
            .write()
            .unwrap()
            .get_mut(&(ArcStr::from(namespace), ArcStr::from(name)))
            .and_then(|versions| versions.shift_remove(version))
    }
}

impl DocumentStore for MemStore {
    fn versions(&self, namespace: &str, name: &str) -> Result<Vec<Version>, StoreError> {
        Ok(self
            .documents
            .read()
            .unwrap()
            .get(&(ArcStr::from(namespace), ArcStr::from(name)))
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn fetch(
        &self,
        namespace: &str,
        name: &str,
        version: &Version,
    ) -> Result<Option<Cell>, StoreError> {
        Ok(self
            .documents
            .read()
            .unwrap()
            .get(&(ArcStr::from(namespace), ArcStr::from(name)))
            .and_then(|versions| versions.get(version).cloned()))
    }
}
