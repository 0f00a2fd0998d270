//! Resolution of symbol references to library cells.
//!
//! Cells live in a document store as versioned documents addressed by
//! `(namespace, name, version)`. A [`Resolver`] fetches documents through a
//! [`DocumentStore`] and keeps the decoded cells in a cache that is only
//! invalidated explicitly, either per symbol with [`Resolver::invalidate`] or
//! wholesale when the library version token changes
//! ([`Resolver::sync_library_version`]).
#![warn(missing_docs)]

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

use arcstr::ArcStr;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use schir::{Cell, CellRef};
use serde::{Deserialize, Serialize};

pub mod error;
mod store;

pub use error::{Error, Result, StoreError};
pub use store::{DocumentStore, MemStore};

#[cfg(test)]
pub(crate) mod tests;

lazy_static! {
    /// A regex for matching valid namespaces.
    pub static ref NAMESPACE_REGEX: Regex =
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*\.)*[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Returns `true` if the provided string is a valid namespace.
pub fn is_valid_namespace(namespace: &str) -> bool {
    NAMESPACE_REGEX.is_match(namespace)
}

/// An opaque document version.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Version(ArcStr);

impl Version {
    /// Creates a new [`Version`].
    pub fn new(version: impl Into<ArcStr>) -> Self {
        Self(version.into())
    }

    /// The version as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A token identifying a revision of the whole library.
///
/// Any change to the token invalidates everything resolved under the
/// previous token.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct LibraryVersion(ArcStr);

impl LibraryVersion {
    /// Creates a new [`LibraryVersion`].
    pub fn new(token: impl Into<ArcStr>) -> Self {
        Self(token.into())
    }
}

impl Display for LibraryVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity of a resolved cell.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CellKey {
    /// The namespace containing the cell.
    pub namespace: ArcStr,
    /// The symbol name.
    pub name: ArcStr,
    /// The resolved version.
    pub version: Version,
}

impl Display for CellKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.namespace, self.name, self.version)
    }
}

/// A cell returned by a [`Resolver`], along with the key it was resolved to.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The exact document the reference resolved to.
    pub key: CellKey,
    /// The shared, immutable cell.
    pub cell: Arc<Cell>,
}

/// Counters describing resolver cache behavior.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct ResolverStats {
    /// Resolutions served from the cache.
    pub hits: u64,
    /// Documents fetched from the store.
    pub fetches: u64,
    /// Times the whole cache was invalidated.
    pub invalidations: u64,
}

#[derive(Default)]
struct ResolverCache {
    cells: HashMap<CellKey, Arc<Cell>>,
    /// Cached versions of each symbol, in the order they were cached.
    versions: HashMap<(ArcStr, ArcStr), Vec<Version>>,
    library_version: Option<LibraryVersion>,
    stats: ResolverStats,
}

impl ResolverCache {
    fn insert(&mut self, key: CellKey, cell: Arc<Cell>) {
        let versions = self
            .versions
            .entry((key.namespace.clone(), key.name.clone()))
            .or_default();
        if !versions.contains(&key.version) {
            versions.push(key.version.clone());
        }
        self.cells.insert(key, cell);
    }

    fn clear(&mut self) {
        self.cells.clear();
        self.versions.clear();
    }
}

/// Resolves cell references against a [`DocumentStore`].
///
/// Resolved cells are shared: resolving the same reference twice returns
/// the same [`Arc`] without consulting the store again.
pub struct Resolver {
    store: Arc<dyn DocumentStore>,
    cache: Mutex<ResolverCache>,
}

impl Resolver {
    /// Creates a resolver with an empty cache.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(ResolverCache::default()),
        }
    }

    /// Resolves a reference held by an instance.
    pub fn resolve_ref(&self, cell: &CellRef) -> Result<Resolved> {
        self.resolve(
            &cell.namespace,
            &cell.name,
            cell.version.as_ref().map(|v| Version::new(v.clone())).as_ref(),
        )
    }

    /// Resolves `(namespace, name, version)` to a cell.
    ///
    /// When `version` is [`None`], a version already in the cache is
    /// preferred. Several cached versions are ambiguous unless they all share
    /// the same interface, in which case the most recently cached one is used.
    /// With nothing cached, the store must offer exactly one version.
    pub fn resolve(
        &self,
        namespace: &str,
        name: &str,
        version: Option<&Version>,
    ) -> Result<Resolved> {
        if !is_valid_namespace(namespace) {
            return Err(Error::InvalidNamespace(namespace.into()));
        }
        let namespace = ArcStr::from(namespace);
        let name = ArcStr::from(name);

        let mut cache = self.cache.lock().unwrap();
        match version {
            Some(version) => {
                let key = CellKey {
                    namespace,
                    name,
                    version: version.clone(),
                };
                if let Some(cell) = cache.cells.get(&key).cloned() {
                    cache.stats.hits += 1;
                    return Ok(Resolved { key, cell });
                }
                self.fetch(&mut cache, key)
            }
            None => {
                let cached = cache
                    .versions
                    .get(&(namespace.clone(), name.clone()))
                    .cloned()
                    .unwrap_or_default();
                if !cached.is_empty() {
                    let version = self.choose_cached(&cache, &namespace, &name, cached)?;
                    let key = CellKey {
                        namespace,
                        name,
                        version,
                    };
                    let cell = cache.cells[&key].clone();
                    cache.stats.hits += 1;
                    return Ok(Resolved { key, cell });
                }

                let mut offered = self.store.versions(&namespace, &name)?;
                match offered.len() {
                    0 => Err(Error::NotFound {
                        namespace,
                        name,
                        version: None,
                    }),
                    1 => {
                        let version = offered.remove(0);
                        self.fetch(
                            &mut cache,
                            CellKey {
                                namespace,
                                name,
                                version,
                            },
                        )
                    }
                    _ => {
                        offered.sort();
                        tracing::debug!(%namespace, %name, ?offered, "no cached version to disambiguate");
                        Err(Error::AmbiguousVersion {
                            namespace,
                            name,
                            candidates: offered,
                        })
                    }
                }
            }
        }
    }

    fn choose_cached(
        &self,
        cache: &ResolverCache,
        namespace: &ArcStr,
        name: &ArcStr,
        mut cached: Vec<Version>,
    ) -> Result<Version> {
        let cells: Vec<&Arc<Cell>> = cached
            .iter()
            .map(|version| {
                &cache.cells[&CellKey {
                    namespace: namespace.clone(),
                    name: name.clone(),
                    version: version.clone(),
                }]
            })
            .collect();
        let compatible = match cells.last() {
            Some(newest) => cells.iter().all(|c| c.same_interface(newest)),
            None => false,
        };
        if compatible {
            if let Some(newest) = cached.pop() {
                return Ok(newest);
            }
        }
        cached.sort();
        Err(Error::AmbiguousVersion {
            namespace: namespace.clone(),
            name: name.clone(),
            candidates: cached,
        })
    }

    fn fetch(&self, cache: &mut ResolverCache, key: CellKey) -> Result<Resolved> {
        let cell = self
            .store
            .fetch(&key.namespace, &key.name, &key.version)?
            .ok_or_else(|| Error::NotFound {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
                version: Some(key.version.clone()),
            })?;
        cache.stats.fetches += 1;
        tracing::debug!(cell = %key, "fetched cell document");
        let cell = Arc::new(cell);
        cache.insert(key.clone(), cell.clone());
        Ok(Resolved { key, cell })
    }

    /// Drops every cached version of a symbol.
    pub fn invalidate(&self, namespace: &str, name: &str) {
        let mut cache = self.cache.lock().unwrap();
        let Some(versions) = cache
            .versions
            .remove(&(ArcStr::from(namespace), ArcStr::from(name)))
        else {
            return;
        };
        for version in versions {
            cache.cells.remove(&CellKey {
                namespace: namespace.into(),
                name: name.into(),
                version,
            });
        }
    }

    /// Drops every cached cell.
    pub fn invalidate_all(&self) {
        let mut cache = self.cache.lock().unwrap();
        cache.clear();
        cache.stats.invalidations += 1;
    }

    /// Records the current library version.
    ///
    /// If the token differs from the one previously recorded, the cache is
    /// cleared and `true` is returned.
    pub fn sync_library_version(&self, version: &LibraryVersion) -> bool {
        let mut cache = self.cache.lock().unwrap();
        match cache.library_version.replace(version.clone()) {
            Some(previous) if &previous != version => {
                tracing::info!(from = %previous, to = %version, "library version changed, invalidating resolved cells");
                cache.clear();
                cache.stats.invalidations += 1;
                true
            }
            _ => false,
        }
    }

    /// The library version the cache currently reflects.
    pub fn library_version(&self) -> Option<LibraryVersion> {
        self.cache.lock().unwrap().library_version.clone()
    }

    /// Cache statistics.
    pub fn stats(&self) -> ResolverStats {
        self.cache.lock().unwrap().stats
    }

    /// Every cell currently cached, keyed by identity.
    pub fn cached(&self) -> IndexMap<CellKey, Arc<Cell>> {
        let cache = self.cache.lock().unwrap();
        let mut out: IndexMap<CellKey, Arc<Cell>> = cache
            .cells
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        out.sort_by(|a, _, b, _| a.to_string().cmp(&b.to_string()));
        out
    }
}
