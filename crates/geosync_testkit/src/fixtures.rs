//! Filesystem fixtures.

use std::ops::{Deref, DerefMut};

use geosync_cache::CacheStore;
use tempfile::TempDir;

/// A cache store in a temporary directory, cleaned up on drop.
#[derive(Debug)]
pub struct TempStore {
    store: CacheStore,
    _dir: TempDir,
}

impl TempStore {
    /// Creates a fresh store under a new temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp directory");
        let store = CacheStore::open(dir.path()).expect("open cache store");
        Self { store, _dir: dir }
    }

    /// Borrows the underlying store.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TempStore {
    type Target = CacheStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl DerefMut for TempStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.store
    }
}

/// Runs `f` against a store in a temporary directory.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&CacheStore) -> R,
{
    let fixture = TempStore::new();
    f(fixture.store())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_store_opens_and_cleans_up() {
        let root = {
            let fixture = TempStore::new();
            assert!(fixture.root().is_dir());
            fixture.root().to_path_buf()
        };
        assert!(!root.exists());
    }
}
