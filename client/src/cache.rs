//! Digest-verified store for scenario resources
//!
//! Entries are keyed by scenario and resource name. Nothing enters the cache
//! unless its content matches the digest the server advertised, so a cache
//! hit always means "this is exactly the file the server wants me to have".
//! When a directory is configured, entries are mirrored to
//! `<root>/<scenario>/<resource>` and survive client restarts.

use log::debug;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("digest mismatch for {resource}: expected {expected}, got {actual}")]
    DigestMismatch {
        resource: String,
        expected: String,
        actual: String,
    },

    #[error("refusing to cache {0:?}: not a plain file name")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Default)]
pub struct ResourceCache {
    root: Option<PathBuf>,
    entries: HashMap<(String, String), Vec<u8>>,
}

impl ResourceCache {
    /// Cache that forgets everything when the client exits
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Cache mirrored under `root`
    ///
    /// The directory is created lazily on the first store; files already
    /// present are picked up by [`ResourceCache::has`].
    pub fn with_dir(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            entries: HashMap::new(),
        }
    }

    /// Returns true if the resource is held with exactly this digest
    ///
    /// Falls back to the on-disk mirror when the entry is not in memory yet.
    pub fn has(&mut self, scenario: &str, resource: &str, digest: &str) -> bool {
        let key = (scenario.to_string(), resource.to_string());
        if let Some(data) = self.entries.get(&key) {
            if shared::digest(data) == digest {
                return true;
            }
        }

        let Some(path) = self.path_for(scenario, resource) else {
            return false;
        };
        match fs::read(&path) {
            Ok(data) if shared::digest(&data) == digest => {
                debug!("Cache hit on disk for {}/{}", scenario, resource);
                self.entries.insert(key, data);
                true
            }
            _ => false,
        }
    }

    /// Stores a resource after checking it against the advertised digest
    pub fn store(
        &mut self,
        scenario: &str,
        resource: &str,
        expected: &str,
        data: Vec<u8>,
    ) -> Result<(), CacheError> {
        if !is_plain_name(scenario) || !is_plain_name(resource) {
            return Err(CacheError::InvalidName(format!("{}/{}", scenario, resource)));
        }

        let actual = shared::digest(&data);
        if actual != expected {
            return Err(CacheError::DigestMismatch {
                resource: resource.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }

        if let Some(path) = self.path_for(scenario, resource) {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &data)?;
        }
        self.entries
            .insert((scenario.to_string(), resource.to_string()), data);
        Ok(())
    }

    pub fn get(&self, scenario: &str, resource: &str) -> Option<&[u8]> {
        self.entries
            .get(&(scenario.to_string(), resource.to_string()))
            .map(Vec::as_slice)
    }

    fn path_for(&self, scenario: &str, resource: &str) -> Option<PathBuf> {
        let root: &Path = self.root.as_deref()?;
        if !is_plain_name(scenario) || !is_plain_name(resource) {
            return None;
        }
        Some(root.join(scenario).join(resource))
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "resource-cache-test-{}-{}",
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_store_and_lookup() {
        let mut cache = ResourceCache::in_memory();
        let digest = shared::digest(b"map data");

        assert!(!cache.has("maze", "map.txt", &digest));
        cache
            .store("maze", "map.txt", &digest, b"map data".to_vec())
            .unwrap();

        assert!(cache.has("maze", "map.txt", &digest));
        assert!(!cache.has("maze", "map.txt", &shared::digest(b"other")));
        assert!(!cache.has("race", "map.txt", &digest));
        assert_eq!(cache.get("maze", "map.txt"), Some(&b"map data"[..]));
    }

    #[test]
    fn test_digest_mismatch_rejected() {
        let mut cache = ResourceCache::in_memory();
        let result = cache.store("maze", "map.txt", &shared::digest(b"expected"), b"tampered".to_vec());

        assert!(matches!(result, Err(CacheError::DigestMismatch { .. })));
        assert!(cache.get("maze", "map.txt").is_none());
    }

    #[test]
    fn test_path_names_rejected() {
        let mut cache = ResourceCache::in_memory();
        let digest = shared::digest(b"x");
        assert!(matches!(
            cache.store("maze", "../x", &digest, b"x".to_vec()),
            Err(CacheError::InvalidName(_))
        ));
    }

    #[test]
    fn test_disk_mirror_survives_restart() {
        let dir = scratch_dir();
        let digest = shared::digest(b"persisted");

        let mut first = ResourceCache::with_dir(&dir);
        first
            .store("maze", "map.txt", &digest, b"persisted".to_vec())
            .unwrap();
        assert!(dir.join("maze").join("map.txt").is_file());

        let mut second = ResourceCache::with_dir(&dir);
        assert!(second.has("maze", "map.txt", &digest));
        assert_eq!(second.get("maze", "map.txt"), Some(&b"persisted"[..]));
    }

    #[test]
    fn test_stale_file_on_disk_is_a_miss() {
        let dir = scratch_dir();
        fs::create_dir_all(dir.join("maze")).unwrap();
        fs::write(dir.join("maze").join("map.txt"), b"old version").unwrap();

        let mut cache = ResourceCache::with_dir(&dir);
        assert!(!cache.has("maze", "map.txt", &shared::digest(b"new version")));
    }
}
