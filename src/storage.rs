//! Persisted-state interface. On-disk persistence itself is out of scope
//! (spec.md §1): this module only defines the contract a caller would
//! implement, so entities that want to survive a restart have something to
//! call. No entity calls this automatically.

use crate::error::{EngineError, ErrorKind};

/// Tag carried alongside a persisted blob so a later `fetch` can refuse a
/// mismatched format rather than attempt a migration.
pub type StorageVersion = u16;

pub trait StorageBackend {
    fn store(&mut self, key: &str, version: StorageVersion, bytes: &[u8]) -> Result<(), EngineError>;

    /// Fails with `ErrorKind::Mismatch` if the stored blob's version tag
    /// does not equal `expected_version`. No migration path exists.
    fn fetch(&self, key: &str, expected_version: StorageVersion) -> Result<Vec<u8>, EngineError>;
}

/// In-memory stand-in used by tests; a real deployment would back this with
/// a file or key-value store, which is explicitly out of scope here.
#[derive(Default)]
pub struct MemoryStorage {
    entries: std::collections::HashMap<String, (StorageVersion, Vec<u8>)>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn store(&mut self, key: &str, version: StorageVersion, bytes: &[u8]) -> Result<(), EngineError> {
        self.entries.insert(key.to_string(), (version, bytes.to_vec()));
        Ok(())
    }

    fn fetch(&self, key: &str, expected_version: StorageVersion) -> Result<Vec<u8>, EngineError> {
        let (version, bytes) = self
            .entries
            .get(key)
            .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("no persisted state for {key}")))?;
        if *version != expected_version {
            return Err(EngineError::new(
                ErrorKind::Mismatch,
                format!("storage version mismatch for {key}: have {version}, want {expected_version}"),
            ));
        }
        Ok(bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_mismatch_refused() {
        let mut storage = MemoryStorage::new();
        storage.store("k", 1, b"hello").unwrap();
        assert_eq!(storage.fetch("k", 2).unwrap_err().kind(), ErrorKind::Mismatch);
        assert_eq!(storage.fetch("k", 1).unwrap(), b"hello");
    }
}
