use ahash::AHashMap;
use parking_lot::RwLock;

use super::Substrate;
use crate::error::SubstrateError;

// ---------------------------------------------------------------------------
// MemorySubstrate
// ---------------------------------------------------------------------------

/// An in-process substrate backed by a single `RwLock<AHashMap>`.
///
/// Reads take the shared lock, writes the exclusive one.  An optional quota
/// bounds the total size of stored keys plus records, the way browser storage
/// rejects writes once its origin quota is used up.
#[derive(Debug, Default)]
pub struct MemorySubstrate {
    map: RwLock<AHashMap<String, String>>,
    quota: Option<usize>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A substrate that refuses writes pushing its footprint above `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        MemorySubstrate {
            map: RwLock::new(AHashMap::new()),
            quota: Some(bytes),
        }
    }

    #[inline]
    fn footprint(key: &str, record: &str) -> usize {
        key.len() + record.len()
    }

    /// Total bytes of keys plus records currently stored.
    pub fn used_bytes(&self) -> usize {
        self.map
            .read()
            .iter()
            .map(|(k, v)| Self::footprint(k, v))
            .sum()
    }

    /// Returns `true` if a record is stored under `key`, expired or not.
    pub fn raw_contains(&self, key: &str) -> bool {
        self.map.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Drops every record, as an external storage wipe would.
    pub fn clear(&self) {
        self.map.write().clear();
    }
}

impl Substrate for MemorySubstrate {
    fn raw_get(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn raw_set(&self, key: &str, record: &str) -> Result<(), SubstrateError> {
        let mut map = self.map.write();
        if let Some(quota) = self.quota {
            let replaced = map
                .get(key)
                .map(|old| Self::footprint(key, old))
                .unwrap_or(0);
            let used: usize = map.iter().map(|(k, v)| Self::footprint(k, v)).sum();
            let needed = used - replaced + Self::footprint(key, record);
            if needed > quota {
                return Err(SubstrateError::QuotaExceeded { needed, quota });
            }
        }
        map.insert(key.to_owned(), record.to_owned());
        Ok(())
    }

    fn raw_delete(&self, key: &str) -> Result<(), SubstrateError> {
        self.map.write().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
