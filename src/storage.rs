//! Local key-value storage: `LocalRecord` and the `Storage` map (spec.md
//! §3, §4.5), grounded on `server/chord/storage.py`.

use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, info};

#[derive(Clone, Debug, Default)]
pub struct LocalRecord {
    pub value: Vec<u8>,
    pub version: i64,
    pub live: bool,
}

impl LocalRecord {
    pub fn is_empty(&self) -> bool {
        self.value.is_empty() && self.version == 0 && !self.live
    }
}

/// `storage_lock`-guarded `key -> LocalRecord` map (spec.md §5).
pub struct Storage {
    inner: Mutex<HashMap<String, LocalRecord>>,
}

impl Default for Storage {
    fn default() -> Self {
        Storage {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> LocalRecord {
        let guard = self.inner.lock().unwrap();
        guard.get(key).cloned().unwrap_or_default()
    }

    pub fn put(&self, key: &str, value: Vec<u8>, version: i64) {
        let mut guard = self.inner.lock().unwrap();
        guard.insert(
            key.to_string(),
            LocalRecord {
                value,
                version,
                live: true,
            },
        );
        debug!("stored key {} at version {}", key, version);
    }

    /// Marks `key` as a tombstone at `version`. Keeps the prior value
    /// bytes around for nothing — spec.md only requires the version be
    /// retained for ordering, so the value is dropped.
    pub fn tombstone(&self, key: &str, version: i64) {
        let mut guard = self.inner.lock().unwrap();
        guard.insert(
            key.to_string(),
            LocalRecord {
                value: Vec::new(),
                version,
                live: false,
            },
        );
        info!("tombstoned key {} at version {}", key, version);
    }

    /// Applies a raw record verbatim, used by `set_all`/bulk replication
    /// paths that have already resolved conflicts.
    pub fn set_raw(&self, key: &str, record: LocalRecord) {
        let mut guard = self.inner.lock().unwrap();
        guard.insert(key.to_string(), record);
    }

    pub fn remove_local(&self, key: &str) {
        let mut guard = self.inner.lock().unwrap();
        guard.remove(key);
    }

    pub fn get_all_live(&self) -> HashMap<String, LocalRecord> {
        let guard = self.inner.lock().unwrap();
        guard
            .iter()
            .filter(|(_, r)| r.live)
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect()
    }

    pub fn get_all_tombstones(&self) -> HashMap<String, LocalRecord> {
        let guard = self.inner.lock().unwrap();
        guard
            .iter()
            .filter(|(_, r)| !r.live)
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect()
    }

    pub fn set_all(&self, records: HashMap<String, LocalRecord>) {
        let mut guard = self.inner.lock().unwrap();
        let n = records.len();
        for (key, record) in records {
            guard.insert(key, record);
        }
        info!("bulk-applied {} records", n);
    }

    pub fn remove_all(&self, tombstones: HashMap<String, i64>) {
        let mut guard = self.inner.lock().unwrap();
        for (key, version) in tombstones {
            guard.insert(
                key,
                LocalRecord {
                    value: Vec::new(),
                    version,
                    live: false,
                },
            );
        }
    }

    pub fn all_keys(&self) -> Vec<String> {
        let guard = self.inner.lock().unwrap();
        guard.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_missing_key_is_empty_default() {
        let storage = Storage::new();
        let record = storage.get("nope");
        assert!(record.is_empty());
    }

    #[test]
    fn put_then_get_roundtrips() {
        let storage = Storage::new();
        storage.put("k", b"v".to_vec(), 10);
        let record = storage.get("k");
        assert_eq!(record.value, b"v");
        assert_eq!(record.version, 10);
        assert!(record.live);
    }

    #[test]
    fn tombstone_marks_dead_but_keeps_version() {
        let storage = Storage::new();
        storage.put("k", b"v".to_vec(), 10);
        storage.tombstone("k", 11);
        let record = storage.get("k");
        assert!(!record.live);
        assert_eq!(record.version, 11);
    }

    #[test]
    fn get_all_live_excludes_tombstones() {
        let storage = Storage::new();
        storage.put("a", b"1".to_vec(), 1);
        storage.put("b", b"2".to_vec(), 1);
        storage.tombstone("b", 2);
        let live = storage.get_all_live();
        assert_eq!(live.len(), 1);
        assert!(live.contains_key("a"));
    }
}
