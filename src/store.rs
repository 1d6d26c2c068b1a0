use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Shared container of received blobs, ordered by timestamp key.
///
/// Fed by the sentinel-framing data callback from any reactor thread; reads
/// vastly outnumber writes, so a reader/writer lock guards the map.
pub struct BlobStore {
    blobs: RwLock<BTreeMap<String, Bytes>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert a blob under its key, replacing any previous value
    pub fn insert(&self, key: String, blob: Bytes) {
        self.blobs.write().insert(key, blob);
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.blobs.read().get(key).cloned()
    }

    /// Most recent key in timestamp order
    pub fn latest_key(&self) -> Option<String> {
        self.blobs.read().keys().next_back().cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl Default for BlobStore {
    fn default() -> Self {
        Self::new()
    }
}
