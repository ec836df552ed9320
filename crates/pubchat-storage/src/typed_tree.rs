//! Generic typed sled tree wrapper.
//!
//! [`TypedTree<T>`] serializes values with bincode on write and
//! deserializes on read. Keys stay raw bytes so callers control
//! ordering.

use std::marker::PhantomData;

use pubchat_types::{PubchatError, Result, Topic};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Separator between the topic and the rest of a scoped key.
const TOPIC_SEPARATOR: u8 = 0x00;

/// Builds `topic || 0x00 || suffix`.
pub(crate) fn scoped_key(topic: &Topic, suffix: &[u8]) -> Vec<u8> {
    let mut key = topic_prefix(topic);
    key.extend_from_slice(suffix);
    key
}

/// Builds `topic || 0x00`, the scan prefix for a topic.
pub(crate) fn topic_prefix(topic: &Topic) -> Vec<u8> {
    let mut key = Vec::with_capacity(topic.as_str().len() + 1);
    key.extend_from_slice(topic.as_str().as_bytes());
    key.push(TOPIC_SEPARATOR);
    key
}

// ---------------------------------------------------------------------------
// TypedTree
// ---------------------------------------------------------------------------

/// A sled tree holding bincode-encoded values of type `T`.
#[derive(Clone)]
pub struct TypedTree<T> {
    tree: sled::Tree,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedTree<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Wraps an open sled tree.
    pub(crate) fn new(tree: sled::Tree) -> Self {
        Self {
            tree,
            _marker: PhantomData,
        }
    }

    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    pub fn get(&self, key: &[u8]) -> Result<Option<T>> {
        let raw = self.tree.get(key).map_err(|e| PubchatError::StorageError {
            reason: format!("sled get failed: {e}"),
        })?;

        match raw {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode_value(&bytes)?)),
        }
    }

    /// Serializes and inserts a value, replacing any previous one.
    pub fn insert(&self, key: &[u8], value: &T) -> Result<()> {
        let bytes = bincode::serialize(value).map_err(|e| PubchatError::StorageError {
            reason: format!("bincode serialization failed: {e}"),
        })?;
        self.tree
            .insert(key, bytes)
            .map_err(|e| PubchatError::StorageError {
                reason: format!("sled insert failed: {e}"),
            })?;
        Ok(())
    }

    /// Removes a key from the tree.
    ///
    /// Returns `Ok(true)` if the key existed.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let prev = self.tree.remove(key).map_err(|e| PubchatError::StorageError {
            reason: format!("sled remove failed: {e}"),
        })?;
        Ok(prev.is_some())
    }

    /// All entries under `prefix`, in ascending key order.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, T)>> {
        let mut results = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (key, value) = item.map_err(|e| PubchatError::StorageError {
                reason: format!("sled scan_prefix failed: {e}"),
            })?;
            results.push((key.to_vec(), decode_value(&value)?));
        }
        Ok(results)
    }

    /// Up to `limit` entries under `prefix`, highest key first.
    pub fn scan_prefix_rev(&self, prefix: &[u8], limit: usize) -> Result<Vec<(Vec<u8>, T)>> {
        let mut results = Vec::with_capacity(limit.min(256));
        for item in self.tree.scan_prefix(prefix).rev() {
            if results.len() >= limit {
                break;
            }
            let (key, value) = item.map_err(|e| PubchatError::StorageError {
                reason: format!("sled scan_prefix failed: {e}"),
            })?;
            results.push((key.to_vec(), decode_value(&value)?));
        }
        Ok(results)
    }

    /// Raw keys under `prefix`, without decoding values.
    pub fn keys_by_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for item in self.tree.scan_prefix(prefix) {
            let (key, _) = item.map_err(|e| PubchatError::StorageError {
                reason: format!("sled scan_prefix failed: {e}"),
            })?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    /// Deletes every entry under `prefix`. Returns how many were removed.
    pub fn delete_prefix(&self, prefix: &[u8]) -> Result<usize> {
        let keys = self.keys_by_prefix(prefix)?;
        let mut removed = 0;
        for key in &keys {
            if self.delete(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| PubchatError::StorageError {
        reason: format!("bincode deserialization failed: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
