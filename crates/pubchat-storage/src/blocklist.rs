//! Per-topic blocklist store.
//!
//! An address may be blocked in one topic and not in another. Entries
//! are kept until explicitly removed.

use pubchat_types::{Address, BlockReason, Result, Topic};
use serde::{Deserialize, Serialize};

use crate::engine::StorageEngine;
use crate::typed_tree::{scoped_key, topic_prefix, TypedTree};

// ---------------------------------------------------------------------------
// BlockEntry
// ---------------------------------------------------------------------------

/// A single entry in a topic's blocklist.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockEntry {
    /// Blocked address.
    pub address: Address,
    /// Nickname shown for the address when it was blocked.
    pub display_name: String,
    /// When the block was created, ms since epoch.
    pub blocked_at_ms: i64,
    /// Manual or automatic.
    pub reason: BlockReason,
}

// ---------------------------------------------------------------------------
// BlocklistStore
// ---------------------------------------------------------------------------

/// Durable per-topic blocklists backed by sled.
#[derive(Clone)]
pub struct BlocklistStore {
    tree: TypedTree<BlockEntry>,
}

impl BlocklistStore {
    /// Creates a new `BlocklistStore`.
    pub(crate) fn new(engine: &StorageEngine) -> Result<Self> {
        Ok(Self {
            tree: TypedTree::new(engine.open_tree("blocklists")?),
        })
    }

    /// Writes an entry, replacing any existing one for the address.
    pub fn put(&self, topic: &Topic, entry: &BlockEntry) -> Result<()> {
        self.tree
            .insert(&scoped_key(topic, entry.address.as_str().as_bytes()), entry)
    }

    /// Removes an address. Returns `true` if it was present.
    pub fn remove(&self, topic: &Topic, address: &Address) -> Result<bool> {
        self.tree.delete(&scoped_key(topic, address.as_str().as_bytes()))
    }

    /// Looks up the entry for an address.
    pub fn get(&self, topic: &Topic, address: &Address) -> Result<Option<BlockEntry>> {
        self.tree.get(&scoped_key(topic, address.as_str().as_bytes()))
    }

    /// All entries of a topic, in key order.
    pub fn list(&self, topic: &Topic) -> Result<Vec<BlockEntry>> {
        Ok(self
            .tree
            .scan_prefix(&topic_prefix(topic))?
            .into_iter()
            .map(|(_, entry)| entry)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
