//! Blocklist manager for the active topic.
//!
//! Keeps an in-memory copy of the topic's blocklist for the hot path and
//! writes every change through to [`BlocklistStore`]. Storage failures
//! are logged and do not undo the in-memory change.

use std::collections::HashMap;

use pubchat_storage::blocklist::{BlockEntry, BlocklistStore};
use pubchat_types::{Address, BlockReason, Topic};

/// Blocklist of one topic.
pub struct BlocklistManager {
    store: BlocklistStore,
    topic: Option<Topic>,
    entries: HashMap<Address, BlockEntry>,
}

impl BlocklistManager {
    /// Creates a manager with no active topic.
    pub fn new(store: BlocklistStore) -> Self {
        Self {
            store,
            topic: None,
            entries: HashMap::new(),
        }
    }

    /// Switches to `topic` and loads its persisted entries.
    ///
    /// A failed load leaves the blocklist empty for this topic.
    pub fn load(&mut self, topic: &Topic) {
        self.entries.clear();
        self.topic = Some(topic.clone());
        match self.store.list(topic) {
            Ok(list) => {
                self.entries = list.into_iter().map(|e| (e.address.clone(), e)).collect();
                tracing::debug!(%topic, count = self.entries.len(), "blocklist loaded");
            }
            Err(e) => tracing::warn!(%topic, %e, "failed to load blocklist"),
        }
    }

    /// Returns `true` if `address` is blocked in the active topic.
    pub fn is_blocked(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    /// Blocks `address`. Returns `false` if it was already blocked.
    pub fn block(
        &mut self,
        address: &Address,
        display_name: &str,
        reason: BlockReason,
        now_ms: i64,
    ) -> bool {
        if self.entries.contains_key(address) {
            return false;
        }
        let entry = BlockEntry {
            address: address.clone(),
            display_name: display_name.to_string(),
            blocked_at_ms: now_ms,
            reason,
        };
        if let Some(topic) = &self.topic {
            if let Err(e) = self.store.put(topic, &entry) {
                tracing::warn!(%topic, %address, %e, "failed to persist block");
            }
        }
        tracing::info!(%address, %reason, "sender blocked");
        self.entries.insert(address.clone(), entry);
        true
    }

    /// Unblocks `address`. Returns `false` if it was not blocked.
    pub fn unblock(&mut self, address: &Address) -> bool {
        if self.entries.remove(address).is_none() {
            return false;
        }
        if let Some(topic) = &self.topic {
            if let Err(e) = self.store.remove(topic, address) {
                tracing::warn!(%topic, %address, %e, "failed to persist unblock");
            }
        }
        tracing::info!(%address, "sender unblocked");
        true
    }

    /// Entries of the active topic, most recently blocked first.
    pub fn entries(&self) -> Vec<BlockEntry> {
        let mut list: Vec<BlockEntry> = self.entries.values().cloned().collect();
        list.sort_by(|a, b| {
            b.blocked_at_ms
                .cmp(&a.blocked_at_ms)
                .then_with(|| a.address.cmp(&b.address))
        });
        list
    }

    /// Number of blocked addresses.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is blocked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
