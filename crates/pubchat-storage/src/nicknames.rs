//! Per-topic nickname directory.
//!
//! One record per `(topic, address)`. The last write wins; the stored
//! `updated_at_ms` is the local receipt time and is informational only.

use std::collections::HashMap;

use pubchat_types::{sanitize_nick, Address, Result, Topic};
use serde::{Deserialize, Serialize};

use crate::engine::StorageEngine;
use crate::typed_tree::{scoped_key, topic_prefix, TypedTree};

/// A stored nickname.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NicknameRecord {
    /// Address the nickname belongs to.
    pub address: Address,
    /// Sanitized nickname.
    pub nickname: String,
    /// Local time of the write, ms since epoch.
    pub updated_at_ms: i64,
}

/// Durable nickname directory.
#[derive(Clone)]
pub struct NicknameStore {
    tree: TypedTree<NicknameRecord>,
}

impl NicknameStore {
    /// Creates a new `NicknameStore`.
    pub(crate) fn new(engine: &StorageEngine) -> Result<Self> {
        Ok(Self {
            tree: TypedTree::new(engine.open_tree("nicknames")?),
        })
    }

    /// Writes the nickname for `address` in `topic`.
    ///
    /// Blank nicknames are ignored. Returns `true` if a record was
    /// written.
    pub fn put(&self, topic: &Topic, address: &Address, nickname: &str, now_ms: i64) -> Result<bool> {
        let Some(nickname) = sanitize_nick(nickname) else {
            return Ok(false);
        };
        let record = NicknameRecord {
            address: address.clone(),
            nickname,
            updated_at_ms: now_ms,
        };
        self.tree
            .insert(&scoped_key(topic, address.as_str().as_bytes()), &record)?;
        Ok(true)
    }

    /// Looks up one record.
    pub fn get(&self, topic: &Topic, address: &Address) -> Result<Option<NicknameRecord>> {
        self.tree.get(&scoped_key(topic, address.as_str().as_bytes()))
    }

    /// Every nickname known for a topic.
    pub fn all(&self, topic: &Topic) -> Result<HashMap<Address, String>> {
        Ok(self
            .tree
            .scan_prefix(&topic_prefix(topic))?
            .into_iter()
            .map(|(_, record)| (record.address, record.nickname))
            .collect())
    }
}
