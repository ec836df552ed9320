//! Per-topic message history.
//!
//! Messages live in two trees:
//!
//! - `messages`: `topic || 0x00 || message_id` → [`ChatMessage`]. One row
//!   per id; writing an existing id replaces it.
//! - `messages_by_ts`: `topic || 0x00 || ts(8, order-preserving BE) ||
//!   message_id` → id. Natural sled ordering gives timestamp order.
//!
//! Loading recent history walks the index backwards and then re-ascends,
//! so the caller gets the newest `limit` messages oldest first.

use pubchat_types::{ChatMessage, MessageId, Result, Topic};

use crate::engine::StorageEngine;
use crate::typed_tree::{scoped_key, topic_prefix, TypedTree};

/// Largest number of messages a single history load returns.
pub const MAX_RECENT: usize = 2000;

// ---------------------------------------------------------------------------
// MessageStore
// ---------------------------------------------------------------------------

/// Durable message history, scoped per topic.
#[derive(Clone)]
pub struct MessageStore {
    messages: TypedTree<ChatMessage>,
    by_ts: TypedTree<MessageId>,
}

impl MessageStore {
    /// Creates a new `MessageStore` backed by the engine.
    pub(crate) fn new(engine: &StorageEngine) -> Result<Self> {
        Ok(Self {
            messages: TypedTree::new(engine.open_tree("messages")?),
            by_ts: TypedTree::new(engine.open_tree("messages_by_ts")?),
        })
    }

    /// Stores a message under its topic.
    ///
    /// Storing the same id twice keeps a single row; the newer write
    /// wins.
    pub fn put(&self, msg: &ChatMessage) -> Result<()> {
        let primary = scoped_key(&msg.topic, msg.id.as_str().as_bytes());

        if let Some(existing) = self.messages.get(&primary)? {
            if existing.timestamp_ms != msg.timestamp_ms {
                self.by_ts
                    .delete(&index_key(&msg.topic, existing.timestamp_ms, &msg.id))?;
            }
        }

        self.messages.insert(&primary, msg)?;
        self.by_ts
            .insert(&index_key(&msg.topic, msg.timestamp_ms, &msg.id), &msg.id)
    }

    /// Looks up one message by id.
    pub fn get(&self, topic: &Topic, id: &MessageId) -> Result<Option<ChatMessage>> {
        self.messages.get(&scoped_key(topic, id.as_str().as_bytes()))
    }

    /// Returns the newest `limit` messages of a topic in ascending
    /// timestamp order.
    ///
    /// `limit` is clamped to `1..=MAX_RECENT`.
    pub fn recent(&self, topic: &Topic, limit: usize) -> Result<Vec<ChatMessage>> {
        let limit = limit.clamp(1, MAX_RECENT);
        let newest_first = self.by_ts.scan_prefix_rev(&topic_prefix(topic), limit)?;

        let mut out = Vec::with_capacity(newest_first.len());
        for (_, id) in newest_first {
            if let Some(msg) = self.get(topic, &id)? {
                out.push(msg);
            }
        }
        out.reverse();
        Ok(out)
    }

    /// Number of stored messages for a topic.
    pub fn count(&self, topic: &Topic) -> Result<usize> {
        Ok(self.messages.keys_by_prefix(&topic_prefix(topic))?.len())
    }

    /// Deletes the whole history of a topic. Other topics are untouched.
    ///
    /// Returns the number of messages removed.
    pub fn clear(&self, topic: &Topic) -> Result<usize> {
        let prefix = topic_prefix(topic);
        self.by_ts.delete_prefix(&prefix)?;
        let removed = self.messages.delete_prefix(&prefix)?;
        tracing::info!(%topic, removed, "cleared message history");
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Key construction
// ---------------------------------------------------------------------------

/// `topic || 0x00 || sortable_ts(8) || message_id`.
fn index_key(topic: &Topic, timestamp_ms: i64, id: &MessageId) -> Vec<u8> {
    let mut suffix = Vec::with_capacity(8 + id.as_str().len());
    suffix.extend_from_slice(&sortable_ts(timestamp_ms));
    suffix.extend_from_slice(id.as_str().as_bytes());
    scoped_key(topic, &suffix)
}

/// Big-endian bytes with the sign bit flipped, so byte order matches
/// numeric order for negative values too.
fn sortable_ts(timestamp_ms: i64) -> [u8; 8] {
    ((timestamp_ms as u64) ^ (1u64 << 63)).to_be_bytes()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
