//! Core storage engine: database lifecycle and tree access.
//!
//! The [`StorageEngine`] owns the sled database. On
//! [`open`](StorageEngine::open) it opens the database and creates all
//! required trees. Clones share the same database, so one engine can be
//! handed to every session of a node and outlive reconnects.

use std::path::Path;

use pubchat_types::{PubchatError, Result};

use crate::blocklist::BlocklistStore;
use crate::messages::MessageStore;
use crate::nicknames::NicknameStore;
use crate::settings::SettingsStore;

/// Tree names created on open.
const TREES: [&str; 5] = [
    "messages",
    "messages_by_ts",
    "nicknames",
    "blocklists",
    "settings",
];

// ---------------------------------------------------------------------------
// StorageEngine
// ---------------------------------------------------------------------------

/// Storage engine backed by sled.
///
/// # Trees
///
/// - `messages` — `topic || 0x00 || message_id` → stored message
/// - `messages_by_ts` — `topic || 0x00 || ts || message_id` → id (ordering index)
/// - `nicknames` — `topic || 0x00 || address` → nickname record
/// - `blocklists` — `topic || 0x00 || address` → block entry
/// - `settings` — key → string value
#[derive(Clone)]
pub struct StorageEngine {
    db: sled::Db,
}

impl StorageEngine {
    /// Opens (or creates) the storage engine at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PubchatError::StorageError`] if the database cannot be
    /// opened.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| PubchatError::StorageError {
            reason: format!("failed to open sled database: {e}"),
        })?;
        Self::with_db(db)
    }

    /// Opens a throwaway database that is deleted on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| PubchatError::StorageError {
                reason: format!("failed to open temporary sled database: {e}"),
            })?;
        Self::with_db(db)
    }

    fn with_db(db: sled::Db) -> Result<Self> {
        // Pre-create all trees so they exist for later access.
        for name in TREES {
            db.open_tree(name).map_err(|e| PubchatError::StorageError {
                reason: format!("failed to open tree '{name}': {e}"),
            })?;
        }
        Ok(Self { db })
    }

    /// Flushes all pending writes to disk.
    ///
    /// # Errors
    ///
    /// Returns [`PubchatError::StorageError`] if the flush fails.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| PubchatError::StorageError {
            reason: format!("failed to flush database: {e}"),
        })?;
        Ok(())
    }

    /// Opens a named sled tree.
    pub(crate) fn open_tree(&self, name: &str) -> Result<sled::Tree> {
        self.db.open_tree(name).map_err(|e| PubchatError::StorageError {
            reason: format!("failed to open tree '{name}': {e}"),
        })
    }

    /// Returns a [`MessageStore`] for this engine.
    pub fn messages(&self) -> Result<MessageStore> {
        MessageStore::new(self)
    }

    /// Returns a [`NicknameStore`] for this engine.
    pub fn nicknames(&self) -> Result<NicknameStore> {
        NicknameStore::new(self)
    }

    /// Returns a [`BlocklistStore`] for this engine.
    pub fn blocklists(&self) -> Result<BlocklistStore> {
        BlocklistStore::new(self)
    }

    /// Returns a [`SettingsStore`] for this engine.
    pub fn settings(&self) -> Result<SettingsStore> {
        SettingsStore::new(self)
    }
}
