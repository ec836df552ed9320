//! Global key-value settings.
//!
//! Holds values that are not scoped to a topic, such as the last
//! nickname the local user chose.

use pubchat_types::{sanitize_nick, Result};
use serde::{Deserialize, Serialize};

use crate::engine::StorageEngine;
use crate::typed_tree::TypedTree;

/// Key under which the local nickname is stored.
const KEY_OWN_NICK: &[u8] = b"own_nick.v1";

/// Wrapper for a stored setting value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettingValue {
    /// The setting value as a string.
    pub value: String,
}

/// Key-value settings store.
#[derive(Clone)]
pub struct SettingsStore {
    tree: TypedTree<SettingValue>,
}

impl SettingsStore {
    /// Creates a new `SettingsStore`.
    pub(crate) fn new(engine: &StorageEngine) -> Result<Self> {
        Ok(Self {
            tree: TypedTree::new(engine.open_tree("settings")?),
        })
    }

    /// Sets a string setting.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.tree.insert(
            key.as_bytes(),
            &SettingValue {
                value: value.to_string(),
            },
        )
    }

    /// Gets a string setting.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.tree.get(key.as_bytes())?.map(|sv| sv.value))
    }

    /// Removes a setting.
    pub fn remove(&self, key: &str) -> Result<bool> {
        self.tree.delete(key.as_bytes())
    }

    /// The last nickname the local user chose, if any.
    pub fn own_nick(&self) -> Result<Option<String>> {
        Ok(self
            .tree
            .get(KEY_OWN_NICK)?
            .and_then(|sv| sanitize_nick(&sv.value)))
    }

    /// Persists the local nickname. Blank values are ignored.
    pub fn set_own_nick(&self, nick: &str) -> Result<()> {
        let Some(nick) = sanitize_nick(nick) else {
            return Ok(());
        };
        self.tree.insert(KEY_OWN_NICK, &SettingValue { value: nick })
    }
}
