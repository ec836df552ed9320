//! Nickname directory for the active topic.
//!
//! Nicknames arrive in every signed payload. The latest one received
//! wins; the claimed timestamp is not consulted. A store write happens
//! only when the nickname differs from the last one written for that
//! address.

use std::collections::HashMap;

use pubchat_storage::nicknames::NicknameStore;
use pubchat_types::{sanitize_nick, Address, Topic};

/// In-memory `address -> nickname` map backed by [`NicknameStore`].
pub struct NicknameDirectory {
    store: NicknameStore,
    topic: Option<Topic>,
    names: HashMap<Address, String>,
    persisted: HashMap<Address, String>,
}

impl NicknameDirectory {
    /// Creates an empty directory.
    pub fn new(store: NicknameStore) -> Self {
        Self {
            store,
            topic: None,
            names: HashMap::new(),
            persisted: HashMap::new(),
        }
    }

    /// Switches to `topic` and loads its stored nicknames.
    pub fn load(&mut self, topic: &Topic) {
        self.topic = Some(topic.clone());
        self.names.clear();
        self.persisted.clear();
        match self.store.all(topic) {
            Ok(all) => {
                self.persisted = all.clone();
                self.names = all;
            }
            Err(e) => tracing::warn!(%topic, %e, "failed to load nicknames"),
        }
    }

    /// Records `nickname` for `address`.
    ///
    /// Returns the sanitized nickname if it differs from the one already
    /// known, `None` otherwise.
    pub fn observe(&mut self, address: &Address, nickname: &str, now_ms: i64) -> Option<String> {
        let nick = sanitize_nick(nickname)?;
        let changed = self.names.get(address) != Some(&nick);
        if changed {
            self.names.insert(address.clone(), nick.clone());
        }

        if self.persisted.get(address) != Some(&nick) {
            if let Some(topic) = &self.topic {
                match self.store.put(topic, address, &nick, now_ms) {
                    Ok(_) => {
                        self.persisted.insert(address.clone(), nick.clone());
                    }
                    Err(e) => tracing::warn!(%topic, %address, %e, "failed to persist nickname"),
                }
            }
        }

        changed.then_some(nick)
    }

    /// The known nickname of `address`.
    pub fn get(&self, address: &Address) -> Option<&str> {
        self.names.get(address).map(String::as_str)
    }

    /// Nickname of `address`, or its shortened form when unknown.
    pub fn display_name(&self, address: &Address) -> String {
        self.get(address)
            .map(str::to_string)
            .unwrap_or_else(|| address.short())
    }

    /// Number of known nicknames.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if no nickname is known.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
