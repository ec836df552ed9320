//! Durable local storage for pubchat.
//!
//! Backed by sled. Every record that belongs to a topic is keyed by
//! `topic || 0x00 || ...`, so topics never see each other's data and a
//! whole topic can be scanned or cleared by prefix. Subsystems: message
//! history, nickname directory, per-topic blocklists and global
//! settings.

pub mod blocklist;
pub mod engine;
pub mod messages;
pub mod nicknames;
pub mod settings;
pub mod typed_tree;
