//! Message protocol for the pubchat signed pub/sub chat.
//!
//! Defines the canonical payload string that signatures and
//! proof-of-work are computed over, the JSON wire frame, the signed
//! field set and canonical-address rule, and the per-session replay
//! guard.
//!
//! # Modules
//!
//! - [`codec`] — `pubsub_chat|v1|<type>|k=v|...` encoding and decoding
//! - [`frame`] — JSON wire frame published through the host bridge
//! - [`pow`] — Leading-zero-bit admission check and cooperative miner
//! - [`signing`] — Signed field set, verification outcome, canonical address
//! - [`nonce`] — Message-id set plus bounded per-sender nonce history
//! - [`validation`] — Room, nonce and text checks applied at ingress

pub mod codec;
pub mod frame;
pub mod nonce;
pub mod pow;
pub mod signing;
pub mod validation;
