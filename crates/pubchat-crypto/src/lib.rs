//! Cryptographic primitives for the pubchat signed pub/sub chat.
//!
//! This crate is the **sole** location for raw cryptographic operations.
//! Protocol and node code go through the helpers exported here.
//!
//! # Modules
//!
//! - [`hash`] — SHA-256 hashing and leading-zero-bit counting
//! - [`random`] — random hex nonces
//! - [`signing`] — Ed25519 keypairs, signatures and verification
//! - [`address`] — Bech32 account addresses derived from public keys

pub mod address;
pub mod hash;
pub mod random;
pub mod signing;
