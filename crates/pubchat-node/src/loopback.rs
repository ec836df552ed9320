//! In-process pub/sub bridge.
//!
//! [`LoopbackHub`] plays the role of the host transport for the demo
//! binary and for tests. Each [`LoopbackBridge`] joined to a hub is one
//! participant with its own Ed25519 key; addresses are the Bech32
//! encoding of the key hash, so verification derives the same address
//! the signer used.
//!
//! Published frames reach every other subscriber of the topic. The
//! publisher does not receive its own frames back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use pubchat_crypto::signing::{self, Keypair, PublicKey, Signature};
use pubchat_protocol::signing::{PayloadSignature, VerifyOutcome, SIGNATURE_SCHEME};
use pubchat_types::{Address, PubchatError, Result, Topic};
use tokio::sync::mpsc;

use crate::bridge::{HostBridge, Identity, Subscription, SubscriptionHandle};

/// Per-subscription frame buffer.
const SUBSCRIPTION_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

struct Subscriber {
    handle: SubscriptionHandle,
    participant: u64,
    address: Address,
    tx: mpsc::Sender<Vec<u8>>,
}

#[derive(Default)]
struct HubInner {
    next_handle: u64,
    next_participant: u64,
    topics: HashMap<Topic, Vec<Subscriber>>,
}

/// Shared in-process topic registry.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    inner: Arc<Mutex<HubInner>>,
}

impl LoopbackHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant with a fresh random key.
    pub fn join(&self) -> Result<LoopbackBridge> {
        self.join_with(Keypair::generate())
    }

    /// Adds a participant with a deterministic key.
    pub fn join_with_seed(&self, seed: &[u8; 32]) -> Result<LoopbackBridge> {
        self.join_with(Keypair::from_seed(seed))
    }

    fn join_with(&self, keypair: Keypair) -> Result<LoopbackBridge> {
        let public_key = keypair.public_key();
        let address = public_key.address()?;
        let participant = {
            let mut inner = self.lock()?;
            inner.next_participant += 1;
            inner.next_participant
        };
        Ok(LoopbackBridge {
            hub: self.clone(),
            participant,
            account_id: format!("loopback-{participant}"),
            address,
            keypair: Arc::new(keypair),
            public_key,
            faults: Arc::new(Faults::default()),
        })
    }

    /// Delivers raw bytes to every subscriber of `topic`.
    ///
    /// Bypasses signing entirely, which makes it the way to replay or
    /// forge frames in tests. Returns the number of subscribers reached.
    pub fn inject(&self, topic: &Topic, frame: &[u8]) -> Result<usize> {
        self.fan_out(topic, frame, None)
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.lock()
            .map(|inner| inner.topics.get(topic).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn fan_out(&self, topic: &Topic, frame: &[u8], skip: Option<u64>) -> Result<usize> {
        let mut inner = self.lock()?;
        let Some(subscribers) = inner.topics.get_mut(topic) else {
            return Ok(0);
        };

        subscribers.retain(|s| !s.tx.is_closed());
        let mut delivered = 0;
        for sub in subscribers.iter() {
            if Some(sub.participant) == skip {
                continue;
            }
            match sub.tx.try_send(frame.to_vec()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(%topic, handle = sub.handle.0, %e, "loopback frame not delivered");
                }
            }
        }
        Ok(delivered)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HubInner>> {
        self.inner.lock().map_err(|_| PubchatError::BridgeError {
            reason: "loopback hub lock poisoned".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Faults {
    identity: AtomicBool,
    sign: AtomicBool,
    publish: AtomicBool,
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

/// One participant of a [`LoopbackHub`].
///
/// Clones share the key and the fault switches.
#[derive(Clone)]
pub struct LoopbackBridge {
    hub: LoopbackHub,
    participant: u64,
    account_id: String,
    address: Address,
    keypair: Arc<Keypair>,
    public_key: PublicKey,
    faults: Arc<Faults>,
}

impl LoopbackBridge {
    /// This participant's address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The hub this participant belongs to.
    pub fn hub(&self) -> &LoopbackHub {
        &self.hub
    }

    /// Makes `active_identity` fail while set.
    pub fn fail_identity(&self, fail: bool) {
        self.faults.identity.store(fail, Ordering::SeqCst);
    }

    /// Makes `sign` fail while set.
    pub fn fail_sign(&self, fail: bool) {
        self.faults.sign.store(fail, Ordering::SeqCst);
    }

    /// Makes `publish` fail while set.
    pub fn fail_publish(&self, fail: bool) {
        self.faults.publish.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl HostBridge for LoopbackBridge {
    async fn active_identity(&self) -> Result<Identity> {
        if self.faults.identity.load(Ordering::SeqCst) {
            return Err(PubchatError::BridgeError {
                reason: "no active account".into(),
            });
        }
        Ok(Identity {
            account_id: self.account_id.clone(),
            address: self.address.clone(),
        })
    }

    async fn sign(
        &self,
        account_id: &str,
        address: &Address,
        payload: &str,
        scheme: &str,
    ) -> Result<PayloadSignature> {
        if self.faults.sign.load(Ordering::SeqCst) {
            return Err(PubchatError::BridgeError {
                reason: "signing is not supported by this account".into(),
            });
        }
        if scheme != SIGNATURE_SCHEME {
            return Err(PubchatError::BridgeError {
                reason: format!("unsupported signature scheme: {scheme}"),
            });
        }
        if account_id != self.account_id || address != &self.address {
            return Err(PubchatError::BridgeError {
                reason: format!("unknown account {account_id} / {address}"),
            });
        }

        let signature = self.keypair.sign(payload.as_bytes());
        Ok(PayloadSignature {
            address: self.address.clone(),
            public_key: self.public_key.to_hex(),
            signature: signature.to_hex(),
        })
    }

    async fn verify(
        &self,
        payload: &str,
        signature: &str,
        public_key: &str,
        claimed_address: &str,
    ) -> Result<VerifyOutcome> {
        let public_key = PublicKey::from_hex(public_key)?;
        let derived = public_key.address()?;

        let signature_valid = match Signature::from_hex(signature) {
            Ok(sig) => signing::verify(&public_key, payload.as_bytes(), &sig).is_ok(),
            Err(_) => false,
        };

        Ok(VerifyOutcome {
            signature_valid,
            address_matches: derived.as_str() == claimed_address.trim(),
            derived_address: derived.to_string(),
        })
    }

    async fn publish(&self, topic: &Topic, frame: Vec<u8>) -> Result<()> {
        if self.faults.publish.load(Ordering::SeqCst) {
            return Err(PubchatError::BridgeError {
                reason: "publish failed".into(),
            });
        }
        let delivered = self.hub.fan_out(topic, &frame, Some(self.participant))?;
        tracing::trace!(%topic, delivered, "loopback publish");
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let mut inner = self.hub.lock()?;
        inner.next_handle += 1;
        let handle = SubscriptionHandle(inner.next_handle);
        inner.topics.entry(topic.clone()).or_default().push(Subscriber {
            handle,
            participant: self.participant,
            address: self.address.clone(),
            tx,
        });
        Ok(Subscription { handle, frames: rx })
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        let mut inner = self.hub.lock()?;
        for subscribers in inner.topics.values_mut() {
            subscribers.retain(|s| s.handle != handle);
        }
        inner.topics.retain(|_, subs| !subs.is_empty());
        Ok(())
    }

    async fn list_peers(&self, topic: &Topic) -> Result<Vec<String>> {
        let inner = self.hub.lock()?;
        let mut peers: Vec<String> = inner
            .topics
            .get(topic)
            .map(|subs| {
                subs.iter()
                    .filter(|s| s.participant != self.participant && !s.tx.is_closed())
                    .map(|s| s.address.to_string())
                    .collect()
            })
            .unwrap_or_default();
        peers.sort();
        peers.dedup();
        Ok(peers)
    }
}
