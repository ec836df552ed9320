//! Capabilities the chat core consumes from its host.
//!
//! The core never holds private keys. Identity lookup, signing,
//! verification and the pub/sub transport are all provided by a
//! [`HostBridge`]. Every call may fail; the session turns failures into
//! user-visible errors and never panics on them.

use async_trait::async_trait;
use pubchat_protocol::signing::{PayloadSignature, VerifyOutcome};
use pubchat_types::{Address, Result, Topic};
use tokio::sync::mpsc;

/// The account the host currently signs with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    /// Host-side account identifier, passed back on `sign`.
    pub account_id: String,
    /// Address of the account.
    pub address: Address,
}

/// Opaque handle for an active subscription.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// An active subscription: its handle plus the stream of raw frames.
#[derive(Debug)]
pub struct Subscription {
    /// Pass to [`HostBridge::unsubscribe`].
    pub handle: SubscriptionHandle,
    /// Frames delivered on the topic, in arrival order.
    pub frames: mpsc::Receiver<Vec<u8>>,
}

/// Host capability surface.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// The active account.
    async fn active_identity(&self) -> Result<Identity>;

    /// Signs `payload` as `address` under `scheme`.
    async fn sign(
        &self,
        account_id: &str,
        address: &Address,
        payload: &str,
        scheme: &str,
    ) -> Result<PayloadSignature>;

    /// Verifies a signature over `payload`.
    ///
    /// `public_key`, `signature` and `claimed_address` are taken verbatim
    /// from the wire frame.
    async fn verify(
        &self,
        payload: &str,
        signature: &str,
        public_key: &str,
        claimed_address: &str,
    ) -> Result<VerifyOutcome>;

    /// Publishes raw frame bytes on `topic`.
    async fn publish(&self, topic: &Topic, frame: Vec<u8>) -> Result<()>;

    /// Subscribes to `topic`.
    async fn subscribe(&self, topic: &Topic) -> Result<Subscription>;

    /// Cancels a subscription. Unknown handles are ignored.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()>;

    /// Peers currently subscribed to `topic`, excluding ourselves.
    async fn list_peers(&self, topic: &Topic) -> Result<Vec<String>>;
}
