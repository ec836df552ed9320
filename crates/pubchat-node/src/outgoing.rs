//! Outbound frame construction.
//!
//! Every outbound frame goes through the same steps:
//!
//! 1. Build the signed base fields (`room`, `ts`, `addr`, `nick`) plus
//!    the kind-specific ones ([`signed_fields`]).
//! 2. Mine a nonce until the payload meets the PoW difficulty. Mining
//!    runs on its own task ([`MiningTask`]) so the caller can keep
//!    handling inbound frames while it searches.
//! 3. Ask the bridge to sign the canonical payload, wrap it in a wire
//!    frame and publish it ([`sign_and_publish`]).
//!
//! Any failure aborts the send; nothing is published half-way.

use std::collections::BTreeMap;

use pubchat_protocol::codec::FIELD_TEXT;
use pubchat_protocol::pow::{self, MinedPayload};
use pubchat_protocol::signing::{self, SIGNATURE_SCHEME};
use pubchat_types::config::ChatConfig;
use pubchat_types::{FrameKind, PubchatError, Result, Topic};
use tokio::task::JoinHandle;

use crate::bridge::{HostBridge, Identity};

/// What to publish.
#[derive(Clone, Debug)]
pub struct OutboundFrame<'a> {
    /// Frame type.
    pub kind: FrameKind,
    /// Topic to publish on.
    pub topic: &'a Topic,
    /// Sender nickname.
    pub nick: &'a str,
    /// Claimed timestamp.
    pub ts_ms: i64,
    /// Message text, for `msg` frames.
    pub text: Option<&'a str>,
}

/// The field set signed for `frame`, without the nonce.
pub fn signed_fields(identity: &Identity, frame: &OutboundFrame<'_>) -> BTreeMap<String, String> {
    let mut fields = signing::base_fields(frame.topic, frame.ts_ms, &identity.address, frame.nick);
    if let Some(text) = frame.text {
        fields.insert(FIELD_TEXT.to_string(), text.to_string());
    }
    fields
}

// ---------------------------------------------------------------------------
// MiningTask
// ---------------------------------------------------------------------------

/// A nonce search running on its own tokio task.
///
/// Dropping it aborts the search.
pub struct MiningTask {
    handle: JoinHandle<Result<MinedPayload>>,
}

impl MiningTask {
    /// Starts mining a `kind` payload over `fields`.
    pub fn spawn(kind: FrameKind, fields: BTreeMap<String, String>, config: &ChatConfig) -> Self {
        let difficulty = config.pow_difficulty;
        let yield_every = config.mining_yield_every;
        let handle = tokio::spawn(async move {
            pow::mine_payload(kind.as_str(), &fields, difficulty, yield_every).await
        });
        Self { handle }
    }

    /// Waits for the search to finish.
    ///
    /// Safe to call again after being cancelled by `select!`.
    ///
    /// # Errors
    ///
    /// Mining errors, or [`PubchatError::ProtocolError`] if the task
    /// panicked or was aborted.
    pub async fn finish(&mut self) -> Result<MinedPayload> {
        (&mut self.handle)
            .await
            .map_err(|e| PubchatError::ProtocolError {
                reason: format!("mining task failed: {e}"),
            })?
    }
}

impl Drop for MiningTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Sign and publish
// ---------------------------------------------------------------------------

/// Signs a mined payload through the bridge and publishes the frame.
///
/// Returns the mined payload so the caller can echo it locally.
///
/// # Errors
///
/// Propagates signing, serialization and publish errors unchanged.
pub async fn sign_and_publish(
    bridge: &dyn HostBridge,
    identity: &Identity,
    kind: FrameKind,
    topic: &Topic,
    mined: MinedPayload,
) -> Result<MinedPayload> {
    let signature = bridge
        .sign(
            &identity.account_id,
            &identity.address,
            &mined.payload,
            SIGNATURE_SCHEME,
        )
        .await?;

    let wire = signing::build_frame(kind, mined.payload.clone(), signature);
    bridge.publish(topic, wire.to_bytes()?).await?;

    tracing::debug!(
        %topic,
        %kind,
        attempts = mined.attempts,
        "published frame"
    );
    Ok(mined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackHub;
    use pubchat_protocol::codec::decode_payload;
    use pubchat_protocol::frame::WireFrame;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn low_difficulty() -> ChatConfig {
        ChatConfig {
            pow_difficulty: 4,
            ..ChatConfig::default()
        }
    }

    #[tokio::test]
    async fn published_frame_is_signed_and_mined() -> TestResult {
        let hub = LoopbackHub::new();
        let alice = hub.join()?;
        let bob = hub.join()?;
        let topic = Topic::for_room("lumen/pubsub_chat/v1/", "lobby");
        let mut sub = bob.subscribe(&topic).await?;
        let identity = alice.active_identity().await?;

        let fields = signed_fields(
            &identity,
            &OutboundFrame {
                kind: FrameKind::Msg,
                topic: &topic,
                nick: "alice",
                ts_ms: 1_700_000_000_000,
                text: Some("hi"),
            },
        );
        let mined = MiningTask::spawn(FrameKind::Msg, fields, &low_difficulty())
            .finish()
            .await?;
        let mined = sign_and_publish(&alice, &identity, FrameKind::Msg, &topic, mined).await?;

        let bytes = sub.frames.recv().await.ok_or("no frame delivered")?;
        let frame = WireFrame::parse(&bytes).map_err(|d| format!("{d:?}"))?;
        assert_eq!(frame.kind, "msg");
        assert_eq!(frame.payload, mined.payload);
        assert!(pow::has_valid_pow(&frame.payload, 4));

        let payload = decode_payload(&frame.payload)?;
        assert_eq!(payload.get("text"), Some("hi"));
        assert_eq!(payload.get("addr"), Some(identity.address.as_str()));
        assert_eq!(payload.get("nonce"), Some(mined.nonce.as_str()));

        let outcome = bob
            .verify(&frame.payload, &frame.signature, &frame.public_key, &frame.sender_address)
            .await?;
        assert!(outcome.signature_valid);
        Ok(())
    }

    #[tokio::test]
    async fn sign_failure_publishes_nothing() -> TestResult {
        let hub = LoopbackHub::new();
        let alice = hub.join()?;
        let bob = hub.join()?;
        let topic = Topic::for_room("lumen/pubsub_chat/v1/", "lobby");
        let mut sub = bob.subscribe(&topic).await?;
        let identity = alice.active_identity().await?;
        alice.fail_sign(true);

        let fields = signed_fields(
            &identity,
            &OutboundFrame {
                kind: FrameKind::Ping,
                topic: &topic,
                nick: "alice",
                ts_ms: 1,
                text: None,
            },
        );
        let mined = MiningTask::spawn(FrameKind::Ping, fields, &low_difficulty())
            .finish()
            .await?;
        let result = sign_and_publish(&alice, &identity, FrameKind::Ping, &topic, mined).await;

        assert!(result.is_err());
        assert!(sub.frames.try_recv().is_err());
        Ok(())
    }

    #[test]
    fn ping_fields_carry_no_text() {
        let identity = Identity {
            account_id: "a".into(),
            address: match pubchat_types::Address::new("lmn1alice") {
                Ok(a) => a,
                Err(e) => panic!("{e}"),
            },
        };
        let topic = Topic::for_room("lumen/pubsub_chat/v1/", "lobby");
        let fields = signed_fields(
            &identity,
            &OutboundFrame {
                kind: FrameKind::Ping,
                topic: &topic,
                nick: "alice",
                ts_ms: 5,
                text: None,
            },
        );
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(keys, ["addr", "nick", "room", "ts"]);
    }
}
