//! Integration tests for the chat session: ingress pipeline, blocklist,
//! history reload, stale connects, heartbeats and the self-throttle.
//!
//! All tests run on a [`ManualClock`] and an in-process hub. Frames from
//! other participants are forged with their own keypair so each test
//! controls exactly what reaches the session. PoW uses 4 bits to keep
//! mining fast.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pubchat_crypto::signing::Keypair;
use pubchat_node::bridge::{HostBridge, Identity, Subscription, SubscriptionHandle};
use pubchat_node::clock::ManualClock;
use pubchat_node::heartbeat::HeartbeatDecision;
use pubchat_node::incoming::{DropReason, IngressOutcome};
use pubchat_node::loopback::{LoopbackBridge, LoopbackHub};
use pubchat_node::session::{ChatSession, ConnectOutcome, Generation, SessionState};
use pubchat_protocol::codec::FIELD_TEXT;
use pubchat_protocol::frame::WireFrame;
use pubchat_protocol::pow::{has_valid_pow, mine_payload};
use pubchat_protocol::signing::{base_fields, build_frame, PayloadSignature, VerifyOutcome};
use pubchat_storage::engine::StorageEngine;
use pubchat_types::config::ChatConfig;
use pubchat_types::{Address, BlockReason, FrameKind, PubchatError, Result, Topic};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const T0: i64 = 1_700_000_000_000;
const DIFFICULTY: u8 = 4;

fn test_config() -> ChatConfig {
    ChatConfig {
        pow_difficulty: DIFFICULTY,
        ..ChatConfig::default()
    }
}

fn lobby() -> Topic {
    Topic::for_room(&test_config().topic_prefix, "lobby")
}

/// A remote participant that signs its own frames.
struct Peer {
    keypair: Keypair,
    address: Address,
    nick: String,
}

impl Peer {
    fn new(seed: u8) -> Self {
        Self::named(seed, "mallory")
    }

    fn named(seed: u8, nick: &str) -> Self {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let address = keypair.public_key().address().expect("derive address");
        Self {
            keypair,
            address,
            nick: nick.to_string(),
        }
    }

    async fn frame(&self, kind: FrameKind, topic: &Topic, text: Option<&str>) -> Vec<u8> {
        self.wire(kind, topic, text, true).await.to_bytes().expect("serialize")
    }

    async fn msg(&self, text: &str) -> Vec<u8> {
        self.frame(FrameKind::Msg, &lobby(), Some(text)).await
    }

    async fn wire(&self, kind: FrameKind, topic: &Topic, text: Option<&str>, pow_ok: bool) -> WireFrame {
        let mut fields = base_fields(topic, T0, &self.address, &self.nick);
        if let Some(text) = text {
            fields.insert(FIELD_TEXT.to_string(), text.to_string());
        }
        let payload = loop {
            let difficulty = if pow_ok { DIFFICULTY } else { 0 };
            let mined = mine_payload(kind.as_str(), &fields, difficulty, 64)
                .await
                .expect("mine");
            if pow_ok || !has_valid_pow(&mined.payload, DIFFICULTY) {
                break mined.payload;
            }
        };
        let signature = self.keypair.sign(payload.as_bytes());
        build_frame(
            kind,
            payload,
            PayloadSignature {
                address: self.address.clone(),
                public_key: self.keypair.public_key().to_hex(),
                signature: signature.to_hex(),
            },
        )
    }
}

async fn connected_session(
    hub: &LoopbackHub,
    storage: &StorageEngine,
    clock: &ManualClock,
) -> (ChatSession, LoopbackBridge) {
    let bridge = hub.join().expect("join hub");
    let mut session = ChatSession::new(
        test_config(),
        Arc::new(bridge.clone()),
        storage,
        Arc::new(clock.clone()),
    )
    .expect("session");
    let outcome = session.connect("Lobby").await.expect("connect");
    assert_eq!(outcome, ConnectOutcome::Connected);
    (session, bridge)
}

fn dropped(outcome: IngressOutcome) -> DropReason {
    match outcome {
        IngressOutcome::Dropped(reason) => reason,
        other => panic!("expected a drop, got {other:?}"),
    }
}

// ===========================================================================
// Ingress
// ===========================================================================

#[tokio::test]
async fn two_clients_exchange_one_message() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let (bob_store, alice_store) = (
        StorageEngine::temporary().expect("store"),
        StorageEngine::temporary().expect("store"),
    );
    let (mut bob, _) = connected_session(&hub, &bob_store, &clock).await;
    let (mut alice, alice_bridge) = connected_session(&hub, &alice_store, &clock).await;

    // Alice's profile announcement arrives first.
    let profile = bob.next_frame().await.expect("profile");
    let outcome = bob.handle_frame(&profile).await;
    assert!(matches!(outcome, IngressOutcome::Accepted { kind: FrameKind::Profile, .. }));

    clock.advance(1_000);
    let sent = alice.send_message("  hi  ").await.expect("send").expect("message");
    assert_eq!(sent.text, "hi");
    assert_eq!(alice.messages().len(), 1);

    let bytes = bob.next_frame().await.expect("frame");
    let outcome = bob.handle_frame(&bytes).await;
    assert!(matches!(outcome, IngressOutcome::Accepted { kind: FrameKind::Msg, .. }), "{outcome:?}");

    assert_eq!(bob.messages().len(), 1);
    let received = &bob.messages()[0];
    assert_eq!(received.text, "hi");
    assert_eq!(&received.sender, alice_bridge.address());
    assert_eq!(received.id, sent.id);
    assert_eq!(bob.nickname(alice_bridge.address()), Some(alice.own_nick()));
    assert_eq!(bob.rx_stats().accepted, 2);
}

#[tokio::test]
async fn blocked_sender_delivers_nothing() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    let mallory = Peer::new(7);

    assert!(session.block(&mallory.address).expect("block"));
    let outcome = session.handle_frame(&mallory.msg("hello").await).await;

    assert_eq!(dropped(outcome), DropReason::Blocked);
    assert!(session.messages().is_empty());
}

#[tokio::test]
async fn replayed_frame_is_a_silent_duplicate() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    let bytes = Peer::new(8).msg("once").await;

    session.handle_frame(&bytes).await;
    clock.advance(5_000);
    let outcome = session.handle_frame(&bytes).await;

    assert_eq!(dropped(outcome), DropReason::Duplicate);
    assert_eq!(session.messages().len(), 1);
    let stats = session.rx_stats();
    assert_eq!((stats.total, stats.accepted, stats.dropped), (2, 1, 0));
}

#[tokio::test]
async fn frame_without_enough_work_is_rejected() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    let peer = Peer::new(9);

    let frame = peer.wire(FrameKind::Msg, &lobby(), Some("cheap"), false).await;
    let outcome = session.handle_frame(&frame.to_bytes().expect("serialize")).await;

    assert_eq!(dropped(outcome), DropReason::BadPow);
    assert_eq!(session.rx_stats().last_drop, Some(DropReason::BadPow));
}

#[tokio::test]
async fn signature_under_foreign_key_is_rejected() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;

    let mut frame = Peer::new(10).wire(FrameKind::Msg, &lobby(), Some("x"), true).await;
    frame.public_key = Peer::new(11).keypair.public_key().to_hex();
    let outcome = session.handle_frame(&frame.to_bytes().expect("serialize")).await;

    assert_eq!(dropped(outcome), DropReason::BadSig);
}

#[tokio::test]
async fn claimed_address_is_ignored_in_favour_of_derived() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    let peer = Peer::new(12);

    let mut frame = peer.wire(FrameKind::Msg, &lobby(), Some("who am i"), true).await;
    frame.sender_address = "lmn1somebodyelse".into();
    let outcome = session.handle_frame(&frame.to_bytes().expect("serialize")).await;

    match outcome {
        IngressOutcome::Accepted { sender, .. } => assert_eq!(sender, peer.address),
        other => panic!("expected accept, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_and_misrouted_frames_are_dropped() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    let peer = Peer::new(13);

    let other_room = Topic::for_room(&test_config().topic_prefix, "kitchen");
    let misrouted = peer.frame(FrameKind::Msg, &other_room, Some("hi")).await;
    assert_eq!(dropped(session.handle_frame(&misrouted).await), DropReason::WrongRoom);

    assert_eq!(dropped(session.handle_frame(b"not json").await), DropReason::BadJson);
    assert_eq!(
        dropped(session.handle_frame(br#"{"type":"msg","payload":"x"}"#).await),
        DropReason::MissingFields
    );

    let mut mislabeled = peer.wire(FrameKind::Ping, &lobby(), None, true).await;
    mislabeled.kind = "msg".into();
    assert_eq!(
        dropped(session.handle_frame(&mislabeled.to_bytes().expect("serialize")).await),
        DropReason::KindMismatch
    );

    let empty = peer.msg("   ").await;
    assert_eq!(dropped(session.handle_frame(&empty).await), DropReason::EmptyText);
    assert!(session.messages().is_empty());
}

#[tokio::test]
async fn eleventh_frame_in_window_auto_blocks() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    let spammer = Peer::new(14);

    let first = session.handle_frame(&spammer.msg("m0").await).await;
    assert!(matches!(first, IngressOutcome::Accepted { .. }));
    for i in 1..10 {
        clock.advance(100);
        let outcome = session.handle_frame(&spammer.msg(&format!("m{i}")).await).await;
        assert_eq!(dropped(outcome), DropReason::RateLimited);
    }
    clock.advance(100);
    let outcome = session.handle_frame(&spammer.msg("m10").await).await;

    assert_eq!(dropped(outcome), DropReason::AutoBlocked);
    assert!(session.is_blocked(&spammer.address));
    let entries = session.blocked_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, BlockReason::AutoSpam);
    assert!(session.messages().is_empty(), "accepted message should be purged");

    clock.advance(10_000);
    let later = session.handle_frame(&spammer.msg("later").await).await;
    assert_eq!(dropped(later), DropReason::Blocked);
}

#[tokio::test]
async fn rate_limit_boundary_is_exclusive() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    let peer = Peer::new(15);

    session.handle_frame(&peer.msg("a").await).await;
    clock.advance(999);
    let early = session.handle_frame(&peer.msg("b").await).await;
    assert_eq!(dropped(early), DropReason::RateLimited);

    clock.advance(1);
    let on_time = session.handle_frame(&peer.msg("c").await).await;
    assert!(matches!(on_time, IngressOutcome::Accepted { .. }));
    let texts: Vec<&str> = session.messages().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["a", "c"]);
}

#[tokio::test]
async fn burst_window_slides_forward() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    let peer = Peer::new(23);

    for i in 0..10 {
        clock.set(T0 + i * 100);
        session.handle_frame(&peer.msg(&format!("m{i}")).await).await;
    }
    assert_eq!(session.rx_stats().accepted, 1);

    // The first two frames have left the 2 s window.
    clock.set(T0 + 2_100);
    let outcome = session.handle_frame(&peer.msg("after").await).await;

    assert!(matches!(outcome, IngressOutcome::Accepted { .. }), "{outcome:?}");
    assert!(!session.is_blocked(&peer.address));
    let texts: Vec<&str> = session.messages().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["m0", "after"]);
}

#[tokio::test]
async fn throttled_frame_does_not_rename_sender() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    let (mallory, eve) = (Peer::named(24, "mallory"), Peer::named(24, "eve"));

    session.handle_frame(&mallory.msg("first").await).await;
    assert_eq!(session.nickname(&mallory.address), Some("mallory"));

    clock.advance(100);
    let early = session.handle_frame(&eve.msg("renamed").await).await;
    assert_eq!(dropped(early), DropReason::RateLimited);
    assert_eq!(session.nickname(&mallory.address), Some("mallory"));

    clock.advance(1_000);
    let empty = session.handle_frame(&eve.msg("   ").await).await;
    assert_eq!(dropped(empty), DropReason::EmptyText);
    assert_eq!(session.nickname(&mallory.address), Some("mallory"));

    clock.advance(1_000);
    let accepted = session.handle_frame(&eve.msg("renamed").await).await;
    assert!(matches!(accepted, IngressOutcome::Accepted { .. }), "{accepted:?}");
    assert_eq!(session.nickname(&mallory.address), Some("eve"));
}

#[tokio::test]
async fn replay_after_reconnect_is_duplicate() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    let bytes = Peer::new(25).msg("once").await;

    session.handle_frame(&bytes).await;
    session.disconnect().await;
    clock.advance(5_000);
    session.connect("lobby").await.expect("reconnect");
    let outcome = session.handle_frame(&bytes).await;

    assert_eq!(dropped(outcome), DropReason::Duplicate);
    assert_eq!(session.messages().len(), 1);
    assert_eq!(storage.messages().expect("tree").count(&lobby()).expect("count"), 1);
}

#[tokio::test]
async fn replay_older_than_loaded_history_is_duplicate() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let config = ChatConfig {
        history_load_limit: 1,
        ..test_config()
    };
    let bridge = hub.join().expect("join");
    let mut session = ChatSession::new(config, Arc::new(bridge), &storage, Arc::new(clock.clone()))
        .expect("session");
    session.connect("lobby").await.expect("connect");
    let bytes = Peer::new(26).msg("old").await;
    session.handle_frame(&bytes).await;
    clock.advance(1_000);
    session.send_message("newer").await.expect("send");

    session.disconnect().await;
    clock.advance(5_000);
    session.connect("lobby").await.expect("reconnect");
    let texts: Vec<&str> = session.messages().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["newer"]);

    let outcome = session.handle_frame(&bytes).await;
    assert_eq!(dropped(outcome), DropReason::Duplicate);
    assert_eq!(session.messages().len(), 1);
}

// ===========================================================================
// Blocklist and history
// ===========================================================================

#[tokio::test]
async fn block_purges_view_and_unblock_restores_it() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    let peer = Peer::new(16);

    session.handle_frame(&peer.msg("before block").await).await;
    assert_eq!(session.messages().len(), 1);

    assert!(session.block(&peer.address).expect("block"));
    assert!(!session.block(&peer.address).expect("block again"));
    assert!(session.messages().is_empty());

    assert!(session.unblock(&peer.address).expect("unblock"));
    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].text, "before block");
}

#[tokio::test]
async fn reconnect_loads_history_without_blocked_senders() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    let (good, bad) = (Peer::new(17), Peer::new(18));

    session.handle_frame(&good.msg("keep me").await).await;
    session.handle_frame(&bad.msg("hide me").await).await;
    session.disconnect().await;
    assert!(!session.is_connected());

    // The topic stays selected, so blocking works while disconnected.
    assert!(session.block(&bad.address).expect("block"));
    clock.advance(1_000);
    session.connect("lobby").await.expect("reconnect");

    let texts: Vec<&str> = session.messages().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["keep me"]);
    assert_eq!(session.rx_stats().total, 0, "stats reset on connect");
}

#[tokio::test]
async fn clear_history_empties_store_and_view() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;

    session.handle_frame(&Peer::new(19).msg("one").await).await;
    session.handle_frame(&Peer::new(20).msg("two").await).await;

    assert_eq!(session.clear_history().expect("clear"), 2);
    assert!(session.messages().is_empty());
    assert_eq!(storage.messages().expect("tree").count(&lobby()).expect("count"), 0);
}

// ===========================================================================
// Connect lifecycle
// ===========================================================================

/// Bridge call during which [`RacingBridge`] bumps the generation.
#[derive(Clone, Copy, Debug, PartialEq)]
enum RaceStage {
    Subscribe,
    Publish,
}

/// Delegates to a loopback bridge, bumping the session generation while
/// the armed call is in flight, as a disconnect racing it would.
struct RacingBridge {
    inner: LoopbackBridge,
    armed: Mutex<Option<(RaceStage, Generation)>>,
}

impl RacingBridge {
    fn new(hub: &LoopbackHub) -> Arc<Self> {
        Arc::new(Self {
            inner: hub.join().expect("join"),
            armed: Mutex::new(None),
        })
    }

    fn arm(&self, stage: RaceStage, generation: Generation) {
        *self.armed.lock().expect("lock") = Some((stage, generation));
    }

    fn race(&self, stage: RaceStage) {
        if let Some((armed, generation)) = self.armed.lock().expect("lock").as_ref() {
            if *armed == stage {
                generation.bump();
            }
        }
    }
}

#[async_trait]
impl HostBridge for RacingBridge {
    async fn active_identity(&self) -> Result<Identity> {
        self.inner.active_identity().await
    }

    async fn sign(
        &self,
        account_id: &str,
        address: &Address,
        payload: &str,
        scheme: &str,
    ) -> Result<PayloadSignature> {
        self.inner.sign(account_id, address, payload, scheme).await
    }

    async fn verify(
        &self,
        payload: &str,
        signature: &str,
        public_key: &str,
        claimed_address: &str,
    ) -> Result<VerifyOutcome> {
        self.inner
            .verify(payload, signature, public_key, claimed_address)
            .await
    }

    async fn publish(&self, topic: &Topic, frame: Vec<u8>) -> Result<()> {
        self.inner.publish(topic, frame).await?;
        self.race(RaceStage::Publish);
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> Result<Subscription> {
        let sub = self.inner.subscribe(topic).await?;
        self.race(RaceStage::Subscribe);
        Ok(sub)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<()> {
        self.inner.unsubscribe(handle).await
    }

    async fn list_peers(&self, topic: &Topic) -> Result<Vec<String>> {
        self.inner.list_peers(topic).await
    }
}

#[tokio::test]
async fn connect_superseded_while_subscribing_is_discarded() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let bridge = RacingBridge::new(&hub);
    let mut session = ChatSession::new(
        test_config(),
        bridge.clone(),
        &storage,
        Arc::new(clock.clone()),
    )
    .expect("session");
    bridge.arm(RaceStage::Subscribe, session.generation());

    let outcome = session.connect("lobby").await.expect("connect");

    assert_eq!(outcome, ConnectOutcome::Superseded);
    assert!(!session.is_connected());
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(hub.subscriber_count(&lobby()), 0, "stale subscription released");
}

#[tokio::test]
async fn connect_failure_leaves_session_disconnected() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let bridge = hub.join().expect("join");
    bridge.fail_identity(true);
    let mut session = ChatSession::new(
        test_config(),
        Arc::new(bridge),
        &storage,
        Arc::new(clock),
    )
    .expect("session");

    let err = session.connect("lobby").await.expect_err("connect should fail");
    assert!(matches!(err, PubchatError::BridgeError { .. }));
    assert!(!session.is_connected());
    assert!(session.connect("   ").await.is_err());
}

#[tokio::test]
async fn connecting_to_same_room_twice_is_a_no_op() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;

    let again = session.connect(" LOBBY ").await.expect("connect");
    assert_eq!(again, ConnectOutcome::AlreadyConnected);
    assert_eq!(hub.subscriber_count(&lobby()), 1);
}

// ===========================================================================
// Outbound
// ===========================================================================

#[tokio::test]
async fn self_throttle_rejects_fast_sends() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;

    // The profile announcement on connect counts as a send.
    let err = session.send_message("too soon").await.expect_err("throttled");
    assert!(matches!(err, PubchatError::RateLimitExceeded { .. }));

    clock.advance(1_000);
    assert!(session.send_message("now").await.expect("send").is_some());
    assert_eq!(session.send_message("   ").await.expect("blank"), None);
}

#[tokio::test]
async fn message_published_after_session_changed_is_stored_only() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let bridge = RacingBridge::new(&hub);
    let mut session = ChatSession::new(
        test_config(),
        bridge.clone(),
        &storage,
        Arc::new(clock.clone()),
    )
    .expect("session");
    session.connect("lobby").await.expect("connect");
    bridge.arm(RaceStage::Publish, session.generation());

    clock.advance(1_000);
    let sent = session.send_message("late").await.expect("send");

    let msg = sent.expect("published message is returned");
    assert_eq!(msg.text, "late");
    assert!(session.messages().is_empty());
    let stored = storage.messages().expect("tree");
    assert_eq!(stored.count(&lobby()).expect("count"), 1);
    assert!(stored.get(&lobby(), &msg.id).expect("get").is_some());
}

#[tokio::test]
async fn inbound_frames_are_handled_while_mining() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;

    clock.advance(1_000);
    hub.inject(&lobby(), &Peer::new(27).msg("incoming").await)
        .expect("inject");
    session.send_message("outgoing").await.expect("send");

    assert_eq!(session.rx_stats().accepted, 1);
    let texts: Vec<&str> = session.messages().iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["incoming", "outgoing"]);
}

#[tokio::test]
async fn send_while_disconnected_fails() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let bridge = hub.join().expect("join");
    let mut session =
        ChatSession::new(test_config(), Arc::new(bridge), &storage, Arc::new(clock))
            .expect("session");

    let err = session.send_message("hello").await.expect_err("not connected");
    assert!(matches!(err, PubchatError::NotConnected { .. }));
}

#[tokio::test]
async fn heartbeat_skipped_until_someone_is_seen() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;

    clock.advance(11_999);
    assert_eq!(session.heartbeat_tick().await.expect("tick"), HeartbeatDecision::NotDue);
    clock.advance(1);
    assert_eq!(session.heartbeat_tick().await.expect("tick"), HeartbeatDecision::SkipAlone);
    assert!(session.is_alone());

    session.handle_frame(&Peer::new(21).msg("hello").await).await;
    assert!(!session.is_alone());
    clock.advance(60_000);
    assert_eq!(session.heartbeat_tick().await.expect("tick"), HeartbeatDecision::Send);
    assert_eq!(session.last_heartbeat_ms(), Some(T0 + 72_000));
}

#[tokio::test]
async fn nickname_change_is_tracked_per_sender() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut bob, _) = connected_session(&hub, &storage, &clock).await;
    let alice_store = StorageEngine::temporary().expect("store");
    let (mut alice, alice_bridge) = connected_session(&hub, &alice_store, &clock).await;

    let profile = bob.next_frame().await.expect("profile");
    bob.handle_frame(&profile).await;

    clock.advance(1_000);
    alice.update_profile("  alice  ").await.expect("rename");
    let rename = bob.next_frame().await.expect("profile");
    bob.handle_frame(&rename).await;

    assert_eq!(alice.own_nick(), "alice");
    assert_eq!(bob.nickname(alice_bridge.address()), Some("alice"));
}

#[tokio::test]
async fn heartbeat_shares_the_self_throttle() {
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let storage = StorageEngine::temporary().expect("store");
    let (mut session, _) = connected_session(&hub, &storage, &clock).await;
    session.handle_frame(&Peer::new(28).msg("hello").await).await;

    clock.set(T0 + 11_500);
    session.send_message("just before").await.expect("send");
    clock.advance(500);
    let err = session.heartbeat_tick().await.expect_err("throttled");

    assert!(matches!(err, PubchatError::RateLimitExceeded { .. }));
    assert_eq!(session.last_heartbeat_ms(), None);
}

// ===========================================================================
// Persistence
// ===========================================================================

#[tokio::test]
async fn blocklist_and_nickname_survive_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let hub = LoopbackHub::new();
    let clock = ManualClock::new(T0);
    let peer = Peer::new(22);

    {
        let storage = StorageEngine::open(dir.path()).expect("open");
        let (mut session, _) = connected_session(&hub, &storage, &clock).await;
        session.update_profile("carol").await.ok();
        session.handle_frame(&peer.msg("hi carol").await).await;
        session.block(&peer.address).expect("block");
        session.disconnect().await;
        drop(session);
        storage.flush().expect("flush");
    }

    let storage = StorageEngine::open(dir.path()).expect("reopen");
    let (session, _) = connected_session(&hub, &storage, &clock).await;
    assert_eq!(session.own_nick(), "carol");
    assert!(session.is_blocked(&peer.address));
    assert_eq!(session.blocked_entries()[0].display_name, "mallory");
    assert!(session.messages().is_empty());
}
