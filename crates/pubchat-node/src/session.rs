//! Session and heartbeat controller.
//!
//! A [`ChatSession`] owns everything tied to one room subscription: the
//! replay guard, the spam filter, receive statistics, the message view
//! and the heartbeat schedule. The blocklist, nickname directory and
//! message history live in the durable store and survive reconnects.
//!
//! # State machine
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting(g) ──subscribed──▶ Connected(g)
//!      ▲                            │                            │
//!      └────── failure / stale ─────┘◀──────── disconnect() ─────┘
//! ```
//!
//! Every connect and disconnect bumps the shared [`Generation`]. Work
//! that started under an older generation is discarded when it
//! completes, which is how a disconnect issued while a connect is still
//! waiting on the bridge wins.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pubchat_crypto::random::random_hex;
use pubchat_protocol::nonce::ReplayGuard;
use pubchat_protocol::pow::MinedPayload;
use pubchat_protocol::validation::normalize_text;
use pubchat_storage::blocklist::BlockEntry;
use pubchat_storage::engine::StorageEngine;
use pubchat_storage::messages::MessageStore;
use pubchat_storage::settings::SettingsStore;
use pubchat_types::config::ChatConfig;
use pubchat_types::{
    sanitize_nick, Address, BlockReason, ChatEvent, ChatMessage, FrameKind, MessageId,
    PubchatError, Result, Topic,
};
use tokio::sync::mpsc;

use crate::blocklist::BlocklistManager;
use crate::bridge::{HostBridge, Identity, SubscriptionHandle};
use crate::clock::Clock;
use crate::directory::NicknameDirectory;
use crate::heartbeat::{HeartbeatDecision, HeartbeatSchedule};
use crate::incoming::RxStats;
use crate::outgoing::{self, MiningTask, OutboundFrame};
use crate::spam_filter::{SpamConfig, SpamFilter};

/// Prefix of the generated default nickname.
const DEFAULT_NICK_PREFIX: &str = "anon-";

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Monotonic connection counter shared between a session and its
/// handles.
#[derive(Clone, Debug, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    /// Current value.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Increments the counter and returns the new value.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns `true` if `generation` is still the latest.
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Connection state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// No subscription.
    Disconnected,
    /// Waiting on the bridge.
    Connecting {
        /// Generation of the attempt.
        generation: u64,
    },
    /// Subscribed and processing frames.
    Connected {
        /// Generation of the connection.
        generation: u64,
    },
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting { generation } => write!(f, "connecting({generation})"),
            Self::Connected { generation } => write!(f, "connected({generation})"),
        }
    }
}

/// How a connect attempt ended, when it did not fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectOutcome {
    /// Now connected.
    Connected,
    /// Already connected to that room; nothing changed.
    AlreadyConnected,
    /// A newer connect or a disconnect superseded this one.
    Superseded,
}

// ---------------------------------------------------------------------------
// MessageView
// ---------------------------------------------------------------------------

/// Bounded in-memory list of displayed messages, oldest first.
#[derive(Clone, Debug)]
pub struct MessageView {
    max: usize,
    trim_to: usize,
    items: Vec<ChatMessage>,
}

impl MessageView {
    /// Creates an empty view holding at most `max` messages.
    ///
    /// Appending to a full view first drops all but the newest
    /// `trim_to`.
    pub fn new(max: usize, trim_to: usize) -> Self {
        let max = max.max(1);
        Self {
            max,
            trim_to: trim_to.clamp(1, max),
            items: Vec::new(),
        }
    }

    /// Appends a message.
    pub fn push(&mut self, msg: ChatMessage) {
        if self.items.len() >= self.max {
            let excess = self.items.len() - self.trim_to;
            self.items.drain(..excess);
        }
        self.items.push(msg);
    }

    /// Replaces the contents, keeping at most the newest `max`.
    pub fn replace(&mut self, mut items: Vec<ChatMessage>) {
        if items.len() > self.max {
            items.drain(..items.len() - self.max);
        }
        self.items = items;
    }

    /// Removes every message from `sender`. Returns how many went.
    pub fn purge_sender(&mut self, sender: &Address) -> usize {
        let before = self.items.len();
        self.items.retain(|m| &m.sender != sender);
        before - self.items.len()
    }

    /// Returns `true` if a message with `id` is displayed.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.items.iter().any(|m| &m.id == id)
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Displayed messages, oldest first.
    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.items
    }

    /// Number of displayed messages.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is displayed.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ChatSession
// ---------------------------------------------------------------------------

/// One user's view of one room at a time.
pub struct ChatSession {
    pub(crate) config: ChatConfig,
    pub(crate) bridge: Arc<dyn HostBridge>,
    pub(crate) clock: Arc<dyn Clock>,
    messages: MessageStore,
    settings: SettingsStore,
    pub(crate) generation: Generation,
    state: SessionState,
    pub(crate) topic: Option<Topic>,
    pub(crate) identity: Option<Identity>,
    subscription: Option<SubscriptionHandle>,
    frames: Option<mpsc::Receiver<Vec<u8>>>,
    own_nick: String,
    pub(crate) blocklist: BlocklistManager,
    pub(crate) directory: NicknameDirectory,
    pub(crate) spam: SpamFilter,
    pub(crate) replay: ReplayGuard,
    pub(crate) view: MessageView,
    pub(crate) rx_stats: RxStats,
    last_sent_ms: Option<i64>,
    heartbeat: HeartbeatSchedule,
    peers: Vec<String>,
    last_peer_seen_ms: Option<i64>,
    pub(crate) last_remote_seen_ms: Option<i64>,
    events: Option<mpsc::Sender<ChatEvent>>,
}

impl ChatSession {
    /// Creates a disconnected session.
    ///
    /// The own nickname is the last one persisted, or `anon-` followed
    /// by three random hex characters.
    ///
    /// # Errors
    ///
    /// - [`PubchatError::ConfigError`] if `config` is invalid.
    /// - [`PubchatError::StorageError`] if the store trees cannot be
    ///   opened.
    pub fn new(
        config: ChatConfig,
        bridge: Arc<dyn HostBridge>,
        storage: &StorageEngine,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let settings = storage.settings()?;
        let own_nick = match settings.own_nick() {
            Ok(Some(nick)) => nick,
            Ok(None) => format!("{DEFAULT_NICK_PREFIX}{}", random_hex(3)),
            Err(e) => {
                tracing::warn!(%e, "failed to read own nickname");
                format!("{DEFAULT_NICK_PREFIX}{}", random_hex(3))
            }
        };

        Ok(Self {
            spam: SpamFilter::new(SpamConfig::from(&config)),
            replay: ReplayGuard::new(config.nonce_history_max, config.nonce_history_keep),
            view: MessageView::new(config.view_max, config.view_trim_to),
            heartbeat: HeartbeatSchedule::new(
                config.heartbeat_first_delay_ms,
                config.heartbeat_interval_ms,
            ),
            blocklist: BlocklistManager::new(storage.blocklists()?),
            directory: NicknameDirectory::new(storage.nicknames()?),
            messages: storage.messages()?,
            settings,
            config,
            bridge,
            clock,
            generation: Generation::default(),
            state: SessionState::Disconnected,
            topic: None,
            identity: None,
            subscription: None,
            frames: None,
            own_nick,
            rx_stats: RxStats::default(),
            last_sent_ms: None,
            peers: Vec::new(),
            last_peer_seen_ms: None,
            last_remote_seen_ms: None,
            events: None,
        })
    }

    /// Routes [`ChatEvent`]s to `tx`.
    pub fn set_event_sender(&mut self, tx: mpsc::Sender<ChatEvent>) {
        self.events = Some(tx);
    }

    // -----------------------------------------------------------------------
    // Connect / disconnect
    // -----------------------------------------------------------------------

    /// Subscribes to `room`.
    ///
    /// Resets all per-session abuse and replay state, loads the room's
    /// blocklist, nicknames and history, subscribes, then announces the
    /// own nickname with a signed `profile` frame. A failed announcement
    /// does not fail the connect.
    ///
    /// # Errors
    ///
    /// - [`PubchatError::InvalidPayload`] if `room` is blank.
    /// - Bridge errors from identity lookup or subscribe. The session is
    ///   left disconnected.
    pub async fn connect(&mut self, room: &str) -> Result<ConnectOutcome> {
        let room = room.trim().to_lowercase();
        if room.is_empty() {
            return Err(PubchatError::InvalidPayload {
                reason: "room name is empty".into(),
            });
        }
        let topic = Topic::for_room(&self.config.topic_prefix, &room);

        if matches!(self.state, SessionState::Connected { .. }) {
            if self.topic.as_ref() == Some(&topic) {
                return Ok(ConnectOutcome::AlreadyConnected);
            }
            self.disconnect().await;
        }

        let generation = self.generation.bump();
        self.state = SessionState::Connecting { generation };
        self.reset_session_state();
        tracing::info!(%topic, generation, "connecting");

        let identity = match self.bridge.active_identity().await {
            Ok(identity) => identity,
            Err(e) => return Err(self.fail_connect(generation, e)),
        };
        if !self.generation.is_current(generation) {
            self.state = SessionState::Disconnected;
            return Ok(ConnectOutcome::Superseded);
        }

        self.activate_topic(&topic);
        let now = self.clock.now_ms();
        self.directory.observe(&identity.address, &self.own_nick, now);

        let subscription = match self.bridge.subscribe(&topic).await {
            Ok(sub) => sub,
            Err(e) => return Err(self.fail_connect(generation, e)),
        };
        if !self.generation.is_current(generation) {
            tracing::info!(%topic, generation, "discarding stale subscription");
            if let Err(e) = self.bridge.unsubscribe(subscription.handle).await {
                tracing::warn!(%e, "failed to release stale subscription");
            }
            self.state = SessionState::Disconnected;
            return Ok(ConnectOutcome::Superseded);
        }

        self.state = SessionState::Connected { generation };
        self.subscription = Some(subscription.handle);
        self.frames = Some(subscription.frames);
        self.heartbeat.start(self.clock.now_ms());
        self.emit(ChatEvent::Connected {
            topic: topic.clone(),
            address: identity.address.clone(),
        });
        tracing::info!(%topic, address = %identity.address, "connected");
        self.identity = Some(identity);

        if let Err(e) = self.publish(FrameKind::Profile, None).await {
            tracing::warn!(%e, "profile announcement failed");
        }
        Ok(ConnectOutcome::Connected)
    }

    /// Drops the subscription and clears live status.
    ///
    /// Invalidates any connect still in flight. The topic stays
    /// selected so its view and blocklist remain readable.
    pub async fn disconnect(&mut self) {
        self.generation.bump();
        let was_live = !matches!(self.state, SessionState::Disconnected);
        self.state = SessionState::Disconnected;
        self.frames = None;
        if let Some(handle) = self.subscription.take() {
            if let Err(e) = self.bridge.unsubscribe(handle).await {
                tracing::warn!(%e, "unsubscribe failed");
            }
        }
        self.identity = None;
        self.peers.clear();
        self.heartbeat.stop();
        if was_live {
            tracing::info!(topic = ?self.topic.as_ref().map(Topic::as_str), "disconnected");
            self.emit(ChatEvent::Disconnected);
        }
    }

    fn fail_connect(&mut self, generation: u64, error: PubchatError) -> PubchatError {
        if self.generation.is_current(generation) {
            self.state = SessionState::Disconnected;
        }
        tracing::warn!(%error, "connect failed");
        self.emit(ChatEvent::ConnectFailed {
            reason: error.to_string(),
        });
        error
    }

    fn reset_session_state(&mut self) {
        self.spam.reset();
        self.replay.reset();
        self.rx_stats = RxStats::default();
        self.peers.clear();
        self.last_peer_seen_ms = None;
        self.last_remote_seen_ms = None;
        self.heartbeat.stop();
    }

    fn activate_topic(&mut self, topic: &Topic) {
        self.topic = Some(topic.clone());
        self.blocklist.load(topic);
        self.directory.load(topic);
        self.reload_view();
    }

    /// Refills the view from the store, skipping blocked senders.
    ///
    /// Every loaded id, shown or not, is marked as seen.
    fn reload_view(&mut self) {
        let Some(topic) = &self.topic else {
            return;
        };
        match self.messages.recent(topic, self.config.clamped_history_limit()) {
            Ok(history) => {
                for msg in &history {
                    self.replay.remember_id(msg.id.clone());
                }
                let visible: Vec<ChatMessage> = history
                    .into_iter()
                    .filter(|m| !self.blocklist.is_blocked(&m.sender))
                    .collect();
                tracing::debug!(%topic, count = visible.len(), "history loaded");
                self.view.replace(visible);
            }
            Err(e) => {
                tracing::warn!(%topic, %e, "failed to load history");
                self.view.clear();
            }
        }
    }

    /// Waits for the next raw frame on the active subscription.
    ///
    /// Pends forever while disconnected. Returns `None` once when the
    /// bridge closes the subscription.
    pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
        match self.frames.as_mut() {
            Some(rx) => {
                let frame = rx.recv().await;
                if frame.is_none() {
                    tracing::warn!("subscription closed by bridge");
                    self.frames = None;
                }
                frame
            }
            None => std::future::pending().await,
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Publishes a chat message and echoes it locally.
    ///
    /// Blank text is a no-op and returns `Ok(None)`. If the session was
    /// disconnected while the frame was in flight, the sent message is
    /// stored and returned but not added to the view.
    ///
    /// # Errors
    ///
    /// - [`PubchatError::InvalidPayload`] if the trimmed text is too long.
    /// - [`PubchatError::NotConnected`] without a live subscription.
    /// - [`PubchatError::RateLimitExceeded`] if the previous outbound
    ///   frame went out less than the rate interval ago.
    /// - Mining, signing and publish errors.
    pub async fn send_message(&mut self, text: &str) -> Result<Option<ChatMessage>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let text = normalize_text(text, self.config.max_text_len)?;
        let generation = self.generation.current();
        let (identity, topic, nonce, ts) = match self.publish(FrameKind::Msg, Some(&text)).await {
            Ok(sent) => sent,
            Err(e) => {
                self.emit(ChatEvent::SendFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };
        let msg = ChatMessage {
            id: MessageId::new(&identity.address, &nonce),
            topic,
            sender: identity.address.clone(),
            text,
            timestamp_ms: ts,
        };
        if !self.generation.is_current(generation) {
            tracing::info!(id = %msg.id, "sent after the session changed; stored only");
            if let Err(e) = self.messages.put(&msg) {
                tracing::warn!(id = %msg.id, %e, "failed to store message");
            }
            return Ok(Some(msg));
        }

        self.replay.remember_id(msg.id.clone());
        self.replay.record_nonce(&identity.address, &nonce);
        self.accept_message(msg.clone());
        Ok(Some(msg))
    }

    /// Changes the own nickname and announces it when connected.
    ///
    /// The nickname is persisted even if the announcement fails.
    ///
    /// # Errors
    ///
    /// - [`PubchatError::InvalidPayload`] if the nickname is blank.
    /// - Throttle, signing and publish errors from the announcement.
    pub async fn update_profile(&mut self, nick: &str) -> Result<()> {
        let nick = sanitize_nick(nick).ok_or_else(|| PubchatError::InvalidPayload {
            reason: "nickname is empty".into(),
        })?;
        self.own_nick = nick.clone();
        if let Err(e) = self.settings.set_own_nick(&nick) {
            tracing::warn!(%e, "failed to persist own nickname");
        }

        let Some(address) = self.identity.as_ref().map(|i| i.address.clone()) else {
            return Ok(());
        };
        let now = self.clock.now_ms();
        if let Some(changed) = self.directory.observe(&address, &nick, now) {
            self.emit(ChatEvent::NicknameChanged {
                address,
                nickname: changed,
            });
        }

        if let Err(e) = self.publish(FrameKind::Profile, None).await {
            self.emit(ChatEvent::SendFailed {
                reason: e.to_string(),
            });
            return Err(e);
        }
        Ok(())
    }

    /// Runs one heartbeat check.
    ///
    /// # Errors
    ///
    /// Errors from publishing a due ping.
    pub async fn heartbeat_tick(&mut self) -> Result<HeartbeatDecision> {
        if !self.is_connected() {
            return Ok(HeartbeatDecision::NotDue);
        }
        let now = self.clock.now_ms();
        let observed = self.peer_observed();
        let decision = self.heartbeat.poll(now, observed);
        match decision {
            HeartbeatDecision::Send => {
                self.publish(FrameKind::Ping, None).await?;
                self.heartbeat.mark_sent(now);
                tracing::debug!("heartbeat sent");
            }
            HeartbeatDecision::SkipAlone => tracing::debug!("heartbeat skipped, no peers"),
            HeartbeatDecision::SkipRecent | HeartbeatDecision::NotDue => {}
        }
        Ok(decision)
    }

    /// Throttles, mines, signs and publishes one frame.
    ///
    /// Returns the identity, topic, nonce and timestamp used.
    async fn publish(
        &mut self,
        kind: FrameKind,
        text: Option<&str>,
    ) -> Result<(Identity, Topic, String, i64)> {
        let (identity, topic) = match (&self.identity, &self.topic, self.state) {
            (Some(identity), Some(topic), SessionState::Connected { .. }) => {
                (identity.clone(), topic.clone())
            }
            _ => {
                return Err(PubchatError::NotConnected {
                    reason: "not connected to a room".into(),
                })
            }
        };

        let now = self.clock.now_ms();
        if let Some(last) = self.last_sent_ms {
            if now - last < self.config.rate_limit_interval_ms {
                return Err(PubchatError::RateLimitExceeded {
                    reason: format!(
                        "one frame per {} ms, last sent {} ms ago",
                        self.config.rate_limit_interval_ms,
                        now - last
                    ),
                });
            }
        }

        let fields = outgoing::signed_fields(
            &identity,
            &OutboundFrame {
                kind,
                topic: &topic,
                nick: &self.own_nick,
                ts_ms: now,
                text,
            },
        );
        let mined = self.mine_while_receiving(kind, fields).await?;
        let mined =
            outgoing::sign_and_publish(self.bridge.as_ref(), &identity, kind, &topic, mined)
                .await?;
        self.last_sent_ms = Some(now);
        Ok((identity, topic, mined.nonce, now))
    }

    /// Mines on a separate task and handles inbound frames until the
    /// nonce is found.
    async fn mine_while_receiving(
        &mut self,
        kind: FrameKind,
        fields: BTreeMap<String, String>,
    ) -> Result<MinedPayload> {
        let mut mining = MiningTask::spawn(kind, fields, &self.config);
        loop {
            tokio::select! {
                mined = mining.finish() => return mined,
                frame = self.next_frame() => {
                    if let Some(bytes) = frame {
                        self.handle_frame(&bytes).await;
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Blocklist
    // -----------------------------------------------------------------------

    /// Blocks `address` in the active room and purges it from the view.
    ///
    /// Returns `false` if it was already blocked or is the own address.
    ///
    /// # Errors
    ///
    /// [`PubchatError::NotConnected`] if no room was ever selected.
    pub fn block(&mut self, address: &Address) -> Result<bool> {
        self.require_topic()?;
        Ok(self.block_sender(address, None, BlockReason::Manual))
    }

    /// Unblocks `address` and restores its stored history to the view.
    ///
    /// # Errors
    ///
    /// [`PubchatError::NotConnected`] if no room was ever selected.
    pub fn unblock(&mut self, address: &Address) -> Result<bool> {
        self.require_topic()?;
        if !self.blocklist.unblock(address) {
            return Ok(false);
        }
        self.reload_view();
        self.emit(ChatEvent::SenderUnblocked {
            address: address.clone(),
        });
        Ok(true)
    }

    pub(crate) fn block_sender(
        &mut self,
        address: &Address,
        nick: Option<&str>,
        reason: BlockReason,
    ) -> bool {
        if self.identity.as_ref().is_some_and(|i| &i.address == address) {
            tracing::debug!(%address, "refusing to block own address");
            return false;
        }
        let display_name = nick
            .map(str::to_string)
            .unwrap_or_else(|| self.directory.display_name(address));
        let now = self.clock.now_ms();
        if !self.blocklist.block(address, &display_name, reason, now) {
            return false;
        }
        let purged = self.view.purge_sender(address);
        tracing::debug!(%address, purged, "purged blocked sender from view");
        self.emit(ChatEvent::SenderBlocked {
            address: address.clone(),
            reason,
        });
        true
    }

    /// Blocklist of the active room, most recent first.
    pub fn blocked_entries(&self) -> Vec<BlockEntry> {
        self.blocklist.entries()
    }

    /// Returns `true` if `address` is blocked in the active room.
    pub fn is_blocked(&self, address: &Address) -> bool {
        self.blocklist.is_blocked(address)
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Deletes the stored history of the active room and empties the
    /// view. Returns the number of stored messages removed.
    ///
    /// # Errors
    ///
    /// - [`PubchatError::NotConnected`] if no room was ever selected.
    /// - [`PubchatError::StorageError`] if the delete fails.
    pub fn clear_history(&mut self) -> Result<usize> {
        let topic = self.require_topic()?.clone();
        let removed = self.messages.clear(&topic)?;
        self.view.clear();
        Ok(removed)
    }

    /// Returns `true` if the store already holds `id` for `topic`.
    pub(crate) fn is_stored(&self, topic: &Topic, id: &MessageId) -> bool {
        match self.messages.get(topic, id) {
            Ok(found) => found.is_some(),
            Err(e) => {
                tracing::warn!(%id, %e, "failed to look up message");
                false
            }
        }
    }

    /// Appends an accepted message to the view and the store.
    ///
    /// An id already in the view is ignored.
    pub(crate) fn accept_message(&mut self, msg: ChatMessage) {
        if self.view.contains(&msg.id) {
            tracing::debug!(id = %msg.id, "message already displayed");
            return;
        }
        if let Err(e) = self.messages.put(&msg) {
            tracing::warn!(id = %msg.id, %e, "failed to store message");
        }
        self.view.push(msg.clone());
        self.emit(ChatEvent::MessageAdded(msg));
    }

    // -----------------------------------------------------------------------
    // Peers
    // -----------------------------------------------------------------------

    /// Refreshes the peer list from the bridge. Returns the peer count.
    ///
    /// # Errors
    ///
    /// Bridge errors from `list_peers`.
    pub async fn poll_peers(&mut self) -> Result<usize> {
        let Some(topic) = self.topic.clone().filter(|_| self.is_connected()) else {
            return Ok(0);
        };
        let generation = self.generation.current();
        let peers = self.bridge.list_peers(&topic).await?;
        if !self.generation.is_current(generation) {
            return Ok(self.peers.len());
        }
        if !peers.is_empty() {
            self.last_peer_seen_ms = Some(self.clock.now_ms());
        }
        self.peers = peers;
        Ok(self.peers.len())
    }

    /// Peers reported by the last poll.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// `true` when no peer is listed and nobody has been seen for the
    /// configured stale period.
    pub fn is_alone(&self) -> bool {
        if !self.peers.is_empty() {
            return false;
        }
        let last_seen = self.last_peer_seen_ms.max(self.last_remote_seen_ms);
        match last_seen {
            Some(t) => self.clock.now_ms() - t >= self.config.peer_stale_ms,
            None => true,
        }
    }

    fn peer_observed(&self) -> bool {
        self.last_peer_seen_ms.is_some() || self.last_remote_seen_ms.is_some()
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` while subscribed.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected { .. })
    }

    /// The shared generation counter.
    pub fn generation(&self) -> Generation {
        self.generation.clone()
    }

    /// The selected room's topic.
    pub fn topic(&self) -> Option<&Topic> {
        self.topic.as_ref()
    }

    /// Own address while connected.
    pub fn address(&self) -> Option<&Address> {
        self.identity.as_ref().map(|i| &i.address)
    }

    /// Own nickname.
    pub fn own_nick(&self) -> &str {
        &self.own_nick
    }

    /// Known nickname of `address` in the active room.
    pub fn nickname(&self, address: &Address) -> Option<&str> {
        self.directory.get(address)
    }

    /// Displayed messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        self.view.as_slice()
    }

    /// Receive diagnostics since the last connect.
    pub fn rx_stats(&self) -> &RxStats {
        &self.rx_stats
    }

    /// Time of the last published heartbeat.
    pub fn last_heartbeat_ms(&self) -> Option<i64> {
        self.heartbeat.last_sent()
    }

    fn require_topic(&self) -> Result<&Topic> {
        self.topic.as_ref().ok_or_else(|| PubchatError::NotConnected {
            reason: "no room selected".into(),
        })
    }

    pub(crate) fn emit(&self, event: ChatEvent) {
        if let Some(tx) = &self.events {
            if let Err(e) = tx.try_send(event) {
                tracing::warn!(%e, "dropping chat event");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(sender: &str, n: usize) -> ChatMessage {
        let sender = match Address::new(sender) {
            Ok(a) => a,
            Err(e) => panic!("test address: {e}"),
        };
        ChatMessage {
            id: MessageId::new(&sender, &n.to_string()),
            topic: Topic::from_raw("t/lobby"),
            sender,
            text: format!("m{n}"),
            timestamp_ms: n as i64,
        }
    }

    #[test]
    fn view_trims_before_appending_past_cap() {
        let mut view = MessageView::new(240, 200);
        for i in 0..240 {
            view.push(msg("lmn1a", i));
        }
        assert_eq!(view.len(), 240);
        view.push(msg("lmn1a", 240));
        assert_eq!(view.len(), 201);
        assert_eq!(view.as_slice()[0].text, "m40");
        assert_eq!(view.as_slice()[200].text, "m240");
    }

    #[test]
    fn purge_removes_only_sender() {
        let mut view = MessageView::new(10, 5);
        view.push(msg("lmn1a", 0));
        view.push(msg("lmn1b", 1));
        view.push(msg("lmn1a", 2));
        let bad = match Address::new("lmn1a") {
            Ok(a) => a,
            Err(e) => panic!("{e}"),
        };
        assert_eq!(view.purge_sender(&bad), 2);
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn generation_clones_share_counter() {
        let g = Generation::default();
        let other = g.clone();
        let first = g.bump();
        assert!(other.is_current(first));
        other.bump();
        assert!(!g.is_current(first));
    }
}
