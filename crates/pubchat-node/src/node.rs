//! Node lifecycle.
//!
//! The [`ChatNode`] owns a [`ChatSession`] and, once started, moves it
//! into the event loop task. External code talks to it through
//! channels:
//!
//! - [`NodeCommand`]s via [`ChatNode::command_sender`] or the typed
//!   wrappers on [`ChatHandle`].
//! - [`ChatEvent`]s via [`ChatNode::take_event_receiver`].
//!
//! # State machine
//!
//! ```text
//! Initializing ──start()──▶ Running ──shutdown()──▶ ShuttingDown ──▶ (dropped)
//! ```
//!
//! Double start and shutdown before start are rejected with
//! `PubchatError::ConfigError`.

use std::sync::Arc;

use pubchat_storage::blocklist::BlockEntry;
use pubchat_storage::engine::StorageEngine;
use pubchat_types::config::ChatConfig;
use pubchat_types::{Address, ChatEvent, ChatMessage, PubchatError, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::bridge::HostBridge;
use crate::clock::Clock;
use crate::command::{NodeCommand, NodeStatus};
use crate::event_loop;
use crate::session::{ChatSession, ConnectOutcome, Generation};

// ---------------------------------------------------------------------------
// Channel buffer sizes
// ---------------------------------------------------------------------------

/// Bounded command channel capacity.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// Bounded chat event channel capacity.
///
/// Larger than the command channel to absorb bursts of inbound
/// messages without dropping events.
const EVENT_CHANNEL_SIZE: usize = 1024;

/// How often the event loop asks the heartbeat schedule whether a ping
/// is due.
const HEARTBEAT_CHECK_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// NodeState
// ---------------------------------------------------------------------------

/// Lifecycle state of the node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// Session created, event loop not started.
    Initializing,
    /// Event loop is active.
    Running,
    /// Graceful shutdown in progress.
    ShuttingDown,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeRuntime (internal)
// ---------------------------------------------------------------------------

/// Owned runtime state moved into the event loop task.
pub(crate) struct NodeRuntime {
    pub session: ChatSession,
    pub storage: StorageEngine,
    pub command_rx: mpsc::Receiver<NodeCommand>,
    pub shutdown_rx: watch::Receiver<bool>,
    pub heartbeat_check_ms: u64,
    pub peer_poll_ms: u64,
}

// ---------------------------------------------------------------------------
// ChatNode
// ---------------------------------------------------------------------------

/// Chat node: owns the session and drives the event loop.
pub struct ChatNode {
    state: NodeState,
    runtime: Option<NodeRuntime>,
    command_tx: mpsc::Sender<NodeCommand>,
    event_rx: Option<mpsc::Receiver<ChatEvent>>,
    shutdown_tx: watch::Sender<bool>,
    generation: Generation,
}

impl ChatNode {
    /// Creates a node around a fresh session.
    ///
    /// # Errors
    ///
    /// - `PubchatError::ConfigError` if `config` is invalid.
    /// - `PubchatError::StorageError` if the store cannot be opened.
    pub fn new(
        config: ChatConfig,
        bridge: Arc<dyn HostBridge>,
        storage: StorageEngine,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let peer_poll_ms = config.peer_poll_interval_ms;

        let mut session = ChatSession::new(config, bridge, &storage, clock)?;
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        session.set_event_sender(event_tx);
        let generation = session.generation();

        Ok(Self {
            state: NodeState::Initializing,
            runtime: Some(NodeRuntime {
                session,
                storage,
                command_rx,
                shutdown_rx,
                heartbeat_check_ms: HEARTBEAT_CHECK_MS,
                peer_poll_ms,
            }),
            command_tx,
            event_rx: Some(event_rx),
            shutdown_tx,
            generation,
        })
    }

    /// Spawns the event loop. Transitions `Initializing → Running`.
    ///
    /// Returns the task handle; it resolves once the loop has exited.
    ///
    /// # Errors
    ///
    /// `PubchatError::ConfigError` if not in `Initializing` state.
    pub fn start(&mut self) -> Result<JoinHandle<()>> {
        if self.state != NodeState::Initializing {
            return Err(PubchatError::ConfigError {
                reason: format!(
                    "cannot start node in state '{}'; expected 'initializing'",
                    self.state,
                ),
            });
        }
        let runtime = self.runtime.take().ok_or_else(|| PubchatError::ConfigError {
            reason: "runtime already consumed".into(),
        })?;

        let handle = tokio::spawn(event_loop::run_event_loop(runtime));
        self.state = NodeState::Running;
        Ok(handle)
    }

    /// Signals the event loop to leave the room and exit.
    ///
    /// Idempotent once running.
    ///
    /// # Errors
    ///
    /// `PubchatError::ConfigError` if the node was never started.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.state {
            NodeState::Initializing => Err(PubchatError::ConfigError {
                reason: "cannot shutdown a node that has not been started".into(),
            }),
            NodeState::ShuttingDown => Ok(()),
            NodeState::Running => {
                self.state = NodeState::ShuttingDown;
                let _ = self.shutdown_tx.send(true);
                Ok(())
            }
        }
    }

    /// A cloneable command sender.
    pub fn command_sender(&self) -> mpsc::Sender<NodeCommand> {
        self.command_tx.clone()
    }

    /// Typed wrapper around the command channel.
    pub fn handle(&self) -> ChatHandle {
        ChatHandle {
            commands: self.command_tx.clone(),
            generation: self.generation.clone(),
        }
    }

    /// Takes the event receiver. `None` after the first call.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ChatEvent>> {
        self.event_rx.take()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> NodeState {
        self.state
    }
}

// ---------------------------------------------------------------------------
// ChatHandle
// ---------------------------------------------------------------------------

/// Async, typed access to a running node.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<NodeCommand>,
    generation: Generation,
}

impl ChatHandle {
    /// Connects to `room`.
    pub async fn connect(&self, room: &str) -> Result<ConnectOutcome> {
        self.request(|reply| NodeCommand::Connect {
            room: room.to_string(),
            reply,
        })
        .await?
    }

    /// Disconnects.
    ///
    /// The generation is bumped before the command is queued, so a
    /// connect still waiting on the bridge is discarded when it
    /// completes.
    pub async fn disconnect(&self) -> Result<()> {
        self.generation.bump();
        self.request(|reply| NodeCommand::Disconnect { reply }).await
    }

    /// Publishes a chat message.
    pub async fn send_message(&self, text: &str) -> Result<Option<ChatMessage>> {
        self.request(|reply| NodeCommand::SendMessage {
            text: text.to_string(),
            reply,
        })
        .await?
    }

    /// Changes and announces the own nickname.
    pub async fn update_profile(&self, nick: &str) -> Result<()> {
        self.request(|reply| NodeCommand::UpdateProfile {
            nick: nick.to_string(),
            reply,
        })
        .await?
    }

    /// Blocks `address` in the active room.
    pub async fn block(&self, address: &Address) -> Result<bool> {
        self.request(|reply| NodeCommand::Block {
            address: address.clone(),
            reply,
        })
        .await?
    }

    /// Unblocks `address` in the active room.
    pub async fn unblock(&self, address: &Address) -> Result<bool> {
        self.request(|reply| NodeCommand::Unblock {
            address: address.clone(),
            reply,
        })
        .await?
    }

    /// Clears the stored history of the active room.
    pub async fn clear_history(&self) -> Result<usize> {
        self.request(|reply| NodeCommand::ClearHistory { reply })
            .await?
    }

    /// Displayed messages.
    pub async fn messages(&self) -> Result<Vec<ChatMessage>> {
        self.request(|reply| NodeCommand::ListMessages { reply }).await
    }

    /// Blocklist of the active room.
    pub async fn blocked(&self) -> Result<Vec<BlockEntry>> {
        self.request(|reply| NodeCommand::ListBlocked { reply }).await
    }

    /// Status snapshot.
    pub async fn status(&self) -> Result<NodeStatus> {
        self.request(|reply| NodeCommand::GetStatus { reply }).await
    }

    /// Asks the event loop to exit.
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(NodeCommand::Shutdown)
            .await
            .map_err(|_| node_gone())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> NodeCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| node_gone())?;
        rx.await.map_err(|_| node_gone())
    }
}

fn node_gone() -> PubchatError {
    PubchatError::NotConnected {
        reason: "node event loop is not running".into(),
    }
}
