//! Commands and status types for driving a running node.
//!
//! [`NodeCommand`] is the bounded-channel message type that a UI, the
//! demo binary or tests use to drive the node. Commands that produce a
//! result carry a `tokio::sync::oneshot::Sender` for the reply.
//!
//! All commands are processed one at a time inside the event loop, so
//! they never race with inbound frame handling.

use pubchat_storage::blocklist::BlockEntry;
use pubchat_types::{Address, ChatMessage, Result, Topic};
use tokio::sync::oneshot;

use crate::incoming::RxStats;
use crate::node::NodeState;
use crate::session::{ConnectOutcome, SessionState};

// ---------------------------------------------------------------------------
// NodeCommand
// ---------------------------------------------------------------------------

/// Commands accepted by the node event loop.
pub enum NodeCommand {
    /// Subscribe to a room.
    Connect {
        /// Room name; lower-cased before use.
        room: String,
        /// Reply channel.
        reply: oneshot::Sender<Result<ConnectOutcome>>,
    },

    /// Drop the current subscription.
    Disconnect {
        /// Acknowledged once the subscription is released.
        reply: oneshot::Sender<()>,
    },

    /// Publish a chat message. Replies with the locally echoed message,
    /// or `None` for blank text.
    SendMessage {
        /// Message text.
        text: String,
        /// Reply channel.
        reply: oneshot::Sender<Result<Option<ChatMessage>>>,
    },

    /// Change the own nickname and announce it.
    UpdateProfile {
        /// New nickname.
        nick: String,
        /// Reply channel.
        reply: oneshot::Sender<Result<()>>,
    },

    /// Block a sender in the active room.
    Block {
        /// Sender to block.
        address: Address,
        /// `true` if the address was newly blocked.
        reply: oneshot::Sender<Result<bool>>,
    },

    /// Unblock a sender in the active room.
    Unblock {
        /// Sender to unblock.
        address: Address,
        /// `true` if the address was blocked before.
        reply: oneshot::Sender<Result<bool>>,
    },

    /// Delete the stored history of the active room.
    ClearHistory {
        /// Number of stored messages removed.
        reply: oneshot::Sender<Result<usize>>,
    },

    /// Displayed messages of the active room.
    ListMessages {
        /// Reply channel.
        reply: oneshot::Sender<Vec<ChatMessage>>,
    },

    /// Blocklist of the active room, most recent first.
    ListBlocked {
        /// Reply channel.
        reply: oneshot::Sender<Vec<BlockEntry>>,
    },

    /// Status snapshot.
    GetStatus {
        /// Reply channel.
        reply: oneshot::Sender<NodeStatus>,
    },

    /// Leave the room and stop the event loop. Await the task handle
    /// returned by [`ChatNode::start`](crate::node::ChatNode::start) to
    /// confirm completion.
    Shutdown,
}

// Manual Debug because oneshot::Sender does not implement Debug.
impl std::fmt::Debug for NodeCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect { room, .. } => f
                .debug_struct("Connect")
                .field("room", room)
                .finish_non_exhaustive(),
            Self::Disconnect { .. } => f.write_str("Disconnect"),
            Self::SendMessage { text, .. } => f
                .debug_struct("SendMessage")
                .field("len", &text.chars().count())
                .finish_non_exhaustive(),
            Self::UpdateProfile { nick, .. } => f
                .debug_struct("UpdateProfile")
                .field("nick", nick)
                .finish_non_exhaustive(),
            Self::Block { address, .. } => f
                .debug_struct("Block")
                .field("address", address)
                .finish_non_exhaustive(),
            Self::Unblock { address, .. } => f
                .debug_struct("Unblock")
                .field("address", address)
                .finish_non_exhaustive(),
            Self::ClearHistory { .. } => f.write_str("ClearHistory"),
            Self::ListMessages { .. } => f.write_str("ListMessages"),
            Self::ListBlocked { .. } => f.write_str("ListBlocked"),
            Self::GetStatus { .. } => f.write_str("GetStatus"),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeStatus
// ---------------------------------------------------------------------------

/// Snapshot of the node's current state.
///
/// Returned by [`NodeCommand::GetStatus`]. Everything is cloned out of
/// the session so the reply is self-contained.
#[derive(Clone, Debug)]
pub struct NodeStatus {
    /// Node lifecycle state.
    pub state: NodeState,
    /// Session connection state.
    pub session: SessionState,
    /// Selected room topic.
    pub topic: Option<Topic>,
    /// Own address while connected.
    pub address: Option<Address>,
    /// Own nickname.
    pub nickname: String,
    /// Peers reported by the last poll.
    pub peer_count: usize,
    /// No peers and nobody seen recently.
    pub alone: bool,
    /// Receive diagnostics.
    pub rx: RxStats,
    /// Messages in the view.
    pub displayed: usize,
    /// Blocked addresses in the active room.
    pub blocked: usize,
}
