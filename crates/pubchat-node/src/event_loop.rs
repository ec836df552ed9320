//! Main event loop driving the chat session.
//!
//! [`run_event_loop`] is spawned as a tokio task by
//! [`ChatNode::start`](crate::node::ChatNode::start). It uses
//! `tokio::select!` to multiplex:
//!
//! 1. **Inbound frames** from the active subscription.
//! 2. **Commands** from handles.
//! 3. **Heartbeat tick** — asks the schedule whether a ping is due.
//! 4. **Peer poll tick** — refreshes the peer list while connected.
//! 5. **Shutdown signal** — graceful exit via `watch` channel.
//!
//! Everything runs on this one task, so session state needs no locks.
//! Mining runs on its own task; inbound frames are still handled while
//! a send waits for it. Commands queue until the send completes.

use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::command::{NodeCommand, NodeStatus};
use crate::node::{NodeRuntime, NodeState};
use crate::session::ChatSession;

// ---------------------------------------------------------------------------
// Event loop entry point
// ---------------------------------------------------------------------------

/// Runs the node event loop until shutdown is signalled.
pub(crate) async fn run_event_loop(mut rt: NodeRuntime) {
    tracing::info!("chat event loop started");

    let mut heartbeat_tick = tokio::time::interval(Duration::from_millis(rt.heartbeat_check_ms));
    heartbeat_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut peer_tick = tokio::time::interval(Duration::from_millis(rt.peer_poll_ms));
    peer_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // ---------------------------------------------------------------
            // 1. Inbound frames.
            // ---------------------------------------------------------------
            frame = rt.session.next_frame() => {
                if let Some(bytes) = frame {
                    rt.session.handle_frame(&bytes).await;
                }
            }

            // ---------------------------------------------------------------
            // 2. Commands.
            // ---------------------------------------------------------------
            Some(cmd) = rt.command_rx.recv() => {
                tracing::trace!(?cmd, "command received");
                if handle_command(cmd, &mut rt.session).await {
                    tracing::info!("shutdown command received -- exiting event loop");
                    break;
                }
            }

            // ---------------------------------------------------------------
            // 3. Heartbeat.
            // ---------------------------------------------------------------
            _ = heartbeat_tick.tick() => {
                if let Err(e) = rt.session.heartbeat_tick().await {
                    tracing::debug!(%e, "heartbeat not sent");
                }
            }

            // ---------------------------------------------------------------
            // 4. Peer presence.
            // ---------------------------------------------------------------
            _ = peer_tick.tick() => {
                if let Err(e) = rt.session.poll_peers().await {
                    tracing::debug!(%e, "peer poll failed");
                }
            }

            // ---------------------------------------------------------------
            // 5. Shutdown signal.
            // ---------------------------------------------------------------
            changed = rt.shutdown_rx.changed() => {
                if changed.is_err() || *rt.shutdown_rx.borrow() {
                    tracing::info!("shutdown signal received -- exiting event loop");
                    break;
                }
            }
        }
    }

    shutdown_sequence(&mut rt).await;
    tracing::info!("chat event loop exited");
}

// ---------------------------------------------------------------------------
// Command handler
// ---------------------------------------------------------------------------

/// Handles one command. Returns `true` if the loop should exit.
///
/// Reply send errors mean the caller stopped waiting; they are ignored.
async fn handle_command(cmd: NodeCommand, session: &mut ChatSession) -> bool {
    match cmd {
        NodeCommand::Connect { room, reply } => {
            let _ = reply.send(session.connect(&room).await);
        }
        NodeCommand::Disconnect { reply } => {
            session.disconnect().await;
            let _ = reply.send(());
        }
        NodeCommand::SendMessage { text, reply } => {
            let _ = reply.send(session.send_message(&text).await);
        }
        NodeCommand::UpdateProfile { nick, reply } => {
            let _ = reply.send(session.update_profile(&nick).await);
        }
        NodeCommand::Block { address, reply } => {
            let _ = reply.send(session.block(&address));
        }
        NodeCommand::Unblock { address, reply } => {
            let _ = reply.send(session.unblock(&address));
        }
        NodeCommand::ClearHistory { reply } => {
            let _ = reply.send(session.clear_history());
        }
        NodeCommand::ListMessages { reply } => {
            let _ = reply.send(session.messages().to_vec());
        }
        NodeCommand::ListBlocked { reply } => {
            let _ = reply.send(session.blocked_entries());
        }
        NodeCommand::GetStatus { reply } => {
            let _ = reply.send(status_snapshot(session));
        }
        NodeCommand::Shutdown => return true,
    }
    false
}

fn status_snapshot(session: &ChatSession) -> NodeStatus {
    NodeStatus {
        state: NodeState::Running,
        session: session.state(),
        topic: session.topic().cloned(),
        address: session.address().cloned(),
        nickname: session.own_nick().to_string(),
        peer_count: session.peer_count(),
        alone: session.is_alone(),
        rx: session.rx_stats().clone(),
        displayed: session.messages().len(),
        blocked: session.blocked_entries().len(),
    }
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// Leaves the room and flushes the store.
async fn shutdown_sequence(rt: &mut NodeRuntime) {
    rt.session.disconnect().await;
    match rt.storage.flush() {
        Ok(()) => tracing::info!("storage flushed"),
        Err(e) => tracing::error!(%e, "storage flush failed during shutdown"),
    }
}
