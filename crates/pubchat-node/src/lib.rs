//! pubchat node runtime.
//!
//! Ties the protocol and storage crates into a running chat client: the
//! host bridge abstraction and an in-process implementation, the abuse
//! detector and blocklist, the ingress pipeline, the session and
//! heartbeat controller, and the tokio event loop that drives them.

pub mod blocklist;
pub mod bridge;
pub mod clock;
pub mod command;
pub mod directory;
mod event_loop;
pub mod heartbeat;
pub mod incoming;
pub mod loopback;
pub mod node;
pub mod outgoing;
pub mod rate_limiter;
pub mod session;
pub mod spam_filter;
