pub mod client;
pub mod server;

use serde::{Deserialize, Serialize};

use crate::raft::{NodeId, PeerMessage};

/// What goes over the wire: who sent it, and the message itself. The rest
/// of the crate never sees JSON; this module owns the encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub from: NodeId,
    pub message: PeerMessage,
}

pub use client::HttpOutbox;
pub use server::{router, serve};
