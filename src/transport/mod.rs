//! The transport seam LeaderRPC routes through (spec.md §4.4, §6.4).
//!
//! TCP framing, the event loop, and session liveness timers are out of
//! scope per spec.md §1 — they're addressed here only as the interface
//! [`Session`]/[`Transport`] describe, plus one concrete, real
//! implementation ([`tcp`]) good enough to exercise the rest of the stack
//! end to end.

pub mod address;
pub mod backoff;
pub mod tcp;

use std::time::Instant;

use async_trait::async_trait;

use crate::rpc::OpCode;

pub use address::Address;
pub use backoff::Backoff;

/// What a session call came back with, one layer below the higher-level
/// `CallStatus` LeaderRPC exposes to its own callers. Every RPC response
/// carries a generic envelope (mirrors `Protocol::Client::Response`'s
/// `NotLeader`/`Redirect` variants in the original) so LeaderRPC can route
/// without understanding the opcode-specific payload.
#[derive(Debug, Clone)]
pub enum RpcOutcome {
    /// The contacted server believes it is the leader and applied (or
    /// rejected at the application level) the request; `payload` is the
    /// opcode-specific encoded response.
    Ok(Vec<u8>),
    /// The contacted server is not (or no longer) the leader and has no
    /// better guess.
    NotLeader,
    /// The contacted server knows who the leader is.
    Redirect(String),
    /// The server rejected the opcode or the request was malformed — fatal,
    /// per spec.md §4.4.
    InvalidRequest(String),
}

/// A transport-level failure: connection refused, reset, cluster identity
/// mismatch. Distinct from [`RpcOutcome`] because it means no session
/// exists to route through any more, not merely "wrong leader".
#[derive(Debug, Clone)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TransportError {}

/// A live logical connection to one cluster member.
#[async_trait]
pub trait Session: Send + Sync {
    async fn call(
        &self,
        opcode: OpCode,
        request: Vec<u8>,
        deadline: Instant,
    ) -> Result<RpcOutcome, TransportError>;

    /// The cluster UUID the peer reported during the handshake, if this
    /// transport implements one (spec.md §4.4). `LeaderRPC` uses this to
    /// learn the UUID on first connect and to enforce it on every
    /// subsequent reconnect.
    fn peer_cluster_uuid(&self) -> Option<&str> {
        None
    }

    /// The server id the peer reported, if known.
    fn peer_server_id(&self) -> Option<u64> {
        None
    }
}

/// Establishes [`Session`]s, verifying cluster identity as it goes
/// (spec.md §4.4: "the recipient confirms the cluster UUID, and optionally
/// a specific server id").
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        address: &Address,
        expected_cluster_uuid: Option<&str>,
        expected_server_id: Option<u64>,
        deadline: Instant,
    ) -> Result<Box<dyn Session>, TransportError>;
}
