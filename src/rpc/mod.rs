//! The logical RPC contract exchanged with the cluster leader (spec.md §6).
//!
//! These types are transport-agnostic: [`crate::transport`] carries their
//! encoded form (see [`wire`]) over the wire, while [`crate::client`] and
//! [`crate::server`] speak the typed form on either end. Everything here is
//! plain data — no I/O, no async.

pub mod wire;

use crate::tree::{Condition, TreeStats};

/// The four opcodes making up the client/cluster contract (spec.md §6.1),
/// plus the configuration-management and per-server opcodes supplemented
/// from `original_source` (spec.md §10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    OpenSession,
    CloseSession,
    StateMachineCommand,
    StateMachineQuery,
    GetConfiguration,
    SetConfiguration,
    GetServerInfo,
    ServerControl,
    GetServerStats,
}

/// `{client_id, rpc_number, first_outstanding_rpc}`, attached to every
/// mutating request so the server can deduplicate and garbage-collect
/// response-cache entries (spec.md §3, §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactlyOnceRpcInfo {
    pub client_id: u64,
    pub rpc_number: u64,
    pub first_outstanding: u64,
}

/// The read-write operations a `StateMachineCommand` can carry (spec.md
/// §4.2). `ListDirectory` and `Read` are queries, not commands — see
/// [`TreeQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeCommand {
    MakeDirectory { path: String },
    RemoveDirectory { path: String },
    Write { path: String, contents: Vec<u8> },
    RemoveFile { path: String },
}

/// The read-only operations a `StateMachineQuery` can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeQuery {
    ListDirectory { path: String },
    Read { path: String },
}

/// `StateMachineCommand` request body: an operation plus its attached
/// condition (an empty path means "no condition").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeCommandRequest {
    pub command: TreeCommand,
    pub condition: Condition,
}

/// `StateMachineQuery` request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeQueryRequest {
    pub query: TreeQuery,
}

/// The status enum carried on every `tree_response` (spec.md §6.1). Unlike
/// [`crate::error::Status`], this includes the two internal, process-fatal
/// kinds that can appear on the wire: `Timeout` (the server itself gave up
/// waiting on Raft) and `SessionExpired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireStatus {
    Ok,
    InvalidArgument,
    LookupError,
    TypeError,
    ConditionNotMet,
    Timeout,
    SessionExpired,
}

/// A `tree_response`: status, human-readable error, and operation-specific
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeResponse {
    pub status_is_ok: bool,
    pub status: Option<WireStatus>,
    pub error: String,
    pub contents: Option<Vec<u8>>,
    pub children: Option<Vec<String>>,
}

impl TreeResponse {
    pub fn ok() -> TreeResponse {
        TreeResponse { status_is_ok: true, status: Some(WireStatus::Ok), ..Default::default() }
    }

    pub fn ok_with_contents(contents: Vec<u8>) -> TreeResponse {
        TreeResponse { contents: Some(contents), ..TreeResponse::ok() }
    }

    pub fn ok_with_children(children: Vec<String>) -> TreeResponse {
        TreeResponse { children: Some(children), ..TreeResponse::ok() }
    }

    pub fn error(status: WireStatus, error: impl Into<String>) -> TreeResponse {
        TreeResponse {
            status_is_ok: false,
            status: Some(status),
            error: error.into(),
            ..Default::default()
        }
    }
}

/// A cluster member: a unique non-zero id plus a comma-delimited address
/// list (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub server_id: u64,
    pub addresses: String,
}

/// `GetConfiguration` response (spec.md §6.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub id: u64,
    pub servers: Vec<ServerDescriptor>,
}

/// `SetConfiguration` outcome: the three-way result from
/// `Client.h`'s `ConfigurationResult` (spec.md §10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetConfigurationResult {
    Ok,
    ConfigurationChanged,
    Bad(Vec<ServerDescriptor>),
}

/// `GetServerInfo` response (spec.md §6.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub server_id: u64,
    pub addresses: String,
}

/// An opaque `ServerControl` opcode + payload pass-through (spec.md §6.3,
/// §10): the core accepts these without interpreting them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerControlRequest {
    pub op_code: u16,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerControlResponse {
    pub payload: Vec<u8>,
}

/// Snapshot of `Tree::updateServerStats` plus the contacted server's id,
/// returned by `Cluster::get_server_stats` (spec.md §10).
#[derive(Debug, Clone, Copy)]
pub struct ServerStats {
    pub server_id: u64,
    pub tree: TreeStats,
}
