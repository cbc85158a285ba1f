//! A minimal single-node stand-in for "the server", used only to give
//! `cabind`/`cabinctl` something real to talk to over [`crate::transport`].
//!
//! This is deliberately not a Raft cluster: replication, leader election
//! and log compaction are out of scope (spec.md §1). What's here is just
//! enough of "apply committed command" / "answer consistent read" (the two
//! hooks spec.md says the tree core talks to Raft through) to exercise
//! [`crate::client`] end to end against a real TCP socket. A single node
//! is always the leader.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use moka::sync::Cache;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::rpc::{
    wire, Configuration, ExactlyOnceRpcInfo, OpCode, ServerControlRequest, ServerControlResponse,
    ServerDescriptor, SetConfigurationResult, TreeCommand, TreeCommandRequest, TreeQuery,
    TreeQueryRequest, TreeResponse, WireStatus,
};
use crate::tree::Tree;
use crate::transport::tcp;

/// Server-side state for one logical client session: just enough to
/// enforce spec.md §4.5's "once a SessionID is non-zero it remains fixed
/// for the life of that client" and to dedup replayed commands.
struct SessionState {
    /// `(rpc_number -> encoded TreeResponse)`, pruned whenever a later
    /// request reports a higher `first_outstanding` (spec.md §6.1: "the
    /// server uses it ... to garbage-collect response cache entries with
    /// rpc_number < first_outstanding_rpc").
    response_cache: BTreeMap<u64, Vec<u8>>,
}

/// The whole state of this node: its tree, its session table, and its
/// (trivial, single-member) configuration.
pub struct ClusterState {
    pub cluster_uuid: String,
    pub server_id: u64,
    tree: Mutex<Tree>,
    next_client_id: AtomicU64,
    /// Liveness: a client id maps to `()` for as long as it's considered
    /// alive. `time_to_idle` approximates "the session expires if the
    /// client stops sending keep-alives", without implementing Raft's own
    /// session-expiration log entries.
    live_sessions: Cache<u64, ()>,
    sessions: DashMap<u64, Mutex<SessionState>>,
    configuration: Mutex<Configuration>,
}

impl ClusterState {
    pub fn new(cluster_uuid: String, server_id: u64, session_timeout: Duration) -> ClusterState {
        ClusterState {
            cluster_uuid,
            server_id,
            tree: Mutex::new(Tree::new()),
            next_client_id: AtomicU64::new(1),
            live_sessions: Cache::builder().time_to_idle(session_timeout).build(),
            sessions: DashMap::new(),
            configuration: Mutex::new(Configuration {
                id: 1,
                servers: vec![ServerDescriptor { server_id, addresses: "127.0.0.1".to_string() }],
            }),
        }
    }

    fn is_alive(&self, client_id: u64) -> bool {
        self.live_sessions.get(&client_id).is_some()
    }

    async fn open_session(&self) -> u64 {
        let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        self.live_sessions.insert(client_id, ());
        self.sessions.insert(client_id, Mutex::new(SessionState { response_cache: BTreeMap::new() }));
        debug!(client_id, "opened session");
        client_id
    }

    async fn close_session(&self, client_id: u64) {
        self.live_sessions.invalidate(&client_id);
        self.sessions.remove(&client_id);
        debug!(client_id, "closed session");
    }

    async fn apply_command(
        &self,
        info: ExactlyOnceRpcInfo,
        request: TreeCommandRequest,
    ) -> TreeResponse {
        if !self.is_alive(info.client_id) {
            warn!(client_id = info.client_id, "command against expired session");
            return TreeResponse::error(WireStatus::SessionExpired, "session expired");
        }
        self.live_sessions.insert(info.client_id, ());

        let Some(session) = self.sessions.get(&info.client_id) else {
            return TreeResponse::error(WireStatus::SessionExpired, "session expired");
        };
        let mut session = session.lock().await;
        if let Some(cached) = session.response_cache.get(&info.rpc_number) {
            return wire::read_tree_response(&mut cached.as_slice()).expect("cached response");
        }

        let response = {
            let mut tree = self.tree.lock().await;
            let outcome = match request.command {
                TreeCommand::MakeDirectory { ref path } => {
                    tree.make_directory(path, Some(&request.condition)).map(|_| TreeResponse::ok())
                }
                TreeCommand::RemoveDirectory { ref path } => {
                    tree.remove_directory(path, Some(&request.condition)).map(|_| TreeResponse::ok())
                }
                TreeCommand::Write { ref path, ref contents } => tree
                    .write(path, contents.clone(), Some(&request.condition))
                    .map(|_| TreeResponse::ok()),
                TreeCommand::RemoveFile { ref path } => {
                    tree.remove_file(path, Some(&request.condition)).map(|_| TreeResponse::ok())
                }
            };
            outcome.unwrap_or_else(|f| TreeResponse::error(to_wire_status(f.status), f.error))
        };

        let mut encoded = Vec::new();
        wire::write_tree_response(&mut encoded, &response).expect("encode response");
        session.response_cache.insert(info.rpc_number, encoded);
        session.response_cache.retain(|&n, _| n >= info.first_outstanding);

        response
    }

    async fn apply_query(&self, request: TreeQueryRequest) -> TreeResponse {
        let mut tree = self.tree.lock().await;
        match request.query {
            TreeQuery::ListDirectory { path } => match tree.list_directory(&path) {
                Ok(children) => TreeResponse::ok_with_children(children),
                Err(f) => TreeResponse::error(to_wire_status(f.status), f.error),
            },
            TreeQuery::Read { path } => match tree.read(&path) {
                Ok(contents) => TreeResponse::ok_with_contents(contents),
                Err(f) => TreeResponse::error(to_wire_status(f.status), f.error),
            },
        }
    }

    async fn get_configuration(&self) -> Configuration {
        self.configuration.lock().await.clone()
    }

    async fn set_configuration(
        &self,
        old_id: u64,
        new_servers: Vec<ServerDescriptor>,
    ) -> SetConfigurationResult {
        let mut config = self.configuration.lock().await;
        if config.id != old_id {
            return SetConfigurationResult::ConfigurationChanged;
        }
        let bad: Vec<_> = new_servers.iter().filter(|s| s.server_id == 0).cloned().collect();
        if !bad.is_empty() {
            return SetConfigurationResult::Bad(bad);
        }
        config.id += 1;
        config.servers = new_servers;
        SetConfigurationResult::Ok
    }

    async fn server_stats(&self) -> crate::rpc::ServerStats {
        let tree = self.tree.lock().await;
        crate::rpc::ServerStats { server_id: self.server_id, tree: *tree.stats() }
    }
}

fn to_wire_status(s: crate::error::Status) -> WireStatus {
    use crate::error::Status;
    match s {
        Status::Ok => WireStatus::Ok,
        Status::InvalidArgument => WireStatus::InvalidArgument,
        Status::LookupError => WireStatus::LookupError,
        Status::TypeError => WireStatus::TypeError,
        Status::ConditionNotMet => WireStatus::ConditionNotMet,
        Status::Timeout => WireStatus::Timeout,
    }
}

/// Accepts connections forever, spawning one task per connection.
pub async fn serve(listener: TcpListener, state: std::sync::Arc<ClusterState>) -> std::io::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        socket.set_nodelay(true).ok();
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, state).await {
                debug!(%peer, error = %e, "connection closed");
            }
        });
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    state: std::sync::Arc<ClusterState>,
) -> std::io::Result<()> {
    let (expected_uuid, expected_server_id) = tcp::read_handshake_request(&mut socket).await?;
    let uuid_ok = expected_uuid.as_deref().map_or(true, |u| u == state.cluster_uuid);
    let server_ok = expected_server_id.map_or(true, |id| id == state.server_id);
    let matched = uuid_ok && server_ok;
    tcp::write_handshake_response(&mut socket, &state.cluster_uuid, state.server_id, matched)
        .await?;
    if !matched {
        return Ok(());
    }
    info!(server_id = state.server_id, "client connected");

    loop {
        let (opcode, payload) = tcp::read_request_frame(&mut socket).await?;
        let Some(opcode) = opcode else {
            let outcome = crate::transport::RpcOutcome::InvalidRequest("unknown opcode".into());
            tcp::write_response_outcome(&mut socket, &outcome).await?;
            continue;
        };
        let outcome = dispatch(&state, opcode, payload).await;
        tcp::write_response_outcome(&mut socket, &outcome).await?;
    }
}

async fn dispatch(
    state: &ClusterState,
    opcode: OpCode,
    payload: Vec<u8>,
) -> crate::transport::RpcOutcome {
    use crate::transport::RpcOutcome;
    match opcode {
        OpCode::OpenSession => {
            let client_id = state.open_session().await;
            let mut buf = Vec::new();
            crate::codec::write_u64(&mut buf, client_id).expect("encode");
            RpcOutcome::Ok(buf)
        }
        OpCode::CloseSession => {
            let client_id = match crate::codec::read_u64(&mut payload.as_slice()) {
                Ok(id) => id,
                Err(_) => return RpcOutcome::InvalidRequest("malformed CloseSession".into()),
            };
            state.close_session(client_id).await;
            RpcOutcome::Ok(Vec::new())
        }
        OpCode::StateMachineCommand => {
            let mut cursor = payload.as_slice();
            let info = match wire::read_exactly_once_info(&mut cursor) {
                Ok(i) => i,
                Err(_) => return RpcOutcome::InvalidRequest("malformed ExactlyOnceRPCInfo".into()),
            };
            let request = match wire::read_tree_command_request(&mut cursor) {
                Ok(r) => r,
                Err(_) => return RpcOutcome::InvalidRequest("malformed TreeCommandRequest".into()),
            };
            let response = state.apply_command(info, request).await;
            let mut buf = Vec::new();
            wire::write_tree_response(&mut buf, &response).expect("encode");
            RpcOutcome::Ok(buf)
        }
        OpCode::StateMachineQuery => {
            let request = match wire::read_tree_query_request(&mut payload.as_slice()) {
                Ok(r) => r,
                Err(_) => return RpcOutcome::InvalidRequest("malformed TreeQueryRequest".into()),
            };
            let response = state.apply_query(request).await;
            let mut buf = Vec::new();
            wire::write_tree_response(&mut buf, &response).expect("encode");
            RpcOutcome::Ok(buf)
        }
        OpCode::GetConfiguration => {
            let config = state.get_configuration().await;
            let mut buf = Vec::new();
            wire::write_configuration(&mut buf, &config).expect("encode");
            RpcOutcome::Ok(buf)
        }
        OpCode::SetConfiguration => {
            let mut cursor = payload.as_slice();
            let old_id = match crate::codec::read_u64(&mut cursor) {
                Ok(v) => v,
                Err(_) => return RpcOutcome::InvalidRequest("malformed SetConfiguration".into()),
            };
            let n = crate::codec::read_u32(&mut cursor).unwrap_or(0);
            let mut servers = Vec::with_capacity(n as usize);
            for _ in 0..n {
                match wire::read_server_descriptor(&mut cursor) {
                    Ok(s) => servers.push(s),
                    Err(_) => return RpcOutcome::InvalidRequest("malformed ServerDescriptor".into()),
                }
            }
            let result = state.set_configuration(old_id, servers).await;
            let mut buf = Vec::new();
            wire::write_set_configuration_result(&mut buf, &result).expect("encode");
            RpcOutcome::Ok(buf)
        }
        OpCode::GetServerInfo => {
            let mut buf = Vec::new();
            crate::codec::write_u64(&mut buf, state.server_id).expect("encode");
            crate::codec::write_string(&mut buf, "127.0.0.1").expect("encode");
            RpcOutcome::Ok(buf)
        }
        OpCode::ServerControl => {
            let request = match wire::read_server_control_request(&mut payload.as_slice()) {
                Ok(r) => r,
                Err(_) => return RpcOutcome::InvalidRequest("malformed ServerControlRequest".into()),
            };
            // Opaque pass-through (spec.md §6.3): this core doesn't
            // interpret debug-log / snapshot admin opcodes, it just
            // acknowledges receipt.
            let response = ServerControlResponse { payload: request.payload };
            let mut buf = Vec::new();
            wire::write_server_control_response(&mut buf, &response).expect("encode");
            RpcOutcome::Ok(buf)
        }
        OpCode::GetServerStats => {
            let stats = state.server_stats().await;
            let mut buf = Vec::new();
            wire::write_server_stats(&mut buf, &stats).expect("encode");
            RpcOutcome::Ok(buf)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_session_allocates_increasing_ids() {
        let state = ClusterState::new("uuid".into(), 1, Duration::from_secs(60));
        let a = state.open_session().await;
        let b = state.open_session().await;
        assert!(b > a);
    }

    #[tokio::test]
    async fn command_against_unopened_session_is_expired() {
        let state = ClusterState::new("uuid".into(), 1, Duration::from_secs(60));
        let info = ExactlyOnceRpcInfo { client_id: 999, rpc_number: 1, first_outstanding: 1 };
        let req = TreeCommandRequest {
            command: TreeCommand::MakeDirectory { path: "/a".into() },
            condition: crate::tree::Condition::none(),
        };
        let resp = state.apply_command(info, req).await;
        assert_eq!(resp.status, Some(WireStatus::SessionExpired));
    }

    #[tokio::test]
    async fn duplicate_rpc_number_returns_cached_response() {
        let state = ClusterState::new("uuid".into(), 1, Duration::from_secs(60));
        let client_id = state.open_session().await;
        let info = ExactlyOnceRpcInfo { client_id, rpc_number: 1, first_outstanding: 1 };
        let req = TreeCommandRequest {
            command: TreeCommand::Write { path: "/a".into(), contents: b"v1".to_vec() },
            condition: crate::tree::Condition::none(),
        };
        let first = state.apply_command(info, req.clone()).await;
        // Write again with a different value but same rpc_number: should
        // replay the cached response rather than re-apply.
        let req2 = TreeCommandRequest {
            command: TreeCommand::Write { path: "/a".into(), contents: b"v2".to_vec() },
            condition: crate::tree::Condition::none(),
        };
        let second = state.apply_command(info, req2).await;
        assert_eq!(first, second);
    }
}
