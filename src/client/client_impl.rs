//! `ClientImpl` (spec.md §4.6): the real-cluster [`super::ClientBackend`],
//! translating each tree operation into a `TreeCommandRequest`/
//! `TreeQueryRequest`, routing it through [`super::leader_rpc::LeaderRpc`],
//! and stamping mutating commands with exactly-once info from
//! [`super::exactly_once::ExactlyOnceRpcHelper`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::error;

use crate::error::{Failure, OpResult, Status};
use crate::rpc::{
    wire, Configuration, OpCode, ServerControlRequest, ServerControlResponse, ServerDescriptor,
    ServerInfo, ServerStats, SetConfigurationResult, TreeCommand, TreeCommandRequest, TreeQuery,
    TreeQueryRequest, TreeResponse, WireStatus,
};
use crate::tree::Condition;

use super::exactly_once::ExactlyOnceRpcHelper;
use super::leader_rpc::{CallOutcome, LeaderRpc};
use super::ClientBackend;

/// `SESSION_EXPIRED` and `INVALID_REQUEST` are process-fatal (spec.md
/// §4.4, §9, §12): once a command or query comes back flagged either
/// way, exactly-once semantics (or the protocol contract itself) can no
/// longer be trusted, so the process terminates with a clear message
/// rather than returning a `Status` the caller might retry.
fn fatal_invalid_request(msg: &str) -> ! {
    error!(%msg, "server rejected request as invalid");
    panic!("request rejected by the cluster as invalid: {msg}");
}

fn fatal_session_expired() -> ! {
    error!("session expired; exactly-once semantics can no longer be guaranteed");
    std::process::exit(1);
}

fn from_wire_status(status: WireStatus) -> Status {
    match status {
        WireStatus::Ok => Status::Ok,
        WireStatus::InvalidArgument => Status::InvalidArgument,
        WireStatus::LookupError => Status::LookupError,
        WireStatus::TypeError => Status::TypeError,
        WireStatus::ConditionNotMet => Status::ConditionNotMet,
        WireStatus::Timeout => Status::Timeout,
        WireStatus::SessionExpired => {
            unreachable!("SessionExpired is handled before from_wire_status is called")
        }
    }
}

fn into_result(resp: TreeResponse) -> OpResult<TreeResponse> {
    match resp.status {
        None | Some(WireStatus::Ok) => Ok(resp),
        Some(WireStatus::SessionExpired) => fatal_session_expired(),
        Some(other) => Err(Failure::new(from_wire_status(other), resp.error)),
    }
}

fn malformed_response() -> Failure {
    Failure::invalid_argument("malformed response from server")
}

/// Talks to a real cluster through a [`LeaderRpc`], maintaining the
/// client's exactly-once session alongside it.
pub struct ClientImpl {
    leader_rpc: Arc<LeaderRpc>,
    exactly_once: Arc<ExactlyOnceRpcHelper>,
}

impl ClientImpl {
    pub fn new(
        leader_rpc: Arc<LeaderRpc>,
        exactly_once: Arc<ExactlyOnceRpcHelper>,
    ) -> Arc<ClientImpl> {
        Arc::new(ClientImpl { leader_rpc, exactly_once })
    }

    async fn call_command(
        &self,
        command: TreeCommand,
        condition: &Condition,
        deadline: Instant,
    ) -> OpResult<TreeResponse> {
        let info = self
            .exactly_once
            .get_rpc_info(deadline)
            .await
            .map_err(|_| Failure::timeout())?;
        let request = TreeCommandRequest { command, condition: condition.clone() };
        let mut payload = Vec::new();
        wire::write_exactly_once_info(&mut payload, &info).expect("encode");
        wire::write_tree_command_request(&mut payload, &request).expect("encode");

        let outcome = self.leader_rpc.call(OpCode::StateMachineCommand, payload, deadline).await;
        self.exactly_once.done_with_rpc(info).await;

        match outcome {
            CallOutcome::Ok(bytes) => {
                let resp =
                    wire::read_tree_response(&mut bytes.as_slice()).map_err(|_| malformed_response())?;
                into_result(resp)
            }
            CallOutcome::Timeout => Err(Failure::timeout()),
            CallOutcome::InvalidRequest(msg) => fatal_invalid_request(&msg),
        }
    }

    async fn call_query(&self, query: TreeQuery, deadline: Instant) -> OpResult<TreeResponse> {
        let request = TreeQueryRequest { query };
        let mut payload = Vec::new();
        wire::write_tree_query_request(&mut payload, &request).expect("encode");

        match self.leader_rpc.call(OpCode::StateMachineQuery, payload, deadline).await {
            CallOutcome::Ok(bytes) => {
                let resp =
                    wire::read_tree_response(&mut bytes.as_slice()).map_err(|_| malformed_response())?;
                into_result(resp)
            }
            CallOutcome::Timeout => Err(Failure::timeout()),
            CallOutcome::InvalidRequest(msg) => fatal_invalid_request(&msg),
        }
    }
}

#[async_trait]
impl ClientBackend for ClientImpl {
    async fn make_directory(
        &self,
        path: &str,
        condition: &Condition,
        deadline: Instant,
    ) -> OpResult<()> {
        self.call_command(TreeCommand::MakeDirectory { path: path.to_string() }, condition, deadline)
            .await
            .map(|_| ())
    }

    async fn list_directory(&self, path: &str, deadline: Instant) -> OpResult<Vec<String>> {
        let resp = self.call_query(TreeQuery::ListDirectory { path: path.to_string() }, deadline).await?;
        Ok(resp.children.unwrap_or_default())
    }

    async fn remove_directory(
        &self,
        path: &str,
        condition: &Condition,
        deadline: Instant,
    ) -> OpResult<()> {
        self.call_command(
            TreeCommand::RemoveDirectory { path: path.to_string() },
            condition,
            deadline,
        )
        .await
        .map(|_| ())
    }

    async fn write(
        &self,
        path: &str,
        contents: Vec<u8>,
        condition: &Condition,
        deadline: Instant,
    ) -> OpResult<()> {
        self.call_command(TreeCommand::Write { path: path.to_string(), contents }, condition, deadline)
            .await
            .map(|_| ())
    }

    async fn read(&self, path: &str, deadline: Instant) -> OpResult<Vec<u8>> {
        let resp = self.call_query(TreeQuery::Read { path: path.to_string() }, deadline).await?;
        Ok(resp.contents.unwrap_or_default())
    }

    async fn remove_file(
        &self,
        path: &str,
        condition: &Condition,
        deadline: Instant,
    ) -> OpResult<()> {
        self.call_command(TreeCommand::RemoveFile { path: path.to_string() }, condition, deadline)
            .await
            .map(|_| ())
    }

    async fn get_configuration(&self, deadline: Instant) -> OpResult<Configuration> {
        match self.leader_rpc.call(OpCode::GetConfiguration, Vec::new(), deadline).await {
            CallOutcome::Ok(bytes) => {
                wire::read_configuration(&mut bytes.as_slice()).map_err(|_| malformed_response())
            }
            CallOutcome::Timeout => Err(Failure::timeout()),
            CallOutcome::InvalidRequest(msg) => fatal_invalid_request(&msg),
        }
    }

    async fn set_configuration(
        &self,
        old_id: u64,
        new_servers: Vec<ServerDescriptor>,
        deadline: Instant,
    ) -> OpResult<SetConfigurationResult> {
        let mut payload = Vec::new();
        crate::codec::write_u64(&mut payload, old_id).expect("encode");
        crate::codec::write_u32(&mut payload, new_servers.len() as u32).expect("encode");
        for s in &new_servers {
            wire::write_server_descriptor(&mut payload, s).expect("encode");
        }
        match self.leader_rpc.call(OpCode::SetConfiguration, payload, deadline).await {
            CallOutcome::Ok(bytes) => wire::read_set_configuration_result(&mut bytes.as_slice())
                .map_err(|_| malformed_response()),
            CallOutcome::Timeout => Err(Failure::timeout()),
            CallOutcome::InvalidRequest(msg) => fatal_invalid_request(&msg),
        }
    }

    async fn get_server_info(&self, deadline: Instant) -> OpResult<ServerInfo> {
        match self.leader_rpc.call(OpCode::GetServerInfo, Vec::new(), deadline).await {
            CallOutcome::Ok(bytes) => {
                let mut cursor = bytes.as_slice();
                let server_id =
                    crate::codec::read_u64(&mut cursor).map_err(|_| malformed_response())?;
                let addresses =
                    crate::codec::read_string(&mut cursor).map_err(|_| malformed_response())?;
                Ok(ServerInfo { server_id, addresses })
            }
            CallOutcome::Timeout => Err(Failure::timeout()),
            CallOutcome::InvalidRequest(msg) => fatal_invalid_request(&msg),
        }
    }

    async fn server_control(
        &self,
        request: ServerControlRequest,
        deadline: Instant,
    ) -> OpResult<ServerControlResponse> {
        let mut payload = Vec::new();
        wire::write_server_control_request(&mut payload, &request).expect("encode");
        match self.leader_rpc.call(OpCode::ServerControl, payload, deadline).await {
            CallOutcome::Ok(bytes) => wire::read_server_control_response(&mut bytes.as_slice())
                .map_err(|_| malformed_response()),
            CallOutcome::Timeout => Err(Failure::timeout()),
            CallOutcome::InvalidRequest(msg) => fatal_invalid_request(&msg),
        }
    }

    async fn get_server_stats(&self, deadline: Instant) -> OpResult<ServerStats> {
        match self.leader_rpc.call(OpCode::GetServerStats, Vec::new(), deadline).await {
            CallOutcome::Ok(bytes) => {
                wire::read_server_stats(&mut bytes.as_slice()).map_err(|_| malformed_response())
            }
            CallOutcome::Timeout => Err(Failure::timeout()),
            CallOutcome::InvalidRequest(msg) => fatal_invalid_request(&msg),
        }
    }

    async fn shutdown(&self) {
        self.exactly_once.exit().await;
    }
}
