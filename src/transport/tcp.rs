//! The one concrete [`Transport`]: real tokio TCP, hand-framed the same
//! way the teacher frames NFS/RPC messages (length-prefixed, big-endian,
//! no serialization crate). Good enough to run `cabind`/`cabinctl` over a
//! loopback socket; the event loop and liveness timers spec.md §1 excludes
//! are not reimplemented beyond what's needed to drive a call to
//! completion.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::rpc::OpCode;

use super::{Address, RpcOutcome, Session, Transport, TransportError};

fn opcode_tag(op: OpCode) -> u8 {
    match op {
        OpCode::OpenSession => 0,
        OpCode::CloseSession => 1,
        OpCode::StateMachineCommand => 2,
        OpCode::StateMachineQuery => 3,
        OpCode::GetConfiguration => 4,
        OpCode::SetConfiguration => 5,
        OpCode::GetServerInfo => 6,
        OpCode::ServerControl => 7,
        OpCode::GetServerStats => 8,
    }
}

pub fn opcode_from_tag(tag: u8) -> Option<OpCode> {
    match tag {
        0 => Some(OpCode::OpenSession),
        1 => Some(OpCode::CloseSession),
        2 => Some(OpCode::StateMachineCommand),
        3 => Some(OpCode::StateMachineQuery),
        4 => Some(OpCode::GetConfiguration),
        5 => Some(OpCode::SetConfiguration),
        6 => Some(OpCode::GetServerInfo),
        7 => Some(OpCode::ServerControl),
        8 => Some(OpCode::GetServerStats),
        _ => None,
    }
}

async fn write_frame(
    stream: &mut TcpStream,
    opcode: u8,
    payload: &[u8],
) -> std::io::Result<()> {
    stream.write_u8(opcode).await?;
    stream.write_u32(payload.len() as u32).await?;
    stream.write_all(payload).await
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
    let opcode = stream.read_u8().await?;
    let len = stream.read_u32().await? as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok((opcode, buf))
}

/// Outcome tags for the generic response envelope (mirrors
/// `Protocol::Client::Response`'s oneof in the original).
const OUTCOME_OK: u8 = 0;
const OUTCOME_NOT_LEADER: u8 = 1;
const OUTCOME_REDIRECT: u8 = 2;
const OUTCOME_INVALID_REQUEST: u8 = 3;

async fn write_outcome(stream: &mut TcpStream, outcome: &RpcOutcome) -> std::io::Result<()> {
    match outcome {
        RpcOutcome::Ok(bytes) => write_frame(stream, OUTCOME_OK, bytes).await,
        RpcOutcome::NotLeader => write_frame(stream, OUTCOME_NOT_LEADER, &[]).await,
        RpcOutcome::Redirect(addr) => write_frame(stream, OUTCOME_REDIRECT, addr.as_bytes()).await,
        RpcOutcome::InvalidRequest(msg) => {
            write_frame(stream, OUTCOME_INVALID_REQUEST, msg.as_bytes()).await
        }
    }
}

async fn read_outcome(stream: &mut TcpStream) -> Result<RpcOutcome, TransportError> {
    let (tag, payload) = read_frame(stream)
        .await
        .map_err(|e| TransportError(format!("connection lost: {e}")))?;
    match tag {
        OUTCOME_OK => Ok(RpcOutcome::Ok(payload)),
        OUTCOME_NOT_LEADER => Ok(RpcOutcome::NotLeader),
        OUTCOME_REDIRECT => Ok(RpcOutcome::Redirect(String::from_utf8_lossy(&payload).into_owned())),
        OUTCOME_INVALID_REQUEST => {
            Ok(RpcOutcome::InvalidRequest(String::from_utf8_lossy(&payload).into_owned()))
        }
        other => Err(TransportError(format!("unrecognized outcome tag {other}"))),
    }
}

async fn write_handshake(
    stream: &mut TcpStream,
    expected_cluster_uuid: Option<&str>,
    expected_server_id: Option<u64>,
) -> std::io::Result<()> {
    let uuid = expected_cluster_uuid.unwrap_or("");
    stream.write_u32(uuid.len() as u32).await?;
    stream.write_all(uuid.as_bytes()).await?;
    stream.write_u8(expected_server_id.is_some() as u8).await?;
    stream.write_u64(expected_server_id.unwrap_or(0)).await
}

async fn read_handshake_response(stream: &mut TcpStream) -> Result<(String, u64), TransportError> {
    let ok = stream
        .read_u8()
        .await
        .map_err(|e| TransportError(format!("handshake failed: {e}")))?;
    let len = stream
        .read_u32()
        .await
        .map_err(|e| TransportError(format!("handshake failed: {e}")))? as usize;
    let mut buf = vec![0u8; len];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| TransportError(format!("handshake failed: {e}")))?;
    if ok == 0 {
        return Err(TransportError(format!(
            "cluster identity mismatch: {}",
            String::from_utf8_lossy(&buf)
        )));
    }
    let cluster_uuid = String::from_utf8_lossy(&buf).into_owned();
    let server_id = stream
        .read_u64()
        .await
        .map_err(|e| TransportError(format!("handshake failed: {e}")))?;
    Ok((cluster_uuid, server_id))
}

/// `TcpTransport`'s server-side counterpart lives in [`crate::server`]; this
/// function is exported so that code can share the exact wire format
/// without duplicating it.
pub async fn write_handshake_response(
    stream: &mut TcpStream,
    cluster_uuid: &str,
    server_id: u64,
    matched: bool,
) -> std::io::Result<()> {
    stream.write_u8(matched as u8).await?;
    let body: &[u8] = if matched { cluster_uuid.as_bytes() } else { b"cluster identity mismatch" };
    stream.write_u32(body.len() as u32).await?;
    stream.write_all(body).await?;
    if matched {
        stream.write_u64(server_id).await?;
    }
    Ok(())
}

pub async fn read_handshake_request(
    stream: &mut TcpStream,
) -> std::io::Result<(Option<String>, Option<u64>)> {
    let len = stream.read_u32().await? as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    let uuid = String::from_utf8_lossy(&buf).into_owned();
    let has_server_id = stream.read_u8().await? != 0;
    let server_id = stream.read_u64().await?;
    Ok((if uuid.is_empty() { None } else { Some(uuid) }, has_server_id.then_some(server_id)))
}

pub async fn write_request_frame(
    stream: &mut TcpStream,
    opcode: OpCode,
    payload: &[u8],
) -> std::io::Result<()> {
    write_frame(stream, opcode_tag(opcode), payload).await
}

pub async fn read_request_frame(
    stream: &mut TcpStream,
) -> std::io::Result<(Option<OpCode>, Vec<u8>)> {
    let (tag, payload) = read_frame(stream).await?;
    Ok((opcode_from_tag(tag), payload))
}

pub use write_outcome as write_response_outcome;

/// A TCP-backed [`Transport`]. `connect_timeout` bounds both the socket
/// connect and the handshake round-trip.
pub struct TcpTransport {
    pub connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> TcpTransport {
        TcpTransport { connect_timeout }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        TcpTransport::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(
        &self,
        address: &Address,
        expected_cluster_uuid: Option<&str>,
        expected_server_id: Option<u64>,
        deadline: Instant,
    ) -> Result<Box<dyn Session>, TransportError> {
        let resolved = address
            .resolved_string()
            .ok_or_else(|| TransportError(format!("'{}' did not resolve", address.original_string())))?;
        let budget = deadline.saturating_duration_since(Instant::now()).min(self.connect_timeout);

        let mut stream = tokio::time::timeout(budget, TcpStream::connect(resolved))
            .await
            .map_err(|_| TransportError("connect timed out".to_string()))?
            .map_err(|e| TransportError(format!("connect to {resolved} failed: {e}")))?;
        stream.set_nodelay(true).ok();

        write_handshake(&mut stream, expected_cluster_uuid, expected_server_id)
            .await
            .map_err(|e| TransportError(format!("handshake write failed: {e}")))?;
        let (cluster_uuid, server_id) = read_handshake_response(&mut stream).await?;

        Ok(Box::new(TcpSession { stream: Mutex::new(stream), cluster_uuid, server_id }))
    }
}

pub struct TcpSession {
    stream: Mutex<TcpStream>,
    pub cluster_uuid: String,
    pub server_id: u64,
}

#[async_trait]
impl Session for TcpSession {
    async fn call(
        &self,
        opcode: OpCode,
        request: Vec<u8>,
        deadline: Instant,
    ) -> Result<RpcOutcome, TransportError> {
        let budget = deadline.saturating_duration_since(Instant::now());
        let mut stream = self.stream.lock().await;
        let attempt = async {
            write_request_frame(&mut stream, opcode, &request)
                .await
                .map_err(|e| TransportError(format!("write failed: {e}")))?;
            read_outcome(&mut stream).await
        };
        tokio::time::timeout(budget, attempt)
            .await
            .map_err(|_| TransportError("call timed out".to_string()))?
    }

    fn peer_cluster_uuid(&self) -> Option<&str> {
        Some(&self.cluster_uuid)
    }

    fn peer_server_id(&self) -> Option<u64> {
        Some(self.server_id)
    }
}
