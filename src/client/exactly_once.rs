//! `ExactlyOnceRPCHelper` (spec.md §4.5): establishes and maintains a
//! session with the cluster, assigns monotonically increasing per-client
//! RPC numbers, tracks the first still-outstanding number as an
//! acknowledgment watermark, and runs a keep-alive worker.
//!
//! Grounded directly on the nested `ClientImpl::ExactlyOnceRPCHelper` class
//! in `Client/ClientImpl.h`: its field list maps onto this struct one for
//! one (`outstandingRPCNumbers` -> `outstanding: BTreeSet<u64>`,
//! `keepAliveCV`/`keepAliveThread` -> a `tokio::sync::Notify` + a
//! `tokio::spawn`'d task, per SPEC_FULL's OS-thread -> tokio-task
//! redesign).

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::client::leader_rpc::{CallOutcome, LeaderRpc};
use crate::codec;
use crate::rpc::{wire, ExactlyOnceRpcInfo, OpCode, TreeCommand, TreeCommandRequest, WireStatus};
use crate::tree::Condition;

/// Marker value written by the keep-alive probe's doomed condition (spec.md
/// §4.5, §9): the probe writes to a path it expects NOT to already hold
/// this value, so the condition always fails and the write never actually
/// mutates the tree — it only has to reach the log.
const KEEPALIVE_PATH: &str = "/__cabinetree_keepalive__";
const KEEPALIVE_MARKER: &[u8] = b"unreachable";

struct State {
    client_id: u64,
    next_rpc_number: u64,
    outstanding: BTreeSet<u64>,
    last_activity: Option<Instant>,
}

/// Establishes and maintains exactly-once session state for one client
/// instance.
pub struct ExactlyOnceRpcHelper {
    leader_rpc: Arc<LeaderRpc>,
    state: Mutex<State>,
    /// Serializes session establishment (spec.md §5: "only one thread at a
    /// time may be in the establish new session state, others wait"),
    /// separate from `state` so `state`'s lock is never held across the
    /// `OpenSession` network round-trip.
    opening: Mutex<()>,
    keep_alive_interval: Duration,
    session_close_timeout: Duration,
    exiting: AtomicBool,
    notify: Arc<Notify>,
    keep_alive_worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExactlyOnceRpcHelper {
    pub fn new(
        leader_rpc: Arc<LeaderRpc>,
        keep_alive_interval: Duration,
        session_close_timeout: Duration,
    ) -> Arc<ExactlyOnceRpcHelper> {
        Arc::new(ExactlyOnceRpcHelper {
            leader_rpc,
            state: Mutex::new(State {
                client_id: 0,
                next_rpc_number: 1,
                outstanding: BTreeSet::new(),
                last_activity: None,
            }),
            opening: Mutex::new(()),
            keep_alive_interval,
            session_close_timeout,
            exiting: AtomicBool::new(false),
            notify: Arc::new(Notify::new()),
            keep_alive_worker: Mutex::new(None),
        })
    }

    /// Step 1-6 of spec.md §4.5's `getRPCInfo`: opens a session on first
    /// use, allocates the next RPC number, and spawns the keep-alive worker
    /// once a session exists.
    ///
    /// `state`'s mutex is only ever held for plain field reads/writes, never
    /// across the `OpenSession` round-trip (spec.md §5): a caller that finds
    /// `client_id == 0` drops it, takes `opening` instead, and re-checks
    /// `client_id` once it has that lock, so a concurrent caller that lost
    /// the race to open the session just observes the winner's result
    /// instead of opening a second one.
    pub async fn get_rpc_info(
        self: &Arc<Self>,
        deadline: Instant,
    ) -> Result<ExactlyOnceRpcInfo, GetRpcInfoError> {
        let client_id = self.state.lock().await.client_id;
        let client_id = if client_id != 0 {
            client_id
        } else {
            let _opening = self.opening.lock().await;
            let already_open = self.state.lock().await.client_id;
            if already_open != 0 {
                already_open
            } else {
                match self.leader_rpc.call(OpCode::OpenSession, Vec::new(), deadline).await {
                    CallOutcome::Ok(bytes) => {
                        let client_id = codec::read_u64(&mut bytes.as_slice())
                            .map_err(|_| GetRpcInfoError::Timeout)?;
                        self.state.lock().await.client_id = client_id;
                        client_id
                    }
                    CallOutcome::Timeout => return Err(GetRpcInfoError::Timeout),
                    CallOutcome::InvalidRequest(msg) => {
                        error!(%msg, "server rejected OpenSession");
                        panic!("server rejected OpenSession as invalid: {msg}");
                    }
                }
            }
        };

        let mut state = self.state.lock().await;
        state.last_activity = Some(Instant::now());
        self.notify.notify_waiters();

        let rpc_number = state.next_rpc_number;
        state.next_rpc_number += 1;
        state.outstanding.insert(rpc_number);
        let first_outstanding = *state.outstanding.iter().next().unwrap();
        let info = ExactlyOnceRpcInfo { client_id, rpc_number, first_outstanding };
        drop(state);

        {
            let mut worker = self.keep_alive_worker.lock().await;
            if worker.is_none() {
                *worker = Some(self.spawn_keep_alive_worker());
            }
        }

        Ok(info)
    }

    /// Step 2 of the per-call flow: removes `info.rpc_number` from the
    /// outstanding set once the response has been received.
    pub async fn done_with_rpc(&self, info: ExactlyOnceRpcInfo) {
        let mut state = self.state.lock().await;
        state.outstanding.remove(&info.rpc_number);
    }

    fn spawn_keep_alive_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.keep_alive_loop().await })
    }

    async fn keep_alive_loop(self: Arc<Self>) {
        loop {
            if self.exiting.load(Ordering::SeqCst) {
                return;
            }
            let next_keep_alive = {
                let state = self.state.lock().await;
                if self.keep_alive_interval.is_zero() {
                    None
                } else {
                    state.last_activity.map(|t| t + self.keep_alive_interval)
                }
            };

            match next_keep_alive {
                None => {
                    self.notify.notified().await;
                }
                Some(when) if Instant::now() >= when => {
                    self.send_keep_alive().await;
                }
                Some(when) => {
                    let budget = when.saturating_duration_since(Instant::now());
                    tokio::select! {
                        _ = tokio::time::sleep(budget) => {}
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }
    }

    async fn send_keep_alive(self: &Arc<Self>) {
        let deadline = Instant::now() + self.session_close_timeout.max(Duration::from_secs(1));
        let info = match self.get_rpc_info(deadline).await {
            Ok(info) => info,
            Err(_) => return,
        };
        let request = TreeCommandRequest {
            command: TreeCommand::Write {
                path: KEEPALIVE_PATH.to_string(),
                contents: KEEPALIVE_MARKER.to_vec(),
            },
            // A condition that can never hold: keeps this command from
            // ever actually mutating the tree (spec.md §4.5, §9).
            condition: Condition { path: KEEPALIVE_PATH.to_string(), contents: b"unreachable-value".to_vec() },
        };
        let mut encoded = Vec::new();
        wire::write_exactly_once_info(&mut encoded, &info).expect("encode");
        wire::write_tree_command_request(&mut encoded, &request).expect("encode");

        let outcome = self.leader_rpc.call(OpCode::StateMachineCommand, encoded, deadline).await;
        self.done_with_rpc(info).await;

        match outcome {
            CallOutcome::Ok(bytes) => {
                if let Ok(resp) = wire::read_tree_response(&mut bytes.as_slice()) {
                    match resp.status {
                        Some(WireStatus::ConditionNotMet) => {
                            // Expected: the probe only needs to reach the
                            // Raft log, not actually apply.
                        }
                        Some(WireStatus::SessionExpired) => {
                            error!("session expired during keep-alive; exactly-once semantics lost");
                            std::process::exit(1);
                        }
                        other => {
                            warn!(?other, "unexpected keep-alive response status");
                        }
                    }
                }
            }
            CallOutcome::Timeout => {
                warn!("keep-alive timed out");
            }
            CallOutcome::InvalidRequest(msg) => {
                error!(%msg, "server rejected keep-alive as invalid");
                panic!("server rejected keep-alive as invalid: {msg}");
            }
        }
    }

    /// Shuts the helper down (spec.md §4.5 "Shutdown"): wakes and joins the
    /// keep-alive worker, then issues a best-effort `CloseSession`.
    pub async fn exit(self: &Arc<Self>) {
        self.exiting.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();

        let worker = self.keep_alive_worker.lock().await.take();
        if let Some(handle) = worker {
            let _ = handle.await;
        }

        let client_id = self.state.lock().await.client_id;
        if client_id != 0 {
            let mut buf = Vec::new();
            codec::write_u64(&mut buf, client_id).expect("encode");
            let deadline = Instant::now() + self.session_close_timeout;
            match self.leader_rpc.call(OpCode::CloseSession, buf, deadline).await {
                CallOutcome::Timeout => {
                    warn!("CloseSession timed out; session will expire server-side");
                }
                CallOutcome::InvalidRequest(msg) => {
                    warn!(%msg, "server rejected CloseSession");
                }
                CallOutcome::Ok(_) => {}
            }
        }
    }
}

#[derive(Debug)]
pub enum GetRpcInfoError {
    Timeout,
}
