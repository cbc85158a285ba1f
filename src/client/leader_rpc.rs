//! The leader RPC router (spec.md §4.4): wraps a pluggable [`Transport`],
//! maintains a hint of which cluster member is leader, retries on failure
//! and redirect, and exposes both a synchronous [`LeaderRpc::call`] and the
//! cancellable [`Call`] handle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::rpc::OpCode;
use crate::transport::{Address, Backoff, RpcOutcome, Session, Transport, TransportError};

/// What a completed call came back with. `InvalidRequest` is fatal per
/// spec.md §4.4 ("callers are expected to panic"); `LeaderRpc` reports it
/// rather than panicking itself, so the caller (e.g.
/// [`crate::client::client_impl::ClientImpl`]) controls exactly when and
/// how the process dies.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Ok(Vec<u8>),
    Timeout,
    InvalidRequest(String),
}

/// The extra outcome [`Call::wait`] can produce: the session the call was
/// running on turned out to be stale and the caller should start over.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    Ok(Vec<u8>),
    Retry,
    Timeout,
    InvalidRequest(String),
}

struct Slot {
    session: Option<Arc<dyn Session>>,
    leader_hint: Option<String>,
    consecutive_failures: u64,
}

/// Routes calls to the current cluster leader, rerouting on "not leader" /
/// redirect outcomes and transport failures (spec.md §4.4).
pub struct LeaderRpc {
    transport: Arc<dyn Transport>,
    addresses: Vec<String>,
    default_port: u16,
    expected_server_id: Option<u64>,
    cluster_uuid: Mutex<Option<String>>,
    backoff: Backoff,
    slot: Mutex<Slot>,
}

impl LeaderRpc {
    pub fn new(
        transport: Arc<dyn Transport>,
        address_list: &str,
        default_port: u16,
        expected_server_id: Option<u64>,
    ) -> LeaderRpc {
        LeaderRpc {
            transport,
            addresses: Address::split_entries(address_list),
            default_port,
            expected_server_id,
            cluster_uuid: Mutex::new(None),
            backoff: Backoff::default_policy(),
            slot: Mutex::new(Slot { session: None, leader_hint: None, consecutive_failures: 0 }),
        }
    }

    /// The synchronous call form (spec.md §4.4): blocks until the server
    /// produces a response, the deadline elapses, or a fatal
    /// `INVALID_REQUEST` is observed.
    pub async fn call(&self, opcode: OpCode, request: Vec<u8>, deadline: Instant) -> CallOutcome {
        let canceled = AtomicBool::new(false);
        self.call_retrying(opcode, request, deadline, &canceled).await
    }

    /// Creates a [`Call`] handle for the asynchronous form (spec.md §4.4).
    pub fn make_call(self: &Arc<Self>) -> Call {
        Call::new(self.clone())
    }

    async fn call_retrying(
        &self,
        opcode: OpCode,
        request: Vec<u8>,
        deadline: Instant,
        cancel_flag: &AtomicBool,
    ) -> CallOutcome {
        loop {
            if cancel_flag.load(Ordering::SeqCst) {
                return CallOutcome::Timeout;
            }
            if Instant::now() >= deadline {
                return CallOutcome::Timeout;
            }
            let session = match self.ensure_session(deadline).await {
                Some(s) => s,
                None => {
                    if Instant::now() >= deadline {
                        return CallOutcome::Timeout;
                    }
                    continue;
                }
            };
            match session.call(opcode, request.clone(), deadline).await {
                Ok(RpcOutcome::Ok(bytes)) => {
                    self.on_success().await;
                    return CallOutcome::Ok(bytes);
                }
                Ok(RpcOutcome::NotLeader) => {
                    debug!("contacted server is not the leader, retrying with a random member");
                    self.clear_hint().await;
                    self.drop_session().await;
                }
                Ok(RpcOutcome::Redirect(addr)) => {
                    debug!(%addr, "redirected to new leader");
                    self.set_hint(addr).await;
                    self.drop_session().await;
                }
                Ok(RpcOutcome::InvalidRequest(msg)) => {
                    return CallOutcome::InvalidRequest(msg);
                }
                Err(e) => {
                    self.on_transport_failure(&e).await;
                    self.drop_session().await;
                }
            }
        }
    }

    async fn on_success(&self) {
        let mut slot = self.slot.lock().await;
        slot.consecutive_failures = 0;
    }

    async fn clear_hint(&self) {
        let mut slot = self.slot.lock().await;
        slot.leader_hint = None;
    }

    async fn set_hint(&self, addr: String) {
        let mut slot = self.slot.lock().await;
        slot.leader_hint = Some(addr);
    }

    async fn drop_session(&self) {
        let mut slot = self.slot.lock().await;
        slot.session = None;
    }

    async fn on_transport_failure(&self, e: &TransportError) {
        let mut slot = self.slot.lock().await;
        slot.consecutive_failures += 1;
        // Log only at powers of two to avoid flooding (spec.md §4.4).
        if slot.consecutive_failures.is_power_of_two() {
            warn!(failures = slot.consecutive_failures, error = %e, "leader RPC transport failure");
        }
    }

    /// Returns a live session, establishing one if necessary. Only one
    /// caller at a time is ever inside the "establish new session" section
    /// (the mutex plays the role spec.md §5 assigns to a mutex + condition
    /// variable: "only one thread at a time may be in the establish new
    /// session state, others wait").
    async fn ensure_session(&self, deadline: Instant) -> Option<Arc<dyn Session>> {
        let mut slot = self.slot.lock().await;
        if let Some(s) = &slot.session {
            return Some(s.clone());
        }

        self.backoff.acquire().await;

        let candidates = self.candidate_order(&slot);
        for addr_str in candidates {
            if Instant::now() >= deadline {
                break;
            }
            let mut address = Address::new(addr_str, self.default_port);
            address.refresh().await;
            if !address.is_valid() {
                continue;
            }

            let expected_uuid = self.cluster_uuid.lock().await.clone();
            match self
                .transport
                .connect(&address, expected_uuid.as_deref(), self.expected_server_id, deadline)
                .await
            {
                Ok(session) => {
                    let session: Arc<dyn Session> = Arc::from(session);
                    if expected_uuid.is_none() {
                        if let Some(learned) = session.peer_cluster_uuid() {
                            *self.cluster_uuid.lock().await = Some(learned.to_string());
                        }
                    }
                    slot.session = Some(session.clone());
                    slot.consecutive_failures = 0;
                    return Some(session);
                }
                Err(e) => {
                    slot.consecutive_failures += 1;
                    if slot.consecutive_failures.is_power_of_two() {
                        warn!(
                            failures = slot.consecutive_failures,
                            error = %e,
                            "failed to establish session"
                        );
                    }
                }
            }
        }
        None
    }

    fn candidate_order(&self, slot: &Slot) -> Vec<String> {
        if let Some(hint) = &slot.leader_hint {
            return vec![hint.clone()];
        }
        let mut candidates = self.addresses.clone();
        use rand::seq::SliceRandom;
        candidates.shuffle(&mut rand::thread_rng());
        candidates
    }
}

enum CallState {
    Pending,
    Running,
    Done(CallOutcome),
    Canceled,
}

struct CallInner {
    state: Mutex<CallState>,
    notify: Notify,
    cancel_flag: AtomicBool,
}

/// The asynchronous call handle (spec.md §4.4, §9): `start` kicks off the
/// retrying call as a background task, `cancel` may be invoked from any
/// thread once `start` has returned, and `wait` blocks for the outcome.
pub struct Call {
    leader_rpc: Arc<LeaderRpc>,
    inner: Arc<CallInner>,
}

impl Call {
    fn new(leader_rpc: Arc<LeaderRpc>) -> Call {
        Call {
            leader_rpc,
            inner: Arc::new(CallInner {
                state: Mutex::new(CallState::Pending),
                notify: Notify::new(),
                cancel_flag: AtomicBool::new(false),
            }),
        }
    }

    pub async fn start(&self, opcode: OpCode, request: Vec<u8>, deadline: Instant) {
        {
            let mut state = self.inner.state.lock().await;
            *state = CallState::Running;
        }
        let leader_rpc = self.leader_rpc.clone();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome =
                leader_rpc.call_retrying(opcode, request, deadline, &inner.cancel_flag).await;
            let mut state = inner.state.lock().await;
            if !matches!(*state, CallState::Canceled) {
                *state = CallState::Done(outcome);
                inner.notify.notify_waiters();
            }
        });
    }

    /// Safe to call from any thread after [`Call::start`] has returned. A
    /// canceled in-flight call makes [`Call::wait`] return
    /// [`WaitOutcome::Retry`].
    pub fn cancel(&self) {
        self.inner.cancel_flag.store(true, Ordering::SeqCst);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut state = inner.state.lock().await;
            if matches!(*state, CallState::Pending | CallState::Running) {
                *state = CallState::Canceled;
                inner.notify.notify_waiters();
            }
        });
    }

    pub async fn wait(&self, deadline: Instant) -> WaitOutcome {
        loop {
            {
                let mut state = self.inner.state.lock().await;
                match &*state {
                    CallState::Done(_) => {
                        let CallState::Done(outcome) =
                            std::mem::replace(&mut *state, CallState::Canceled)
                        else {
                            unreachable!()
                        };
                        return match outcome {
                            CallOutcome::Ok(bytes) => WaitOutcome::Ok(bytes),
                            CallOutcome::Timeout => WaitOutcome::Timeout,
                            CallOutcome::InvalidRequest(msg) => WaitOutcome::InvalidRequest(msg),
                        };
                    }
                    CallState::Canceled => return WaitOutcome::Retry,
                    CallState::Pending | CallState::Running => {}
                }
            }
            let budget = deadline.saturating_duration_since(Instant::now());
            if budget.is_zero() {
                return WaitOutcome::Timeout;
            }
            tokio::select! {
                _ = self.inner.notify.notified() => {}
                _ = tokio::time::sleep(budget) => return WaitOutcome::Timeout,
            }
        }
    }
}
