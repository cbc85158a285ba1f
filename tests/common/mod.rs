//! Shared fixture for the end-to-end (TCP) integration tests: boots a
//! single-node [`cabinetree::server`] on a loopback port and hands back a
//! real [`cabinetree::client::client_impl::ClientImpl`] pointed at it.

use std::sync::Arc;
use std::time::Duration;

use cabinetree::client::client_impl::ClientImpl;
use cabinetree::client::exactly_once::ExactlyOnceRpcHelper;
use cabinetree::client::leader_rpc::LeaderRpc;
use cabinetree::client::ClientBackend;
use cabinetree::server::ClusterState;
use cabinetree::transport::tcp::TcpTransport;
use tokio::net::TcpListener;

pub async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener has a local address").to_string();
    let state = Arc::new(ClusterState::new(
        "integration-test-cluster".to_string(),
        1,
        Duration::from_secs(60),
    ));
    tokio::spawn(async move {
        let _ = cabinetree::server::serve(listener, state).await;
    });
    addr
}

pub fn make_client(address: &str) -> Arc<dyn ClientBackend> {
    let transport = Arc::new(TcpTransport::new(Duration::from_secs(5)));
    let leader_rpc = Arc::new(LeaderRpc::new(transport, address, 0, None));
    let exactly_once =
        ExactlyOnceRpcHelper::new(leader_rpc.clone(), Duration::from_secs(3600), Duration::from_secs(5));
    ClientImpl::new(leader_rpc, exactly_once)
}
