//! End-to-end exercise of [`cabinetree::client::leader_rpc::LeaderRpc`]
//! and [`cabinetree::transport::tcp`] over a real loopback TCP socket: a
//! single-node [`cabinetree::server`] accepts the handshake, then answers
//! tree commands and queries framed exactly the way
//! [`cabinetree::client::client_impl::ClientImpl`] expects.

mod common;

use std::time::{Duration, Instant};

use cabinetree::rpc::OpCode;
use cabinetree::tree::Condition;

#[tokio::test]
async fn client_talks_to_a_real_server_over_tcp() {
    let address = common::spawn_server().await;
    let backend = common::make_client(&address);

    let deadline = Instant::now() + Duration::from_secs(5);
    let none = Condition::none();
    backend.make_directory("/a", &none, deadline).await.unwrap();
    backend.write("/a/b", b"hello".to_vec(), &none, deadline).await.unwrap();
    assert_eq!(backend.read("/a/b", deadline).await.unwrap(), b"hello".to_vec());
    assert_eq!(backend.list_directory("/a", deadline).await.unwrap(), vec!["b".to_string()]);

    backend.shutdown().await;
}

#[tokio::test]
async fn get_server_info_and_configuration_round_trip_over_tcp() {
    let address = common::spawn_server().await;
    let backend = common::make_client(&address);
    let deadline = Instant::now() + Duration::from_secs(5);

    let info = backend.get_server_info(deadline).await.unwrap();
    assert_eq!(info.server_id, 1);

    let config = backend.get_configuration(deadline).await.unwrap();
    assert_eq!(config.servers.len(), 1);
    assert_eq!(config.servers[0].server_id, 1);

    backend.shutdown().await;
}

#[tokio::test]
async fn a_handshake_with_the_wrong_cluster_uuid_is_rejected() {
    use cabinetree::transport::{Address, Transport};

    let address = common::spawn_server().await;
    let transport = cabinetree::transport::tcp::TcpTransport::new(Duration::from_secs(2));
    let mut resolvable = Address::new(address, 0);
    resolvable.refresh().await;
    let deadline = Instant::now() + Duration::from_secs(2);

    let err = transport
        .connect(&resolvable, Some("not-the-real-cluster-uuid"), None, deadline)
        .await
        .unwrap_err();
    assert!(err.0.contains("mismatch"));
}
