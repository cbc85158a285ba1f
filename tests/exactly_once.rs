//! Exactly-once command semantics (spec.md §3, §4.5, §6.1) exercised over a
//! real loopback TCP connection: a command replayed with the same
//! `rpc_number` must come back with the identical cached response instead
//! of being applied a second time, and [`cabinetree::client::exactly_once::ExactlyOnceRpcHelper`]
//! must hand out strictly increasing numbers so a well-behaved client never
//! triggers that path itself.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use cabinetree::client::exactly_once::ExactlyOnceRpcHelper;
use cabinetree::client::leader_rpc::{CallOutcome, LeaderRpc};
use cabinetree::rpc::{wire, ExactlyOnceRpcInfo, OpCode, TreeCommand, TreeCommandRequest};
use cabinetree::transport::tcp::TcpTransport;
use cabinetree::tree::Condition;

fn encode_write(info: ExactlyOnceRpcInfo, path: &str, contents: &[u8]) -> Vec<u8> {
    let request = TreeCommandRequest {
        command: TreeCommand::Write { path: path.to_string(), contents: contents.to_vec() },
        condition: Condition::none(),
    };
    let mut buf = Vec::new();
    wire::write_exactly_once_info(&mut buf, &info).expect("encode");
    wire::write_tree_command_request(&mut buf, &request).expect("encode");
    buf
}

async fn open_session(leader_rpc: &LeaderRpc, deadline: Instant) -> u64 {
    match leader_rpc.call(OpCode::OpenSession, Vec::new(), deadline).await {
        CallOutcome::Ok(bytes) => {
            cabinetree::codec::read_u64(&mut bytes.as_slice()).expect("decode client_id")
        }
        other => panic!("OpenSession failed: {other:?}"),
    }
}

#[tokio::test]
async fn replaying_the_same_rpc_number_does_not_apply_the_command_twice() {
    let address = common::spawn_server().await;
    let transport = Arc::new(TcpTransport::new(Duration::from_secs(5)));
    let leader_rpc = Arc::new(LeaderRpc::new(transport, &address, 0, None));

    let deadline = Instant::now() + Duration::from_secs(5);
    let client_id = open_session(&leader_rpc, deadline).await;
    let info = ExactlyOnceRpcInfo { client_id, rpc_number: 1, first_outstanding: 1 };

    let first = match leader_rpc
        .call(OpCode::StateMachineCommand, encode_write(info, "/a", b"v1"), deadline)
        .await
    {
        CallOutcome::Ok(bytes) => bytes,
        other => panic!("unexpected outcome: {other:?}"),
    };

    // Same rpc_number, different payload: the server must replay the
    // cached response rather than overwrite "/a" with "v2".
    let second = match leader_rpc
        .call(OpCode::StateMachineCommand, encode_write(info, "/a", b"v2"), deadline)
        .await
    {
        CallOutcome::Ok(bytes) => bytes,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(first, second);

    let read_request = {
        let mut buf = Vec::new();
        wire::write_tree_query_request(
            &mut buf,
            &cabinetree::rpc::TreeQueryRequest {
                query: cabinetree::rpc::TreeQuery::Read { path: "/a".to_string() },
            },
        )
        .expect("encode");
        buf
    };
    let response = match leader_rpc.call(OpCode::StateMachineQuery, read_request, deadline).await {
        CallOutcome::Ok(bytes) => wire::read_tree_response(&mut bytes.as_slice()).expect("decode"),
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(response.contents, Some(b"v1".to_vec()));
}

#[tokio::test]
async fn a_well_behaved_client_never_reuses_an_rpc_number() {
    let address = common::spawn_server().await;
    let transport = Arc::new(TcpTransport::new(Duration::from_secs(5)));
    let leader_rpc = Arc::new(LeaderRpc::new(transport, &address, 0, None));
    let helper = ExactlyOnceRpcHelper::new(leader_rpc, Duration::from_secs(3600), Duration::from_secs(5));

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut seen = std::collections::BTreeSet::new();
    for _ in 0..20 {
        let info = helper.get_rpc_info(deadline).await.expect("get_rpc_info");
        assert!(seen.insert(info.rpc_number), "rpc_number {} was reused", info.rpc_number);
        helper.done_with_rpc(info).await;
    }

    helper.exit().await;
}
