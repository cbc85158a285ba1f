//! `TestingShim` (spec.md §4.7): an in-process [`crate::client::ClientBackend`]
//! good enough to drive [`crate::client::cluster::TreeHandle`] against a
//! real [`crate::tree::Tree`] without any transport, a TCP socket, or a
//! Raft log.
//!
//! Grounded on `Client.h`'s `TestingCallbacks` (`stateMachineQuery`/
//! `stateMachineCommand`, "unhandled" by default) and `Cluster`'s
//! testing-only constructor. The C++ interface is two opcode-dispatched
//! callbacks; this crate has no protobuf-style opcode dispatch to hook, so
//! [`TestingCallbacks`] is one method per tree operation instead — same
//! "return `None` to mean unhandled, fall through to the real tree"
//! contract, just typed per operation (documented as an Open Question
//! decision in DESIGN.md rather than a silent simplification).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client::ClientBackend;
use crate::error::OpResult;
use crate::rpc::{
    Configuration, ServerControlRequest, ServerControlResponse, ServerDescriptor, ServerInfo,
    ServerStats, SetConfigurationResult,
};
use crate::tree::{Condition, Tree};

/// Interception points for exercising error paths and edge cases a real
/// tree can't easily be driven into (spec.md §4.7). Every method defaults
/// to `None` ("unhandled"), which tells [`TestingShim`] to fall through to
/// the real in-process [`Tree`].
#[async_trait]
pub trait TestingCallbacks: Send + Sync {
    async fn make_directory(&self, _path: &str, _condition: &Condition) -> Option<OpResult<()>> {
        None
    }
    async fn list_directory(&self, _path: &str) -> Option<OpResult<Vec<String>>> {
        None
    }
    async fn remove_directory(&self, _path: &str, _condition: &Condition) -> Option<OpResult<()>> {
        None
    }
    async fn write(
        &self,
        _path: &str,
        _contents: &[u8],
        _condition: &Condition,
    ) -> Option<OpResult<()>> {
        None
    }
    async fn read(&self, _path: &str) -> Option<OpResult<Vec<u8>>> {
        None
    }
    async fn remove_file(&self, _path: &str, _condition: &Condition) -> Option<OpResult<()>> {
        None
    }
}

/// An in-process stand-in for a whole cluster: one [`Tree`] guarded by a
/// `tokio::sync::Mutex` (spec.md §5: "serializing execution with a
/// mutex"), with no sessions, no leader election, no network.
pub struct TestingShim {
    tree: Mutex<Tree>,
    callbacks: Option<Arc<dyn TestingCallbacks>>,
    configuration: Mutex<Configuration>,
    server_id: u64,
}

impl TestingShim {
    pub fn new() -> Arc<TestingShim> {
        TestingShim::with_callbacks_opt(None)
    }

    pub fn with_callbacks(callbacks: Arc<dyn TestingCallbacks>) -> Arc<TestingShim> {
        TestingShim::with_callbacks_opt(Some(callbacks))
    }

    fn with_callbacks_opt(callbacks: Option<Arc<dyn TestingCallbacks>>) -> Arc<TestingShim> {
        let server_id = 1;
        Arc::new(TestingShim {
            tree: Mutex::new(Tree::new()),
            callbacks,
            configuration: Mutex::new(Configuration {
                id: 1,
                servers: vec![ServerDescriptor { server_id, addresses: "testing".to_string() }],
            }),
            server_id,
        })
    }
}

#[async_trait]
impl ClientBackend for TestingShim {
    async fn make_directory(
        &self,
        path: &str,
        condition: &Condition,
        _deadline: Instant,
    ) -> OpResult<()> {
        if let Some(cb) = &self.callbacks {
            if let Some(result) = cb.make_directory(path, condition).await {
                return result;
            }
        }
        self.tree.lock().await.make_directory(path, Some(condition))
    }

    async fn list_directory(&self, path: &str, _deadline: Instant) -> OpResult<Vec<String>> {
        if let Some(cb) = &self.callbacks {
            if let Some(result) = cb.list_directory(path).await {
                return result;
            }
        }
        self.tree.lock().await.list_directory(path)
    }

    async fn remove_directory(
        &self,
        path: &str,
        condition: &Condition,
        _deadline: Instant,
    ) -> OpResult<()> {
        if let Some(cb) = &self.callbacks {
            if let Some(result) = cb.remove_directory(path, condition).await {
                return result;
            }
        }
        self.tree.lock().await.remove_directory(path, Some(condition))
    }

    async fn write(
        &self,
        path: &str,
        contents: Vec<u8>,
        condition: &Condition,
        _deadline: Instant,
    ) -> OpResult<()> {
        if let Some(cb) = &self.callbacks {
            if let Some(result) = cb.write(path, &contents, condition).await {
                return result;
            }
        }
        self.tree.lock().await.write(path, contents, Some(condition))
    }

    async fn read(&self, path: &str, _deadline: Instant) -> OpResult<Vec<u8>> {
        if let Some(cb) = &self.callbacks {
            if let Some(result) = cb.read(path).await {
                return result;
            }
        }
        self.tree.lock().await.read(path)
    }

    async fn remove_file(
        &self,
        path: &str,
        condition: &Condition,
        _deadline: Instant,
    ) -> OpResult<()> {
        if let Some(cb) = &self.callbacks {
            if let Some(result) = cb.remove_file(path, condition).await {
                return result;
            }
        }
        self.tree.lock().await.remove_file(path, Some(condition))
    }

    async fn get_configuration(&self, _deadline: Instant) -> OpResult<Configuration> {
        Ok(self.configuration.lock().await.clone())
    }

    async fn set_configuration(
        &self,
        old_id: u64,
        new_servers: Vec<ServerDescriptor>,
        _deadline: Instant,
    ) -> OpResult<SetConfigurationResult> {
        let mut config = self.configuration.lock().await;
        if config.id != old_id {
            return Ok(SetConfigurationResult::ConfigurationChanged);
        }
        let bad: Vec<_> = new_servers.iter().filter(|s| s.server_id == 0).cloned().collect();
        if !bad.is_empty() {
            return Ok(SetConfigurationResult::Bad(bad));
        }
        config.id += 1;
        config.servers = new_servers;
        Ok(SetConfigurationResult::Ok)
    }

    async fn get_server_info(&self, _deadline: Instant) -> OpResult<ServerInfo> {
        Ok(ServerInfo { server_id: self.server_id, addresses: "testing".to_string() })
    }

    async fn server_control(
        &self,
        request: ServerControlRequest,
        _deadline: Instant,
    ) -> OpResult<ServerControlResponse> {
        Ok(ServerControlResponse { payload: request.payload })
    }

    async fn get_server_stats(&self, _deadline: Instant) -> OpResult<ServerStats> {
        let tree = self.tree.lock().await;
        Ok(ServerStats { server_id: self.server_id, tree: *tree.stats() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn far_future() -> Instant {
        Instant::now() + std::time::Duration::from_secs(30)
    }

    #[tokio::test]
    async fn unhandled_callbacks_fall_through_to_the_real_tree() {
        let shim = TestingShim::new();
        let none = Condition::none();
        shim.make_directory("/a", &none, far_future()).await.unwrap();
        shim.write("/a/b", b"hi".to_vec(), &none, far_future()).await.unwrap();
        assert_eq!(shim.read("/a/b", far_future()).await.unwrap(), b"hi".to_vec());
    }

    struct AlwaysDenyReads;

    #[async_trait]
    impl TestingCallbacks for AlwaysDenyReads {
        async fn read(&self, _path: &str) -> Option<OpResult<Vec<u8>>> {
            Some(Err(crate::error::Failure::invalid_argument("reads disabled for this test")))
        }
    }

    #[tokio::test]
    async fn callback_can_intercept_a_single_operation() {
        let shim = TestingShim::with_callbacks(Arc::new(AlwaysDenyReads));
        let none = Condition::none();
        shim.write("/a", b"hi".to_vec(), &none, far_future()).await.unwrap();
        let err = shim.read("/a", far_future()).await.unwrap_err();
        assert_eq!(err.status, crate::error::Status::InvalidArgument);
    }
}
