//! The application-facing facade (spec.md §4.6): `TreeHandle` is the Rust
//! rendition of `LogCabin::Client::Tree`, `Cluster` of
//! `LogCabin::Client::Cluster`. Grounded on `include/LogCabin/Client.h`'s
//! public surface.

use std::time::{Duration, Instant};

use crate::error::{Failure, OpResult};
use crate::path::PathName;
use crate::rpc::{
    Configuration, ServerControlRequest, ServerControlResponse, ServerDescriptor, ServerInfo,
    ServerStats, SetConfigurationResult,
};
use crate::tree::Condition;

use super::ClientBackend;
use std::sync::Arc;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// The copy-on-write `{workingDirectory, condition, timeout}` bundle from
/// `Client.h`'s `Tree::TreeDetails` (spec.md §4.6): cloning a `TreeHandle`
/// gives an independent value, exactly like copying the C++ `Tree` object
/// does, since nothing here is shared through an `Arc` except the backend
/// itself.
///
/// A failed [`TreeHandle::set_working_directory`] or
/// [`TreeHandle::set_condition`] poisons the handle (spec.md §4.6, §9):
/// the bad path couldn't be resolved, so every subsequent operation
/// returns that same error until a *successful* call to either setter
/// clears it, rather than silently operating against a stale or
/// partially-applied state.
#[derive(Clone)]
pub struct TreeHandle {
    backend: Arc<dyn ClientBackend>,
    working_directory: String,
    condition: Condition,
    timeout: Duration,
    poisoned: Option<Failure>,
}

impl TreeHandle {
    pub(crate) fn new(backend: Arc<dyn ClientBackend>) -> TreeHandle {
        TreeHandle {
            backend,
            working_directory: "/".to_string(),
            condition: Condition::none(),
            timeout: DEFAULT_TIMEOUT,
            poisoned: None,
        }
    }

    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    /// Resolves `path` against the current working directory and, on
    /// success, makes it the new working directory and issues an idempotent
    /// `makeDirectory` at the resolved path (spec.md §4.6), so that `cd`-ing
    /// into a not-yet-existing directory brings it into being. A relative or
    /// malformed `path` poisons the handle instead of leaving the old
    /// working directory silently in place.
    pub async fn set_working_directory(&mut self, path: &str) -> OpResult<()> {
        match PathName::parse(path, &self.working_directory) {
            Ok(p) => {
                let resolved = p.canonical();
                self.backend
                    .make_directory(&resolved, &Condition::none(), self.deadline())
                    .await?;
                self.working_directory = resolved;
                self.poisoned = None;
                Ok(())
            }
            Err(e) => {
                self.poisoned = Some(e.clone());
                Err(e)
            }
        }
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Attaches a condition to every mutating call this handle makes from
    /// now on, until [`TreeHandle::clear_condition`] or another
    /// `set_condition`/`set_working_directory`.
    pub fn set_condition(&mut self, path: &str, contents: impl Into<Vec<u8>>) -> OpResult<()> {
        match PathName::parse(path, &self.working_directory) {
            Ok(p) => {
                self.condition = Condition { path: p.canonical(), contents: contents.into() };
                self.poisoned = None;
                Ok(())
            }
            Err(e) => {
                self.poisoned = Some(e.clone());
                Err(e)
            }
        }
    }

    pub fn clear_condition(&mut self) {
        self.condition = Condition::none();
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    fn check_poison(&self) -> OpResult<()> {
        match &self.poisoned {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn resolve(&self, path: &str) -> OpResult<String> {
        Ok(PathName::parse(path, &self.working_directory)?.canonical())
    }

    pub async fn make_directory(&self, path: &str) -> OpResult<()> {
        self.check_poison()?;
        let path = self.resolve(path)?;
        self.backend.make_directory(&path, &self.condition, self.deadline()).await
    }

    pub async fn make_directory_ex(&self, path: &str) {
        self.make_directory(path)
            .await
            .unwrap_or_else(|e| panic!("makeDirectory({path}) failed: {e}"))
    }

    pub async fn list_directory(&self, path: &str) -> OpResult<Vec<String>> {
        self.check_poison()?;
        let path = self.resolve(path)?;
        self.backend.list_directory(&path, self.deadline()).await
    }

    pub async fn list_directory_ex(&self, path: &str) -> Vec<String> {
        self.list_directory(path)
            .await
            .unwrap_or_else(|e| panic!("listDirectory({path}) failed: {e}"))
    }

    pub async fn remove_directory(&self, path: &str) -> OpResult<()> {
        self.check_poison()?;
        let path = self.resolve(path)?;
        self.backend.remove_directory(&path, &self.condition, self.deadline()).await
    }

    pub async fn remove_directory_ex(&self, path: &str) {
        self.remove_directory(path)
            .await
            .unwrap_or_else(|e| panic!("removeDirectory({path}) failed: {e}"))
    }

    pub async fn write(&self, path: &str, contents: impl Into<Vec<u8>>) -> OpResult<()> {
        self.check_poison()?;
        let path = self.resolve(path)?;
        self.backend.write(&path, contents.into(), &self.condition, self.deadline()).await
    }

    pub async fn write_ex(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let contents = contents.into();
        self.write(path, contents)
            .await
            .unwrap_or_else(|e| panic!("write({path}) failed: {e}"))
    }

    pub async fn read(&self, path: &str) -> OpResult<Vec<u8>> {
        self.check_poison()?;
        let path = self.resolve(path)?;
        self.backend.read(&path, self.deadline()).await
    }

    pub async fn read_ex(&self, path: &str) -> Vec<u8> {
        self.read(path).await.unwrap_or_else(|e| panic!("read({path}) failed: {e}"))
    }

    pub async fn remove_file(&self, path: &str) -> OpResult<()> {
        self.check_poison()?;
        let path = self.resolve(path)?;
        self.backend.remove_file(&path, &self.condition, self.deadline()).await
    }

    pub async fn remove_file_ex(&self, path: &str) {
        self.remove_file(path)
            .await
            .unwrap_or_else(|e| panic!("removeFile({path}) failed: {e}"))
    }
}

/// A handle to the cluster as a whole, independent of any particular
/// `TreeHandle` (spec.md §4.6, §10): configuration management, server
/// info, server control, and server stats.
#[derive(Clone)]
pub struct Cluster {
    backend: Arc<dyn ClientBackend>,
    timeout: Duration,
}

impl Cluster {
    pub fn new(backend: Arc<dyn ClientBackend>) -> Cluster {
        Cluster { backend, timeout: DEFAULT_TIMEOUT }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    /// A fresh [`TreeHandle`] rooted at `/`, sharing this cluster's
    /// backend.
    pub fn tree(&self) -> TreeHandle {
        TreeHandle::new(self.backend.clone())
    }

    pub async fn get_configuration(&self) -> OpResult<Configuration> {
        self.backend.get_configuration(self.deadline()).await
    }

    pub async fn set_configuration(
        &self,
        old_id: u64,
        new_servers: Vec<ServerDescriptor>,
    ) -> OpResult<SetConfigurationResult> {
        self.backend.set_configuration(old_id, new_servers, self.deadline()).await
    }

    pub async fn get_server_info(&self) -> OpResult<ServerInfo> {
        self.backend.get_server_info(self.deadline()).await
    }

    pub async fn server_control(
        &self,
        request: ServerControlRequest,
    ) -> OpResult<ServerControlResponse> {
        self.backend.server_control(request, self.deadline()).await
    }

    pub async fn get_server_stats(&self) -> OpResult<ServerStats> {
        self.backend.get_server_stats(self.deadline()).await
    }

    /// Releases background resources held by the backend (e.g. a real
    /// `ClientImpl`'s keep-alive worker). Safe to call more than once.
    pub async fn shutdown(&self) {
        self.backend.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestingShim;

    fn cluster() -> Cluster {
        Cluster::new(TestingShim::new())
    }

    #[tokio::test]
    async fn tree_operations_round_trip_through_testing_shim() {
        let c = cluster();
        let tree = c.tree();
        tree.make_directory("/a/b").await.unwrap();
        tree.write("/a/b/c", b"hello".to_vec()).await.unwrap();
        assert_eq!(tree.read("/a/b/c").await.unwrap(), b"hello".to_vec());
        assert_eq!(tree.list_directory("/a/b").await.unwrap(), vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn set_working_directory_creates_the_resolved_path() {
        let c = cluster();
        let mut tree = c.tree();
        tree.set_working_directory("/does/not/exist/yet").await.unwrap();
        tree.write("file", b"x".to_vec()).await.unwrap();
        assert_eq!(tree.read("/does/not/exist/yet/file").await.unwrap(), b"x".to_vec());
    }

    #[tokio::test]
    async fn relative_paths_resolve_against_working_directory() {
        let c = cluster();
        let mut tree = c.tree();
        tree.make_directory("/a/b").await.unwrap();
        tree.set_working_directory("/a").await.unwrap();
        tree.write("b/c", b"x".to_vec()).await.unwrap();
        assert_eq!(tree.read("/a/b/c").await.unwrap(), b"x".to_vec());
    }

    #[tokio::test]
    async fn failed_set_working_directory_poisons_the_handle() {
        let c = cluster();
        let mut tree = c.tree();
        // A relative path with no leading "/" given a working directory of
        // "/" is itself already absolute-relative and resolves fine, so use
        // an input PathName::parse actually rejects: a component that's
        // empty after collapsing is fine, but a `..` that walks above
        // working directory root is rejected.
        let err = tree.set_working_directory("/a/../../b").await.unwrap_err();
        assert_eq!(tree.read("/anything").await.unwrap_err(), err);
    }

    #[tokio::test]
    async fn condition_gate_applies_to_tree_operations() {
        let c = cluster();
        let mut tree = c.tree();
        tree.write("/a", b"v1".to_vec()).await.unwrap();
        tree.set_condition("/a", b"wrong".to_vec()).unwrap();
        let err = tree.write("/b", b"x".to_vec()).await.unwrap_err();
        assert_eq!(err.status, crate::error::Status::ConditionNotMet);
        tree.clear_condition();
        tree.write("/b", b"x".to_vec()).await.unwrap();
    }

    #[tokio::test]
    async fn cluster_configuration_round_trips() {
        let c = cluster();
        let config = c.get_configuration().await.unwrap();
        assert_eq!(config.id, 1);
        let result = c
            .set_configuration(
                config.id,
                vec![ServerDescriptor { server_id: 1, addresses: "127.0.0.1:5254".to_string() }],
            )
            .await
            .unwrap();
        assert!(matches!(result, SetConfigurationResult::Ok));
    }
}
