//! The client-side half of the contract (spec.md §4.4-§4.7): routes calls
//! to the cluster leader, maintains exactly-once session state, and
//! exposes the `Tree`/`Cluster` facade applications actually program
//! against. [`crate::testing::TestingShim`] implements the same
//! [`ClientBackend`] seam in-process, so [`cluster::TreeHandle`] and
//! [`cluster::Cluster`] don't know or care whether they're talking to a
//! real cluster or a test double.

pub mod client_impl;
pub mod cluster;
pub mod exactly_once;
pub mod leader_rpc;

use std::time::Instant;

use async_trait::async_trait;

use crate::error::OpResult;
use crate::rpc::{
    Configuration, ServerControlRequest, ServerControlResponse, ServerDescriptor, ServerInfo,
    ServerStats, SetConfigurationResult,
};
use crate::tree::Condition;

/// Everything a [`cluster::TreeHandle`]/[`cluster::Cluster`] needs from
/// whatever is actually running the tree: a real cluster
/// ([`client_impl::ClientImpl`]) or an in-process double
/// ([`crate::testing::TestingShim`]). Mirrors the public method list on
/// `Client::ClientImpl` (spec.md §4.6).
#[async_trait]
pub trait ClientBackend: Send + Sync {
    async fn make_directory(
        &self,
        path: &str,
        condition: &Condition,
        deadline: Instant,
    ) -> OpResult<()>;

    async fn list_directory(&self, path: &str, deadline: Instant) -> OpResult<Vec<String>>;

    async fn remove_directory(
        &self,
        path: &str,
        condition: &Condition,
        deadline: Instant,
    ) -> OpResult<()>;

    async fn write(
        &self,
        path: &str,
        contents: Vec<u8>,
        condition: &Condition,
        deadline: Instant,
    ) -> OpResult<()>;

    async fn read(&self, path: &str, deadline: Instant) -> OpResult<Vec<u8>>;

    async fn remove_file(
        &self,
        path: &str,
        condition: &Condition,
        deadline: Instant,
    ) -> OpResult<()>;

    async fn get_configuration(&self, deadline: Instant) -> OpResult<Configuration>;

    async fn set_configuration(
        &self,
        old_id: u64,
        new_servers: Vec<ServerDescriptor>,
        deadline: Instant,
    ) -> OpResult<SetConfigurationResult>;

    async fn get_server_info(&self, deadline: Instant) -> OpResult<ServerInfo>;

    async fn server_control(
        &self,
        request: ServerControlRequest,
        deadline: Instant,
    ) -> OpResult<ServerControlResponse>;

    async fn get_server_stats(&self, deadline: Instant) -> OpResult<ServerStats>;

    /// Releases any background resources (e.g. `ClientImpl`'s keep-alive
    /// worker). A no-op for backends that don't need it.
    async fn shutdown(&self) {}
}
