//! Cabinetree: a replicated, Raft-backed hierarchical key-value tree
//! service and its client library.
//!
//! This crate implements the pieces of the contract that sit above the
//! consensus log itself (spec.md §1): the deterministic [`tree`] state
//! machine, the client-side session and routing layers under [`client`],
//! the wire contract in [`rpc`], a thin real [`transport`], a
//! single-node [`server`] stand-in good enough to drive the client
//! end-to-end, and the in-process [`testing`] shim used by this crate's
//! own tests and by applications built on top of it.

pub mod client;
pub mod codec;
pub mod error;
pub mod path;
pub mod rpc;
pub mod server;
pub mod testing;
pub mod transport;
pub mod tree;

pub use client::cluster::{Cluster, TreeHandle};
pub use error::{ClientError, OpResult, Status};
