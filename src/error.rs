//! Status codes and error types shared by the tree state machine and the
//! client library.

use std::fmt;

/// Client-visible status codes for tree operations (spec section 7).
///
/// `SessionExpired` and `InvalidRequest` are deliberately not variants here:
/// both are process-fatal internal conditions that never reach a caller as a
/// `Status` (see [`crate::client::client_impl`] and
/// [`crate::client::leader_rpc`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    InvalidArgument,
    LookupError,
    TypeError,
    ConditionNotMet,
    Timeout,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ok => "OK",
            Status::InvalidArgument => "INVALID_ARGUMENT",
            Status::LookupError => "LOOKUP_ERROR",
            Status::TypeError => "TYPE_ERROR",
            Status::ConditionNotMet => "CONDITION_NOT_MET",
            Status::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

/// A non-`Ok` outcome: a status paired with a human-readable message.
///
/// Mirrors `LogCabin::Tree::Result` / `LogCabin::Client::Result` (the
/// original carries `status == OK` too, with an empty error string; here we
/// fold the success case into `Ok(T)` and only construct `Failure` for the
/// error path, which is the idiomatic Rust rendition of the same contract).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub status: Status,
    pub error: String,
}

impl Failure {
    pub fn new(status: Status, error: impl Into<String>) -> Self {
        assert_ne!(status, Status::Ok, "Failure must not be constructed with Status::Ok");
        Failure { status, error: error.into() }
    }

    pub fn invalid_argument(error: impl Into<String>) -> Self {
        Failure::new(Status::InvalidArgument, error)
    }

    pub fn lookup_error(error: impl Into<String>) -> Self {
        Failure::new(Status::LookupError, error)
    }

    pub fn type_error(error: impl Into<String>) -> Self {
        Failure::new(Status::TypeError, error)
    }

    pub fn condition_not_met(error: impl Into<String>) -> Self {
        Failure::new(Status::ConditionNotMet, error)
    }

    pub fn timeout() -> Self {
        Failure::new(Status::Timeout, "Client-specified timeout elapsed")
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.error)
    }
}

impl std::error::Error for Failure {}

/// Result alias used throughout the tree and client layers.
pub type OpResult<T> = Result<T, Failure>;

/// Exception-style error returned by the `*_ex` methods on [`crate::client::cluster::TreeHandle`].
///
/// This is the Rust rendition of LogCabin's `Exception` hierarchy
/// (`InvalidArgumentException`, `LookupException`, `TypeException`,
/// `ConditionNotMetException`, `TimeoutException`): one status per variant,
/// preserved one-to-one, collapsed into a single type implementing
/// `std::error::Error` instead of five derived exception classes (see
/// DESIGN.md, "ClientError vs. Exception hierarchy").
pub type ClientError = Failure;
