//! Error types for NETCONF sessions, message framing and element trees.
//!
//! This module defines all errors that can occur while establishing a
//! session, encoding or decoding messages, building requests and editing
//! element trees.

use thiserror::Error;

use crate::rpc::RpcError;

/// Errors that can occur during NETCONF session management and data handling.
#[derive(Error, Debug)]
pub enum NetconfError {
    /// The transport failed to read, write or close.
    ///
    /// Transport errors are always fatal to the session.
    #[error("transport error: {0}")]
    Transport(String),

    /// An I/O error from the underlying byte stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// Message content collides with the framing rules.
    ///
    /// Raised on encode when a payload contains the end-of-message marker,
    /// and on decode when a chunk header is invalid.
    #[error("framing violation: {0}")]
    FramingViolation(String),

    /// The document could not be parsed.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// A chunk or terminator is incomplete.
    ///
    /// Callers keep buffering unless the stream has ended.
    #[error("truncated frame")]
    TruncatedFrame,

    /// The peer did not send its hello within the configured deadline.
    #[error("hello timeout after {0}s")]
    HelloTimeout(u64),

    /// No common protocol version, or an unusable peer hello.
    #[error("capability negotiation failed: {0}")]
    CapabilityNegotiation(String),

    /// A request is missing a required parameter or sets conflicting ones.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request needs a capability the peer did not advertise.
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// The session is not in the `Active` state.
    #[error("session not active: {0}")]
    SessionNotActive(String),

    /// The session has been closed.
    #[error("session closed")]
    SessionClosed,

    /// No reply arrived for the given message-id in time.
    #[error("request {0} timed out")]
    RequestTimeout(u64),

    /// The caller cancelled the pending request with the given message-id.
    #[error("request {0} cancelled")]
    Cancelled(u64),

    /// A required path did not match any node.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// A `create` edit targeted a node that already exists.
    #[error("data exists: {0}")]
    DataExists(String),

    /// A `delete` edit targeted a node that does not exist.
    #[error("data missing: {0}")]
    DataMissing(String),

    /// The peer answered with one or more `<rpc-error>` elements.
    #[error("rpc failed: {}", format_rpc_errors(.0))]
    Rpc(Vec<RpcError>),

    /// No recorded reply matched during offline replay.
    #[error("replay mismatch: {0}")]
    ReplayMismatchError(String),

    /// Internal server error
    #[error("internal error: {0}")]
    InternalServerError(String),
}

fn format_rpc_errors(errors: &[RpcError]) -> String {
    errors
        .iter()
        .map(|e| match &e.message {
            Some(message) => format!("{} ({})", e.tag, message),
            None => e.tag.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
