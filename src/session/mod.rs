//! NETCONF session engine.
//!
//! A [`Session`] owns one transport through a background I/O task. Callers
//! share the session by cloning it; every request gets the next message-id
//! and a reply slot, and replies are matched by message-id only, so any
//! number of requests may be outstanding at once.
//!
//! # Main Components
//!
//! - [`Session`] / [`SessionBuilder`] - Hello exchange, requests, close
//! - [`PendingReply`] - Handle to one outstanding request
//! - [`SessionObserver`] - Callbacks for discarded input and state changes
//! - [`SessionManager`] - Cache of SSH-backed sessions per device
//! - [`SessionRecorder`] / [`SessionReplayer`] - JSONL recording and offline replay
//! - [`ConfigTransaction`] - Lock, edit, validate and commit on the candidate datastore

use async_ssh2_tokio::ServerCheckMethod;
use log::{debug, trace, warn};
use moka::future::Cache;
use russh::Preferred;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::capabilities::{Capabilities, Hello, ProtocolVersion, negotiate};
use crate::codec::{FrameBuffer, FramingMode, decode, encode_message};
use crate::config::{self, SessionConfig};
use crate::element::Element;
use crate::error::NetconfError;
use crate::rpc::{
    CloseSession, Commit, ConfigSource, CopyConfig, CreateSubscription, Datastore, DefaultOperation,
    DeleteConfig, DiscardChanges, EditConfig, Filter, Get, GetConfig, KillSession, Lock,
    Notification, RpcReply, RpcRequest, Unlock, Validate, wrap_rpc,
};
use crate::transport::{SshTransport, Transport, TransportWriter};

pub use recording::{
    FrameDirection, NormalizeOptions, ReplayContext, SessionEvent, SessionRecordEntry,
    SessionRecordLevel, SessionRecorder, SessionReplayer,
};
pub use security::{ConnectionSecurityOptions, HostKeyPolicy, SecurityLevel};
pub use transaction::{ConfigTransaction, TxResult, TxStep};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum SessionState {
    Disconnected,
    HelloAwaited,
    Active,
    Closing,
    Closed,
}

/// Callbacks for events that do not belong to any caller.
///
/// Every method has a default that logs through the `log` facade.
pub trait SessionObserver: Send + Sync {
    fn on_state_change(&self, session_id: u32, from: SessionState, to: SessionState) {
        debug!("session {session_id}: {from:?} -> {to:?}");
    }

    /// A reply whose message-id matches no pending request, or has none.
    fn on_unknown_message_id(&self, session_id: u32, message_id: Option<&str>) {
        warn!(
            "session {session_id}: discarding reply with unknown message-id {:?}",
            message_id
        );
    }

    fn on_malformed_message(&self, session_id: u32, error: &NetconfError) {
        warn!("session {session_id}: discarding malformed message: {error}");
    }

    fn on_protocol_violation(&self, session_id: u32, reason: &str) {
        warn!("session {session_id}: protocol violation: {reason}");
    }
}

/// Observer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl SessionObserver for LogObserver {}

/// Receiver of notifications.
pub trait NotificationSink: Send + Sync {
    /// Returns `false` once the sink is gone; it is then unsubscribed.
    fn deliver(&self, notification: &Notification) -> bool;
}

impl NotificationSink for mpsc::UnboundedSender<Notification> {
    fn deliver(&self, notification: &Notification) -> bool {
        self.send(notification.clone()).is_ok()
    }
}

type ReplySlot = oneshot::Sender<Result<RpcReply, NetconfError>>;

enum Outbound {
    Message(Vec<u8>),
    Close,
}

struct SessionTable {
    state: SessionState,
    next_message_id: u64,
    pending: HashMap<u64, ReplySlot>,
}

struct SessionInner {
    table: Mutex<SessionTable>,
    outbound: mpsc::UnboundedSender<Outbound>,
    session_id: u32,
    version: ProtocolVersion,
    local: Capabilities,
    peer: Capabilities,
    config: SessionConfig,
    sinks: Mutex<Vec<Arc<dyn NotificationSink>>>,
    observer: Arc<dyn SessionObserver>,
    recorder: Option<SessionRecorder>,
    closed: watch::Receiver<bool>,
}

/// An open NETCONF session.
///
/// Cloning is cheap and yields another handle to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

/// Options for opening a [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
    observer: Arc<dyn SessionObserver>,
    recorder: Option<SessionRecorder>,
}

/// Handle to an outstanding request.
///
/// Dropping it gives up on the reply and frees its slot; a reply arriving
/// later is reported as an unknown message-id.
pub struct PendingReply {
    message_id: u64,
    rx: oneshot::Receiver<Result<RpcReply, NetconfError>>,
    session: Weak<SessionInner>,
}

/// Cache of SSH-backed sessions keyed by `user@addr:port`.
///
/// Sessions are evicted after 5 minutes of inactivity.
#[derive(Clone)]
pub struct SessionManager {
    cache: Cache<String, CachedSession>,
    config: SessionConfig,
}

#[derive(Clone)]
struct CachedSession {
    session: Session,
    password_hash: [u8; 32],
    security_options: ConnectionSecurityOptions,
}

mod client;
mod manager;
mod recording;
mod security;
mod transaction;
