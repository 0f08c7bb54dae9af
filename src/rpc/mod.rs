//! RPC request builders and reply decoding.
//!
//! Every request implements [`RpcRequest`]. `build` validates parameters
//! locally and checks the capabilities the operation depends on, so an
//! invalid request fails before anything is written to the transport.
//!
//! # Main Components
//!
//! - [`operations`] - One builder per protocol operation, plus [`RawRpc`]
//! - [`RpcReply`] / [`RpcError`] - Decoded `<rpc-reply>` documents
//! - [`Notification`] - Decoded `<notification>` documents

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::capabilities::Capabilities;
use crate::config::{
    CAPABILITY_CANDIDATE, CAPABILITY_STARTUP, CAPABILITY_URL, CAPABILITY_XPATH, NETCONF_BASE_NS,
};
use crate::element::Element;
use crate::error::NetconfError;

pub mod operations;
mod reply;

pub use operations::{
    CancelCommit, CloseSession, Commit, ConfigSource, CopyConfig, CreateSubscription,
    DeleteConfig, DiscardChanges, EditConfig, Get, GetConfig, KillSession, Lock, RawRpc, Unlock,
    Validate,
};
pub use reply::{Notification, RpcError, RpcReply};

/// A request that can be turned into an operation element.
pub trait RpcRequest {
    /// Operation name, e.g. `get-config`.
    fn name(&self) -> &str;

    /// Builds the operation element (without `<rpc>` envelope) for a peer
    /// advertising `capabilities`.
    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError>;
}

/// Configuration datastore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Datastore {
    Running,
    Candidate,
    Startup,
    Url(String),
}

impl Datastore {
    pub fn to_element(&self) -> Element {
        match self {
            Datastore::Running => Element::new("running"),
            Datastore::Candidate => Element::new("candidate"),
            Datastore::Startup => Element::new("startup"),
            Datastore::Url(url) => Element::leaf("url", url.clone()),
        }
    }

    /// Capability the datastore depends on, if any.
    pub fn capability(&self) -> Option<&'static str> {
        match self {
            Datastore::Running => None,
            Datastore::Candidate => Some(CAPABILITY_CANDIDATE),
            Datastore::Startup => Some(CAPABILITY_STARTUP),
            Datastore::Url(_) => Some(CAPABILITY_URL),
        }
    }

    pub(crate) fn check(&self, capabilities: &Capabilities) -> Result<(), NetconfError> {
        match self.capability() {
            Some(uri) => require(capabilities, &[uri]),
            None => Ok(()),
        }
    }
}

/// Data selection for `get`, `get-config` and `create-subscription`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Subtree(Element),
    XPath {
        select: String,
        /// Prefix declarations used by `select`.
        namespaces: Vec<(String, String)>,
    },
}

impl Filter {
    pub fn subtree(element: Element) -> Self {
        Filter::Subtree(element)
    }

    pub fn xpath(select: impl Into<String>) -> Self {
        Filter::XPath {
            select: select.into(),
            namespaces: Vec::new(),
        }
    }

    /// Declares a prefix used in an XPath filter. No effect on subtree filters.
    pub fn with_prefix(mut self, prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        if let Filter::XPath { namespaces, .. } = &mut self {
            namespaces.push((prefix.into(), namespace.into()));
        }
        self
    }

    pub(crate) fn to_element(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        match self {
            Filter::Subtree(content) => Ok(Element::new("filter")
                .with_attribute("type", "subtree")
                .with_child(user_data(content))),
            Filter::XPath { select, namespaces } => {
                require(capabilities, &[CAPABILITY_XPATH])?;
                if select.trim().is_empty() {
                    return Err(NetconfError::InvalidRequest(
                        "xpath filter needs a select expression".to_string(),
                    ));
                }
                let mut filter = Element::new("filter").with_attribute("type", "xpath");
                for (prefix, ns) in namespaces {
                    filter.set_attribute(format!("xmlns:{prefix}"), ns.clone());
                }
                filter.set_attribute("select", select.clone());
                Ok(filter)
            }
        }
    }
}

/// `<default-operation>` of edit-config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DefaultOperation {
    Merge,
    Replace,
    None,
}

impl DefaultOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefaultOperation::Merge => "merge",
            DefaultOperation::Replace => "replace",
            DefaultOperation::None => "none",
        }
    }
}

/// `<test-option>` of edit-config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TestOption {
    TestThenSet,
    Set,
    TestOnly,
}

impl TestOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestOption::TestThenSet => "test-then-set",
            TestOption::Set => "set",
            TestOption::TestOnly => "test-only",
        }
    }
}

/// `<error-option>` of edit-config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOption {
    StopOnError,
    ContinueOnError,
    RollbackOnError,
}

impl ErrorOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorOption::StopOnError => "stop-on-error",
            ErrorOption::ContinueOnError => "continue-on-error",
            ErrorOption::RollbackOnError => "rollback-on-error",
        }
    }
}

/// Wraps an operation element in an `<rpc>` envelope.
///
/// An element that already is an `<rpc>` only gets its message-id set.
pub fn wrap_rpc(operation: &Element, message_id: u64) -> Element {
    if operation.name() == "rpc" {
        let mut rpc = operation.clone();
        rpc.set_attribute("message-id", message_id.to_string());
        if rpc.namespace().is_none() {
            rpc.set_namespace(Some(NETCONF_BASE_NS.to_string()));
        }
        return rpc;
    }
    Element::new("rpc")
        .with_namespace(NETCONF_BASE_NS)
        .with_attribute("message-id", message_id.to_string())
        .with_child(operation.clone())
}

/// Operation element in the base namespace.
pub(crate) fn operation(name: &str) -> Element {
    Element::new(name).with_namespace(NETCONF_BASE_NS)
}

/// Caller data embedded under a base-namespace element. A node without
/// namespace must not pick up the base namespace from its new parent.
pub(crate) fn user_data(element: &Element) -> Element {
    let mut data = element.clone();
    if data.namespace().is_none() {
        data.set_namespace(Some(String::new()));
    }
    data
}

/// Fails with `UnsupportedCapability` unless one of `uris` was advertised.
pub(crate) fn require(capabilities: &Capabilities, uris: &[&str]) -> Result<(), NetconfError> {
    if capabilities.has_any(uris) {
        return Ok(());
    }
    let mut names = uris
        .iter()
        .map(|uri| {
            crate::capabilities::Capability::parse(uri)
                .ok()
                .and_then(|c| c.short_name())
                .unwrap_or_else(|| uri.to_string())
        })
        .collect::<Vec<_>>();
    names.dedup();
    Err(NetconfError::UnsupportedCapability(names.join(" or ")))
}
