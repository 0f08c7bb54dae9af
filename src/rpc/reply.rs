use std::fmt;

use crate::config::NETCONF_NOTIFICATION_NS;
use crate::element::{Element, effective_ns};
use crate::error::NetconfError;

/// One `<rpc-error>` of a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub error_type: String,
    pub tag: String,
    pub severity: String,
    pub app_tag: Option<String>,
    pub path: Option<String>,
    pub message: Option<String>,
    pub info: Option<Element>,
}

impl RpcError {
    pub fn from_element(element: &Element, parent_ns: Option<&str>) -> Self {
        let text = |name: &str| element.child_text(name).map(|t| t.trim().to_string());
        let ns = effective_ns(element, parent_ns);
        RpcError {
            error_type: text("error-type").unwrap_or_default(),
            tag: text("error-tag").unwrap_or_default(),
            severity: text("error-severity").unwrap_or_else(|| "error".to_string()),
            app_tag: text("error-app-tag"),
            path: text("error-path"),
            message: text("error-message"),
            info: element.child("error-info").map(|info| info.detached(ns)),
        }
    }

    /// Warnings do not make a reply fail.
    pub fn is_error(&self) -> bool {
        self.severity != "warning"
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.error_type, self.tag, self.severity)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " at {path}")?;
        }
        Ok(())
    }
}

/// Outcome of an RPC.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcReply {
    /// `<ok/>` or an empty reply.
    Ok,
    /// `<data>` of get/get-config, or the output of another operation
    /// wrapped in an `<rpc-reply>` element.
    Data(Element),
    /// One or more errors and nothing else.
    Errors(Vec<RpcError>),
    /// Errors (often warnings) alongside `<ok/>` or a result.
    Partial {
        data: Option<Element>,
        errors: Vec<RpcError>,
    },
}

impl RpcReply {
    pub fn from_element(reply: &Element) -> Result<Self, NetconfError> {
        if reply.name() != "rpc-reply" {
            return Err(NetconfError::MalformedDocument(format!(
                "expected <rpc-reply>, got <{}>",
                reply.name()
            )));
        }
        let ns = effective_ns(reply, None);
        let errors = reply
            .children()
            .iter()
            .filter(|c| c.name() == "rpc-error")
            .map(|c| RpcError::from_element(c, ns))
            .collect::<Vec<_>>();
        let has_ok = reply.child("ok").is_some();
        let output = reply
            .children()
            .iter()
            .filter(|c| !matches!(c.name(), "rpc-error" | "ok"))
            .cloned()
            .collect::<Vec<_>>();

        let data = match output.as_slice() {
            [] => None,
            [only] if only.name() == "data" => Some(only.detached(ns)),
            _ => {
                let mut wrapper = reply.clone_shallow();
                wrapper.set_namespace(Some(ns.unwrap_or_default().to_string()));
                *wrapper.children_mut() = output;
                Some(wrapper)
            }
        };

        Ok(match (data, errors.is_empty()) {
            (None, true) => RpcReply::Ok,
            (Some(data), true) => RpcReply::Data(data),
            (None, false) if !has_ok => RpcReply::Errors(errors),
            (data, false) => RpcReply::Partial { data, errors },
        })
    }

    /// True when no error of severity `error` was reported.
    pub fn is_ok(&self) -> bool {
        self.errors().iter().all(|e| !e.is_error())
    }

    pub fn data(&self) -> Option<&Element> {
        match self {
            RpcReply::Data(data) => Some(data),
            RpcReply::Partial { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    pub fn errors(&self) -> &[RpcError] {
        match self {
            RpcReply::Errors(errors) | RpcReply::Partial { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Converts into the returned data, failing with `NetconfError::Rpc`
    /// when an error (not a warning) was reported.
    pub fn into_result(self) -> Result<Option<Element>, NetconfError> {
        if !self.is_ok() {
            return Err(NetconfError::Rpc(self.errors().to_vec()));
        }
        Ok(match self {
            RpcReply::Data(data) => Some(data),
            RpcReply::Partial { data, .. } => data,
            _ => None,
        })
    }

    /// Like [`RpcReply::into_result`], requiring data to be present.
    pub fn into_data(self) -> Result<Element, NetconfError> {
        self.into_result()?
            .ok_or_else(|| NetconfError::MalformedDocument("reply carries no data".to_string()))
    }
}

/// RFC 5277 `<notification>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub event_time: String,
    pub event: Element,
}

impl Notification {
    pub fn from_element(element: &Element) -> Result<Self, NetconfError> {
        if element.name() != "notification" {
            return Err(NetconfError::MalformedDocument(format!(
                "expected <notification>, got <{}>",
                element.name()
            )));
        }
        let ns = effective_ns(element, None);
        if ns.is_some_and(|ns| ns != NETCONF_NOTIFICATION_NS) {
            return Err(NetconfError::MalformedDocument(
                "notification in unexpected namespace".to_string(),
            ));
        }
        let event_time = element
            .child_text("eventTime")
            .map(|t| t.trim().to_string())
            .ok_or_else(|| NetconfError::MalformedDocument("notification without eventTime".to_string()))?;
        let event = element
            .children()
            .iter()
            .find(|c| c.name() != "eventTime")
            .map(|c| c.detached(ns))
            .ok_or_else(|| NetconfError::MalformedDocument("notification without event".to_string()))?;
        Ok(Self { event_time, event })
    }
}
