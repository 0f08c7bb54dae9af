//! Capability URIs, capability sets and protocol version negotiation.

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::codec::FramingMode;
use crate::config::{CAPABILITY_BASE_1_0, CAPABILITY_BASE_1_1, NETCONF_BASE_NS};
use crate::element::Element;
use crate::error::NetconfError;

static STANDARD_CAPABILITY: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(r"^urn:ietf:params:netconf:(?:capability:)?([A-Za-z][\w\-]*):(\d+\.\d+)$") {
        Ok(re) => re,
        Err(err) => panic!("invalid STANDARD_CAPABILITY regex: {err}"),
    }
});

/// One capability URI with its optional query parameters
/// (`?module=..&revision=..`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability {
    uri: String,
    base: String,
    params: Vec<(String, String)>,
}

impl Capability {
    pub fn parse(uri: &str) -> Result<Self, NetconfError> {
        let uri = uri.trim();
        if uri.is_empty() || uri.contains(char::is_whitespace) {
            return Err(NetconfError::CapabilityNegotiation(format!(
                "invalid capability URI '{uri}'"
            )));
        }
        let (base, query) = match uri.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (uri, None),
        };
        let params = query
            .map(|q| {
                q.split('&')
                    .filter(|pair| !pair.is_empty())
                    .map(|pair| match pair.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (pair.to_string(), String::new()),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            uri: uri.to_string(),
            base: base.to_string(),
            params,
        })
    }

    /// Full URI as advertised.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// URI without query parameters.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn module(&self) -> Option<&str> {
        self.param("module")
    }

    pub fn revision(&self) -> Option<&str> {
        self.param("revision")
    }

    /// Feature names from the `features=` parameter.
    pub fn features(&self) -> Vec<&str> {
        self.param("features")
            .map(|f| f.split(',').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// RFC 6241 shorthand such as `:candidate` for standard capabilities.
    pub fn short_name(&self) -> Option<String> {
        STANDARD_CAPABILITY
            .captures(&self.base)
            .map(|caps| format!(":{}", &caps[1]))
    }
}

impl FromStr for Capability {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::parse(s)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Ordered set of capabilities, deduplicated by URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    entries: Vec<Capability>,
}

impl Capabilities {
    pub fn new<I, S>(uris: I) -> Result<Self, NetconfError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for uri in uris {
            set.insert(Capability::parse(uri.as_ref())?);
        }
        Ok(set)
    }

    pub fn insert(&mut self, capability: Capability) {
        if !self.entries.iter().any(|c| c.uri == capability.uri) {
            self.entries.push(capability);
        }
    }

    /// Whether a capability with the same base URI is present; query
    /// parameters are ignored.
    pub fn has(&self, uri: &str) -> bool {
        let base = uri.split_once('?').map_or(uri, |(base, _)| base);
        self.entries.iter().any(|c| c.base == base)
    }

    pub fn has_any(&self, uris: &[&str]) -> bool {
        uris.iter().any(|uri| self.has(uri))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn uris(&self) -> Vec<String> {
        self.entries.iter().map(|c| c.uri.clone()).collect()
    }

    /// Base protocol versions present in the set.
    pub fn protocol_versions(&self) -> Vec<ProtocolVersion> {
        [ProtocolVersion::V1_0, ProtocolVersion::V1_1]
            .into_iter()
            .filter(|v| self.has(v.uri()))
            .collect()
    }

    /// Capabilities announcing a data model module.
    pub fn modules(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter().filter(|c| c.module().is_some())
    }

    pub fn module(&self, name: &str) -> Option<&Capability> {
        self.entries.iter().find(|c| c.module() == Some(name))
    }
}

/// NETCONF base protocol version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum ProtocolVersion {
    #[serde(rename = "1.0")]
    V1_0,
    #[serde(rename = "1.1")]
    V1_1,
}

impl ProtocolVersion {
    pub fn uri(&self) -> &'static str {
        match self {
            ProtocolVersion::V1_0 => CAPABILITY_BASE_1_0,
            ProtocolVersion::V1_1 => CAPABILITY_BASE_1_1,
        }
    }

    /// Framing used once this version is negotiated.
    pub fn framing(&self) -> FramingMode {
        match self {
            ProtocolVersion::V1_0 => FramingMode::EndOfMessage,
            ProtocolVersion::V1_1 => FramingMode::Chunked,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1_0 => f.write_str("1.0"),
            ProtocolVersion::V1_1 => f.write_str("1.1"),
        }
    }
}

/// Highest base version advertised by both sides.
pub fn negotiate(local: &Capabilities, peer: &Capabilities) -> Result<ProtocolVersion, NetconfError> {
    let peer_versions = peer.protocol_versions();
    local
        .protocol_versions()
        .into_iter()
        .filter(|v| peer_versions.contains(v))
        .max()
        .ok_or_else(|| {
            NetconfError::CapabilityNegotiation(format!(
                "no common base version (local {:?}, peer {:?})",
                local.protocol_versions(),
                peer_versions
            ))
        })
}

/// A `<hello>` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Present only in the server hello.
    pub session_id: Option<u32>,
    pub capabilities: Capabilities,
}

impl Hello {
    pub fn to_element(&self) -> Element {
        let capabilities = Element::new("capabilities").with_children(
            self.capabilities
                .iter()
                .map(|c| Element::leaf("capability", c.uri())),
        );
        let mut hello = Element::new("hello")
            .with_namespace(NETCONF_BASE_NS)
            .with_child(capabilities);
        if let Some(id) = self.session_id {
            hello.push_child(Element::leaf("session-id", id.to_string()));
        }
        hello
    }

    pub fn from_element(element: &Element) -> Result<Self, NetconfError> {
        if element.name() != "hello" {
            return Err(NetconfError::CapabilityNegotiation(format!(
                "expected <hello>, got <{}>",
                element.name()
            )));
        }
        if let Some(ns) = element.namespace()
            && ns != NETCONF_BASE_NS
        {
            return Err(NetconfError::CapabilityNegotiation(format!(
                "hello in unexpected namespace '{ns}'"
            )));
        }
        let list = element.child("capabilities").ok_or_else(|| {
            NetconfError::CapabilityNegotiation("hello without <capabilities>".to_string())
        })?;
        let capabilities = Capabilities::new(
            list.children()
                .iter()
                .filter(|c| c.name() == "capability")
                .filter_map(Element::text),
        )?;
        let session_id = element
            .child_text("session-id")
            .map(|id| {
                id.trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|id| *id > 0)
                    .ok_or_else(|| {
                        NetconfError::CapabilityNegotiation(format!("invalid session-id '{id}'"))
                    })
            })
            .transpose()?;
        Ok(Self {
            session_id,
            capabilities,
        })
    }
}
