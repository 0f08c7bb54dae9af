//! Builders for the protocol operations of RFC 6241 and RFC 5277.

use crate::capabilities::Capabilities;
use crate::config::{
    CAPABILITY_CANDIDATE, CAPABILITY_CONFIRMED_COMMIT, CAPABILITY_CONFIRMED_COMMIT_1_0,
    CAPABILITY_NOTIFICATION, CAPABILITY_ROLLBACK_ON_ERROR, CAPABILITY_URL, CAPABILITY_VALIDATE,
    CAPABILITY_VALIDATE_1_0, CAPABILITY_WRITABLE_RUNNING, NETCONF_NOTIFICATION_NS,
};
use crate::element::Element;
use crate::error::NetconfError;

use super::{
    Datastore, DefaultOperation, ErrorOption, Filter, RpcRequest, TestOption, operation, require,
    user_data,
};

const VALIDATE_ANY: &[&str] = &[CAPABILITY_VALIDATE, CAPABILITY_VALIDATE_1_0];
const CONFIRMED_COMMIT_ANY: &[&str] = &[CAPABILITY_CONFIRMED_COMMIT, CAPABILITY_CONFIRMED_COMMIT_1_0];

fn invalid(reason: impl Into<String>) -> NetconfError {
    NetconfError::InvalidRequest(reason.into())
}

fn single_filter(filters: &[Filter], capabilities: &Capabilities) -> Result<Option<Element>, NetconfError> {
    match filters {
        [] => Ok(None),
        [filter] => filter.to_element(capabilities).map(Some),
        _ => Err(invalid("subtree and xpath filters are mutually exclusive")),
    }
}

/// Datastore a configuration is written to, checked against
/// `:writable-running` and `:candidate`.
fn writable_target(target: &Datastore, capabilities: &Capabilities) -> Result<(), NetconfError> {
    match target {
        Datastore::Running => require(capabilities, &[CAPABILITY_WRITABLE_RUNNING]),
        other => other.check(capabilities),
    }
}

/// `<get>`: running configuration and state data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Get {
    filters: Vec<Filter>,
}

impl Get {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

impl RpcRequest for Get {
    fn name(&self) -> &str {
        "get"
    }

    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        let mut get = operation("get");
        if let Some(filter) = single_filter(&self.filters, capabilities)? {
            get.push_child(filter);
        }
        Ok(get)
    }
}

/// `<get-config>`.
#[derive(Debug, Clone, PartialEq)]
pub struct GetConfig {
    source: Datastore,
    filters: Vec<Filter>,
}

impl GetConfig {
    pub fn new(source: Datastore) -> Self {
        Self {
            source,
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

impl RpcRequest for GetConfig {
    fn name(&self) -> &str {
        "get-config"
    }

    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        self.source.check(capabilities)?;
        let mut get = operation("get-config")
            .with_child(Element::new("source").with_child(self.source.to_element()));
        if let Some(filter) = single_filter(&self.filters, capabilities)? {
            get.push_child(filter);
        }
        Ok(get)
    }
}

/// `<edit-config>` with inline `<config>` or a `<url>`.
#[derive(Debug, Clone, PartialEq)]
pub struct EditConfig {
    pub target: Datastore,
    pub config: Option<Element>,
    pub url: Option<String>,
    pub default_operation: Option<DefaultOperation>,
    pub test_option: Option<TestOption>,
    pub error_option: Option<ErrorOption>,
}

impl EditConfig {
    pub fn new(target: Datastore, config: Element) -> Self {
        Self {
            target,
            config: Some(config),
            url: None,
            default_operation: None,
            test_option: None,
            error_option: None,
        }
    }

    pub fn from_url(target: Datastore, url: impl Into<String>) -> Self {
        Self {
            target,
            config: None,
            url: Some(url.into()),
            default_operation: None,
            test_option: None,
            error_option: None,
        }
    }

    pub fn default_operation(mut self, op: DefaultOperation) -> Self {
        self.default_operation = Some(op);
        self
    }

    pub fn test_option(mut self, option: TestOption) -> Self {
        self.test_option = Some(option);
        self
    }

    pub fn error_option(mut self, option: ErrorOption) -> Self {
        self.error_option = Some(option);
        self
    }
}

/// Wraps caller data in `<config>` unless it already is one.
fn config_element(config: &Element) -> Element {
    if config.name() == "config" {
        let mut wrapper = Element::new("config");
        for (name, value) in config.attributes() {
            wrapper.set_attribute(name.clone(), value.clone());
        }
        wrapper.with_children(config.children().iter().map(user_data))
    } else {
        Element::new("config").with_child(user_data(config))
    }
}

impl RpcRequest for EditConfig {
    fn name(&self) -> &str {
        "edit-config"
    }

    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        match self.target {
            Datastore::Running | Datastore::Candidate => {}
            _ => return Err(invalid("edit-config target must be running or candidate")),
        }
        writable_target(&self.target, capabilities)?;

        let mut edit = operation("edit-config")
            .with_child(Element::new("target").with_child(self.target.to_element()));
        if let Some(op) = self.default_operation {
            edit.push_child(Element::leaf("default-operation", op.as_str()));
        }
        if let Some(option) = self.test_option {
            match option {
                TestOption::TestOnly => require(capabilities, &[CAPABILITY_VALIDATE])?,
                _ => require(capabilities, VALIDATE_ANY)?,
            }
            edit.push_child(Element::leaf("test-option", option.as_str()));
        }
        if let Some(option) = self.error_option {
            if option == ErrorOption::RollbackOnError {
                require(capabilities, &[CAPABILITY_ROLLBACK_ON_ERROR])?;
            }
            edit.push_child(Element::leaf("error-option", option.as_str()));
        }

        match (&self.config, &self.url) {
            (Some(_), Some(_)) => Err(invalid("config and url are mutually exclusive")),
            (None, None) => Err(invalid("edit-config needs config or url")),
            (Some(config), None) => Ok(edit.with_child(config_element(config))),
            (None, Some(url)) => {
                require(capabilities, &[CAPABILITY_URL])?;
                Ok(edit.with_child(Element::leaf("url", url.clone())))
            }
        }
    }
}

/// Source of `copy-config`: a datastore or an inline configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    Datastore(Datastore),
    Config(Element),
}

impl From<Datastore> for ConfigSource {
    fn from(datastore: Datastore) -> Self {
        ConfigSource::Datastore(datastore)
    }
}

/// `<copy-config>`.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyConfig {
    pub target: Datastore,
    pub source: ConfigSource,
}

impl CopyConfig {
    pub fn new(target: Datastore, source: impl Into<ConfigSource>) -> Self {
        Self {
            target,
            source: source.into(),
        }
    }
}

impl RpcRequest for CopyConfig {
    fn name(&self) -> &str {
        "copy-config"
    }

    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        let source = match &self.source {
            ConfigSource::Datastore(source) if *source == self.target => {
                return Err(invalid("copy-config source and target are identical"));
            }
            ConfigSource::Datastore(source) => {
                source.check(capabilities)?;
                source.to_element()
            }
            ConfigSource::Config(config) => config_element(config),
        };
        writable_target(&self.target, capabilities)?;
        Ok(operation("copy-config")
            .with_child(Element::new("target").with_child(self.target.to_element()))
            .with_child(Element::new("source").with_child(source)))
    }
}

/// `<delete-config>`; the running datastore cannot be deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteConfig {
    pub target: Datastore,
}

impl DeleteConfig {
    pub fn new(target: Datastore) -> Self {
        Self { target }
    }
}

impl RpcRequest for DeleteConfig {
    fn name(&self) -> &str {
        "delete-config"
    }

    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        if self.target == Datastore::Running {
            return Err(invalid("delete-config cannot target running"));
        }
        self.target.check(capabilities)?;
        Ok(operation("delete-config")
            .with_child(Element::new("target").with_child(self.target.to_element())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lock {
    pub target: Datastore,
}

impl Lock {
    pub fn new(target: Datastore) -> Self {
        Self { target }
    }
}

impl RpcRequest for Lock {
    fn name(&self) -> &str {
        "lock"
    }

    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        self.target.check(capabilities)?;
        Ok(operation("lock").with_child(Element::new("target").with_child(self.target.to_element())))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unlock {
    pub target: Datastore,
}

impl Unlock {
    pub fn new(target: Datastore) -> Self {
        Self { target }
    }
}

impl RpcRequest for Unlock {
    fn name(&self) -> &str {
        "unlock"
    }

    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        self.target.check(capabilities)?;
        Ok(operation("unlock")
            .with_child(Element::new("target").with_child(self.target.to_element())))
    }
}

/// `<commit>`, optionally confirmed.
///
/// `persist` and `persist_id` need confirmed-commit 1.1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commit {
    pub confirmed: bool,
    pub confirm_timeout: Option<u32>,
    pub persist: Option<String>,
    pub persist_id: Option<String>,
}

impl Commit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirmed commit rolled back after `timeout` seconds unless confirmed.
    pub fn confirmed(timeout: Option<u32>) -> Self {
        Self {
            confirmed: true,
            confirm_timeout: timeout,
            ..Self::default()
        }
    }

    pub fn persist(mut self, token: impl Into<String>) -> Self {
        self.persist = Some(token.into());
        self
    }

    pub fn persist_id(mut self, token: impl Into<String>) -> Self {
        self.persist_id = Some(token.into());
        self
    }
}

impl RpcRequest for Commit {
    fn name(&self) -> &str {
        "commit"
    }

    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        require(capabilities, &[CAPABILITY_CANDIDATE])?;
        if !self.confirmed && (self.confirm_timeout.is_some() || self.persist.is_some()) {
            return Err(invalid("confirm-timeout and persist need a confirmed commit"));
        }
        if self.confirm_timeout == Some(0) {
            return Err(invalid("confirm-timeout must be positive"));
        }
        if self.confirmed {
            require(capabilities, CONFIRMED_COMMIT_ANY)?;
        }
        if self.persist.is_some() || self.persist_id.is_some() {
            require(capabilities, &[CAPABILITY_CONFIRMED_COMMIT])?;
        }

        let mut commit = operation("commit");
        if self.confirmed {
            commit.push_child(Element::new("confirmed"));
        }
        if let Some(timeout) = self.confirm_timeout {
            commit.push_child(Element::leaf("confirm-timeout", timeout.to_string()));
        }
        if let Some(persist) = &self.persist {
            commit.push_child(Element::leaf("persist", persist.clone()));
        }
        if let Some(persist_id) = &self.persist_id {
            commit.push_child(Element::leaf("persist-id", persist_id.clone()));
        }
        Ok(commit)
    }
}

/// `<cancel-commit>` for an ongoing confirmed commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CancelCommit {
    pub persist_id: Option<String>,
}

impl CancelCommit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persist_id(mut self, token: impl Into<String>) -> Self {
        self.persist_id = Some(token.into());
        self
    }
}

impl RpcRequest for CancelCommit {
    fn name(&self) -> &str {
        "cancel-commit"
    }

    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        require(capabilities, &[CAPABILITY_CONFIRMED_COMMIT])?;
        let mut cancel = operation("cancel-commit");
        if let Some(persist_id) = &self.persist_id {
            cancel.push_child(Element::leaf("persist-id", persist_id.clone()));
        }
        Ok(cancel)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscardChanges;

impl RpcRequest for DiscardChanges {
    fn name(&self) -> &str {
        "discard-changes"
    }

    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        require(capabilities, &[CAPABILITY_CANDIDATE])?;
        Ok(operation("discard-changes"))
    }
}

/// `<validate>` of a datastore or an inline configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validate {
    pub source: Option<Datastore>,
    pub config: Option<Element>,
}

impl Validate {
    pub fn datastore(source: Datastore) -> Self {
        Self {
            source: Some(source),
            config: None,
        }
    }

    pub fn config(config: Element) -> Self {
        Self {
            source: None,
            config: Some(config),
        }
    }
}

impl RpcRequest for Validate {
    fn name(&self) -> &str {
        "validate"
    }

    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        require(capabilities, VALIDATE_ANY)?;
        let source = match (&self.source, &self.config) {
            (Some(_), Some(_)) => return Err(invalid("validate takes a datastore or a config, not both")),
            (None, None) => return Err(invalid("validate needs a datastore or a config")),
            (Some(datastore), None) => {
                datastore.check(capabilities)?;
                datastore.to_element()
            }
            (None, Some(config)) => config_element(config),
        };
        Ok(operation("validate").with_child(Element::new("source").with_child(source)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseSession;

impl RpcRequest for CloseSession {
    fn name(&self) -> &str {
        "close-session"
    }

    fn build(&self, _capabilities: &Capabilities) -> Result<Element, NetconfError> {
        Ok(operation("close-session"))
    }
}

/// `<kill-session>` terminating another session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillSession {
    pub session_id: u32,
}

impl KillSession {
    pub fn new(session_id: u32) -> Self {
        Self { session_id }
    }
}

impl RpcRequest for KillSession {
    fn name(&self) -> &str {
        "kill-session"
    }

    fn build(&self, _capabilities: &Capabilities) -> Result<Element, NetconfError> {
        if self.session_id == 0 {
            return Err(invalid("kill-session needs a non-zero session-id"));
        }
        Ok(operation("kill-session").with_child(Element::leaf("session-id", self.session_id.to_string())))
    }
}

/// RFC 5277 `<create-subscription>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateSubscription {
    pub stream: Option<String>,
    pub filter: Option<Filter>,
    pub start_time: Option<String>,
    pub stop_time: Option<String>,
}

impl CreateSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Replay window, as RFC 3339 timestamps.
    pub fn replay(mut self, start: impl Into<String>, stop: Option<String>) -> Self {
        self.start_time = Some(start.into());
        self.stop_time = stop;
        self
    }
}

impl RpcRequest for CreateSubscription {
    fn name(&self) -> &str {
        "create-subscription"
    }

    fn build(&self, capabilities: &Capabilities) -> Result<Element, NetconfError> {
        require(capabilities, &[CAPABILITY_NOTIFICATION])?;
        if self.stop_time.is_some() && self.start_time.is_none() {
            return Err(invalid("stopTime needs startTime"));
        }
        let mut subscription = Element::new("create-subscription").with_namespace(NETCONF_NOTIFICATION_NS);
        if let Some(stream) = &self.stream {
            subscription.push_child(Element::leaf("stream", stream.clone()));
        }
        if let Some(filter) = &self.filter {
            subscription.push_child(filter.to_element(capabilities)?);
        }
        if let Some(start) = &self.start_time {
            subscription.push_child(Element::leaf("startTime", start.clone()));
        }
        if let Some(stop) = &self.stop_time {
            subscription.push_child(Element::leaf("stopTime", stop.clone()));
        }
        Ok(subscription)
    }
}

/// Arbitrary operation element, sent as given.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRpc {
    pub element: Element,
}

impl RawRpc {
    pub fn new(element: Element) -> Self {
        Self { element }
    }
}

impl RpcRequest for RawRpc {
    fn name(&self) -> &str {
        self.element.name()
    }

    fn build(&self, _capabilities: &Capabilities) -> Result<Element, NetconfError> {
        Ok(self.element.clone())
    }
}
