//! Generic element tree for configuration and state data.
//!
//! An [`Element`] is a named node (optionally namespace-qualified) with an
//! ordered attribute list and either a scalar text value or an ordered list
//! of child elements. The tree is schema-agnostic: list identity is supplied
//! through a [`Schema`] when structural operations need it.
//!
//! # Main Components
//!
//! - [`Element`] - The tree node with builders and accessors
//! - [`Path`] - Path expressions with list-key predicates
//! - [`diff`] / [`diff_with`] - Minimal edit-config payload between two trees
//! - [`apply_edit`] - Applies an edit payload to an in-memory tree

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NetconfError;

mod diff;
mod path;
mod schema;

pub use diff::{apply_edit, diff, diff_with};
pub use path::{Path, PathStep};
pub use schema::Schema;

/// Edit operation attached to an element of an edit-config payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Merge => "merge",
            Operation::Replace => "replace",
            Operation::Create => "create",
            Operation::Delete => "delete",
            Operation::Remove => "remove",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(Operation::Merge),
            "replace" => Ok(Operation::Replace),
            "create" => Ok(Operation::Create),
            "delete" => Ok(Operation::Delete),
            "remove" => Ok(Operation::Remove),
            other => Err(NetconfError::MalformedDocument(format!(
                "unknown edit operation '{other}'"
            ))),
        }
    }
}

/// Value of an element: a scalar text or an ordered list of children.
#[derive(Debug, Clone)]
pub enum Content {
    Text(String),
    Children(Vec<Element>),
}

impl Content {
    /// Empty text and an empty child list are the same empty content.
    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(text) => text.is_empty(),
            Content::Children(children) => children.is_empty(),
        }
    }
}

/// A node of the element tree.
///
/// Cloning produces a fully independent deep copy.
#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    /// `None` inherits the namespace of the parent element.
    namespace: Option<String>,
    attributes: Vec<(String, String)>,
    content: Content,
    operation: Option<Operation>,
}

impl Element {
    /// Creates an element without content.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            attributes: Vec::new(),
            content: Content::Children(Vec::new()),
            operation: None,
        }
    }

    /// Creates a leaf element holding `text`.
    pub fn leaf(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            content: Content::Text(text.into()),
            ..Self::new(name)
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.push_child(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        for child in children {
            self.push_child(child);
        }
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    /// Attaches an edit operation to this element.
    pub fn mark(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn set_namespace(&mut self, namespace: Option<String>) {
        self.namespace = namespace;
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, keeping its position if it already exists.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(k, _)| k == name)?;
        Some(self.attributes.remove(pos).1)
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Text value of a leaf, `None` for elements with children.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(text) => Some(text),
            Content::Children(_) => None,
        }
    }

    /// Replaces any children with a scalar value.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.content = Content::Text(text.into());
    }

    pub fn children(&self) -> &[Element] {
        match &self.content {
            Content::Children(children) => children,
            Content::Text(_) => &[],
        }
    }

    /// Mutable child list. A text value is discarded first.
    pub fn children_mut(&mut self) -> &mut Vec<Element> {
        if let Content::Text(_) = self.content {
            self.content = Content::Children(Vec::new());
        }
        match &mut self.content {
            Content::Children(children) => children,
            Content::Text(_) => unreachable!("content was converted to children above"),
        }
    }

    pub(crate) fn children_slice_mut(&mut self) -> &mut [Element] {
        match &mut self.content {
            Content::Children(children) => children.as_mut_slice(),
            Content::Text(_) => &mut [],
        }
    }

    /// Appends a child. A text value is discarded first.
    pub fn push_child(&mut self, child: Element) {
        self.children_mut().push(child);
    }

    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children().iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children_slice_mut().iter_mut().find(|c| c.name == name)
    }

    /// Text of the first child with the given name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(Element::text)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.content, Content::Text(_))
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn operation(&self) -> Option<Operation> {
        self.operation
    }

    pub fn set_operation(&mut self, operation: Option<Operation>) {
        self.operation = operation;
    }

    /// Marks the node selected by `path` with an edit operation.
    pub fn mark_at(&mut self, path: &Path, operation: Operation) -> Result<(), NetconfError> {
        let node = self
            .get_mut(path)
            .ok_or_else(|| NetconfError::PathNotFound(path.to_string()))?;
        node.operation = Some(operation);
        Ok(())
    }

    /// Removes every edit operation mark in this subtree.
    pub fn strip_operations(&mut self) {
        self.operation = None;
        for child in self.children_slice_mut() {
            child.strip_operations();
        }
    }

    /// Copy of this node with its name, namespace and attributes but no content.
    pub fn clone_shallow(&self) -> Element {
        Element {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            attributes: self.attributes.clone(),
            content: Content::Children(Vec::new()),
            operation: None,
        }
    }

    /// Deep copy that no longer depends on an ancestor for its namespace.
    ///
    /// `parent_ns` is the effective namespace of the node's former parent.
    pub fn detached(&self, parent_ns: Option<&str>) -> Element {
        let mut copy = self.clone();
        copy.namespace = Some(effective_ns(self, parent_ns).unwrap_or_default().to_string());
        copy
    }

    /// True when the diff produced no changes below this root.
    pub fn is_empty_edit(&self) -> bool {
        self.operation.is_none() && self.children().is_empty()
    }

    /// Serializes this tree as an XML string without declaration.
    pub fn to_xml(&self) -> Result<String, NetconfError> {
        crate::codec::xml::to_string(self)
    }

    /// Structural equality that ignores edit operation marks.
    pub fn same_data(&self, other: &Element) -> bool {
        element_eq(self, other, None, None, false)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        element_eq(self, other, None, None, true)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_xml() {
            Ok(xml) => f.write_str(&xml),
            Err(_) => write!(f, "<{}/>", self.name),
        }
    }
}

/// Effective namespace of an element given its parent's effective namespace.
pub(crate) fn effective_ns<'a>(element: &'a Element, parent: Option<&'a str>) -> Option<&'a str> {
    match element.namespace.as_deref() {
        Some("") => None,
        Some(ns) => Some(ns),
        None => parent,
    }
}

/// Identity of a sibling group: local name plus effective namespace.
pub(crate) fn same_tag(
    a: &Element,
    b: &Element,
    parent_a: Option<&str>,
    parent_b: Option<&str>,
) -> bool {
    a.name == b.name && effective_ns(a, parent_a) == effective_ns(b, parent_b)
}

fn attributes_eq(a: &Element, b: &Element) -> bool {
    let mut left = data_attributes(a);
    let mut right = data_attributes(b);
    left.sort();
    right.sort();
    left == right
}

/// Attributes that carry data, without namespace declarations.
fn data_attributes(element: &Element) -> Vec<(&str, &str)> {
    element
        .attributes
        .iter()
        .filter(|(k, _)| k != "xmlns" && !k.starts_with("xmlns:"))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}

pub(crate) fn element_eq(
    a: &Element,
    b: &Element,
    parent_a: Option<&str>,
    parent_b: Option<&str>,
    with_operations: bool,
) -> bool {
    if !same_tag(a, b, parent_a, parent_b) {
        return false;
    }
    if with_operations && a.operation != b.operation {
        return false;
    }
    if !attributes_eq(a, b) {
        return false;
    }
    content_eq(a, b, parent_a, parent_b, with_operations)
}

pub(crate) fn content_eq(
    a: &Element,
    b: &Element,
    parent_a: Option<&str>,
    parent_b: Option<&str>,
    with_operations: bool,
) -> bool {
    if a.content.is_empty() && b.content.is_empty() {
        return true;
    }
    match (&a.content, &b.content) {
        (Content::Text(x), Content::Text(y)) => x == y,
        (Content::Children(x), Content::Children(y)) => children_eq(
            x,
            y,
            effective_ns(a, parent_a),
            effective_ns(b, parent_b),
            with_operations,
        ),
        _ => false,
    }
}

/// Groups of same-tag siblings compare in sequence order; the groups
/// themselves may appear in any order.
fn children_eq(
    a: &[Element],
    b: &[Element],
    ns_a: Option<&str>,
    ns_b: Option<&str>,
    with_operations: bool,
) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let groups_a = group_by_tag(a, ns_a);
    let groups_b = group_by_tag(b, ns_b);
    if groups_a.len() != groups_b.len() {
        return false;
    }
    groups_a.iter().all(|(tag, entries_a)| {
        groups_b
            .iter()
            .find(|(other, _)| other == tag)
            .map(|(_, entries_b)| {
                entries_a.len() == entries_b.len()
                    && entries_a.iter().zip(entries_b.iter()).all(|(x, y)| {
                        element_eq(x, y, ns_a, ns_b, with_operations)
                    })
            })
            .unwrap_or(false)
    })
}

type Tag<'a> = (&'a str, Option<&'a str>);

/// Sibling groups keyed by tag, in order of first appearance.
pub(crate) fn group_by_tag<'a>(
    children: &'a [Element],
    parent_ns: Option<&'a str>,
) -> Vec<(Tag<'a>, Vec<&'a Element>)> {
    let mut groups: Vec<(Tag<'a>, Vec<&'a Element>)> = Vec::new();
    for child in children {
        let tag = (child.name.as_str(), effective_ns(child, parent_ns));
        match groups.iter_mut().find(|(t, _)| *t == tag) {
            Some((_, entries)) => entries.push(child),
            None => groups.push((tag, vec![child])),
        }
    }
    groups
}
