use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::{Content, Element};

/// List structure known for a data model.
///
/// Lists are identified by their local name and map to the names of their
/// key leaves. Leaf-lists are matched by value. Elements not described here
/// are matched by name when they occur once, and by structural equality
/// when they repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Schema {
    #[serde(default)]
    lists: HashMap<String, Vec<String>>,
    #[serde(default)]
    leaf_lists: HashSet<String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a list and its key leaf names.
    pub fn with_list<I, S>(mut self, name: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lists
            .insert(name.into(), keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_leaf_list(mut self, name: impl Into<String>) -> Self {
        self.leaf_lists.insert(name.into());
        self
    }

    pub fn keys(&self, name: &str) -> Option<&[String]> {
        self.lists
            .get(name)
            .map(Vec::as_slice)
            .filter(|keys| !keys.is_empty())
    }

    pub fn is_leaf_list(&self, name: &str) -> bool {
        self.leaf_lists.contains(name)
    }

    /// Key values of a list entry, `None` when the element is not a known
    /// list or lacks one of its keys.
    pub fn key_of<'a>(&self, element: &'a Element) -> Option<Vec<(&'a str, &'a str)>> {
        let keys = self.keys(element.name())?;
        keys.iter()
            .map(|key| {
                element
                    .child(key)
                    .and_then(|c| c.text().map(|v| (c.name(), v)))
            })
            .collect()
    }
}

impl Element {
    /// Copy holding only what identifies this node: its name, namespace
    /// and, for list entries, the key leaves.
    pub fn clone_keys(&self, schema: &Schema) -> Element {
        let mut shell = Element {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            attributes: Vec::new(),
            content: Content::Children(Vec::new()),
            operation: None,
        };
        if let Some(keys) = schema.keys(&self.name) {
            for key in keys {
                if let Some(leaf) = self.child(key) {
                    let mut leaf = leaf.clone();
                    leaf.strip_operations();
                    shell.push_child(leaf);
                }
            }
        } else if schema.is_leaf_list(&self.name) {
            shell.content = self.content.clone();
        }
        shell
    }
}
