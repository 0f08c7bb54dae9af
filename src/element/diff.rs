use super::{
    Content, Element, Operation, Schema, attributes_eq, effective_ns, element_eq, group_by_tag,
    same_tag,
};
use crate::error::NetconfError;

enum NodeDiff {
    Unchanged,
    Replace,
    Changed(Vec<Element>),
}

/// Minimal edit-config payload transforming `before` into `after`.
///
/// Uses an empty [`Schema`]; see [`diff_with`].
pub fn diff(before: &Element, after: &Element) -> Element {
    diff_with(before, after, &Schema::default())
}

/// Minimal edit-config payload transforming `before` into `after`.
///
/// The result is a shell of the `after` root holding only changed subtrees,
/// each marked with the [`Operation`] needed to apply it:
///
/// - nodes only in `after` are marked `create`;
/// - nodes only in `before` are marked `delete` and reduced to their
///   identity (name and list keys);
/// - changed leaves, attribute changes and shape changes are marked
///   `replace`;
/// - list entries known to `schema` are matched by key, not by position;
/// - a reordered group of same-tag siblings replaces the parent.
///
/// Identical trees produce a root without children.
pub fn diff_with(before: &Element, after: &Element, schema: &Schema) -> Element {
    if !same_tag(before, after, None, None) {
        return replacement(after);
    }
    match diff_node(before, after, schema, None, None) {
        NodeDiff::Unchanged => after.clone_shallow(),
        NodeDiff::Replace => replacement(after),
        NodeDiff::Changed(children) => {
            let mut root = after.clone_shallow();
            *root.children_mut() = children;
            root
        }
    }
}

fn diff_node(
    before: &Element,
    after: &Element,
    schema: &Schema,
    parent_before: Option<&str>,
    parent_after: Option<&str>,
) -> NodeDiff {
    if !attributes_eq(before, after) {
        return NodeDiff::Replace;
    }
    if before.content.is_empty() && after.content.is_empty() {
        return NodeDiff::Unchanged;
    }
    match (&before.content, &after.content) {
        (Content::Text(x), Content::Text(y)) if x == y => NodeDiff::Unchanged,
        (Content::Children(x), Content::Children(y)) => match diff_children(
            x,
            y,
            schema,
            effective_ns(before, parent_before),
            effective_ns(after, parent_after),
        ) {
            None => NodeDiff::Replace,
            Some(changes) if changes.is_empty() => NodeDiff::Unchanged,
            Some(changes) => NodeDiff::Changed(changes),
        },
        _ => NodeDiff::Replace,
    }
}

/// Changes between two child lists, or `None` when a group was reordered
/// and the parent has to be replaced.
fn diff_children(
    before: &[Element],
    after: &[Element],
    schema: &Schema,
    ns_before: Option<&str>,
    ns_after: Option<&str>,
) -> Option<Vec<Element>> {
    let groups_before = group_by_tag(before, ns_before);
    let groups_after = group_by_tag(after, ns_after);
    let mut out = Vec::new();

    for (tag, entries_after) in &groups_after {
        let entries_before = groups_before
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, entries)| entries.as_slice())
            .unwrap_or(&[]);
        let ctx = GroupContext {
            schema,
            ns_before,
            ns_after,
        };
        ctx.diff_group(entries_before, entries_after, &mut out)?;
    }

    for (tag, entries_before) in &groups_before {
        if groups_after.iter().any(|(t, _)| t == tag) {
            continue;
        }
        let repeated = entries_before.len() > 1;
        for entry in entries_before {
            out.push(deletion(entry, schema, repeated));
        }
    }
    Some(out)
}

struct GroupContext<'s, 'n> {
    schema: &'s Schema,
    ns_before: Option<&'n str>,
    ns_after: Option<&'n str>,
}

impl GroupContext<'_, '_> {
    fn diff_group(
        &self,
        before: &[&Element],
        after: &[&Element],
        out: &mut Vec<Element>,
    ) -> Option<()> {
        let name = after.first().or(before.first()).map(|e| e.name())?;
        let schema = self.schema;

        let keyed = schema.keys(name).is_some()
            && before
                .iter()
                .chain(after.iter())
                .all(|e| schema.key_of(e).is_some());
        if keyed {
            return self.match_entries(before, after, out, |b, a| {
                schema.key_of(b) == schema.key_of(a)
            });
        }

        if before.len() <= 1 && after.len() <= 1 && !schema.is_leaf_list(name) {
            match (before.first(), after.first()) {
                (Some(b), Some(a)) => self.push_node_diff(b, a, out),
                (None, Some(a)) => out.push(creation(a)),
                (Some(b), None) => out.push(deletion(b, schema, false)),
                (None, None) => {}
            }
            return Some(());
        }

        // Repeated entries without keys are identified by their content.
        self.match_entries(before, after, out, |b, a| {
            element_eq(b, a, self.ns_before, self.ns_after, false)
        })
    }

    /// Pairs entries of one group. New entries must follow every matched
    /// entry and matched entries must keep their relative order, otherwise
    /// the group counts as reordered. A new entry identical to an existing
    /// one cannot be created either, so it also replaces the parent.
    fn match_entries<F>(
        &self,
        before: &[&Element],
        after: &[&Element],
        out: &mut Vec<Element>,
        same_entry: F,
    ) -> Option<()>
    where
        F: Fn(&Element, &Element) -> bool,
    {
        let mut used = vec![false; before.len()];
        let mut last_matched: Option<usize> = None;
        let mut created = false;

        for a in after {
            let found = before
                .iter()
                .enumerate()
                .find(|(i, b)| !used[*i] && same_entry(b, a));
            match found {
                Some((i, b)) => {
                    if created || last_matched.is_some_and(|last| i < last) {
                        return None;
                    }
                    used[i] = true;
                    last_matched = Some(i);
                    self.push_node_diff(b, a, out);
                }
                // A create would collide with its already matched twin.
                None if before.iter().any(|b| same_entry(b, a)) => return None,
                None => {
                    created = true;
                    out.push(creation(a));
                }
            }
        }

        let repeated = before.len() > 1 || after.len() > 1;
        for (i, b) in before.iter().enumerate() {
            if !used[i] {
                out.push(deletion(b, self.schema, repeated));
            }
        }
        Some(())
    }

    fn push_node_diff(&self, before: &Element, after: &Element, out: &mut Vec<Element>) {
        match diff_node(before, after, self.schema, self.ns_before, self.ns_after) {
            NodeDiff::Unchanged => {}
            NodeDiff::Replace => out.push(replacement(after)),
            NodeDiff::Changed(changes) => {
                let mut shell = after.clone_keys(self.schema);
                shell.attributes = after.attributes.clone();
                shell.children_mut().extend(changes);
                out.push(shell);
            }
        }
    }
}

fn stripped(element: &Element) -> Element {
    let mut copy = element.clone();
    copy.strip_operations();
    copy
}

fn replacement(element: &Element) -> Element {
    stripped(element).mark(Operation::Replace)
}

fn creation(element: &Element) -> Element {
    stripped(element).mark(Operation::Create)
}

/// Keyed entries and single nodes keep only their identity; repeated
/// unkeyed entries are identified by their whole content.
fn deletion(element: &Element, schema: &Schema, repeated: bool) -> Element {
    let identity = if repeated && schema.key_of(element).is_none() {
        stripped(element)
    } else {
        element.clone_keys(schema)
    };
    identity.mark(Operation::Delete)
}

/// Applies an edit-config payload to `target` with default operation merge.
///
/// Operations follow edit-config semantics: `create` fails with
/// `DataExists` when the node is present, `delete` fails with
/// `DataMissing` when it is absent, `remove` ignores absent nodes.
pub fn apply_edit(target: &mut Element, edit: &Element, schema: &Schema) -> Result<(), NetconfError> {
    if !same_tag(target, edit, None, None) {
        return match edit.operation() {
            Some(Operation::Replace) => {
                *target = stripped(edit);
                Ok(())
            }
            _ => Err(NetconfError::InvalidRequest(format!(
                "edit root <{}> does not match <{}>",
                edit.name(),
                target.name()
            ))),
        };
    }
    match edit.operation() {
        Some(Operation::Replace) => {
            *target = stripped(edit);
            Ok(())
        }
        Some(Operation::Create) => Err(NetconfError::DataExists(edit.name().to_string())),
        Some(Operation::Delete) | Some(Operation::Remove) => {
            *target = target.clone_shallow();
            Ok(())
        }
        Some(Operation::Merge) | None => merge_into(target, edit, schema, None, None),
    }
}

fn merge_into(
    target: &mut Element,
    edit: &Element,
    schema: &Schema,
    parent_target: Option<&str>,
    parent_edit: Option<&str>,
) -> Result<(), NetconfError> {
    for (name, value) in &edit.attributes {
        if name != "xmlns" && !name.starts_with("xmlns:") {
            target.set_attribute(name.clone(), value.clone());
        }
    }
    match &edit.content {
        Content::Text(text) => {
            target.set_text(text.clone());
            Ok(())
        }
        Content::Children(children) if children.is_empty() => Ok(()),
        Content::Children(children) => {
            let ns_target = effective_ns(target, parent_target).map(str::to_owned);
            let ns_edit = effective_ns(edit, parent_edit);
            for child in children {
                apply_child(target, child, schema, ns_target.as_deref(), ns_edit)?;
            }
            Ok(())
        }
    }
}

fn apply_child(
    parent: &mut Element,
    edit: &Element,
    schema: &Schema,
    ns_target: Option<&str>,
    ns_edit: Option<&str>,
) -> Result<(), NetconfError> {
    let operation = edit.operation().unwrap_or(Operation::Merge);
    let found = find_match(parent.children(), edit, schema, ns_target, ns_edit, operation);
    match (operation, found) {
        (Operation::Merge, Some(i)) => {
            merge_into(&mut parent.children_mut()[i], edit, schema, ns_target, ns_edit)
        }
        (Operation::Replace, Some(i)) => {
            parent.children_mut()[i] = stripped(edit);
            Ok(())
        }
        (Operation::Merge | Operation::Replace | Operation::Create, None) => {
            parent.push_child(stripped(edit));
            Ok(())
        }
        (Operation::Create, Some(_)) => Err(NetconfError::DataExists(describe(edit, schema))),
        (Operation::Delete | Operation::Remove, Some(i)) => {
            parent.children_mut().remove(i);
            Ok(())
        }
        (Operation::Delete, None) => Err(NetconfError::DataMissing(describe(edit, schema))),
        (Operation::Remove, None) => Ok(()),
    }
}

/// Index of the sibling an edit node refers to.
fn find_match(
    children: &[Element],
    edit: &Element,
    schema: &Schema,
    ns_target: Option<&str>,
    ns_edit: Option<&str>,
    operation: Operation,
) -> Option<usize> {
    let candidates = children
        .iter()
        .enumerate()
        .filter(|(_, c)| same_tag(c, edit, ns_target, ns_edit))
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    if let Some(key) = schema.key_of(edit) {
        return candidates
            .into_iter()
            .find(|&i| schema.key_of(&children[i]).as_ref() == Some(&key));
    }
    if let Some(i) = candidates
        .iter()
        .copied()
        .find(|&i| element_eq(&children[i], edit, ns_target, ns_edit, false))
    {
        return Some(i);
    }
    if schema.is_leaf_list(edit.name()) || schema.keys(edit.name()).is_some() {
        return None;
    }
    match (operation, candidates.as_slice()) {
        (Operation::Create, _) => None,
        (_, [only]) => Some(*only),
        _ => None,
    }
}

fn describe(element: &Element, schema: &Schema) -> String {
    match schema.key_of(element) {
        Some(keys) => {
            let predicates = keys
                .iter()
                .map(|(k, v)| format!("[{k}='{v}']"))
                .collect::<String>();
            format!("{}{}", element.name(), predicates)
        }
        None => element.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, mtu: &str) -> Element {
        Element::new("interface")
            .with_child(Element::leaf("name", name))
            .with_child(Element::leaf("mtu", mtu))
    }

    fn interfaces(entries: Vec<Element>) -> Element {
        Element::new("interfaces")
            .with_namespace("urn:example:if")
            .with_children(entries)
    }

    fn schema() -> Schema {
        Schema::new()
            .with_list("interface", ["name"])
            .with_leaf_list("server")
    }

    fn assert_applies(before: &Element, after: &Element, schema: &Schema) {
        let edit = diff_with(before, after, schema);
        let mut state = before.clone();
        apply_edit(&mut state, &edit, schema).expect("apply diff");
        assert_eq!(&state, after, "edit was: {edit}");
    }

    #[test]
    fn identical_trees_produce_empty_edit() {
        let tree = interfaces(vec![iface("eth0", "1500"), iface("eth1", "9000")]);
        let edit = diff_with(&tree, &tree.clone(), &schema());
        assert!(edit.is_empty_edit());
        assert_eq!(edit.name(), "interfaces");
        assert!(diff(&Element::new("a"), &Element::new("a")).is_empty_edit());
    }

    #[test]
    fn changed_leaf_is_replaced_inside_keyed_shell() {
        let before = interfaces(vec![iface("eth0", "1500"), iface("eth1", "9000")]);
        let after = interfaces(vec![iface("eth0", "1500"), iface("eth1", "1400")]);
        let edit = diff_with(&before, &after, &schema());

        assert_eq!(edit.children().len(), 1);
        let entry = &edit.children()[0];
        assert_eq!(entry.operation(), None);
        assert_eq!(entry.child_text("name"), Some("eth1"));
        let mtu = entry.child("mtu").expect("mtu");
        assert_eq!(mtu.operation(), Some(Operation::Replace));
        assert_eq!(mtu.text(), Some("1400"));
        assert_applies(&before, &after, &schema());
    }

    #[test]
    fn removed_entry_is_deleted_by_key_only() {
        let before = interfaces(vec![iface("eth0", "1500"), iface("eth1", "9000")]);
        let after = interfaces(vec![iface("eth0", "1500")]);
        let edit = diff_with(&before, &after, &schema());

        assert_eq!(edit.children().len(), 1);
        let deleted = &edit.children()[0];
        assert_eq!(deleted.operation(), Some(Operation::Delete));
        assert_eq!(deleted.children().len(), 1);
        assert_eq!(deleted.child_text("name"), Some("eth1"));
        assert_applies(&before, &after, &schema());
    }

    #[test]
    fn added_entry_is_created_with_full_subtree() {
        let before = interfaces(vec![iface("eth0", "1500")]);
        let after = interfaces(vec![iface("eth0", "1500"), iface("eth2", "1400")]);
        let edit = diff_with(&before, &after, &schema());

        assert_eq!(edit.children().len(), 1);
        let created = &edit.children()[0];
        assert_eq!(created.operation(), Some(Operation::Create));
        assert_eq!(created.child_text("mtu"), Some("1400"));
        assert_applies(&before, &after, &schema());
    }

    #[test]
    fn keyed_entries_match_by_key_not_position() {
        let before = interfaces(vec![iface("eth0", "1500"), iface("eth1", "9000")]);
        let after = interfaces(vec![iface("eth1", "9000")]);
        let edit = diff_with(&before, &after, &schema());
        assert_eq!(edit.children().len(), 1);
        assert_eq!(edit.children()[0].child_text("name"), Some("eth0"));
        assert_eq!(edit.children()[0].operation(), Some(Operation::Delete));
    }

    #[test]
    fn reordered_group_replaces_parent() {
        let before = interfaces(vec![iface("eth0", "1500"), iface("eth1", "9000")]);
        let after = interfaces(vec![iface("eth1", "9000"), iface("eth0", "1500")]);
        let edit = diff_with(&before, &after, &schema());
        assert_eq!(edit.operation(), Some(Operation::Replace));
        assert_applies(&before, &after, &schema());
    }

    #[test]
    fn entry_inserted_before_existing_one_replaces_parent() {
        let before = interfaces(vec![iface("eth1", "9000")]);
        let after = interfaces(vec![iface("eth0", "1500"), iface("eth1", "9000")]);
        let edit = diff_with(&before, &after, &schema());
        assert_eq!(edit.operation(), Some(Operation::Replace));
        assert_applies(&before, &after, &schema());
    }

    #[test]
    fn single_containers_recurse_and_leaves_are_created_or_deleted() {
        let before = Element::new("system")
            .with_child(Element::leaf("hostname", "r1"))
            .with_child(Element::new("ntp").with_child(Element::leaf("enabled", "true")));
        let after = Element::new("system")
            .with_child(Element::leaf("contact", "noc"))
            .with_child(Element::new("ntp").with_child(Element::leaf("enabled", "false")));
        let edit = diff(&before, &after);

        let contact = edit.child("contact").expect("contact");
        assert_eq!(contact.operation(), Some(Operation::Create));
        let hostname = edit.child("hostname").expect("hostname");
        assert_eq!(hostname.operation(), Some(Operation::Delete));
        assert!(hostname.is_empty());
        let ntp = edit.child("ntp").expect("ntp");
        assert_eq!(ntp.operation(), None);
        assert_eq!(
            ntp.child("enabled").and_then(Element::operation),
            Some(Operation::Replace)
        );
        assert_applies(&before, &after, &Schema::default());
    }

    #[test]
    fn leaf_list_values_are_matched_by_value() {
        let before = Element::new("dns")
            .with_child(Element::leaf("server", "10.0.0.1"))
            .with_child(Element::leaf("server", "10.0.0.2"));
        let after = Element::new("dns")
            .with_child(Element::leaf("server", "10.0.0.1"))
            .with_child(Element::leaf("server", "10.0.0.3"));
        let edit = diff_with(&before, &after, &schema());

        let ops = edit
            .children()
            .iter()
            .map(|c| (c.text().unwrap_or_default(), c.operation()))
            .collect::<Vec<_>>();
        assert_eq!(
            ops,
            vec![
                ("10.0.0.3", Some(Operation::Create)),
                ("10.0.0.2", Some(Operation::Delete))
            ]
        );
        assert_applies(&before, &after, &schema());
    }

    #[test]
    fn unkeyed_repeated_entries_use_whole_content_as_identity() {
        let before = interfaces(vec![iface("eth0", "1500"), iface("eth1", "9000")]);
        let after = interfaces(vec![iface("eth0", "1500"), iface("eth1", "1400")]);
        let edit = diff(&before, &after);
        assert_eq!(edit.children().len(), 2);
        let deleted = edit
            .children()
            .iter()
            .find(|c| c.operation() == Some(Operation::Delete))
            .expect("delete");
        assert_eq!(deleted.child_text("mtu"), Some("9000"));
        assert_applies(&before, &after, &Schema::default());
    }

    #[test]
    fn duplicated_entry_replaces_parent() {
        let hop = |addr: &str| Element::leaf("hop", addr);
        let before = Element::new("route")
            .with_child(Element::leaf("prefix", "0.0.0.0/0"))
            .with_child(Element::new("hops").with_child(hop("10.0.0.1")));
        let after = Element::new("route")
            .with_child(Element::leaf("prefix", "0.0.0.0/0"))
            .with_child(
                Element::new("hops")
                    .with_child(hop("10.0.0.1"))
                    .with_child(hop("10.0.0.1")),
            );
        let edit = diff(&before, &after);
        let hops = edit.child("hops").expect("hops");
        assert_eq!(hops.operation(), Some(Operation::Replace));
        assert_eq!(hops.children().len(), 2);
        assert_applies(&before, &after, &Schema::default());

        let dns = |servers: &[&str]| {
            Element::new("dns").with_children(servers.iter().map(|s| Element::leaf("server", *s)))
        };
        assert_applies(&dns(&["10.0.0.1"]), &dns(&["10.0.0.1", "10.0.0.1"]), &schema());
        assert_applies(
            &dns(&["10.0.0.1", "10.0.0.2"]),
            &dns(&["10.0.0.1", "10.0.0.2", "10.0.0.1"]),
            &Schema::default(),
        );
    }

    #[test]
    fn attribute_change_replaces_node() {
        let before = Element::new("cfg").with_child(Element::leaf("timer", "5").with_attribute("unit", "s"));
        let after = Element::new("cfg").with_child(Element::leaf("timer", "5").with_attribute("unit", "ms"));
        let edit = diff(&before, &after);
        assert_eq!(
            edit.child("timer").and_then(Element::operation),
            Some(Operation::Replace)
        );
        assert_applies(&before, &after, &Schema::default());
    }

    #[test]
    fn different_roots_replace_everything() {
        let before = Element::new("a").with_child(Element::leaf("x", "1"));
        let after = Element::new("b").with_child(Element::leaf("x", "1"));
        let edit = diff(&before, &after);
        assert_eq!(edit.operation(), Some(Operation::Replace));
        assert_applies(&before, &after, &Schema::default());
    }

    #[test]
    fn empty_trees_diff_to_nothing() {
        let edit = diff(&Element::new("config"), &Element::new("config"));
        assert!(edit.is_empty_edit());
    }

    #[test]
    fn create_existing_and_delete_missing_fail() {
        let schema = schema();
        let mut state = interfaces(vec![iface("eth0", "1500")]);

        let create = interfaces(vec![iface("eth0", "1500").mark(Operation::Create)]);
        let err = apply_edit(&mut state, &create, &schema).expect_err("exists");
        assert!(matches!(err, NetconfError::DataExists(ref what) if what == "interface[name='eth0']"));

        let delete = interfaces(vec![
            Element::new("interface")
                .with_child(Element::leaf("name", "eth9"))
                .mark(Operation::Delete),
        ]);
        let err = apply_edit(&mut state, &delete, &schema).expect_err("missing");
        assert!(matches!(err, NetconfError::DataMissing(_)));

        let remove = interfaces(vec![
            Element::new("interface")
                .with_child(Element::leaf("name", "eth9"))
                .mark(Operation::Remove),
        ]);
        apply_edit(&mut state, &remove, &schema).expect("remove is idempotent");
        assert_eq!(state.children().len(), 1);
    }

    #[test]
    fn merge_adds_and_updates_without_marks() {
        let schema = schema();
        let mut state = interfaces(vec![iface("eth0", "1500")]);
        let edit = interfaces(vec![iface("eth0", "1400"), iface("eth1", "9000")]);
        apply_edit(&mut state, &edit, &schema).expect("merge");
        assert_eq!(state, interfaces(vec![iface("eth0", "1400"), iface("eth1", "9000")]));
    }

    #[test]
    fn mismatched_edit_root_is_rejected() {
        let mut state = Element::new("a");
        let err = apply_edit(&mut state, &Element::new("b"), &Schema::default())
            .expect_err("root mismatch");
        assert!(matches!(err, NetconfError::InvalidRequest(_)));
    }
}
