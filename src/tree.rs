//! Action tree model: the recursive Group/Action structure every context
//! resolves to.
//!
//! The on-disk document is a single `Group` at the root. The `type` field
//! discriminates the two node shapes: `"group"` for groups, one of
//! `application | url | command | folder | shortcut | text` for actions.
//!
//! Trees are immutable once constructed and swapped wholesale behind `Arc`;
//! nodes are addressed by index path from the root, never by reference
//! identity.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identity of a tree, assigned at construction. Independent of content
/// equality; two parses of the same file get distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(u64);

/// Process-unique identity of a group node, used as the key-lookup cache index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GroupId(u64);

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

impl TreeId {
    fn fresh() -> Self {
        TreeId(NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl GroupId {
    fn fresh() -> Self {
        GroupId(NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether this id has been assigned by `ActionTree::new`. Deserialized
    /// groups start unassigned.
    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

/// What a leaf action does when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Application,
    Url,
    Command,
    Folder,
    Shortcut,
    Text,
}

/// Leaf node: one operation to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activates: Option<bool>,
    /// Set by the resolver on entries taken purely from the fallback tree.
    /// Display-only; dispatch and content equality ignore it.
    #[serde(skip)]
    pub from_fallback: bool,
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.kind == other.kind
            && self.value == other.value
            && self.label == other.label
            && self.icon_path == other.icon_path
            && self.activates == other.activates
    }
}

/// Serde marker pinning a group's `type` field to the literal `"group"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupTag {
    #[default]
    Group,
}

/// Interior node with an ordered child list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "type")]
    pub tag: GroupTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
    #[serde(default)]
    pub actions: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky_mode: Option<bool>,
    /// Runtime identity, assigned when the tree is constructed.
    #[serde(skip)]
    pub id: GroupId,
    /// Set by the resolver on entries taken purely from the fallback tree.
    /// Display-only; dispatch ignores it.
    #[serde(skip)]
    pub from_fallback: bool,
}

impl Group {
    pub fn new(key: Option<&str>, children: Vec<Node>) -> Self {
        Group {
            key: key.map(str::to_string),
            tag: GroupTag::Group,
            label: None,
            icon_path: None,
            actions: children,
            sticky_mode: None,
            id: GroupId::default(),
            from_fallback: false,
        }
    }

    pub fn sticky(&self) -> bool {
        self.sticky_mode.unwrap_or(false)
    }
}

/// A tree node: group or action. Untagged because the two shapes are already
/// discriminated by their `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Group(Group),
    Action(Action),
}

impl Node {
    pub fn key(&self) -> Option<&str> {
        match self {
            Node::Group(g) => g.key.as_deref(),
            Node::Action(a) => a.key.as_deref(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Node::Group(_))
    }

    /// Set by the resolver on entries taken purely from the fallback tree.
    pub fn mark_from_fallback(&mut self) {
        match self {
            Node::Group(g) => g.from_fallback = true,
            Node::Action(a) => a.from_fallback = true,
        }
    }

    pub fn from_fallback(&self) -> bool {
        match self {
            Node::Group(g) => g.from_fallback,
            Node::Action(a) => a.from_fallback,
        }
    }
}

/// A root `Group` with a stable identity.
#[derive(Debug, Clone)]
pub struct ActionTree {
    id: TreeId,
    pub root: Group,
}

impl ActionTree {
    /// Construct a tree, assigning fresh group ids throughout.
    pub fn new(mut root: Group) -> Self {
        assign_group_ids(&mut root);
        ActionTree {
            id: TreeId::fresh(),
            root,
        }
    }

    pub fn empty() -> Self {
        ActionTree::new(Group::new(None, Vec::new()))
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let root: Group = serde_json::from_str(text)?;
        Ok(ActionTree::new(root))
    }

    /// Serialize the tree to the on-disk document form (the root group).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.root)
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Total node count, used as the cache cost estimate.
    pub fn node_count(&self) -> usize {
        fn count(group: &Group) -> usize {
            1 + group
                .actions
                .iter()
                .map(|n| match n {
                    Node::Group(g) => count(g),
                    Node::Action(_) => 1,
                })
                .sum::<usize>()
        }
        count(&self.root)
    }

    /// Resolve an index path from the root. Empty path yields the root group.
    pub fn group_at(&self, path: &[usize]) -> Option<&Group> {
        let mut current = &self.root;
        for &idx in path {
            match current.actions.get(idx)? {
                Node::Group(g) => current = g,
                Node::Action(_) => return None,
            }
        }
        Some(current)
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let (last, parents) = path.split_last()?;
        let group = self.group_at(parents)?;
        group.actions.get(*last)
    }

    /// Visit every group (root included) with its index path, document order.
    pub fn for_each_group<F: FnMut(&Group, &[usize])>(&self, mut visit: F) {
        fn walk<F: FnMut(&Group, &[usize])>(group: &Group, path: &mut Vec<usize>, visit: &mut F) {
            visit(group, path);
            for (idx, child) in group.actions.iter().enumerate() {
                if let Node::Group(g) = child {
                    path.push(idx);
                    walk(g, path, visit);
                    path.pop();
                }
            }
        }
        let mut path = Vec::new();
        walk(&self.root, &mut path, &mut visit);
    }

    /// Content comparison that ignores runtime identity (tree and group ids).
    pub fn same_structure(&self, other: &ActionTree) -> bool {
        groups_structurally_eq(&self.root, &other.root)
    }
}

fn assign_group_ids(group: &mut Group) {
    group.id = GroupId::fresh();
    for child in &mut group.actions {
        if let Node::Group(g) = child {
            assign_group_ids(g);
        }
    }
}

fn groups_structurally_eq(a: &Group, b: &Group) -> bool {
    a.key == b.key
        && a.label == b.label
        && a.icon_path == b.icon_path
        && a.sticky_mode == b.sticky_mode
        && a.actions.len() == b.actions.len()
        && a.actions
            .iter()
            .zip(&b.actions)
            .all(|(x, y)| match (x, y) {
                (Node::Group(x), Node::Group(y)) => groups_structurally_eq(x, y),
                (Node::Action(x), Node::Action(y)) => x == y,
                _ => false,
            })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "group",
        "actions": [
            {"key": "t", "type": "application", "value": "/Applications/Terminal.app"},
            {"key": "o", "type": "group", "label": "Open", "actions": [
                {"key": "s", "type": "application", "value": "/Applications/Safari.app"},
                {"key": "e", "type": "application", "value": "/Applications/Mail.app"}
            ]},
            {"key": "g", "type": "url", "value": "https://github.com", "activates": true}
        ]
    }"#;

    #[test]
    fn parses_discriminated_document() {
        let tree = ActionTree::from_json(SAMPLE).expect("sample parses");
        assert_eq!(tree.root.actions.len(), 3);
        match &tree.root.actions[0] {
            Node::Action(a) => {
                assert_eq!(a.kind, ActionKind::Application);
                assert_eq!(a.key.as_deref(), Some("t"));
            }
            Node::Group(_) => panic!("expected action at index 0"),
        }
        match &tree.root.actions[1] {
            Node::Group(g) => {
                assert_eq!(g.label.as_deref(), Some("Open"));
                assert_eq!(g.actions.len(), 2);
            }
            Node::Action(_) => panic!("expected group at index 1"),
        }
        match &tree.root.actions[2] {
            Node::Action(a) => {
                assert_eq!(a.kind, ActionKind::Url);
                assert_eq!(a.activates, Some(true));
            }
            Node::Group(_) => panic!("expected action at index 2"),
        }
    }

    #[test]
    fn camel_case_fields_round_trip() {
        let json = r#"{"type":"group","iconPath":"/tmp/icon.png","stickyMode":true,"actions":[]}"#;
        let tree = ActionTree::from_json(json).expect("parses");
        assert_eq!(tree.root.icon_path.as_deref(), Some("/tmp/icon.png"));
        assert!(tree.root.sticky());

        let out = serde_json::to_string(&tree.root).expect("serializes");
        assert!(out.contains("\"iconPath\""));
        assert!(out.contains("\"stickyMode\""));
    }

    #[test]
    fn index_path_lookup() {
        let tree = ActionTree::from_json(SAMPLE).expect("parses");
        assert!(tree.group_at(&[]).is_some());
        let open = tree.group_at(&[1]).expect("group at [1]");
        assert_eq!(open.key.as_deref(), Some("o"));

        match tree.node_at(&[1, 0]) {
            Some(Node::Action(a)) => assert_eq!(a.key.as_deref(), Some("s")),
            other => panic!("unexpected node at [1,0]: {:?}", other),
        }
        // Paths through actions resolve to nothing.
        assert!(tree.node_at(&[0, 0]).is_none());
        assert!(tree.group_at(&[9]).is_none());
    }

    #[test]
    fn ids_are_stable_and_distinct() {
        let tree = ActionTree::from_json(SAMPLE).expect("parses");
        let again = ActionTree::from_json(SAMPLE).expect("parses");
        assert_ne!(tree.id(), again.id());
        assert!(tree.root.id.is_assigned());

        let open = tree.group_at(&[1]).expect("group");
        assert!(open.id.is_assigned());
        assert_ne!(tree.root.id, open.id);
    }

    #[test]
    fn node_count_includes_all_nodes() {
        let tree = ActionTree::from_json(SAMPLE).expect("parses");
        // root + t + o + s + e + g
        assert_eq!(tree.node_count(), 6);
    }

    #[test]
    fn structural_equality_ignores_identity() {
        let a = ActionTree::from_json(SAMPLE).expect("parses");
        let b = ActionTree::from_json(SAMPLE).expect("parses");
        assert!(a.same_structure(&b));

        let c = ActionTree::new(Group::new(None, vec![app("x", "X.app")]));
        assert!(!a.same_structure(&c));
    }

    #[test]
    fn for_each_group_walks_document_order() {
        let root = Group::new(
            None,
            vec![
                group("a", vec![group("b", vec![])]),
                app("c", "C.app"),
                group("d", vec![]),
            ],
        );
        let tree = ActionTree::new(root);
        let mut seen = Vec::new();
        tree.for_each_group(|g, path| {
            seen.push((g.key.clone(), path.to_vec()));
        });
        assert_eq!(
            seen,
            vec![
                (None, vec![]),
                (Some("a".into()), vec![0]),
                (Some("b".into()), vec![0, 0]),
                (Some("d".into()), vec![2]),
            ]
        );
    }
}
