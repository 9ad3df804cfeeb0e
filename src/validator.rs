//! Structural validation of action trees.
//!
//! `validate` is a pure function over a tree; it reports problems, it never
//! rejects. A tree with diagnostics still loads and dispatches (first
//! structural match wins on duplicate keys). Diagnostics block *saving* a
//! context in the editing surface, never runtime dispatch.

use crate::tree::{ActionTree, Group, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One problem found in a tree, addressed by index path from the root.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub path: Vec<usize>,
    pub severity: Severity,
    pub message: String,
    pub suggested_fix: Option<String>,
    /// For duplicate keys: the path of the colliding sibling, so both entries
    /// can be highlighted together.
    pub paired_with: Option<Vec<usize>>,
}

impl Diagnostic {
    fn error(path: Vec<usize>, message: impl Into<String>) -> Self {
        Diagnostic {
            path,
            severity: Severity::Error,
            message: message.into(),
            suggested_fix: None,
            paired_with: None,
        }
    }

    fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }
}

/// Check every sibling list in document order: missing keys, empty keys,
/// multi-character keys, duplicate keys among siblings. Recurses into
/// subgroups after diagnosing each list.
pub fn validate(tree: &ActionTree) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut path = Vec::new();
    validate_group(&tree.root, &mut path, &mut diagnostics);
    diagnostics
}

fn validate_group(group: &Group, path: &mut Vec<usize>, out: &mut Vec<Diagnostic>) {
    // Per-entry key shape checks, in order.
    for (idx, child) in group.actions.iter().enumerate() {
        let mut child_path = path.clone();
        child_path.push(idx);
        match child.key() {
            None => out.push(
                Diagnostic::error(child_path, describe(child, "has no key"))
                    .with_fix("assign a single-character key"),
            ),
            Some("") => out.push(
                Diagnostic::error(child_path, describe(child, "has an empty key"))
                    .with_fix("assign a single-character key"),
            ),
            Some(key) if key.chars().count() > 1 => {
                let first = key.chars().next().unwrap_or('?');
                out.push(
                    Diagnostic::error(
                        child_path,
                        format!("{} is longer than one character", describe_key(child, key)),
                    )
                    .with_fix(format!("shorten to '{}'", first)),
                );
            }
            Some(_) => {}
        }
    }

    // Duplicate detection among usable keys. Each member of a colliding set
    // gets its own diagnostic, paired with another member's path.
    for (idx, child) in group.actions.iter().enumerate() {
        let Some(key) = child.key().filter(|k| !k.is_empty()) else {
            continue;
        };
        let partner = group
            .actions
            .iter()
            .enumerate()
            .find(|(other_idx, other)| *other_idx != idx && other.key() == Some(key));
        if let Some((partner_idx, _)) = partner {
            let mut child_path = path.clone();
            child_path.push(idx);
            let mut partner_path = path.clone();
            partner_path.push(partner_idx);
            let mut diag = Diagnostic::error(
                child_path,
                format!("duplicate key '{}' among siblings", key),
            )
            .with_fix("pick a key unused in this group");
            diag.paired_with = Some(partner_path);
            out.push(diag);
        }
    }

    for (idx, child) in group.actions.iter().enumerate() {
        if let Node::Group(g) = child {
            path.push(idx);
            validate_group(g, path, out);
            path.pop();
        }
    }
}

fn describe(node: &Node, problem: &str) -> String {
    match node {
        Node::Group(g) => format!(
            "group '{}' {}",
            g.label.as_deref().unwrap_or("(unlabeled)"),
            problem
        ),
        Node::Action(a) => format!(
            "action '{}' {}",
            a.label.as_deref().unwrap_or(&a.value),
            problem
        ),
    }
}

fn describe_key(node: &Node, key: &str) -> String {
    match node {
        Node::Group(_) => format!("group key '{}'", key),
        Node::Action(_) => format!("action key '{}'", key),
    }
}
