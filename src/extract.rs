//! Text extraction over [`RawNode`] trees.
//!
//! - [`extract_text`] flattens any field into one trimmed string.
//! - [`extract_by_path`] walks a key path and collects every non-empty value
//!   at its end.
//! - [`first_list`] / [`first_text`] try candidate paths in priority order
//!   and stop at the first one that yields something.
//!
//! None of these functions fail: a missing key or an unexpected shape is
//! just "nothing found".

use crate::tree::{Field, RawNode};

/// Attribute or child names that hold a node's value when it has no
/// direct text, in priority order.
pub const ALTERNATE_TEXT_KEYS: &[&str] = &["content", "value"];

/// Names never descended into when a node has a single entry.
pub const OPAQUE_KEYS: &[&str] = &["lang", "type", "id"];

/// Recursion cap for [`extract_text`]; deeper trees yield no text.
pub const MAX_DEPTH: usize = 50;

/// A key path through nested nodes, e.g. `&["keyword-group", "keyword"]`.
pub type KeyPath = &'static [&'static str];

/// Flatten a field into a trimmed string.
///
/// - absent → `""`
/// - attribute value → trimmed value
/// - node with text → its text; otherwise the first present
///   [`ALTERNATE_TEXT_KEYS`] entry; otherwise its sole entry unless that
///   entry is in [`OPAQUE_KEYS`]; otherwise `""`
/// - sequence → the first element only
pub fn extract_text(field: Option<Field<'_>>) -> String {
    field.map(|f| text_at_depth(f, 0)).unwrap_or_default()
}

/// [`extract_text`] for a node.
pub fn node_text(node: &RawNode) -> String {
    text_at_depth(Field::Node(node), 0)
}

fn text_at_depth(field: Field<'_>, depth: usize) -> String {
    if depth > MAX_DEPTH {
        return String::new();
    }

    match field {
        Field::Scalar(value) => value.trim().to_string(),
        Field::Sequence(nodes) => nodes
            .first()
            .map(|first| text_at_depth(Field::Node(first), depth + 1))
            .unwrap_or_default(),
        Field::Node(node) => {
            if let Some(text) = node.text() {
                return text.trim().to_string();
            }

            if let Some(alternate) = ALTERNATE_TEXT_KEYS.iter().find_map(|key| node.get(key)) {
                return text_at_depth(alternate, depth + 1);
            }

            match node.sole_entry() {
                Some((name, inner)) if !OPAQUE_KEYS.contains(&name) => {
                    text_at_depth(inner, depth + 1)
                }
                _ => String::new(),
            }
        }
    }
}

/// Follow `path` from `node`. Every step but the last must land on a
/// single node; the last step may land on anything.
pub fn resolve_path<'a>(node: &'a RawNode, path: &[&str]) -> Option<Field<'a>> {
    let (last, parents) = path.split_last()?;
    let mut current = node;
    for key in parents {
        match current.get(key)? {
            Field::Node(next) => current = next,
            Field::Scalar(_) | Field::Sequence(_) => return None,
        }
    }
    current.get(last)
}

/// Collect the text values found at the end of `path`.
///
/// A sequence contributes every non-empty element in order (duplicates
/// kept); a single value contributes itself when non-empty. A broken path
/// gives an empty list.
pub fn extract_by_path(node: &RawNode, path: &[&str]) -> Vec<String> {
    match resolve_path(node, path) {
        Some(Field::Sequence(nodes)) => nodes
            .iter()
            .map(node_text)
            .filter(|text| !text.is_empty())
            .collect(),
        Some(field) => {
            let text = extract_text(Some(field));
            if text.is_empty() {
                Vec::new()
            } else {
                vec![text]
            }
        }
        None => Vec::new(),
    }
}

/// First candidate whose [`extract_by_path`] is non-empty. Later
/// candidates are never evaluated.
pub fn first_list(candidates: &[(&RawNode, &[&str])]) -> Vec<String> {
    candidates
        .iter()
        .map(|(node, path)| extract_by_path(node, path))
        .find(|values| !values.is_empty())
        .unwrap_or_default()
}

/// First candidate whose flattened text is non-empty.
pub fn first_text(candidates: &[(&RawNode, &[&str])]) -> String {
    candidates
        .iter()
        .map(|(node, path)| extract_text(resolve_path(node, path)))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

/// Single node at `path`, if the path ends on one.
pub fn node_at<'a>(node: &'a RawNode, path: &[&str]) -> Option<&'a RawNode> {
    match resolve_path(node, path)? {
        Field::Node(found) => Some(found),
        Field::Scalar(_) | Field::Sequence(_) => None,
    }
}
