//! Small accessors over KDL nodes.
//!
//! Settings are written as child nodes with a single argument
//! (`email "admin@example.com"`), lists as child nodes with several
//! arguments (`aliases "a.example" "b.example"`).

use ::kdl::{KdlNode, KdlValue};

/// First positional argument of a node as a string
pub fn get_first_arg_string(node: &KdlNode) -> Option<String> {
    positional_args(node)
        .next()
        .and_then(|v| v.as_string().map(str::to_string))
}

/// All positional string arguments of a node
pub fn get_arg_strings(node: &KdlNode) -> Vec<String> {
    positional_args(node)
        .filter_map(|v| v.as_string().map(str::to_string))
        .collect()
}

/// Child node by name
pub fn get_child<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlNode> {
    node.children()?
        .nodes()
        .iter()
        .find(|child| child.name().value() == name)
}

/// `name "value"` child as a string
pub fn get_string_entry(node: &KdlNode, name: &str) -> Option<String> {
    get_child(node, name).and_then(get_first_arg_string)
}

/// `name 42` child as an integer
pub fn get_int_entry(node: &KdlNode, name: &str) -> Option<i64> {
    get_child(node, name)
        .and_then(|child| positional_args(child).next())
        .and_then(KdlValue::as_integer)
        .and_then(|v| i64::try_from(v).ok())
}

/// `name "a" "b"` child as a list of strings
pub fn get_string_list(node: &KdlNode, name: &str) -> Vec<String> {
    get_child(node, name)
        .map(get_arg_strings)
        .unwrap_or_default()
}

fn positional_args(node: &KdlNode) -> impl Iterator<Item = &KdlValue> {
    node.entries()
        .iter()
        .filter(|entry| entry.name().is_none())
        .map(|entry| entry.value())
}
