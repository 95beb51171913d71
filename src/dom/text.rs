use crate::dom::locator::{self, Locator};
use crate::dom::tree::{DomTree, NodeId};

/// Shown when there is no element to read from
pub const NO_ELEMENT: &str = "[No Element]";

/// Shown when an element exists but carries nothing readable
pub const NO_CONTENT: &str = "[No Content]";

/// Shown when a locator does not resolve in the current page
pub const INVALID_SELECTOR: &str = "[Invalid Selector]";

const ELLIPSIS: &str = "...";

/// Display text of a node.
///
/// Falls back through trimmed text content, the value property or attribute, alt text,
/// title and placeholder, then a sentinel. The result is cut to `limit` characters.
pub fn extract_text(tree: &DomTree, node: Option<NodeId>, limit: usize) -> String {
    let Some((id, element)) = node.and_then(|n| tree.element(n).map(|e| (n, e))) else {
        return NO_ELEMENT.to_string();
    };

    let text = tree.text_content(id);
    let text = text.trim();
    if !text.is_empty() {
        return truncate(text, limit);
    }

    let value = element
        .value
        .as_deref()
        .or_else(|| element.get_attribute("value").map(String::as_str));

    let alt = element.get_attribute("alt").map(String::as_str);
    let title = element.get_attribute("title").map(String::as_str);

    for candidate in [value, alt, title] {
        if let Some(found) = candidate.map(str::trim).filter(|s| !s.is_empty()) {
            return truncate(found, limit);
        }
    }

    if let Some(placeholder) = element.get_attribute("placeholder").filter(|p| !p.is_empty()) {
        return truncate(&format!("[Placeholder: {}]", placeholder), limit);
    }

    NO_CONTENT.to_string()
}

/// Resolve a locator and read the node's display text.
///
/// A locator that does not resolve is reported as [`INVALID_SELECTOR`], never as an error.
pub fn element_value(tree: &DomTree, locator: &Locator, limit: usize) -> String {
    match locator::resolve(tree, locator) {
        Some(node) => extract_text(tree, Some(node), limit),
        None => INVALID_SELECTOR.to_string(),
    }
}

/// Cut text to `limit` characters, appending an ellipsis when anything was dropped
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => format!("{}{}", &text[..byte_index], ELLIPSIS),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::element::ElementNode;

    fn tree_with(child: ElementNode) -> (DomTree, NodeId) {
        let tree = DomTree::new(ElementNode::new("body").with_child(child));
        let node = tree.children(tree.body())[0];
        (tree, node)
    }

    #[test]
    fn test_text_content_is_trimmed() {
        let (tree, node) = tree_with(
            ElementNode::new("p")
                .with_text("  Hello ")
                .with_child(ElementNode::new("b").with_text("world  ")),
        );
        assert_eq!(extract_text(&tree, Some(node), 500), "Hello world");
    }

    #[test]
    fn test_mixed_text_follows_document_order() {
        let tree = DomTree::from_json(
            r#"{"tag_name": "p", "text_content": "Total: ", "children": [
                {"tag_name": "b", "text_content": "5", "tail": " items"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(&tree, Some(tree.root()), 500), "Total: 5 items");
    }

    #[test]
    fn test_fallback_chain() {
        let (tree, node) = tree_with(ElementNode::new("input").with_attribute("value", "attr").with_value(" live "));
        assert_eq!(extract_text(&tree, Some(node), 500), "live");

        let (tree, node) = tree_with(ElementNode::new("input").with_attribute("value", " attr "));
        assert_eq!(extract_text(&tree, Some(node), 500), "attr");

        let (tree, node) = tree_with(ElementNode::new("img").with_attribute("alt", "Logo"));
        assert_eq!(extract_text(&tree, Some(node), 500), "Logo");

        let (tree, node) = tree_with(ElementNode::new("span").with_attribute("title", "Tooltip"));
        assert_eq!(extract_text(&tree, Some(node), 500), "Tooltip");

        let (tree, node) = tree_with(ElementNode::new("input").with_attribute("placeholder", "Search"));
        assert_eq!(extract_text(&tree, Some(node), 500), "[Placeholder: Search]");

        let (tree, node) = tree_with(ElementNode::new("div"));
        assert_eq!(extract_text(&tree, Some(node), 500), NO_CONTENT);
    }

    #[test]
    fn test_missing_node() {
        let (tree, _) = tree_with(ElementNode::new("div"));
        assert_eq!(extract_text(&tree, None, 500), NO_ELEMENT);
    }

    #[test]
    fn test_truncation() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
        assert_eq!(truncate("ééééé", 2), "éé...");

        let (tree, node) = tree_with(ElementNode::new("p").with_text("x".repeat(600)));
        let text = extract_text(&tree, Some(node), 500);
        assert_eq!(text.chars().count(), 503);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_element_value() {
        let (tree, _) = tree_with(ElementNode::new("span").with_id("price").with_text("$5"));
        assert_eq!(element_value(&tree, &Locator::from("#price"), 500), "$5");
        assert_eq!(element_value(&tree, &Locator::from("#gone"), 500), INVALID_SELECTOR);
        assert_eq!(element_value(&tree, &Locator::from("[[["), 500), INVALID_SELECTOR);
    }
}
