//! Durable locators: turning a picked node into a selector string that can be
//! resolved again on a later visit.
//!
//! Synthesis prefers, in order:
//! 1. the node's id (`#id`), shortest and immune to reordering;
//! 2. its full class list as a compound selector, if exactly one node in the document
//!    carries it;
//! 3. a path from the content container down to the node, where any ancestor id
//!    short-circuits the walk and same-tag siblings get an `:nth-of-type()` qualifier.
//!
//! Positional qualifiers survive reordering among same-tag siblings only; inserting a
//! new same-tag sibling before the node shifts the index. Locators are recomputed on
//! every pick and never held as live references.

use crate::dom::selector::css_escape;
use crate::dom::tree::{DomTree, NodeId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between path segments
const PATH_SEPARATOR: &str = " > ";

/// A selector string that re-identifies one node within the current page structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    /// Placeholder for a variable whose pick has started but not been confirmed
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Which rule produced a locator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Identifier,
    UniqueClass,
    Path,
}

/// Synthesize a locator for a node. Never fails; a detached node yields its last
/// known tag name at best.
pub fn synthesize(tree: &DomTree, node: NodeId) -> Locator {
    synthesize_with_strategy(tree, node).0
}

/// Synthesize a locator and report which rule produced it
pub fn synthesize_with_strategy(tree: &DomTree, node: NodeId) -> (Locator, Strategy) {
    let Some(element) = tree.element(node) else {
        return (Locator::new("*"), Strategy::Path);
    };

    if let Some(id) = element.id() {
        return (Locator(format!("#{}", css_escape(id))), Strategy::Identifier);
    }

    let classes: Vec<&str> = element.classes().collect();
    if !classes.is_empty() {
        let selector: String = classes.iter().map(|c| format!(".{}", css_escape(c))).collect();
        if let Ok(matches) = tree.query_selector_all(&selector) {
            if matches.len() == 1 {
                return (Locator(selector), Strategy::UniqueClass);
            }
        }
    }

    (Locator(build_path(tree, node)), Strategy::Path)
}

fn build_path(tree: &DomTree, node: NodeId) -> String {
    let container = tree.body();
    let root = tree.root();
    let mut segments: Vec<String> = Vec::new();
    let mut current = Some(node);

    while let Some(id) = current {
        if id == container || id == root {
            break;
        }
        let Some(element) = tree.element(id) else {
            break;
        };

        if let Some(element_id) = element.id() {
            segments.push(format!("#{}", css_escape(element_id)));
            break;
        }

        let mut segment = element.tag_name.clone();
        if let Some((position, count)) = tree.same_tag_position(id) {
            if count > 1 {
                segment.push_str(&format!(":nth-of-type({})", position));
            }
        }
        segments.push(segment);
        current = tree.parent(id);
    }

    if segments.is_empty() {
        // The container itself was picked
        return tree.tag_name(node).unwrap_or("*").to_string();
    }

    segments.reverse();
    segments.join(PATH_SEPARATOR)
}

/// Resolve a locator against the current page structure.
///
/// `None` is an expected outcome: the page may have changed, or the stored string
/// may not be a valid selector at all.
pub fn resolve(tree: &DomTree, locator: &Locator) -> Option<NodeId> {
    if locator.is_empty() {
        return None;
    }
    match tree.query_selector(locator.as_str()) {
        Ok(found) => found,
        Err(e) => {
            log::debug!("Locator '{}' could not be parsed: {}", locator, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::element::ElementNode;

    fn create_test_tree() -> DomTree {
        DomTree::new(
            ElementNode::new("html").with_child(
                ElementNode::new("body")
                    .with_child(ElementNode::new("h1").with_id("title").with_text("Product"))
                    .with_child(
                        ElementNode::new("section")
                            .with_child(ElementNode::new("span").with_class("price").with_text("9.99"))
                            .with_child(ElementNode::new("span").with_class("tag").with_text("new"))
                            .with_child(ElementNode::new("span").with_class("tag").with_text("sale")),
                    )
                    .with_child(
                        ElementNode::new("div")
                            .with_id("reviews")
                            .with_child(ElementNode::new("p").with_text("Great"))
                            .with_child(ElementNode::new("p").with_text("Bad")),
                    )
                    .with_child(ElementNode::new("footer").with_child(ElementNode::new("a").with_text("Home"))),
            ),
        )
    }

    fn find_text(tree: &DomTree, text: &str) -> NodeId {
        tree.iter()
            .into_iter()
            .find(|&n| tree.element(n).and_then(|e| e.text_content.as_deref()) == Some(text))
            .unwrap()
    }

    #[test]
    fn test_identifier_wins() {
        let tree = create_test_tree();
        let h1 = find_text(&tree, "Product");
        let (locator, strategy) = synthesize_with_strategy(&tree, h1);

        assert_eq!(locator.as_str(), "#title");
        assert_eq!(strategy, Strategy::Identifier);
        assert_eq!(resolve(&tree, &locator), Some(h1));
    }

    #[test]
    fn test_unique_class() {
        let tree = create_test_tree();
        let price = find_text(&tree, "9.99");
        let (locator, strategy) = synthesize_with_strategy(&tree, price);

        assert_eq!(locator.as_str(), ".price");
        assert_eq!(strategy, Strategy::UniqueClass);
        assert_eq!(resolve(&tree, &locator), Some(price));
    }

    #[test]
    fn test_shared_class_falls_back_to_path_with_position() {
        let tree = create_test_tree();
        let new = find_text(&tree, "new");
        let sale = find_text(&tree, "sale");

        let new_locator = synthesize(&tree, new);
        let sale_locator = synthesize(&tree, sale);

        assert_eq!(new_locator.as_str(), "section > span:nth-of-type(2)");
        assert_eq!(sale_locator.as_str(), "section > span:nth-of-type(3)");
        assert_eq!(resolve(&tree, &new_locator), Some(new));
        assert_eq!(resolve(&tree, &sale_locator), Some(sale));
    }

    #[test]
    fn test_ancestor_identifier_short_circuits_path() {
        let tree = create_test_tree();
        let bad = find_text(&tree, "Bad");
        let locator = synthesize(&tree, bad);

        assert_eq!(locator.as_str(), "#reviews > p:nth-of-type(2)");
        assert_eq!(resolve(&tree, &locator), Some(bad));
    }

    #[test]
    fn test_single_tag_child_has_no_qualifier() {
        let tree = create_test_tree();
        let link = find_text(&tree, "Home");
        let locator = synthesize(&tree, link);

        assert_eq!(locator.as_str(), "footer > a");
        assert_eq!(resolve(&tree, &locator), Some(link));
    }

    #[test]
    fn test_synthesis_is_idempotent() {
        let tree = create_test_tree();
        for node in tree.iter() {
            assert_eq!(synthesize(&tree, node), synthesize(&tree, node));
        }
    }

    #[test]
    fn test_every_node_round_trips() {
        let tree = create_test_tree();
        let body = tree.body();
        for node in tree.descendants(body) {
            let locator = synthesize(&tree, node);
            assert_eq!(resolve(&tree, &locator), Some(node), "{locator}");
        }
    }

    #[test]
    fn test_escaped_identifier_round_trips() {
        let tree = DomTree::new(
            ElementNode::new("body").with_child(ElementNode::new("div").with_id("42:answer").with_text("x")),
        );
        let div = tree.children(tree.body())[0];
        let locator = synthesize(&tree, div);

        assert_eq!(locator.as_str(), "#\\34 2\\:answer");
        assert_eq!(resolve(&tree, &locator), Some(div));
    }

    #[test]
    fn test_container_and_detached_nodes_degrade() {
        let mut tree = create_test_tree();
        let body = tree.body();
        assert_eq!(synthesize(&tree, body).as_str(), "body");

        let link = find_text(&tree, "Home");
        tree.remove(link);
        assert_eq!(synthesize(&tree, link).as_str(), "*");
    }

    #[test]
    fn test_resolution_failures_are_none() {
        let tree = create_test_tree();
        assert_eq!(resolve(&tree, &Locator::from("#missing")), None);
        assert_eq!(resolve(&tree, &Locator::from("div >>> p")), None);
        assert_eq!(resolve(&tree, &Locator::empty()), None);
    }

    #[test]
    fn test_locator_serializes_as_plain_string() {
        let locator = Locator::from("#title");
        assert_eq!(serde_json::to_string(&locator).unwrap(), "\"#title\"");
    }
}
