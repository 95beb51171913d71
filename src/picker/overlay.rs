use crate::config::Platform;
use crate::dom::{DomTree, ElementNode, NodeId};

/// Id of the status overlay root element
pub const OVERLAY_ID: &str = "dom-syringe-picker-overlay";

const TITLE_CLASS: &str = "ds-picker-title";

/// Non-interactive status banner shown while the picker is active.
///
/// Names the variable being picked and the confirm/cancel keys. The overlay is
/// appended to the content container and removed on teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlay {
    root: NodeId,
    name_slot: NodeId,
}

impl Overlay {
    /// Build the overlay and append it to the page
    pub fn mount(tree: &mut DomTree, variable_name: &str, platform: Platform) -> Option<Self> {
        let hint = ElementNode::new("span")
            .with_class("ds-picker-hint")
            .with_child(ElementNode::new("span").with_text("Hover and press "))
            .with_child(ElementNode::new("kbd").with_text(platform.confirm_hint()))
            .with_child(ElementNode::new("span").with_text(" to select, "))
            .with_child(ElementNode::new("kbd").with_text("Esc"))
            .with_child(ElementNode::new("span").with_text(" to cancel"));

        let title = ElementNode::new("span")
            .with_class(TITLE_CLASS)
            .with_text("Selecting: ")
            .with_child(ElementNode::new("strong").with_text(variable_name));

        let element = ElementNode::new("div")
            .with_id(OVERLAY_ID)
            .with_attribute("role", "status")
            .with_attribute("aria-live", "polite")
            .with_child(title)
            .with_child(hint);

        let body = tree.body();
        let root = tree.append_child(body, element)?;
        let name_slot = tree.descendants(root).into_iter().find(|&n| {
            tree.tag_name(n) == Some("strong")
                && tree
                    .parent(n)
                    .and_then(|p| tree.element(p))
                    .is_some_and(|p| p.has_class(TITLE_CLASS))
        })?;

        log::debug!("Mounted picker overlay for '{}'", variable_name);
        Some(Self { root, name_slot })
    }

    /// Show a different target variable without rebuilding the overlay
    pub fn set_variable_name(&self, tree: &mut DomTree, variable_name: &str) {
        if let Some(slot) = tree.element_mut(self.name_slot) {
            slot.text_content = Some(variable_name.to_string());
        }
    }

    pub fn variable_name(&self, tree: &DomTree) -> Option<String> {
        tree.element(self.name_slot).and_then(|e| e.text_content.clone())
    }

    /// Whether the node is part of the overlay
    pub fn contains(&self, tree: &DomTree, node: NodeId) -> bool {
        tree.contains(self.root, node)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn unmount(self, tree: &mut DomTree) -> bool {
        tree.remove(self.root)
    }

    /// Number of overlays currently in the page
    pub fn count(tree: &DomTree) -> usize {
        tree.iter()
            .into_iter()
            .filter(|&n| tree.element(n).and_then(|e| e.id()).is_some_and(|id| id == OVERLAY_ID))
            .count()
    }
}
