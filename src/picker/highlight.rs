use crate::dom::{DomTree, InlineStyle, NodeId};
use indexmap::IndexMap;

/// Inline style applied to the hovered element
pub fn highlight_style() -> InlineStyle {
    InlineStyle::new("2px solid #8B5CF6", "2px", "rgba(139, 92, 246, 0.1)")
}

/// Ownership map from highlighted nodes to their original inline style.
///
/// The ledger never owns the nodes; it only remembers what to put back. An entry is
/// removed as soon as its style is restored.
#[derive(Debug, Clone, Default)]
pub struct StyleLedger {
    saved: IndexMap<NodeId, InlineStyle>,
}

impl StyleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save the node's current style and apply the highlight.
    ///
    /// Re-applying to a node that is already highlighted keeps the first saved original.
    pub fn apply(&mut self, tree: &mut DomTree, node: NodeId) -> bool {
        let Some(original) = tree.style(node).cloned() else {
            return false;
        };
        self.saved.entry(node).or_insert(original);
        tree.set_style(node, highlight_style())
    }

    /// Put back the node's original style and forget it
    pub fn restore(&mut self, tree: &mut DomTree, node: NodeId) -> bool {
        match self.saved.shift_remove(&node) {
            Some(original) => {
                // A node removed by the page while highlighted has nothing to restore
                tree.set_style(node, original);
                true
            }
            None => false,
        }
    }

    /// Restore every node still in the ledger
    pub fn restore_all(&mut self, tree: &mut DomTree) -> usize {
        let nodes: Vec<NodeId> = self.saved.keys().copied().collect();
        nodes.into_iter().filter(|&n| self.restore(tree, n)).count()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.saved.contains_key(&node)
    }

    pub fn original(&self, node: NodeId) -> Option<&InlineStyle> {
        self.saved.get(&node)
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ElementNode;

    fn create_test_tree() -> DomTree {
        let mut styled = ElementNode::new("p").with_text("styled");
        styled.style = InlineStyle::new("1px dashed red", "", "yellow");
        DomTree::new(ElementNode::new("body").with_child(styled).with_child(ElementNode::new("p")))
    }

    #[test]
    fn test_apply_and_restore() {
        let mut tree = create_test_tree();
        let styled = tree.children(tree.body())[0];
        let mut ledger = StyleLedger::new();

        assert!(ledger.apply(&mut tree, styled));
        assert_eq!(tree.style(styled), Some(&highlight_style()));
        assert_eq!(ledger.original(styled).unwrap().background_color, "yellow");

        assert!(ledger.restore(&mut tree, styled));
        assert_eq!(tree.style(styled).unwrap().outline, "1px dashed red");
        assert!(ledger.is_empty());
        assert!(!ledger.restore(&mut tree, styled));
    }

    #[test]
    fn test_reapply_keeps_first_original() {
        let mut tree = create_test_tree();
        let styled = tree.children(tree.body())[0];
        let mut ledger = StyleLedger::new();

        ledger.apply(&mut tree, styled);
        ledger.apply(&mut tree, styled);
        ledger.restore(&mut tree, styled);

        assert_eq!(tree.style(styled).unwrap().background_color, "yellow");
    }

    #[test]
    fn test_restore_all() {
        let mut tree = create_test_tree();
        let nodes = tree.children(tree.body()).to_vec();
        let mut ledger = StyleLedger::new();

        for &n in &nodes {
            ledger.apply(&mut tree, n);
        }
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.restore_all(&mut tree), 2);
        assert!(tree.style(nodes[1]).unwrap().is_empty());
    }

    #[test]
    fn test_detached_node_is_not_tracked() {
        let mut tree = create_test_tree();
        let plain = tree.children(tree.body())[1];
        tree.remove(plain);

        let mut ledger = StyleLedger::new();
        assert!(!ledger.apply(&mut tree, plain));
        assert!(!ledger.contains(plain));
    }
}
