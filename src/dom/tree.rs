use crate::dom::element::{ElementNode, InlineStyle};
use crate::error::{Result, SyringeError};
use headless_chrome::Tab;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stable identity of a node inside one [`DomTree`].
///
/// Ids are never reused, so a detached node's id keeps pointing at nothing rather
/// than at some unrelated element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Node {
    /// Element data; `children` is always empty here, structure lives in the arena
    element: ElementNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attached: bool,
}

/// Live, mutable document structure of one page.
///
/// Nodes are kept in an arena with parent links so locator synthesis can walk
/// upwards and the picker can mount or remove its overlay without invalidating
/// other ids.
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl DomTree {
    /// Build a tree from an element snapshot
    pub fn new(root: ElementNode) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.insert(root, None);
        tree
    }

    /// Parse a JSON element snapshot
    pub fn from_json(json: &str) -> Result<Self> {
        let root: ElementNode = serde_json::from_str(json)
            .map_err(|e| SyringeError::DomParseFailed(format!("Failed to parse DOM JSON: {}", e)))?;
        Ok(Self::new(root))
    }

    /// Snapshot the document of a browser tab
    pub fn from_tab(tab: &Arc<Tab>) -> Result<Self> {
        let js_code = include_str!("snapshot_dom.js");

        let result = tab.evaluate(js_code, false).map_err(|e| {
            SyringeError::DomParseFailed(format!("Failed to execute DOM snapshot script: {}", e))
        })?;

        let json_value = result
            .value
            .ok_or_else(|| SyringeError::DomParseFailed("No value returned from DOM snapshot".to_string()))?;

        // The script returns a JSON string rather than an object
        let json_str: String = serde_json::from_value(json_value)
            .map_err(|e| SyringeError::DomParseFailed(format!("Failed to get JSON string: {}", e)))?;

        Self::from_json(&json_str)
    }

    fn insert(&mut self, mut element: ElementNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let children = std::mem::take(&mut element.children);
        self.nodes.push(Node {
            element,
            parent,
            children: Vec::with_capacity(children.len()),
            attached: true,
        });
        for child in children {
            let child_id = self.insert(child, Some(id));
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).filter(|n| n.attached)
    }

    /// Outermost node of the document
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The document's outermost content container (`body`, or the root itself)
    pub fn body(&self) -> NodeId {
        if self.nodes[self.root.0].element.is_tag("body") {
            return self.root;
        }
        self.children(self.root)
            .iter()
            .copied()
            .find(|&c| self.nodes[c.0].element.is_tag("body"))
            .unwrap_or(self.root)
    }

    /// Element data of an attached node
    pub fn element(&self, id: NodeId) -> Option<&ElementNode> {
        self.node(id).map(|n| &n.element)
    }

    /// Mutable element data of an attached node
    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementNode> {
        self.nodes
            .get_mut(id.0)
            .filter(|n| n.attached)
            .map(|n| &mut n.element)
    }

    /// Whether the node is still part of the document
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag_name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// Every attached node in document order
    pub fn iter(&self) -> Vec<NodeId> {
        let mut out = vec![self.root];
        out.extend(self.descendants(self.root));
        out
    }

    /// Descendants of a node in document order, excluding the node itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Whether `node` is `ancestor` or lies inside it
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Nearest inclusive ancestor satisfying the predicate
    pub fn closest(&self, id: NodeId, predicate: impl Fn(&ElementNode) -> bool) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|&n| self.element(n).is_some_and(&predicate))
    }

    /// First node in document order carrying the given id attribute
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.iter()
            .into_iter()
            .find(|&n| self.element(n).and_then(|e| e.id()).is_some_and(|v| v == id))
    }

    /// 1-based position among same-tag siblings, and the number of such siblings
    pub fn same_tag_position(&self, id: NodeId) -> Option<(usize, usize)> {
        let tag = self.tag_name(id)?;
        let parent = self.parent(id)?;
        let siblings: Vec<NodeId> = self
            .children(parent)
            .iter()
            .copied()
            .filter(|&s| self.tag_name(s).is_some_and(|t| t.eq_ignore_ascii_case(tag)))
            .collect();
        let position = siblings.iter().position(|&s| s == id)? + 1;
        Some((position, siblings.len()))
    }

    /// 1-based position among all element siblings
    pub fn child_position(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&s| s == id).map(|p| p + 1)
    }

    /// Text of the node and its descendants in document order, like DOM `textContent`
    pub fn text_content(&self, id: NodeId) -> String {
        let mut text = String::new();
        self.collect_text(id, &mut text);
        text
    }

    fn collect_text(&self, id: NodeId, text: &mut String) {
        if let Some(own) = self.element(id).and_then(|e| e.text_content.as_deref()) {
            text.push_str(own);
        }
        for &child in self.children(id) {
            self.collect_text(child, text);
            if let Some(tail) = self.element(child).and_then(|e| e.tail.as_deref()) {
                text.push_str(tail);
            }
        }
    }

    /// Current inline style of a node
    pub fn style(&self, id: NodeId) -> Option<&InlineStyle> {
        self.element(id).map(|e| &e.style)
    }

    /// Replace the inline style of a node; returns false for detached nodes
    pub fn set_style(&mut self, id: NodeId, style: InlineStyle) -> bool {
        match self.element_mut(id) {
            Some(element) => {
                element.style = style;
                true
            }
            None => false,
        }
    }

    /// Append a subtree as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, element: ElementNode) -> Option<NodeId> {
        if !self.is_attached(parent) {
            return None;
        }
        let id = self.insert(element, Some(parent));
        self.nodes[parent.0].children.push(id);
        Some(id)
    }

    /// Detach a node and its subtree from the document
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.is_attached(id) {
            return false;
        }
        if let Some(parent) = self.parent(id) {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
        for n in std::iter::once(id).chain(self.descendants(id)) {
            self.nodes[n.0].attached = false;
        }
        true
    }

    /// Rebuild an element snapshot of a subtree
    pub fn to_element(&self, id: NodeId) -> Option<ElementNode> {
        let mut element = self.element(id)?.clone();
        element.children = self
            .children(id)
            .iter()
            .filter_map(|&c| self.to_element(c))
            .collect();
        Some(element)
    }

    /// Convert the DOM tree to JSON
    pub fn to_json(&self) -> Result<String> {
        let root = self
            .to_element(self.root)
            .ok_or_else(|| SyringeError::DomParseFailed("Root node is detached".to_string()))?;
        serde_json::to_string_pretty(&root)
            .map_err(|e| SyringeError::DomParseFailed(format!("Failed to serialize DOM to JSON: {}", e)))
    }

    /// Count attached elements in the tree
    pub fn count_elements(&self) -> usize {
        self.iter().len()
    }
}
