use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot of a DOM element and its subtree.
///
/// This is the serialisable form of page markup: it is what a live tab snapshot
/// produces and what [`DomTree`](crate::dom::DomTree) is built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ElementNode {
    /// HTML tag name (e.g., "div", "button", "input")
    pub tag_name: String,

    /// Element attributes (e.g., id, class, alt, title, etc.)
    #[serde(default)]
    pub attributes: HashMap<String, String>,

    /// Text before the first child element (later text lives on the children's `tail`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,

    /// Text following this element inside its parent, up to the next sibling element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail: Option<String>,

    /// Live `value` property for form controls, if it differs from the attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Inline style fields the picker touches
    #[serde(default, skip_serializing_if = "InlineStyle::is_empty")]
    pub style: InlineStyle,

    /// Child elements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementNode>,
}

/// The subset of an element's inline style that highlighting overwrites
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InlineStyle {
    #[serde(default)]
    pub outline: String,

    #[serde(default)]
    pub outline_offset: String,

    #[serde(default)]
    pub background_color: String,
}

impl InlineStyle {
    pub fn new(
        outline: impl Into<String>,
        outline_offset: impl Into<String>,
        background_color: impl Into<String>,
    ) -> Self {
        Self {
            outline: outline.into(),
            outline_offset: outline_offset.into(),
            background_color: background_color.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outline.is_empty() && self.outline_offset.is_empty() && self.background_color.is_empty()
    }
}

impl ElementNode {
    /// Create a new ElementNode
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Builder method: set attributes
    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Builder method: set a single attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_attribute(key, value);
        self
    }

    /// Builder method: set the id attribute
    pub fn with_id(self, id: impl Into<String>) -> Self {
        self.with_attribute("id", id)
    }

    /// Builder method: set the class attribute
    pub fn with_class(self, class: impl Into<String>) -> Self {
        self.with_attribute("class", class)
    }

    /// Builder method: set text content
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = Some(text.into());
        self
    }

    /// Builder method: set the text that follows this element
    pub fn with_tail(mut self, tail: impl Into<String>) -> Self {
        self.tail = Some(tail.into());
        self
    }

    /// Builder method: set the live value property
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Builder method: set children
    pub fn with_children(mut self, children: Vec<ElementNode>) -> Self {
        self.children = children;
        self
    }

    /// Builder method: append one child
    pub fn with_child(mut self, child: ElementNode) -> Self {
        self.children.push(child);
        self
    }

    /// Add a single attribute
    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Add a child element
    pub fn add_child(&mut self, child: ElementNode) {
        self.children.push(child);
    }

    /// Get attribute value by key
    pub fn get_attribute(&self, key: &str) -> Option<&String> {
        self.attributes.get(key)
    }

    /// Check if element has a specific class
    pub fn has_class(&self, class_name: &str) -> bool {
        self.classes().any(|c| c == class_name)
    }

    /// Iterate over the element's class names
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace())
            .into_iter()
            .flatten()
    }

    /// Get element ID, ignoring an empty attribute
    pub fn id(&self) -> Option<&String> {
        self.attributes.get("id").filter(|id| !id.is_empty())
    }

    /// Check if element is a specific tag
    pub fn is_tag(&self, tag: &str) -> bool {
        self.tag_name.eq_ignore_ascii_case(tag)
    }

    /// Convert to a simplified string representation
    pub fn to_simple_string(&self) -> String {
        let mut parts = vec![format!("<{}", self.tag_name)];

        if let Some(id) = self.id() {
            parts.push(format!(" id=\"{}\"", id));
        }

        if let Some(class) = self.attributes.get("class") {
            parts.push(format!(" class=\"{}\"", class));
        }

        parts.push(">".to_string());

        if let Some(text) = &self.text_content {
            if !text.trim().is_empty() {
                parts.push(text.trim().to_string());
            }
        }

        parts.join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_node_creation() {
        let mut attrs = HashMap::new();
        attrs.insert("id".to_string(), "test-id".to_string());
        attrs.insert("class".to_string(), "btn primary".to_string());

        let element = ElementNode::new("BUTTON")
            .with_attributes(attrs)
            .with_text("Click me");

        assert_eq!(element.tag_name, "button");
        assert_eq!(element.id(), Some(&"test-id".to_string()));
        assert_eq!(element.text_content, Some("Click me".to_string()));
        assert!(element.is_tag("Button"));
    }

    #[test]
    fn test_has_class() {
        let mut element = ElementNode::new("div");
        element.add_attribute("class", "container  main active");

        assert!(element.has_class("container"));
        assert!(element.has_class("main"));
        assert!(element.has_class("active"));
        assert!(!element.has_class("hidden"));
        assert_eq!(element.classes().count(), 3);
    }

    #[test]
    fn test_empty_id_is_ignored() {
        let element = ElementNode::new("span").with_id("");
        assert!(element.id().is_none());
    }

    #[test]
    fn test_serialization_skips_defaults() {
        let element = ElementNode::new("input").with_value("42");
        let json = serde_json::to_value(&element).unwrap();

        assert_eq!(json["tag_name"], "input");
        assert_eq!(json["value"], "42");
        assert!(json.get("style").is_none());
        assert!(json.get("children").is_none());

        let back: ElementNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, element);
    }

    #[test]
    fn test_tail_serializes_only_when_set() {
        let element = ElementNode::new("b").with_text("5").with_tail(" items");
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["tail"], " items");

        let bare = serde_json::to_value(ElementNode::new("b")).unwrap();
        assert!(bare.get("tail").is_none());
    }

    #[test]
    fn test_inline_style_empty() {
        assert!(InlineStyle::default().is_empty());
        assert!(!InlineStyle::new("1px solid red", "", "").is_empty());
    }

    #[test]
    fn test_to_simple_string() {
        let element = ElementNode::new("button")
            .with_id("my-btn")
            .with_class("btn primary")
            .with_text("  Submit ");

        let simple = element.to_simple_string();
        assert!(simple.contains("<button"));
        assert!(simple.contains("id=\"my-btn\""));
        assert!(simple.contains("class=\"btn primary\""));
        assert!(simple.ends_with(">Submit"));
    }
}
