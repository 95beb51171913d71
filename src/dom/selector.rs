//! A CSS selector subset, large enough to resolve every locator the synthesizer emits
//! and the hand-written selectors users paste into the CLI.
//!
//! Supported: type and universal selectors, `#id`, `.class`, `[attr]`, `[attr="value"]`,
//! `:nth-of-type(n)`, `:nth-child(n)`, the child (`>`) and descendant combinators, and
//! comma-separated lists. Identifiers accept CSS escapes, so everything produced by
//! [`css_escape`] parses back to the original string.

use crate::dom::tree::{DomTree, NodeId};
use crate::error::{Result, SyringeError};

/// Parsed selector list
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    alternatives: Vec<ComplexSelector>,
}

#[derive(Debug, Clone, PartialEq)]
struct ComplexSelector {
    compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Child,
    Descendant,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeMatch>,
    pseudos: Vec<Pseudo>,
}

#[derive(Debug, Clone, PartialEq)]
struct AttributeMatch {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pseudo {
    NthOfType(usize),
    NthChild(usize),
}

impl Selector {
    /// Parse a selector list
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser::new(input);
        let mut alternatives = vec![parser.complex()?];
        while parser.eat(',') {
            alternatives.push(parser.complex()?);
        }
        parser.skip_whitespace();
        if let Some(c) = parser.peek() {
            return Err(parser.error(format!("unexpected '{}'", c)));
        }
        Ok(Self { alternatives })
    }

    /// Whether the node matches any alternative of the list
    pub fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        self.alternatives.iter().any(|complex| complex.matches(tree, node))
    }
}

impl ComplexSelector {
    fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        self.matches_at(tree, node, self.compounds.len() - 1)
    }

    fn matches_at(&self, tree: &DomTree, node: NodeId, index: usize) -> bool {
        if !self.compounds[index].matches(tree, node) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match self.combinators[index - 1] {
            Combinator::Child => tree
                .parent(node)
                .is_some_and(|parent| self.matches_at(tree, parent, index - 1)),
            Combinator::Descendant => tree
                .ancestors(node)
                .any(|ancestor| self.matches_at(tree, ancestor, index - 1)),
        }
    }
}

impl Compound {
    fn matches(&self, tree: &DomTree, node: NodeId) -> bool {
        let Some(element) = tree.element(node) else {
            return false;
        };

        if let Some(tag) = &self.tag {
            if !element.is_tag(tag) {
                return false;
            }
        }
        if !self.ids.iter().all(|id| element.id().is_some_and(|v| v == id)) {
            return false;
        }
        if !self.classes.iter().all(|class| element.has_class(class)) {
            return false;
        }
        let attributes_match = self.attributes.iter().all(|attr| {
            match (element.get_attribute(&attr.name), &attr.value) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            }
        });
        if !attributes_match {
            return false;
        }
        self.pseudos.iter().all(|pseudo| match *pseudo {
            Pseudo::NthOfType(n) => tree.same_tag_position(node).is_some_and(|(pos, _)| pos == n),
            Pseudo::NthChild(n) => tree.child_position(node) == Some(n),
        })
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl std::fmt::Display) -> SyringeError {
        SyringeError::InvalidSelector(format!("{} in '{}' at {}", reason, self.input, self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", expected)))
        }
    }

    /// Skip whitespace, reporting whether any was consumed
    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn complex(&mut self) -> Result<ComplexSelector> {
        self.skip_whitespace();
        let mut compounds = vec![self.compound()?];
        let mut combinators = Vec::new();

        loop {
            let had_whitespace = self.skip_whitespace();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    self.bump();
                    self.skip_whitespace();
                    combinators.push(Combinator::Child);
                }
                Some(_) if had_whitespace => combinators.push(Combinator::Descendant),
                Some(c) => return Err(self.error(format!("unexpected '{}'", c))),
            }
            compounds.push(self.compound()?);
        }

        Ok(ComplexSelector {
            compounds,
            combinators,
        })
    }

    fn compound(&mut self) -> Result<Compound> {
        let mut compound = Compound::default();
        let mut empty = true;

        match self.peek() {
            Some('*') => {
                self.bump();
                empty = false;
            }
            Some(c) if is_ident_start(c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
                empty = false;
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    compound.ids.push(self.ident()?);
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.bump();
                    compound.attributes.push(self.attribute()?);
                }
                Some(':') => {
                    self.bump();
                    compound.pseudos.push(self.pseudo()?);
                }
                _ => break,
            }
            empty = false;
        }

        if empty {
            return Err(match self.peek() {
                Some(c) => self.error(format!("unexpected '{}'", c)),
                None => self.error("empty selector"),
            });
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> Result<AttributeMatch> {
        self.skip_whitespace();
        let name = self.ident()?;
        if self.eat(']') {
            return Ok(AttributeMatch { name, value: None });
        }
        self.expect('=')?;
        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                self.quoted(quote)?
            }
            _ => self.ident()?,
        };
        self.expect(']')?;
        Ok(AttributeMatch {
            name,
            value: Some(value),
        })
    }

    fn pseudo(&mut self) -> Result<Pseudo> {
        let name = self.ident()?.to_ascii_lowercase();
        self.expect('(')?;
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        let n: usize = digits
            .parse()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| self.error("expected a positive integer"))?;
        self.expect(')')?;

        match name.as_str() {
            "nth-of-type" => Ok(Pseudo::NthOfType(n)),
            "nth-child" => Ok(Pseudo::NthChild(n)),
            other => Err(self.error(format!("unsupported pseudo-class ':{}'", other))),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => out.push(self.escape()),
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn ident(&mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                out.push(self.escape());
            } else if is_ident_char(c) {
                self.bump();
                out.push(c);
            } else {
                break;
            }
        }
        if out.is_empty() {
            return Err(self.error("expected an identifier"));
        }
        Ok(out)
    }

    /// Decode the escape following a consumed backslash
    fn escape(&mut self) -> char {
        let start = self.pos;
        while self.pos - start < 6 && self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
            self.pos += 1;
        }
        if self.pos > start {
            let hex: String = self.chars[start..self.pos].iter().collect();
            if self.peek().is_some_and(char::is_whitespace) {
                self.pos += 1;
            }
            return u32::from_str_radix(&hex, 16)
                .ok()
                .filter(|&code| code != 0)
                .and_then(char::from_u32)
                .unwrap_or('\u{FFFD}');
        }
        self.bump().unwrap_or('\u{FFFD}')
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || c == '\\' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

/// Escape a string for use as a CSS identifier (CSSOM `CSS.escape`)
pub fn css_escape(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());

    for (i, &c) in chars.iter().enumerate() {
        let code = c as u32;
        if code == 0 {
            out.push('\u{FFFD}');
        } else if (0x01..=0x1F).contains(&code)
            || code == 0x7F
            || (i == 0 && c.is_ascii_digit())
            || (i == 1 && c.is_ascii_digit() && chars[0] == '-')
        {
            out.push_str(&format!("\\{:x} ", code));
        } else if i == 0 && c == '-' && chars.len() == 1 {
            out.push_str("\\-");
        } else if !c.is_ascii() || c == '-' || c == '_' || c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

impl DomTree {
    /// All nodes matching a selector, in document order
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        let selector = Selector::parse(selector)?;
        Ok(self
            .iter()
            .into_iter()
            .filter(|&node| selector.matches(self, node))
            .collect())
    }

    /// First node matching a selector, in document order
    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        let selector = Selector::parse(selector)?;
        Ok(self.iter().into_iter().find(|&node| selector.matches(self, node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::element::ElementNode;

    fn create_test_tree() -> DomTree {
        DomTree::new(
            ElementNode::new("body")
                .with_child(
                    ElementNode::new("ul")
                        .with_id("list")
                        .with_child(ElementNode::new("li").with_class("item first").with_text("one"))
                        .with_child(ElementNode::new("li").with_class("item").with_text("two"))
                        .with_child(ElementNode::new("li").with_class("item").with_text("three")),
                )
                .with_child(
                    ElementNode::new("div")
                        .with_attribute("data-role", "price")
                        .with_child(ElementNode::new("span").with_text("9.99"))
                        .with_child(ElementNode::new("p").with_child(ElementNode::new("span").with_text("deep"))),
                ),
        )
    }

    fn texts(tree: &DomTree, nodes: &[NodeId]) -> Vec<String> {
        nodes.iter().map(|&n| tree.text_content(n)).collect()
    }

    #[test]
    fn test_type_and_class() {
        let tree = create_test_tree();
        let items = tree.query_selector_all("li.item").unwrap();
        assert_eq!(texts(&tree, &items), vec!["one", "two", "three"]);

        let first = tree.query_selector_all(".item.first").unwrap();
        assert_eq!(texts(&tree, &first), vec!["one"]);
    }

    #[test]
    fn test_id_and_nth_of_type() {
        let tree = create_test_tree();
        let second = tree.query_selector("#list > li:nth-of-type(2)").unwrap().unwrap();
        assert_eq!(tree.text_content(second), "two");

        let third = tree.query_selector("ul li:nth-child(3)").unwrap().unwrap();
        assert_eq!(tree.text_content(third), "three");
    }

    #[test]
    fn test_child_versus_descendant() {
        let tree = create_test_tree();
        let direct = tree.query_selector_all("div > span").unwrap();
        assert_eq!(texts(&tree, &direct), vec!["9.99"]);

        let all = tree.query_selector_all("div span").unwrap();
        assert_eq!(texts(&tree, &all), vec!["9.99", "deep"]);
    }

    #[test]
    fn test_attribute_selectors() {
        let tree = create_test_tree();
        assert_eq!(tree.query_selector_all("[data-role]").unwrap().len(), 1);
        assert_eq!(tree.query_selector_all("div[data-role=\"price\"]").unwrap().len(), 1);
        assert_eq!(tree.query_selector_all("[data-role='other']").unwrap().len(), 0);
    }

    #[test]
    fn test_selector_list() {
        let tree = create_test_tree();
        let nodes = tree.query_selector_all("#list, p > span").unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_invalid_selectors() {
        let tree = create_test_tree();
        for bad in ["", "   ", "div >", "li:hover", "li:nth-of-type(0)", "[a~=b]", "#", "a,,b"] {
            let err = tree.query_selector(bad).unwrap_err();
            assert!(matches!(err, SyringeError::InvalidSelector(_)), "{bad}");
        }
    }

    #[test]
    fn test_css_escape() {
        assert_eq!(css_escape("plain-id_1"), "plain-id_1");
        assert_eq!(css_escape("1abc"), "\\31 abc");
        assert_eq!(css_escape("-1x"), "-\\31 x");
        assert_eq!(css_escape("-"), "\\-");
        assert_eq!(css_escape("a:b.c"), "a\\:b\\.c");
        assert_eq!(css_escape("héllo"), "héllo");
    }

    #[test]
    fn test_escaped_identifiers_round_trip() {
        for raw in ["1st", "a:b", "with space", "x.y#z", "-2"] {
            let tree = DomTree::new(ElementNode::new("body").with_child(ElementNode::new("div").with_id(raw)));
            let selector = format!("#{}", css_escape(raw));
            let found = tree.query_selector(&selector).unwrap();
            assert!(found.is_some(), "{selector}");
        }
    }
}
