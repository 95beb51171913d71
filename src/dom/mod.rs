//! Page structure, selectors and durable locators
//!
//! This module provides everything the page agent needs to reason about a document:
//! - ElementNode: serialisable snapshot of page markup
//! - DomTree: live arena of the document with stable node ids
//! - Selector: the CSS subset used to resolve locators
//! - Locator: synthesis and resolution of durable element locators
//! - Text extraction with sentinels for missing content

pub mod element;
pub mod locator;
pub mod selector;
pub mod text;
pub mod tree;

pub use element::{ElementNode, InlineStyle};
pub use locator::{Locator, Strategy, resolve, synthesize};
pub use selector::{Selector, css_escape};
pub use text::{INVALID_SELECTOR, NO_CONTENT, NO_ELEMENT, element_value, extract_text};
pub use tree::{DomTree, NodeId};

use crate::error::Result;
use headless_chrome::Tab;
use std::sync::Arc;

/// Snapshot the DOM tree of a browser tab
pub fn snapshot_dom(tab: &Arc<Tab>) -> Result<DomTree> {
    DomTree::from_tab(tab)
}
