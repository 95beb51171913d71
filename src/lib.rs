//! # dom-syringe
//!
//! Bind named template variables to elements of a web page, then re-extract their
//! current text later and copy a rendered template to the clipboard.
//!
//! ## How it fits together
//!
//! - A **page agent** lives in each tab. It owns the tab's document, runs the
//!   interactive element picker and answers value lookups.
//! - The **coordinator** owns the context menu. A menu click extracts every
//!   variable of a copy item from the tab, renders the template and writes both
//!   HTML and plain text to the clipboard.
//! - The **control surface** is the editor. It starts picks, consumes the
//!   resulting selections and persists copy items to the catalog.
//!
//! The three talk through a message [`Bus`](protocol::Bus). A confirmed pick is
//! also written to the recovery store, so a control surface that was closed
//! mid-pick resumes the edit when it is reopened.
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use dom_syringe::dom::{DomTree, ElementNode, extract_text, synthesize, resolve};
//!
//! let tree = DomTree::new(
//!     ElementNode::new("body").with_child(ElementNode::new("h1").with_id("title").with_text("Widget")),
//! );
//! let title = tree.children(tree.body())[0];
//!
//! let locator = synthesize(&tree, title);
//! assert_eq!(locator.as_str(), "#title");
//! assert_eq!(extract_text(&tree, resolve(&tree, &locator), 500), "Widget");
//! ```
//!
//! ## Module Overview
//!
//! - [`dom`]: document snapshot, selectors, locator synthesis and text extraction
//! - [`picker`]: the element picker state machine, highlight and overlay
//! - [`protocol`]: messages, the in-process bus and delivery with agent injection
//! - [`store`]: key-value stores, the copy item catalog and pick recovery
//! - [`template`]: placeholder substitution and HTML/plain rendering
//! - [`agent`], [`coordinator`], [`surface`]: the three cooperating contexts
//! - [`host`]: tab, menu and clipboard seams with in-memory implementations
//! - [`browser`]: a Chrome-backed host for the command line tool
//! - [`error`]: error types and result aliases

pub mod agent;
pub mod browser;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod dom;
pub mod error;
pub mod host;
pub mod picker;
pub mod protocol;
pub mod store;
pub mod surface;
pub mod template;

pub use agent::PageAgent;
pub use browser::{BrowserSession, ChromeHost, ConnectionOptions, LaunchOptions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Platform, SyringeConfig};
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use dom::{DomTree, ElementNode, Locator};
pub use error::{Result, SyringeError, TransportError};
pub use host::{Clipboard, MemoryClipboard, MemoryHost, MenuHost, PageHost, RecordingMenu, TabInfo};
pub use protocol::{Bus, Delivery, Message, PageInfo, Response, Target};
pub use store::{Catalog, CopyItem, JsonFileStore, MemoryStore, RecoveryStore};
pub use surface::ControlSurface;
pub use template::RenderedCopy;
