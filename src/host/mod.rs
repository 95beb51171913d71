//! Browser-provided collaborators: tabs and script injection, the context menu and
//! the clipboard. The in-memory implementations back tests and the CLI.

pub mod memory;

pub use memory::MemoryHost;

use crate::error::Result;
use crate::protocol::TabId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// A browser tab as seen from the extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: TabId,

    /// None when the browser withholds the URL
    pub url: Option<String>,

    pub title: Option<String>,
}

impl TabInfo {
    pub fn new(id: TabId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: Some(url.into()),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Tab lookup and page agent injection
#[async_trait]
pub trait PageHost: Send + Sync {
    /// The focused tab of the current window
    async fn active_tab(&self) -> Option<TabInfo>;

    /// Inject the page agent and its styling into a tab
    async fn inject_agent(&self, tab: TabId) -> Result<()>;
}

/// One context-menu entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub id: String,
    pub parent_id: Option<String>,
    pub title: String,
    pub enabled: bool,
}

impl MenuEntry {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            title: title.into(),
            enabled: true,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// The browser context menu
#[async_trait]
pub trait MenuHost: Send + Sync {
    async fn remove_all(&self) -> Result<()>;

    async fn create(&self, entry: MenuEntry) -> Result<()>;
}

/// What was last written to the clipboard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardContents {
    pub html: String,
    pub plain: String,
}

/// System clipboard accepting a rich and a plain rendering at once
#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn write(&self, html: &str, plain: &str) -> Result<()>;
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Context menu kept in memory
#[derive(Debug, Default)]
pub struct RecordingMenu {
    entries: Mutex<Vec<MenuEntry>>,
}

impl RecordingMenu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<MenuEntry> {
        guard(&self.entries).clone()
    }
}

#[async_trait]
impl MenuHost for RecordingMenu {
    async fn remove_all(&self) -> Result<()> {
        guard(&self.entries).clear();
        Ok(())
    }

    async fn create(&self, entry: MenuEntry) -> Result<()> {
        guard(&self.entries).push(entry);
        Ok(())
    }
}

/// Clipboard kept in memory
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<ClipboardContents>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<ClipboardContents> {
        guard(&self.contents).clone()
    }
}

#[async_trait]
impl Clipboard for MemoryClipboard {
    async fn write(&self, html: &str, plain: &str) -> Result<()> {
        *guard(&self.contents) = Some(ClipboardContents {
            html: html.to_string(),
            plain: plain.to_string(),
        });
        Ok(())
    }
}
