//! The long-lived coordinator.
//!
//! Owns the context menu derived from the catalog, forwards the confirm shortcut to
//! the active tab, and runs extract-and-copy when a menu entry is clicked.

use crate::dom::INVALID_SELECTOR;
use crate::error::Result;
use crate::host::{Clipboard, MenuEntry, MenuHost, TabInfo};
use crate::protocol::{Bus, Delivery, Endpoint, Message, MessageHandler, PageInfo, Response, Target};
use crate::store::{CATALOG_KEY, Catalog, CopyItem, StoreArea};
use crate::template::{self, RenderedCopy};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub const MENU_PARENT_ID: &str = "dom-syringe-parent";
pub const MENU_PARENT_TITLE: &str = "DOM Syringe";
pub const EMPTY_MENU_ID: &str = "no-items";
pub const EMPTY_MENU_TITLE: &str = "(No copy items yet)";
pub const MENU_ITEM_PREFIX: &str = "copy-item-";

/// Keyboard command that confirms the highlighted element
pub const CONFIRM_COMMAND: &str = "confirm-selection";

/// Menu entry id for the catalog item at `index`
pub fn menu_item_id(index: usize) -> String {
    format!("{}{}", MENU_ITEM_PREFIX, index)
}

/// Catalog index encoded in a menu entry id
pub fn parse_menu_item_id(id: &str) -> Option<usize> {
    id.strip_prefix(MENU_ITEM_PREFIX)?.parse().ok()
}

pub struct Coordinator {
    catalog: Catalog,
    delivery: Delivery,
    menu: Arc<dyn MenuHost>,
    clipboard: Arc<dyn Clipboard>,
    building: AtomicBool,
    rebuild_requested: AtomicBool,
}

impl Coordinator {
    pub fn new(
        catalog: Catalog,
        delivery: Delivery,
        menu: Arc<dyn MenuHost>,
        clipboard: Arc<dyn Clipboard>,
    ) -> Self {
        Self {
            catalog,
            delivery,
            menu,
            clipboard,
            building: AtomicBool::new(false),
            rebuild_requested: AtomicBool::new(false),
        }
    }

    /// Build the menu, start answering runtime messages and watch the catalog
    pub async fn start(self: &Arc<Self>, bus: &Bus) -> CoordinatorHandle {
        if let Err(e) = self.rebuild_menu().await {
            log::error!("Failed to build context menu: {}", e);
        }
        CoordinatorHandle {
            _endpoint: bus.listen_runtime(self.clone()),
            watcher: self.spawn_catalog_watch(),
        }
    }

    /// Rebuild the menu from the latest stored catalog.
    ///
    /// A request that arrives while a rebuild runs is folded into it: the running
    /// rebuild goes round again. Returns false when folded.
    pub async fn rebuild_menu(&self) -> Result<bool> {
        self.rebuild_requested.store(true, Ordering::SeqCst);
        let mut result = Ok(());
        loop {
            if self.building.swap(true, Ordering::SeqCst) {
                log::debug!("Menu rebuild already running");
                return Ok(false);
            }
            while self.rebuild_requested.swap(false, Ordering::SeqCst) {
                result = self.build_menu().await;
                if let Err(e) = &result {
                    log::error!("Failed to build context menu: {}", e);
                }
            }
            self.building.store(false, Ordering::SeqCst);
            if !self.rebuild_requested.load(Ordering::SeqCst) {
                break;
            }
        }
        result.map(|_| true)
    }

    async fn build_menu(&self) -> Result<()> {
        self.menu.remove_all().await?;
        self.menu.create(MenuEntry::new(MENU_PARENT_ID, MENU_PARENT_TITLE)).await?;

        let items = self.catalog.load().await?;
        if items.is_empty() {
            let placeholder = MenuEntry::new(EMPTY_MENU_ID, EMPTY_MENU_TITLE)
                .with_parent(MENU_PARENT_ID)
                .disabled();
            self.menu.create(placeholder).await?;
        }
        for (index, item) in items.iter().enumerate() {
            let entry = MenuEntry::new(menu_item_id(index), item.display_name()).with_parent(MENU_PARENT_ID);
            self.menu.create(entry).await?;
        }
        log::debug!("Context menu rebuilt with {} items", items.len());
        Ok(())
    }

    /// Rebuild the menu whenever the catalog key changes in the sync store
    pub fn spawn_catalog_watch(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.catalog.store().subscribe();
        let coordinator = self.clone();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.area == StoreArea::Sync && change.key == CATALOG_KEY => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => log::debug!("Catalog watch skipped {} changes", skipped),
                    Err(RecvError::Closed) => break,
                }
                if let Err(e) = coordinator.rebuild_menu().await {
                    log::error!("Failed to rebuild context menu: {}", e);
                }
            }
        })
    }

    /// Handle a keyboard command; returns whether the active tab accepted it
    pub async fn on_command(&self, command: &str) -> bool {
        if command != CONFIRM_COMMAND {
            return false;
        }
        let Some(tab) = self.delivery.host().active_tab().await else {
            return false;
        };
        self.delivery
            .send_best_effort(Target::Tab(tab.id), Message::ConfirmSelection)
            .await
            .is_some_and(|response| response.is_success())
    }

    /// Handle a context-menu click in `tab`.
    ///
    /// Clicks on entries that are not catalog items, or on items that no longer
    /// exist, are ignored.
    pub async fn on_menu_click(&self, menu_id: &str, tab: &TabInfo) -> Result<Option<RenderedCopy>> {
        let Some(index) = parse_menu_item_id(menu_id) else {
            return Ok(None);
        };
        let Some(item) = self.catalog.get(index).await? else {
            log::debug!("Menu entry {} has no catalog item", menu_id);
            return Ok(None);
        };
        self.extract_and_copy(&item, tab).await.map(Some)
    }

    /// Resolve every variable of an item in the tab, render it and copy the result
    pub async fn extract_and_copy(&self, item: &CopyItem, tab: &TabInfo) -> Result<RenderedCopy> {
        let page = self
            .delivery
            .send_to_page(tab, Message::GetPageInfo)
            .await?
            .into_page_info()
            .unwrap_or_else(|| PageInfo {
                url: tab.url.clone().unwrap_or_default(),
                title: tab.title.clone().unwrap_or_default(),
            });

        let values = self.extract_values(item, tab).await;
        let rendered = template::render(&item.template, &values, &page);
        self.clipboard.write(&rendered.html, &rendered.plain).await?;

        log::info!("Copied '{}' from {}", item.display_name(), page.url);
        Ok(rendered)
    }

    async fn extract_values(&self, item: &CopyItem, tab: &TabInfo) -> HashMap<String, String> {
        let mut values = HashMap::new();
        for (name, locator) in &item.variables {
            let message = Message::get_element_value(locator.clone());
            let value = match self.delivery.send_to_tab(tab, message).await {
                Ok(response) => response.into_value(),
                Err(e) => {
                    log::warn!("Could not read '{}' in tab {}: {}", name, tab.id, e);
                    None
                }
            };
            values.insert(name.clone(), value.unwrap_or_else(|| INVALID_SELECTOR.to_string()));
        }
        values
    }
}

#[async_trait]
impl MessageHandler for Coordinator {
    async fn handle(&self, message: Message) -> Option<Response> {
        match message {
            Message::RebuildMenu => {
                if let Err(e) = self.rebuild_menu().await {
                    log::error!("Failed to rebuild context menu: {}", e);
                }
                Some(Response::ok())
            }
            _ => None,
        }
    }
}

/// A running coordinator; dropping it stops message handling and the catalog watch
pub struct CoordinatorHandle {
    _endpoint: Endpoint,
    watcher: JoinHandle<()>,
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
