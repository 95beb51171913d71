//! The control surface: the short-lived panel where copy items are edited.
//!
//! It may be destroyed at any moment, including in the middle of a pick, so it
//! saves its working copy to the recovery store before every pick and reconciles
//! on startup.

use crate::dom::Locator;
use crate::error::{Result, SyringeError};
use crate::protocol::{Bus, Delivery, Endpoint, Message, MessageHandler, PageInfo, Response, Target};
use crate::store::{Catalog, CopyItem, EditTarget, Recovery, RecoveryStore};
use crate::template::{self, RenderedCopy};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Preview value of a variable the page did not answer for
pub const NO_VALUE: &str = "[No value]";

/// Preview value of a variable whose lookup failed in transit
pub const LOOKUP_ERROR: &str = "[Error]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    List,
    Editor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Transient message shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

struct SurfaceState {
    items: Vec<CopyItem>,
    view: View,
    working: Option<CopyItem>,
    target: EditTarget,
    picking: Option<String>,
    page: Option<PageInfo>,
    notice: Option<Notice>,
}

impl SurfaceState {
    fn close_editor(&mut self) {
        self.view = View::List;
        self.working = None;
        self.target = EditTarget::New;
        self.picking = None;
    }
}

pub struct ControlSurface {
    catalog: Catalog,
    recovery: RecoveryStore,
    delivery: Delivery,
    state: Mutex<SurfaceState>,
}

impl ControlSurface {
    pub fn new(catalog: Catalog, recovery: RecoveryStore, delivery: Delivery) -> Self {
        Self {
            catalog,
            recovery,
            delivery,
            state: Mutex::new(SurfaceState {
                items: Vec::new(),
                view: View::List,
                working: None,
                target: EditTarget::New,
                picking: None,
                page: None,
                notice: None,
            }),
        }
    }

    /// Create a surface, run startup and start listening for picker broadcasts.
    ///
    /// Dropping the returned endpoint destroys the surface as far as other contexts
    /// can tell.
    pub async fn open(
        catalog: Catalog,
        recovery: RecoveryStore,
        delivery: Delivery,
        bus: &Bus,
    ) -> Result<(Arc<Self>, Endpoint)> {
        let surface = Arc::new(Self::new(catalog, recovery, delivery));
        surface.startup().await?;
        let endpoint = bus.listen_runtime(surface.clone());
        Ok((surface, endpoint))
    }

    // The lock is never held across an await
    fn state(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load the catalog, reconcile recovery records and read the active page
    pub async fn startup(&self) -> Result<Recovery> {
        let items = self.catalog.load().await?;
        let recovery = self.recovery.reconcile().await?;

        let page = match self.delivery.host().active_tab().await {
            Some(tab) if self.delivery.check_access(&tab).is_ok() => Some(PageInfo {
                url: tab.url.unwrap_or_default(),
                title: tab.title.unwrap_or_default(),
            }),
            _ => None,
        };

        let mut state = self.state();
        state.items = items;
        state.page = page;
        match &recovery {
            Recovery::Resume { target, item, .. } => {
                state.working = Some(item.clone());
                state.target = *target;
                state.view = View::Editor;
            }
            Recovery::Fresh => state.close_editor(),
        }
        Ok(recovery)
    }

    pub fn view(&self) -> View {
        self.state().view
    }

    pub fn items(&self) -> Vec<CopyItem> {
        self.state().items.clone()
    }

    /// The item being edited
    pub fn working(&self) -> Option<CopyItem> {
        self.state().working.clone()
    }

    pub fn edit_target(&self) -> EditTarget {
        self.state().target
    }

    /// Variable currently being picked, if any
    pub fn picking(&self) -> Option<String> {
        self.state().picking.clone()
    }

    pub fn page(&self) -> Option<PageInfo> {
        self.state().page.clone()
    }

    pub fn take_notice(&self) -> Option<Notice> {
        self.state().notice.take()
    }

    fn notify_error(&self, error: &SyringeError) {
        self.state().notice = Some(Notice::error(error.user_message()));
    }

    fn edit_working<R>(&self, f: impl FnOnce(&mut CopyItem) -> R) -> Option<R> {
        self.state().working.as_mut().map(f)
    }

    /// Start composing a new item
    pub fn create_item(&self) {
        let item = CopyItem::new(self.recovery.now_millis());
        let mut state = self.state();
        state.working = Some(item);
        state.target = EditTarget::New;
        state.view = View::Editor;
    }

    /// Open a copy of the item at `index` for editing
    pub fn edit_item(&self, index: usize) -> bool {
        let mut state = self.state();
        let Some(item) = state.items.get(index).cloned() else {
            return false;
        };
        state.working = Some(item);
        state.target = EditTarget::Existing(index);
        state.view = View::Editor;
        true
    }

    /// Leave the editor, discarding the working copy
    pub fn back_to_list(&self) {
        self.state().close_editor();
    }

    pub fn set_name(&self, name: &str) {
        self.edit_working(|item| item.name = name.to_string());
    }

    pub fn set_template(&self, template: &str) {
        self.edit_working(|item| item.template = template.to_string());
    }

    pub fn rename_variable(&self, old: &str, new: &str) -> Result<()> {
        let result = self
            .edit_working(|item| item.rename_variable(old, new))
            .unwrap_or_else(|| Err(SyringeError::Validation("Nothing is being edited".to_string())));
        if let Err(e) = &result {
            self.notify_error(e);
        }
        result
    }

    pub fn remove_variable(&self, name: &str) -> Option<Locator> {
        self.edit_working(|item| item.remove_variable(name)).flatten()
    }

    /// Variables matching a partially typed placeholder
    pub fn suggestions(&self, partial: &str) -> Vec<String> {
        let state = self.state();
        let bound = state
            .working
            .iter()
            .flat_map(|item| item.variables.keys().map(String::as_str));
        template::suggest_variables(partial, bound)
    }

    /// Add a new `varN` variable and start picking its element
    pub async fn add_variable(&self) -> Result<String> {
        let name = self
            .edit_working(|item| item.next_variable_name())
            .ok_or_else(|| SyringeError::Validation("Nothing is being edited".to_string()))?;
        // Bound before the pick starts so an early selection is not overwritten
        self.edit_working(|item| item.bind_variable(name.clone(), Locator::empty()));
        if let Err(e) = self.pick(&name).await {
            self.edit_working(|item| item.remove_variable(&name));
            return Err(e);
        }
        Ok(name)
    }

    /// Pick a new element for an existing variable
    pub async fn repick(&self, name: &str) -> Result<()> {
        self.pick(name).await
    }

    async fn pick(&self, variable_name: &str) -> Result<()> {
        self.state().picking = Some(variable_name.to_string());
        let result = self.try_pick(variable_name).await;
        if let Err(e) = &result {
            log::warn!("Could not start picker for '{}': {}", variable_name, e);
            self.state().picking = None;
            self.notify_error(e);
        }
        result
    }

    async fn try_pick(&self, variable_name: &str) -> Result<()> {
        let tab = self.delivery.active_tab().await?;
        self.delivery.check_access(&tab)?;

        let (target, draft) = {
            let state = self.state();
            let draft = state
                .working
                .clone()
                .ok_or_else(|| SyringeError::Validation("Nothing is being edited".to_string()))?;
            (state.target, draft)
        };
        // The surface may be gone before the pick completes
        self.recovery.save_draft(target, &draft).await?;

        let started = match self.delivery.send_to_page(&tab, Message::start_picker(variable_name)).await {
            Ok(response) if response.is_success() => Ok(()),
            Ok(_) => Err(SyringeError::InjectionFailed(format!(
                "Tab {} refused to start the picker",
                tab.id
            ))),
            Err(e) => Err(e),
        };
        if started.is_err() {
            // No pick is running, so there is nothing to recover into
            if let Err(e) = self.recovery.clear_draft().await {
                log::warn!("Could not clear editing draft: {}", e);
            }
            return started;
        }
        log::debug!("Picker started for '{}' in tab {}", variable_name, tab.id);
        Ok(())
    }

    /// Stop an in-progress pick
    pub async fn cancel_pick(&self) {
        if self.state().picking.take().is_none() {
            return;
        }
        if let Ok(tab) = self.delivery.active_tab().await {
            self.delivery.send_best_effort(Target::Tab(tab.id), Message::StopPicker).await;
        }
    }

    /// Commit the working copy to the catalog and return to the list
    pub async fn save(&self) -> Result<()> {
        let (draft, target) = {
            let state = self.state();
            (state.working.clone(), state.target)
        };
        let Some(draft) = draft else {
            return Err(SyringeError::Validation("Nothing is being edited".to_string()));
        };

        let items = match self.catalog.commit(&draft, target).await {
            Ok(items) => items,
            Err(e) => {
                self.notify_error(&e);
                return Err(e);
            }
        };

        {
            let mut state = self.state();
            state.items = items;
            state.close_editor();
            state.notice = Some(Notice::success("Saved successfully"));
        }
        self.delivery.send_best_effort(Target::Runtime, Message::RebuildMenu).await;
        Ok(())
    }

    /// Delete the item being edited
    pub async fn delete(&self) -> Result<()> {
        let Some(id) = self.state().working.as_ref().map(|item| item.id.clone()) else {
            return Ok(());
        };
        let items = self.catalog.delete(&id).await?;
        {
            let mut state = self.state();
            state.items = items;
            state.close_editor();
            state.notice = Some(Notice::success("Deleted successfully"));
        }
        self.delivery.send_best_effort(Target::Runtime, Message::RebuildMenu).await;
        Ok(())
    }

    /// Current page values of every bound variable of the working copy
    pub async fn preview_values(&self) -> HashMap<String, String> {
        let mut values = HashMap::new();
        let Some(item) = self.working() else {
            return values;
        };
        let Ok(tab) = self.delivery.active_tab().await else {
            return values;
        };
        if self.delivery.check_access(&tab).is_err() {
            return values;
        }

        for (name, locator) in item.variables.iter().filter(|(_, l)| !l.is_empty()) {
            let message = Message::get_element_value(locator.clone());
            let value = match self.delivery.send_to_tab(&tab, message).await {
                Ok(response) => response
                    .into_value()
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| NO_VALUE.to_string()),
                Err(e) => {
                    log::debug!("Preview of '{}' failed: {}", name, e);
                    LOOKUP_ERROR.to_string()
                }
            };
            values.insert(name.clone(), value);
        }
        values
    }

    /// Render the working copy against the current page
    pub async fn preview(&self) -> Option<RenderedCopy> {
        let values = self.preview_values().await;
        let (item, page) = {
            let state = self.state();
            (state.working.clone()?, state.page.clone().unwrap_or_default())
        };
        Some(template::render(&item.template, &values, &page))
    }

    /// Apply a selection broadcast by a page agent
    pub async fn on_element_selected(&self, variable_name: &str, selector: &Locator) -> bool {
        let applied = {
            let mut state = self.state();
            state.picking = None;
            match state.working.as_mut() {
                Some(item) => {
                    item.bind_variable(variable_name, selector.clone());
                    true
                }
                None => false,
            }
        };
        if !applied {
            return false;
        }
        if let Err(e) = self.recovery.consume_selection().await {
            log::warn!("Could not clear consumed selection: {}", e);
        }
        log::info!("Bound '{}' to {}", variable_name, selector);
        true
    }

    pub fn on_picker_cancelled(&self) {
        self.state().picking = None;
    }
}

#[async_trait]
impl MessageHandler for ControlSurface {
    async fn handle(&self, message: Message) -> Option<Response> {
        match message {
            Message::ElementSelected {
                variable_name, selector, ..
            } => {
                let applied = self.on_element_selected(&variable_name, &selector).await;
                Some(if applied { Response::ok() } else { Response::rejected() })
            }
            Message::PickerCancelled => {
                self.on_picker_cancelled();
                Some(Response::ok())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SyringeConfig;
    use crate::dom::ElementNode;
    use crate::host::MemoryHost;
    use crate::protocol::Transport;
    use crate::store::{MemoryStore, StoreArea};
    use std::time::Duration;

    struct Fixture {
        surface: Arc<ControlSurface>,
        bus: Bus,
        host: Arc<MemoryHost>,
        catalog: Catalog,
        recovery: RecoveryStore,
    }

    fn create_fixture(url: &str) -> Fixture {
        let bus = Bus::new();
        let clock = Arc::new(ManualClock::new(50_000));
        let config = SyringeConfig::default().settle_delay(Duration::from_millis(1));
        let recovery = RecoveryStore::new(
            Arc::new(MemoryStore::new(StoreArea::Local)),
            clock.clone(),
            &config,
        );
        let host = Arc::new(MemoryHost::new(bus.clone(), recovery.clone(), config.clone()));
        host.open_tab(
            url,
            "Widget",
            ElementNode::new("body")
                .with_child(ElementNode::new("h1").with_id("title").with_text("Widget"))
                .with_child(ElementNode::new("p").with_class("empty")),
        );
        let catalog = Catalog::new(Arc::new(MemoryStore::new(StoreArea::Sync)), clock);
        let delivery = Delivery::new(Arc::new(bus.clone()), host.clone(), config);
        let surface = Arc::new(ControlSurface::new(catalog.clone(), recovery.clone(), delivery));
        Fixture {
            surface,
            bus,
            host,
            catalog,
            recovery,
        }
    }

    #[tokio::test]
    async fn test_create_edit_save() {
        let fixture = create_fixture("https://shop.test/w");
        fixture.surface.startup().await.unwrap();
        assert_eq!(fixture.surface.view(), View::List);
        assert_eq!(fixture.surface.page().unwrap().title, "Widget");

        fixture.surface.create_item();
        assert_eq!(fixture.surface.view(), View::Editor);
        fixture.surface.set_name("Deal");
        fixture.surface.set_template("{title}");
        fixture.surface.save().await.unwrap();

        assert_eq!(fixture.surface.view(), View::List);
        assert_eq!(fixture.catalog.load().await.unwrap()[0].name, "Deal");
        assert_eq!(fixture.surface.take_notice(), Some(Notice::success("Saved successfully")));

        assert!(fixture.surface.edit_item(0));
        assert_eq!(fixture.surface.edit_target(), EditTarget::Existing(0));
        fixture.surface.delete().await.unwrap();
        assert!(fixture.catalog.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_without_name_keeps_editor() {
        let fixture = create_fixture("https://shop.test/w");
        fixture.surface.create_item();

        assert!(fixture.surface.save().await.is_err());
        assert_eq!(fixture.surface.view(), View::Editor);
        assert_eq!(fixture.surface.take_notice(), Some(Notice::error("Please enter a name")));
        assert!(fixture.catalog.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_variable_saves_draft_and_starts_picker() {
        let fixture = create_fixture("https://shop.test/w");
        fixture.surface.create_item();
        fixture.surface.set_name("Deal");

        let name = fixture.surface.add_variable().await.unwrap();

        assert_eq!(name, "var1");
        assert_eq!(fixture.surface.picking().as_deref(), Some("var1"));
        let draft = fixture.recovery.draft().await.unwrap().unwrap();
        assert_eq!(draft.item.name, "Deal");
        assert_eq!(draft.target, EditTarget::New);

        let tab = fixture.host.active_tab_id().unwrap();
        assert!(fixture.host.agent(tab).unwrap().is_picking());
        assert!(fixture.surface.working().unwrap().variables["var1"].is_empty());
    }

    #[tokio::test]
    async fn test_restricted_page_refuses_pick() {
        let fixture = create_fixture("chrome://extensions");
        fixture.surface.create_item();

        let err = fixture.surface.add_variable().await.unwrap_err();
        assert!(matches!(err, SyringeError::RestrictedPage { .. }));
        assert_eq!(
            fixture.surface.take_notice(),
            Some(Notice::error("Cannot use picker on this page"))
        );
        assert_eq!(fixture.host.injection_count(), 0);
        assert!(fixture.recovery.draft().await.unwrap().is_none());
        assert!(fixture.surface.working().unwrap().variables.is_empty());
    }

    #[tokio::test]
    async fn test_blocked_injection_is_a_soft_failure() {
        let fixture = create_fixture("https://shop.test/w");
        fixture.host.block_injection(true);
        fixture.surface.create_item();

        assert!(fixture.surface.add_variable().await.is_err());
        assert_eq!(
            fixture.surface.take_notice(),
            Some(Notice::error("Could not start picker. Try refreshing the page."))
        );
        assert_eq!(fixture.surface.picking(), None);
        assert!(fixture.recovery.draft().await.unwrap().is_none());
        assert!(fixture.surface.working().unwrap().variables.is_empty());
    }

    #[tokio::test]
    async fn test_failed_repick_drops_saved_draft() {
        let fixture = create_fixture("https://shop.test/w");
        fixture.surface.create_item();
        fixture.surface.add_variable().await.unwrap();
        assert!(fixture.recovery.draft().await.unwrap().is_some());

        let tab = fixture.host.active_tab_id().unwrap();
        fixture.host.navigate(tab, "https://shop.test/x", "X", ElementNode::new("body"));
        fixture.host.block_injection(true);

        assert!(fixture.surface.repick("var1").await.is_err());
        assert!(fixture.recovery.draft().await.unwrap().is_none());
        assert_eq!(fixture.recovery.reconcile().await.unwrap(), Recovery::Fresh);
        assert!(fixture.surface.working().unwrap().variables.contains_key("var1"));
    }

    /// Page that confirms a selection before acknowledging the picker start
    struct EagerPage {
        bus: Bus,
    }

    #[async_trait]
    impl MessageHandler for EagerPage {
        async fn handle(&self, message: Message) -> Option<Response> {
            match message {
                Message::Ping => Some(Response::pong()),
                Message::StartPicker { variable_name } => {
                    let selected = Message::ElementSelected {
                        variable_name,
                        selector: Locator::from("#title"),
                        text: "Widget".to_string(),
                        tag_name: "h1".to_string(),
                    };
                    self.bus.send(Target::Runtime, selected).await.ok()?;
                    Some(Response::ok())
                }
                _ => None,
            }
        }
    }

    #[tokio::test]
    async fn test_selection_before_start_acknowledged_is_kept() {
        let fixture = create_fixture("https://shop.test/w");
        let tab = fixture.host.active_tab_id().unwrap();
        let _page = fixture.bus.listen_tab(tab, Arc::new(EagerPage { bus: fixture.bus.clone() }));
        let _surface = fixture.bus.listen_runtime(fixture.surface.clone());
        fixture.surface.create_item();

        let name = fixture.surface.add_variable().await.unwrap();

        assert_eq!(name, "var1");
        assert_eq!(fixture.surface.working().unwrap().variables["var1"].as_str(), "#title");
        assert_eq!(fixture.surface.picking(), None);
        assert_eq!(fixture.host.injection_count(), 0);
    }

    #[tokio::test]
    async fn test_live_selection_is_bound_and_consumed() {
        let fixture = create_fixture("https://shop.test/w");
        fixture.surface.create_item();
        fixture.surface.add_variable().await.unwrap();

        let response = fixture
            .surface
            .handle(Message::ElementSelected {
                variable_name: "var1".to_string(),
                selector: Locator::from("#title"),
                text: "Widget".to_string(),
                tag_name: "h1".to_string(),
            })
            .await;

        assert_eq!(response, Some(Response::ok()));
        assert_eq!(fixture.surface.working().unwrap().variables["var1"].as_str(), "#title");
        assert_eq!(fixture.surface.picking(), None);
        assert!(fixture.recovery.last_selection().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_preview_values() {
        let fixture = create_fixture("https://shop.test/w");
        fixture.surface.startup().await.unwrap();
        fixture.surface.create_item();
        fixture.surface.set_template("{CURRENT_PAGE_TITLE}: {title} / {blank}");
        fixture.surface.add_variable().await.unwrap();
        fixture.surface.rename_variable("var1", "title").unwrap();
        fixture.surface.on_element_selected("title", &Locator::from("#title")).await;
        fixture.surface.on_element_selected("blank", &Locator::from("p.empty")).await;

        let values = fixture.surface.preview_values().await;
        assert_eq!(values["title"], "Widget");
        assert_eq!(values["blank"], "[No Content]");

        let rendered = fixture.surface.preview().await.unwrap();
        assert_eq!(rendered.plain, "Widget: Widget / [No Content]");
    }

    #[tokio::test]
    async fn test_suggestions_include_bound_variables() {
        let fixture = create_fixture("https://shop.test/w");
        fixture.surface.create_item();
        fixture.surface.on_element_selected("price", &Locator::from(".p")).await;

        assert_eq!(fixture.surface.suggestions("pri"), vec!["price".to_string()]);
        assert_eq!(fixture.surface.suggestions("url"), vec!["CURRENT_PAGE_URL".to_string()]);
    }
}
