//! The page agent: one per tab, owning that page's document and picker.
//!
//! The agent answers page messages and turns user interaction into picker
//! transitions. Confirmed and cancelled picks are recorded in the recovery store
//! and broadcast to the runtime; nobody listening is not an error.

use crate::config::SyringeConfig;
use crate::dom::{DomTree, element_value};
use crate::error::Result;
use crate::picker::{EventOutcome, PageEvent, PickerMachine, Selection, Transition};
use crate::protocol::{Message, MessageHandler, PageInfo, Response, TabId, Target, Transport};
use crate::store::RecoveryStore;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

struct PageState {
    tree: DomTree,
    picker: PickerMachine,
    info: PageInfo,
}

/// Agent injected into one page
pub struct PageAgent {
    tab: TabId,
    state: Mutex<PageState>,
    transport: Arc<dyn Transport>,
    recovery: RecoveryStore,
    text_limit: usize,
}

impl PageAgent {
    pub fn new(
        tab: TabId,
        tree: DomTree,
        info: PageInfo,
        transport: Arc<dyn Transport>,
        recovery: RecoveryStore,
        config: &SyringeConfig,
    ) -> Self {
        Self {
            tab,
            state: Mutex::new(PageState {
                tree,
                picker: PickerMachine::new(config),
                info,
            }),
            transport,
            recovery,
            text_limit: config.text_limit,
        }
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    // The lock is never held across an await
    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inspect the page's document
    pub fn with_tree<R>(&self, f: impl FnOnce(&DomTree) -> R) -> R {
        f(&self.state().tree)
    }

    /// Change the page's document, as the page's own scripts would
    pub fn with_tree_mut<R>(&self, f: impl FnOnce(&mut DomTree) -> R) -> R {
        f(&mut self.state().tree)
    }

    pub fn page_info(&self) -> PageInfo {
        self.state().info.clone()
    }

    pub fn is_picking(&self) -> bool {
        self.state().picker.is_active()
    }

    /// Variable the active picker targets
    pub fn picking_variable(&self) -> Option<String> {
        self.state().picker.variable_name().map(str::to_string)
    }

    /// Resolve a locator in this page and read its text
    pub fn element_value(&self, selector: &crate::dom::Locator) -> String {
        let state = self.state();
        element_value(&state.tree, selector, self.text_limit)
    }

    /// Start or retarget the picker and mirror it in the pending record
    pub async fn start_picker(&self, variable_name: &str) {
        {
            let mut state = self.state();
            let PageState { tree, picker, .. } = &mut *state;
            picker.start(tree, variable_name);
        }
        if let Err(e) = self.recovery.write_pending(variable_name).await {
            log::warn!("Could not record pending picker for '{}': {}", variable_name, e);
        }
    }

    /// Stop picking without a selection; a no-op when idle
    pub async fn stop_picker(&self) {
        let cancelled = {
            let mut state = self.state();
            let PageState { tree, picker, .. } = &mut *state;
            picker.cancel(tree)
        };
        if cancelled {
            self.publish_cancelled().await;
        }
    }

    /// Confirm the highlighted element
    pub async fn confirm(&self) -> Result<Selection> {
        let selection = {
            let mut state = self.state();
            let PageState { tree, picker, .. } = &mut *state;
            picker.confirm(tree)?
        };
        self.publish_selection(&selection).await;
        Ok(selection)
    }

    /// Deliver a user interaction to the page
    pub async fn dispatch_event(&self, event: PageEvent) -> EventOutcome {
        let (outcome, transition) = {
            let mut state = self.state();
            let PageState { tree, picker, .. } = &mut *state;
            picker.handle_event(tree, &event)
        };
        match transition {
            Some(Transition::Confirmed(selection)) => self.publish_selection(&selection).await,
            Some(Transition::Cancelled) => self.publish_cancelled().await,
            None => {}
        }
        outcome
    }

    async fn publish_selection(&self, selection: &Selection) {
        log::info!(
            "Selected {} for '{}' in tab {}",
            selection.locator,
            selection.variable_name,
            self.tab
        );
        if let Err(e) = self.recovery.write_last_selection(selection).await {
            log::warn!("Could not record selection: {}", e);
        }
        let message = Message::ElementSelected {
            variable_name: selection.variable_name.clone(),
            selector: selection.locator.clone(),
            text: selection.text.clone(),
            tag_name: selection.tag_name.clone(),
        };
        self.broadcast(message).await;
    }

    async fn publish_cancelled(&self) {
        if let Err(e) = self.recovery.clear_pending().await {
            log::warn!("Could not clear pending picker: {}", e);
        }
        self.broadcast(Message::PickerCancelled).await;
    }

    async fn broadcast(&self, message: Message) {
        let kind = message.kind();
        if let Err(e) = self.transport.send(Target::Runtime, message).await {
            log::warn!("{} from tab {} was not delivered: {}", kind, self.tab, e);
        }
    }
}

#[async_trait]
impl MessageHandler for PageAgent {
    async fn handle(&self, message: Message) -> Option<Response> {
        log::debug!("tab {} <- {}", self.tab, message.kind());
        match message {
            Message::Ping => Some(Response::pong()),
            Message::StartPicker { variable_name } => {
                self.start_picker(&variable_name).await;
                Some(Response::ok())
            }
            Message::StopPicker => {
                self.stop_picker().await;
                Some(Response::ok())
            }
            Message::ConfirmSelection => match self.confirm().await {
                Ok(_) => Some(Response::ok()),
                Err(e) => {
                    log::debug!("Confirm rejected in tab {}: {}", self.tab, e);
                    Some(Response::rejected())
                }
            },
            Message::GetElementValue { selector } => Some(Response::value(self.element_value(&selector))),
            Message::GetPageInfo => Some(Response::PageInfo(self.page_info())),
            Message::ElementSelected { .. } | Message::PickerCancelled | Message::RebuildMenu => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::dom::{ElementNode, INVALID_SELECTOR, Locator};
    use crate::picker::KeyPress;
    use crate::protocol::Bus;
    use crate::store::{MemoryStore, StoreArea};

    fn create_agent() -> (Arc<PageAgent>, RecoveryStore) {
        let config = SyringeConfig::default();
        let store = Arc::new(MemoryStore::new(StoreArea::Local));
        let recovery = RecoveryStore::new(store, Arc::new(ManualClock::new(0)), &config);
        let tree = DomTree::new(
            ElementNode::new("body")
                .with_child(ElementNode::new("h1").with_id("title").with_text("Widget"))
                .with_child(ElementNode::new("input").with_attribute("placeholder", "Qty")),
        );
        let info = PageInfo {
            url: "https://shop.test/w".to_string(),
            title: "Widget".to_string(),
        };
        let agent = PageAgent::new(1, tree, info, Arc::new(Bus::new()), recovery.clone(), &config);
        (Arc::new(agent), recovery)
    }

    #[tokio::test]
    async fn test_answers_page_queries() {
        let (agent, _) = create_agent();

        assert_eq!(agent.handle(Message::Ping).await, Some(Response::pong()));
        assert_eq!(
            agent.handle(Message::get_element_value("#title")).await,
            Some(Response::value("Widget"))
        );
        assert_eq!(
            agent.handle(Message::get_element_value("input")).await,
            Some(Response::value("[Placeholder: Qty]"))
        );
        assert_eq!(
            agent.handle(Message::get_element_value("#gone")).await,
            Some(Response::value(INVALID_SELECTOR))
        );
        let info = agent.handle(Message::GetPageInfo).await.unwrap().into_page_info().unwrap();
        assert_eq!(info.title, "Widget");
        assert_eq!(agent.handle(Message::RebuildMenu).await, None);
    }

    #[tokio::test]
    async fn test_confirm_without_highlight_is_rejected() {
        let (agent, recovery) = create_agent();
        agent.handle(Message::start_picker("price")).await;

        assert_eq!(agent.handle(Message::ConfirmSelection).await, Some(Response::rejected()));
        assert!(recovery.last_selection().await.unwrap().is_none());
        assert!(agent.is_picking());
    }

    #[tokio::test]
    async fn test_pick_records_selection() {
        let (agent, recovery) = create_agent();
        agent.handle(Message::start_picker("title")).await;
        assert!(recovery.pending().await.unwrap().is_some());

        let title = agent.with_tree(|tree| tree.get_element_by_id("title").unwrap());
        agent.dispatch_event(PageEvent::PointerMove { target: title }).await;
        let outcome = agent.dispatch_event(PageEvent::KeyDown(KeyPress::confirm_chord())).await;

        assert!(outcome.default_prevented);
        let record = recovery.last_selection().await.unwrap().unwrap();
        assert_eq!(record.selector, Locator::from("#title"));
        assert_eq!(record.tag_name, "h1");
        assert!(recovery.pending().await.unwrap().is_none());
        assert!(!agent.is_picking());
    }

    #[tokio::test]
    async fn test_stop_clears_pending() {
        let (agent, recovery) = create_agent();
        agent.handle(Message::start_picker("a")).await;
        agent.handle(Message::start_picker("b")).await;
        assert_eq!(agent.picking_variable().as_deref(), Some("b"));
        assert_eq!(
            recovery.pending().await.unwrap().unwrap().variable_name.as_deref(),
            Some("b")
        );

        agent.handle(Message::StopPicker).await;
        assert!(recovery.pending().await.unwrap().is_none());
        assert!(!agent.is_picking());
    }
}
