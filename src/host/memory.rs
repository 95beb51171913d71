use crate::agent::PageAgent;
use crate::config::SyringeConfig;
use crate::dom::{DomTree, ElementNode};
use crate::error::{Result, SyringeError};
use crate::host::{PageHost, TabInfo};
use crate::protocol::{Bus, Endpoint, PageInfo, TabId};
use crate::store::RecoveryStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

struct TabRecord {
    info: TabInfo,
    markup: ElementNode,
    agent: Option<(Arc<PageAgent>, Endpoint)>,
}

#[derive(Default)]
struct Tabs {
    next_id: TabId,
    active: Option<TabId>,
    records: BTreeMap<TabId, TabRecord>,
}

/// A browser window simulated in memory.
///
/// Each tab holds page markup; injecting the agent loads that markup into a fresh
/// document and registers the agent on the bus. Navigating or closing a tab
/// destroys its agent, just as a real page load would.
pub struct MemoryHost {
    bus: Bus,
    recovery: RecoveryStore,
    config: SyringeConfig,
    tabs: Mutex<Tabs>,
    injections: AtomicUsize,
    blocked: AtomicBool,
}

impl MemoryHost {
    pub fn new(bus: Bus, recovery: RecoveryStore, config: SyringeConfig) -> Self {
        Self {
            bus,
            recovery,
            config,
            tabs: Mutex::new(Tabs::default()),
            injections: AtomicUsize::new(0),
            blocked: AtomicBool::new(false),
        }
    }

    fn tabs(&self) -> MutexGuard<'_, Tabs> {
        self.tabs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open a tab and focus it
    pub fn open_tab(&self, url: &str, title: &str, markup: ElementNode) -> TabId {
        let mut tabs = self.tabs();
        tabs.next_id += 1;
        let id = tabs.next_id;
        tabs.records.insert(
            id,
            TabRecord {
                info: TabInfo::new(id, url).with_title(title),
                markup,
                agent: None,
            },
        );
        tabs.active = Some(id);
        id
    }

    /// Load a new page into a tab, destroying its agent
    pub fn navigate(&self, tab: TabId, url: &str, title: &str, markup: ElementNode) -> bool {
        let mut tabs = self.tabs();
        let Some(record) = tabs.records.get_mut(&tab) else {
            return false;
        };
        record.info = TabInfo::new(tab, url).with_title(title);
        record.markup = markup;
        record.agent = None;
        log::debug!("Tab {} navigated to {}", tab, url);
        true
    }

    pub fn close_tab(&self, tab: TabId) -> bool {
        let mut tabs = self.tabs();
        if tabs.active == Some(tab) {
            tabs.active = None;
        }
        tabs.records.remove(&tab).is_some()
    }

    pub fn activate(&self, tab: TabId) -> bool {
        let mut tabs = self.tabs();
        if tabs.records.contains_key(&tab) {
            tabs.active = Some(tab);
            true
        } else {
            false
        }
    }

    pub fn active_tab_id(&self) -> Option<TabId> {
        self.tabs().active
    }

    /// The live agent of a tab, if one has been injected
    pub fn agent(&self, tab: TabId) -> Option<Arc<PageAgent>> {
        self.tabs()
            .records
            .get(&tab)
            .and_then(|r| r.agent.as_ref())
            .map(|(agent, _)| agent.clone())
    }

    /// Number of injection attempts so far
    pub fn injection_count(&self) -> usize {
        self.injections.load(Ordering::SeqCst)
    }

    /// Make every further injection fail, as a hostile page policy would
    pub fn block_injection(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageHost for MemoryHost {
    async fn active_tab(&self) -> Option<TabInfo> {
        let tabs = self.tabs();
        tabs.active
            .and_then(|id| tabs.records.get(&id))
            .map(|r| r.info.clone())
    }

    async fn inject_agent(&self, tab: TabId) -> Result<()> {
        self.injections.fetch_add(1, Ordering::SeqCst);
        let mut tabs = self.tabs();
        let record = tabs
            .records
            .get_mut(&tab)
            .ok_or_else(|| SyringeError::InjectionFailed(format!("No tab with id {}", tab)))?;

        if self.config.is_restricted(record.info.url.as_deref()) {
            return Err(SyringeError::InjectionFailed(format!(
                "Cannot access contents of {}",
                record.info.url.as_deref().unwrap_or("an unknown page")
            )));
        }
        if self.blocked.load(Ordering::SeqCst) {
            return Err(SyringeError::InjectionFailed(format!("Script blocked in tab {}", tab)));
        }
        if record.agent.is_some() {
            log::debug!("Tab {} already has an agent", tab);
            return Ok(());
        }

        let info = PageInfo {
            url: record.info.url.clone().unwrap_or_default(),
            title: record.info.title.clone().unwrap_or_default(),
        };
        let agent = Arc::new(PageAgent::new(
            tab,
            DomTree::new(record.markup.clone()),
            info,
            Arc::new(self.bus.clone()),
            self.recovery.clone(),
            &self.config,
        ));
        let endpoint = self.bus.listen_tab(tab, agent.clone());
        record.agent = Some((agent, endpoint));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::protocol::{Message, Target, Transport};
    use crate::store::{MemoryStore, StoreArea};

    fn create_host() -> (MemoryHost, Bus) {
        let bus = Bus::new();
        let config = SyringeConfig::default();
        let recovery = RecoveryStore::new(
            Arc::new(MemoryStore::new(StoreArea::Local)),
            Arc::new(SystemClock),
            &config,
        );
        (MemoryHost::new(bus.clone(), recovery, config), bus)
    }

    fn page() -> ElementNode {
        ElementNode::new("body").with_child(ElementNode::new("p").with_id("x").with_text("hi"))
    }

    #[tokio::test]
    async fn test_injection_registers_agent() {
        let (host, bus) = create_host();
        let tab = host.open_tab("https://a.test/", "A", page());

        assert!(bus.send(Target::Tab(tab), Message::Ping).await.is_err());
        host.inject_agent(tab).await.unwrap();
        assert!(bus.send(Target::Tab(tab), Message::Ping).await.is_ok());
        assert_eq!(host.active_tab().await.unwrap().title.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_navigation_destroys_agent() {
        let (host, bus) = create_host();
        let tab = host.open_tab("https://a.test/", "A", page());
        host.inject_agent(tab).await.unwrap();

        host.navigate(tab, "https://b.test/", "B", page());
        assert!(host.agent(tab).is_none());
        assert!(!bus.has_tab(tab));
    }

    #[tokio::test]
    async fn test_restricted_and_blocked_injection_fails() {
        let (host, _) = create_host();
        let settings = host.open_tab("chrome://settings", "Settings", page());
        assert!(host.inject_agent(settings).await.is_err());

        let normal = host.open_tab("https://a.test/", "A", page());
        host.block_injection(true);
        assert!(host.inject_agent(normal).await.is_err());
        assert_eq!(host.injection_count(), 2);
    }
}
