use crate::agent::PageAgent;
use crate::browser::session::BrowserSession;
use crate::config::SyringeConfig;
use crate::dom::DomTree;
use crate::error::{Result, SyringeError};
use crate::host::{PageHost, TabInfo};
use crate::protocol::{Bus, Endpoint, TabId};
use crate::store::RecoveryStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Stable numbering of DevTools targets.
///
/// A target keeps its id for the life of the host, so closing one tab never shifts
/// the ids of the others. Ids start at 1 and are not reused.
#[derive(Debug, Default)]
pub struct TabIds {
    next: TabId,
    by_target: HashMap<String, TabId>,
}

impl TabIds {
    /// Id of a target, assigning a new one on first sight
    pub fn assign(&mut self, target_id: &str) -> TabId {
        if let Some(&id) = self.by_target.get(target_id) {
            return id;
        }
        self.next += 1;
        self.by_target.insert(target_id.to_string(), self.next);
        self.next
    }

    pub fn target(&self, tab: TabId) -> Option<&str> {
        self.by_target
            .iter()
            .find(|&(_, &id)| id == tab)
            .map(|(target, _)| target.as_str())
    }
}

/// Page host backed by a real Chrome instance.
///
/// Injecting the agent snapshots the tab's document once; later page changes are
/// not seen until the agent is injected again after [`ChromeHost::reload`].
pub struct ChromeHost {
    session: Arc<BrowserSession>,
    bus: Bus,
    recovery: RecoveryStore,
    config: SyringeConfig,
    agents: Mutex<BTreeMap<TabId, (Arc<PageAgent>, Endpoint)>>,
    ids: Mutex<TabIds>,
}

impl ChromeHost {
    pub fn new(session: Arc<BrowserSession>, bus: Bus, recovery: RecoveryStore, config: SyringeConfig) -> Self {
        Self {
            session,
            bus,
            recovery,
            config,
            agents: Mutex::new(BTreeMap::new()),
            ids: Mutex::new(TabIds::default()),
        }
    }

    pub fn session(&self) -> &Arc<BrowserSession> {
        &self.session
    }

    fn agents(&self) -> MutexGuard<'_, BTreeMap<TabId, (Arc<PageAgent>, Endpoint)>> {
        self.agents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ids(&self) -> MutexGuard<'_, TabIds> {
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The injected agent of a tab
    pub fn agent(&self, tab: TabId) -> Option<Arc<PageAgent>> {
        self.agents().get(&tab).map(|(agent, _)| agent.clone())
    }

    /// Drop a tab's agent so the next message re-injects against the live page
    pub fn reload(&self, tab: TabId) -> bool {
        self.agents().remove(&tab).is_some()
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&BrowserSession) -> Result<T> + Send + 'static,
    {
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || f(&session))
            .await
            .map_err(|e| SyringeError::TabOperationFailed(format!("Browser task failed: {}", e)))?
    }
}

#[async_trait]
impl PageHost for ChromeHost {
    async fn active_tab(&self) -> Option<TabInfo> {
        let found = self
            .blocking(|session| {
                let tab = session.get_active_tab()?;
                let title = tab.get_title().ok();
                Ok((tab.get_target_id().to_string(), tab.get_url(), title))
            })
            .await;

        match found {
            Ok((target_id, url, title)) => Some(TabInfo {
                id: self.ids().assign(&target_id),
                url: Some(url).filter(|u| !u.is_empty()),
                title,
            }),
            Err(e) => {
                log::warn!("Could not determine the active tab: {}", e);
                None
            }
        }
    }

    async fn inject_agent(&self, tab: TabId) -> Result<()> {
        if self.agents().contains_key(&tab) {
            log::debug!("Tab {} already has an agent", tab);
            return Ok(());
        }

        let target_id = self
            .ids()
            .target(tab)
            .map(str::to_string)
            .ok_or_else(|| SyringeError::InjectionFailed(format!("No tab with id {}", tab)))?;
        let (tree, info) = self
            .blocking(move |session| {
                let chrome_tab = session.tab_by_target(&target_id)?;
                let info = BrowserSession::page_info(&chrome_tab)?;
                let tree = DomTree::from_tab(&chrome_tab)?;
                Ok((tree, info))
            })
            .await
            .map_err(|e| SyringeError::InjectionFailed(e.to_string()))?;

        if self.config.is_restricted(Some(&info.url)) {
            return Err(SyringeError::InjectionFailed(format!("Cannot access contents of {}", info.url)));
        }

        log::debug!("Injected agent into tab {} ({} elements)", tab, tree.count_elements());
        let agent = Arc::new(PageAgent::new(
            tab,
            tree,
            info,
            Arc::new(self.bus.clone()),
            self.recovery.clone(),
            &self.config,
        ));
        let endpoint = self.bus.listen_tab(tab, agent.clone());
        self.agents().insert(tab, (agent, endpoint));
        Ok(())
    }
}
