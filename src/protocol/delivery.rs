use crate::config::SyringeConfig;
use crate::error::{Result, SyringeError};
use crate::host::{PageHost, TabInfo};
use crate::protocol::message::{Message, Response};
use crate::protocol::transport::{Target, Transport};
use std::sync::Arc;

/// Delivery of messages to page agents, injecting the agent when it is missing.
///
/// A page send probes the agent first. If the probe fails the agent is injected,
/// the page is given the settle delay, and the message is sent exactly once more.
/// Restricted pages are refused before any injection is attempted.
#[derive(Clone)]
pub struct Delivery {
    transport: Arc<dyn Transport>,
    host: Arc<dyn PageHost>,
    config: SyringeConfig,
}

impl Delivery {
    pub fn new(transport: Arc<dyn Transport>, host: Arc<dyn PageHost>, config: SyringeConfig) -> Self {
        Self {
            transport,
            host,
            config,
        }
    }

    pub fn config(&self) -> &SyringeConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<dyn PageHost> {
        &self.host
    }

    /// The active tab, or [`SyringeError::NoActiveTab`]
    pub async fn active_tab(&self) -> Result<TabInfo> {
        self.host.active_tab().await.ok_or(SyringeError::NoActiveTab)
    }

    /// Refuse tabs the agent may never run in
    pub fn check_access(&self, tab: &TabInfo) -> Result<()> {
        if self.config.is_restricted(tab.url.as_deref()) {
            return Err(SyringeError::RestrictedPage {
                url: tab.url.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Make sure a live agent answers in the tab, injecting one if needed
    pub async fn ensure_agent(&self, tab: &TabInfo) -> Result<()> {
        self.check_access(tab)?;

        match self.transport.send(Target::Tab(tab.id), Message::Ping).await {
            Ok(_) => return Ok(()),
            Err(e) => log::debug!("No agent in tab {}: {}", tab.id, e),
        }

        self.host.inject_agent(tab.id).await?;
        log::info!("Injected page agent into tab {}", tab.id);
        tokio::time::sleep(self.config.settle_delay).await;
        Ok(())
    }

    /// Send a message to a tab's agent, injecting it first when it does not answer.
    ///
    /// Nothing is retried more than once: a failure after injection is returned.
    pub async fn send_to_page(&self, tab: &TabInfo, message: Message) -> Result<Response> {
        self.ensure_agent(tab).await?;
        Ok(self.transport.send(Target::Tab(tab.id), message).await?)
    }

    /// Send and treat a delivery failure as a no-op
    pub async fn send_best_effort(&self, target: Target, message: Message) -> Option<Response> {
        let kind = message.kind();
        match self.transport.send(target, message).await {
            Ok(response) => Some(response),
            Err(e) => {
                log::warn!("{} to {} was not delivered: {}", kind, target, e);
                None
            }
        }
    }

    /// Send to a tab that is expected to already have an agent
    pub async fn send_to_tab(&self, tab: &TabInfo, message: Message) -> Result<Response> {
        self.check_access(tab)?;
        Ok(self.transport.send(Target::Tab(tab.id), message).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::protocol::transport::{Bus, Endpoint, MessageHandler, TabId};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Agent;

    #[async_trait]
    impl MessageHandler for Agent {
        async fn handle(&self, message: Message) -> Option<Response> {
            match message {
                Message::Ping => Some(Response::pong()),
                _ => Some(Response::ok()),
            }
        }
    }

    /// Host whose injection registers a fresh agent on the bus
    struct FakeHost {
        bus: Bus,
        tab: TabInfo,
        injections: AtomicUsize,
        working: bool,
        agents: Mutex<Vec<Endpoint>>,
    }

    impl FakeHost {
        fn new(bus: &Bus, url: &str, working: bool) -> Arc<Self> {
            Arc::new(Self {
                bus: bus.clone(),
                tab: TabInfo::new(1, url),
                injections: AtomicUsize::new(0),
                working,
                agents: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PageHost for FakeHost {
        async fn active_tab(&self) -> Option<TabInfo> {
            Some(self.tab.clone())
        }

        async fn inject_agent(&self, tab: TabId) -> Result<()> {
            self.injections.fetch_add(1, Ordering::SeqCst);
            if self.working {
                let endpoint = self.bus.listen_tab(tab, Arc::new(Agent));
                self.agents.lock().unwrap().push(endpoint);
            }
            Ok(())
        }
    }

    fn delivery(bus: &Bus, host: Arc<FakeHost>) -> Delivery {
        let config = SyringeConfig::default().settle_delay(Duration::from_millis(1));
        Delivery::new(Arc::new(bus.clone()), host, config)
    }

    #[tokio::test]
    async fn test_injects_once_when_agent_missing() {
        let bus = Bus::new();
        let host = FakeHost::new(&bus, "https://shop.test/", true);
        let delivery = delivery(&bus, host.clone());
        let tab = delivery.active_tab().await.unwrap();

        let response = delivery.send_to_page(&tab, Message::StopPicker).await.unwrap();
        assert!(response.is_success());
        assert_eq!(host.injections.load(Ordering::SeqCst), 1);

        delivery.send_to_page(&tab, Message::StopPicker).await.unwrap();
        assert_eq!(host.injections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_retry_then_failure() {
        let bus = Bus::new();
        let host = FakeHost::new(&bus, "https://shop.test/", false);
        let delivery = delivery(&bus, host.clone());
        let tab = delivery.active_tab().await.unwrap();

        let err = delivery.send_to_page(&tab, Message::StopPicker).await.unwrap_err();
        assert!(matches!(err, SyringeError::Transport(TransportError::NoReceiver(_))));
        assert_eq!(host.injections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restricted_page_is_refused_before_injection() {
        let bus = Bus::new();
        let host = FakeHost::new(&bus, "chrome://settings", true);
        let delivery = delivery(&bus, host.clone());
        let tab = delivery.active_tab().await.unwrap();

        let err = delivery.send_to_page(&tab, Message::start_picker("x")).await.unwrap_err();
        assert!(matches!(err, SyringeError::RestrictedPage { .. }));
        assert_eq!(err.user_message(), "Cannot use picker on this page");
        assert_eq!(host.injections.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let bus = Bus::new();
        let host = FakeHost::new(&bus, "https://shop.test/", true);
        let delivery = delivery(&bus, host);

        assert_eq!(delivery.send_best_effort(Target::Runtime, Message::RebuildMenu).await, None);
    }
}
