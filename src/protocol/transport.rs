//! Asynchronous request/response channel between execution contexts.
//!
//! Delivery is at-most-once and unordered across senders, and an endpoint can
//! disappear at any moment. A send therefore fails independently of what the
//! receiver would have done, and every caller must handle that branch.

use crate::error::TransportError;
use crate::protocol::message::{Message, Response};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

/// Browser tab identifier
pub type TabId = u32;

/// Where a message is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Every extension-level context (coordinator and any open control surface)
    Runtime,

    /// The page agent of one tab
    Tab(TabId),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Runtime => f.write_str("runtime"),
            Target::Tab(id) => write!(f, "tab {}", id),
        }
    }
}

/// Sends messages and awaits their replies
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, target: Target, message: Message) -> Result<Response, TransportError>;
}

/// Receives messages for one context.
///
/// Returning `None` means the message was not answered by this context.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: Message) -> Option<Response>;
}

type Envelope = (Message, oneshot::Sender<Option<Response>>);

#[derive(Default)]
struct Routes {
    next_id: u64,
    runtime: Vec<(u64, mpsc::UnboundedSender<Envelope>)>,
    tabs: HashMap<TabId, (u64, mpsc::UnboundedSender<Envelope>)>,
}

/// In-process message bus connecting every context of one browser profile
#[derive(Clone, Default)]
pub struct Bus {
    routes: Arc<Mutex<Routes>>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    fn routes(&self) -> MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a runtime listener. Every runtime message reaches every listener.
    pub fn listen_runtime(&self, handler: Arc<dyn MessageHandler>) -> Endpoint {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut routes = self.routes();
            routes.next_id += 1;
            let id = routes.next_id;
            routes.runtime.push((id, tx));
            id
        };
        self.spawn_endpoint(Target::Runtime, id, rx, handler)
    }

    /// Register the agent of a tab, replacing any previous one
    pub fn listen_tab(&self, tab: TabId, handler: Arc<dyn MessageHandler>) -> Endpoint {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut routes = self.routes();
            routes.next_id += 1;
            let id = routes.next_id;
            routes.tabs.insert(tab, (id, tx));
            id
        };
        self.spawn_endpoint(Target::Tab(tab), id, rx, handler)
    }

    fn spawn_endpoint(
        &self,
        target: Target,
        id: u64,
        rx: mpsc::UnboundedReceiver<Envelope>,
        handler: Arc<dyn MessageHandler>,
    ) -> Endpoint {
        log::debug!("Endpoint {} registered on {}", id, target);
        Endpoint {
            bus: self.clone(),
            target,
            id,
            task: tokio::spawn(serve(rx, handler)),
        }
    }

    fn unregister(&self, target: Target, id: u64) {
        let mut routes = self.routes();
        match target {
            Target::Runtime => routes.runtime.retain(|(existing, _)| *existing != id),
            Target::Tab(tab) => {
                if routes.tabs.get(&tab).is_some_and(|(existing, _)| *existing == id) {
                    routes.tabs.remove(&tab);
                }
            }
        }
    }

    /// Whether a tab currently has a live agent
    pub fn has_tab(&self, tab: TabId) -> bool {
        self.routes().tabs.contains_key(&tab)
    }

    pub fn runtime_listeners(&self) -> usize {
        self.routes().runtime.len()
    }

    async fn send_to_tab(&self, tab: TabId, message: Message) -> Result<Response, TransportError> {
        let target = Target::Tab(tab);
        let sender = self
            .routes()
            .tabs
            .get(&tab)
            .map(|(_, tx)| tx.clone())
            .ok_or(TransportError::NoReceiver(target))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send((message, reply_tx))
            .map_err(|_| TransportError::NoReceiver(target))?;

        match reply_rx.await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(TransportError::NoResponse(target)),
            Err(_) => Err(TransportError::Disconnected(target)),
        }
    }

    async fn broadcast(&self, message: Message) -> Result<Response, TransportError> {
        let target = Target::Runtime;
        let senders: Vec<_> = self.routes().runtime.iter().map(|(_, tx)| tx.clone()).collect();

        let mut replies = JoinSet::new();
        for sender in senders {
            let (reply_tx, reply_rx) = oneshot::channel();
            if sender.send((message.clone(), reply_tx)).is_ok() {
                replies.spawn(reply_rx);
            }
        }
        if replies.is_empty() {
            return Err(TransportError::NoReceiver(target));
        }

        // First listener to answer wins
        let mut unanswered = false;
        while let Some(joined) = replies.join_next().await {
            match joined {
                Ok(Ok(Some(response))) => return Ok(response),
                Ok(Ok(None)) => unanswered = true,
                _ => {}
            }
        }

        if unanswered {
            Err(TransportError::NoResponse(target))
        } else {
            Err(TransportError::Disconnected(target))
        }
    }
}

#[async_trait]
impl Transport for Bus {
    async fn send(&self, target: Target, message: Message) -> Result<Response, TransportError> {
        log::debug!("-> {} {}", target, message.kind());
        let result = match target {
            Target::Runtime => self.broadcast(message).await,
            Target::Tab(tab) => self.send_to_tab(tab, message).await,
        };
        if let Err(e) = &result {
            log::debug!("Delivery failed: {}", e);
        }
        result
    }
}

async fn serve(mut rx: mpsc::UnboundedReceiver<Envelope>, handler: Arc<dyn MessageHandler>) {
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            envelope = rx.recv() => match envelope {
                Some((message, reply)) => {
                    let handler = handler.clone();
                    in_flight.spawn(async move {
                        let response = handler.handle(message).await;
                        let _ = reply.send(response);
                    });
                }
                None => break,
            },
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }
    while in_flight.join_next().await.is_some() {}
}

/// A registered context. Dropping it destroys the context: its queued and
/// in-flight messages fail with [`TransportError::Disconnected`].
pub struct Endpoint {
    bus: Bus,
    target: Target,
    id: u64,
    task: JoinHandle<()>,
}

impl Endpoint {
    pub fn target(&self) -> Target {
        self.target
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("target", &self.target)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.bus.unregister(self.target, self.id);
        self.task.abort();
        log::debug!("Endpoint {} on {} destroyed", self.id, self.target);
    }
}
