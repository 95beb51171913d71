use crate::dom::NodeId;
use std::collections::BTreeSet;

/// Kinds of page events the picker listens for in the capture phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    PointerMove,
    Click,
    KeyDown,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::PointerMove, EventKind::Click, EventKind::KeyDown];
}

/// A user interaction delivered to the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    PointerMove { target: NodeId },
    Click { target: NodeId },
    KeyDown(KeyPress),
}

impl PageEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PageEvent::PointerMove { .. } => EventKind::PointerMove,
            PageEvent::Click { .. } => EventKind::Click,
            PageEvent::KeyDown(_) => EventKind::KeyDown,
        }
    }
}

/// A key press with its modifier state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyPress {
    pub key: String,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl KeyPress {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn escape() -> Self {
        Self::new("Escape")
    }

    /// The confirm chord: Ctrl+Shift+E, or Cmd+Shift+E on a Mac
    pub fn confirm_chord() -> Self {
        Self::new("E").with_ctrl().with_shift()
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn is_escape(&self) -> bool {
        self.key == "Escape"
    }

    pub fn is_confirm(&self) -> bool {
        (self.ctrl || self.meta) && self.shift && self.key.eq_ignore_ascii_case("e")
    }
}

/// What a listener did to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventOutcome {
    pub default_prevented: bool,
    pub propagation_stopped: bool,
    pub immediate_propagation_stopped: bool,
}

impl EventOutcome {
    /// The page sees the event as usual
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Default action and propagation are cancelled
    pub fn consumed() -> Self {
        Self {
            default_prevented: true,
            propagation_stopped: true,
            immediate_propagation_stopped: false,
        }
    }

    /// Nothing on the page, not even same-phase siblings, sees the event
    pub fn suppressed() -> Self {
        Self {
            default_prevented: true,
            propagation_stopped: true,
            immediate_propagation_stopped: true,
        }
    }

    pub fn reaches_page(&self) -> bool {
        !self.propagation_stopped
    }
}

/// Capture-phase listeners currently registered on the document.
///
/// Attaching an already attached kind is a no-op, which is what keeps a retargeted
/// picker from stacking handlers.
#[derive(Debug, Default)]
pub struct CaptureListeners {
    attached: BTreeSet<EventKind>,
    registrations: usize,
}

impl CaptureListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; returns false if one was already registered
    pub fn attach(&mut self, kind: EventKind) -> bool {
        let added = self.attached.insert(kind);
        if added {
            self.registrations += 1;
        }
        added
    }

    pub fn detach(&mut self, kind: EventKind) -> bool {
        self.attached.remove(&kind)
    }

    pub fn detach_all(&mut self) {
        self.attached.clear();
    }

    pub fn is_attached(&self, kind: EventKind) -> bool {
        self.attached.contains(&kind)
    }

    pub fn len(&self) -> usize {
        self.attached.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }

    /// Total successful registrations over the lifetime of the page
    pub fn registrations(&self) -> usize {
        self.registrations
    }
}
