//! The picker lifecycle for one page.
//!
//! ```text
//! Idle --start--> Active --start--> Active (retargeted, nothing re-attached)
//!                   |
//!                   +--confirm (something highlighted)--> Idle  [Selection]
//!                   +--Escape / cancel / stop-----------> Idle  [Cancelled]
//! ```
//!
//! The machine is synchronous and owns no I/O. Reporting a selection or cancellation
//! to the rest of the system is the caller's job.

use crate::config::{Platform, SyringeConfig};
use crate::dom::{DomTree, Locator, NodeId, extract_text, synthesize};
use crate::error::{Result, SyringeError};
use crate::picker::events::{CaptureListeners, EventKind, EventOutcome, PageEvent};
use crate::picker::highlight::StyleLedger;
use crate::picker::overlay::Overlay;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A confirmed pick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub variable_name: String,
    pub locator: Locator,
    pub text: String,
    pub tag_name: String,
}

#[derive(Debug)]
struct Session {
    variable_name: String,
    highlighted: Option<NodeId>,
    overlay: Option<Overlay>,
}

#[derive(Debug, Default)]
enum PickerState {
    #[default]
    Idle,
    Active(Session),
}

/// Result of asking the picker to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Already active; only the target variable changed
    Retargeted { previous: String },
}

/// A terminal transition caused by a page event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Confirmed(Selection),
    Cancelled,
}

/// Picker state machine
#[derive(Debug)]
pub struct PickerMachine {
    state: PickerState,
    ledger: StyleLedger,
    listeners: CaptureListeners,
    platform: Platform,
    text_limit: usize,
}

impl PickerMachine {
    pub fn new(config: &SyringeConfig) -> Self {
        Self {
            state: PickerState::Idle,
            ledger: StyleLedger::new(),
            listeners: CaptureListeners::new(),
            platform: config.platform,
            text_limit: config.text_limit,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, PickerState::Active(_))
    }

    /// Variable the active picker is targeting
    pub fn variable_name(&self) -> Option<&str> {
        match &self.state {
            PickerState::Active(session) => Some(&session.variable_name),
            PickerState::Idle => None,
        }
    }

    pub fn highlighted(&self) -> Option<NodeId> {
        match &self.state {
            PickerState::Active(session) => session.highlighted,
            PickerState::Idle => None,
        }
    }

    pub fn listeners(&self) -> &CaptureListeners {
        &self.listeners
    }

    pub fn ledger(&self) -> &StyleLedger {
        &self.ledger
    }

    /// Start picking for a variable, or retarget an active picker
    pub fn start(&mut self, tree: &mut DomTree, variable_name: &str) -> StartOutcome {
        if let PickerState::Active(session) = &mut self.state {
            let previous = std::mem::replace(&mut session.variable_name, variable_name.to_string());
            if let Some(overlay) = &session.overlay {
                overlay.set_variable_name(tree, variable_name);
            }
            log::debug!("Picker retargeted from '{}' to '{}'", previous, variable_name);
            return StartOutcome::Retargeted { previous };
        }

        let overlay = Overlay::mount(tree, variable_name, self.platform);
        if overlay.is_none() {
            log::warn!("Could not mount picker overlay for '{}'", variable_name);
        }
        for kind in EventKind::ALL {
            self.listeners.attach(kind);
        }

        self.state = PickerState::Active(Session {
            variable_name: variable_name.to_string(),
            highlighted: None,
            overlay,
        });
        log::debug!("Picker started for '{}'", variable_name);
        StartOutcome::Started
    }

    /// Feed a page event through the capture-phase listeners.
    ///
    /// Pointer moves over the page move the highlight; clicks outside the overlay are
    /// swallowed entirely; Escape cancels and the confirm chord confirms.
    pub fn handle_event(&mut self, tree: &mut DomTree, event: &PageEvent) -> (EventOutcome, Option<Transition>) {
        if !self.listeners.is_attached(event.kind()) {
            return (EventOutcome::passthrough(), None);
        }
        let PickerState::Active(session) = &mut self.state else {
            return (EventOutcome::passthrough(), None);
        };
        let in_overlay = |node: NodeId| session.overlay.is_some_and(|o| o.contains(tree, node));

        match event {
            PageEvent::PointerMove { target } => {
                let target = *target;
                if in_overlay(target) || !tree.is_attached(target) || session.highlighted == Some(target) {
                    return (EventOutcome::passthrough(), None);
                }
                if let Some(previous) = session.highlighted.take() {
                    self.ledger.restore(tree, previous);
                }
                if self.ledger.apply(tree, target) {
                    session.highlighted = Some(target);
                }
                (EventOutcome::passthrough(), None)
            }
            PageEvent::Click { target } => {
                if in_overlay(*target) {
                    (EventOutcome::passthrough(), None)
                } else {
                    (EventOutcome::suppressed(), None)
                }
            }
            PageEvent::KeyDown(key) if key.is_escape() => {
                self.teardown(tree);
                (EventOutcome::consumed(), Some(Transition::Cancelled))
            }
            PageEvent::KeyDown(key) if key.is_confirm() => match self.confirm(tree) {
                Ok(selection) => (EventOutcome::consumed(), Some(Transition::Confirmed(selection))),
                Err(e) => {
                    log::debug!("Confirm chord ignored: {}", e);
                    (EventOutcome::consumed(), None)
                }
            },
            PageEvent::KeyDown(_) => (EventOutcome::passthrough(), None),
        }
    }

    /// Confirm the highlighted element.
    ///
    /// Fails without changing state when the picker is idle or nothing is highlighted.
    pub fn confirm(&mut self, tree: &mut DomTree) -> Result<Selection> {
        let (variable_name, node) = match &self.state {
            PickerState::Idle => return Err(SyringeError::PickerInactive),
            PickerState::Active(session) => match session.highlighted {
                Some(node) if tree.is_attached(node) => (session.variable_name.clone(), node),
                _ => return Err(SyringeError::NothingHighlighted),
            },
        };

        self.teardown(tree);

        let selection = Selection {
            variable_name,
            locator: synthesize(tree, node),
            text: extract_text(tree, Some(node), self.text_limit),
            tag_name: tree.tag_name(node).unwrap_or_default().to_lowercase(),
        };
        log::debug!("Picker confirmed '{}' as {}", selection.variable_name, selection.locator);
        Ok(selection)
    }

    /// Stop picking without a selection; returns false if already idle
    pub fn cancel(&mut self, tree: &mut DomTree) -> bool {
        if !self.is_active() {
            return false;
        }
        self.teardown(tree);
        log::debug!("Picker cancelled");
        true
    }

    fn teardown(&mut self, tree: &mut DomTree) {
        self.listeners.detach_all();
        if let PickerState::Active(session) = std::mem::take(&mut self.state) {
            if let Some(overlay) = session.overlay {
                overlay.unmount(tree);
            }
        }
        self.ledger.restore_all(tree);
    }
}
