//! Transient records that let a pick outlive the control surface.
//!
//! The control surface writes an editing draft before it starts a pick. The page
//! agent writes a pending-picker record when picking starts and a last-selection
//! record on confirm. The next control surface to open reconciles them.

use crate::clock::Clock;
use crate::config::SyringeConfig;
use crate::dom::Locator;
use crate::error::Result;
use crate::picker::Selection;
use crate::store::catalog::{CopyItem, EditTarget};
use crate::store::kv::{self, KeyValueStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const PENDING_PICKER_KEY: &str = "pendingPicker";
pub const LAST_SELECTION_KEY: &str = "lastSelection";
pub const EDITING_INDEX_KEY: &str = "editingItemIndex";
pub const EDITING_DRAFT_KEY: &str = "editingItemDraft";

/// Every transient key, cleared together on reconciliation
pub const TRANSIENT_KEYS: [&str; 4] = [
    PENDING_PICKER_KEY,
    LAST_SELECTION_KEY,
    EDITING_INDEX_KEY,
    EDITING_DRAFT_KEY,
];

/// Durable mirror of an active picker session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPickerRecord {
    pub active: bool,
    pub variable_name: Option<String>,
    pub timestamp: u64,
}

/// Durable record of the most recent confirmed pick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSelectionRecord {
    pub variable_name: String,
    pub selector: Locator,
    pub text: String,
    pub tag_name: String,
    pub timestamp: u64,
}

impl LastSelectionRecord {
    pub fn from_selection(selection: &Selection, timestamp: u64) -> Self {
        Self {
            variable_name: selection.variable_name.clone(),
            selector: selection.locator.clone(),
            text: selection.text.clone(),
            tag_name: selection.tag_name.clone(),
            timestamp,
        }
    }

    pub fn age(&self, now_millis: u64) -> Duration {
        Duration::from_millis(now_millis.saturating_sub(self.timestamp))
    }

    /// Strictly younger than the window
    pub fn is_fresh(&self, now_millis: u64, window: Duration) -> bool {
        self.age(now_millis) < window
    }
}

/// Working copy saved before a pick started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditingDraft {
    pub target: EditTarget,
    pub item: CopyItem,
}

/// What a starting control surface should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// Reopen the editor with the selection merged into the draft
    Resume {
        target: EditTarget,
        item: CopyItem,
        selection: LastSelectionRecord,
    },

    /// Nothing to recover; open the default list
    Fresh,
}

/// Reads and writes the transient recovery records in the local store
#[derive(Clone)]
pub struct RecoveryStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    freshness_window: Duration,
}

impl RecoveryStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: &SyringeConfig) -> Self {
        Self {
            store,
            clock,
            freshness_window: config.freshness_window,
        }
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn write_pending(&self, variable_name: &str) -> Result<()> {
        let record = PendingPickerRecord {
            active: true,
            variable_name: Some(variable_name.to_string()),
            timestamp: self.now_millis(),
        };
        kv::write(self.store.as_ref(), PENDING_PICKER_KEY, &record).await
    }

    pub async fn clear_pending(&self) -> Result<()> {
        self.store.remove(&[PENDING_PICKER_KEY]).await
    }

    pub async fn pending(&self) -> Result<Option<PendingPickerRecord>> {
        kv::read(self.store.as_ref(), PENDING_PICKER_KEY).await
    }

    /// Record a confirmed pick and retire the pending record it completes
    pub async fn write_last_selection(&self, selection: &Selection) -> Result<()> {
        let record = LastSelectionRecord::from_selection(selection, self.now_millis());
        kv::write(self.store.as_ref(), LAST_SELECTION_KEY, &record).await?;
        self.clear_pending().await
    }

    pub async fn last_selection(&self) -> Result<Option<LastSelectionRecord>> {
        kv::read(self.store.as_ref(), LAST_SELECTION_KEY).await
    }

    /// Persist the working copy ahead of a pick
    pub async fn save_draft(&self, target: EditTarget, item: &CopyItem) -> Result<()> {
        kv::write(self.store.as_ref(), EDITING_INDEX_KEY, &target).await?;
        kv::write(self.store.as_ref(), EDITING_DRAFT_KEY, item).await
    }

    pub async fn draft(&self) -> Result<Option<EditingDraft>> {
        let Some(item) = kv::read::<CopyItem>(self.store.as_ref(), EDITING_DRAFT_KEY).await? else {
            return Ok(None);
        };
        let target = kv::read(self.store.as_ref(), EDITING_INDEX_KEY).await?.unwrap_or_default();
        Ok(Some(EditingDraft { target, item }))
    }

    /// Drop the saved working copy after a pick failed to start
    pub async fn clear_draft(&self) -> Result<()> {
        self.store.remove(&[EDITING_INDEX_KEY, EDITING_DRAFT_KEY]).await
    }

    /// Forget a selection that a live control surface has already applied
    pub async fn consume_selection(&self) -> Result<()> {
        self.store.remove(&[LAST_SELECTION_KEY, PENDING_PICKER_KEY]).await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.store.remove(&TRANSIENT_KEYS).await
    }

    /// Reconcile transient records on control-surface startup.
    ///
    /// A fresh selection is merged into the saved draft. Stale or unreadable records
    /// are dropped without complaint. All transient keys are removed before
    /// returning, so running this again finds nothing to apply.
    pub async fn reconcile(&self) -> Result<Recovery> {
        let now = self.now_millis();
        let recovery = match self.read_lenient::<LastSelectionRecord>(LAST_SELECTION_KEY).await {
            Some(selection) if selection.is_fresh(now, self.freshness_window) => {
                let target = self
                    .read_lenient::<EditTarget>(EDITING_INDEX_KEY)
                    .await
                    .unwrap_or_default();
                match self.read_lenient::<CopyItem>(EDITING_DRAFT_KEY).await {
                    Some(mut item) => {
                        item.bind_variable(selection.variable_name.clone(), selection.selector.clone());
                        log::info!(
                            "Recovered selection of '{}' into draft '{}'",
                            selection.variable_name,
                            item.display_name()
                        );
                        Recovery::Resume {
                            target,
                            item,
                            selection,
                        }
                    }
                    None => {
                        log::debug!("Selection of '{}' has no draft to merge into", selection.variable_name);
                        Recovery::Fresh
                    }
                }
            }
            Some(selection) => {
                log::debug!(
                    "Discarding stale selection of '{}' ({:?} old)",
                    selection.variable_name,
                    selection.age(now)
                );
                Recovery::Fresh
            }
            None => Recovery::Fresh,
        };

        self.clear_all().await?;
        Ok(recovery)
    }

    async fn read_lenient<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match kv::read(self.store.as_ref(), key).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Ignoring unreadable {} record: {}", key, e);
                None
            }
        }
    }
}
