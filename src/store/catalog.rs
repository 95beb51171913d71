//! The durable catalog of copy items and the working-copy edits made to one item.

use crate::clock::Clock;
use crate::dom::Locator;
use crate::error::{Result, SyringeError};
use crate::store::kv::{self, KeyValueStore};
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Sync-store key holding the ordered list of copy items
pub const CATALOG_KEY: &str = "copyItems";

const ID_SUFFIX_LEN: usize = 9;

/// Generate a copy item id: epoch millis, a dash, then nine base-36 characters
pub fn generate_id(now_millis: u64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .filter_map(|_| std::char::from_digit(rng.gen_range(0..36), 36))
        .collect();
    format!("{}-{}", now_millis, suffix)
}

/// A named template whose variables are bound to page elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyItem {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub template: String,

    /// Variable name to locator; an empty locator means the pick has not completed
    #[serde(default)]
    pub variables: IndexMap<String, Locator>,

    pub created_at: u64,
    pub updated_at: u64,
}

impl CopyItem {
    /// A blank item created at `now_millis`
    pub fn new(now_millis: u64) -> Self {
        Self {
            id: generate_id(now_millis),
            name: String::new(),
            template: String::new(),
            variables: IndexMap::new(),
            created_at: now_millis,
            updated_at: now_millis,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, locator: impl Into<Locator>) -> Self {
        self.bind_variable(name, locator);
        self
    }

    /// Name shown in menus and lists
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "Untitled"
        } else {
            &self.name
        }
    }

    /// Bind or rebind a variable, keeping its position if it already exists
    pub fn bind_variable(&mut self, name: impl Into<String>, locator: impl Into<Locator>) {
        self.variables.insert(name.into(), locator.into());
    }

    /// Rename a variable in place and rewrite every `{old}` in the template.
    ///
    /// Renaming onto an existing variable name is rejected.
    pub fn rename_variable(&mut self, old: &str, new: &str) -> Result<()> {
        let new = new.trim();
        if new.is_empty() {
            return Err(SyringeError::Validation("Variable name cannot be empty".to_string()));
        }
        if old == new {
            return Ok(());
        }
        if self.variables.contains_key(new) {
            return Err(SyringeError::Validation(format!("Variable '{}' already exists", new)));
        }
        let Some(index) = self.variables.get_index_of(old) else {
            return Err(SyringeError::Validation(format!("Unknown variable '{}'", old)));
        };

        let locator = self.variables.shift_remove_index(index).map(|(_, l)| l).unwrap_or_default();
        self.variables.shift_insert(index, new.to_string(), locator);
        self.template = self.template.replace(&format!("{{{}}}", old), &format!("{{{}}}", new));
        Ok(())
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<Locator> {
        self.variables.shift_remove(name)
    }

    /// First `varN` name (N from 1) not already bound
    pub fn next_variable_name(&self) -> String {
        (1..)
            .map(|n| format!("var{}", n))
            .find(|candidate| !self.variables.contains_key(candidate))
            .unwrap_or_default()
    }
}

/// Where a working copy is saved back to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum EditTarget {
    /// A brand-new item, appended on save
    #[default]
    New,

    /// The item at this catalog index
    Existing(usize),
}

impl From<EditTarget> for Value {
    fn from(target: EditTarget) -> Self {
        match target {
            EditTarget::New => Value::String("new".to_string()),
            EditTarget::Existing(index) => Value::from(index),
        }
    }
}

impl TryFrom<Value> for EditTarget {
    type Error = String;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match &value {
            Value::Null => Ok(EditTarget::New),
            Value::String(s) if s == "new" => Ok(EditTarget::New),
            Value::Number(n) => match n.as_i64() {
                Some(i) if i < 0 => Ok(EditTarget::New),
                Some(i) => Ok(EditTarget::Existing(i as usize)),
                None => Err(format!("invalid editing index {}", value)),
            },
            _ => Err(format!("invalid editing index {}", value)),
        }
    }
}

/// The catalog of copy items in the sync store.
///
/// Every mutation reads the latest list and writes the whole list back in one store
/// write, so other contexts never observe a half-applied change.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl Catalog {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// All items in display order
    pub async fn load(&self) -> Result<Vec<CopyItem>> {
        Ok(kv::read(self.store.as_ref(), CATALOG_KEY).await?.unwrap_or_default())
    }

    pub async fn get(&self, index: usize) -> Result<Option<CopyItem>> {
        Ok(self.load().await?.into_iter().nth(index))
    }

    /// Replace the whole list
    pub async fn replace_all(&self, items: &[CopyItem]) -> Result<()> {
        kv::write(self.store.as_ref(), CATALOG_KEY, items).await
    }

    /// Save a working copy back into the catalog.
    ///
    /// The name must not be blank; nothing is written otherwise.
    pub async fn commit(&self, draft: &CopyItem, target: EditTarget) -> Result<Vec<CopyItem>> {
        if draft.name.trim().is_empty() {
            return Err(SyringeError::Validation("Please enter a name".to_string()));
        }

        let mut item = draft.clone();
        item.updated_at = self.clock.now_millis();

        let mut items = self.load().await?;
        match target {
            EditTarget::Existing(index) if index < items.len() => items[index] = item,
            EditTarget::Existing(index) => {
                log::warn!("Editing index {} is past the end of the catalog, appending", index);
                items.push(item);
            }
            EditTarget::New => items.push(item),
        }

        self.replace_all(&items).await?;
        log::info!("Saved copy item '{}' ({} items)", draft.display_name(), items.len());
        Ok(items)
    }

    /// Remove an item by id
    pub async fn delete(&self, id: &str) -> Result<Vec<CopyItem>> {
        let mut items = self.load().await?;
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() != before {
            self.replace_all(&items).await?;
            log::info!("Deleted copy item {}", id);
        }
        Ok(items)
    }
}
