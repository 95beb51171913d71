//! Persistent state shared between contexts
//!
//! - kv: the key-value store abstraction and its in-memory backend
//! - file: a JSON file backend for the command line
//! - catalog: copy items and the catalog that owns them
//! - recovery: transient records reconciled when the control surface opens

pub mod catalog;
pub mod file;
pub mod kv;
pub mod recovery;

pub use catalog::{CATALOG_KEY, Catalog, CopyItem, EditTarget, generate_id};
pub use file::JsonFileStore;
pub use kv::{KeyValueStore, MemoryStore, StoreArea, StoreChange};
pub use recovery::{
    EditingDraft, LastSelectionRecord, PendingPickerRecord, Recovery, RecoveryStore, TRANSIENT_KEYS,
};
