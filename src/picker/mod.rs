//! Interactive element picking inside a page
//!
//! - events: page events, key chords and capture-phase listener bookkeeping
//! - highlight: style ledger that restores hovered elements
//! - overlay: the status banner naming the target variable
//! - state: the picker lifecycle

pub mod events;
pub mod highlight;
pub mod overlay;
pub mod state;

pub use events::{CaptureListeners, EventKind, EventOutcome, KeyPress, PageEvent};
pub use highlight::{StyleLedger, highlight_style};
pub use overlay::{OVERLAY_ID, Overlay};
pub use state::{PickerMachine, Selection, StartOutcome, Transition};
