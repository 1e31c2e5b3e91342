//! Room action dispatch: resolve player and world events to native handlers.
//!
//! A room hands over an ordered list of `(pattern, handler)` rows when it
//! loads. Every input event is matched against the rows in order and the
//! first hit wins, so rooms list specific rows ahead of catch-all ones.

pub mod error;
pub mod pattern;
pub mod registry;
pub mod script;
pub mod table;
pub mod trigger;

pub use error::DispatchError;
pub use pattern::{Field, Pattern};
pub use registry::HandlerRegistry;
pub use script::{RoomScript, ScriptAction};
pub use table::{ActionDispatchTable, DispatchRow, Handler, ShadowedRow, SharedHandler, TableState};
pub use trigger::{ActionKind, Trigger, ANY};
