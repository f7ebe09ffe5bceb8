// UI module - toolkit boundary and the bridge into the UI thread
//
// This module contains:
// - Toolkit: the trait a window system implements
// - Dispatcher: synchronous call bridge into the UI event loop
// - UiContext: UI-thread-only state handed to dispatched work and handlers
// - HeadlessToolkit: in-memory toolkit for demos and tests

pub mod bridge;
pub mod context;
pub mod headless;
pub mod toolkit;

pub use bridge::{Dispatcher, EventSender};
pub use context::UiContext;
pub use headless::{HeadlessProbe, HeadlessToolkit, HeadlessWidget};
pub use toolkit::{
    KeyBindingId, PlacementId, Toolkit, ToolkitError, UiEvent, WidgetId, WidgetSpec,
};
