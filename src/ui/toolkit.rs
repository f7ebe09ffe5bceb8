// Toolkit boundary - the only surface the core needs from a UI toolkit
//
// A toolkit owns the actual window system objects. The core asks it to create
// and destroy placements (containers), create widgets inside them, toggle
// widget interactivity and register global key bindings. Native input comes
// back into the session as `UiEvent`s through the `EventSender` handed over
// in `attach`.

use crate::ui::bridge::EventSender;
use std::fmt;
use thiserror::Error;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle_type!(
    /// Opaque handle to a container in the widget tree.
    PlacementId,
    "placement"
);
handle_type!(
    /// Opaque handle to a widget.
    WidgetId,
    "widget"
);
handle_type!(
    /// Opaque handle to a global (root window) key binding.
    KeyBindingId,
    "key"
);

impl PlacementId {
    /// The root window. Always exists and cannot be destroyed.
    pub const ROOT: PlacementId = PlacementId(0);
}

/// What to build when asking the toolkit for a widget.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetSpec {
    Label { text: String },
    Button { text: String },
    TextEntry,
    Dropdown { options: Vec<String> },
}

impl WidgetSpec {
    pub fn is_interactive(&self) -> bool {
        !matches!(self, WidgetSpec::Label { .. })
    }
}

/// Native input delivered by the toolkit.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// A button was clicked.
    Activated(WidgetId),
    /// A text entry's content was committed (e.g. Enter pressed).
    TextCommitted(WidgetId, String),
    /// A dropdown option was chosen.
    Selected(WidgetId, usize),
    /// A key was pressed anywhere in the root window.
    Key(char),
    /// The user asked to close the root window.
    CloseRequested,
}

impl UiEvent {
    /// The widget the event targets, if it is not a global key press.
    pub fn widget(&self) -> Option<WidgetId> {
        match self {
            UiEvent::Activated(w) | UiEvent::TextCommitted(w, _) | UiEvent::Selected(w, _) => {
                Some(*w)
            }
            UiEvent::Key(_) | UiEvent::CloseRequested => None,
        }
    }
}

/// Errors raised by a toolkit implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolkitError {
    #[error("Unknown placement {0}")]
    UnknownPlacement(PlacementId),

    #[error("Unknown widget {0}")]
    UnknownWidget(WidgetId),

    #[error("The root placement cannot be destroyed")]
    RootPlacement,

    #[error("Toolkit backend failure: {0}")]
    Backend(String),
}

/// The UI toolkit boundary.
///
/// Implementations are only ever called on the UI thread, so they need not be
/// `Send`.
#[cfg_attr(test, mockall::automock)]
pub trait Toolkit {
    /// Called once when the session starts, before the initial layout runs.
    fn attach(&mut self, events: EventSender);

    fn set_title(&mut self, title: &str);

    fn set_min_size(&mut self, width: u32, height: u32);

    fn create_placement(&mut self, parent: PlacementId) -> Result<PlacementId, ToolkitError>;

    /// Destroy a placement together with every widget and child placement in it.
    fn destroy_placement(&mut self, placement: PlacementId) -> Result<(), ToolkitError>;

    fn create_widget(
        &mut self,
        placement: PlacementId,
        spec: &WidgetSpec,
    ) -> Result<WidgetId, ToolkitError>;

    fn set_widget_enabled(&mut self, widget: WidgetId, enabled: bool) -> Result<(), ToolkitError>;

    /// Start routing root-window key presses for this binding.
    fn bind_key(&mut self, binding: KeyBindingId) -> Result<(), ToolkitError>;

    /// Stop routing key presses for this binding. Unknown bindings are ignored.
    fn unbind_key(&mut self, binding: KeyBindingId);
}
