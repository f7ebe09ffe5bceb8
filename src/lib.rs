// quickprompt - blocking prompts and a UI-thread call bridge
//
// This is the library crate: the dispatcher, prompts, registry, session
// lifecycle and presets. The binary crate (main.rs) runs a small headless
// demo on top of it.

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod presets;
pub mod prompt;
pub mod session;
pub mod ui;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock, SystemClock, Timestamp};
pub use config::ConfigManager;
pub use error::{Error, Result};
pub use events::{SessionEvent, SessionEvents};
pub use metrics::{Metrics, MetricsSnapshot};
pub use models::{AppConfig, ClockSource, LoggingConfig, SessionConfig, SubmitPolicy};
pub use prompt::{
    Prompt, PromptId, PromptSetup, PromptState, Response, SubmitOutcome, setup_fn,
};
pub use session::{Session, SessionHandle};
pub use ui::{
    Dispatcher, EventSender, HeadlessProbe, HeadlessToolkit, PlacementId, Toolkit, UiContext,
    UiEvent, WidgetId, WidgetSpec,
};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
