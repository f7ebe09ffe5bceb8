use crate::prompt::PromptId;
use crate::ui::toolkit::ToolkitError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the dispatcher, prompts, registry and session.
///
/// Every variant is fatal to the call that returned it only, except
/// [`Error::SessionClosed`], which means the session is shutting down.
#[derive(Error, Debug)]
pub enum Error {
    #[error("UI execution context is not running")]
    DispatcherUnavailable,

    #[error("Prompt API misuse: {0}")]
    PromptMisuse(String),

    #[error("Prompt {0} was never given a return type by its setup routine")]
    PromptNotConfigured(PromptId),

    #[error("Waiting on prompt {0} from the UI execution context would deadlock")]
    PromptDeadlockRisk(PromptId),

    #[error("Session closed")]
    SessionClosed,

    #[error("Prompt {0} has been removed")]
    PromptRemoved(PromptId),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Work dispatched to the UI context panicked: {0}")]
    WorkPanicked(String),

    #[error("Invalid prompt layout: {0}")]
    InvalidLayout(String),

    #[error("Toolkit error: {0}")]
    Toolkit(#[from] ToolkitError),
}

impl Error {
    /// True for the one error kind that signals session teardown.
    pub fn is_session_closed(&self) -> bool {
        matches!(self, Error::SessionClosed)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
