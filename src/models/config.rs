use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Top-level configuration from `quickprompt.yaml`
///
/// Every field has a default, so an empty or missing file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// What a prompt does with a second `submit` in the same round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitPolicy {
    /// Keep the first value; later submits are ignored until `reset`.
    #[default]
    FirstWins,
    /// Overwrite with the latest value.
    LastWins,
}

/// Which clock a new session starts with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSource {
    /// Seconds since the UNIX epoch
    #[default]
    System,
    /// Seconds since the session was created
    Monotonic,
}

/// Settings for the UI session and its prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Window title
    pub title: String,

    pub min_width: u32,
    pub min_height: u32,

    pub submit_policy: SubmitPolicy,

    pub clock: ClockSource,

    /// Newly added prompts start with their widgets disabled until
    /// `enable()`/`ask()`.
    pub start_disabled: bool,

    /// Name of the thread running the application logic
    pub logic_thread_name: String,

    /// Close the session once the logic function returns
    pub close_when_logic_exits: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            title: "quickprompt".to_string(),
            min_width: 700,
            min_height: 400,
            submit_policy: SubmitPolicy::FirstWins,
            clock: ClockSource::System,
            start_disabled: true,
            logic_thread_name: "quickprompt-logic".to_string(),
            close_when_logic_exits: true,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: Utf8PathBuf,
    pub log_prefix: String,
    pub debug_mode: bool,
    /// Also log to the console
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: Utf8PathBuf::from("logs"),
            log_prefix: "quickprompt".to_string(),
            debug_mode: false,
            console: true,
        }
    }
}
