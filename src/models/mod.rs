//! Configuration models for quickprompt.
//!
//! - [`AppConfig`]: everything loaded from `quickprompt.yaml`
//! - [`SessionConfig`]: window, prompt and thread settings for a [`Session`](crate::session::Session)
//! - [`LoggingConfig`]: log directory and verbosity
//! - [`SubmitPolicy`] / [`ClockSource`]: small enums selected by config

pub mod config;

pub use config::{AppConfig, ClockSource, LoggingConfig, SessionConfig, SubmitPolicy};
