//! Helpers re-exported for behavioural tests.
//!
//! [`ScriptedRunner`] stands in for git and make so suites can drive the whole
//! provisioning flow on a temporary directory, and the logging helpers capture
//! the tracing output produced along the way.

mod logging;
mod scripted_runner;

pub use logging::{capture_debug_logs, capture_info_logs, capture_logs};
pub use scripted_runner::ScriptedRunner;
