//! Error types for reflow.
//!
//! Three failure classes with very different blast radii:
//! - [`ConfigError`] - setup mistakes; fail fast at construction, never during a pass
//! - [`RenderError`] - one view failed to create or refresh; caught and logged per item
//! - [`SourceTermination`] - the upstream collection source died; surfaced as a
//!   typed terminal state instead of being silently absorbed

use thiserror::Error;

/// Configuration error raised while building an engine or registering templates.
///
/// These are programming errors and are reported before any pass runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No key function was configured for the differ.
    #[error("no key function configured")]
    MissingKeyFn,

    /// No view template was configured.
    #[error("no view template configured")]
    MissingTemplate,

    /// No view container was configured.
    #[error("no view container configured")]
    MissingContainer,

    /// A strategy name was requested that the registry does not know.
    #[error("unknown render strategy `{0}`")]
    UnknownStrategy(String),

    /// A template was registered twice under the same name.
    #[error("template `{0}` is already registered")]
    DuplicateTemplate(String),
}

/// Failure while creating or refreshing a single view.
///
/// Per-item errors stay local: the engine logs them and continues with the
/// remaining items of the pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RenderError {
    message: String,
}

impl RenderError {
    /// Create a render error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Terminal error emitted by a collection source.
///
/// The engine never crashes on this; it records a terminal state the caller
/// can observe and leaves all rendered views intact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("collection source terminated: {reason}")]
pub struct SourceTermination {
    reason: String,
}

impl SourceTermination {
    /// Create a termination error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The reason the source reported when it terminated.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}
