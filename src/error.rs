//! Error handling system

use thiserror::Error;

use crate::runtime::report::LifecycleReport;

#[derive(Error, Debug)]
pub enum NavError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Duplicate plugin name: {0}")]
    DuplicatePlugin(String),

    #[error("Plugin {plugin} is missing required option `{option}`")]
    MissingOption { plugin: String, option: String },

    #[error("Lifecycle order error: cannot {operation} {target} while {state}")]
    LifecycleOrder {
        target: String,
        operation: &'static str,
        state: String,
    },

    #[error("Plugin {plugin} failed during {phase}: {reason}")]
    PluginFailed {
        plugin: String,
        phase: String,
        reason: String,
    },

    #[error("{0}")]
    LifecycleFailed(Box<LifecycleReport>),

    #[error("Event handler failed: {0}")]
    HandlerError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Operation timeout: {0}")]
    TimeoutError(String),

    #[error("{0}")]
    Other(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl NavError {
    pub(crate) fn lifecycle_order(
        target: impl Into<String>,
        operation: &'static str,
        state: impl std::fmt::Display,
    ) -> Self {
        NavError::LifecycleOrder {
            target: target.into(),
            operation,
            state: state.to_string(),
        }
    }

    /// True for errors that come from configuration rather than runtime behaviour.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            NavError::ConfigError(_) | NavError::DuplicatePlugin(_) | NavError::MissingOption { .. }
        )
    }

    /// Recasts a handler failure as a `HandlerError` tagged with the event type.
    pub fn in_event(self, event_type: &str) -> Self {
        match self {
            NavError::HandlerError(msg) => NavError::HandlerError(format!("{} [event: {}]", msg, event_type)),
            other => NavError::HandlerError(format!("{} [event: {}]", other, event_type)),
        }
    }
}

pub type Result<T> = std::result::Result<T, NavError>;

impl From<std::io::Error> for NavError {
    fn from(error: std::io::Error) -> Self {
        NavError::IoError(error.to_string())
    }
}

impl From<toml::de::Error> for NavError {
    fn from(error: toml::de::Error) -> Self {
        NavError::ConfigError(error.to_string())
    }
}

impl From<serde_json::Error> for NavError {
    fn from(error: serde_json::Error) -> Self {
        NavError::ConfigError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NavError::DuplicatePlugin("mock-gesture".to_string());
        assert_eq!(err.to_string(), "Duplicate plugin name: mock-gesture");

        let err = NavError::lifecycle_order("plugin keyboard", "start", "registered");
        assert_eq!(
            err.to_string(),
            "Lifecycle order error: cannot start plugin keyboard while registered"
        );
    }

    #[test]
    fn test_config_classification() {
        assert!(NavError::ConfigError("x".into()).is_config());
        assert!(NavError::MissingOption {
            plugin: "voice".into(),
            option: "locale".into()
        }
        .is_config());
        assert!(!NavError::HandlerError("x".into()).is_config());
    }

    #[test]
    fn test_in_event_tags_handler_errors() {
        let err = NavError::Other("boom".to_string()).in_event("gesture:swipe_left");
        assert!(matches!(err, NavError::HandlerError(_)));
        assert_eq!(err.to_string(), "Event handler failed: boom [event: gesture:swipe_left]");

        let err = NavError::HandlerError("no key".to_string()).in_event("keyboard:keydown");
        assert_eq!(err.to_string(), "Event handler failed: no key [event: keyboard:keydown]");
    }
}
