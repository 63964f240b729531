//! Nav Synapse - a plugin-first event core for navigation UIs
//!
//! Input sources publish `category:action` events on a bus owned by one
//! [`NavCore`]; consumers subscribe without knowing who produced them.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod core;
pub mod error;
pub mod plugins;
pub mod runtime;

pub mod prelude {
    //! Commonly used types and traits

    pub use crate::core::{handler, Context, ContextExt, Event, EventBus, EventHandler, Subscription};
    pub use crate::core::{Plugin, PluginOptions, PluginState};
    pub use crate::error::{NavError, Result};
    pub use crate::runtime::{CoreBuilder, CoreConfig, CoreState, NavCore};
    pub use crate::runtime::{InitOrder, LifecyclePhase, LifecycleReport};
    pub use async_trait::async_trait;
    pub use serde_json::json;
}

pub use crate::core::{Context, Event, EventBus, Plugin};
pub use error::{NavError, Result};
pub use runtime::NavCore;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

pub fn build_info() -> String {
    format!("Nav Synapse {}", VERSION)
}

/// Plugins that spawn timers need an ambient Tokio runtime.
pub fn runtime_check() -> Result<()> {
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(NavError::RuntimeError(
            "No Tokio runtime found. Use #[tokio::main]".to_string()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = build_info();
        assert!(info.contains("Nav Synapse"));
    }

    #[test]
    fn test_runtime_check_outside_runtime() {
        assert!(runtime_check().is_err());
    }

    #[tokio::test]
    async fn test_prelude_imports() {
        use prelude::*;

        let bus = EventBus::new();
        let ctx = Context::new(bus.clone());
        ctx.emit("keyboard:keydown", json!({ "key": "Enter" }));

        assert!(runtime_check().is_ok());
        assert_eq!(bus.processed_events(), 1);
    }
}
