//! Context handed to plugins at init time.

use std::sync::Arc;

use serde_json::Value;

use crate::core::event::{Event, EventBus, EventHandler, HandlerResult, Subscription};
use crate::core::options::PluginOptions;
use crate::error::{NavError, Result};

/// A plugin's only way into the core: its own options and the bus.
///
/// It deliberately carries no handle to the registry or to other plugins.
#[derive(Clone)]
pub struct Context {
    event_bus: EventBus,
    plugin_name: Option<Arc<str>>,
    options: Arc<PluginOptions>,
    core_name: Arc<str>,
}

impl Context {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            event_bus,
            plugin_name: None,
            options: Arc::new(PluginOptions::default()),
            core_name: Arc::from("core"),
        }
    }

    pub fn with_plugin(self, plugin_name: &str, options: PluginOptions) -> Self {
        Self {
            plugin_name: Some(Arc::from(plugin_name)),
            options: Arc::new(options),
            ..self
        }
    }

    pub fn with_core_name(self, core_name: &str) -> Self {
        Self {
            core_name: Arc::from(core_name),
            ..self
        }
    }

    pub fn emit(&self, event_type: impl Into<String>, payload: Value) -> usize {
        self.event_bus.emit(event_type, payload)
    }

    pub fn emit_event(&self, event: Event) -> usize {
        self.event_bus.emit_event(event)
    }

    pub fn on<F>(&self, event_type: impl Into<String>, f: F) -> Subscription
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.event_bus.on(event_type, f)
    }

    pub fn once<F>(&self, event_type: impl Into<String>, f: F) -> Subscription
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.event_bus.once(event_type, f)
    }

    pub fn off(&self, event_type: &str, handler: &EventHandler) -> bool {
        self.event_bus.off(event_type, handler)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn options(&self) -> &PluginOptions {
        &self.options
    }

    /// Shorthand for a required option of the owning plugin.
    pub fn require_option<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.options.require(self.plugin_name(), key)
    }

    pub fn core_name(&self) -> &str {
        &self.core_name
    }
}

pub trait ContextExt {
    fn plugin_name(&self) -> &str;
    fn is_in_plugin(&self) -> bool;
}

impl ContextExt for Context {
    fn plugin_name(&self) -> &str {
        self.plugin_name.as_deref().unwrap_or("core")
    }

    fn is_in_plugin(&self) -> bool {
        self.plugin_name.is_some()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("core", &self.core_name)
            .field("plugin", &self.plugin_name())
            .field("options", &self.options)
            .finish()
    }
}

/// Used by plugins that hold `Option<Context>` between `init` and `destroy`.
pub fn require_context<'a>(ctx: &'a Option<Context>, plugin: &str, operation: &'static str) -> Result<&'a Context> {
    ctx.as_ref()
        .ok_or_else(|| NavError::lifecycle_order(format!("plugin {}", plugin), operation, "without context"))
}
