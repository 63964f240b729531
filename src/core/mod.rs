//! Core module: event bus, plugin contract, and plugin context

pub mod context;
pub mod event;
pub mod options;
pub mod plugin;

pub use context::{Context, ContextExt};
pub use event::{handler, Event, EventBus, EventHandler, HandlerResult, Subscription, SubscriptionId, WeakEventBus};
pub use options::PluginOptions;
pub use plugin::{Plugin, PluginInstance, PluginState};
