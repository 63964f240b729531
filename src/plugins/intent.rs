//! Maps raw input events to semantic `intent:*` events.
//!
//! Swipes map one to one; key presses go through a configurable key table.
//! Unknown keys are ignored.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::context::require_context;
use crate::core::event::types::{
    GESTURE_SWIPE_LEFT, GESTURE_SWIPE_RIGHT, INTENT_BACK, INTENT_NAVIGATE_LEFT, INTENT_NAVIGATE_RIGHT,
    INTENT_SELECT, KEYBOARD_KEYDOWN,
};
use crate::core::{Context, Event, Plugin, Subscription, WeakEventBus};
use crate::error::{NavError, Result};

pub const NAME: &str = "intent-mapper";

fn default_bindings() -> HashMap<String, String> {
    [
        ("ArrowLeft", INTENT_NAVIGATE_LEFT),
        ("ArrowRight", INTENT_NAVIGATE_RIGHT),
        ("Enter", INTENT_SELECT),
        ("Escape", INTENT_BACK),
    ]
    .into_iter()
    .map(|(key, intent)| (key.to_string(), intent.to_string()))
    .collect()
}

/// Re-emits `source` as `intent`, keeping a link to the triggering event.
fn forward(bus: &WeakEventBus, intent: &str, source: &Event) {
    if let Some(bus) = bus.upgrade() {
        bus.emit(
            intent,
            json!({ "source": source.event_type, "trigger_timestamp": source.timestamp }),
        );
    }
}

pub struct IntentMapperPlugin {
    key_bindings: Arc<HashMap<String, String>>,
    ctx: Option<Context>,
    subscriptions: Vec<Subscription>,
}

impl IntentMapperPlugin {
    pub fn new() -> Self {
        Self {
            key_bindings: Arc::new(default_bindings()),
            ctx: None,
            subscriptions: Vec::new(),
        }
    }

    pub fn binding(&self, key: &str) -> Option<&str> {
        self.key_bindings.get(key).map(String::as_str)
    }
}

impl Default for IntentMapperPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for IntentMapperPlugin {
    fn name(&self) -> &str {
        NAME
    }

    async fn init(&mut self, ctx: Context) -> Result<()> {
        let mut bindings = default_bindings();
        if let Some(extra) = ctx.options().get::<HashMap<String, String>>("key_bindings")? {
            for (key, intent) in extra {
                if !intent.starts_with("intent:") {
                    return Err(NavError::ConfigError(format!(
                        "{}: key `{}` is bound to `{}`, expected an intent:* event",
                        NAME, key, intent
                    )));
                }
                bindings.insert(key, intent);
            }
        }
        self.key_bindings = Arc::new(bindings);
        self.ctx = Some(ctx);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let ctx = require_context(&self.ctx, NAME, "start")?;
        if !self.subscriptions.is_empty() {
            return Ok(());
        }

        for (gesture, intent) in [
            (GESTURE_SWIPE_LEFT, INTENT_NAVIGATE_LEFT),
            (GESTURE_SWIPE_RIGHT, INTENT_NAVIGATE_RIGHT),
        ] {
            let bus = ctx.event_bus().downgrade();
            self.subscriptions
                .push(ctx.on(gesture, move |event| {
                    forward(&bus, intent, event);
                    Ok(())
                }));
        }

        let bus = ctx.event_bus().downgrade();
        let bindings = Arc::clone(&self.key_bindings);
        self.subscriptions.push(ctx.on(KEYBOARD_KEYDOWN, move |event| {
            let key = event
                .payload
                .get("key")
                .and_then(|k| k.as_str())
                .ok_or_else(|| NavError::HandlerError("keydown without a `key` field".to_string()))?;
            if let Some(intent) = bindings.get(key) {
                forward(&bus, intent, event);
            }
            Ok(())
        }));

        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        self.stop().await?;
        self.ctx = None;
        Ok(())
    }
}
