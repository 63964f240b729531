//! Plugin system

use async_trait::async_trait;
use std::fmt;
use tracing::{debug, warn};

use crate::core::context::Context;
use crate::error::{NavError, Result};

/// Lifecycle state tracked by [`PluginInstance`].
///
/// `Registered → Initialized → Started ⇄ Stopped → Destroyed`; `Failed` is
/// terminal for progress, only `destroy` is accepted afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginState {
    Registered,
    Initialized,
    Started,
    Stopped,
    Destroyed,
    Failed,
}

impl PluginState {
    pub fn as_str(self) -> &'static str {
        match self {
            PluginState::Registered => "registered",
            PluginState::Initialized => "initialized",
            PluginState::Started => "started",
            PluginState::Stopped => "stopped",
            PluginState::Destroyed => "destroyed",
            PluginState::Failed => "failed",
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract for every input source or feature module.
///
/// Only the registry calls these; plugins never call each other.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Unique within one core.
    fn name(&self) -> &str;

    /// Validate options and prepare. Must not emit yet.
    async fn init(&mut self, ctx: Context) -> Result<()>;

    /// Begin active operation; the first point at which events may be emitted.
    async fn start(&mut self) -> Result<()>;

    /// Suspend active operation, keeping long-lived resources for a later `start`.
    async fn stop(&mut self) -> Result<()>;

    /// Release everything and drop the context.
    async fn destroy(&mut self) -> Result<()>;
}

#[async_trait]
impl Plugin for Box<dyn Plugin> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn init(&mut self, ctx: Context) -> Result<()> {
        (**self).init(ctx).await
    }

    async fn start(&mut self) -> Result<()> {
        (**self).start().await
    }

    async fn stop(&mut self) -> Result<()> {
        (**self).stop().await
    }

    async fn destroy(&mut self) -> Result<()> {
        (**self).destroy().await
    }
}

/// Lifecycle wrapper that rejects out-of-order calls before they reach the plugin.
pub struct PluginInstance {
    plugin: Box<dyn Plugin>,
    name: String,
    state: PluginState,
}

impl PluginInstance {
    pub fn new(plugin: Box<dyn Plugin>) -> Self {
        let name = plugin.name().to_string();
        Self {
            plugin,
            name,
            state: PluginState::Registered,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, PluginState::Started)
    }

    pub fn to_meta(&self) -> (String, PluginState) {
        (self.name.clone(), self.state)
    }

    pub async fn init(&mut self, ctx: Context) -> Result<()> {
        self.ensure("init", &[PluginState::Registered])?;
        let result = self.plugin.init(ctx).await;
        self.settle("init", result, PluginState::Initialized)
    }

    pub async fn start(&mut self) -> Result<()> {
        self.ensure("start", &[PluginState::Initialized, PluginState::Stopped])?;
        let result = self.plugin.start().await;
        self.settle("start", result, PluginState::Started)
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.ensure("stop", &[PluginState::Started])?;
        let result = self.plugin.stop().await;
        self.settle("stop", result, PluginState::Stopped)
    }

    /// Stops first when started. Always leaves the instance `Destroyed`.
    pub async fn destroy(&mut self) -> Result<()> {
        if self.state == PluginState::Destroyed {
            return Err(self.order_error("destroy"));
        }

        if self.state == PluginState::Registered {
            self.state = PluginState::Destroyed;
            debug!(plugin = %self.name, "destroyed before init");
            return Ok(());
        }

        let mut first_error = None;
        if self.state == PluginState::Started {
            if let Err(e) = self.stop().await {
                first_error = Some(e);
            }
        }

        let result = self.plugin.destroy().await;
        self.state = PluginState::Destroyed;

        match (first_error, result) {
            (None, Ok(())) => {
                debug!(plugin = %self.name, "destroyed");
                Ok(())
            }
            (Some(e), _) | (None, Err(e)) => {
                warn!(plugin = %self.name, error = %e, "destroy failed");
                Err(self.failure("destroy", e))
            }
        }
    }

    pub(crate) fn mark_failed(&mut self) {
        if self.state != PluginState::Destroyed {
            self.state = PluginState::Failed;
        }
    }

    fn ensure(&self, operation: &'static str, allowed: &[PluginState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.order_error(operation))
        }
    }

    fn order_error(&self, operation: &'static str) -> NavError {
        NavError::lifecycle_order(format!("plugin {}", self.name), operation, self.state)
    }

    fn settle(&mut self, phase: &'static str, result: Result<()>, next: PluginState) -> Result<()> {
        match result {
            Ok(()) => {
                debug!(plugin = %self.name, from = %self.state, to = %next, "transition");
                self.state = next;
                Ok(())
            }
            Err(e) => {
                warn!(plugin = %self.name, phase, error = %e, "lifecycle call failed");
                self.state = PluginState::Failed;
                Err(self.failure(phase, e))
            }
        }
    }

    fn failure(&self, phase: &'static str, error: NavError) -> NavError {
        match error {
            already @ NavError::PluginFailed { .. } => already,
            config if config.is_config() => config,
            other => NavError::PluginFailed {
                plugin: self.name.clone(),
                phase: phase.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish()
    }
}
