//! Core facade: the single entry point for embedders

use crate::core::{Context, EventBus, Plugin, PluginOptions, PluginState};
use crate::error::{NavError, Result};
use crate::runtime::registry::{validate_plugin_name, InitOrder, PluginRegistry, RegistryConfig};
use crate::runtime::report::{LifecyclePhase, LifecycleReport};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::Path;
use tokio::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub name: String,
    pub lifecycle_timeout_ms: u64,
    pub init_order: InitOrder,
    /// Options keyed by plugin name.
    pub plugins: HashMap<String, PluginOptions>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            name: "nav-synapse".to_string(),
            lifecycle_timeout_ms: 30_000,
            init_order: InitOrder::default(),
            plugins: HashMap::new(),
        }
    }
}

impl CoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_lifecycle_timeout(mut self, timeout: Duration) -> Self {
        self.lifecycle_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_init_order(mut self, order: InitOrder) -> Self {
        self.init_order = order;
        self
    }

    pub fn with_plugin_options(mut self, plugin: impl Into<String>, options: PluginOptions) -> Self {
        self.plugins.insert(plugin.into(), options);
        self
    }

    pub fn with_plugin_option(
        mut self,
        plugin: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.plugins.entry(plugin.into()).or_default().set(key, value);
        self
    }

    pub fn lifecycle_timeout(&self) -> Duration {
        Duration::from_millis(self.lifecycle_timeout_ms)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::new()
            .with_timeout(self.lifecycle_timeout())
            .with_init_order(self.init_order)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CoreConfig = toml::from_str(text)?;
        if config.lifecycle_timeout_ms == 0 {
            return Err(NavError::ConfigError("lifecycle_timeout_ms must be positive".to_string()));
        }
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Configured,
    Initialized,
    Started,
    Stopped,
    Destroyed,
}

impl fmt::Display for CoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CoreState::Configured => "configured",
            CoreState::Initialized => "initialized",
            CoreState::Started => "started",
            CoreState::Stopped => "stopped",
            CoreState::Destroyed => "destroyed",
        })
    }
}

pub struct CoreBuilder {
    config: Option<CoreConfig>,
    plugins_to_add: Vec<Box<dyn Plugin>>,
}

impl CoreBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            plugins_to_add: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn add_plugin<P: Plugin>(mut self, plugin: P) -> Self {
        self.plugins_to_add.push(Box::new(plugin));
        self
    }

    pub fn add_plugins<I>(mut self, plugins: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn Plugin>>,
    {
        self.plugins_to_add.extend(plugins);
        self
    }

    /// Fails on the first duplicate plugin name.
    pub fn build(mut self) -> Result<NavCore> {
        let mut core = NavCore::new(self.config.take().unwrap_or_default());
        for plugin in self.plugins_to_add {
            core.register_plugin(plugin)?;
        }
        Ok(core)
    }
}

impl Default for CoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns exactly one bus and one registry, both created by [`NavCore::init`]
/// and released by [`NavCore::destroy`].
pub struct NavCore {
    config: CoreConfig,
    pending: Vec<Box<dyn Plugin>>,
    registry: Option<PluginRegistry>,
    event_bus: Option<EventBus>,
    state: CoreState,
}

impl NavCore {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            registry: None,
            event_bus: None,
            state: CoreState::Configured,
        }
    }

    pub fn build() -> CoreBuilder {
        CoreBuilder::new()
    }

    /// Replaces the configuration. Only allowed before `init`.
    pub fn configure(&mut self, config: CoreConfig) -> Result<()> {
        self.require("configure", &[CoreState::Configured])?;
        self.config = config;
        Ok(())
    }

    pub fn add_plugin<P: Plugin>(&mut self, plugin: P) -> Result<()> {
        self.register_plugin(Box::new(plugin))
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) -> Result<()> {
        self.require("register a plugin with", &[CoreState::Configured])?;
        validate_plugin_name(plugin.name())?;
        if self.pending.iter().any(|p| p.name() == plugin.name()) {
            return Err(NavError::DuplicatePlugin(plugin.name().to_string()));
        }
        self.pending.push(plugin);
        Ok(())
    }

    /// Builds the bus and registry, registers the configured plugins and
    /// initializes them. Per-plugin failures are in the report; only
    /// configuration and ordering problems are returned as errors.
    pub async fn init(&mut self) -> Result<LifecycleReport> {
        self.require("init", &[CoreState::Configured])?;

        let event_bus = EventBus::new();
        let mut registry = PluginRegistry::with_config(event_bus.clone(), self.config.registry_config())
            .with_options(self.config.plugins.clone())
            .with_core_name(self.config.name.clone());

        // Queue stays intact if anything in it would be rejected.
        for plugin in &self.pending {
            validate_plugin_name(plugin.name())?;
        }
        for plugin in std::mem::take(&mut self.pending) {
            registry.register(plugin)?;
        }

        let report = registry.init_all().await;
        if !report.is_success() {
            warn!(core = %self.config.name, failed = ?report.failed_plugins(), "some plugins failed to initialize");
        }

        self.event_bus = Some(event_bus);
        self.registry = Some(registry);
        self.state = CoreState::Initialized;
        info!(core = %self.config.name, "initialized");
        Ok(report)
    }

    /// Starts (or resumes) all plugins. Never initializes implicitly.
    pub async fn start(&mut self) -> Result<LifecycleReport> {
        self.require("start", &[CoreState::Initialized, CoreState::Stopped])?;
        let registry = self.registry_mut("start")?;
        let report = registry.start_all().await;
        self.state = CoreState::Started;
        info!(core = %self.config.name, "started");
        Ok(report)
    }

    /// Pauses all started plugins; `start` resumes them.
    pub async fn stop(&mut self) -> Result<LifecycleReport> {
        self.require("stop", &[CoreState::Started])?;
        let registry = self.registry_mut("stop")?;
        let report = registry.stop_all().await;
        self.state = CoreState::Stopped;
        info!(core = %self.config.name, "stopped");
        Ok(report)
    }

    /// Tears everything down and releases the bus. Valid from any state but `Destroyed`.
    pub async fn destroy(&mut self) -> Result<LifecycleReport> {
        if self.state == CoreState::Destroyed {
            return Err(self.order_error("destroy"));
        }

        let report = match self.registry.take() {
            Some(mut registry) => registry.destroy_all().await,
            None => LifecycleReport::new(LifecyclePhase::Destroy),
        };

        if let Some(event_bus) = self.event_bus.take() {
            event_bus.clear(None);
        }
        self.pending.clear();
        self.state = CoreState::Destroyed;
        info!(core = %self.config.name, "destroyed");
        Ok(report)
    }

    /// Starts, waits for `shutdown`, then destroys. Requires a prior `init`.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<LifecycleReport>
    where
        F: Future<Output = ()>,
    {
        let started = self.start().await?;
        if !started.is_success() {
            warn!(core = %self.config.name, "{}", started);
        }
        shutdown.await;
        self.destroy().await
    }

    /// The bus external consumers subscribe to. Available between `init` and `destroy`.
    pub fn event_bus(&self) -> Result<&EventBus> {
        self.event_bus
            .as_ref()
            .ok_or_else(|| self.order_error("access the event bus of"))
    }

    /// Context for embedder-side emitters.
    pub fn context(&self) -> Result<Context> {
        Ok(Context::new(self.event_bus()?.clone()).with_core_name(&self.config.name))
    }

    pub fn state(&self) -> CoreState {
        self.state
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn plugin_states(&self) -> Vec<(String, PluginState)> {
        match &self.registry {
            Some(registry) => registry.plugin_states(),
            None => self
                .pending
                .iter()
                .map(|p| (p.name().to_string(), PluginState::Registered))
                .collect(),
        }
    }

    pub fn plugin_state(&self, name: &str) -> Option<PluginState> {
        self.registry.as_ref().and_then(|r| r.state_of(name))
    }

    fn require(&self, operation: &'static str, allowed: &[CoreState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.order_error(operation))
        }
    }

    fn order_error(&self, operation: &'static str) -> NavError {
        NavError::lifecycle_order(format!("core {}", self.config.name), operation, self.state)
    }

    fn registry_mut(&mut self, operation: &'static str) -> Result<&mut PluginRegistry> {
        let err = self.order_error(operation);
        self.registry.as_mut().ok_or(err)
    }
}

/// Resolves on SIGINT/SIGTERM (Ctrl-C elsewhere).
pub async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| NavError::RuntimeError(format!("Signal error: {}", e)))?;
    }

    Ok(())
}
