//! Plugin registry and lifecycle orchestrator

use crate::core::{Context, EventBus, Plugin, PluginInstance, PluginOptions, PluginState};
use crate::error::{NavError, Result};
use crate::runtime::report::{LifecyclePhase, LifecycleReport};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// How `init_all` schedules plugin `init` calls.
///
/// `start_all`, `stop_all` and `destroy_all` are always sequential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitOrder {
    #[default]
    Sequential,
    Concurrent,
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub timeout: Duration,
    pub init_order: InitOrder,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            init_order: InitOrder::default(),
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_init_order(mut self, order: InitOrder) -> Self {
        self.init_order = order;
        self
    }
}

enum Step {
    Init(Context),
    Start,
    Stop,
    Destroy,
}

impl Step {
    fn phase(&self) -> LifecyclePhase {
        match self {
            Step::Init(_) => LifecyclePhase::Init,
            Step::Start => LifecyclePhase::Start,
            Step::Stop => LifecyclePhase::Stop,
            Step::Destroy => LifecyclePhase::Destroy,
        }
    }
}

/// Runs one lifecycle call under the configured timeout. A timed-out plugin is marked failed.
async fn drive(instance: &mut PluginInstance, step: Step, limit: Duration) -> Result<()> {
    let phase = step.phase();
    let outcome = match step {
        Step::Init(ctx) => timeout(limit, instance.init(ctx)).await,
        Step::Start => timeout(limit, instance.start()).await,
        Step::Stop => timeout(limit, instance.stop()).await,
        Step::Destroy => timeout(limit, instance.destroy()).await,
    };

    match outcome {
        Ok(result) => result,
        Err(_) => {
            instance.mark_failed();
            warn!(plugin = %instance.name(), %phase, ?limit, "lifecycle call timed out");
            Err(NavError::TimeoutError(format!(
                "plugin {} {} timed out after {:?}",
                instance.name(),
                phase,
                limit
            )))
        }
    }
}

pub(crate) fn validate_plugin_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NavError::ConfigError("plugin name must not be empty".to_string()));
    }
    Ok(())
}

type Outcome = (String, Option<Result<()>>);

fn fold(report: &mut LifecycleReport, outcomes: Vec<Outcome>) {
    let phase = report.phase;
    for (name, outcome) in outcomes {
        match outcome {
            Some(result) => report.record(&name, phase, result),
            None => report.skip(&name),
        }
    }
}

/// Ordered plugin list plus the bus the plugins are wired to.
pub struct PluginRegistry {
    plugins: Vec<PluginInstance>,
    event_bus: EventBus,
    config: RegistryConfig,
    options: HashMap<String, PluginOptions>,
    core_name: String,
}

impl PluginRegistry {
    pub fn new(event_bus: EventBus) -> Self {
        Self::with_config(event_bus, RegistryConfig::default())
    }

    pub fn with_config(event_bus: EventBus, config: RegistryConfig) -> Self {
        Self {
            plugins: Vec::new(),
            event_bus,
            config,
            options: HashMap::new(),
            core_name: "core".to_string(),
        }
    }

    /// Per-plugin options keyed by plugin name.
    pub fn with_options(mut self, options: HashMap<String, PluginOptions>) -> Self {
        self.options = options;
        self
    }

    pub fn with_core_name(mut self, core_name: impl Into<String>) -> Self {
        self.core_name = core_name.into();
        self
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();

        validate_plugin_name(&name)?;
        if self.has_plugin(&name) {
            return Err(NavError::DuplicatePlugin(name));
        }

        self.plugins.push(PluginInstance::new(plugin));
        debug!(plugin = %name, position = self.plugins.len(), "registered");
        Ok(())
    }

    pub fn add_plugin<P: Plugin>(&mut self, plugin: P) -> Result<()> {
        self.register(Box::new(plugin))
    }

    /// Inits every `Registered` plugin in registration order, continuing past failures.
    pub async fn init_all(&mut self) -> LifecycleReport {
        let mut report = LifecycleReport::new(LifecyclePhase::Init);
        let limit = self.config.timeout;
        let contexts: Vec<Context> = self.plugins.iter().map(|p| self.context_for(p.name())).collect();

        let outcomes = match self.config.init_order {
            InitOrder::Sequential => {
                let mut outcomes = Vec::with_capacity(self.plugins.len());
                for (instance, ctx) in self.plugins.iter_mut().zip(contexts) {
                    outcomes.push(Self::init_one(instance, ctx, limit).await);
                }
                outcomes
            }
            InitOrder::Concurrent => {
                join_all(
                    self.plugins
                        .iter_mut()
                        .zip(contexts)
                        .map(|(instance, ctx)| Self::init_one(instance, ctx, limit)),
                )
                .await
            }
        };

        fold(&mut report, outcomes);
        info!(core = %self.core_name, "{}", report);
        report
    }

    async fn init_one(instance: &mut PluginInstance, ctx: Context, limit: Duration) -> Outcome {
        if instance.state() != PluginState::Registered {
            return (instance.name().to_string(), None);
        }
        let outcome = drive(instance, Step::Init(ctx), limit).await;
        (instance.name().to_string(), Some(outcome))
    }

    /// Starts `Initialized` or `Stopped` plugins in registration order.
    pub async fn start_all(&mut self) -> LifecycleReport {
        let mut report = LifecycleReport::new(LifecyclePhase::Start);
        let limit = self.config.timeout;
        let mut outcomes = Vec::with_capacity(self.plugins.len());

        for instance in self.plugins.iter_mut() {
            let name = instance.name().to_string();
            if matches!(instance.state(), PluginState::Initialized | PluginState::Stopped) {
                outcomes.push((name, Some(drive(instance, Step::Start, limit).await)));
            } else {
                outcomes.push((name, None));
            }
        }

        fold(&mut report, outcomes);
        info!(core = %self.core_name, "{}", report);
        report
    }

    /// Stops `Started` plugins, last registered first.
    pub async fn stop_all(&mut self) -> LifecycleReport {
        let mut report = LifecycleReport::new(LifecyclePhase::Stop);
        let limit = self.config.timeout;
        let mut outcomes = Vec::with_capacity(self.plugins.len());

        for instance in self.plugins.iter_mut().rev() {
            let name = instance.name().to_string();
            if instance.state() == PluginState::Started {
                outcomes.push((name, Some(drive(instance, Step::Stop, limit).await)));
            } else {
                outcomes.push((name, None));
            }
        }

        fold(&mut report, outcomes);
        info!(core = %self.core_name, "{}", report);
        report
    }

    /// `stop_all`, then destroys every plugin in reverse order regardless of
    /// earlier failures. Stop failures are folded into the returned report.
    pub async fn destroy_all(&mut self) -> LifecycleReport {
        let stop_report = self.stop_all().await;

        let mut report = LifecycleReport::new(LifecyclePhase::Destroy);
        let limit = self.config.timeout;
        let mut outcomes = Vec::with_capacity(self.plugins.len());

        for instance in self.plugins.iter_mut().rev() {
            let name = instance.name().to_string();
            if instance.state() == PluginState::Destroyed {
                outcomes.push((name, None));
            } else {
                outcomes.push((name, Some(drive(instance, Step::Destroy, limit).await)));
            }
        }

        fold(&mut report, outcomes);
        report.absorb_failures(stop_report);
        info!(core = %self.core_name, "{}", report);
        report
    }

    fn context_for(&self, name: &str) -> Context {
        let options = self.options.get(name).cloned().unwrap_or_default();
        Context::new(self.event_bus.clone())
            .with_core_name(&self.core_name)
            .with_plugin(name, options)
    }

    pub fn plugin_states(&self) -> Vec<(String, PluginState)> {
        self.plugins.iter().map(PluginInstance::to_meta).collect()
    }

    pub fn state_of(&self, name: &str) -> Option<PluginState> {
        self.plugins.iter().find(|p| p.name() == name).map(PluginInstance::state)
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name() == name)
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    struct RecordingPlugin {
        name: &'static str,
        log: Log,
        fail_on: Option<&'static str>,
        init_delay: Option<Duration>,
    }

    impl RecordingPlugin {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                log: Arc::clone(log),
                fail_on: None,
                init_delay: None,
            }
        }

        fn failing(mut self, op: &'static str) -> Self {
            self.fail_on = Some(op);
            self
        }

        fn slow_init(mut self, delay: Duration) -> Self {
            self.init_delay = Some(delay);
            self
        }

        fn step(&self, op: &str) -> Result<()> {
            self.log.lock().push(format!("{}:{}", self.name, op));
            if self.fail_on == Some(op) {
                return Err(NavError::Other(format!("{} refused to {}", self.name, op)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Plugin for RecordingPlugin {
        fn name(&self) -> &str {
            self.name
        }

        async fn init(&mut self, ctx: Context) -> Result<()> {
            if let Some(delay) = self.init_delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(tag) = ctx.options().get::<String>("tag")? {
                self.log.lock().push(format!("{}:tag={}", self.name, tag));
            }
            self.step("init")
        }

        async fn start(&mut self) -> Result<()> {
            self.step("start")
        }

        async fn stop(&mut self) -> Result<()> {
            self.step("stop")
        }

        async fn destroy(&mut self) -> Result<()> {
            self.step("destroy")
        }
    }

    fn registry_with(plugins: Vec<RecordingPlugin>) -> PluginRegistry {
        let mut registry = PluginRegistry::new(EventBus::new());
        for plugin in plugins {
            registry.add_plugin(plugin).unwrap();
        }
        registry
    }

    #[test]
    fn test_registry_creation() {
        let registry = PluginRegistry::new(EventBus::new());
        assert_eq!(registry.plugin_count(), 0);
        assert!(registry.plugin_states().is_empty());
    }

    #[test]
    fn test_duplicate_plugin() {
        let log = Log::default();
        let mut registry = PluginRegistry::new(EventBus::new());

        registry.add_plugin(RecordingPlugin::new("keyboard", &log)).unwrap();
        let result = registry.add_plugin(RecordingPlugin::new("keyboard", &log));

        assert!(matches!(result, Err(NavError::DuplicatePlugin(ref name)) if name == "keyboard"));
        assert_eq!(registry.plugin_count(), 1);
    }

    #[test]
    fn test_empty_name_rejected() {
        let log = Log::default();
        let mut registry = PluginRegistry::new(EventBus::new());
        let result = registry.add_plugin(RecordingPlugin::new("", &log));
        assert!(result.unwrap_err().is_config());
    }

    #[tokio::test]
    async fn test_init_all_isolates_failures() {
        let log = Log::default();
        let mut registry = registry_with(vec![
            RecordingPlugin::new("a", &log),
            RecordingPlugin::new("b", &log).failing("init"),
            RecordingPlugin::new("c", &log),
        ]);

        let report = registry.init_all().await;

        assert_eq!(report.succeeded, vec!["a", "c"]);
        assert_eq!(report.failed_plugins(), vec!["b"]);
        assert_eq!(registry.state_of("a"), Some(PluginState::Initialized));
        assert_eq!(registry.state_of("b"), Some(PluginState::Failed));
        assert_eq!(registry.state_of("c"), Some(PluginState::Initialized));
        assert_eq!(*log.lock(), vec!["a:init", "b:init", "c:init"]);
    }

    #[tokio::test]
    async fn test_start_all_skips_failed_plugins() {
        let log = Log::default();
        let mut registry = registry_with(vec![
            RecordingPlugin::new("a", &log),
            RecordingPlugin::new("b", &log).failing("init"),
            RecordingPlugin::new("c", &log),
        ]);
        registry.init_all().await;

        let report = registry.start_all().await;

        assert!(report.is_success());
        assert_eq!(report.succeeded, vec!["a", "c"]);
        assert_eq!(report.skipped, vec!["b"]);
        assert_eq!(registry.state_of("c"), Some(PluginState::Started));
    }

    #[tokio::test]
    async fn test_start_failure_does_not_block_siblings() {
        let log = Log::default();
        let mut registry = registry_with(vec![
            RecordingPlugin::new("a", &log).failing("start"),
            RecordingPlugin::new("b", &log),
        ]);
        registry.init_all().await;

        let report = registry.start_all().await;

        assert_eq!(report.failed_plugins(), vec!["a"]);
        assert_eq!(registry.state_of("a"), Some(PluginState::Failed));
        assert_eq!(registry.state_of("b"), Some(PluginState::Started));
    }

    #[tokio::test]
    async fn test_destroy_all_runs_in_reverse_order() {
        let log = Log::default();
        let mut registry = registry_with(vec![
            RecordingPlugin::new("a", &log),
            RecordingPlugin::new("b", &log),
            RecordingPlugin::new("c", &log),
        ]);
        registry.init_all().await;
        registry.start_all().await;
        log.lock().clear();

        let report = registry.destroy_all().await;

        assert!(report.is_success());
        assert_eq!(report.succeeded, vec!["c", "b", "a"]);
        assert_eq!(
            *log.lock(),
            vec!["c:stop", "b:stop", "a:stop", "c:destroy", "b:destroy", "a:destroy"]
        );
        assert!(registry
            .plugin_states()
            .iter()
            .all(|(_, state)| *state == PluginState::Destroyed));
    }

    #[tokio::test]
    async fn test_destroy_all_after_failures() {
        let log = Log::default();
        let mut registry = registry_with(vec![
            RecordingPlugin::new("a", &log),
            RecordingPlugin::new("b", &log).failing("init"),
            RecordingPlugin::new("c", &log).failing("stop"),
        ]);
        registry.init_all().await;
        registry.start_all().await;
        log.lock().clear();

        let report = registry.destroy_all().await;

        assert_eq!(report.succeeded, vec!["c", "b", "a"]);
        assert_eq!(report.failed_plugins(), vec!["c"]);
        assert_eq!(report.failures[0].phase, LifecyclePhase::Stop);
        assert_eq!(
            *log.lock(),
            vec!["c:stop", "a:stop", "c:destroy", "b:destroy", "a:destroy"]
        );
    }

    #[tokio::test]
    async fn test_stop_all_then_resume() {
        let log = Log::default();
        let mut registry = registry_with(vec![
            RecordingPlugin::new("a", &log),
            RecordingPlugin::new("b", &log),
        ]);
        registry.init_all().await;
        registry.start_all().await;

        let stopped = registry.stop_all().await;
        assert_eq!(stopped.succeeded, vec!["b", "a"]);
        assert_eq!(registry.state_of("a"), Some(PluginState::Stopped));

        let second = registry.stop_all().await;
        assert_eq!(second.skipped, vec!["b", "a"]);

        let resumed = registry.start_all().await;
        assert_eq!(resumed.succeeded, vec!["a", "b"]);
        assert_eq!(registry.state_of("b"), Some(PluginState::Started));
    }

    #[tokio::test]
    async fn test_plugins_receive_own_options() {
        let log = Log::default();
        let mut options = HashMap::new();
        options.insert("b".to_string(), PluginOptions::new().with("tag", "bee"));

        let mut registry = PluginRegistry::new(EventBus::new()).with_options(options);
        registry.add_plugin(RecordingPlugin::new("a", &log)).unwrap();
        registry.add_plugin(RecordingPlugin::new("b", &log)).unwrap();

        registry.init_all().await;

        assert_eq!(*log.lock(), vec!["a:init", "b:tag=bee", "b:init"]);
    }

    #[tokio::test]
    async fn test_late_registration_only_inits_new_plugin() {
        let log = Log::default();
        let mut registry = registry_with(vec![RecordingPlugin::new("a", &log)]);
        registry.init_all().await;

        registry.add_plugin(RecordingPlugin::new("b", &log)).unwrap();
        let report = registry.init_all().await;

        assert_eq!(report.succeeded, vec!["b"]);
        assert_eq!(report.skipped, vec!["a"]);
        assert_eq!(*log.lock(), vec!["a:init", "b:init"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_init() {
        let log = Log::default();
        let bus = EventBus::new();
        let config = RegistryConfig::new().with_init_order(InitOrder::Concurrent);
        let mut registry = PluginRegistry::with_config(bus, config);
        for name in ["a", "b", "c"] {
            registry
                .add_plugin(RecordingPlugin::new(name, &log).slow_init(Duration::from_millis(100)))
                .unwrap();
        }

        let started = tokio::time::Instant::now();
        let report = registry.init_all().await;

        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(report.succeeded, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_plugin_failed() {
        let log = Log::default();
        let config = RegistryConfig::new().with_timeout(Duration::from_secs(1));
        let mut registry = PluginRegistry::with_config(EventBus::new(), config);
        registry
            .add_plugin(RecordingPlugin::new("slow", &log).slow_init(Duration::from_secs(5)))
            .unwrap();
        registry.add_plugin(RecordingPlugin::new("fast", &log)).unwrap();

        let report = registry.init_all().await;

        assert!(matches!(
            report.failure_for("slow").map(|f| &f.error),
            Some(NavError::TimeoutError(_))
        ));
        assert_eq!(registry.state_of("slow"), Some(PluginState::Failed));
        assert_eq!(registry.state_of("fast"), Some(PluginState::Initialized));
    }
}
