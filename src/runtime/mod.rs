//! Runtime module: plugin orchestration and the core facade

pub mod app;
pub mod registry;
pub mod report;

pub use app::{shutdown_signal, CoreBuilder, CoreConfig, CoreState, NavCore};
pub use registry::{InitOrder, PluginRegistry, RegistryConfig};
pub use report::{LifecyclePhase, LifecycleReport, PluginFailure};
