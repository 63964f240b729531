//! Aggregate outcome of a lifecycle fan-out.

use std::fmt;

use crate::error::{NavError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Init,
    Start,
    Stop,
    Destroy,
}

impl LifecyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecyclePhase::Init => "init",
            LifecyclePhase::Start => "start",
            LifecyclePhase::Stop => "stop",
            LifecyclePhase::Destroy => "destroy",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct PluginFailure {
    pub plugin: String,
    pub phase: LifecyclePhase,
    pub error: NavError,
}

/// What happened to each plugin during one `*_all` pass.
///
/// Lists keep the order in which plugins were visited.
#[derive(Debug)]
pub struct LifecycleReport {
    pub phase: LifecyclePhase,
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
    pub failures: Vec<PluginFailure>,
}

impl LifecycleReport {
    pub fn new(phase: LifecyclePhase) -> Self {
        Self {
            phase,
            succeeded: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, plugin: &str, phase: LifecyclePhase, outcome: Result<()>) {
        match outcome {
            Ok(()) => self.succeeded.push(plugin.to_string()),
            Err(error) => self.failures.push(PluginFailure {
                plugin: plugin.to_string(),
                phase,
                error,
            }),
        }
    }

    pub(crate) fn skip(&mut self, plugin: &str) {
        self.skipped.push(plugin.to_string());
    }

    /// Folds failures of an earlier pass (e.g. the stop pass of a teardown) into this one.
    pub(crate) fn absorb_failures(&mut self, other: LifecycleReport) {
        self.failures.extend(other.failures);
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_plugins(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.plugin.as_str()).collect()
    }

    pub fn failure_for(&self, plugin: &str) -> Option<&PluginFailure> {
        self.failures.iter().find(|f| f.plugin == plugin)
    }

    /// Turns a report with failures into `NavError::LifecycleFailed`.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(NavError::LifecycleFailed(Box::new(self)))
        }
    }
}

impl fmt::Display for LifecycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pass: {} ok, {} skipped, {} failed",
            self.phase,
            self.succeeded.len(),
            self.skipped.len(),
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "; {} ({}): {}", failure.plugin, failure.phase, failure.error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_collects_outcomes() {
        let mut report = LifecycleReport::new(LifecyclePhase::Init);
        report.record("a", LifecyclePhase::Init, Ok(()));
        report.record("b", LifecyclePhase::Init, Err(NavError::Other("no device".into())));
        report.skip("c");

        assert!(!report.is_success());
        assert_eq!(report.succeeded, vec!["a"]);
        assert_eq!(report.skipped, vec!["c"]);
        assert_eq!(report.failed_plugins(), vec!["b"]);
        assert!(report.failure_for("b").is_some());
        assert!(report.failure_for("a").is_none());

        let text = report.to_string();
        assert!(text.starts_with("init pass: 1 ok, 1 skipped, 1 failed"));
        assert!(text.contains("b (init): no device"));
    }

    #[test]
    fn test_into_result() {
        let ok = LifecycleReport::new(LifecyclePhase::Start);
        assert!(ok.into_result().is_ok());

        let mut bad = LifecycleReport::new(LifecyclePhase::Start);
        bad.record("voice", LifecyclePhase::Start, Err(NavError::Other("mic denied".into())));
        match bad.into_result() {
            Err(NavError::LifecycleFailed(report)) => assert_eq!(report.failed_plugins(), vec!["voice"]),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_absorb_failures() {
        let mut stop = LifecycleReport::new(LifecyclePhase::Stop);
        stop.record("a", LifecyclePhase::Stop, Err(NavError::Other("stuck".into())));

        let mut destroy = LifecycleReport::new(LifecyclePhase::Destroy);
        destroy.record("a", LifecyclePhase::Destroy, Ok(()));
        destroy.absorb_failures(stop);

        assert_eq!(destroy.succeeded, vec!["a"]);
        assert_eq!(destroy.failures[0].phase, LifecyclePhase::Stop);
    }
}
