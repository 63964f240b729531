//! Timer-driven swipe generator for demos and tests.
//!
//! Emits `gesture:swipe_left` and `gesture:swipe_right` alternately, starting
//! with left, one event per interval.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::context::require_context;
use crate::core::event::types::{GESTURE_SWIPE_LEFT, GESTURE_SWIPE_RIGHT};
use crate::core::{Context, EventBus, Plugin};
use crate::error::{NavError, Result};

pub const NAME: &str = "mock-gesture";

const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct MockGesturePlugin {
    interval: Duration,
    sequence: Arc<AtomicU64>,
    ctx: Option<Context>,
    worker: Option<Worker>,
}

impl MockGesturePlugin {
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            sequence: Arc::new(AtomicU64::new(0)),
            ctx: None,
            worker: None,
        }
    }

    /// Default interval; an `interval_ms` option given at init overrides it.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn emitted(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl Default for MockGesturePlugin {
    fn default() -> Self {
        Self::new()
    }
}

async fn run(bus: EventBus, period: Duration, sequence: Arc<AtomicU64>, cancel: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let n = sequence.fetch_add(1, Ordering::Relaxed);
                let (event_type, direction) = if n % 2 == 0 {
                    (GESTURE_SWIPE_LEFT, "left")
                } else {
                    (GESTURE_SWIPE_RIGHT, "right")
                };
                bus.emit(event_type, json!({ "direction": direction, "sequence": n, "source": NAME }));
            }
        }
    }
}

#[async_trait]
impl Plugin for MockGesturePlugin {
    fn name(&self) -> &str {
        NAME
    }

    async fn init(&mut self, ctx: Context) -> Result<()> {
        if let Some(ms) = ctx.options().get::<u64>("interval_ms")? {
            if ms == 0 {
                return Err(NavError::ConfigError(format!("{}: interval_ms must be positive", NAME)));
            }
            self.interval = Duration::from_millis(ms);
        }
        debug!(plugin = NAME, interval = ?self.interval, "configured");
        self.ctx = Some(ctx);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        crate::runtime_check()?;
        let ctx = require_context(&self.ctx, NAME, "start")?;
        if self.worker.is_some() {
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            ctx.event_bus().clone(),
            self.interval,
            Arc::clone(&self.sequence),
            cancel.clone(),
        ));
        self.worker = Some(Worker { cancel, handle });
        Ok(())
    }

    /// Returns once the timer task has exited, so no event follows a completed stop.
    async fn stop(&mut self) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            worker.cancel.cancel();
            worker
                .handle
                .await
                .map_err(|e| NavError::RuntimeError(format!("{} timer task: {}", NAME, e)))?;
        }
        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        self.stop().await?;
        self.ctx = None;
        Ok(())
    }
}

impl Drop for MockGesturePlugin {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.cancel.cancel();
        }
    }
}
