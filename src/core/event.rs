//! Event system
//!
//! Events are routed by their `category:action` type string. Dispatch is
//! synchronous: `emit` returns only after every handler subscribed at the
//! moment of the call has run.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

use crate::error::{NavError, Result};

/// Well-known event types used by the bundled plugins and UI bindings.
pub mod types {
    pub const GESTURE_SWIPE_LEFT: &str = "gesture:swipe_left";
    pub const GESTURE_SWIPE_RIGHT: &str = "gesture:swipe_right";
    pub const KEYBOARD_KEYDOWN: &str = "keyboard:keydown";
    pub const INTENT_NAVIGATE_LEFT: &str = "intent:navigate_left";
    pub const INTENT_NAVIGATE_RIGHT: &str = "intent:navigate_right";
    pub const INTENT_SELECT: &str = "intent:select";
    pub const INTENT_BACK: &str = "intent:back";
    pub const COGNITIVE_STATE_CHANGE: &str = "cognitive:state_change";
}

/// A timestamped, typed message flowing through the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: u64,
    pub payload: Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: now_millis(),
            payload,
        }
    }

    /// The part before the first `:`, or the whole type when there is none.
    pub fn category(&self) -> &str {
        self.event_type
            .split_once(':')
            .map_or(self.event_type.as_str(), |(category, _)| category)
    }

    pub fn action(&self) -> Option<&str> {
        self.event_type.split_once(':').map(|(_, action)| action)
    }

    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| NavError::HandlerError(format!("payload mismatch: {}", e)))
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub type HandlerResult = Result<()>;

/// Shared handler reference. Keep a clone of it to remove the registration
/// later with [`EventBus::off`].
pub type EventHandler = Arc<dyn Fn(&Event) -> HandlerResult + Send + Sync>;

pub fn handler<F>(f: F) -> EventHandler
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

#[derive(Clone)]
struct Entry {
    id: SubscriptionId,
    handler: EventHandler,
    /// Set for `once` registrations; flips on the first dispatch.
    fired: Option<Arc<AtomicBool>>,
}

/// Per-type subscriber lists are copied on write, so a dispatch pass keeps a
/// stable snapshot while handlers subscribe or unsubscribe.
#[derive(Default)]
struct BusInner {
    subscriptions: Mutex<HashMap<String, Arc<Vec<Entry>>>>,
    next_id: AtomicU64,
    event_count: AtomicU64,
    handler_failures: AtomicU64,
}

impl BusInner {
    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn insert(&self, event_type: &str, entry: Entry) {
        let mut subs = self.subscriptions.lock();
        let list = subs.entry(event_type.to_string()).or_default();
        Arc::make_mut(list).push(entry);
    }

    fn remove_where<P>(&self, event_type: &str, mut pred: P) -> usize
    where
        P: FnMut(&Entry) -> bool,
    {
        let mut subs = self.subscriptions.lock();
        let Some(list) = subs.get_mut(event_type) else {
            return 0;
        };

        if !list.iter().any(&mut pred) {
            return 0;
        }

        let before = list.len();
        Arc::make_mut(list).retain(|entry| !pred(entry));
        let removed = before - list.len();

        if list.is_empty() {
            subs.remove(event_type);
        }
        removed
    }

    fn snapshot(&self, event_type: &str) -> Option<Arc<Vec<Entry>>> {
        self.subscriptions.lock().get(event_type).cloned()
    }
}

/// Synchronous, in-process publish/subscribe channel.
///
/// Cloning is cheap and yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps and dispatches an event. Returns how many handlers were invoked.
    pub fn emit(&self, event_type: impl Into<String>, payload: Value) -> usize {
        self.emit_event(Event::new(event_type, payload))
    }

    /// Dispatches an already constructed event to the subscribers of its type.
    ///
    /// Handler failures (returned errors and panics) are logged and counted;
    /// they never stop the remaining handlers or later emits.
    pub fn emit_event(&self, event: Event) -> usize {
        self.inner.event_count.fetch_add(1, Ordering::Relaxed);

        let Some(snapshot) = self.inner.snapshot(&event.event_type) else {
            trace!(event_type = %event.event_type, "no subscribers");
            return 0;
        };

        let mut invoked = 0;
        for entry in snapshot.iter() {
            if let Some(fired) = &entry.fired {
                if fired.swap(true, Ordering::SeqCst) {
                    continue;
                }
                self.inner.remove_where(&event.event_type, |e| e.id == entry.id);
            }
            invoked += 1;

            let outcome = catch_unwind(AssertUnwindSafe(|| (entry.handler)(&event)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(panic) => Some(NavError::HandlerError(panic_message(panic.as_ref()))),
            };

            if let Some(e) = failure {
                self.inner.handler_failures.fetch_add(1, Ordering::Relaxed);
                let err = e.in_event(&event.event_type);
                warn!(
                    event_type = %event.event_type,
                    subscription = %entry.id,
                    error = %err,
                    "event handler failed"
                );
            }
        }

        invoked
    }

    /// Registers a closure for `event_type`.
    pub fn on<F>(&self, event_type: impl Into<String>, f: F) -> Subscription
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe(event_type, Arc::new(f))
    }

    /// Registers a shared handler. The same handler may be registered more
    /// than once; each registration gets its own [`Subscription`].
    pub fn subscribe(&self, event_type: impl Into<String>, handler: EventHandler) -> Subscription {
        let event_type = event_type.into();
        let id = self.inner.next_id();
        self.inner.insert(&event_type, Entry { id, handler, fired: None });
        trace!(%event_type, subscription = %id, "subscribed");
        self.subscription(event_type, id)
    }

    /// Registers a handler that removes itself on its first invocation.
    pub fn once<F>(&self, event_type: impl Into<String>, f: F) -> Subscription
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        let id = self.inner.next_id();
        let entry = Entry {
            id,
            handler: Arc::new(f),
            fired: Some(Arc::new(AtomicBool::new(false))),
        };
        self.inner.insert(&event_type, entry);
        self.subscription(event_type, id)
    }

    /// Removes every registration of `handler` for `event_type`, matching by
    /// pointer identity. Returns whether anything was removed.
    pub fn off(&self, event_type: &str, handler: &EventHandler) -> bool {
        self.inner
            .remove_where(event_type, |entry| Arc::ptr_eq(&entry.handler, handler))
            > 0
    }

    /// Removes all subscriptions for one type, or for every type.
    pub fn clear(&self, event_type: Option<&str>) {
        let mut subs = self.inner.subscriptions.lock();
        match event_type {
            Some(event_type) => {
                subs.remove(event_type);
            }
            None => subs.clear(),
        }
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.inner
            .subscriptions
            .lock()
            .get(event_type)
            .map_or(0, |list| list.len())
    }

    pub fn has_subscribers(&self, event_type: &str) -> bool {
        self.subscriber_count(event_type) > 0
    }

    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.inner.subscriptions.lock().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn processed_events(&self) -> u64 {
        self.inner.event_count.load(Ordering::Relaxed)
    }

    pub fn handler_failures(&self) -> u64 {
        self.inner.handler_failures.load(Ordering::Relaxed)
    }

    /// Non-owning handle, for handlers that emit on the bus they are stored in.
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn subscription(&self, event_type: String, id: SubscriptionId) -> Subscription {
        Subscription {
            bus: Arc::downgrade(&self.inner),
            event_type,
            id,
            active: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("event_types", &self.event_types())
            .field("processed_events", &self.processed_events())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct WeakEventBus {
    inner: Weak<BusInner>,
}

impl WeakEventBus {
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }
}

/// Capability that removes exactly one registration.
///
/// Dropping it leaves the handler subscribed.
#[derive(Clone)]
pub struct Subscription {
    bus: Weak<BusInner>,
    event_type: String,
    id: SubscriptionId,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Safe to call any number of times, and after the bus is gone.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        let id = self.id;
        self.bus
            .upgrade()
            .is_some_and(|inner| inner.remove_where(&self.event_type, |entry| entry.id == id) > 0)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event_type", &self.event_type)
            .field("id", &self.id)
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", msg)
    } else {
        "handler panicked".to_string()
    }
}
