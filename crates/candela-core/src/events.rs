//! Typed callback lists for engine events.
//!
//! The engine publishes a small number of event types during device
//! bring-up (one per discovered physical device, one per validation-layer
//! message). Rather than a listener class hierarchy, each event type gets
//! its own flat registration list: subscribe a closure, keep the returned
//! id if you ever want to unsubscribe.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Identifies a subscribed handler so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// A registration list of callbacks for one event type.
///
/// Emission walks the handlers in subscription order. Handlers must be
/// `Send + Sync`; events may be emitted from any registered thread.
pub struct Callbacks<E> {
    handlers: RwLock<Vec<(u64, Box<dyn Fn(&E) + Send + Sync>)>>,
    next_id: AtomicU64,
}

impl<E> Callbacks<E> {
    /// Create an empty callback list.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a handler, returning an id that can be used to remove it.
    pub fn subscribe(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.write().push((id, Box::new(handler)));
        HandlerId(id)
    }

    /// Remove a previously registered handler. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: HandlerId) {
        self.handlers.write().retain(|(h, _)| *h != id.0);
    }

    /// Invoke every registered handler with the event.
    pub fn emit(&self, event: &E) {
        for (_, handler) in self.handlers.read().iter() {
            handler(event);
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// True if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl<E> Default for Callbacks<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Physical device classification reported during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

/// Published once per enumerated physical device during device selection.
///
/// A handler may claim the device by calling [`DeviceDiscovery::opt_in`];
/// an opted-in device takes priority over the default selection policy.
pub struct DeviceDiscovery {
    /// Position in the enumeration order.
    pub index: usize,
    /// Device name as reported by the driver.
    pub name: String,
    /// Discrete/integrated classification.
    pub kind: DeviceKind,
    /// Total device-local memory in MB.
    pub memory_mb: u64,
    selected: AtomicBool,
}

impl DeviceDiscovery {
    /// Create a discovery record for one enumerated device.
    pub fn new(index: usize, name: String, kind: DeviceKind, memory_mb: u64) -> Self {
        Self {
            index,
            name,
            kind,
            memory_mb,
            selected: AtomicBool::new(false),
        }
    }

    /// Claim this device for selection.
    pub fn opt_in(&self) {
        self.selected.store(true, Ordering::Release);
    }

    /// True if any handler claimed this device.
    pub fn opted_in(&self) -> bool {
        self.selected.load(Ordering::Acquire)
    }
}

/// Severity of a validation-layer debug message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugSeverity {
    Verbose,
    Info,
    Warning,
    Error,
}

/// Category of a validation-layer debug message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCategory {
    General,
    Validation,
    Performance,
}

/// Published for each message produced by the graphics API debug layer.
#[derive(Debug, Clone)]
pub struct DebugMessage {
    pub severity: DebugSeverity,
    pub category: DebugCategory,
    /// Message text from the layer.
    pub message: String,
    /// Names of the API objects referenced by the message, when provided.
    pub objects: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn subscribe_emit_unsubscribe() {
        let calls = Arc::new(AtomicUsize::new(0));
        let bus: Callbacks<u32> = Callbacks::new();

        let seen = calls.clone();
        let id = bus.subscribe(move |v| {
            assert_eq!(*v, 7);
            seen.fetch_add(1, Ordering::Relaxed);
        });

        bus.emit(&7);
        bus.emit(&7);
        assert_eq!(calls.load(Ordering::Relaxed), 2);

        bus.unsubscribe(id);
        bus.emit(&7);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert!(bus.is_empty());
    }

    #[test]
    fn discovery_opt_in() {
        let event = DeviceDiscovery::new(0, "Test GPU".to_string(), DeviceKind::Discrete, 4096);
        assert!(!event.opted_in());
        event.opt_in();
        assert!(event.opted_in());
    }
}
