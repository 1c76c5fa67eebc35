//! Diagnostic events
//!
//! Fired once per transition by the manager. Sinks must not call back into
//! the manager; they observe, they don't act.

use crate::context::LoadMode;
use crate::error::LoadError;
use parking_lot::Mutex;
use std::time::Duration;

/// Why a resident asset was dropped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvictReason {
    /// `unload` was called
    Explicit,
    /// Not accessed within the idle timeout
    Idle,
    /// Resident bytes exceeded the memory budget
    Budget,
}

/// Lifecycle event emitted by the streaming manager
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// A load was scheduled (or started inline)
    Requested {
        type_name: &'static str,
        key: String,
        mode: LoadMode,
        reload: bool,
    },
    /// A load completed and the payload is attached
    Ready {
        type_name: &'static str,
        key: String,
        byte_size: usize,
        load_time: Duration,
        generation: u32,
    },
    /// A load attempt failed
    Failed {
        type_name: &'static str,
        key: String,
        reason: LoadError,
    },
    /// A ready or failed entry was unloaded
    Evicted {
        type_name: &'static str,
        key: String,
        reason: EvictReason,
    },
}

impl StreamEvent {
    /// Key of the asset the event is about
    pub fn key(&self) -> &str {
        match self {
            Self::Requested { key, .. }
            | Self::Ready { key, .. }
            | Self::Failed { key, .. }
            | Self::Evicted { key, .. } => key,
        }
    }

    /// Asset type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Requested { type_name, .. }
            | Self::Ready { type_name, .. }
            | Self::Failed { type_name, .. }
            | Self::Evicted { type_name, .. } => type_name,
        }
    }
}

/// Receiver of diagnostic events
///
/// Called from whichever thread made the transition, including workers.
pub trait DiagnosticSink: Send + Sync {
    fn on_event(&self, event: &StreamEvent);
}

/// Sink that buffers events until drained
#[derive(Default)]
pub struct EventQueue {
    events: Mutex<Vec<StreamEvent>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all buffered events, oldest first
    pub fn drain(&self) -> Vec<StreamEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl DiagnosticSink for EventQueue {
    fn on_event(&self, event: &StreamEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Sink forwarding every event to the `log` facade at trace level
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn on_event(&self, event: &StreamEvent) {
        log::trace!("{:?}", event);
    }
}
