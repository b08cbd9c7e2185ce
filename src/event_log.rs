//! Resolution audit trail
//!
//! - Event: envelope with id + timestamp + kind
//! - EventKind: service level and key level events
//! - EventLog: thread-safe, append-only log shared by a service tree

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the resolution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All event types
///
/// `path` identifies the service instance inside the tree (`root`,
/// `root.client`, `root.lists.0`, …).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // SERVICE LEVEL
    // ═══════════════════════════════════════════
    ServiceStarted {
        path: Arc<str>,
        service: String,
        inputs: Vec<String>,
    },
    ServiceCompleted {
        path: Arc<str>,
        service: String,
        error_count: usize,
    },
    ChildAttached {
        path: Arc<str>,
        key: String,
        service: String,
    },

    // ═══════════════════════════════════════════
    // KEY LEVEL
    // ═══════════════════════════════════════════
    LoaderInvoked {
        path: Arc<str>,
        key: String,
    },
    RulesEvaluated {
        path: Arc<str>,
        key: String,
        rules: usize,
        messages: usize,
    },
    KeyValidated {
        path: Arc<str>,
        key: String,
        valid: bool,
        value: Option<Value>,
    },
    CallbackRun {
        path: Arc<str>,
        key: String,
        after_commit: bool,
    },
}

impl EventKind {
    /// Service instance the event belongs to
    pub fn path(&self) -> &str {
        match self {
            Self::ServiceStarted { path, .. }
            | Self::ServiceCompleted { path, .. }
            | Self::ChildAttached { path, .. }
            | Self::LoaderInvoked { path, .. }
            | Self::RulesEvaluated { path, .. }
            | Self::KeyValidated { path, .. }
            | Self::CallbackRun { path, .. } => path,
        }
    }

    /// Key the event is about, for key level events
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::LoaderInvoked { key, .. }
            | Self::RulesEvaluated { key, .. }
            | Self::KeyValidated { key, .. }
            | Self::CallbackRun { key, .. }
            | Self::ChildAttached { key, .. } => Some(key),
            Self::ServiceStarted { .. } | Self::ServiceCompleted { .. } => None,
        }
    }

    pub fn is_service_event(&self) -> bool {
        matches!(
            self,
            Self::ServiceStarted { .. } | Self::ServiceCompleted { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    /// Get all events (cloned)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Events of one service instance
    pub fn filter_path(&self, path: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.path() == path)
            .collect()
    }

    /// Events about one key of one service instance
    pub fn filter_key(&self, path: &str, key: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.path() == path && e.kind.key() == Some(key))
            .collect()
    }

    pub fn service_events(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.is_service_event())
            .collect()
    }

    /// Count events matching a predicate
    pub fn count(&self, pred: impl Fn(&EventKind) -> bool) -> usize {
        self.events.read().iter().filter(|e| pred(&e.kind)).count()
    }

    /// Serialize to JSON for `--events` output
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}
