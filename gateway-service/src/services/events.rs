//! Debug event bus: bounded ring buffer plus live broadcast.
//!
//! Every pipeline transition lands here so the debug dashboard and tests can
//! reconstruct request lineage. `emit` never fails into the caller's control
//! flow; buffer eviction is FIFO and subscribers that fall behind or
//! disconnect are dropped by the broadcast channel, not by the publisher.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use crate::models::event::{DebugEvent, DebugEventType};

pub const DEFAULT_FEED_LIMIT: usize = 100;
pub const MAX_FEED_LIMIT: usize = 500;

/// Retrieval filter for the polling feed.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<DebugEventType>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
    pub limit: Option<usize>,
}

impl EventFilter {
    fn matches(&self, event: &DebugEvent) -> bool {
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(session_id) = &self.session_id {
            if event.session_id.as_deref() != Some(session_id.as_str()) {
                return false;
            }
        }
        if let Some(correlation_id) = &self.correlation_id {
            if event.correlation_id.as_deref() != Some(correlation_id.as_str()) {
                return false;
            }
        }
        true
    }
}

struct BusInner {
    capacity: usize,
    ring: RwLock<VecDeque<DebugEvent>>,
    sender: broadcast::Sender<DebugEvent>,
}

#[derive(Clone)]
pub struct DebugEventBus {
    inner: Arc<BusInner>,
}

impl DebugEventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(BusInner {
                capacity,
                ring: RwLock::new(VecDeque::with_capacity(capacity)),
                sender,
            }),
        }
    }

    /// Record and broadcast an event. Best-effort: a poisoned buffer lock or
    /// the absence of live subscribers is logged (or ignored) and never
    /// surfaces to the caller.
    pub fn emit(&self, event: DebugEvent) {
        match self.inner.ring.write() {
            Ok(mut ring) => {
                if ring.len() == self.inner.capacity {
                    ring.pop_front();
                }
                ring.push_back(event.clone());
            }
            Err(poisoned) => {
                tracing::warn!("Debug event ring lock poisoned; recovering");
                let mut ring = poisoned.into_inner();
                if ring.len() == self.inner.capacity {
                    ring.pop_front();
                }
                ring.push_back(event.clone());
            }
        }

        // send() errors only when no receiver is subscribed.
        let _ = self.inner.sender.send(event);
    }

    /// Filtered feed, most recent first.
    pub fn recent(&self, filter: &EventFilter) -> Vec<DebugEvent> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_FEED_LIMIT)
            .min(MAX_FEED_LIMIT);
        let ring = match self.inner.ring.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        ring.iter()
            .rev()
            .filter(|event| filter.matches(event))
            .take(limit)
            .cloned()
            .collect()
    }

    /// All buffered events for one session in chronological order.
    pub fn timeline(&self, session_id: &str) -> Vec<DebugEvent> {
        let ring = match self.inner.ring.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        ring.iter()
            .filter(|event| event.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DebugEvent> {
        self.inner.sender.subscribe()
    }

    pub fn clear(&self) {
        match self.inner.ring.write() {
            Ok(mut ring) => ring.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.ring.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
