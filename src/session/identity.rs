use std::collections::VecDeque;
use tracing::debug;

const CANCELLED_CAPACITY: usize = 8;

/// Tracks which server-assigned response id is currently authoritative,
/// plus a bounded history of cancelled ids.
///
/// Network delivery is not ordered relative to local interruption
/// decisions: an interrupt can be decided here while the server's audio
/// for the dead turn is still in flight. Every content-bearing event is
/// therefore checked against this tracker before it is allowed any side
/// effect.
#[derive(Debug)]
pub struct ResponseIdentity {
    active: Option<String>,
    awaiting_next: bool,
    cancelled: VecDeque<String>,
}

impl Default for ResponseIdentity {
    fn default() -> Self {
        Self {
            active: None,
            // Nothing is authoritative yet; adopt the first id we see.
            awaiting_next: true,
            cancelled: VecDeque::with_capacity(CANCELLED_CAPACITY),
        }
    }
}

impl ResponseIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Adopt `next` as the authoritative id. When the server did not name
    /// a successor, arm opportunistic adoption of the next valid id.
    pub fn advance(&mut self, next: Option<String>) {
        match next {
            Some(id) => {
                self.active = Some(id);
                self.awaiting_next = false;
            }
            None => {
                self.awaiting_next = true;
            }
        }
    }

    /// Record `id` as dead. Oldest entries are evicted past capacity; an
    /// id old enough to be evicted is also old enough that the server has
    /// long stopped sending for it.
    pub fn mark_cancelled(&mut self, id: impl Into<String>) {
        let id = id.into();
        if self.cancelled.iter().any(|c| *c == id) {
            return;
        }
        if self.cancelled.len() >= CANCELLED_CAPACITY {
            self.cancelled.pop_front();
        }
        self.cancelled.push_back(id);
    }

    pub fn is_cancelled(&self, id: &str) -> bool {
        self.cancelled.iter().any(|c| c == id)
    }

    /// Decide whether an inbound event may take effect. Lifecycle and
    /// error events pass `always_process`; events without an id cannot be
    /// proven stale and pass too. Adoption while awaiting mutates the
    /// tracker, hence `&mut self`.
    pub fn should_accept(&mut self, event_id: Option<&str>, always_process: bool) -> bool {
        if always_process {
            return true;
        }
        let Some(id) = event_id else {
            return true;
        };
        if self.is_cancelled(id) {
            debug!(response_id = id, "dropping event for cancelled response");
            return false;
        }
        if self.awaiting_next || self.active.is_none() {
            self.active = Some(id.to_string());
            self.awaiting_next = false;
            return true;
        }
        if self.active.as_deref() == Some(id) {
            true
        } else {
            debug!(
                response_id = id,
                active = self.active.as_deref(),
                "dropping event for superseded response"
            );
            false
        }
    }
}
