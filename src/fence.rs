//! Request fencing — drop responses that arrive after a newer request for
//! the same resource was dispatched.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Sequence number handed out when a request is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceTicket {
    resource: String,
    seq: u64,
}

impl FenceTicket {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Latest dispatched sequence number per resource.
///
/// Sequence numbers come from one shared counter, so a ticket issued before
/// a resource was forgotten can never match a later dispatch.
#[derive(Debug, Default)]
pub struct RequestFence {
    next: AtomicU64,
    latest: Mutex<HashMap<String, u64>>,
}

impl RequestFence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new dispatch for `resource` and return its ticket.
    pub fn begin(&self, resource: impl Into<String>) -> FenceTicket {
        let resource = resource.into();
        let seq = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest.insert(resource.clone(), seq);
        FenceTicket { resource, seq }
    }

    /// Whether `ticket` is still the newest dispatch for its resource.
    pub fn is_current(&self, ticket: &FenceTicket) -> bool {
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        let current = latest.get(&ticket.resource).copied() == Some(ticket.seq);
        if !current {
            debug!(
                resource = %ticket.resource,
                seq = ticket.seq,
                "Discarding stale response"
            );
        }
        current
    }

    /// Forget every resource with the given prefix (e.g. a torn-down session).
    pub fn forget_prefix(&self, prefix: &str) {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        latest.retain(|resource, _| !resource.starts_with(prefix));
    }
}
