use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Unique identifier for a connection, of either kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

/// Allocates [`ConnectionId`]s. Cheaply cloneable; clones share the same
/// sequence, so the listener task and the outbound connector can both hold
/// one without ever producing a duplicate id.
#[derive(Clone, Debug)]
pub struct ConnectionIdGenerator {
    next: Arc<AtomicU64>,
}

impl ConnectionIdGenerator {
    pub fn new(start: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(start)),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
