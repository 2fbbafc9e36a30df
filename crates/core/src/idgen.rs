//! Connection ID generation

use crate::ConnectionId;
use std::sync::atomic::{AtomicU32, Ordering};

/// Thread-safe monotonically increasing ID generator
///
/// IDs start at 1; 0 is never handed out so it can be used as a sentinel
/// in logs and packets.
#[derive(Debug)]
pub struct IdGenerator {
    next_id: AtomicU32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
        }
    }

    /// Get the next available connection ID
    pub fn next_connection_id(&self) -> ConnectionId {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return ConnectionId::new(id);
            }
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
