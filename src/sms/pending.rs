use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;

/// Numbers whose session is being created right now.
///
/// Reservation marks a number before its transaction commits, so an SMS that
/// arrives in that window retries the session lookup instead of becoming an
/// orphan. Entries expire after the configured TTL.
#[derive(Debug, Clone)]
pub struct PendingSessions {
    entries: Arc<DashMap<String, Instant>>,
    ttl: Duration,
}

impl PendingSessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Mark a normalized number as pending.
    pub fn mark(&self, number: &str) {
        self.entries
            .insert(number.to_string(), Instant::now() + self.ttl);
    }

    /// Whether a live mark exists. Expired marks are removed.
    pub fn is_pending(&self, number: &str) -> bool {
        let now = Instant::now();
        let live = self
            .entries
            .get(number)
            .map(|deadline| *deadline > now)
            .unwrap_or(false);
        if !live {
            self.entries.remove_if(number, |_, deadline| *deadline <= now);
        }
        live
    }

    /// Drop expired marks.
    pub fn purge(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, deadline| *deadline > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
