use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Number of remembered message ids above which a prune is attempted.
pub const DEFAULT_RECENT_CAPACITY: usize = 10_000;

/// An event is stale when it is strictly older than `threshold`.
///
/// Timestamps ahead of `now` (clock skew) count as fresh.
pub fn is_stale(event_timestamp: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    let age = now.signed_duration_since(event_timestamp);
    match chrono::Duration::from_std(threshold) {
        Ok(limit) => age > limit,
        Err(_) => false,
    }
}

/// Message ids seen within the staleness window.
///
/// The provider redelivers events it thinks were not acknowledged; an id seen again
/// while still fresh is a duplicate. Ids older than the window need no tracking since
/// the staleness check drops them anyway.
///
/// Over capacity, a prune runs at most once per window: while every id is still fresh
/// there is nothing to drop, so a burst only grows the map instead of rescanning it.
#[derive(Debug, Clone)]
pub struct RecentMessages {
    seen: Arc<DashMap<String, DateTime<Utc>>>,
    /// Unix millis of the last prune
    last_pruned: Arc<AtomicI64>,
    window: Duration,
    capacity: usize,
}

impl RecentMessages {
    pub fn new(window: Duration) -> Self {
        Self::with_capacity(window, DEFAULT_RECENT_CAPACITY)
    }

    pub fn with_capacity(window: Duration, capacity: usize) -> Self {
        Self {
            seen: Arc::new(DashMap::new()),
            last_pruned: Arc::new(AtomicI64::new(i64::MIN)),
            window,
            capacity: capacity.max(1),
        }
    }

    /// Records `message_id`; returns `false` if it was already seen inside the window.
    pub fn first_sighting(&self, message_id: &str, now: DateTime<Utc>) -> bool {
        if self.seen.len() >= self.capacity && self.prune_due(now) {
            self.prune(now);
        }

        let mut first = true;
        self.seen
            .entry(message_id.to_string())
            .and_modify(|seen_at| {
                if is_stale(*seen_at, now, self.window) {
                    *seen_at = now;
                } else {
                    first = false;
                }
            })
            .or_insert(now);
        first
    }

    /// Claims the next prune if a full window has passed since the last one.
    fn prune_due(&self, now: DateTime<Utc>) -> bool {
        let now_ms = now.timestamp_millis();
        let window_ms = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);
        let last = self.last_pruned.load(Ordering::Acquire);
        if last != i64::MIN && now_ms.saturating_sub(last) < window_ms {
            return false;
        }
        self.last_pruned
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Drops ids older than the window.
    pub fn prune(&self, now: DateTime<Utc>) {
        let window = self.window;
        self.seen.retain(|_, seen_at| !is_stale(*seen_at, now, window));
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
