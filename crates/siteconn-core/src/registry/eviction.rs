use super::store::SessionKey;

/// Decides which registered sessions to drop after an insert.
///
/// `entries` pairs every key with its last-use tick; larger ticks are more
/// recent.
pub trait EvictionPolicy: Send + Sync {
    fn select_victims(&self, entries: &[(SessionKey, u64)]) -> Vec<SessionKey>;

    /// Policies that never evict can skip the per-insert snapshot.
    fn is_bounded(&self) -> bool {
        true
    }
}

/// Keeps every session for the life of the registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unbounded;

impl EvictionPolicy for Unbounded {
    fn select_victims(&self, _entries: &[(SessionKey, u64)]) -> Vec<SessionKey> {
        Vec::new()
    }

    fn is_bounded(&self) -> bool {
        false
    }
}

/// Keeps at most `max` sessions, dropping the least recently used.
#[derive(Debug, Clone, Copy)]
pub struct LruCap {
    max: usize,
}

impl LruCap {
    pub fn new(max: usize) -> Self {
        Self { max: max.max(1) }
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

impl EvictionPolicy for LruCap {
    fn select_victims(&self, entries: &[(SessionKey, u64)]) -> Vec<SessionKey> {
        if entries.len() <= self.max {
            return Vec::new();
        }
        let mut by_age: Vec<&(SessionKey, u64)> = entries.iter().collect();
        by_age.sort_by_key(|(_, tick)| *tick);
        by_age
            .into_iter()
            .take(entries.len() - self.max)
            .map(|(key, _)| key.clone())
            .collect()
    }
}
