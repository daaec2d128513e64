//! Request-scoped membership lookups are cheap, but the set of community ids
//! an identity belongs to is read on nearly every search. This keyed TTL
//! cache memoizes it; membership mutations delete or append the affected key.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    ids: Vec<String>,
    expires_at: Instant,
}

pub struct IdentityCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl IdentityCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the cached ids, dropping the entry if it has expired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<String>> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.ids.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, ids: Vec<String>) {
        self.entries().insert(
            key.to_string(),
            Entry {
                ids,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) {
        self.entries().remove(key);
    }

    /// Appends an id to a warm entry. A cold or expired key is left alone;
    /// the next read repopulates it.
    pub fn append(&self, key: &str, id: &str) {
        let mut entries = self.entries();
        let expired = entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= Instant::now());
        if expired {
            entries.remove(key);
            return;
        }
        if let Some(entry) = entries.get_mut(key) {
            if !entry.ids.iter().any(|existing| existing == id) {
                entry.ids.push(id.to_string());
            }
        }
    }
}
