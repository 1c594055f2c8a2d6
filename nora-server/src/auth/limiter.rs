//! Per-client sliding window over failed login attempts.
//!
//! Client keys come from forwarded headers and can be forged, so the table
//! is swept whenever a new client shows up and never grows past
//! `max_clients`; the client with the oldest last failure is dropped first.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

pub const MAX_LOGIN_ATTEMPTS: usize = 5;
pub const LOGIN_WINDOW: Duration = Duration::from_secs(300);
pub const MAX_TRACKED_CLIENTS: usize = 10_000;

pub struct LoginLimiter {
    max_attempts: usize,
    window: Duration,
    max_clients: usize,
    failures: Mutex<HashMap<String, Vec<Instant>>>,
}

impl std::fmt::Debug for LoginLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LoginLimiter({} clients)", self.tracked_clients())
    }
}

impl Default for LoginLimiter {
    fn default() -> Self {
        Self::new(MAX_LOGIN_ATTEMPTS, LOGIN_WINDOW)
    }
}

impl LoginLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self::with_capacity(max_attempts, window, MAX_TRACKED_CLIENTS)
    }

    pub fn with_capacity(max_attempts: usize, window: Duration, max_clients: usize) -> Self {
        Self { max_attempts, window, max_clients: max_clients.max(1), failures: Mutex::new(HashMap::new()) }
    }

    /// `true` while `client` still has attempts left in the current window.
    pub fn check(&self, client: &str) -> bool {
        let mut map = self.failures.lock();
        let now = Instant::now();
        let Some(times) = map.get_mut(client) else {
            return true;
        };
        times.retain(|t| now.duration_since(*t) < self.window);
        if times.is_empty() {
            map.remove(client);
            return true;
        }
        times.len() < self.max_attempts
    }

    pub fn record_failure(&self, client: &str) {
        let mut map = self.failures.lock();
        let now = Instant::now();
        if let Entry::Occupied(mut entry) = map.entry(client.to_owned()) {
            entry.get_mut().push(now);
            return;
        }

        let window = self.window;
        map.retain(|_, times| {
            times.retain(|t| now.duration_since(*t) < window);
            !times.is_empty()
        });
        while map.len() >= self.max_clients {
            let stalest = map
                .iter()
                .min_by_key(|(_, times)| times.last().copied())
                .map(|(key, _)| key.clone());
            let Some(key) = stalest else { break };
            debug!(client = %key, "login limiter full; dropping stalest client");
            map.remove(&key);
        }
        map.insert(client.to_owned(), vec![now]);
    }

    pub fn clear(&self, client: &str) {
        self.failures.lock().remove(client);
    }

    pub fn tracked_clients(&self) -> usize {
        self.failures.lock().len()
    }
}
