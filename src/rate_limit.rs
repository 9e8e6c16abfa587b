use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding window in-memory rate limiter (pod local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// Per-action limits derived from env.
#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub intake_limit: usize,
    pub intake_window: Duration,
    pub ticket_limit: usize,
    pub ticket_window: Duration,
    pub photo_limit: usize,
    pub photo_window: Duration,
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        fn usize_env(name: &str, default: usize) -> usize {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn dur_env(name: &str, default: u64) -> Duration {
            Duration::from_secs(std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default))
        }
        Self {
            intake_limit: usize_env("RL_INTAKE_LIMIT", 5),
            intake_window: dur_env("RL_INTAKE_WINDOW", 3600),
            ticket_limit: usize_env("RL_TICKET_LIMIT", 10),
            ticket_window: dur_env("RL_TICKET_WINDOW", 60),
            photo_limit: usize_env("RL_PHOTO_LIMIT", 20),
            photo_window: dur_env("RL_PHOTO_WINDOW", 3600),
        }
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self {
        Self { limiter, cfg }
    }
    pub fn allow_intake(&self, ip: &str) -> bool {
        self.limiter.check(&format!("intake:{ip}"), self.cfg.intake_limit, self.cfg.intake_window)
    }
    pub fn allow_ticket(&self, ip: &str) -> bool {
        self.limiter.check(&format!("ticket:{ip}"), self.cfg.ticket_limit, self.cfg.ticket_window)
    }
    pub fn allow_photo(&self, ip: &str) -> bool {
        self.limiter.check(&format!("photo:{ip}"), self.cfg.photo_limit, self.cfg.photo_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn sliding_window_basic() {
        let rl = InMemoryRateLimiter::new(true);
        let window = Duration::from_millis(50);
        for _ in 0..3 {
            assert!(rl.check("k", 3, window));
        }
        assert!(!rl.check("k", 3, window));
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let rl = InMemoryRateLimiter::new(false);
        for _ in 0..100 {
            assert!(rl.check("k", 1, Duration::from_secs(60)));
        }
    }
}
