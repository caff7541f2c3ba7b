//! Rate limiting primitives for auth flows.
//!
//! The limiter is an injected trait object so the throttle store can be
//! swapped (in-memory for a single instance, a shared cache for many) and
//! tests can run deterministically with the noop implementation. The default
//! in-memory store is a best-effort TTL map: approximate, non-durable, and
//! acceptable to lose on restart.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub enum RateLimitAction {
    Signup,
    Login,
    Activate,
    PasswordReset,
    ResendActivation,
}

impl RateLimitAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Login => "login",
            Self::Activate => "activate",
            Self::PasswordReset => "password_reset",
            Self::ResendActivation => "resend_activation",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _email: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

/// Single-process TTL map: one hit per key per window.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    window: Duration,
    last_seen: Mutex<HashMap<String, Instant>>,
}

impl InMemoryRateLimiter {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    fn check_key(&self, key: String) -> RateLimitDecision {
        let now = Instant::now();
        let Ok(mut map) = self.last_seen.lock() else {
            // A poisoned map only loses throttle state; fail open.
            return RateLimitDecision::Allowed;
        };
        map.retain(|_, seen| now.duration_since(*seen) < self.window);
        match map.get(&key) {
            Some(_) => RateLimitDecision::Limited,
            None => {
                map.insert(key, now);
                RateLimitDecision::Allowed
            }
        }
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        match ip {
            Some(ip) => self.check_key(format!("ip:{}:{ip}", action.as_str())),
            // Unknown source addresses are never throttled.
            None => RateLimitDecision::Allowed,
        }
    }

    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        self.check_key(format!("email:{}:{email}", action.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.check_ip(None, RateLimitAction::Signup),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn in_memory_limits_repeat_hits_within_window() {
        let limiter = InMemoryRateLimiter::new(Duration::from_secs(60));
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::ResendActivation),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::ResendActivation),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn in_memory_window_expires() {
        let limiter = InMemoryRateLimiter::new(Duration::from_millis(1));
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::ResendActivation),
            RateLimitDecision::Allowed
        );
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::ResendActivation),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn actions_and_keys_do_not_collide() {
        let limiter = InMemoryRateLimiter::new(Duration::from_secs(60));
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::Signup),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check_ip(Some("1.2.3.4"), RateLimitAction::Signup),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn missing_ip_is_never_limited() {
        let limiter = InMemoryRateLimiter::new(Duration::from_secs(60));
        for _ in 0..3 {
            assert_eq!(
                limiter.check_ip(None, RateLimitAction::Login),
                RateLimitDecision::Allowed
            );
        }
    }
}
