// In-memory rate limiter for text-generation and score endpoints.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Different rate limit types with their constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    /// Match steps that call the text generator, per hour.
    LlmGenerations,
    /// Score submissions per hour.
    ScoreSubmissions,
}

impl RateLimitType {
    /// Maximum number of events allowed in the window.
    pub fn max_count(&self) -> usize {
        match self {
            RateLimitType::LlmGenerations => 30,
            RateLimitType::ScoreSubmissions => 60,
        }
    }

    /// Time window for the rate limit.
    pub fn window(&self) -> Duration {
        Duration::from_secs(3600)
    }
}

impl std::fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitType::LlmGenerations => write!(f, "generated moves per hour"),
            RateLimitType::ScoreSubmissions => write!(f, "score submissions per hour"),
        }
    }
}

/// Error returned when a rate limit is exceeded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Rate limit exceeded: max {max} {limit_type}")]
pub struct RateLimitError {
    pub limit_type: RateLimitType,
    pub max: usize,
}

/// Key for the rate limit map: (user_id, limit_type).
type LimitKey = (i64, RateLimitType);

/// Thread-safe in-memory rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<LimitKey, Vec<Instant>>>>,
    disabled: bool,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            disabled: false,
        }
    }

    /// A limiter that lets everything through.
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::new()
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<LimitKey, Vec<Instant>>> {
        // A panic while holding the lock cannot leave the map inconsistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check if the user is within the rate limit for the given type.
    /// If within limits, records the event and returns Ok(()).
    pub fn check_limit(
        &self,
        user_id: i64,
        limit_type: RateLimitType,
    ) -> Result<(), RateLimitError> {
        if self.disabled {
            return Ok(());
        }
        let mut map = self.entries();
        let window = limit_type.window();
        let max = limit_type.max_count();
        let now = Instant::now();

        let entries = map.entry((user_id, limit_type)).or_default();
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            tracing::debug!(user_id, %limit_type, "rate limit hit");
            return Err(RateLimitError { limit_type, max });
        }

        entries.push(now);
        Ok(())
    }

    /// Get the current count for a user and limit type.
    pub fn current_count(&self, user_id: i64, limit_type: RateLimitType) -> usize {
        let mut map = self.entries();
        let window = limit_type.window();
        let now = Instant::now();

        match map.get_mut(&(user_id, limit_type)) {
            Some(entries) => {
                entries.retain(|t| now.duration_since(*t) < window);
                entries.len()
            }
            None => 0,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_allows_within_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..30 {
            assert!(limiter.check_limit(1, RateLimitType::LlmGenerations).is_ok());
        }
    }

    #[test]
    fn test_rate_limiter_denies_over_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..30 {
            limiter.check_limit(1, RateLimitType::LlmGenerations).unwrap();
        }
        let err = limiter
            .check_limit(1, RateLimitType::LlmGenerations)
            .unwrap_err();
        assert_eq!(err.max, 30);
        assert_eq!(err.limit_type, RateLimitType::LlmGenerations);
    }

    #[test]
    fn test_rate_limiter_separate_users_and_types() {
        let limiter = RateLimiter::new();
        for _ in 0..30 {
            limiter.check_limit(1, RateLimitType::LlmGenerations).unwrap();
        }
        assert!(limiter.check_limit(1, RateLimitType::LlmGenerations).is_err());
        assert!(limiter.check_limit(2, RateLimitType::LlmGenerations).is_ok());
        assert!(limiter
            .check_limit(1, RateLimitType::ScoreSubmissions)
            .is_ok());
    }

    #[test]
    fn test_rate_limiter_current_count() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.current_count(1, RateLimitType::ScoreSubmissions), 0);
        limiter.check_limit(1, RateLimitType::ScoreSubmissions).unwrap();
        limiter.check_limit(1, RateLimitType::ScoreSubmissions).unwrap();
        assert_eq!(limiter.current_count(1, RateLimitType::ScoreSubmissions), 2);
    }

    #[test]
    fn test_disabled_limiter_never_blocks() {
        let limiter = RateLimiter::disabled();
        for _ in 0..100 {
            assert!(limiter.check_limit(1, RateLimitType::LlmGenerations).is_ok());
        }
        assert_eq!(limiter.current_count(1, RateLimitType::LlmGenerations), 0);
    }

    #[test]
    fn test_rate_limit_error_display() {
        let err = RateLimitError {
            limit_type: RateLimitType::ScoreSubmissions,
            max: 60,
        };
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded: max 60 score submissions per hour"
        );
    }
}
