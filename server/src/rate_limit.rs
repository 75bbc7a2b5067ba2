//! Per-client rate limiting using a fixed window counter.
//!
//! Each client key (the remote IP joined with the request path) gets a counter
//! that allows `limit` requests per window. When the window elapses the counter
//! starts over. Requests beyond the limit are rejected with a `Retry-After`
//! value equal to the seconds left in the current window.
//!
//! # Example
//!
//! ```rust
//! use spotlight_server::rate_limit::{RateLimiter, RateLimitResult};
//!
//! #[tokio::main]
//! async fn main() {
//!     let limiter = RateLimiter::per_minute(100);
//!
//!     match limiter.check_rate_limit("10.0.0.1:/api/v1/events").await {
//!         RateLimitResult::Allowed => {
//!             // Process the request
//!         }
//!         RateLimitResult::Limited { retry_after_secs } => {
//!             // Return 429 Too Many Requests with Retry-After header
//!         }
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

/// Default limit: 100 requests per window.
pub const DEFAULT_LIMIT: u32 = 100;

/// Length of one counting window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Windows idle for longer than this are dropped by the cleanup task.
pub const STALE_ENTRY_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    /// The request is allowed to proceed.
    Allowed,

    /// The request is rate limited.
    ///
    /// The value belongs in the `Retry-After` response header.
    Limited {
        /// Number of seconds until the window resets.
        retry_after_secs: u64,
    },
}

impl RateLimitResult {
    /// Returns `true` if the request is allowed.
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns `true` if the request is rate limited.
    #[inline]
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }

    /// Returns the retry-after duration if rate limited, or `None` if allowed.
    #[inline]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Allowed => None,
            Self::Limited { retry_after_secs } => Some(*retry_after_secs),
        }
    }
}

/// Request counter for one client key.
#[derive(Debug, Clone)]
pub struct Window {
    /// Requests seen since `started`.
    count: u32,

    /// When the current window opened.
    started: Instant,

    /// Last time this key made a request.
    last_seen: Instant,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            started: now,
            last_seen: now,
        }
    }

    /// Counts one request against `limit`, opening a new window if the
    /// current one has elapsed.
    fn hit(&mut self, limit: u32, length: Duration, now: Instant) -> RateLimitResult {
        if now.duration_since(self.started) >= length {
            self.started = now;
            self.count = 0;
        }
        self.last_seen = now;

        if self.count < limit {
            self.count += 1;
            return RateLimitResult::Allowed;
        }

        let remaining = length.saturating_sub(now.duration_since(self.started));
        let retry_after_secs = remaining.as_secs_f64().ceil() as u64;
        RateLimitResult::Limited {
            retry_after_secs: retry_after_secs.max(1),
        }
    }

    /// Time since this key last made a request.
    pub fn time_since_last_activity(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

/// Thread-safe rate limiter with per-key windows.
///
/// Cloning is cheap; clones share state. Entries idle for longer than
/// [`STALE_ENTRY_TIMEOUT`] are removed by [`spawn_cleanup_task`].
///
/// [`spawn_cleanup_task`]: RateLimiter::spawn_cleanup_task
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<RwLock<RateLimiterInner>>,
}

#[derive(Debug)]
struct RateLimiterInner {
    windows: HashMap<String, Window>,

    /// Requests allowed per window.
    limit: u32,

    /// Window length.
    length: Duration,
}

impl RateLimiter {
    /// Creates a limiter allowing `limit` requests per `length`.
    pub fn new(limit: u32, length: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RateLimiterInner {
                windows: HashMap::new(),
                limit,
                length,
            })),
        }
    }

    /// Creates a limiter allowing `limit` requests per minute.
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, WINDOW)
    }

    /// Counts a request for `key` and reports whether it may proceed.
    pub async fn check_rate_limit(&self, key: &str) -> RateLimitResult {
        let mut inner = self.inner.write().await;
        let limit = inner.limit;
        let length = inner.length;
        let now = Instant::now();

        inner
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window::new(now))
            .hit(limit, length, now)
    }

    /// Removes entries that have been idle longer than [`STALE_ENTRY_TIMEOUT`].
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup_stale_entries(&self) -> usize {
        self.cleanup_stale_entries_with_timeout(STALE_ENTRY_TIMEOUT)
            .await
    }

    /// Removes entries idle for longer than `timeout`.
    pub async fn cleanup_stale_entries_with_timeout(&self, timeout: Duration) -> usize {
        let mut inner = self.inner.write().await;
        let initial_count = inner.windows.len();

        inner
            .windows
            .retain(|_, window| window.time_since_last_activity() < timeout);

        initial_count - inner.windows.len()
    }

    /// Returns the number of tracked keys.
    pub async fn source_count(&self) -> usize {
        self.inner.read().await.windows.len()
    }

    /// Spawns a background task that calls
    /// [`cleanup_stale_entries`](Self::cleanup_stale_entries) every
    /// `cleanup_interval`. Abort the returned handle on shutdown.
    pub fn spawn_cleanup_task(&self, cleanup_interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);

            loop {
                interval.tick().await;
                let removed = limiter.cleanup_stale_entries().await;
                if removed > 0 {
                    tracing::debug!(
                        removed_count = removed,
                        "Cleaned up stale rate limit entries"
                    );
                }
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_minute(DEFAULT_LIMIT)
    }
}
