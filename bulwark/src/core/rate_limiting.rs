//! Per-identity rate limiting over an hourly wall-clock window
//!
//! All counts reset together when the wall clock enters a new window. This
//! avoids tracking individual requests and their timestamps: the state is one
//! window index plus one counter per identity seen in that window.

use super::clock::{Clock, SystemClock};
use super::guard::{Action, Guard};
use super::identity::IdentityResolver;
use super::report::{GuardKind, GuardSnapshot, GuardState, Managed};
use super::{GuardError, validate_limit};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[cfg(feature = "ahash")]
type CountHasher = ahash::RandomState;
#[cfg(not(feature = "ahash"))]
type CountHasher = std::collections::hash_map::RandomState;

/// Length of one rate limiting window
pub const WINDOW: Duration = Duration::from_secs(60 * 60);

/// Index of the window containing `now`, counted from the Unix epoch
///
/// Times before the epoch fall into window 0.
pub fn window_index(now: SystemTime) -> u64 {
    match now.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => (elapsed.as_millis() / WINDOW.as_millis()) as u64,
        Err(_) => 0,
    }
}

struct Window<K> {
    index: u64,
    counts: DashMap<K, u64, CountHasher>,
}

/// Guard limiting each identity to `limit` calls per hourly window
///
/// The identity behind each call comes from the [`IdentityResolver`] supplied at
/// construction. Calls without an identity are rejected with
/// [`GuardError::Unauthenticated`] before any counter is touched. A rejected
/// call does not count against the caller.
///
/// # Example
///
/// ```
/// use bulwark::{FnResolver, GuardError, GuardExt, RateLimitingThrottle};
///
/// # tokio_test::block_on(async {
/// let limiter = RateLimitingThrottle::new("exports", 2, FnResolver::new(|| Some("acme")))?;
///
/// for _ in 0..2 {
///     limiter.call(|| async { Ok::<_, std::io::Error>(()) }).await.unwrap();
/// }
/// let third = limiter.call(|| async { Ok::<_, std::io::Error>(()) }).await;
/// assert_eq!(
///     third.unwrap_err().rejection(),
///     Some(&GuardError::RateLimitExceeded { limit: 2 })
/// );
/// # Ok::<(), GuardError>(())
/// # }).unwrap();
/// ```
pub struct RateLimitingThrottle<R: IdentityResolver, C = SystemClock> {
    name: String,
    limit: u64,
    window: RwLock<Window<R::Identity>>,
    resolver: R,
    clock: C,
}

impl<R: IdentityResolver> RateLimitingThrottle<R, SystemClock> {
    /// Create a rate limiter allowing `limit` calls per identity per window
    ///
    /// # Errors
    ///
    /// [`GuardError::InvalidConfiguration`] if `limit < 1`.
    pub fn new(name: impl Into<String>, limit: i64, resolver: R) -> Result<Self, GuardError> {
        Self::with_clock(name, limit, resolver, SystemClock)
    }
}

impl<R: IdentityResolver, C: Clock> RateLimitingThrottle<R, C> {
    /// Create a rate limiter reading time from `clock`
    pub fn with_clock(
        name: impl Into<String>,
        limit: i64,
        resolver: R,
        clock: C,
    ) -> Result<Self, GuardError> {
        let limit = validate_limit(limit, i64::MAX as u64)?;
        let index = window_index(clock.now());
        Ok(RateLimitingThrottle {
            name: name.into(),
            limit,
            window: RwLock::new(Window {
                index,
                counts: DashMap::with_hasher(CountHasher::default()),
            }),
            resolver,
            clock,
        })
    }

    /// Index of the window the stored counts belong to
    pub fn current_window(&self) -> u64 {
        self.window.read().index
    }

    /// Calls admitted for `identity` in the current window
    pub fn count(&self, identity: &R::Identity) -> u64 {
        let window = self.window.read();
        if self.is_stale(&window) {
            return 0;
        }
        window.counts.get(identity).map(|count| *count).unwrap_or(0)
    }

    /// Identities with at least one admitted call in the current window
    pub fn tracked_identities(&self) -> usize {
        let window = self.window.read();
        if self.is_stale(&window) {
            return 0;
        }
        window.counts.len()
    }

    // Stored counts from a window the clock has already left read as empty
    fn is_stale(&self, window: &Window<R::Identity>) -> bool {
        window_index(self.clock.now()) > window.index
    }

    fn roll_window(&self, index: u64) {
        if index <= self.window.read().index {
            return;
        }

        let mut window = self.window.write();
        if index > window.index {
            tracing::debug!(
                guard = %self.name,
                from = window.index,
                to = index,
                dropped = window.counts.len(),
                "Resetting rate limit counts for new window"
            );
            window.index = index;
            window.counts.clear();
        }
    }

    fn admit(&self) -> Result<(), GuardError> {
        self.roll_window(window_index(self.clock.now()));

        let Some(identity) = self.resolver.resolve_current_identity() else {
            tracing::debug!(guard = %self.name, "Authentication required");
            return Err(GuardError::Unauthenticated);
        };

        // The read lock keeps a rollover from clearing the map mid-update; the
        // entry lock makes read-increment-store atomic per identity.
        let window = self.window.read();
        let mut count = window.counts.entry(identity).or_insert(0);
        let next = *count + 1;
        if next > self.limit {
            tracing::warn!(
                guard = %self.name,
                limit = self.limit,
                "Request rejected: rate limit exceeded"
            );
            return Err(GuardError::RateLimitExceeded { limit: self.limit });
        }

        *count = next;
        tracing::debug!(
            guard = %self.name,
            principal = ?count.key(),
            count = next,
            "Request admitted"
        );
        Ok(())
    }
}

impl<R: IdentityResolver, C: Clock> Managed for RateLimitingThrottle<R, C> {
    fn limit(&self) -> u64 {
        self.limit
    }

    fn snapshot(&self) -> GuardSnapshot {
        GuardSnapshot {
            name: self.name.clone(),
            kind: GuardKind::RateLimiting,
            limit: self.limit,
            state: GuardState::RateLimiting {
                window: self.current_window().max(window_index(self.clock.now())),
                tracked_identities: self.tracked_identities(),
            },
        }
    }
}

#[async_trait]
impl<R: IdentityResolver, C: Clock> Guard for RateLimitingThrottle<R, C> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, action: Action<'_>) -> Result<(), GuardError> {
        self.admit()?;
        action().await
    }
}

impl<R: IdentityResolver, C> std::fmt::Debug for RateLimitingThrottle<R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitingThrottle")
            .field("name", &self.name)
            .field("limit", &self.limit)
            .field("window", &self.window.read().index)
            .finish()
    }
}
