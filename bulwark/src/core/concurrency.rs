//! Admission control bounded by the number of in-flight actions
//!
//! [`ConcurrencyThrottle`] hands out at most `limit` permits from a fair
//! counting semaphore. A call that finds no free permit is rejected right away;
//! the throttle never queues callers.

use super::guard::{Action, Guard};
use super::report::{GuardKind, GuardSnapshot, GuardState, Managed};
use super::{GuardError, validate_limit};
use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};

/// Guard that rejects calls once `limit` actions are already running
///
/// The permit taken for an admitted call is released when the action finishes,
/// fails, panics, or is dropped mid-flight (cancellation, timeout).
///
/// # Example
///
/// ```
/// use bulwark::{ConcurrencyThrottle, GuardExt, Managed};
///
/// # tokio_test::block_on(async {
/// let throttle = ConcurrencyThrottle::new("payments", 16).unwrap();
/// assert_eq!(throttle.limit(), 16);
///
/// let receipt = throttle
///     .call(|| async { Ok::<_, std::io::Error>("receipt-1") })
///     .await
///     .unwrap();
/// assert_eq!(receipt, "receipt-1");
/// assert_eq!(throttle.in_flight(), 0);
/// # });
/// ```
pub struct ConcurrencyThrottle {
    name: String,
    limit: u64,
    semaphore: Semaphore,
}

impl ConcurrencyThrottle {
    /// Create a throttle admitting at most `limit` concurrent actions
    ///
    /// # Errors
    ///
    /// [`GuardError::InvalidConfiguration`] if `limit < 1` or the limit exceeds
    /// the largest permit count the semaphore supports.
    pub fn new(name: impl Into<String>, limit: i64) -> Result<Self, GuardError> {
        let limit = validate_limit(limit, Semaphore::MAX_PERMITS as u64)?;
        Ok(ConcurrencyThrottle {
            name: name.into(),
            limit,
            semaphore: Semaphore::new(limit as usize),
        })
    }

    /// Permits free right now
    pub fn available_permits(&self) -> u64 {
        self.semaphore.available_permits() as u64
    }

    /// Actions currently running inside this throttle
    pub fn in_flight(&self) -> u64 {
        self.limit.saturating_sub(self.available_permits())
    }

    fn try_acquire(&self) -> Result<SemaphorePermit<'_>, GuardError> {
        match self.semaphore.try_acquire() {
            Ok(permit) => Ok(permit),
            // The semaphore is never closed, so both arms mean "no permit"
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                tracing::warn!(
                    guard = %self.name,
                    limit = self.limit,
                    "Request rejected: concurrency limit exceeded"
                );
                Err(GuardError::ConcurrencyLimitExceeded { limit: self.limit })
            }
        }
    }
}

impl Managed for ConcurrencyThrottle {
    fn limit(&self) -> u64 {
        self.limit
    }

    fn snapshot(&self) -> GuardSnapshot {
        GuardSnapshot {
            name: self.name.clone(),
            kind: GuardKind::Concurrency,
            limit: self.limit,
            state: GuardState::Concurrency {
                in_flight: self.in_flight(),
                available: self.available_permits(),
            },
        }
    }
}

#[async_trait]
impl Guard for ConcurrencyThrottle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, action: Action<'_>) -> Result<(), GuardError> {
        let _permit = self.try_acquire()?;
        action().await
    }
}

impl std::fmt::Debug for ConcurrencyThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyThrottle")
            .field("name", &self.name)
            .field("limit", &self.limit)
            .field("available", &self.available_permits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_positive_limits() {
        for limit in [0, -1, i64::MIN] {
            let err = ConcurrencyThrottle::new("db", limit).unwrap_err();
            assert!(matches!(err, GuardError::InvalidConfiguration(_)));
        }
    }

    #[test]
    fn test_rejects_limit_above_semaphore_maximum() {
        let too_many = Semaphore::MAX_PERMITS as i64 + 1;
        assert!(ConcurrencyThrottle::new("db", too_many).is_err());
    }

    #[test]
    fn test_snapshot_of_idle_throttle() {
        let throttle = ConcurrencyThrottle::new("db", 5).unwrap();
        assert_eq!(throttle.limit(), 5);
        assert_eq!(throttle.in_flight(), 0);
        assert_eq!(
            throttle.snapshot().state,
            GuardState::Concurrency {
                in_flight: 0,
                available: 5
            }
        );
    }

    #[test]
    fn test_try_acquire_exhausts_permits() {
        let throttle = ConcurrencyThrottle::new("db", 2).unwrap();
        let first = throttle.try_acquire().unwrap();
        let _second = throttle.try_acquire().unwrap();

        assert_eq!(
            throttle.try_acquire().unwrap_err(),
            GuardError::ConcurrencyLimitExceeded { limit: 2 }
        );
        assert_eq!(throttle.in_flight(), 2);

        drop(first);
        assert_eq!(throttle.in_flight(), 1);
        assert!(throttle.try_acquire().is_ok());
    }
}
