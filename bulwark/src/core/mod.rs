//! Core components of the bulwark guard library
//!
//! This module contains the fundamental building blocks:
//! - [`guard`]: The guard contract and the erased action it wraps
//! - [`chain`]: Ordered composition of guards
//! - [`concurrency`]: Admission control bounded by in-flight actions
//! - [`rate_limiting`]: Per-identity limits over an hourly window
//! - [`identity`]: Resolving who is calling
//! - [`source`]: Resolving the guard chain for a call site
//! - [`report`]: Read-only management surface

pub mod chain;
pub mod clock;
pub mod concurrency;
pub mod guard;
pub mod identity;
pub mod rate_limiting;
pub mod report;
pub mod source;

pub use chain::{GuardChain, GuardChainBuilder};
pub use clock::{Clock, SystemClock};
pub use concurrency::ConcurrencyThrottle;
pub use guard::{Action, Guard, GuardExt};
pub use identity::{FnResolver, IdentityResolver, Principal, TaskLocalPrincipal, with_principal};
pub use rate_limiting::RateLimitingThrottle;
pub use report::{GuardKind, GuardSnapshot, GuardState, Managed};
pub use source::{GuardListSource, GuardRegistry, StaticGuardListSource};

use thiserror::Error;

/// Errors raised by guards and guard configuration
///
/// # Variants
///
/// - [`InvalidConfiguration`](GuardError::InvalidConfiguration): A guard or registry was configured with invalid values
/// - [`ConcurrencyLimitExceeded`](GuardError::ConcurrencyLimitExceeded): Too many actions already in flight
/// - [`RateLimitExceeded`](GuardError::RateLimitExceeded): The caller used up its calls for the current window
/// - [`Unauthenticated`](GuardError::Unauthenticated): No identity was available for an identity-based guard
/// - [`ActionNotInvoked`](GuardError::ActionNotInvoked): A guard admitted a call but never ran the action
///
/// The rejection variants are transient: the action never ran, and the call may
/// be retried once load drops or the window rolls over.
///
/// # Example
///
/// ```
/// use bulwark::{ConcurrencyThrottle, GuardError};
///
/// match ConcurrencyThrottle::new("db", 0) {
///     Err(GuardError::InvalidConfiguration(reason)) => println!("{reason}"),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// Construction-time configuration error; never retried
    #[error("invalid guard configuration: {0}")]
    InvalidConfiguration(String),
    /// The admission-control guard had no free permit
    #[error("concurrency limit {limit} exceeded")]
    ConcurrencyLimitExceeded { limit: u64 },
    /// The caller exceeded its per-window allowance
    #[error("rate limit {limit} exceeded")]
    RateLimitExceeded { limit: u64 },
    /// The caller must authenticate first
    #[error("authentication required")]
    Unauthenticated,
    /// A guard returned success without running the action
    #[error("guard admitted the call without invoking the action")]
    ActionNotInvoked,
}

impl GuardError {
    /// Whether this error is a guard turning a call away (as opposed to a configuration problem)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GuardError::ConcurrencyLimitExceeded { .. }
                | GuardError::RateLimitExceeded { .. }
                | GuardError::Unauthenticated
        )
    }
}

/// Outcome of running an action through one or more guards
///
/// A guard either rejects the call, in which case the action never ran, or the
/// action runs and its own error is returned untouched in
/// [`Action`](ExecuteError::Action).
#[derive(Debug, Error)]
pub enum ExecuteError<E> {
    /// A guard turned the call away before the action ran
    #[error(transparent)]
    Rejected(#[from] GuardError),
    /// The action ran and failed
    #[error(transparent)]
    Action(E),
}

impl<E> ExecuteError<E> {
    /// Returns true if a guard rejected the call
    pub fn is_rejected(&self) -> bool {
        matches!(self, ExecuteError::Rejected(_))
    }

    /// The guard rejection, if any
    pub fn rejection(&self) -> Option<&GuardError> {
        match self {
            ExecuteError::Rejected(e) => Some(e),
            ExecuteError::Action(_) => None,
        }
    }

    /// The action's own error, if the action ran and failed
    pub fn into_action(self) -> Option<E> {
        match self {
            ExecuteError::Rejected(_) => None,
            ExecuteError::Action(e) => Some(e),
        }
    }
}

/// Validates a configured limit, accepting anything from 1 up to `max`
pub(crate) fn validate_limit(limit: i64, max: u64) -> Result<u64, GuardError> {
    if limit < 1 {
        return Err(GuardError::InvalidConfiguration(format!(
            "limit must be >= 1, got {limit}"
        )));
    }
    let limit = limit as u64;
    if limit > max {
        return Err(GuardError::InvalidConfiguration(format!(
            "limit must be <= {max}, got {limit}"
        )));
    }
    Ok(limit)
}
