//! Read-only management surface
//!
//! Every guard exposes its configured limit and a point-in-time
//! [`GuardSnapshot`] through [`Managed`]. Reading either has no side effects,
//! so operators can poll them at any time without disturbing admission.

#[cfg(feature = "serde")]
use serde::Serialize;

/// Read-only reporting for a guard
pub trait Managed {
    /// The configured limit
    fn limit(&self) -> u64;

    /// Current name, configuration and state
    fn snapshot(&self) -> GuardSnapshot;
}

/// Kinds of guard shipped with bulwark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum GuardKind {
    /// Bounds the number of in-flight actions
    Concurrency,
    /// Bounds the number of actions per identity per window
    RateLimiting,
}

impl std::fmt::Display for GuardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardKind::Concurrency => write!(f, "concurrency"),
            GuardKind::RateLimiting => write!(f, "rate-limiting"),
        }
    }
}

/// Live state of a guard at the moment it was sampled
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "kebab-case"))]
pub enum GuardState {
    Concurrency {
        /// Actions currently holding a permit
        in_flight: u64,
        /// Permits free right now
        available: u64,
    },
    RateLimiting {
        /// Index of the current window since the Unix epoch
        window: u64,
        /// Identities with at least one admitted call in this window
        tracked_identities: usize,
    },
}

/// Point-in-time view of a guard
///
/// # Example
///
/// ```
/// use bulwark::{ConcurrencyThrottle, GuardState, Managed};
///
/// let throttle = ConcurrencyThrottle::new("db", 3).unwrap();
/// let snapshot = throttle.snapshot();
///
/// assert_eq!(snapshot.name, "db");
/// assert_eq!(snapshot.limit, 3);
/// assert_eq!(snapshot.state, GuardState::Concurrency { in_flight: 0, available: 3 });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GuardSnapshot {
    pub name: String,
    pub kind: GuardKind,
    pub limit: u64,
    pub state: GuardState,
}
