//! The guard contract
//!
//! A [`Guard`] runs a caller-supplied [`Action`] under protection. The action is
//! erased so that guards stay object safe and can be stored as
//! `Arc<dyn Guard>`; the action's value and error travel outside the guard and
//! are handed back to the caller by [`GuardExt::call`] or
//! [`GuardChain::execute`](super::GuardChain::execute).

use super::chain;
use super::report::{GuardSnapshot, Managed};
use super::{ExecuteError, GuardError};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// A protected unit of work, as seen by a guard
///
/// It can be invoked at most once. It resolves to `Ok(())` once the wrapped
/// work has run (whatever its outcome), or to the rejection of a guard nested
/// further inside the chain.
pub type Action<'a> = Box<dyn FnOnce() -> BoxFuture<'a, Result<(), GuardError>> + Send + 'a>;

/// A component that protects a call path
///
/// Implementations either run the action and return exactly what it returns, or
/// reject the call with a [`GuardError`] without running it. Guards are shared
/// between many concurrent callers and must not assume single-caller access.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use bulwark::{Action, Guard, GuardError, GuardKind, GuardSnapshot, GuardState, Managed};
///
/// /// Lets every call through
/// struct Open;
///
/// impl Managed for Open {
///     fn limit(&self) -> u64 {
///         u64::MAX
///     }
///
///     fn snapshot(&self) -> GuardSnapshot {
///         GuardSnapshot {
///             name: "open".to_string(),
///             kind: GuardKind::Concurrency,
///             limit: u64::MAX,
///             state: GuardState::Concurrency { in_flight: 0, available: u64::MAX },
///         }
///     }
/// }
///
/// #[async_trait]
/// impl Guard for Open {
///     fn name(&self) -> &str {
///         "open"
///     }
///
///     async fn execute(&self, action: Action<'_>) -> Result<(), GuardError> {
///         action().await
///     }
/// }
/// ```
#[async_trait]
pub trait Guard: Managed + Send + Sync {
    /// Name assigned by the hosting environment, stable for the guard's lifetime
    fn name(&self) -> &str;

    /// Run `action` under this guard, or reject the call
    async fn execute(&self, action: Action<'_>) -> Result<(), GuardError>;
}

#[async_trait]
impl<G: Guard + ?Sized> Guard for Arc<G> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn execute(&self, action: Action<'_>) -> Result<(), GuardError> {
        (**self).execute(action).await
    }
}

impl<G: Managed + ?Sized> Managed for Arc<G> {
    fn limit(&self) -> u64 {
        (**self).limit()
    }

    fn snapshot(&self) -> GuardSnapshot {
        (**self).snapshot()
    }
}

/// Typed entry point for running an action through a single guard
pub trait GuardExt: Guard + Sized {
    /// Run `action` under this guard
    ///
    /// Returns the action's value, the action's own error in
    /// [`ExecuteError::Action`], or the guard's rejection in
    /// [`ExecuteError::Rejected`].
    ///
    /// # Example
    ///
    /// ```
    /// use bulwark::{ConcurrencyThrottle, GuardExt};
    ///
    /// # tokio_test::block_on(async {
    /// let throttle = ConcurrencyThrottle::new("search", 4).unwrap();
    /// let hits = throttle
    ///     .call(|| async { Ok::<_, std::io::Error>(42) })
    ///     .await
    ///     .unwrap();
    /// assert_eq!(hits, 42);
    /// # });
    /// ```
    fn call<'a, T, E, F, Fut>(
        &'a self,
        action: F,
    ) -> impl Future<Output = Result<T, ExecuteError<E>>> + Send + 'a
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
        T: Send + 'a,
        E: Send + 'a;
}

impl<G: Guard> GuardExt for G {
    fn call<'a, T, E, F, Fut>(
        &'a self,
        action: F,
    ) -> impl Future<Output = Result<T, ExecuteError<E>>> + Send + 'a
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, E>> + Send + 'a,
        T: Send + 'a,
        E: Send + 'a,
    {
        chain::run(std::iter::once(self), action)
    }
}
