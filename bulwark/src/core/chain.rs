//! Ordered composition of guards
//!
//! A chain `[g0, g1, ..., gn]` runs an action as
//! `g0.execute(|| g1.execute(|| ... gn.execute(action)))`. The first guard is the
//! outermost one: it is consulted first and released last. The chain never
//! reorders, deduplicates or parallelizes its guards, since permit acquisition
//! and counter updates are only correct under the declared nesting.

use super::guard::{Action, Guard};
use super::{ExecuteError, GuardError};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// An ordered list of guards protecting one call site
///
/// Cloning a chain is cheap; the guards themselves are shared.
#[derive(Clone, Default)]
pub struct GuardChain {
    guards: Vec<Arc<dyn Guard>>,
}

impl GuardChain {
    /// Create a chain from guards in declared order, outermost first
    pub fn new(guards: Vec<Arc<dyn Guard>>) -> Self {
        GuardChain { guards }
    }

    /// A chain with no guards; actions run directly
    pub fn empty() -> Self {
        Self::default()
    }

    /// Start building a chain one guard at a time
    pub fn builder() -> GuardChainBuilder {
        GuardChainBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Guard names in declared order
    pub fn names(&self) -> Vec<&str> {
        self.guards.iter().map(|guard| guard.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Guard>> {
        self.guards.iter()
    }

    /// Run `action` through every guard in the chain
    ///
    /// The action runs at most once, and only if every guard admits it. Its
    /// value or error is returned unchanged; a rejection from any guard is
    /// returned as [`ExecuteError::Rejected`].
    ///
    /// # Example
    ///
    /// ```
    /// use bulwark::{ConcurrencyThrottle, ExecuteError, GuardChain};
    ///
    /// # tokio_test::block_on(async {
    /// let chain = GuardChain::builder()
    ///     .guard(ConcurrencyThrottle::new("outer", 2).unwrap())
    ///     .guard(ConcurrencyThrottle::new("inner", 1).unwrap())
    ///     .build();
    ///
    /// let err = chain
    ///     .execute(|| async { Err::<(), _>("backend down") })
    ///     .await
    ///     .unwrap_err();
    /// assert!(matches!(err, ExecuteError::Action("backend down")));
    /// # });
    /// ```
    pub async fn execute<T, E, F, Fut>(&self, action: F) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: Send,
    {
        tracing::trace!(guards = ?self.names(), "executing guarded action");
        run(self.guards.iter(), action).await
    }
}

impl fmt::Debug for GuardChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl From<Vec<Arc<dyn Guard>>> for GuardChain {
    fn from(guards: Vec<Arc<dyn Guard>>) -> Self {
        GuardChain::new(guards)
    }
}

/// Builder for a [`GuardChain`]
///
/// Guards are added outermost first.
#[derive(Default)]
pub struct GuardChainBuilder {
    guards: Vec<Arc<dyn Guard>>,
}

impl GuardChainBuilder {
    /// Append a guard owned by this chain
    pub fn guard<G: Guard + 'static>(mut self, guard: G) -> Self {
        self.guards.push(Arc::new(guard));
        self
    }

    /// Append a guard shared with other chains
    pub fn shared(mut self, guard: Arc<dyn Guard>) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn build(self) -> GuardChain {
        GuardChain::new(self.guards)
    }
}

/// Fold `action` through `guards`, first guard outermost
///
/// The typed result is parked in a local slot by the innermost action, so the
/// guards only ever see `Result<(), GuardError>`.
pub(crate) async fn run<'g, I, G, T, E, F, Fut>(
    guards: I,
    action: F,
) -> Result<T, ExecuteError<E>>
where
    I: DoubleEndedIterator<Item = &'g G>,
    G: Guard + ?Sized + 'g,
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: Send,
{
    let mut outcome: Option<Result<T, E>> = None;

    {
        let slot = &mut outcome;
        let mut next: Action<'_> = Box::new(move || {
            async move {
                *slot = Some(action().await);
                Ok(())
            }
            .boxed()
        });

        for guard in guards.rev() {
            let inner = next;
            next = Box::new(move || guard.execute(inner));
        }

        next().await?;
    }

    match outcome {
        Some(result) => result.map_err(ExecuteError::Action),
        None => Err(ExecuteError::Rejected(GuardError::ActionNotInvoked)),
    }
}
