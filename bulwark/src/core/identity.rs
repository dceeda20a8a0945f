//! Resolving who is calling
//!
//! Identity-based guards hold an [`IdentityResolver`] handed to them at
//! construction instead of reaching for a global security context. The
//! resolver decides what "current caller" means: a closure over request state,
//! or the task-scoped [`Principal`] set with [`with_principal`].

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

/// Capability that yields the identity behind the current call
pub trait IdentityResolver: Send + Sync {
    /// Opaque, comparable caller identity
    type Identity: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    /// The authenticated identity for the current call, or `None` when the
    /// caller is anonymous or unauthenticated
    fn resolve_current_identity(&self) -> Option<Self::Identity>;
}

impl<R: IdentityResolver + ?Sized> IdentityResolver for Arc<R> {
    type Identity = R::Identity;

    fn resolve_current_identity(&self) -> Option<Self::Identity> {
        (**self).resolve_current_identity()
    }
}

/// Resolver backed by a closure
///
/// # Example
///
/// ```
/// use bulwark::{FnResolver, IdentityResolver};
///
/// let resolver = FnResolver::new(|| Some(7u64));
/// assert_eq!(resolver.resolve_current_identity(), Some(7));
/// ```
#[derive(Clone)]
pub struct FnResolver<F> {
    resolve: F,
}

impl<F> FnResolver<F> {
    pub fn new(resolve: F) -> Self {
        FnResolver { resolve }
    }
}

impl<F, I> IdentityResolver for FnResolver<F>
where
    F: Fn() -> Option<I> + Send + Sync,
    I: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    type Identity = I;

    fn resolve_current_identity(&self) -> Option<I> {
        (self.resolve)()
    }
}

/// The caller as established by an authentication layer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    /// A caller that has not authenticated
    Anonymous,
    /// An authenticated caller
    Authenticated(Arc<str>),
}

impl Principal {
    pub fn authenticated(id: impl AsRef<str>) -> Self {
        Principal::Authenticated(Arc::from(id.as_ref()))
    }

    /// The authenticated id; anonymous callers have none
    pub fn id(&self) -> Option<&Arc<str>> {
        match self {
            Principal::Anonymous => None,
            Principal::Authenticated(id) => Some(id),
        }
    }
}

tokio::task_local! {
    static CURRENT_PRINCIPAL: Principal;
}

/// Run `future` with `principal` as the current caller of its task
///
/// Guards driven from inside `future` that use [`TaskLocalPrincipal`] see this
/// principal.
pub async fn with_principal<F: Future>(principal: Principal, future: F) -> F::Output {
    CURRENT_PRINCIPAL.scope(principal, future).await
}

/// Resolver reading the principal installed by [`with_principal`]
///
/// Outside a [`with_principal`] scope, or for [`Principal::Anonymous`], no
/// identity is resolved.
///
/// # Example
///
/// ```
/// use bulwark::{IdentityResolver, Principal, TaskLocalPrincipal, with_principal};
///
/// # tokio_test::block_on(async {
/// assert_eq!(TaskLocalPrincipal.resolve_current_identity(), None);
///
/// let who = with_principal(Principal::authenticated("alice"), async {
///     TaskLocalPrincipal.resolve_current_identity()
/// })
/// .await;
/// assert_eq!(who.as_deref(), Some("alice"));
/// # });
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskLocalPrincipal;

impl IdentityResolver for TaskLocalPrincipal {
    type Identity = Arc<str>;

    fn resolve_current_identity(&self) -> Option<Arc<str>> {
        CURRENT_PRINCIPAL
            .try_with(|principal| principal.id().cloned())
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_anonymous_principal_has_no_identity() {
        let resolved = with_principal(Principal::Anonymous, async {
            TaskLocalPrincipal.resolve_current_identity()
        })
        .await;
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn test_nested_scopes_use_innermost_principal() {
        let resolved = with_principal(Principal::authenticated("outer"), async {
            with_principal(Principal::authenticated("inner"), async {
                TaskLocalPrincipal.resolve_current_identity()
            })
            .await
        })
        .await;
        assert_eq!(resolved.as_deref(), Some("inner"));
    }

    #[tokio::test]
    async fn test_principal_does_not_leak_into_spawned_tasks() {
        let resolved = with_principal(Principal::authenticated("alice"), async {
            tokio::spawn(async { TaskLocalPrincipal.resolve_current_identity() })
                .await
                .unwrap()
        })
        .await;
        assert_eq!(resolved, None);
    }

    #[test]
    fn test_fn_resolver_through_arc() {
        let resolver = Arc::new(FnResolver::new(|| Some("svc-account".to_string())));
        assert_eq!(
            resolver.resolve_current_identity().as_deref(),
            Some("svc-account")
        );
    }
}
