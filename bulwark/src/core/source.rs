//! Resolving the guard chain for a call site
//!
//! A [`GuardListSource`] is asked for the ordered guards of a call site on every
//! call. How the order is produced is up to the source; the chain preserves it
//! as given.

use super::chain::GuardChain;
use super::guard::Guard;
use super::report::GuardSnapshot;
use super::GuardError;
use std::collections::HashMap;
use std::sync::Arc;

/// Supplies the ordered guard list for a call site
pub trait GuardListSource: Send + Sync {
    /// Guards for `call_site`, outermost first; possibly empty
    fn guards(&self, call_site: &str) -> GuardChain;
}

impl<S: GuardListSource + ?Sized> GuardListSource for Arc<S> {
    fn guards(&self, call_site: &str) -> GuardChain {
        (**self).guards(call_site)
    }
}

/// Source returning the same chain for every call site
#[derive(Debug, Clone, Default)]
pub struct StaticGuardListSource {
    chain: GuardChain,
}

impl StaticGuardListSource {
    pub fn new(chain: GuardChain) -> Self {
        StaticGuardListSource { chain }
    }
}

impl GuardListSource for StaticGuardListSource {
    fn guards(&self, _call_site: &str) -> GuardChain {
        self.chain.clone()
    }
}

/// Named guards bound to call sites by ordered lists of names
///
/// Bindings are resolved when they are made, so a typo in a guard name fails at
/// configuration time instead of on the first request. Call sites without a
/// binding use the default chain, which starts out empty.
///
/// # Example
///
/// ```
/// use bulwark::{ConcurrencyThrottle, FnResolver, GuardListSource, GuardRegistry, RateLimitingThrottle};
///
/// let mut registry = GuardRegistry::new();
/// registry.register(ConcurrencyThrottle::new("db", 32)?)?;
/// registry.register(RateLimitingThrottle::new("per-user", 500, FnResolver::new(|| Some(1u64)))?)?;
///
/// // Resource protection first, client-triggerable rejections after it
/// registry.bind("orders", ["db", "per-user"])?;
/// registry.set_default(["db"])?;
///
/// assert_eq!(registry.guards("orders").names(), vec!["db", "per-user"]);
/// assert_eq!(registry.guards("health").names(), vec!["db"]);
/// # Ok::<(), bulwark::GuardError>(())
/// ```
#[derive(Default)]
pub struct GuardRegistry {
    guards: HashMap<String, Arc<dyn Guard>>,
    bindings: HashMap<String, GuardChain>,
    default_chain: GuardChain,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a guard under its own name
    ///
    /// # Errors
    ///
    /// [`GuardError::InvalidConfiguration`] if a guard with the same name is
    /// already registered.
    pub fn register<G: Guard + 'static>(&mut self, guard: G) -> Result<Arc<dyn Guard>, GuardError> {
        self.register_shared(Arc::new(guard))
    }

    /// Register a guard that is also held elsewhere
    pub fn register_shared(&mut self, guard: Arc<dyn Guard>) -> Result<Arc<dyn Guard>, GuardError> {
        let name = guard.name().to_string();
        if self.guards.contains_key(&name) {
            return Err(GuardError::InvalidConfiguration(format!(
                "duplicate guard name: {name}"
            )));
        }
        tracing::debug!(guard = %name, "Registered guard");
        self.guards.insert(name, Arc::clone(&guard));
        Ok(guard)
    }

    /// Bind `call_site` to the named guards, outermost first
    ///
    /// Rebinding a call site replaces its previous chain.
    ///
    /// # Errors
    ///
    /// [`GuardError::InvalidConfiguration`] if any name is not registered.
    pub fn bind<I, N>(&mut self, call_site: impl Into<String>, names: I) -> Result<(), GuardError>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let call_site = call_site.into();
        let chain = self.resolve(names)?;
        tracing::debug!(call_site = %call_site, guards = ?chain.names(), "Bound call site");
        self.bindings.insert(call_site, chain);
        Ok(())
    }

    /// Set the chain used for call sites without a binding
    pub fn set_default<I, N>(&mut self, names: I) -> Result<(), GuardError>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        self.default_chain = self.resolve(names)?;
        Ok(())
    }

    /// Chain used for call sites without a binding
    pub fn default_chain(&self) -> &GuardChain {
        &self.default_chain
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Guard>> {
        self.guards.get(name)
    }

    pub fn is_bound(&self, call_site: &str) -> bool {
        self.bindings.contains_key(call_site)
    }

    /// Names of all bound call sites, sorted
    pub fn call_sites(&self) -> Vec<&str> {
        let mut sites: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        sites.sort_unstable();
        sites
    }

    /// Snapshots of every registered guard, ordered by name
    pub fn snapshots(&self) -> Vec<GuardSnapshot> {
        let mut snapshots: Vec<GuardSnapshot> =
            self.guards.values().map(|guard| guard.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    fn resolve<I, N>(&self, names: I) -> Result<GuardChain, GuardError>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                self.guards.get(name).cloned().ok_or_else(|| {
                    GuardError::InvalidConfiguration(format!("unknown guard: {name}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(GuardChain::new)
    }
}

impl GuardListSource for GuardRegistry {
    fn guards(&self, call_site: &str) -> GuardChain {
        self.bindings
            .get(call_site)
            .unwrap_or(&self.default_chain)
            .clone()
    }
}

impl std::fmt::Debug for GuardRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.guards.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("GuardRegistry")
            .field("guards", &names)
            .field("bindings", &self.bindings)
            .field("default_chain", &self.default_chain)
            .finish()
    }
}
