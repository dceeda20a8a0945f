//! Guard policy files
//!
//! A policy declares named guards and binds call sites to ordered lists of
//! them. The order of a binding is the nesting order: the first name is the
//! outermost guard.
//!
//! Call sites are declared as an array of tables so that their names are
//! values and keep their case; table keys are lowercased by the loader.
//!
//! ```toml
//! default_chain = ["db"]
//!
//! [[guards]]
//! name = "db"
//! kind = "concurrency"
//! limit = 32
//!
//! [[guards]]
//! name = "per-user"
//! kind = "rate-limiting"
//! limit = 500
//!
//! [[call_sites]]
//! name = "checkout"
//! guards = ["db", "per-user"]
//! ```
//!
//! Rate-limiting guards identify callers through the task-scoped principal set
//! with [`bulwark::with_principal`].

use anyhow::{Context, Result, bail};
use bulwark::{ConcurrencyThrottle, GuardRegistry, RateLimitingThrottle, TaskLocalPrincipal};
use config::{File, FileFormat};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Guards and call-site bindings loaded from a policy file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyConfig {
    /// Guard definitions; names must be unique
    #[serde(default)]
    pub guards: Vec<GuardDefinition>,
    /// Call-site bindings; names must be unique
    #[serde(default)]
    pub call_sites: Vec<CallSiteBinding>,
    /// Guards for call sites without their own binding
    #[serde(default)]
    pub default_chain: Vec<String>,
}

/// One named guard
#[derive(Debug, Clone, Deserialize)]
pub struct GuardDefinition {
    pub name: String,
    pub kind: GuardKindConfig,
    /// Must be at least 1; checked when the registry is built
    pub limit: i64,
}

/// Guards protecting one call site
#[derive(Debug, Clone, Deserialize)]
pub struct CallSiteBinding {
    /// Call site name, matched exactly
    pub name: String,
    /// Guard names, outermost first
    pub guards: Vec<String>,
}

/// Guard kinds a policy can declare
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GuardKindConfig {
    /// Bounds in-flight actions
    Concurrency,
    /// Bounds actions per principal per hour
    RateLimiting,
}

impl PolicyConfig {
    /// Load a TOML policy from `path`
    pub fn from_file(path: &Path) -> Result<Self> {
        config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .with_context(|| format!("Failed to load policy from {}", path.display()))
    }

    /// Parse a TOML policy held in memory
    pub fn from_toml_str(source: &str) -> Result<Self> {
        config::Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .context("Failed to parse policy")
    }

    /// Construct every declared guard and apply the bindings
    ///
    /// # Errors
    ///
    /// Returns an error if a limit is invalid, a guard name is declared twice,
    /// or a binding names a guard that is not declared.
    pub fn build_registry(&self) -> Result<GuardRegistry> {
        let mut registry = GuardRegistry::new();

        for definition in &self.guards {
            let name = definition.name.as_str();
            match definition.kind {
                GuardKindConfig::Concurrency => {
                    let guard = ConcurrencyThrottle::new(name, definition.limit)
                        .with_context(|| format!("Invalid guard '{name}'"))?;
                    registry.register(guard)?;
                }
                GuardKindConfig::RateLimiting => {
                    let guard =
                        RateLimitingThrottle::new(name, definition.limit, TaskLocalPrincipal)
                            .with_context(|| format!("Invalid guard '{name}'"))?;
                    registry.register(guard)?;
                }
            }
        }

        let mut bound = HashSet::new();
        for binding in &self.call_sites {
            let call_site = binding.name.as_str();
            if !bound.insert(call_site) {
                bail!("Call site '{call_site}' is bound more than once");
            }
            registry
                .bind(call_site, &binding.guards)
                .with_context(|| format!("Invalid binding for call site '{call_site}'"))?;
        }

        registry
            .set_default(&self.default_chain)
            .context("Invalid default chain")?;

        tracing::info!(
            guards = self.guards.len(),
            call_sites = self.call_sites.len(),
            "Loaded guard policy"
        );
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark::{GuardKind, GuardListSource};
    use tokio_test::{assert_err, assert_ok};

    const POLICY: &str = r#"
        default_chain = ["db"]

        [[guards]]
        name = "db"
        kind = "concurrency"
        limit = 4

        [[guards]]
        name = "per-user"
        kind = "rate-limiting"
        limit = 100

        [[call_sites]]
        name = "checkout"
        guards = ["db", "per-user"]

        [[call_sites]]
        name = "search"
        guards = ["per-user"]
    "#;

    #[test]
    fn test_parse_policy() {
        let policy = PolicyConfig::from_toml_str(POLICY).unwrap();

        assert_eq!(policy.guards.len(), 2);
        assert_eq!(policy.guards[0].name, "db");
        assert_eq!(policy.guards[0].kind, GuardKindConfig::Concurrency);
        assert_eq!(policy.guards[1].kind, GuardKindConfig::RateLimiting);
        assert_eq!(policy.guards[1].limit, 100);
        assert_eq!(policy.call_sites[0].name, "checkout");
        assert_eq!(policy.call_sites[0].guards, vec!["db", "per-user"]);
        assert_eq!(policy.default_chain, vec!["db"]);
    }

    #[test]
    fn test_build_registry_binds_in_declared_order() {
        let registry = PolicyConfig::from_toml_str(POLICY)
            .unwrap()
            .build_registry()
            .unwrap();

        assert_eq!(registry.guards("checkout").names(), vec!["db", "per-user"]);
        assert_eq!(registry.guards("search").names(), vec!["per-user"]);
        assert_eq!(registry.guards("unknown").names(), vec!["db"]);

        let kinds: Vec<GuardKind> = registry.snapshots().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![GuardKind::Concurrency, GuardKind::RateLimiting]);
    }

    #[test]
    fn test_invalid_limit_names_the_guard() {
        let policy = PolicyConfig::from_toml_str(
            r#"
            [[guards]]
            name = "db"
            kind = "concurrency"
            limit = 0
            "#,
        )
        .unwrap();

        let err = policy.build_registry().unwrap_err();
        assert!(format!("{err:#}").contains("Invalid guard 'db'"));
    }

    #[test]
    fn test_binding_to_undeclared_guard_fails() {
        let policy = PolicyConfig::from_toml_str(
            r#"
            [[guards]]
            name = "db"
            kind = "concurrency"
            limit = 1

            [[call_sites]]
            name = "checkout"
            guards = ["db", "cache"]
            "#,
        )
        .unwrap();

        let err = policy.build_registry().unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("checkout"));
        assert!(message.contains("unknown guard: cache"));
    }

    #[test]
    fn test_call_site_names_keep_their_case() {
        let registry = assert_ok!(
            assert_ok!(PolicyConfig::from_toml_str(
                r#"
                [[guards]]
                name = "DB"
                kind = "concurrency"
                limit = 2

                [[call_sites]]
                name = "Checkout"
                guards = ["DB"]

                [[call_sites]]
                name = "orders.v2"
                guards = ["DB"]
                "#,
            ))
            .build_registry()
        );

        assert_eq!(registry.guards("Checkout").names(), vec!["DB"]);
        assert_eq!(registry.guards("orders.v2").names(), vec!["DB"]);
        assert!(!registry.is_bound("checkout"));
        assert_eq!(registry.call_sites(), vec!["Checkout", "orders.v2"]);
    }

    #[test]
    fn test_call_site_table_form_is_rejected() {
        // Keyed tables would lose the case of call-site names
        let result = PolicyConfig::from_toml_str(
            r#"
            [[guards]]
            name = "db"
            kind = "concurrency"
            limit = 1

            [call_sites]
            Checkout = ["db"]
            "#,
        );
        assert_err!(result);
    }

    #[test]
    fn test_duplicate_call_site_fails() {
        let policy = assert_ok!(PolicyConfig::from_toml_str(
            r#"
            [[guards]]
            name = "db"
            kind = "concurrency"
            limit = 1

            [[call_sites]]
            name = "checkout"
            guards = ["db"]

            [[call_sites]]
            name = "checkout"
            guards = ["db"]
            "#,
        ));

        let err = policy.build_registry().unwrap_err();
        assert!(err.to_string().contains("bound more than once"));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let result = PolicyConfig::from_toml_str(
            r#"
            [[guards]]
            name = "breaker"
            kind = "circuit-breaker"
            limit = 1
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_policy_file() {
        let err = PolicyConfig::from_file(Path::new("/nonexistent/policy.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/policy.toml"));
    }
}
